//! Merges DNA and RNA read counts from allcount streams into the finalized
//! candidates of a job.

use crate::allcount::{AllcountError, AllcountReader, CoverageRecord};
use crate::types::{Grain, ReadKind};
use ahash::AHashMap;
use log::debug;
use std::path::PathBuf;
use thiserror::Error;

/// Interned chromosome name.
pub type ContigId = u32;

/// Position of a candidate inside the finalized grain list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub grain: usize,
    pub candidate: usize,
}

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error(transparent)]
    Allcount(#[from] AllcountError),
    #[error(
        "got {kind} read count more than once for the same variant {contig}:{locus} in {} at line {line}",
        path.display()
    )]
    DuplicateCoverage {
        path: PathBuf,
        line: usize,
        kind: ReadKind,
        contig: String,
        locus: i64,
    },
}

/// The names under which a coverage contig may appear in the candidate index:
/// the lowercased name first, then the same name with the `chr` prefix toggled.
pub fn canonical_contig_names(name: &str) -> [String; 2] {
    let lower = name.to_ascii_lowercase();
    let toggled = match lower.strip_prefix("chr") {
        Some(bare) => bare.to_string(),
        None => format!("chr{lower}"),
    };
    [lower, toggled]
}

/// Lookup from `(chromosome, locus)` to a finalized candidate.
#[derive(Debug, Default)]
pub struct CandidateIndex {
    contigs: AHashMap<String, ContigId>,
    slots: AHashMap<(ContigId, i64), Slot>,
}

impl CandidateIndex {
    pub fn build(grains: &[Grain]) -> Self {
        let mut index = Self::default();
        for (grain_pos, grain) in grains.iter().enumerate() {
            for (candidate_pos, candidate) in grain.candidates.iter().enumerate() {
                let next_id = index.contigs.len() as ContigId;
                let contig = *index
                    .contigs
                    .entry(candidate.chromosome.clone())
                    .or_insert(next_id);
                index
                    .slots
                    .entry((contig, candidate.locus))
                    .or_insert(Slot {
                        grain: grain_pos,
                        candidate: candidate_pos,
                    });
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Resolves a coverage contig name, trying each canonical spelling in turn.
    pub fn resolve_contig(&self, name: &str) -> Option<ContigId> {
        canonical_contig_names(name)
            .iter()
            .find_map(|candidate| self.contigs.get(candidate).copied())
    }

    pub fn lookup(&self, contig: ContigId, locus: i64) -> Option<Slot> {
        self.slots.get(&(contig, locus)).copied()
    }
}

/// Per-stream counters, logged at debug level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    pub records: u64,
    pub matched: u64,
    pub ignored_contigs: u64,
}

/// Attaches read counts to the candidates of one job.
pub struct CoverageAnnotator<'g> {
    grains: &'g mut [Grain],
    index: CandidateIndex,
}

impl<'g> CoverageAnnotator<'g> {
    pub fn new(grains: &'g mut [Grain]) -> Self {
        let index = CandidateIndex::build(grains);
        Self { grains, index }
    }

    pub fn index(&self) -> &CandidateIndex {
        &self.index
    }

    /// Consumes one coverage stream. Contigs with no candidates are skipped
    /// silently, as are loci without a candidate.
    pub fn annotate(
        &mut self,
        kind: ReadKind,
        reader: AllcountReader,
    ) -> Result<AnnotationStats, AnnotationError> {
        let path = reader.path().to_path_buf();
        let index = &self.index;
        let grains = &mut *self.grains;

        let mut stats = AnnotationStats::default();
        let mut cached: Option<(String, Option<ContigId>)> = None;

        reader.for_each_record::<AnnotationError, _>(|record: CoverageRecord<'_>| {
            stats.records += 1;

            let stale = cached.as_ref().is_none_or(|(name, _)| name != record.contig);
            if stale {
                let resolved = index.resolve_contig(record.contig);
                if resolved.is_none() {
                    stats.ignored_contigs += 1;
                }
                cached = Some((record.contig.to_string(), resolved));
            }
            let Some(contig) = cached.as_ref().and_then(|(_, id)| *id) else {
                return Ok(());
            };
            let Some(slot) = index.lookup(contig, record.locus) else {
                return Ok(());
            };

            let candidate = &mut grains[slot.grain].candidates[slot.candidate];
            candidate
                .reads
                .record(kind, record.mapped_reads)
                .map_err(|_| AnnotationError::DuplicateCoverage {
                    path: path.clone(),
                    line: record.line,
                    kind,
                    contig: candidate.chromosome.clone(),
                    locus: record.locus,
                })?;
            stats.matched += 1;
            Ok(())
        })?;

        debug!(
            "{kind} coverage from {}: {} records, {} matched candidates, {} contigs without candidates",
            path.display(),
            stats.records,
            stats.matched,
            stats.ignored_contigs
        );
        Ok(stats)
    }
}
