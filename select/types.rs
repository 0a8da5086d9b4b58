// ========================================================================================
//                             High-level data contracts
// ========================================================================================

// Types and constants shared between the stages of a selection job.

use std::fmt;
use std::path::PathBuf;

/// Width in bases of a grain. At most one variant is emitted per grain.
pub const GRANULARITY: i64 = 1000;
/// Minimum separation between retained variant loci on one chromosome.
pub const ISOLATION_DISTANCE: i64 = 150;
/// Minimum DNA reads covering a candidate for it to be emitted.
pub const MIN_DNA_READS: u32 = 10;
/// Minimum RNA reads covering a candidate for it to be emitted.
pub const MIN_RNA_READS: u32 = 10;
/// Candidates need strictly greater odds than this.
pub const MIN_ODDS: f64 = 20.0;
pub const REQUIRED_ALLELE_FREQUENCY: f64 = 0.5;
/// Open interval the allele balance must fall into.
pub const ALLELE_BALANCE_BOUNDS: (f64, f64) = (0.4, 0.6);
pub const REQUIRED_ALLELE_COUNT: i64 = 1;
pub const REQUIRED_ALLELE_NUMBER: i64 = 2;
pub const REQUIRED_CIGAR: &str = "1X";

/// Extension that replaces the VCF's own extension to name the output file.
pub const OUTPUT_EXTENSION: &str = "selectedVariants";
/// Final line of every complete output file.
pub const DONE_SENTINEL: &str = "**done**";
pub const TOOL_NAME: &str = "SelectGermlineVariants";
/// Version printed in the output banner.
pub const TOOL_VERSION: &str = "1.1";

/// The index of the grain containing `locus`.
#[inline]
pub fn grain_index(locus: i64) -> i64 {
    locus / GRANULARITY
}

/// Which coverage stream a read count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadKind {
    Dna,
    Rna,
}

impl fmt::Display for ReadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dna => f.write_str("DNA"),
            Self::Rna => f.write_str("RNA"),
        }
    }
}

/// Returned when a count is recorded twice for the same stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateCoverage {
    pub kind: ReadKind,
    pub existing: u32,
}

/// Set-once DNA and RNA read counts for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadCounts {
    dna: Option<u32>,
    rna: Option<u32>,
}

impl ReadCounts {
    pub fn get(&self, kind: ReadKind) -> Option<u32> {
        match kind {
            ReadKind::Dna => self.dna,
            ReadKind::Rna => self.rna,
        }
    }

    /// Records `count` for `kind`. A count can only be recorded once per kind.
    pub fn record(&mut self, kind: ReadKind, count: u32) -> Result<(), DuplicateCoverage> {
        let slot = match kind {
            ReadKind::Dna => &mut self.dna,
            ReadKind::Rna => &mut self.rna,
        };
        match *slot {
            Some(existing) => Err(DuplicateCoverage { kind, existing }),
            None => {
                *slot = Some(count);
                Ok(())
            }
        }
    }

    /// True when both streams reported at least the minimum number of reads.
    pub fn is_sufficient(&self) -> bool {
        self.dna.is_some_and(|n| n >= MIN_DNA_READS) && self.rna.is_some_and(|n| n >= MIN_RNA_READS)
    }
}

/// A variant that passed the genotype/quality predicate and is waiting for
/// coverage confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateVariant {
    /// Lowercased chromosome name.
    pub chromosome: String,
    pub locus: i64,
    /// The untouched VCF line.
    pub line: String,
    pub odds: f64,
    pub reads: ReadCounts,
}

impl CandidateVariant {
    pub fn new(chromosome: &str, locus: i64, odds: f64, line: &str) -> Self {
        Self {
            chromosome: chromosome.to_ascii_lowercase(),
            locus,
            line: line.to_string(),
            odds,
            reads: ReadCounts::default(),
        }
    }
}

/// The candidates of one closed window of `GRANULARITY` bases, in acceptance order.
#[derive(Debug, Clone, PartialEq)]
pub struct Grain {
    /// Lowercased chromosome name.
    pub chromosome: String,
    pub index: i64,
    pub candidates: Vec<CandidateVariant>,
}

impl Grain {
    pub fn new(chromosome: &str, index: i64) -> Self {
        Self {
            chromosome: chromosome.to_ascii_lowercase(),
            index,
            candidates: Vec::new(),
        }
    }

    /// Permanently drops every candidate too close to a variant at `locus`.
    pub fn evict_near(&mut self, locus: i64) {
        self.candidates
            .retain(|candidate| candidate.locus.saturating_add(ISOLATION_DISTANCE) < locus);
    }
}

/// The files of one participant. Jobs are independent of each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub participant_id: String,
    pub vcf_path: PathBuf,
    pub dna_allcount_path: PathBuf,
    pub rna_allcount_path: PathBuf,
}

impl Job {
    /// The output path: the VCF path with its extension replaced.
    pub fn output_path(&self) -> PathBuf {
        self.vcf_path.with_extension(OUTPUT_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_counts_are_set_once() {
        let mut reads = ReadCounts::default();
        assert_eq!(reads.get(ReadKind::Dna), None);

        reads.record(ReadKind::Dna, 12).unwrap();
        reads.record(ReadKind::Rna, 3).unwrap();
        assert_eq!(reads.get(ReadKind::Dna), Some(12));
        assert_eq!(reads.get(ReadKind::Rna), Some(3));

        let err = reads.record(ReadKind::Dna, 40).unwrap_err();
        assert_eq!(err, DuplicateCoverage { kind: ReadKind::Dna, existing: 12 });
        assert_eq!(reads.get(ReadKind::Dna), Some(12));
    }

    #[test]
    fn sufficiency_needs_both_streams_at_threshold() {
        let mut reads = ReadCounts::default();
        reads.record(ReadKind::Dna, MIN_DNA_READS).unwrap();
        assert!(!reads.is_sufficient());
        reads.record(ReadKind::Rna, MIN_RNA_READS - 1).unwrap();
        assert!(!reads.is_sufficient());

        let mut enough = ReadCounts::default();
        enough.record(ReadKind::Dna, MIN_DNA_READS).unwrap();
        enough.record(ReadKind::Rna, MIN_RNA_READS).unwrap();
        assert!(enough.is_sufficient());
    }

    #[test]
    fn eviction_requires_loci_further_apart_than_isolation_distance() {
        let mut grain = Grain::new("chr1", 0);
        grain.candidates.push(CandidateVariant::new("chr1", 100, 30.0, "a"));
        grain.candidates.push(CandidateVariant::new("chr1", 101, 30.0, "b"));

        grain.evict_near(100 + ISOLATION_DISTANCE + 1);
        assert_eq!(grain.candidates.len(), 1);
        assert_eq!(grain.candidates[0].locus, 100);

        grain.evict_near(100 + ISOLATION_DISTANCE);
        assert!(grain.candidates.is_empty());
    }

    #[test]
    fn eviction_at_the_integer_limit_does_not_overflow() {
        let mut grain = Grain::new("chr1", i64::MAX / GRANULARITY);
        grain.candidates.push(CandidateVariant::new("chr1", i64::MAX, 30.0, "a"));
        grain.evict_near(i64::MAX);
        assert!(grain.candidates.is_empty());
    }

    #[test]
    fn output_path_replaces_the_extension() {
        let job = Job {
            participant_id: "p1".into(),
            vcf_path: PathBuf::from("/data/p1/sample.vcf"),
            dna_allcount_path: PathBuf::from("/data/p1/dna.allcount"),
            rna_allcount_path: PathBuf::from("/data/p1/rna.allcount"),
        };
        assert_eq!(job.output_path(), PathBuf::from("/data/p1/sample.selectedVariants"));
    }
}
