// ========================================================================================
//
//                          The per-sample selection pipeline
//
// ========================================================================================
//
// One job runs start to finish on a single worker: the variant scan feeds the grain
// manager, the finalized grains are annotated from the DNA and then the RNA allcount
// stream, and the best candidate of every grain is written out. Nothing in here is
// shared with other jobs, so nothing in here locks.

use crate::allcount::{AllcountError, AllcountReader};
use crate::annotate::{AnnotationError, CoverageAnnotator};
use crate::best::{format_selection, select_best};
use crate::grain::GrainWindowManager;
use crate::shared::files::{SourceError, TextSource, open_text_source};
use crate::types::{CandidateVariant, DONE_SENTINEL, Grain, Job, ReadKind, TOOL_NAME, TOOL_VERSION};
use crate::vcf::VariantStreamFilter;
use log::{debug, warn};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str;
use std::time::{Duration, Instant};
use thiserror::Error;

// ========================================================================================
//                                   Error taxonomy
// ========================================================================================

/// Everything that can end a job early. All of these are local to the job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("file not found: {}", path.display())]
    MissingFile { path: PathBuf },
    #[error("malformed record in {} at line {line}: {message}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{} has no variant records after its header", path.display())]
    EmptyInput { path: PathBuf },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<SourceError> for JobError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound { path } => Self::MissingFile { path },
            SourceError::Io { path, source } => Self::Io { path, source },
        }
    }
}

impl From<AllcountError> for JobError {
    fn from(err: AllcountError) -> Self {
        match err {
            AllcountError::Source(source) => source.into(),
            AllcountError::Header {
                path,
                line,
                message,
            } => Self::MalformedRecord {
                path,
                line,
                message: format!("bad allcount header: {message}"),
            },
            AllcountError::Body {
                path,
                line,
                message,
            } => Self::MalformedRecord {
                path,
                line,
                message: format!("bad allcount body: {message}"),
            },
        }
    }
}

impl From<AnnotationError> for JobError {
    fn from(err: AnnotationError) -> Self {
        match err {
            AnnotationError::Allcount(inner) => inner.into(),
            AnnotationError::DuplicateCoverage {
                path,
                line,
                kind,
                contig,
                locus,
            } => Self::MalformedRecord {
                path,
                line,
                message: format!("got {kind} read count more than once for variant {contig}:{locus}"),
            },
        }
    }
}

// ========================================================================================
//                                   Variant scan
// ========================================================================================

/// The result of streaming one VCF through the filter and grain manager.
#[derive(Debug)]
pub struct VariantScan {
    pub grains: Vec<Grain>,
    pub data_lines: u64,
    pub accepted: u64,
}

/// Reads the whole variant stream once, front to back.
pub fn scan_variants(source: &mut dyn TextSource) -> Result<VariantScan, JobError> {
    let path = source.path().to_path_buf();
    let mut filter = VariantStreamFilter::new();
    let mut manager = GrainWindowManager::new();
    let mut data_lines = 0u64;
    let mut accepted = 0u64;
    let mut line_number = source.line_number();

    while let Some(raw) = source.next_line()? {
        line_number += 1;
        let line = str::from_utf8(raw).map_err(|e| JobError::MalformedRecord {
            path: path.clone(),
            line: line_number,
            message: format!("line is not valid UTF-8: {e}"),
        })?;

        let variant = match filter.filter(line) {
            Ok(Some(variant)) => variant,
            Ok(None) => continue,
            Err(err) => {
                return Err(JobError::MalformedRecord {
                    path,
                    line: line_number,
                    message: format!("{err}: '{line}'"),
                });
            }
        };

        data_lines += 1;
        if variant.starts_chromosome {
            debug!(
                "{}: chromosome {} starts at line {line_number}, {} grains finalized so far",
                path.display(),
                variant.chromosome,
                manager.finalized_len()
            );
        }
        if variant.accepted.is_some() {
            accepted += 1;
        }
        manager.observe(&variant);
    }

    if data_lines == 0 {
        return Err(JobError::EmptyInput { path });
    }

    Ok(VariantScan {
        grains: manager.finish(),
        data_lines,
        accepted,
    })
}

// ========================================================================================
//                                      Output
// ========================================================================================

/// The first line of every output file.
pub fn banner(vcf_path: &Path) -> String {
    format!("{TOOL_NAME} v{TOOL_VERSION} for input file {}", vcf_path.display())
}

/// Writes the output file. The data goes to a `.partial` sibling first and is
/// renamed into place only once complete, so a failed write leaves no output.
pub fn write_selection(
    output_path: &Path,
    vcf_path: &Path,
    selected: &[&CandidateVariant],
) -> Result<(), JobError> {
    let mut partial = OsString::from(output_path.as_os_str());
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let result = write_records(&partial, vcf_path, selected)
        .and_then(|()| fs::rename(&partial, output_path));
    if let Err(source) = result {
        let _ = fs::remove_file(&partial);
        return Err(JobError::Io {
            path: output_path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn write_records(path: &Path, vcf_path: &Path, selected: &[&CandidateVariant]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}", banner(vcf_path))?;
    for candidate in selected {
        writeln!(writer, "{}", format_selection(candidate))?;
    }

    writeln!(writer, "{DONE_SENTINEL}")?;
    writer.flush()
}

// ========================================================================================
//                                    Job driver
// ========================================================================================

/// What a finished job produced.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub participant_id: String,
    pub output_path: PathBuf,
    pub data_lines: u64,
    pub candidates: usize,
    pub selected: usize,
    pub elapsed: Duration,
}

/// Merges one coverage stream. A damaged or truncated body is logged and the
/// counts merged before the damage are kept; every other failure ends the job.
fn annotate_stream(
    annotator: &mut CoverageAnnotator<'_>,
    kind: ReadKind,
    reader: AllcountReader,
) -> Result<(), JobError> {
    match annotator.annotate(kind, reader) {
        Ok(_) => Ok(()),
        Err(AnnotationError::Allcount(err @ AllcountError::Body { .. })) => {
            warn!("{err}; keeping the {kind} counts read before it");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Runs the whole pipeline for one participant.
pub fn run_job(job: &Job) -> Result<JobReport, JobError> {
    let started = Instant::now();

    let scan = {
        let mut vcf = open_text_source(&job.vcf_path)?;
        scan_variants(vcf.as_mut())?
    };
    debug!(
        "{}: {} variant lines, {} accepted, {} grains with surviving candidates",
        job.participant_id,
        scan.data_lines,
        scan.accepted,
        scan.grains.len()
    );

    let dna = AllcountReader::open(&job.dna_allcount_path)?;
    let rna = AllcountReader::open(&job.rna_allcount_path)?;
    for (kind, reader) in [(ReadKind::Dna, &dna), (ReadKind::Rna, &rna)] {
        let header = reader.header();
        debug!(
            "{}: {kind} allcount v{} reports {} mapped reads over {} contigs ({} bases)",
            job.participant_id,
            header.version,
            header.total_mapped_reads,
            header.contig_count(),
            header.total_contig_length()
        );
    }

    let mut grains = scan.grains;
    let candidates = {
        let mut annotator = CoverageAnnotator::new(&mut grains);
        if annotator.index().is_empty() {
            debug!("{}: no candidates to annotate", job.participant_id);
        } else {
            for (kind, reader) in [(ReadKind::Dna, dna), (ReadKind::Rna, rna)] {
                annotate_stream(&mut annotator, kind, reader)?;
            }
        }
        annotator.index().len()
    };

    let selected = select_best(&grains);
    let output_path = job.output_path();
    write_selection(&output_path, &job.vcf_path, &selected)?;

    Ok(JobReport {
        participant_id: job.participant_id.clone(),
        output_path,
        data_lines: scan.data_lines,
        candidates,
        selected: selected.len(),
        elapsed: started.elapsed(),
    })
}
