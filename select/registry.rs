//! Participant registry: maps participant ids to the three input files of a job.
//!
//! The registry is a tab-separated table with a header row. Columns beyond the
//! four required ones are ignored, so a wider sample sheet can be used as is.

use crate::types::Job;
use ahash::{AHashMap, AHashSet};
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry {} does not exist", path.display())]
    NotFound { path: PathBuf },
    #[error("error opening registry {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error parsing registry {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("participant '{participant_id}' is listed more than once in {}", path.display())]
    DuplicateParticipant { path: PathBuf, participant_id: String },
}

#[derive(Debug, Deserialize)]
struct RegistryRow {
    participant_id: String,
    vcf_path: String,
    dna_allcount_path: String,
    rna_allcount_path: String,
}

/// Why a requested participant produced no job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotRegistered,
    EmptyPath(&'static str),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered => write!(f, "not present in the registry"),
            Self::EmptyPath(column) => write!(f, "registry entry has an empty {column}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedParticipant {
    pub participant_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct Registry {
    rows: AHashMap<String, RegistryRow>,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => RegistryError::NotFound {
                path: path.to_path_buf(),
            },
            _ => RegistryError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        Self::from_reader(path, BufReader::new(file))
    }

    /// Parses a registry from any reader; `path` is only used in errors.
    pub fn from_reader(path: &Path, reader: impl io::Read) -> Result<Self, RegistryError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = AHashMap::new();
        for result in csv_reader.deserialize::<RegistryRow>() {
            let row = result.map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            if rows.contains_key(&row.participant_id) {
                return Err(RegistryError::DuplicateParticipant {
                    path: path.to_path_buf(),
                    participant_id: row.participant_id,
                });
            }
            rows.insert(row.participant_id.clone(), row);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Builds the job set for the requested ids, in request order. Each id is
    /// queued at most once.
    pub fn jobs_for<S: AsRef<str>>(&self, ids: &[S]) -> (Vec<Job>, Vec<SkippedParticipant>) {
        let mut seen = AHashSet::new();
        let mut jobs = Vec::new();
        let mut skipped = Vec::new();

        for id in ids.iter().map(AsRef::as_ref) {
            if !seen.insert(id) {
                continue;
            }
            match self.rows.get(id).map(job_from_row) {
                Some(Ok(job)) => jobs.push(job),
                Some(Err(reason)) => skipped.push(SkippedParticipant {
                    participant_id: id.to_string(),
                    reason,
                }),
                None => skipped.push(SkippedParticipant {
                    participant_id: id.to_string(),
                    reason: SkipReason::NotRegistered,
                }),
            }
        }
        (jobs, skipped)
    }
}

fn job_from_row(row: &RegistryRow) -> Result<Job, SkipReason> {
    let columns = [
        ("vcf_path", &row.vcf_path),
        ("dna_allcount_path", &row.dna_allcount_path),
        ("rna_allcount_path", &row.rna_allcount_path),
    ];
    if let Some((column, _)) = columns.iter().find(|(_, value)| value.is_empty()) {
        return Err(SkipReason::EmptyPath(*column));
    }
    Ok(Job {
        participant_id: row.participant_id.clone(),
        vcf_path: PathBuf::from(&row.vcf_path),
        dna_allcount_path: PathBuf::from(&row.dna_allcount_path),
        rna_allcount_path: PathBuf::from(&row.rna_allcount_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "participant_id\tvcf_path\tdna_allcount_path\trna_allcount_path\tcohort";

    fn registry(body: &str) -> Result<Registry, RegistryError> {
        let text = format!("{HEADER}\n{body}");
        Registry::from_reader(Path::new("registry.tsv"), text.as_bytes())
    }

    #[test]
    fn rows_become_jobs_in_request_order() {
        let registry = registry(
            "p1\t/data/p1.vcf\t/data/p1.dna\t/data/p1.rna\tA\n\
             p2\t/data/p2.vcf.gz\t/data/p2.dna\t/data/p2.rna\tB\n",
        )
        .unwrap();
        assert_eq!(registry.len(), 2);

        let (jobs, skipped) = registry.jobs_for(&["p2", "p1"]);
        assert!(skipped.is_empty());
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].participant_id, "p2");
        assert_eq!(jobs[0].vcf_path, PathBuf::from("/data/p2.vcf.gz"));
        assert_eq!(jobs[1].rna_allcount_path, PathBuf::from("/data/p1.rna"));
    }

    #[test]
    fn unknown_and_incomplete_participants_are_skipped() {
        let registry = registry("p1\t/data/p1.vcf\t\t/data/p1.rna\tA\n").unwrap();
        let (jobs, skipped) = registry.jobs_for(&["p1", "ghost"]);
        assert!(jobs.is_empty());
        assert_eq!(
            skipped,
            vec![
                SkippedParticipant {
                    participant_id: "p1".into(),
                    reason: SkipReason::EmptyPath("dna_allcount_path"),
                },
                SkippedParticipant {
                    participant_id: "ghost".into(),
                    reason: SkipReason::NotRegistered,
                },
            ]
        );
    }

    #[test]
    fn repeated_request_is_queued_once() {
        let registry = registry("p1\ta.vcf\ta.dna\ta.rna\tA\n").unwrap();
        let (jobs, skipped) = registry.jobs_for(&["p1", "p1"]);
        assert_eq!(jobs.len(), 1);
        assert!(skipped.is_empty());
    }

    #[test]
    fn duplicate_registry_entry_is_rejected() {
        let err = registry("p1\ta.vcf\ta.dna\ta.rna\tA\np1\tb.vcf\tb.dna\tb.rna\tA\n").unwrap_err();
        match err {
            RegistryError::DuplicateParticipant { participant_id, .. } => assert_eq!(participant_id, "p1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_column_is_a_parse_error() {
        let text = "participant_id\tvcf_path\np1\ta.vcf\n";
        let err = Registry::from_reader(Path::new("r.tsv"), text.as_bytes()).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }), "{err}");
    }

    #[test]
    fn load_reads_from_disk_and_reports_missing_files() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "p9\tx.vcf\tx.dna\tx.rna\tC").unwrap();
        let registry = Registry::load(file.path()).unwrap();
        assert_eq!(registry.jobs_for(&["p9"]).0.len(), 1);

        let missing = file.path().with_extension("absent");
        assert!(matches!(
            Registry::load(&missing),
            Err(RegistryError::NotFound { .. })
        ));
    }
}
