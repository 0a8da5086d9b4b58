//! Reader for per-base mapped-read-count ("allcount") files.
//!
//! ```text
//! CountReadsCovering v<version> <anything>
//! NumberOfMappedReads\t<count>
//! NumberOfContigs\t<n>
//! <contig>\t<length>            (n lines)
//! ><contig>                     starts a contig; the next locus is 1
//! x<hex>                        skips <hex> loci
//! <hex>                         read count at the current locus, then locus += 1
//! <TERMINATOR>                  mandatory last line
//! ```
//!
//! Counts and skips are hexadecimal. Loci that are skipped are not reported.

use crate::shared::files::{SourceError, TextSource, open_text_source};
use ahash::AHashSet;
use std::path::{Path, PathBuf};
use std::str;
use thiserror::Error;

const MAGIC_PREFIX: &str = "CountReadsCovering v";
const MAPPED_READS_KEY: &str = "NumberOfMappedReads";
const CONTIG_COUNT_KEY: &str = "NumberOfContigs";
const TERMINATOR: &str = "**done**";

#[derive(Debug, Error)]
pub enum AllcountError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("bad header format in {} at line {line}: {message}", path.display())]
    Header {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("bad internal format or truncation in {} at line {line}: {message}", path.display())]
    Body {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigEntry {
    pub name: String,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllcountHeader {
    pub version: String,
    pub total_mapped_reads: u64,
    pub contigs: Vec<ContigEntry>,
}

impl AllcountHeader {
    pub fn contig_count(&self) -> usize {
        self.contigs.len()
    }

    /// Sum of the contig lengths listed in the header.
    pub fn total_contig_length(&self) -> u64 {
        self.contigs.iter().map(|contig| contig.length).sum()
    }
}

/// One per-base observation from the body of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageRecord<'a> {
    pub contig: &'a str,
    pub locus: i64,
    pub mapped_reads: u32,
    /// Line of the file the record came from.
    pub line: usize,
}

pub struct AllcountReader {
    source: Box<dyn TextSource>,
    header: AllcountHeader,
}

impl std::fmt::Debug for AllcountReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllcountReader")
            .field("path", &self.source.path())
            .field("header", &self.header)
            .finish()
    }
}

impl AllcountReader {
    /// Opens the file and validates its header.
    pub fn open(path: &Path) -> Result<Self, AllcountError> {
        Self::from_source(open_text_source(path)?)
    }

    pub fn from_source(mut source: Box<dyn TextSource>) -> Result<Self, AllcountError> {
        let header = read_header(source.as_mut())?;
        Ok(Self { source, header })
    }

    pub fn header(&self) -> &AllcountHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    /// Streams every body record through `on_record`, in file order. Returns
    /// the number of records delivered. An error from the callback stops the
    /// stream and is returned as is.
    pub fn for_each_record<E, F>(mut self, mut on_record: F) -> Result<u64, E>
    where
        E: From<AllcountError>,
        F: FnMut(CoverageRecord<'_>) -> Result<(), E>,
    {
        let known: AHashSet<&str> = self.header.contigs.iter().map(|c| c.name.as_str()).collect();
        let path = self.source.path().to_path_buf();
        let body_error = |line: usize, message: String| AllcountError::Body {
            path: path.clone(),
            line,
            message,
        };

        let mut contig: Option<String> = None;
        let mut locus: i64 = 1;
        let mut delivered = 0u64;
        let mut done = false;
        let mut line_number = self.source.line_number();

        while let Some(raw) = self.source.next_line().map_err(AllcountError::from)? {
            line_number += 1;
            let line = str::from_utf8(raw)
                .map_err(|e| body_error(line_number, format!("not valid UTF-8: {e}")))?;

            if done {
                return Err(body_error(line_number, format!("data after {TERMINATOR}")).into());
            }
            if line == TERMINATOR {
                done = true;
                continue;
            }

            if let Some(name) = line.strip_prefix('>') {
                if !known.contains(name) {
                    return Err(body_error(
                        line_number,
                        format!("contig '{name}' is not listed in the header"),
                    )
                    .into());
                }
                contig = Some(name.to_string());
                locus = 1;
                continue;
            }

            let Some(current) = contig.as_deref() else {
                return Err(body_error(line_number, "record before any contig line".into()).into());
            };

            if let Some(skip) = line.strip_prefix('x') {
                let skip = parse_hex(skip)
                    .ok_or_else(|| body_error(line_number, format!("invalid skip '{line}'")))?;
                locus = locus.saturating_add(i64::from(skip));
                continue;
            }

            let mapped_reads = parse_hex(line)
                .ok_or_else(|| body_error(line_number, format!("invalid count '{line}'")))?;
            on_record(CoverageRecord {
                contig: current,
                locus,
                mapped_reads,
                line: line_number,
            })?;
            delivered += 1;
            locus += 1;
        }

        if !done {
            let line = self.source.line_number();
            return Err(body_error(line, format!("missing {TERMINATOR} terminator")).into());
        }
        Ok(delivered)
    }
}

fn parse_hex(text: &str) -> Option<u32> {
    if text.is_empty() {
        return None;
    }
    u32::from_str_radix(text, 16).ok()
}

fn read_header(source: &mut dyn TextSource) -> Result<AllcountHeader, AllcountError> {
    let path = source.path().to_path_buf();
    let header_error = |line: usize, message: String| AllcountError::Header {
        path: path.clone(),
        line,
        message,
    };

    let mut next_header_line = |what: &str| -> Result<(String, usize), AllcountError> {
        let raw = source.next_line()?.map(<[u8]>::to_vec);
        let line = source.line_number();
        let raw = raw.ok_or_else(|| header_error(line, format!("file ended before the {what}")))?;
        let text = String::from_utf8(raw)
            .map_err(|e| header_error(line, format!("not valid UTF-8: {e}")))?;
        Ok((text, line))
    };

    let (banner, line) = next_header_line("banner line")?;
    let version = banner
        .strip_prefix(MAGIC_PREFIX)
        .and_then(|rest| rest.split_whitespace().next())
        .ok_or_else(|| header_error(line, format!("expected a line starting with '{MAGIC_PREFIX}'")))?
        .to_string();

    let (text, line) = next_header_line(MAPPED_READS_KEY)?;
    let total_mapped_reads = parse_keyed_count(&text, MAPPED_READS_KEY)
        .ok_or_else(|| header_error(line, format!("expected '{MAPPED_READS_KEY}\\t<count>'")))?;

    let (text, line) = next_header_line(CONTIG_COUNT_KEY)?;
    let contig_count = parse_keyed_count(&text, CONTIG_COUNT_KEY)
        .ok_or_else(|| header_error(line, format!("expected '{CONTIG_COUNT_KEY}\\t<count>'")))?;

    let mut contigs = Vec::new();
    for _ in 0..contig_count {
        let (text, line) = next_header_line("end of the contig table")?;
        let entry = text
            .split_once('\t')
            .and_then(|(name, length)| {
                let length = lexical_core::parse::<u64>(length.as_bytes()).ok()?;
                (!name.is_empty()).then(|| ContigEntry {
                    name: name.to_string(),
                    length,
                })
            })
            .ok_or_else(|| header_error(line, format!("invalid contig entry '{text}'")))?;
        contigs.push(entry);
    }

    Ok(AllcountHeader {
        version,
        total_mapped_reads,
        contigs,
    })
}

fn parse_keyed_count(text: &str, key: &str) -> Option<u64> {
    let (found, value) = text.split_once('\t')?;
    if found != key {
        return None;
    }
    lexical_core::parse::<u64>(value.trim().as_bytes()).ok()
}
