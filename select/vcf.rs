//! The variant stream filter.
//!
//! Parses single-sample VCF data lines of a fixed 10-column shape and decides,
//! line by line, whether a record is a germline control candidate. The filter
//! keeps just enough state to enforce per-chromosome ordering and the isolation
//! distance against the previous line.

use crate::types::{
    ALLELE_BALANCE_BOUNDS, ISOLATION_DISTANCE, MIN_ODDS, REQUIRED_ALLELE_COUNT,
    REQUIRED_ALLELE_FREQUENCY, REQUIRED_ALLELE_NUMBER, REQUIRED_CIGAR,
};
use ahash::AHashSet;
use memchr::memchr_iter;
use thiserror::Error;

const VCF_FIELD_COUNT: usize = 10;
const CHROM_FIELD: usize = 0;
const POS_FIELD: usize = 1;
const INFO_FIELD: usize = 7;

/// INFO keys every data line must carry.
pub const REQUIRED_INFO_KEYS: [&str; 7] = ["AN", "AC", "CIGAR", "DP", "AF", "AB", "ODDS"];

/// Why a single variant line could not be used. Any of these makes the whole
/// file unusable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("wrong number of fields ({found} != 10)")]
    FieldCount { found: usize },
    #[error("invalid locus '{0}'")]
    InvalidLocus(String),
    #[error("unable to parse info field '{0}'")]
    InfoEntry(String),
    #[error("info key '{0}' appears more than once")]
    DuplicateInfoKey(String),
    #[error("missing required info field '{0}'")]
    MissingInfoKey(&'static str),
    #[error("invalid value '{value}' for info field '{key}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("out-of-order variant: locus {locus} follows {previous}")]
    OutOfOrder { locus: i64, previous: i64 },
    #[error("chromosome '{0}' appears in more than one block")]
    NonContiguousChromosome(String),
}

/// A data line after the filter has looked at it.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredVariant<'a> {
    /// Chromosome as written in the file.
    pub chromosome: &'a str,
    pub locus: i64,
    pub line: &'a str,
    /// True for the first data line of a chromosome.
    pub starts_chromosome: bool,
    /// The record's odds when it passed every acceptance check.
    pub accepted: Option<f64>,
}

/// The seven required INFO values of one line, still unparsed.
#[derive(Debug, Default)]
struct RequiredInfo<'a> {
    an: Option<&'a str>,
    ac: Option<&'a str>,
    cigar: Option<&'a str>,
    dp: Option<&'a str>,
    af: Option<&'a str>,
    ab: Option<&'a str>,
    odds: Option<&'a str>,
}

impl<'a> RequiredInfo<'a> {
    fn parse(info: &'a str) -> Result<Self, RecordError> {
        let mut required = Self::default();
        let mut seen: Vec<&str> = Vec::with_capacity(16);

        for entry in info.split(';') {
            let mut parts = entry.split('=');
            let (key, value) = match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => (key, value),
                _ => return Err(RecordError::InfoEntry(entry.to_string())),
            };
            if seen.contains(&key) {
                return Err(RecordError::DuplicateInfoKey(key.to_string()));
            }
            seen.push(key);

            let slot = match key {
                "AN" => &mut required.an,
                "AC" => &mut required.ac,
                "CIGAR" => &mut required.cigar,
                "DP" => &mut required.dp,
                "AF" => &mut required.af,
                "AB" => &mut required.ab,
                "ODDS" => &mut required.odds,
                _ => continue,
            };
            *slot = Some(value);
        }

        for (key, value) in REQUIRED_INFO_KEYS.iter().zip(required.values()) {
            if value.is_none() {
                return Err(RecordError::MissingInfoKey(*key));
            }
        }
        Ok(required)
    }

    fn values(&self) -> [Option<&'a str>; 7] {
        [
            self.an, self.ac, self.cigar, self.dp, self.af, self.ab, self.odds,
        ]
    }

    fn get(&self, key: &'static str) -> Result<&'a str, RecordError> {
        let value = match key {
            "AN" => self.an,
            "AC" => self.ac,
            "CIGAR" => self.cigar,
            "DP" => self.dp,
            "AF" => self.af,
            "AB" => self.ab,
            _ => self.odds,
        };
        value.ok_or(RecordError::MissingInfoKey(key))
    }

    fn float(&self, key: &'static str) -> Result<f64, RecordError> {
        let value = self.get(key)?;
        lexical_core::parse::<f64>(value.as_bytes()).map_err(|_| RecordError::InvalidNumber {
            key,
            value: value.to_string(),
        })
    }

    fn integer(&self, key: &'static str) -> Result<i64, RecordError> {
        let value = self.get(key)?;
        lexical_core::parse::<i64>(value.as_bytes()).map_err(|_| RecordError::InvalidNumber {
            key,
            value: value.to_string(),
        })
    }

    /// Applies the genotype/quality half of the predicate and returns the odds
    /// when it holds. Multi-allelic records (a comma in `AF`) are never
    /// candidates and their numeric fields are not inspected.
    fn candidate_odds(&self) -> Result<Option<f64>, RecordError> {
        if self.get("AF")?.contains(',') {
            return Ok(None);
        }

        let allele_frequency = self.float("AF")?;
        let allele_balance = self.float("AB")?;
        let allele_count = self.integer("AC")?;
        let allele_number = self.integer("AN")?;
        let odds = self.float("ODDS")?;

        let (balance_low, balance_high) = ALLELE_BALANCE_BOUNDS;
        let passes = allele_frequency == REQUIRED_ALLELE_FREQUENCY
            && allele_balance > balance_low
            && allele_balance < balance_high
            && allele_count == REQUIRED_ALLELE_COUNT
            && allele_number == REQUIRED_ALLELE_NUMBER
            && self.get("CIGAR")? == REQUIRED_CIGAR
            && odds > MIN_ODDS;

        Ok(passes.then_some(odds))
    }
}

/// Splits a line into exactly `VCF_FIELD_COUNT` tab-separated fields.
fn split_fields(line: &str) -> Result<[&str; VCF_FIELD_COUNT], RecordError> {
    let found = memchr_iter(b'\t', line.as_bytes()).count() + 1;
    if found != VCF_FIELD_COUNT {
        return Err(RecordError::FieldCount { found });
    }

    let mut fields = [""; VCF_FIELD_COUNT];
    for (slot, field) in fields.iter_mut().zip(line.split('\t')) {
        *slot = field;
    }
    Ok(fields)
}

/// Streaming filter state for one VCF.
#[derive(Debug)]
pub struct VariantStreamFilter {
    current_chromosome: Option<String>,
    last_locus: i64,
    finished_chromosomes: AHashSet<String>,
}

impl Default for VariantStreamFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl VariantStreamFilter {
    pub fn new() -> Self {
        Self {
            current_chromosome: None,
            last_locus: -ISOLATION_DISTANCE - 1,
            finished_chromosomes: AHashSet::new(),
        }
    }

    /// Looks at one line of the file. Header and comment lines yield `Ok(None)`;
    /// every other line is a data line, blank ones included.
    pub fn filter<'a>(&mut self, line: &'a str) -> Result<Option<FilteredVariant<'a>>, RecordError> {
        if line.starts_with('#') {
            return Ok(None);
        }

        let fields = split_fields(line)?;
        let chromosome = fields[CHROM_FIELD];
        let locus = lexical_core::parse::<i64>(fields[POS_FIELD].as_bytes())
            .map_err(|_| RecordError::InvalidLocus(fields[POS_FIELD].to_string()))?;
        let info = RequiredInfo::parse(fields[INFO_FIELD])?;
        let odds = info.candidate_odds()?;

        // Blocks are delimited by the name exactly as written.
        let starts_chromosome = self.current_chromosome.as_deref() != Some(chromosome);
        if starts_chromosome {
            if self.finished_chromosomes.contains(chromosome) {
                return Err(RecordError::NonContiguousChromosome(chromosome.to_string()));
            }
            if let Some(previous) = self.current_chromosome.replace(chromosome.to_string()) {
                self.finished_chromosomes.insert(previous);
            }
            self.last_locus = -ISOLATION_DISTANCE - 1;
        } else if locus < self.last_locus {
            return Err(RecordError::OutOfOrder {
                locus,
                previous: self.last_locus,
            });
        }

        let isolated = self.last_locus.saturating_add(ISOLATION_DISTANCE) < locus;
        self.last_locus = locus;

        Ok(Some(FilteredVariant {
            chromosome,
            locus,
            line,
            starts_chromosome,
            accepted: odds.filter(|_| isolated),
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a 10-column line with the given INFO values.
    pub(crate) fn vcf_line(chrom: &str, locus: i64, af: &str, ab: &str, odds: &str) -> String {
        format!(
            "{chrom}\t{locus}\t.\tA\tG\t50\tPASS\tAN=2;AC=1;CIGAR=1X;DP=30;AF={af};AB={ab};ODDS={odds}\tGT:DP\t0/1:30"
        )
    }

    pub(crate) fn good_line(chrom: &str, locus: i64, odds: f64) -> String {
        vcf_line(chrom, locus, "0.5", "0.5", &odds.to_string())
    }

    fn decide(filter: &mut VariantStreamFilter, line: &str) -> Option<f64> {
        filter.filter(line).unwrap().unwrap().accepted
    }

    #[test]
    fn header_lines_are_skipped() {
        let mut filter = VariantStreamFilter::new();
        assert_eq!(filter.filter("##fileformat=VCFv4.1").unwrap(), None);
        assert_eq!(filter.filter("#CHROM\tPOS").unwrap(), None);
    }

    #[test]
    fn blank_line_is_a_malformed_record() {
        let mut filter = VariantStreamFilter::new();
        filter.filter(&good_line("chr1", 100, 30.0)).unwrap();
        assert_eq!(filter.filter("").unwrap_err(), RecordError::FieldCount { found: 1 });
    }

    #[test]
    fn qualifying_line_is_accepted_with_its_odds() {
        let mut filter = VariantStreamFilter::new();
        let line = good_line("chr1", 1000, 25.5);
        let decision = filter.filter(&line).unwrap().unwrap();
        assert_eq!(decision.chromosome, "chr1");
        assert_eq!(decision.locus, 1000);
        assert!(decision.starts_chromosome);
        assert_eq!(decision.accepted, Some(25.5));
    }

    #[test]
    fn each_predicate_clause_rejects() {
        let rejected = [
            vcf_line("chr1", 1000, "0.49", "0.5", "30"),
            vcf_line("chr1", 2000, "0.5", "0.4", "30"),
            vcf_line("chr1", 3000, "0.5", "0.6", "30"),
            vcf_line("chr1", 4000, "0.5", "0.5", "20"),
            good_line("chr1", 5000, 30.0).replace("AC=1", "AC=2"),
            good_line("chr1", 6000, 30.0).replace("AN=2", "AN=3"),
            good_line("chr1", 7000, 30.0).replace("CIGAR=1X", "CIGAR=2X"),
        ];
        let mut filter = VariantStreamFilter::new();
        for line in &rejected {
            assert_eq!(decide(&mut filter, line), None, "line should be rejected: {line}");
        }
        assert_eq!(decide(&mut filter, &good_line("chr1", 8000, 20.5)), Some(20.5));
    }

    #[test]
    fn multi_allelic_frequency_is_not_a_candidate_or_an_error() {
        let mut filter = VariantStreamFilter::new();
        let line = vcf_line("chr1", 1000, "0.5,0.5", "not-a-number", "30");
        assert_eq!(decide(&mut filter, &line), None);
    }

    #[test]
    fn isolation_counts_from_the_previous_line_even_if_rejected() {
        let mut filter = VariantStreamFilter::new();
        assert_eq!(decide(&mut filter, &vcf_line("chr1", 1000, "1", "0.5", "30")), None);
        assert_eq!(decide(&mut filter, &good_line("chr1", 1000 + ISOLATION_DISTANCE, 30.0)), None);
        assert_eq!(
            decide(&mut filter, &good_line("chr1", 1000 + 2 * ISOLATION_DISTANCE + 1, 30.0)),
            Some(30.0)
        );
    }

    #[test]
    fn chromosome_change_resets_isolation() {
        let mut filter = VariantStreamFilter::new();
        assert_eq!(decide(&mut filter, &good_line("chr1", 5000, 30.0)), Some(30.0));
        let chr2 = good_line("chr2", 10, 31.0);
        let decision = filter.filter(&chr2).unwrap().unwrap();
        assert!(decision.starts_chromosome);
        assert_eq!(decision.accepted, Some(31.0));
    }

    #[test]
    fn wrong_field_count_is_an_error() {
        let mut filter = VariantStreamFilter::new();
        let err = filter.filter("chr1\t100\t.\tA\tG").unwrap_err();
        assert_eq!(err, RecordError::FieldCount { found: 5 });
    }

    #[test]
    fn missing_required_info_key_is_an_error() {
        let mut filter = VariantStreamFilter::new();
        let line = good_line("chr1", 100, 30.0).replace("DP=30;", "");
        assert_eq!(filter.filter(&line).unwrap_err(), RecordError::MissingInfoKey("DP"));
    }

    #[test]
    fn malformed_info_entries_are_errors() {
        let mut filter = VariantStreamFilter::new();
        let flag = good_line("chr1", 100, 30.0).replace("DP=30", "DB");
        assert_eq!(filter.filter(&flag).unwrap_err(), RecordError::InfoEntry("DB".into()));

        let repeated = good_line("chr1", 100, 30.0).replace("DP=30", "DP=30;DP=31");
        assert_eq!(
            filter.filter(&repeated).unwrap_err(),
            RecordError::DuplicateInfoKey("DP".into())
        );
    }

    #[test]
    fn unparsable_numbers_are_errors() {
        let mut filter = VariantStreamFilter::new();
        let bad_odds = vcf_line("chr1", 100, "0.5", "0.5", "high");
        assert!(matches!(
            filter.filter(&bad_odds).unwrap_err(),
            RecordError::InvalidNumber { key: "ODDS", .. }
        ));

        let bad_locus = good_line("chr1", 100, 30.0).replacen("\t100\t", "\tabc\t", 1);
        assert_eq!(
            filter.filter(&bad_locus).unwrap_err(),
            RecordError::InvalidLocus("abc".into())
        );
    }

    #[test]
    fn decreasing_locus_on_one_chromosome_is_an_error() {
        let mut filter = VariantStreamFilter::new();
        filter.filter(&good_line("chr1", 500, 30.0)).unwrap();
        filter.filter(&good_line("chr1", 500, 30.0)).unwrap();
        assert_eq!(
            filter.filter(&good_line("chr1", 499, 30.0)).unwrap_err(),
            RecordError::OutOfOrder { locus: 499, previous: 500 }
        );
    }

    #[test]
    fn returning_to_a_finished_chromosome_is_an_error() {
        let mut filter = VariantStreamFilter::new();
        filter.filter(&good_line("chr1", 500, 30.0)).unwrap();
        filter.filter(&good_line("chr2", 500, 30.0)).unwrap();
        assert_eq!(
            filter.filter(&good_line("chr1", 9000, 30.0)).unwrap_err(),
            RecordError::NonContiguousChromosome("chr1".into())
        );
    }

    #[test]
    fn chromosome_case_change_starts_a_new_block() {
        let mut filter = VariantStreamFilter::new();
        filter.filter(&good_line("Chr1", 500, 30.0)).unwrap();
        let lower = good_line("chr1", 450, 30.0);
        let decision = filter.filter(&lower).unwrap().unwrap();
        assert!(decision.starts_chromosome);
        assert_eq!(decision.accepted, Some(30.0));
        assert_eq!(
            filter.filter(&good_line("Chr1", 9000, 30.0)).unwrap_err(),
            RecordError::NonContiguousChromosome("Chr1".into())
        );
    }

    #[test]
    fn loci_near_the_integer_limit_do_not_overflow() {
        let mut filter = VariantStreamFilter::new();
        let first = good_line("chr1", i64::MAX, 30.0);
        assert_eq!(decide(&mut filter, &first), Some(30.0));
        assert_eq!(decide(&mut filter, &first), None);
    }
}
