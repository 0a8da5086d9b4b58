//! Picks the variant each grain contributes to the output.

use crate::types::{CandidateVariant, Grain};

/// The highest-odds candidate of `grain` with enough DNA and RNA reads. Ties
/// go to the candidate accepted first.
pub fn best_candidate(grain: &Grain) -> Option<&CandidateVariant> {
    grain
        .candidates
        .iter()
        .filter(|candidate| candidate.reads.is_sufficient())
        .fold(None, |best: Option<&CandidateVariant>, candidate| match best {
            Some(current) if candidate.odds <= current.odds => Some(current),
            _ => Some(candidate),
        })
}

/// One selection per grain that has a qualifying candidate, in grain order.
pub fn select_best(grains: &[Grain]) -> Vec<&CandidateVariant> {
    grains.iter().filter_map(best_candidate).collect()
}

/// The output record for `candidate`, without a line terminator.
pub fn format_selection(candidate: &CandidateVariant) -> String {
    format!(
        "{}\t{}\t{}",
        candidate.chromosome, candidate.locus, candidate.line
    )
}
