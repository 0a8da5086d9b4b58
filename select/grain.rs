//! The grain window manager.
//!
//! Candidates are held in two open windows: the live grain (the window of the
//! line being read) and the previous grain (the window seen just before it).
//! Both stay open because a later variant within `ISOLATION_DISTANCE` can still
//! evict their candidates. A grain is finalized once the scan has moved two
//! grains past it, or when the chromosome changes.

use crate::types::{CandidateVariant, Grain, grain_index};
use crate::vcf::FilteredVariant;

#[derive(Debug, Default)]
pub struct GrainWindowManager {
    current_chromosome: Option<String>,
    last_grain: i64,
    live: Option<Grain>,
    previous: Option<Grain>,
    finalized: Vec<Grain>,
}

impl GrainWindowManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one data line, in file order.
    pub fn observe(&mut self, variant: &FilteredVariant<'_>) {
        let grain = grain_index(variant.locus);
        let chromosome_changed = self.current_chromosome.as_deref() != Some(variant.chromosome);

        if chromosome_changed || grain != self.last_grain {
            let closed = self.previous.take();
            self.finalize(closed);
            self.previous = self.live.take();

            if chromosome_changed {
                // Isolation never spans chromosomes, so the promoted grain is done too.
                let stale = self.previous.take();
                self.finalize(stale);
                self.current_chromosome = Some(variant.chromosome.to_string());
            }
            self.live = Some(Grain::new(variant.chromosome, grain));
        }
        self.last_grain = grain;

        for open in [&mut self.live, &mut self.previous].into_iter().flatten() {
            open.evict_near(variant.locus);
        }

        if let (Some(odds), Some(live)) = (variant.accepted, self.live.as_mut()) {
            live.candidates.push(CandidateVariant::new(
                variant.chromosome,
                variant.locus,
                odds,
                variant.line,
            ));
        }
    }

    /// Number of grains closed so far.
    pub fn finalized_len(&self) -> usize {
        self.finalized.len()
    }

    /// Closes the remaining open grains and returns every grain that still
    /// holds a candidate, in the order the grains were closed.
    pub fn finish(mut self) -> Vec<Grain> {
        let previous = self.previous.take();
        self.finalize(previous);
        let live = self.live.take();
        self.finalize(live);
        self.finalized
    }

    fn finalize(&mut self, grain: Option<Grain>) {
        if let Some(grain) = grain.filter(|g| !g.candidates.is_empty()) {
            self.finalized.push(grain);
        }
    }
}
