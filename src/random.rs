//! Injected randomness.
//!
//! Every random decision in the engine goes through [`RandomSource`], so a
//! run is fully determined by the source it is handed.  Production runs use
//! [`PcgSource`]; tests script exact draws with [`FixedSequence`].

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::collections::VecDeque;

pub trait RandomSource {
    /// Uniform integer in `low..high`.  `high` must be greater than `low`.
    fn next_in_range(&mut self, low: u32, high: u32) -> u32;
}

impl<T: RandomSource + ?Sized> RandomSource for &mut T {
    fn next_in_range(&mut self, low: u32, high: u32) -> u32 {
        (**self).next_in_range(low, high)
    }
}

// ── PCG32 ────────────────────────────────────────────────────────────────────

/// PCG32-backed source, seeded once per run.
#[derive(Debug, Clone)]
pub struct PcgSource(Pcg32);

impl PcgSource {
    pub fn from_seed(seed: u64) -> Self {
        Self(Pcg32::seed_from_u64(seed))
    }

    /// Seed from OS entropy.  Runs are not reproducible.
    pub fn from_entropy() -> Self {
        Self(Pcg32::from_entropy())
    }
}

impl RandomSource for PcgSource {
    fn next_in_range(&mut self, low: u32, high: u32) -> u32 {
        self.0.gen_range(low..high)
    }
}

// ── Scripted ─────────────────────────────────────────────────────────────────

/// Replays a fixed list of draws, then a fallback value forever.
///
/// Each scripted value is clamped into the requested range so a script
/// written for one call site cannot produce an out-of-range draw at another.
#[derive(Debug, Clone)]
pub struct FixedSequence {
    values:   VecDeque<u32>,
    fallback: u32,
}

impl FixedSequence {
    pub fn new<I: IntoIterator<Item = u32>>(values: I) -> Self {
        Self { values: values.into_iter().collect(), fallback: 0 }
    }

    /// Value returned once the script is exhausted.
    pub fn with_fallback(mut self, fallback: u32) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl RandomSource for FixedSequence {
    fn next_in_range(&mut self, low: u32, high: u32) -> u32 {
        let v = self.values.pop_front().unwrap_or(self.fallback);
        v.clamp(low, high.saturating_sub(1).max(low))
    }
}
