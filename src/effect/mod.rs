//! Per-block distortion effects and their weighted selection.
//!
//! # Selection
//! One draw from `0..20` per block picks the effect:
//!
//! | Draw      | Weight | Effect                 |
//! |-----------|-------:|------------------------|
//! | 1–4       |   4/20 | stutter loop           |
//! | 5–6       |   2/20 | variable duplication   |
//! | 7–10      |   4/20 | burst and skip         |
//! | 0, 11–19  |  10/20 | passthrough            |
//!
//! # Units
//! Effects that work per sample walk the block in [`SAMPLE_WIDTH`] units.
//! A trailing partial unit is dropped by those effects; the stutter loop and
//! passthrough work on raw bytes and keep it.

use tracing::debug;

use crate::block::{duplicate_unit, SAMPLE_WIDTH};
use crate::random::RandomSource;

/// Upper bound (exclusive) of the per-block selection draw.
pub const SELECTION_RANGE: u32 = 20;
/// Stutter loop count is drawn from `LOOPS_MIN..LOOPS_MAX`.
pub const LOOPS_MIN: u32 = 3;
pub const LOOPS_MAX: u32 = 10;
/// Units dropped by one non-passing step of burst and skip.
pub const BURST_SKIP_UNITS: usize = 4;
/// Copies written by one passing step of burst and skip.
pub const BURST_REPEAT: usize = 4;

// ── EffectId ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectId {
    StutterLoop,
    VariableDuplication,
    BurstSkip,
    Passthrough,
}

impl EffectId {
    pub const ALL: [EffectId; 4] = [
        EffectId::StutterLoop,
        EffectId::VariableDuplication,
        EffectId::BurstSkip,
        EffectId::Passthrough,
    ];

    /// Map a selection draw in `0..SELECTION_RANGE` to its effect.
    pub fn from_draw(draw: u32) -> Self {
        match draw {
            1..=4  => EffectId::StutterLoop,
            5 | 6  => EffectId::VariableDuplication,
            7..=10 => EffectId::BurstSkip,
            _      => EffectId::Passthrough,
        }
    }

    /// Number of draws out of [`SELECTION_RANGE`] that select this effect.
    pub fn weight(self) -> u32 {
        (0..SELECTION_RANGE).filter(|&d| Self::from_draw(d) == self).count() as u32
    }

    /// Human-readable name (logs and diagnostics).
    pub fn name(self) -> &'static str {
        match self {
            EffectId::StutterLoop         => "stutter-loop",
            EffectId::VariableDuplication => "variable-duplication",
            EffectId::BurstSkip           => "burst-skip",
            EffectId::Passthrough         => "passthrough",
        }
    }
}

/// Draw once and pick an effect for the next block.
pub fn choose_effect(rng: &mut dyn RandomSource) -> EffectId {
    EffectId::from_draw(rng.next_in_range(0, SELECTION_RANGE))
}

// ── Effect trait ─────────────────────────────────────────────────────────────

pub trait Effect {
    fn effect_id(&self) -> EffectId;
    /// Transform one block.  The output length is independent of the input's.
    fn apply(&self, block: &[u8], rng: &mut dyn RandomSource) -> Vec<u8>;
}

/// Split at one eighth; repeat the head `loops + 1` times, then the rest once.
pub struct StutterLoop;
impl Effect for StutterLoop {
    fn effect_id(&self) -> EffectId { EffectId::StutterLoop }
    fn apply(&self, block: &[u8], rng: &mut dyn RandomSource) -> Vec<u8> {
        let loops = rng.next_in_range(LOOPS_MIN, LOOPS_MAX) as usize;
        debug!(loops, frag = block.len() / 8, "stutter loop");
        stutter_loop(block, loops)
    }
}

/// Each unit is dropped, doubled or tripled at random.
pub struct VariableDuplication;
impl Effect for VariableDuplication {
    fn effect_id(&self) -> EffectId { EffectId::VariableDuplication }
    fn apply(&self, block: &[u8], rng: &mut dyn RandomSource) -> Vec<u8> {
        let mut out = Vec::with_capacity(block.len() * 2);
        for unit in block.chunks_exact(SAMPLE_WIDTH) {
            match rng.next_in_range(0, 3) {
                1 => duplicate_unit(&mut out, unit, 2),
                2 => duplicate_unit(&mut out, unit, 3),
                _ => {}
            }
        }
        out
    }
}

/// Alternate between a four-copy burst of one unit and dropping four units.
pub struct BurstSkip;
impl Effect for BurstSkip {
    fn effect_id(&self) -> EffectId { EffectId::BurstSkip }
    fn apply(&self, block: &[u8], _rng: &mut dyn RandomSource) -> Vec<u8> {
        burst_skip(block)
    }
}

pub struct Passthrough;
impl Effect for Passthrough {
    fn effect_id(&self) -> EffectId { EffectId::Passthrough }
    fn apply(&self, block: &[u8], _rng: &mut dyn RandomSource) -> Vec<u8> {
        block.to_vec()
    }
}

// ── Effect bodies ────────────────────────────────────────────────────────────

/// Stutter with a fixed loop count.  Output length is
/// `frag * (loops + 1) + (len - frag)` where `frag = len / 8`.
pub fn stutter_loop(block: &[u8], loops: usize) -> Vec<u8> {
    let (frag, tail) = block.split_at(block.len() / 8);
    let mut out = Vec::with_capacity(frag.len() * (loops + 1) + tail.len());
    duplicate_unit(&mut out, frag, loops + 1);
    out.extend_from_slice(tail);
    out
}

pub fn burst_skip(block: &[u8]) -> Vec<u8> {
    let units: Vec<&[u8]> = block.chunks_exact(SAMPLE_WIDTH).collect();
    let mut out = Vec::with_capacity(block.len() * 2);
    let mut passing = true;
    let mut i = 0;
    while i < units.len() {
        if passing {
            duplicate_unit(&mut out, units[i], BURST_REPEAT);
            i += 1;
        } else {
            i += BURST_SKIP_UNITS;
        }
        passing = !passing;
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────────────────

pub fn get_effect(id: EffectId) -> Box<dyn Effect> {
    match id {
        EffectId::StutterLoop         => Box::new(StutterLoop),
        EffectId::VariableDuplication => Box::new(VariableDuplication),
        EffectId::BurstSkip           => Box::new(BurstSkip),
        EffectId::Passthrough         => Box::new(Passthrough),
    }
}
