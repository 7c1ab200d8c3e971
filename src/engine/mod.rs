//! Two-pass block transform engine.
//!
//! # Stage A: downsample
//! Every block is walked in 2-byte units with a `passing` flag that starts
//! `true` at each block and flips after every unit.  Passing units are
//! written twice, the others are dropped, so the output keeps the input's
//! length (give or take one unit) while losing every other sample.
//!
//! # Stage B: distortion
//! The Stage A output is re-read in blocks.  Each block gets one effect from
//! [`crate::effect`], picked by a single draw from the injected
//! [`RandomSource`].  Outputs are appended in block order.
//!
//! Both stages stream: they read from any [`Read`] and write to any
//! [`Write`], holding one block in memory at a time.

use std::io::{self, Cursor, Read, Write};
use thiserror::Error;
use tracing::debug;

use crate::block::{duplicate_unit, BlockReader, BLOCK_SIZE, SAMPLE_WIDTH};
use crate::effect::{choose_effect, get_effect, EffectId};
use crate::random::RandomSource;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Malformed container: block {block} has {len} bytes, which ends mid-sample")]
    MalformedContainer { block: u64, len: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Stats ────────────────────────────────────────────────────────────────────

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    pub blocks:    u64,
    pub bytes_in:  u64,
    pub bytes_out: u64,
    /// Per-effect block counts (Stage B only), indexed like [`EffectId::ALL`].
    pub effects:   [u64; 4],
}

impl PassStats {
    pub fn effect_count(&self, id: EffectId) -> u64 {
        EffectId::ALL
            .iter()
            .position(|&e| e == id)
            .map(|i| self.effects[i])
            .unwrap_or(0)
    }

    fn record_effect(&mut self, id: EffectId) {
        if let Some(i) = EffectId::ALL.iter().position(|&e| e == id) {
            self.effects[i] += 1;
        }
    }
}

// ── Block-level transforms ───────────────────────────────────────────────────

/// Stage A on one block, appended to `out`.  Returns the number of passing
/// units.
pub fn downsample_block_into(block: &[u8], out: &mut Vec<u8>) -> usize {
    let mut passing = true;
    let mut kept = 0;
    for unit in block.chunks_exact(SAMPLE_WIDTH) {
        if passing {
            duplicate_unit(out, unit, 2);
            kept += 1;
        }
        passing = !passing;
    }
    kept
}

pub fn downsample_block(block: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(block.len() + SAMPLE_WIDTH * 2);
    downsample_block_into(block, &mut out);
    out
}

/// Stage B on one block: draw an effect and apply it.
pub fn distort_block(block: &[u8], rng: &mut dyn RandomSource) -> (EffectId, Vec<u8>) {
    let id = choose_effect(rng);
    (id, get_effect(id).apply(block, rng))
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct GlitchEngine<S: RandomSource> {
    rng:        S,
    block_size: usize,
}

impl<S: RandomSource> GlitchEngine<S> {
    pub fn new(rng: S) -> Self {
        Self::with_block_size(rng, BLOCK_SIZE)
    }

    /// `block_size` must be even; [`crate::glitcher::GlitchOptions`] checks
    /// this before building an engine.
    pub fn with_block_size(rng: S, block_size: usize) -> Self {
        Self { rng, block_size: block_size.max(SAMPLE_WIDTH) }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Stage A over a whole payload stream.
    pub fn downsample_pass<R: Read, W: Write>(
        &mut self,
        payload: R,
        out:     &mut W,
    ) -> Result<PassStats, EngineError> {
        let mut blocks = BlockReader::new(payload, self.block_size);
        let mut stats  = PassStats::default();
        let mut buf    = Vec::with_capacity(self.block_size + SAMPLE_WIDTH * 2);

        while let Some(block) = blocks.next_block()? {
            stats.blocks += 1;
            if block.len() % SAMPLE_WIDTH != 0 {
                return Err(EngineError::MalformedContainer { block: stats.blocks, len: block.len() });
            }
            buf.clear();
            downsample_block_into(block, &mut buf);
            out.write_all(&buf)?;
            stats.bytes_in  += block.len() as u64;
            stats.bytes_out += buf.len() as u64;
        }
        debug!(blocks = stats.blocks, bytes_in = stats.bytes_in, bytes_out = stats.bytes_out, "downsample pass done");
        Ok(stats)
    }

    /// Stage B over a whole stream.
    pub fn distortion_pass<R: Read, W: Write>(
        &mut self,
        input: R,
        out:   &mut W,
    ) -> Result<PassStats, EngineError> {
        let mut blocks = BlockReader::new(input, self.block_size);
        let mut stats  = PassStats::default();

        while let Some(block) = blocks.next_block()? {
            let (id, glitched) = distort_block(block, &mut self.rng);
            debug!(block = stats.blocks, effect = id.name(), len_in = block.len(), len_out = glitched.len());
            out.write_all(&glitched)?;
            stats.blocks    += 1;
            stats.bytes_in  += block.len() as u64;
            stats.bytes_out += glitched.len() as u64;
            stats.record_effect(id);
        }
        debug!(blocks = stats.blocks, bytes_in = stats.bytes_in, bytes_out = stats.bytes_out, "distortion pass done");
        Ok(stats)
    }

    /// Both stages back to back.  Returns the final payload.
    pub fn run<R: Read>(&mut self, payload: R) -> Result<(Vec<u8>, PassStats, PassStats), EngineError> {
        let mut intermediate = Vec::new();
        let a = self.downsample_pass(payload, &mut intermediate)?;
        let mut glitched = Vec::with_capacity(intermediate.len());
        let b = self.distortion_pass(Cursor::new(intermediate), &mut glitched)?;
        Ok((glitched, a, b))
    }
}
