//! High-level glitch API: the primary embedding surface.
//!
//! ```no_run
//! use wavglitch::glitcher::{glitch_file, GlitchOptions};
//!
//! let opts = GlitchOptions { seed: Some(7), ..GlitchOptions::default() };
//! let report = glitch_file("speech.wav", "speech-glitched.wav", &opts)?;
//! println!("{} -> {} bytes", report.sizes.total_before, report.sizes.total_after);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::block::{BLOCK_SIZE, SAMPLE_WIDTH};
use crate::effect::EffectId;
use crate::engine::{EngineError, GlitchEngine, PassStats};
use crate::header::{parse_header, HeaderError, HeaderField, HeaderTable, HEADER_SIZE};
use crate::random::{PcgSource, RandomSource};
use crate::rehydrate::{rehydrate, RehydrateError, SizeUpdate};
use crate::synth::{Locale, SynthError, Synthesizer};

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors from a glitch run.
///
/// Malformed input surfaces as [`GlitchError::MalformedContainer`] whether
/// the header codec or the engine caught it, and an unrepresentable size
/// field as [`GlitchError::SizeOutOfRange`].
#[derive(Error, Debug)]
pub enum GlitchError {
    #[error(transparent)]
    Header(HeaderError),
    #[error(transparent)]
    Synth(#[from] SynthError),
    #[error("Malformed container: {0}")]
    MalformedContainer(String),
    #[error("Unsupported sample format: {0} bits per sample (only 16-bit PCM is handled)")]
    UnsupportedSampleFormat(u16),
    #[error("{field} would become {value}, outside the u32 range")]
    SizeOutOfRange { field: &'static str, value: i64 },
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<HeaderError> for GlitchError {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::MalformedContainer(msg) => GlitchError::MalformedContainer(msg),
            HeaderError::Io(e) => GlitchError::Io(e),
            other => GlitchError::Header(other),
        }
    }
}

impl From<EngineError> for GlitchError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::MalformedContainer { block, len } => GlitchError::MalformedContainer(format!(
                "block {block} has {len} bytes, which ends mid-sample"
            )),
            EngineError::Io(e) => GlitchError::Io(e),
        }
    }
}

impl From<RehydrateError> for GlitchError {
    fn from(e: RehydrateError) -> Self {
        match e {
            RehydrateError::SizeOutOfRange { field, value } => GlitchError::SizeOutOfRange { field, value },
            RehydrateError::Header(e) => e.into(),
            RehydrateError::Io(e) => GlitchError::Io(e),
        }
    }
}

// ── GlitchOptions ────────────────────────────────────────────────────────────

/// Configuration for one glitch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlitchOptions {
    /// Bytes per engine block.  Must be non-zero and a whole number of samples.
    pub block_size: usize,
    /// Seed for the run's generator.  `None` seeds from OS entropy.
    pub seed:       Option<u64>,
}

impl Default for GlitchOptions {
    fn default() -> Self {
        Self { block_size: BLOCK_SIZE, seed: None }
    }
}

impl GlitchOptions {
    pub fn validate(&self) -> Result<(), GlitchError> {
        if self.block_size == 0 || self.block_size % SAMPLE_WIDTH != 0 {
            return Err(GlitchError::InvalidOptions(format!(
                "block size {} is not a positive multiple of {SAMPLE_WIDTH}",
                self.block_size
            )));
        }
        Ok(())
    }

    /// The run's generator, seeded once.
    pub fn random_source(&self) -> PcgSource {
        match self.seed {
            Some(seed) => PcgSource::from_seed(seed),
            None       => PcgSource::from_entropy(),
        }
    }
}

// ── Report ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GlitchReport {
    pub original:   HeaderTable,
    pub updated:    HeaderTable,
    pub sizes:      SizeUpdate,
    pub downsample: PassStats,
    pub distortion: PassStats,
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Check that the payload can be walked in 2-byte units.
pub fn check_sample_format(table: &HeaderTable) -> Result<(), GlitchError> {
    let bits = table.u16_field(HeaderField::BitsPerSample)?;
    if usize::from(bits) != SAMPLE_WIDTH * 8 {
        return Err(GlitchError::UnsupportedSampleFormat(bits));
    }
    Ok(())
}

/// Glitch a container using an explicit random source.
pub fn glitch_with_source<R, W, S>(
    input:      &mut R,
    out:        &mut W,
    block_size: usize,
    rng:        S,
) -> Result<GlitchReport, GlitchError>
where
    R: Read + Seek,
    W: Write,
    S: RandomSource,
{
    let total_before = input.seek(SeekFrom::End(0))?;
    let original = parse_header(input)?;
    debug!("parsed header:\n{original}");

    if original.text_field(HeaderField::ChunkId)? != "RIFF" {
        warn!(chunk_id = original.text_field(HeaderField::ChunkId)?, "unexpected chunk ID");
    }
    check_sample_format(&original)?;

    input.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
    let mut engine = GlitchEngine::with_block_size(rng, block_size);
    debug!(block_size = engine.block_size(), payload = total_before.saturating_sub(HEADER_SIZE as u64), "running engine");
    let (payload, downsample, distortion) = engine.run(&mut *input)?;

    let (updated, sizes) = rehydrate(&original, total_before, &payload, out)?;
    out.flush()?;

    info!(
        before = sizes.total_before,
        after = sizes.total_after,
        stutter = distortion.effect_count(EffectId::StutterLoop),
        duplicate = distortion.effect_count(EffectId::VariableDuplication),
        burst = distortion.effect_count(EffectId::BurstSkip),
        passthrough = distortion.effect_count(EffectId::Passthrough),
        "glitched container"
    );

    Ok(GlitchReport { original, updated, sizes, downsample, distortion })
}

/// Glitch a container from any seekable source into `out`.
pub fn glitch_stream<R, W>(input: &mut R, out: &mut W, opts: &GlitchOptions) -> Result<GlitchReport, GlitchError>
where
    R: Read + Seek,
    W: Write,
{
    opts.validate()?;
    glitch_with_source(input, out, opts.block_size, opts.random_source())
}

/// Glitch the file at `input` and write the result to `output`,
/// creating or truncating it.
pub fn glitch_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input:  P,
    output: Q,
    opts:   &GlitchOptions,
) -> Result<GlitchReport, GlitchError> {
    opts.validate()?;
    let mut src = File::open(input.as_ref())?;
    // Run fully before touching the output so a failure leaves it alone.
    let mut buf = Vec::new();
    let report = glitch_with_source(&mut src, &mut buf, opts.block_size, opts.random_source())?;
    let mut dst = BufWriter::new(File::create(output.as_ref())?);
    dst.write_all(&buf)?;
    dst.flush()?;
    info!(path = %output.as_ref().display(), "wrote output");
    Ok(report)
}

/// Synthesize `text` and glitch the result into `out`.
pub fn glitch_speech<W: Write>(
    synth:  &dyn Synthesizer,
    text:   &str,
    locale: Locale,
    out:    &mut W,
    opts:   &GlitchOptions,
) -> Result<GlitchReport, GlitchError> {
    opts.validate()?;
    let mut spoken = synth.synthesize(text, locale)?;
    glitch_with_source(&mut spoken, out, opts.block_size, opts.random_source())
}
