//! Speech synthesis collaborator.
//!
//! The glitcher only needs a finite, seekable container to work on.  Anything
//! that turns text into one implements [`Synthesizer`].  [`CommandSynthesizer`]
//! drives a host TTS program that writes a wave file to stdout.
//!
//! Host programs usually emit the canonical 44-byte header (16-byte `fmt `
//! chunk).  [`widen_canonical_header`] rewrites that into the 46-byte dialect
//! the header codec expects.

use std::fmt;
use std::io::{self, Cursor};
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::{debug, info};

use crate::header::HEADER_SIZE;

/// Length of the canonical wave header with a 16-byte `fmt ` chunk.
pub const CANONICAL_HEADER_SIZE: usize = 44;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Unsupported locale '{0}' (supported: en-US, fr-FR)")]
    UnsupportedLocale(String),
    #[error("No voice available for {locale}: {reason}")]
    VoiceUnavailable { locale: Locale, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Locale ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    EnUs,
    FrFr,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::EnUs, Locale::FrFr];

    pub fn tag(self) -> &'static str {
        match self {
            Locale::EnUs => "en-US",
            Locale::FrFr => "fr-FR",
        }
    }

    /// Voice name passed to espeak-style programs.
    pub fn voice(self) -> &'static str {
        match self {
            Locale::EnUs => "en-us",
            Locale::FrFr => "fr-fr",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Locale {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locale::ALL
            .iter()
            .copied()
            .find(|l| l.tag() == s)
            .ok_or_else(|| SynthError::UnsupportedLocale(s.to_string()))
    }
}

// ── Synthesizer ──────────────────────────────────────────────────────────────

pub trait Synthesizer {
    /// Speak `text` and return the resulting container.
    fn synthesize(&self, text: &str, locale: Locale) -> Result<Cursor<Vec<u8>>, SynthError>;
}

/// Runs `<program> --stdout -v <voice> <text>` and captures stdout.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    pub program: String,
}

impl Default for CommandSynthesizer {
    fn default() -> Self {
        Self { program: "espeak-ng".to_string() }
    }
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn locate(&self, locale: Locale) -> Result<PathBuf, SynthError> {
        which::which(&self.program).map_err(|e| SynthError::VoiceUnavailable {
            locale,
            reason: format!("{}: {e}", self.program),
        })
    }
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize(&self, text: &str, locale: Locale) -> Result<Cursor<Vec<u8>>, SynthError> {
        let program = self.locate(locale)?;
        debug!(program = %program.display(), voice = locale.voice(), "running synthesizer");

        let output = Command::new(&program)
            .arg("--stdout")
            .arg("-v")
            .arg(locale.voice())
            .arg(text)
            .output()?;

        if !output.status.success() {
            return Err(SynthError::VoiceUnavailable {
                locale,
                reason: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        info!(bytes = output.stdout.len(), locale = %locale, "synthesized");
        Ok(Cursor::new(widen_canonical_header(output.stdout)))
    }
}

// ── Header widening ──────────────────────────────────────────────────────────

/// Convert a canonical 44-byte-header container into the 46-byte dialect.
///
/// Two zero bytes are inserted at offset 36 and `formatChunkSize` becomes 18.
/// Both size fields are then set from the buffer length: programs writing to
/// a pipe cannot seek back to fill them in, so they carry placeholders.
///
/// Only a `fmt ` chunk of 16 bytes followed directly by `data` is widened.
/// Anything else (an 18-byte `fmt ` chunk, an extra chunk such as `LIST`, or
/// a buffer too short for a header) is returned unchanged.
pub fn widen_canonical_header(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.len() < CANONICAL_HEADER_SIZE
        || LittleEndian::read_u32(&bytes[16..20]) != 16
        || &bytes[36..40] != b"data"
    {
        return bytes;
    }
    LittleEndian::write_u32(&mut bytes[16..20], 18);
    let tail = bytes.split_off(36);
    bytes.resize(36 + HEADER_SIZE - CANONICAL_HEADER_SIZE, 0);
    bytes.extend_from_slice(&tail);

    let chunk_size = u32::try_from(bytes.len() - 8).unwrap_or(u32::MAX);
    let data_size = u32::try_from(bytes.len() - HEADER_SIZE).unwrap_or(u32::MAX);
    debug!(
        chunk_size,
        data_size,
        declared_data = LittleEndian::read_u32(&bytes[42..46]),
        "widened canonical header"
    );
    LittleEndian::write_u32(&mut bytes[4..8], chunk_size);
    LittleEndian::write_u32(&mut bytes[42..46], data_size);
    bytes
}
