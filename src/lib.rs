pub mod header;
pub mod block;
pub mod effect;
pub mod random;
pub mod engine;
pub mod rehydrate;
pub mod synth;
pub mod glitcher;

pub use header::{HeaderField, HeaderTable, FieldValue, parse_header, serialize_header, FULL_HEADER, HEADER_SIZE};
pub use block::{BLOCK_SIZE, SAMPLE_WIDTH};
pub use effect::EffectId;
pub use random::{RandomSource, PcgSource, FixedSequence};
pub use engine::GlitchEngine;
pub use glitcher::{GlitchOptions, GlitchError, glitch_file, glitch_stream};
pub use synth::{Locale, Synthesizer};
