use std::io::{Cursor, Seek, SeekFrom};
use std::fs;

use proptest::prelude::*;
use tempfile::NamedTempFile;
use wavglitch::engine::{distort_block, downsample_block, GlitchEngine};
use wavglitch::glitcher::{glitch_file, glitch_speech, glitch_stream, glitch_with_source, GlitchError, GlitchOptions};
use wavglitch::header::{parse_header, serialize_header, HeaderError, HeaderField, HeaderTable, HEADER_SIZE};
use wavglitch::rehydrate::rehydrate_to_vec;
use wavglitch::synth::{widen_canonical_header, Locale, SynthError, Synthesizer};
use wavglitch::{EffectId, FixedSequence, BLOCK_SIZE};

/// 46-byte-header mono 16-bit container around `payload`.
fn container(payload: &[u8], bits: u16) -> Vec<u8> {
    let mut v = Vec::with_capacity(HEADER_SIZE + payload.len());
    v.extend_from_slice(b"RIFF");
    v.extend_from_slice(&((HEADER_SIZE - 8 + payload.len()) as u32).to_le_bytes());
    v.extend_from_slice(b"WAVE");
    v.extend_from_slice(b"fmt ");
    v.extend_from_slice(&18u32.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes());
    v.extend_from_slice(&22050u32.to_le_bytes());
    v.extend_from_slice(&44100u32.to_le_bytes());
    v.extend_from_slice(&2u16.to_le_bytes());
    v.extend_from_slice(&bits.to_le_bytes());
    v.extend_from_slice(&[0, 0]);
    v.extend_from_slice(b"data");
    v.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    v.extend_from_slice(payload);
    v
}

/// Canonical 44-byte-header container with the given size fields.
fn canonical(payload: &[u8], chunk_size: u32, data_size: u32) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(b"RIFF");
    v.extend_from_slice(&chunk_size.to_le_bytes());
    v.extend_from_slice(b"WAVEfmt ");
    v.extend_from_slice(&16u32.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes());
    v.extend_from_slice(&1u16.to_le_bytes());
    v.extend_from_slice(&22050u32.to_le_bytes());
    v.extend_from_slice(&44100u32.to_le_bytes());
    v.extend_from_slice(&2u16.to_le_bytes());
    v.extend_from_slice(&16u16.to_le_bytes());
    v.extend_from_slice(b"data");
    v.extend_from_slice(&data_size.to_le_bytes());
    v.extend_from_slice(payload);
    v
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

// ── Header codec ─────────────────────────────────────────────────────────────

#[test]
fn test_parse_header_fields() {
    let bytes = container(&[0u8; 100], 16);
    let table = parse_header(&mut Cursor::new(bytes.clone())).unwrap();

    assert_eq!(table.len(), 13);
    assert_eq!(table.text_field(HeaderField::ChunkId).unwrap(), "RIFF");
    assert_eq!(table.text_field(HeaderField::Format).unwrap(), "WAVE");
    assert_eq!(table.text_field(HeaderField::FormatChunkId).unwrap(), "fmt ");
    assert_eq!(table.u32_field(HeaderField::ChunkSize).unwrap(), 138);
    assert_eq!(table.u32_field(HeaderField::FormatChunkSize).unwrap(), 18);
    assert_eq!(table.u16_field(HeaderField::NumChannels).unwrap(), 1);
    assert_eq!(table.u32_field(HeaderField::SamplesPerSec).unwrap(), 22050);
    assert_eq!(table.u16_field(HeaderField::BitsPerSample).unwrap(), 16);
    assert_eq!(table.text_field(HeaderField::DataChunkId).unwrap(), "data");
    assert_eq!(table.u32_field(HeaderField::DataChunkSize).unwrap(), 100);
    assert_eq!(&table.full_header()[..], &bytes[..HEADER_SIZE]);
}

#[test]
fn test_parse_header_restores_position() {
    let mut cur = Cursor::new(container(&[1u8; 64], 16));
    cur.seek(SeekFrom::Start(77)).unwrap();
    parse_header(&mut cur).unwrap();
    assert_eq!(cur.position(), 77);
}

#[test]
fn test_truncated_header_is_malformed() {
    let bytes = container(&[], 16);
    let mut cur = Cursor::new(bytes[..40].to_vec());
    cur.seek(SeekFrom::Start(12)).unwrap();
    let err = parse_header(&mut cur).unwrap_err();
    assert!(matches!(err, HeaderError::MalformedContainer(_)));
    assert_eq!(cur.position(), 12);
}

#[test]
fn test_lookup_by_name() {
    let table = parse_header(&mut Cursor::new(container(&[], 16))).unwrap();
    let entry = table.get_by_name("dataChunkID").unwrap();
    assert_eq!(entry.raw, b"data".to_vec());
    assert_eq!(table.raw_by_name("fullHeader").unwrap(), &table.full_header()[..]);
    assert_eq!(table.raw_by_name("chunkID").unwrap(), b"RIFF");
    assert!(matches!(table.raw_by_name("nope"), Err(HeaderError::UnknownField(_))));
    assert!(matches!(table.get_by_name("nope"), Err(HeaderError::UnknownField(_))));
}

#[test]
fn test_partial_table_serializes_zeros() {
    let table = HeaderTable::from_entries([
        (HeaderField::DataChunkId, b"data".to_vec()),
        (HeaderField::ChunkId, b"RIFF".to_vec()),
    ])
    .unwrap();
    let out = serialize_header(&table);
    assert_eq!(&out[0..4], b"RIFF");
    assert_eq!(&out[38..42], b"data");
    assert!(out[4..38].iter().all(|&b| b == 0));
    assert!(out[42..].iter().all(|&b| b == 0));
    assert_eq!(table.len(), 2);
    assert!(!table.is_empty());
    assert!(table.contains(HeaderField::DataChunkId));
    assert!(!table.contains(HeaderField::ChunkSize));
    assert!(matches!(table.get(HeaderField::ChunkSize), Err(HeaderError::UnknownField(_))));
    assert_eq!(table.full_header(), &out);
}

#[test]
fn test_with_field_returns_new_table() {
    let table = parse_header(&mut Cursor::new(container(&[0u8; 10], 16))).unwrap();
    let next = table.with_u32(HeaderField::DataChunkSize, 999).unwrap();
    assert_eq!(table.u32_field(HeaderField::DataChunkSize).unwrap(), 10);
    assert_eq!(next.u32_field(HeaderField::DataChunkSize).unwrap(), 999);
    assert_eq!(next.get(HeaderField::DataChunkSize).unwrap().raw, 999u32.to_le_bytes().to_vec());
}

fn header_bytes() -> impl Strategy<Value = [u8; HEADER_SIZE]> {
    prop::collection::vec(any::<u8>(), HEADER_SIZE).prop_map(|v| {
        let mut h = [0u8; HEADER_SIZE];
        h.copy_from_slice(&v);
        // 36..38 is not a field and always serializes as zero.
        h[36] = 0;
        h[37] = 0;
        h
    })
}

proptest! {
    #[test]
    fn prop_header_roundtrip(h in header_bytes()) {
        let table = parse_header(&mut Cursor::new(h.to_vec())).unwrap();
        prop_assert_eq!(serialize_header(&table), h);
    }

    #[test]
    fn prop_field_independence(h in header_bytes(), idx in 0usize..13, fill in any::<u8>()) {
        let field = HeaderField::ALL[idx];
        let spec = field.spec();
        let table = HeaderTable::from_bytes(&h);
        let changed = table.with_raw(field, &vec![fill; spec.len]).unwrap();
        let out = serialize_header(&changed);
        for i in 0..HEADER_SIZE {
            if i < spec.offset || i >= spec.offset + spec.len {
                prop_assert_eq!(out[i], h[i]);
            } else {
                prop_assert_eq!(out[i], fill);
            }
        }
    }

    #[test]
    fn prop_downsample_length(units in prop::collection::vec(any::<[u8; 2]>(), 0..2000)) {
        let block: Vec<u8> = units.iter().flatten().copied().collect();
        let out = downsample_block(&block);
        let passing = (units.len() + 1) / 2;
        prop_assert_eq!(out.len(), 4 * passing);
        prop_assert!(out.len() <= 2 * block.len());
    }

    #[test]
    fn prop_stutter_bound(block in prop::collection::vec(any::<u8>(), 0..4000), loops in 3u32..10) {
        let mut rng = FixedSequence::new([1, loops]);
        let (id, out) = distort_block(&block, &mut rng);
        prop_assert_eq!(id, EffectId::StutterLoop);
        let frag = block.len() / 8;
        prop_assert_eq!(out.len(), frag * (loops as usize + 1) + (block.len() - frag));
    }
}

// ── Engine scenarios ─────────────────────────────────────────────────────────

#[test]
fn test_stage_a_repeating_pattern() {
    let payload: Vec<u8> = [0x10u8, 0x20].iter().copied().cycle().take(44100).collect();
    let mut engine = GlitchEngine::new(FixedSequence::new(Vec::<u32>::new()));
    let mut out = Vec::new();
    let stats = engine.downsample_pass(&payload[..], &mut out).unwrap();

    assert_eq!(stats.blocks, 2);
    // 22050 units, every block has 11025 units of which 5513 pass
    let passing_units = 2 * 5513;
    assert_eq!(out.len(), 4 * passing_units);
    for window in out.chunks(4) {
        assert_eq!(window, &[0x10, 0x20, 0x10, 0x20]);
    }
}

#[test]
fn test_passthrough_block_is_identical() {
    let block: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i * 31 % 251) as u8).collect();
    for draw in [0u32, 11, 15, 19] {
        let mut rng = FixedSequence::new([draw]);
        let (id, out) = distort_block(&block, &mut rng);
        assert_eq!(id, EffectId::Passthrough);
        assert_eq!(out, block);
    }
}

// ── Rehydration ──────────────────────────────────────────────────────────────

#[test]
fn test_size_fields_keep_their_offset() {
    let input = container(&[5u8; 3000], 16);
    let table = parse_header(&mut Cursor::new(input.clone())).unwrap();
    let (out, update) = rehydrate_to_vec(&table, input.len() as u64, &[9u8; 1234]).unwrap();

    let chunk = read_u32(&out, 4);
    let data = read_u32(&out, 42);
    assert_eq!(update.chunk_size, chunk);
    assert_eq!(i64::from(chunk) - i64::from(data), 3038 - 3000);
    assert_eq!(data, 1234);
    assert_eq!(out.len(), HEADER_SIZE + 1234);
}

// ── End to end ───────────────────────────────────────────────────────────────

#[test]
fn test_empty_payload() {
    let input = container(&[], 16);
    let mut out = Vec::new();
    let opts = GlitchOptions { seed: Some(3), ..GlitchOptions::default() };
    let report = glitch_stream(&mut Cursor::new(input.clone()), &mut out, &opts).unwrap();

    assert_eq!(out.len(), HEADER_SIZE);
    assert_eq!(report.sizes.delta, 46 - input.len() as i64);
    assert_eq!(read_u32(&out, 42), 0);
    assert_eq!(&out[..], &input[..]);
}

#[test]
fn test_fixed_seed_is_deterministic() {
    let payload: Vec<u8> = (0..90_000u32).map(|i| (i % 253) as u8).collect();
    let input = container(&payload, 16);
    let opts = GlitchOptions { seed: Some(0xC0FFEE), ..GlitchOptions::default() };

    let mut a = Vec::new();
    let mut b = Vec::new();
    glitch_stream(&mut Cursor::new(input.clone()), &mut a, &opts).unwrap();
    glitch_stream(&mut Cursor::new(input.clone()), &mut b, &opts).unwrap();
    assert_eq!(a, b);

    let chunk = read_u32(&a, 4);
    let data = read_u32(&a, 42);
    assert_eq!(data as usize, a.len() - HEADER_SIZE);
    assert_eq!(chunk - data, 38);
}

#[test]
fn test_scripted_run_all_passthrough() {
    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 7) as u8).collect();
    let input = container(&payload, 16);
    let mut out = Vec::new();
    let rng = FixedSequence::new(Vec::<u32>::new()).with_fallback(12);
    let report = glitch_with_source(&mut Cursor::new(input), &mut out, BLOCK_SIZE, rng).unwrap();

    let mut expected = Vec::new();
    for block in payload.chunks(BLOCK_SIZE) {
        expected.extend(downsample_block(block));
    }
    assert_eq!(&out[HEADER_SIZE..], &expected[..]);
    assert_eq!(report.distortion.effect_count(EffectId::Passthrough), report.distortion.blocks);
}

#[test]
fn test_rejects_8_bit_input() {
    let input = container(&[0u8; 64], 8);
    let err = glitch_stream(&mut Cursor::new(input), &mut Vec::<u8>::new(), &GlitchOptions::default()).unwrap_err();
    assert!(matches!(err, GlitchError::UnsupportedSampleFormat(8)));
}

#[test]
fn test_rejects_odd_block_size() {
    let input = container(&[0u8; 64], 16);
    let opts = GlitchOptions { block_size: 22051, ..GlitchOptions::default() };
    let err = glitch_stream(&mut Cursor::new(input), &mut Vec::<u8>::new(), &opts).unwrap_err();
    assert!(matches!(err, GlitchError::InvalidOptions(_)));
}

#[test]
fn test_odd_payload_is_malformed() {
    let input = container(&[0u8; 65], 16);
    let err = glitch_stream(&mut Cursor::new(input), &mut Vec::<u8>::new(), &GlitchOptions::default()).unwrap_err();
    assert!(matches!(err, GlitchError::MalformedContainer(_)));
}

#[test]
fn test_truncated_input_is_malformed() {
    let input = container(&[], 16);
    let err = glitch_stream(&mut Cursor::new(input[..30].to_vec()), &mut Vec::<u8>::new(), &GlitchOptions::default())
        .unwrap_err();
    assert!(matches!(err, GlitchError::MalformedContainer(_)));
}

#[test]
fn test_shrinking_past_zero_size_is_out_of_range() {
    let mut input = container(&[3u8; 64], 16);
    input[4..8].copy_from_slice(&0u32.to_le_bytes());
    input[42..46].copy_from_slice(&0u32.to_le_bytes());
    // one Stage B block, burst-and-skip: 64 bytes become 56
    let rng = FixedSequence::new([8]);
    let mut out = Vec::new();
    let err = glitch_with_source(&mut Cursor::new(input), &mut out, BLOCK_SIZE, rng).unwrap_err();
    assert!(matches!(err, GlitchError::SizeOutOfRange { field: "chunkSize", value: -8 }));
    assert!(out.is_empty());
}

#[test]
fn test_glitch_file_roundtrip() {
    let src = NamedTempFile::new().unwrap();
    let dst = NamedTempFile::new().unwrap();
    let payload: Vec<u8> = (0..30_000u32).map(|i| (i * 7 % 256) as u8).collect();
    fs::write(src.path(), container(&payload, 16)).unwrap();

    let opts = GlitchOptions { seed: Some(11), ..GlitchOptions::default() };
    let report = glitch_file(src.path(), dst.path(), &opts).unwrap();

    let written = fs::read(dst.path()).unwrap();
    assert_eq!(written.len() as u64, report.sizes.total_after);
    let table = parse_header(&mut Cursor::new(written.clone())).unwrap();
    assert_eq!(table.u32_field(HeaderField::DataChunkSize).unwrap(), report.sizes.data_chunk_size);
    assert_eq!(report.sizes.data_chunk_size as usize, written.len() - HEADER_SIZE);
    assert!(report.updated.iter().eq(table.iter()));
    assert_eq!(&report.updated.full_header()[..], &written[..HEADER_SIZE]);
    assert_eq!(table.text_field(HeaderField::ChunkId).unwrap(), "RIFF");
}

/// Hands back a fixed piped-TTS buffer.
struct CannedSpeech(Vec<u8>);

impl Synthesizer for CannedSpeech {
    fn synthesize(&self, _text: &str, _locale: Locale) -> Result<Cursor<Vec<u8>>, SynthError> {
        Ok(Cursor::new(widen_canonical_header(self.0.clone())))
    }
}

#[test]
fn test_speech_with_placeholder_sizes() {
    let payload: Vec<u8> = (0..40_000u32).map(|i| (i % 97) as u8).collect();
    let synth = CannedSpeech(canonical(&payload, 0x7fff_f024, 0x7fff_f000));
    let opts = GlitchOptions { seed: Some(5), ..GlitchOptions::default() };
    let mut out = Vec::new();
    let report = glitch_speech(&synth, "bonjour", Locale::FrFr, &mut out, &opts).unwrap();

    assert_eq!(read_u32(&out, 42) as usize, out.len() - HEADER_SIZE);
    assert_eq!(read_u32(&out, 4) as usize, out.len() - 8);
    assert_eq!(report.sizes.total_after as usize, out.len());
    assert_eq!(report.original.u32_field(HeaderField::DataChunkSize).unwrap(), 40_000);
}

#[test]
fn test_widened_canonical_header_parses() {
    let canon = canonical(&[1, 2, 3, 4, 5, 6, 7, 8], 36 + 8, 8);
    let wide = widen_canonical_header(canon);
    assert_eq!(wide.len(), HEADER_SIZE + 8);
    let table = parse_header(&mut Cursor::new(wide.clone())).unwrap();
    assert_eq!(table.u32_field(HeaderField::ChunkSize).unwrap(), 46);
    assert_eq!(table.u32_field(HeaderField::FormatChunkSize).unwrap(), 18);
    assert_eq!(table.text_field(HeaderField::DataChunkId).unwrap(), "data");
    assert_eq!(table.u32_field(HeaderField::DataChunkSize).unwrap(), 8);
    assert_eq!(&wide[HEADER_SIZE..], &[1, 2, 3, 4, 5, 6, 7, 8]);
}
