use std::io::{self, Read};
use crate::header::read_full;

/// Bytes per block handed to the engine.
pub const BLOCK_SIZE: usize = 22050;
/// Bytes per sample unit.  Only 16-bit PCM is handled.
pub const SAMPLE_WIDTH: usize = 2;

/// Splits a reader into blocks of at most `block_size` bytes.
///
/// Each call to [`next_block`](Self::next_block) fills a whole block unless
/// the reader runs dry, so only the final block can be short.  `None` marks
/// end of stream.
pub struct BlockReader<R: Read> {
    reader:     R,
    buf:        Vec<u8>,
    blocks:     u64,
    bytes_read: u64,
}

impl<R: Read> BlockReader<R> {
    pub fn new(reader: R, block_size: usize) -> Self {
        Self {
            reader,
            buf:        vec![0u8; block_size.max(1)],
            blocks:     0,
            bytes_read: 0,
        }
    }

    pub fn next_block(&mut self) -> io::Result<Option<&[u8]>> {
        let n = read_full(&mut self.reader, &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.blocks     += 1;
        self.bytes_read += n as u64;
        Ok(Some(&self.buf[..n]))
    }

    /// Blocks returned so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

/// Append `unit` to `out` `times` times.
#[inline]
pub fn duplicate_unit(out: &mut Vec<u8>, unit: &[u8], times: usize) {
    for _ in 0..times {
        out.extend_from_slice(unit);
    }
}
