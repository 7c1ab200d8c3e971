//! Rebuild a container around a transformed payload.
//!
//! Size fields are moved by the change in total container length rather than
//! recomputed from the payload:
//!
//! ```text
//! delta            = (HEADER_SIZE + new_payload_len) - total_bytes_before
//! chunkSize'       = chunkSize     + delta
//! dataChunkSize'   = dataChunkSize + delta
//! ```
//!
//! This carries over whatever fixed offset each field had from the input
//! length, so `chunkSize - dataChunkSize` is invariant.  It is only exact if
//! the input's size fields were consistent to begin with; they are not
//! checked.

use std::io::{self, Write};
use thiserror::Error;
use tracing::{debug, warn};

use crate::header::{serialize_header, HeaderError, HeaderField, HeaderTable, HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeUpdate {
    pub total_before:    u64,
    pub total_after:     u64,
    pub delta:           i64,
    pub chunk_size:      u32,
    pub data_chunk_size: u32,
}

#[derive(Error, Debug)]
pub enum RehydrateError {
    #[error("{field} would become {value}, outside the u32 range")]
    SizeOutOfRange { field: &'static str, value: i64 },
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Compute the new size fields for a payload of `payload_len` bytes.
pub fn compute_sizes(
    table:        &HeaderTable,
    total_before: u64,
    payload_len:  u64,
) -> Result<SizeUpdate, RehydrateError> {
    let total_after = HEADER_SIZE as u64 + payload_len;
    let delta = total_after as i64 - total_before as i64;

    let shift = |field: HeaderField| -> Result<u32, RehydrateError> {
        let value = i64::from(table.u32_field(field)?) + delta;
        u32::try_from(value).map_err(|_| RehydrateError::SizeOutOfRange { field: field.name(), value })
    };

    Ok(SizeUpdate {
        total_before,
        total_after,
        delta,
        chunk_size:      shift(HeaderField::ChunkSize)?,
        data_chunk_size: shift(HeaderField::DataChunkSize)?,
    })
}

/// Apply a [`SizeUpdate`], returning the updated table.
pub fn apply_sizes(table: &HeaderTable, update: &SizeUpdate) -> Result<HeaderTable, HeaderError> {
    table
        .with_u32(HeaderField::ChunkSize, update.chunk_size)?
        .with_u32(HeaderField::DataChunkSize, update.data_chunk_size)
}

/// Update the size fields for `payload` and write `header ++ payload`.
pub fn rehydrate<W: Write>(
    table:        &HeaderTable,
    total_before: u64,
    payload:      &[u8],
    out:          &mut W,
) -> Result<(HeaderTable, SizeUpdate), RehydrateError> {
    let update = compute_sizes(table, total_before, payload.len() as u64)?;
    let expected_data = payload.len() as u64;
    if u64::from(update.data_chunk_size) != expected_data {
        warn!(
            data_chunk_size = update.data_chunk_size,
            payload = expected_data,
            "dataChunkSize does not match payload length; input size fields were inconsistent"
        );
    }
    let updated = apply_sizes(table, &update)?;
    out.write_all(&serialize_header(&updated))?;
    out.write_all(payload)?;
    debug!(delta = update.delta, chunk_size = update.chunk_size, data_chunk_size = update.data_chunk_size, "header rehydrated");
    Ok((updated, update))
}

/// In-memory convenience over [`rehydrate`].
pub fn rehydrate_to_vec(
    table:        &HeaderTable,
    total_before: u64,
    payload:      &[u8],
) -> Result<(Vec<u8>, SizeUpdate), RehydrateError> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    let (_, update) = rehydrate(table, total_before, payload, &mut out)?;
    Ok((out, update))
}
