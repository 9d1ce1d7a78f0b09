//! Wire Codec
//!
//! Message framing for UDP:
//!
//! ```text
//! value -> JSON -> LZ4 frame -> chunks of <= chunk_size bytes
//!
//! datagram = [chunk_index: i64 LE][total_chunks: i64 LE][payload]
//! ```
//!
//! Chunk indices start at 1. The receiver completes a transfer when the
//! chunk whose index equals the total arrives. A transfer missing any chunk
//! fails as a whole; there is no retransmission.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use serde::{de::DeserializeOwned, Serialize};
use lz4_flex::frame::{FrameDecoder, FrameEncoder};

/// Size of the chunk header in bytes.
pub const CHUNK_HEADER_LEN: usize = 16;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// Default bound on the chunks one transfer may announce.
pub const DEFAULT_MAX_CHUNKS: usize = 4096;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression failed
    #[error("Compression error: {0}")]
    Compress(#[from] lz4_flex::frame::Error),

    /// LZ4 stream read or write failed
    #[error("LZ4 stream error: {0}")]
    Io(#[from] std::io::Error),

    /// Datagram too short or header out of range
    #[error("Malformed chunk header")]
    MalformedHeader,

    /// Header announces more chunks than the receiver accepts
    #[error("Transfer of {total} chunks exceeds limit of {max}")]
    TooManyChunks {
        /// Chunks announced
        total: usize,
        /// Accepted maximum
        max: usize,
    },

    /// Final chunk arrived but earlier chunks are missing
    #[error("Incomplete transfer: received {received} of {total} chunks")]
    Incomplete {
        /// Chunks received
        received: usize,
        /// Chunks announced
        total: usize,
    },
}

/// Serialize and compress a message.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = FrameEncoder::new(Vec::with_capacity(json.len() / 2));
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Decompress and deserialize a message.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut json = Vec::with_capacity(bytes.len() * 2);
    FrameDecoder::new(bytes).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Split a payload into datagrams of at most `chunk_size` payload bytes.
///
/// An empty payload still produces one (empty) chunk.
pub fn chunk(bytes: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    let chunk_size = chunk_size.max(1);
    let total = bytes.len().div_ceil(chunk_size).max(1);
    let mut datagrams = Vec::with_capacity(total);
    for index in 0..total {
        let start = index * chunk_size;
        let end = (start + chunk_size).min(bytes.len());
        let mut datagram = Vec::with_capacity(CHUNK_HEADER_LEN + end - start);
        datagram.extend_from_slice(&(index as i64 + 1).to_le_bytes());
        datagram.extend_from_slice(&(total as i64).to_le_bytes());
        datagram.extend_from_slice(&bytes[start..end]);
        datagrams.push(datagram);
    }
    datagrams
}

/// Encode and chunk in one step.
pub fn encode_chunked<T: Serialize>(value: &T, chunk_size: usize) -> Result<Vec<Vec<u8>>, CodecError> {
    Ok(chunk(&encode(value)?, chunk_size))
}

fn parse_header(datagram: &[u8]) -> Result<(usize, usize), CodecError> {
    if datagram.len() < CHUNK_HEADER_LEN {
        return Err(CodecError::MalformedHeader);
    }
    let mut index = [0u8; 8];
    let mut total = [0u8; 8];
    index.copy_from_slice(&datagram[0..8]);
    total.copy_from_slice(&datagram[8..16]);
    let index = i64::from_le_bytes(index);
    let total = i64::from_le_bytes(total);
    if index < 1 || total < 1 || index > total {
        return Err(CodecError::MalformedHeader);
    }
    Ok((index as usize, total as usize))
}

/// Reassembles one transfer at a time.
#[derive(Debug)]
pub struct ChunkAssembler {
    chunks: BTreeMap<usize, Vec<u8>>,
    max_chunks: usize,
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::with_max_chunks(DEFAULT_MAX_CHUNKS)
    }
}

impl ChunkAssembler {
    /// Empty assembler accepting up to [`DEFAULT_MAX_CHUNKS`] per transfer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty assembler accepting up to `max_chunks` per transfer.
    pub fn with_max_chunks(max_chunks: usize) -> Self {
        Self { chunks: BTreeMap::new(), max_chunks: max_chunks.max(1) }
    }

    /// Feed one datagram. Returns the reassembled payload once the final
    /// chunk arrives; the assembler is then ready for the next transfer.
    pub fn push(&mut self, datagram: &[u8]) -> Result<Option<Vec<u8>>, CodecError> {
        let (index, total) = parse_header(datagram)?;
        if total > self.max_chunks {
            self.chunks.clear();
            return Err(CodecError::TooManyChunks { total, max: self.max_chunks });
        }
        self.chunks.insert(index, datagram[CHUNK_HEADER_LEN..].to_vec());
        if index != total {
            return Ok(None);
        }

        // Keys above `total` are leftovers of an abandoned larger transfer.
        let chunks = std::mem::take(&mut self.chunks);
        let received = chunks.range(..=total).count();
        if received != total {
            return Err(CodecError::Incomplete { received, total });
        }
        Ok(Some(
            chunks
                .into_iter()
                .take_while(|(i, _)| *i <= total)
                .flat_map(|(_, payload)| payload)
                .collect(),
        ))
    }

    /// Drop any partial transfer.
    pub fn reset(&mut self) {
        self.chunks.clear();
    }

    /// Number of chunks buffered for the current transfer.
    pub fn buffered(&self) -> usize {
        self.chunks.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
