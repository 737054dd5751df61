//! Chunk payload encoding
//!
//! Stored chunk bytes are:
//!
//! ```text
//! [u32 LE uncompressed size][LZ4 block of bincode(ChunkPayload)]
//! ```
//!
//! The chunk reference's checksum is the CRC32 of the whole stored byte string.
//! Decoding decompresses into the caller's pooled [`DecodeContext`] buffer.

use crate::chunk::{DecodeContext, LogEntry};
use crate::index::{ChunkRef, Labels};
use crate::storage::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Refuse to allocate for payloads claiming to be larger than this
const MAX_DECODED_SIZE: usize = 256 * 1024 * 1024;

const SIZE_PREFIX_LEN: usize = 4;

#[derive(Debug, Serialize, Deserialize)]
struct ChunkPayload {
    labels: Labels,
    entries: Vec<LogEntry>,
}

/// Encoded chunk bytes with the reference that addresses them
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub chunk_ref: ChunkRef,
    pub bytes: Vec<u8>,
}

/// CRC32 used for chunk checksums
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Encode entries of one stream into stored chunk bytes.
///
/// Entries are sorted by timestamp; the reference spans the first to last entry.
pub fn encode_chunk(user: &str, labels: &Labels, entries: &[LogEntry]) -> StorageResult<EncodedChunk> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.timestamp);

    let start = sorted.first().map(|e| e.timestamp).unwrap_or(0);
    let end = sorted.last().map(|e| e.timestamp).unwrap_or(0);

    let payload = ChunkPayload {
        labels: labels.clone(),
        entries: sorted,
    };

    let serialized = bincode::serialize(&payload)?;
    let bytes = lz4_flex::compress_prepend_size(&serialized);

    Ok(EncodedChunk {
        chunk_ref: ChunkRef::new(user, labels.fingerprint(), start, end, checksum(&bytes)),
        bytes,
    })
}

/// Verify and decode stored chunk bytes using the context's scratch buffer
pub fn decode_chunk(
    decode_ctx: &mut DecodeContext,
    chunk_ref: &ChunkRef,
    bytes: &[u8],
) -> StorageResult<(Labels, Vec<LogEntry>)> {
    let actual = checksum(bytes);
    if actual != chunk_ref.checksum {
        return Err(StorageError::ChecksumMismatch {
            key: chunk_ref.external_key(),
            expected: chunk_ref.checksum,
            actual,
        });
    }

    if bytes.len() < SIZE_PREFIX_LEN {
        return Err(StorageError::Corruption(format!(
            "chunk {} is {} bytes, too short for a size prefix",
            chunk_ref.external_key(),
            bytes.len()
        )));
    }

    let (prefix, block) = bytes.split_at(SIZE_PREFIX_LEN);
    let size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if size > MAX_DECODED_SIZE {
        return Err(StorageError::Corruption(format!(
            "chunk {} claims {} decoded bytes",
            chunk_ref.external_key(),
            size
        )));
    }

    let buffer = decode_ctx.buffer(size);
    let written = lz4_flex::block::decompress_into(block, buffer)
        .map_err(|e| StorageError::Compression(e.to_string()))?;

    let payload: ChunkPayload = bincode::deserialize(&buffer[..written])?;

    if payload.labels.fingerprint() != chunk_ref.fingerprint {
        return Err(StorageError::Corruption(format!(
            "chunk {} holds series {}",
            chunk_ref.external_key(),
            payload.labels
        )));
    }

    Ok((payload.labels, payload.entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Labels, Vec<LogEntry>) {
        let labels = Labels::new([("app", "api"), ("env", "prod")]);
        let entries = vec![
            LogEntry::new(2_000, "second"),
            LogEntry::new(1_000, "first"),
            LogEntry::new(3_000, "third"),
        ];
        (labels, entries)
    }

    #[test]
    fn test_encode_sets_reference() {
        let (labels, entries) = sample();
        let encoded = encode_chunk("fake", &labels, &entries).unwrap();

        assert_eq!(encoded.chunk_ref.user, "fake");
        assert_eq!(encoded.chunk_ref.fingerprint, labels.fingerprint());
        assert_eq!(encoded.chunk_ref.start, 1_000);
        assert_eq!(encoded.chunk_ref.end, 3_000);
        assert_eq!(encoded.chunk_ref.checksum, checksum(&encoded.bytes));
    }

    #[test]
    fn test_decode_returns_sorted_entries() {
        let (labels, entries) = sample();
        let encoded = encode_chunk("fake", &labels, &entries).unwrap();

        let mut ctx = DecodeContext::new();
        let (decoded_labels, decoded) = decode_chunk(&mut ctx, &encoded.chunk_ref, &encoded.bytes).unwrap();

        assert_eq!(decoded_labels, labels);
        let lines: Vec<&str> = decoded.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_checksum_mismatch() {
        let (labels, entries) = sample();
        let mut encoded = encode_chunk("fake", &labels, &entries).unwrap();
        let last = encoded.bytes.len() - 1;
        encoded.bytes[last] ^= 0xff;

        let mut ctx = DecodeContext::new();
        let err = decode_chunk(&mut ctx, &encoded.chunk_ref, &encoded.bytes).unwrap_err();
        assert!(matches!(err, StorageError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = vec![1u8, 2];
        let chunk_ref = ChunkRef::new("fake", 0, 0, 0, checksum(&bytes));

        let mut ctx = DecodeContext::new();
        let err = decode_chunk(&mut ctx, &chunk_ref, &bytes).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let mut bytes = (u32::MAX).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0, 0]);
        let chunk_ref = ChunkRef::new("fake", 0, 0, 0, checksum(&bytes));

        let mut ctx = DecodeContext::new();
        let err = decode_chunk(&mut ctx, &chunk_ref, &bytes).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn test_wrong_series_detected() {
        let (labels, entries) = sample();
        let encoded = encode_chunk("fake", &labels, &entries).unwrap();
        let mut chunk_ref = encoded.chunk_ref.clone();
        chunk_ref.fingerprint ^= 1;

        let mut ctx = DecodeContext::new();
        let err = decode_chunk(&mut ctx, &chunk_ref, &encoded.bytes).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn test_context_buffer_reused_across_chunks() {
        let (labels, entries) = sample();
        let a = encode_chunk("fake", &labels, &entries).unwrap();
        let b = encode_chunk("fake", &labels, &entries[..1]).unwrap();

        let mut ctx = DecodeContext::new();
        decode_chunk(&mut ctx, &a.chunk_ref, &a.bytes).unwrap();
        let (_, decoded) = decode_chunk(&mut ctx, &b.chunk_ref, &b.bytes).unwrap();
        assert_eq!(decoded.len(), 1);
    }
}
