//! Chunk Fetching
//!
//! Chunks are compressed blocks of log entries for one stream, addressed by a
//! [`ChunkRef`](crate::index::ChunkRef):
//!
//! - **types**: `Chunk`, `LogEntry`
//! - **encoding**: LZ4 + bincode payload format with CRC32 checksums
//! - **pool**: reusable `DecodeContext` scratch state
//! - **fetcher**: bounded-parallelism fetch with partial results

mod encoding;
mod fetcher;
mod pool;
mod types;

pub use encoding::{checksum, decode_chunk, encode_chunk, EncodedChunk};
pub use fetcher::{get_parallel_chunks, ChunkDecoder, ChunkFetcher, ParallelFetch};
pub use pool::{global_decode_pool, DecodeContext, DecodeContextPool, Pool, Pooled, Recycle};
pub use types::{Chunk, LogEntry};
