//! Filesystem chunk store
//!
//! Each chunk is one file at `<root>/<external key>`. Files are written to a
//! temporary name and renamed into place, so readers never see a partial chunk.

use crate::chunk::{decode_chunk, encode_chunk, Chunk, ChunkDecoder, DecodeContext, EncodedChunk, LogEntry};
use crate::context::QueryContext;
use crate::index::{ChunkRef, Labels};
use crate::query::QueryResult;
use crate::storage::{StorageError, StorageResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Chunks stored as individual files under a root directory
#[derive(Debug, Clone)]
pub struct FsChunkStore {
    root: PathBuf,
}

impl FsChunkStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encode and store the entries of one stream, returning the new chunk's reference
    pub async fn put(&self, user: &str, labels: &Labels, entries: &[LogEntry]) -> StorageResult<ChunkRef> {
        let encoded = encode_chunk(user, labels, entries)?;
        self.put_encoded(&encoded).await?;
        Ok(encoded.chunk_ref)
    }

    /// Store already-encoded chunk bytes
    pub async fn put_encoded(&self, chunk: &EncodedChunk) -> StorageResult<()> {
        let path = self.chunk_path(&chunk.chunk_ref)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &chunk.bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(
            key = %chunk.chunk_ref.external_key(),
            bytes = chunk.bytes.len(),
            "stored chunk"
        );
        Ok(())
    }

    /// Raw stored bytes of a chunk
    pub async fn get_raw(&self, chunk_ref: &ChunkRef) -> StorageResult<Vec<u8>> {
        let path = self.chunk_path(chunk_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::ChunkNotFound(chunk_ref.external_key()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn contains(&self, chunk_ref: &ChunkRef) -> StorageResult<bool> {
        let path = self.chunk_path(chunk_ref)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn chunk_path(&self, chunk_ref: &ChunkRef) -> StorageResult<PathBuf> {
        let user = &chunk_ref.user;
        let valid_user = !user.is_empty()
            && user != "."
            && user != ".."
            && user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid_user {
            return Err(StorageError::InvalidChunkKey(chunk_ref.external_key()));
        }

        Ok(self.root.join(chunk_ref.external_key()))
    }
}

#[async_trait]
impl ChunkDecoder for FsChunkStore {
    async fn decode(
        &self,
        ctx: &QueryContext,
        decode_ctx: &mut DecodeContext,
        chunk: Chunk,
    ) -> QueryResult<Chunk> {
        let bytes = ctx
            .run(async { Ok(self.get_raw(&chunk.chunk_ref).await?) })
            .await?;

        let (labels, entries) = decode_chunk(decode_ctx, &chunk.chunk_ref, &bytes)?;
        Ok(Chunk::decoded(chunk.chunk_ref, labels, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkFetcher, Pool};
    use crate::query::QueryError;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn entries() -> Vec<LogEntry> {
        vec![LogEntry::new(100, "started"), LogEntry::new(200, "ready")]
    }

    #[tokio::test]
    async fn test_put_then_decode() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::open(dir.path()).unwrap();
        let labels = Labels::new([("app", "api")]);

        let chunk_ref = store.put("fake", &labels, &entries()).await.unwrap();
        assert!(store.contains(&chunk_ref).await.unwrap());
        assert!(dir.path().join(chunk_ref.external_key()).is_file());

        let mut decode_ctx = DecodeContext::new();
        let chunk = store
            .decode(&QueryContext::new(), &mut decode_ctx, Chunk::from_ref(chunk_ref.clone()))
            .await
            .unwrap();

        assert!(chunk.is_decoded());
        assert_eq!(chunk.labels, labels);
        assert_eq!(chunk.entries, entries());
        assert_eq!(chunk.chunk_ref, chunk_ref);
    }

    #[tokio::test]
    async fn test_missing_chunk() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::open(dir.path()).unwrap();
        let chunk_ref = ChunkRef::new("fake", 1, 2, 3, 4);

        assert!(!store.contains(&chunk_ref).await.unwrap());
        assert!(matches!(
            store.get_raw(&chunk_ref).await,
            Err(StorageError::ChunkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_escaping_users() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::open(dir.path()).unwrap();

        for user in ["", "..", "a/b"] {
            let chunk_ref = ChunkRef::new(user, 1, 2, 3, 4);
            assert!(matches!(
                store.get_raw(&chunk_ref).await,
                Err(StorageError::InvalidChunkKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_corrupted_file_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::open(dir.path()).unwrap();
        let chunk_ref = store
            .put("fake", &Labels::new([("app", "api")]), &entries())
            .await
            .unwrap();

        let path = dir.path().join(chunk_ref.external_key());
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] ^= 0x01;
        std::fs::write(&path, bytes).unwrap();

        let err = store
            .decode(&QueryContext::new(), &mut DecodeContext::new(), Chunk::from_ref(chunk_ref))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Storage(StorageError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_fetch_from_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsChunkStore::open(dir.path()).unwrap());

        let mut chunks = Vec::new();
        for i in 0..12 {
            let pod = format!("pod-{i}");
            let labels = Labels::new([("app", "api"), ("pod", pod.as_str())]);
            let lines = vec![LogEntry::new(i, format!("line {i}"))];
            chunks.push(Chunk::from_ref(store.put("fake", &labels, &lines).await.unwrap()));
        }
        // one reference with nothing behind it
        chunks.push(Chunk::from_ref(ChunkRef::new("fake", 9, 9, 9, 9)));

        let fetcher = ChunkFetcher::new(Pool::new(DecodeContext::new), 4);
        let result = fetcher.fetch(&QueryContext::new(), chunks, store).await;

        assert_eq!(result.chunks.len(), 12);
        assert!(matches!(
            result.last_error,
            Some(QueryError::Storage(StorageError::ChunkNotFound(_)))
        ));
    }
}
