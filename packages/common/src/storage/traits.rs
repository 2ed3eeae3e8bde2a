use std::io::Cursor;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;
use super::key::MediaKey;

pub type MediaReader = Box<dyn AsyncRead + Unpin + Send>;

/// Blob store for story media. Keys are derived from content, so writes are idempotent.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store bytes and return their key.
    async fn put(&self, data: &[u8], extension: &str) -> Result<MediaKey, StorageError> {
        let reader: MediaReader = Box::new(Cursor::new(data.to_vec()));
        self.put_stream(reader, extension).await
    }

    /// Store everything `reader` yields and return its key.
    async fn put_stream(
        &self,
        reader: MediaReader,
        extension: &str,
    ) -> Result<MediaKey, StorageError>;

    /// Open a stored blob for streaming.
    async fn open(&self, key: &MediaKey) -> Result<MediaReader, StorageError>;

    /// Read a stored blob fully into memory.
    async fn read(&self, key: &MediaKey) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.open(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn exists(&self, key: &MediaKey) -> Result<bool, StorageError>;

    /// Delete a blob. Returns `false` if it was already gone.
    async fn delete(&self, key: &MediaKey) -> Result<bool, StorageError>;
}
