use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use super::error::StorageError;
use super::key::MediaKey;
use super::traits::{MediaReader, MediaStore};

/// Media store on the local filesystem.
///
/// Layout: `{base_path}/{first 2 hex chars}/{remaining 62 hex chars}.{ext}`.
/// Writes go to `{base_path}/.tmp` first and are renamed into place.
pub struct FilesystemMediaStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemMediaStore {
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    fn blob_path(&self, key: &MediaKey) -> PathBuf {
        self.base_path.join(key.shard_dir()).join(key.shard_file())
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl MediaStore for FilesystemMediaStore {
    async fn put_stream(
        &self,
        mut reader: MediaReader,
        extension: &str,
    ) -> Result<MediaKey, StorageError> {
        let temp = self.temp_path();
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024];
        let mut file = fs::File::create(&temp).await?;

        let written: Result<(), StorageError> = async {
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                size += n as u64;
                if size > self.max_size {
                    return Err(StorageError::SizeLimitExceeded {
                        actual: size,
                        limit: self.max_size,
                    });
                }
                hasher.update(&buf[..n]);
                file.write_all(&buf[..n]).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }

        let key = match MediaKey::from_digest(hasher.finalize().into(), extension) {
            Ok(key) => key,
            Err(e) => {
                let _ = fs::remove_file(&temp).await;
                return Err(e);
            }
        };
        let target = self.blob_path(&key);
        if fs::try_exists(&target).await? {
            let _ = fs::remove_file(&temp).await;
            return Ok(key);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(%key, size, "Stored media blob");
        Ok(key)
    }

    async fn open(&self, key: &MediaKey) -> Result<MediaReader, StorageError> {
        match fs::File::open(self.blob_path(key)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &MediaKey) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.blob_path(key)).await?)
    }

    async fn delete(&self, key: &MediaKey) -> Result<bool, StorageError> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => {
                debug!(%key, "Deleted media blob");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
