use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::StorageError;

const MAX_EXTENSION_LEN: usize = 8;
const FALLBACK_EXTENSION: &str = "bin";

/// Identifies a stored media blob: the SHA-256 of its bytes plus a file extension.
///
/// Rendered as `{64 hex chars}.{ext}`, which is also the path segment used to serve it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MediaKey {
    hash: [u8; 32],
    ext: String,
}

impl MediaKey {
    /// Hash `data` and pair it with a normalized extension.
    ///
    /// An empty extension becomes `bin`; anything non-alphanumeric or longer
    /// than 8 characters is rejected.
    pub fn compute(data: &[u8], extension: &str) -> Result<Self, StorageError> {
        Ok(Self {
            hash: Sha256::digest(data).into(),
            ext: normalize_extension(extension)?,
        })
    }

    /// Pair an already computed SHA-256 digest with a normalized extension.
    pub fn from_digest(hash: [u8; 32], extension: &str) -> Result<Self, StorageError> {
        Ok(Self {
            hash,
            ext: normalize_extension(extension)?,
        })
    }

    /// Whether `ext` would be kept as is by [`MediaKey::compute`].
    pub fn is_canonical_extension(ext: &str) -> bool {
        !ext.is_empty()
            && ext.len() <= MAX_EXTENSION_LEN
            && ext.chars().all(|c| c.is_ascii_alphanumeric())
    }

    pub fn extension(&self) -> &str {
        &self.ext
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// First byte of the hash, used as the shard directory.
    pub(crate) fn shard_dir(&self) -> String {
        hex::encode(&self.hash[..1])
    }

    /// File name within the shard directory.
    pub(crate) fn shard_file(&self) -> String {
        format!("{}.{}", hex::encode(&self.hash[1..]), self.ext)
    }
}

fn normalize_extension(ext: &str) -> Result<String, StorageError> {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() {
        return Ok(FALLBACK_EXTENSION.to_string());
    }
    if !MediaKey::is_canonical_extension(&ext) {
        return Err(StorageError::InvalidKey(format!("bad extension '{ext}'")));
    }
    Ok(ext)
}

impl FromStr for MediaKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash_hex, ext) = s
            .split_once('.')
            .ok_or_else(|| StorageError::InvalidKey(format!("missing extension in '{s}'")))?;
        if hash_hex.len() != 64 {
            return Err(StorageError::InvalidKey(format!(
                "expected 64 hex characters, got {}",
                hash_hex.len()
            )));
        }
        let bytes = hex::decode(hash_hex)
            .map_err(|e| StorageError::InvalidKey(format!("invalid hex: {e}")))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StorageError::InvalidKey("decoded to wrong length".into()))?;
        let normalized = normalize_extension(ext)?;
        if normalized != ext {
            return Err(StorageError::InvalidKey(format!("non-canonical extension in '{s}'")));
        }
        Ok(Self {
            hash,
            ext: normalized,
        })
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.hash_hex(), self.ext)
    }
}

impl fmt::Debug for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaKey({self})")
    }
}

impl Serialize for MediaKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MediaKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
