use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::{CacheError, CacheResult};

/// Serialized form of a key or a value.
///
/// This layer never looks inside the bytes. The identity of a cache entry is
/// its serialized key, so two keys are the same entry iff their `Data` match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Data(pub Vec<u8>);

impl Data {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for Data {
    fn from(raw: &str) -> Self {
        Self(raw.as_bytes().to_vec())
    }
}

/// Serializes a typed key or value into its wire form.
pub fn to_data<T: Serialize + ?Sized>(value: &T) -> CacheResult<Data> {
    bincode::serialize(value)
        .map(Data)
        .map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Deserializes a wire-level key or value back into its typed form.
pub fn to_object<T: DeserializeOwned>(data: &Data) -> CacheResult<T> {
    bincode::deserialize(&data.0).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Identifier of a background task tracked by a cache proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a stored entry, handed to merge policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntryView {
    pub key: Data,
    pub value: Data,
    /// Number of reads served for this entry by its owner.
    pub hits: u64,
    /// Timestamp (ms) when the entry was first stored.
    pub created_at: u64,
}

/// Current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
