//! Cache Invocation Protocol
//!
//! Defines the operations a proxy sends to a partition owner and the responses
//! it gets back. The same types travel in-process (embedded channel) and as
//! JSON over HTTP (remote client channel).

use serde::{Deserialize, Serialize};

use super::types::PartitionId;
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::types::Data;

// --- API Endpoints ---

/// Internal endpoint executing one operation against one partition.
pub const ENDPOINT_INVOKE: &str = "/internal/cache/invoke";

// --- Operations ---

/// One unit of work executed by the owner of a partition.
///
/// Conditional variants carry the expected value so the comparison happens on
/// the owner, against the authoritative entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheOperation {
    Get {
        key: Data,
    },
    GetAll {
        keys: Vec<Data>,
    },
    /// Responds with the previous value when `return_old` is set.
    Put {
        key: Data,
        value: Data,
        return_old: bool,
    },
    PutIfAbsent {
        key: Data,
        value: Data,
    },
    /// With `expected` set, replaces only if the current value equals it.
    Replace {
        key: Data,
        expected: Option<Data>,
        value: Data,
        return_old: bool,
    },
    /// With `expected` set, removes only if the current value equals it.
    Remove {
        key: Data,
        expected: Option<Data>,
        return_old: bool,
    },
    Size,
    /// Populates the partition from the cache's external loader. An empty key
    /// set means every key the loader knows.
    LoadAll {
        keys: Vec<Data>,
        replace_existing_values: bool,
    },
    /// Tears the cache down. With `broadcast` the receiving owner forwards the
    /// teardown to every other member.
    Destroy {
        broadcast: bool,
    },
}

impl CacheOperation {
    pub fn name(&self) -> &'static str {
        match self {
            CacheOperation::Get { .. } => "get",
            CacheOperation::GetAll { .. } => "get_all",
            CacheOperation::Put { .. } => "put",
            CacheOperation::PutIfAbsent { .. } => "put_if_absent",
            CacheOperation::Replace { .. } => "replace",
            CacheOperation::Remove { .. } => "remove",
            CacheOperation::Size => "size",
            CacheOperation::LoadAll { .. } => "load_all",
            CacheOperation::Destroy { .. } => "destroy",
        }
    }

    /// Whether running the operation twice leaves the same state and the same
    /// answer as running it once.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            CacheOperation::Get { .. }
                | CacheOperation::GetAll { .. }
                | CacheOperation::Size
                | CacheOperation::Destroy { .. }
        )
    }
}

// --- Responses ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationResponse {
    /// A single (possibly absent) value: get, or the old value of a
    /// get-and-* operation.
    Value(Option<Data>),
    /// Outcome of a conditional write.
    Flag(bool),
    Entries(Vec<(Data, Data)>),
    Size(u64),
    Done,
}

impl OperationResponse {
    fn unexpected(&self, wanted: &str) -> CacheError {
        CacheError::Remote(format!("Expected {} response, got {:?}", wanted, self))
    }

    pub fn into_value(self) -> CacheResult<Option<Data>> {
        match self {
            OperationResponse::Value(value) => Ok(value),
            other => Err(other.unexpected("value")),
        }
    }

    pub fn into_flag(self) -> CacheResult<bool> {
        match self {
            OperationResponse::Flag(flag) => Ok(flag),
            other => Err(other.unexpected("flag")),
        }
    }

    pub fn into_entries(self) -> CacheResult<Vec<(Data, Data)>> {
        match self {
            OperationResponse::Entries(entries) => Ok(entries),
            other => Err(other.unexpected("entries")),
        }
    }

    pub fn into_size(self) -> CacheResult<u64> {
        match self {
            OperationResponse::Size(size) => Ok(size),
            other => Err(other.unexpected("size")),
        }
    }
}

// --- Data Transfer Objects ---

/// Request body sent to a partition owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Name of the cache the operation targets.
    pub cache: String,
    pub partition: PartitionId,
    pub operation: CacheOperation,
}

/// Response body returned by a partition owner.
///
/// Failures travel as their message and are surfaced to the caller verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub result: Result<OperationResponse, String>,
}
