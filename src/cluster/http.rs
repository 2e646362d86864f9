//! Request/response invocation channel.
//!
//! Used by remote clients that reach the cluster only over the network. Each
//! invocation is POSTed to the owner of the target partition, retrying with
//! exponential backoff and jitter. Writes are only retried while the owner
//! cannot be reached at all; once a write may have been applied its failure is
//! returned as is.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use super::InvocationChannel;
use super::membership::ClusterView;
use super::partitioner::PartitionManager;
use super::protocol::{
    CacheOperation, ENDPOINT_INVOKE, InvocationRequest, InvocationResponse, OperationResponse,
};
use super::types::{Node, NodeId, PartitionId};
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::future::{CacheFuture, InvocationHandle};

const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);
/// Load-all runs the external loader on the owner, so it gets a longer bound.
const LOAD_ALL_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_ATTEMPTS: usize = 3;

pub struct HttpChannel {
    membership: Arc<ClusterView>,
    partitioner: Arc<PartitionManager>,
    http_client: reqwest::Client,
    base_path: String,
    runtime: Handle,
}

impl HttpChannel {
    pub fn new(
        membership: Arc<ClusterView>,
        partitioner: Arc<PartitionManager>,
    ) -> CacheResult<Arc<Self>> {
        Self::new_with_base(membership, partitioner, "")
    }

    pub fn new_with_base(
        membership: Arc<ClusterView>,
        partitioner: Arc<PartitionManager>,
        base_path: &str,
    ) -> CacheResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|e| {
            CacheError::IllegalState(format!("http channel needs a tokio runtime: {}", e))
        })?;
        let cleaned = base_path.trim_end_matches('/');
        let base_path = if cleaned.is_empty() {
            String::new()
        } else if cleaned.starts_with('/') {
            cleaned.to_string()
        } else {
            format!("/{}", cleaned)
        };

        Ok(Arc::new(Self {
            membership,
            partitioner,
            http_client: reqwest::Client::new(),
            base_path,
            runtime,
        }))
    }

    fn invoke_url(&self, node: &Node) -> String {
        format!("http://{}{}{}", node.http_addr, self.base_path, ENDPOINT_INVOKE)
    }

    fn owner_node(&self, partition: PartitionId) -> CacheResult<Node> {
        let owner = self.partitioner.get_owner(partition).ok_or_else(|| {
            CacheError::Remote(format!("No alive owner for partition {}", partition))
        })?;
        self.membership
            .get_member(&owner)
            .ok_or_else(|| CacheError::Remote(format!("Owner node not found: {:?}", owner)))
    }

    /// Sends `operation` to every alive member except this one, collecting the
    /// members that failed. Used to spread a cluster-wide teardown.
    pub async fn broadcast(
        &self,
        cache: &str,
        operation: CacheOperation,
    ) -> Vec<(NodeId, CacheError)> {
        let mut failures = Vec::new();
        for member in self.membership.get_alive_members() {
            if member.id == self.membership.local_node.id {
                continue;
            }
            let request = InvocationRequest {
                cache: cache.to_string(),
                partition: 0,
                operation: operation.clone(),
            };
            let url = self.invoke_url(&member);
            if let Err(e) =
                send_invocation(&self.http_client, &url, &request, REQUEST_TIMEOUT).await
            {
                tracing::warn!("Broadcast of {} to {:?} failed: {}", operation.name(), member.id, e);
                failures.push((member.id, e));
            }
        }
        failures
    }
}

#[async_trait]
impl InvocationChannel for HttpChannel {
    fn invoke(
        &self,
        cache: &str,
        operation: CacheOperation,
        partition: PartitionId,
    ) -> InvocationHandle {
        let node = match self.owner_node(partition) {
            Ok(node) => node,
            Err(e) => return CacheFuture::failed(e),
        };

        let timeout = match operation {
            CacheOperation::LoadAll { .. } => LOAD_ALL_TIMEOUT,
            _ => REQUEST_TIMEOUT,
        };
        let url = self.invoke_url(&node);
        let client = self.http_client.clone();
        let request = InvocationRequest {
            cache: cache.to_string(),
            partition,
            operation,
        };

        CacheFuture::spawn(&self.runtime, async move {
            send_invocation(&client, &url, &request, timeout).await
        })
    }
}

async fn send_invocation(
    client: &reqwest::Client,
    url: &str,
    request: &InvocationRequest,
    timeout: Duration,
) -> CacheResult<OperationResponse> {
    let retry = if request.operation.is_idempotent() {
        RetryOn::AnyTransportError
    } else {
        RetryOn::ConnectError
    };
    let response = post_with_retry(client, url, request, timeout, RETRY_ATTEMPTS, retry)
        .await
        .map_err(|e| {
            tracing::error!(
                "Invocation {} on partition {} failed: {}",
                request.operation.name(),
                request.partition,
                e
            );
            CacheError::remote(e)
        })?;

    let status = response.status();
    let body: InvocationResponse = response.json().await.map_err(|e| {
        CacheError::Remote(format!("Invalid invocation response ({}): {}", status, e))
    })?;

    body.result.map_err(CacheError::Remote)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryOn {
    AnyTransportError,
    /// Only failures where the request never reached the owner.
    ConnectError,
}

impl RetryOn {
    fn allows(self, error: &reqwest::Error) -> bool {
        match self {
            RetryOn::AnyTransportError => true,
            RetryOn::ConnectError => error.is_connect(),
        }
    }
}

async fn post_with_retry<T: serde::Serialize>(
    client: &reqwest::Client,
    url: &str,
    payload: &T,
    timeout: Duration,
    attempts: usize,
    retry: RetryOn,
) -> Result<reqwest::Response> {
    let mut delay_ms = 150u64;

    for attempt in 0..attempts {
        let response = client
            .post(url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await;

        match response {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt + 1 == attempts || !retry.allows(&e) {
                    return Err(anyhow::anyhow!(e));
                }
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(1200);
            }
        }
    }

    Err(anyhow::anyhow!("Retry attempts exhausted"))
}
