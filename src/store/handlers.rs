use axum::{Extension, Json, Router, http::StatusCode, routing::post};
use std::sync::Arc;

use super::memory::PartitionStore;
use crate::cache::error::CacheError;
use crate::cluster::http::HttpChannel;
use crate::cluster::protocol::{
    CacheOperation, ENDPOINT_INVOKE, InvocationRequest, InvocationResponse,
};

/// Routes served by a partition owner.
pub fn router(store: Arc<PartitionStore>, peers: Arc<HttpChannel>) -> Router {
    Router::new()
        .route(ENDPOINT_INVOKE, post(handle_invoke))
        .layer(Extension(store))
        .layer(Extension(peers))
}

pub async fn handle_invoke(
    Extension(store): Extension<Arc<PartitionStore>>,
    Extension(peers): Extension<Arc<HttpChannel>>,
    Json(req): Json<InvocationRequest>,
) -> (StatusCode, Json<InvocationResponse>) {
    let InvocationRequest {
        cache,
        partition,
        operation,
    } = req;
    let broadcast = matches!(operation, CacheOperation::Destroy { broadcast: true });

    let result = {
        let store = store.clone();
        let cache = cache.clone();
        tokio::task::spawn_blocking(move || store.execute(&cache, partition, operation))
            .await
            .map_err(CacheError::remote)
            .and_then(|result| result)
    };

    if broadcast && result.is_ok() {
        let failures = peers
            .broadcast(&cache, CacheOperation::Destroy { broadcast: false })
            .await;
        if !failures.is_empty() {
            tracing::warn!(
                "Destroy of '{}' did not reach {} member(s)",
                cache,
                failures.len()
            );
        }
    }

    match result {
        Ok(response) => (
            StatusCode::OK,
            Json(InvocationResponse {
                result: Ok(response),
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to execute on partition {}: {}", partition, e);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(InvocationResponse {
                    result: Err(e.to_string()),
                }),
            )
        }
    }
}
