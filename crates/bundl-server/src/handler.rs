use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bundl_protocol::{ProtocolError, XML_CONTENT_TYPE};
use bundl_upload::{BundleOrchestrator, UploadError};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::error::{ServerError, ServerResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BundleOrchestrator>,
    pub max_bundle_size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Info handler.
pub async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "bundl-server",
        "version": env!("CARGO_PKG_VERSION"),
        "max_bundle_size": state.max_bundle_size,
    }))
}

/// Bundle upload into the root collection.
pub async fn upload_root_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> ServerResult<Response> {
    run_bundle(state, String::new(), headers, body).await
}

/// Bundle upload into `collection`.
pub async fn upload_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> ServerResult<Response> {
    run_bundle(state, collection, headers, body).await
}

async fn run_bundle(
    state: AppState,
    collection: String,
    headers: HeaderMap,
    body: Body,
) -> ServerResult<Response> {
    let limit = state.max_bundle_size;
    if declared_length(&headers).is_some_and(|len| len > limit) {
        return Err(ServerError::PayloadTooLarge { limit });
    }
    let content_type = match headers.get(header::CONTENT_TYPE) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| envelope_error("Content-Type header is not valid UTF-8"))?
                .to_string(),
        ),
        None => None,
    };

    let exceeded = Arc::new(AtomicBool::new(false));
    let reader = SyncIoBridge::new(StreamReader::new(limited(body, limit, exceeded.clone())));
    let orchestrator = state.orchestrator.clone();

    // The parser is a blocking reader over the body; keep it off the runtime.
    let result = tokio::task::spawn_blocking(move || {
        orchestrator.handle(&collection, content_type.as_deref(), reader)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("bundle task failed: {e}")))?;

    let report = match result {
        Ok(report) => report,
        Err(_) if exceeded.load(Ordering::Relaxed) => {
            return Err(ServerError::PayloadTooLarge { limit })
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        StatusCode::MULTI_STATUS,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        report.to_multistatus().to_xml(),
    )
        .into_response())
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn envelope_error(message: &str) -> ServerError {
    UploadError::Envelope(ProtocolError::InvalidEnvelope(message.into())).into()
}

/// Body chunks as a fallible stream that stops once more than `limit` bytes
/// went through, raising `exceeded`.
fn limited(
    body: Body,
    limit: u64,
    exceeded: Arc<AtomicBool>,
) -> impl futures::Stream<Item = io::Result<axum::body::Bytes>> + Send + Unpin {
    let mut seen = 0u64;
    body.into_data_stream().map(move |chunk| {
        let chunk = chunk.map_err(io::Error::other)?;
        seen += chunk.len() as u64;
        if seen > limit {
            exceeded.store(true, Ordering::Relaxed);
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("request body exceeds {limit} bytes"),
            ));
        }
        Ok(chunk)
    })
}
