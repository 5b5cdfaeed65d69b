use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health_handler))
        .route("/info", get(handler::info_handler))
        .route("/dav", post(handler::upload_root_handler))
        .route("/dav/*collection", post(handler::upload_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
