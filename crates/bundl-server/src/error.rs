use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bundl_protocol::{error_document, XML_CONTENT_TYPE};
use bundl_upload::UploadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request body exceeds the {limit} byte bundle limit")]
    PayloadTooLarge { limit: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Upload(e) => e.status(),
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn exception(&self) -> &'static str {
        match self {
            Self::Upload(e) => e.exception(),
            Self::PayloadTooLarge { .. } => "RequestEntityTooLarge",
            _ => "InternalServerError",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, %status, "request rejected");
        }
        let body = error_document(self.exception(), &self.to_string());
        (status, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
    }
}
