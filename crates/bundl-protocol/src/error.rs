use thiserror::Error;

/// Errors that abort a whole bundle.
///
/// Every variant is a request-level fault: once framing or the manifest is
/// broken no later part can be trusted, so none of these are downgraded to
/// per-entry failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unable to read request body: {0}")]
    Transport(#[from] std::io::Error),

    #[error("expected boundary delimiter in content part, not a multipart/related body")]
    ExpectedBoundary,

    #[error("error while reading header of content part")]
    HeaderRead,

    #[error("header of content part is malformed: {0}")]
    MalformedHeader(String),

    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("content-length header missing in content part, multipart body cannot be parsed")]
    MissingContentLength,

    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    #[error("cannot read a negative number of bytes: {0}")]
    NegativeLength(i64),

    #[error("malformed bundle: {0}")]
    MalformedBundle(String),

    #[error("bundle has no manifest part with content-id '{0}'")]
    MissingManifest(String),

    #[error("manifest part must be application/json, found '{0}'")]
    ManifestContentType(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid Content-Type header: {0}")]
    InvalidEnvelope(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
