//! HTTP surface for bundled uploads.
//!
//! `POST /dav/<collection>` with a `multipart/related` body uploads every
//! file the bundle's manifest lists into `<collection>` and answers
//! `207 Multi-Status`. Requests whose envelope is broken are answered with a
//! DAV error document and a 4xx/5xx status instead.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{AppState, HealthResponse};
pub use server::BundlServer;
