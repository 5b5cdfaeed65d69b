use std::sync::Arc;

use bundl_protocol::ParserOptions;
use bundl_store::{FsStorage, InMemoryLockProvider, LockProvider, StorageGateway};
use bundl_upload::BundleOrchestrator;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Bundle upload server.
pub struct BundlServer {
    config: ServerConfig,
    state: AppState,
}

impl BundlServer {
    /// Server over a filesystem backend rooted at `config.storage_root`.
    pub fn new(config: ServerConfig) -> Self {
        let storage = FsStorage::new(&config.storage_root).with_part_files(config.staged_writes);
        Self::with_backend(config, Arc::new(storage), Arc::new(InMemoryLockProvider::new()))
    }

    pub fn with_backend(
        config: ServerConfig,
        storage: Arc<dyn StorageGateway>,
        locks: Arc<dyn LockProvider>,
    ) -> Self {
        let orchestrator = BundleOrchestrator::new(storage, locks).with_options(ParserOptions {
            spool_threshold: config.spool_threshold,
        });
        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            max_bundle_size: config.max_bundle_size,
        };
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        if !self.config.storage_root.is_dir() {
            return Err(ServerError::Config(format!(
                "storage root {} is not a directory",
                self.config.storage_root.display()
            )));
        }
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            root = %self.config.storage_root.display(),
            "bundl server listening on {}",
            self.config.bind_addr
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
