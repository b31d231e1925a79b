//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own databases and worker.

use super::constants::*;
use skill_catalog_server::catalog::{FinalizationWorker, FinalizationWorkerConfig};
use skill_catalog_server::catalog_store::{CatalogStore, SqliteCatalogStore};
use skill_catalog_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use skill_catalog_server::skill_store::{
    PointsEngine, SkillStore, SqliteSkillStore, StorePointsEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated databases
///
/// When dropped, the server and its finalization worker shut down and the
/// temp directory is cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Stores for direct database access in tests
    #[allow(dead_code)]
    pub skill_store: Arc<dyn SkillStore>,
    #[allow(dead_code)]
    pub catalog_store: Arc<dyn CatalogStore>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the databases cannot be created, the port cannot be bound,
    /// or the server doesn't become ready within timeout.
    pub async fn spawn() -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");

        let skill_store: Arc<dyn SkillStore> = Arc::new(
            SqliteSkillStore::new(temp_db_dir.path().join("skills.db"))
                .expect("Failed to open skill store"),
        );
        let catalog_store: Arc<dyn CatalogStore> = Arc::new(
            SqliteCatalogStore::new(temp_db_dir.path().join("catalog.db"))
                .expect("Failed to open catalog store"),
        );
        let points_engine: Arc<dyn PointsEngine> =
            Arc::new(StorePointsEngine::new(skill_store.clone()));

        let (worker, queue) = FinalizationWorker::new(
            catalog_store.clone(),
            skill_store.clone(),
            points_engine.clone(),
            FinalizationWorkerConfig::default(),
        );
        let shutdown = CancellationToken::new();
        tokio::spawn(worker.clone().run(queue, shutdown.clone()));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            ..Default::default()
        };
        let app = make_app(
            config,
            skill_store.clone(),
            catalog_store.clone(),
            points_engine,
            worker,
        )
        .expect("Failed to build app");

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            skill_store,
            catalog_store,
            _temp_db_dir: temp_db_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
