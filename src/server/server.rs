use anyhow::{Context, Result};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use super::catalog_routes::catalog_routes;
use super::skill_routes::skill_routes;
use super::{log_requests, metrics, state::*, ServerConfig};
use crate::catalog_store::CatalogRegistry;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub catalog_entries: Option<i64>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        catalog_entries: state.catalog_store.count_entries().ok(),
    };
    Json(stats)
}

pub fn make_app(
    config: ServerConfig,
    skill_store: GuardedSkillStore,
    catalog_store: GuardedCatalogStore,
    points_engine: GuardedPointsEngine,
    finalization_worker: GuardedFinalizationWorker,
) -> Result<Router> {
    let state = ServerState::new(
        config,
        skill_store,
        catalog_store,
        points_engine,
        finalization_worker,
    );

    let project_routes = skill_routes(state.clone()).merge(catalog_routes(state.clone()));

    let app: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .nest("/v1/projects", project_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Serves the API and the metrics endpoint until `shutdown` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    skill_store: GuardedSkillStore,
    catalog_store: GuardedCatalogStore,
    points_engine: GuardedPointsEngine,
    finalization_worker: GuardedFinalizationWorker,
    metrics_port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(
        config,
        skill_store,
        catalog_store,
        points_engine,
        finalization_worker,
    )?;

    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let served = axum::serve(metrics_listener, make_metrics_app())
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!("Metrics server failed: {}", e);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FinalizationWorker, FinalizationWorkerConfig};
    use crate::catalog_store::SqliteCatalogStore;
    use crate::skill_store::{SqliteSkillStore, StorePointsEngine};
    use axum::{body::Body, http::Request, http::StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let skills: GuardedSkillStore = Arc::new(SqliteSkillStore::in_memory().unwrap());
        let catalog: GuardedCatalogStore = Arc::new(SqliteCatalogStore::in_memory().unwrap());
        let points: GuardedPointsEngine = Arc::new(StorePointsEngine::new(skills.clone()));
        let (worker, _receiver) = FinalizationWorker::new(
            catalog.clone(),
            skills.clone(),
            points.clone(),
            FinalizationWorkerConfig::default(),
        );
        make_app(
            ServerConfig {
                requests_logging_level: crate::server::RequestsLoggingLevel::None,
                ..Default::default()
            },
            skills,
            catalog,
            points,
            worker,
        )
        .unwrap()
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[tokio::test]
    async fn responds_on_home() {
        let app = test_app();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn responds_not_found_on_unknown_project() {
        let routes = vec![
            "/v1/projects/missing",
            "/v1/projects/missing/catalog/exported",
            "/v1/projects/missing/catalog/importable",
            "/v1/projects/missing/catalog/finalize/info",
        ];

        for route in routes.into_iter() {
            let request = Request::builder().uri(route).body(Body::empty()).unwrap();
            let response = test_app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "route {}", route);
        }
    }
}
