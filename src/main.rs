use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import modules from the library crate
use skill_catalog_server::catalog::FinalizationWorker;
use skill_catalog_server::catalog_store::{CatalogRegistry, CatalogStore, SqliteCatalogStore};
use skill_catalog_server::config::{self, AppConfig, FileConfig};
use skill_catalog_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use skill_catalog_server::skill_store::{PointsEngine, SkillStore, SqliteSkillStore, StorePointsEngine};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (catalog.db, skills.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&config::CliConfig::from(&cli_args), file_config)?;

    info!(
        "Opening SQLite skills database at {:?}...",
        app_config.skills_db_path()
    );
    let skill_store: Arc<dyn SkillStore> =
        Arc::new(SqliteSkillStore::new(app_config.skills_db_path())?);

    info!(
        "Opening SQLite catalog database at {:?}...",
        app_config.catalog_db_path()
    );
    let catalog_store: Arc<dyn CatalogStore> =
        Arc::new(SqliteCatalogStore::new(app_config.catalog_db_path())?);

    info!("Initializing metrics...");
    metrics::init_metrics();
    metrics::set_catalog_entries(catalog_store.count_entries()?);

    let points_engine: Arc<dyn PointsEngine> =
        Arc::new(StorePointsEngine::new(skill_store.clone()));

    let (finalization_worker, finalization_queue) = FinalizationWorker::new(
        catalog_store.clone(),
        skill_store.clone(),
        points_engine.clone(),
        app_config.catalog.worker_config(),
    );

    let shutdown_token = CancellationToken::new();
    let worker_handle = tokio::spawn(
        finalization_worker
            .clone()
            .run(finalization_queue, shutdown_token.clone()),
    );

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        default_page_size: app_config.catalog.default_page_size,
        max_page_size: app_config.catalog.max_page_size,
        min_project_points: app_config.catalog.min_project_points,
    };

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    let server = run_server(
        server_config,
        skill_store,
        catalog_store,
        points_engine,
        finalization_worker,
        app_config.metrics_port,
        shutdown_token.clone(),
    );

    let result = tokio::select! {
        result = server => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            Ok(())
        }
    };

    shutdown_token.cancel();
    if let Err(e) = worker_handle.await {
        error!("Finalization worker task failed: {}", e);
    }
    result
}
