mod file_config;

pub use file_config::{CatalogConfig, FileConfig};

use crate::catalog::FinalizationWorkerConfig;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub catalog: CatalogSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let catalog = CatalogSettings::from_file(file.catalog.unwrap_or_default())?;

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            catalog,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn skills_db_path(&self) -> PathBuf {
        self.db_dir.join("skills.db")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    pub finalization_concurrency: usize,
    pub retry_interval_secs: u64,
    /// Total points a project needs before it may export skills.
    pub min_project_points: i64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            finalization_concurrency: 4,
            retry_interval_secs: 60,
            min_project_points: 100,
            default_page_size: 10,
            max_page_size: 200,
        }
    }
}

impl CatalogSettings {
    fn from_file(file: CatalogConfig) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            finalization_concurrency: file
                .finalization_concurrency
                .unwrap_or(defaults.finalization_concurrency),
            retry_interval_secs: file
                .retry_interval_secs
                .unwrap_or(defaults.retry_interval_secs),
            min_project_points: file
                .min_project_points
                .unwrap_or(defaults.min_project_points),
            default_page_size: file.default_page_size.unwrap_or(defaults.default_page_size),
            max_page_size: file.max_page_size.unwrap_or(defaults.max_page_size),
        };

        if settings.finalization_concurrency == 0 {
            bail!("catalog.finalization_concurrency must be at least 1");
        }
        if settings.retry_interval_secs == 0 {
            bail!("catalog.retry_interval_secs must be at least 1");
        }
        if settings.default_page_size == 0 || settings.max_page_size == 0 {
            bail!("catalog page sizes must be at least 1");
        }
        if settings.default_page_size > settings.max_page_size {
            bail!(
                "catalog.default_page_size ({}) exceeds catalog.max_page_size ({})",
                settings.default_page_size,
                settings.max_page_size
            );
        }
        Ok(settings)
    }

    pub fn worker_config(&self) -> FinalizationWorkerConfig {
        FinalizationWorkerConfig {
            concurrency: self.finalization_concurrency,
            retry_interval: Duration::from_secs(self.retry_interval_secs),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
