//! Skill Catalog Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod catalog;
pub mod catalog_store;
pub mod config;
pub mod mutex_ext;
pub mod server;
pub mod skill_store;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalog::{CatalogDeletionService, ExportService, FinalizationWorker, ImportService};
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use server::{run_server, RequestsLoggingLevel};
pub use skill_store::{SkillStore, SqliteSkillStore};
