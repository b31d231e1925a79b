//! The skill catalog: exporting skills, importing them into other projects and
//! keeping the imported copies in sync with their source.

mod deletion;
mod error;
mod export;
mod finalization;
mod import;
mod models;
#[cfg(test)]
mod test_fixtures;

pub use deletion::{retry_pending_detachments, CatalogDeletionService, DELETE_CONFIRMATION};
pub use error::{CatalogError, CatalogResult, FinalizationError};
pub use export::ExportService;
pub use finalization::{FinalizationWorker, FinalizationWorkerConfig, SyncOutcome};
pub use import::ImportService;
pub use models::*;
