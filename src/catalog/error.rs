use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Project {project_id} cannot import its own skill {skill_id}")]
    SelfImport { project_id: String, skill_id: String },

    #[error("Skill {skill_id} from project {source_project_id} is already imported into {destination_project_id}")]
    AlreadyImported {
        source_project_id: String,
        skill_id: String,
        destination_project_id: String,
    },

    #[error("{0}")]
    ValidationError(String),

    #[error("Skill {skill_id} cannot be exported: {}", .reasons.join(", "))]
    NotExportable {
        skill_id: String,
        reasons: Vec<String>,
    },

    #[error("Project {project_id} has {total_points} points, at least {required} are required to export skills")]
    InsufficientPoints {
        project_id: String,
        total_points: i64,
        required: i64,
    },

    #[error("Catalog imports are being finalized for project {0}, try again later")]
    FinalizationInProgress(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl CatalogError {
    /// Stable machine-readable code, reported next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Conflict(_) => "conflict",
            CatalogError::NotFound(_) => "not_found",
            CatalogError::SelfImport { .. } => "self_import",
            CatalogError::AlreadyImported { .. } => "already_imported",
            CatalogError::ValidationError(_) => "validation_error",
            CatalogError::NotExportable { .. } => "not_exportable",
            CatalogError::InsufficientPoints { .. } => "insufficient_points",
            CatalogError::FinalizationInProgress(_) => "finalization_in_progress",
            CatalogError::Store(_) => "store_error",
        }
    }
}

/// Failure of one background finalization. Logged and counted, never returned
/// to the caller that created the binding.
#[derive(Debug, Error)]
pub enum FinalizationError {
    #[error("Source skill {project_id}/{skill_id} no longer exists")]
    SourceSkillMissing { project_id: String, skill_id: String },

    #[error("Finalization task panicked or was cancelled: {0}")]
    Task(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
