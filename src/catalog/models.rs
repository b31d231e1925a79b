//! Results returned by the catalog services.

use crate::catalog_store::{CatalogEntry, ExportedEntrySummary, ImportBinding};
use serde::{Deserialize, Serialize};

/// Reference to a catalog entry by its source skill.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogEntryRef {
    pub project_id: String,
    pub skill_id: String,
}

impl CatalogEntryRef {
    pub fn new(project_id: impl Into<String>, skill_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            skill_id: skill_id.into(),
        }
    }
}

// =============================================================================
// Export
// =============================================================================

/// Display snapshot of a freshly created catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportResult {
    pub project_id: String,
    pub skill_id: String,
    pub skill_name: String,
    pub subject_id: String,
    pub subject_name: String,
    pub exported_at: i64,
}

impl From<CatalogEntry> for ExportResult {
    fn from(entry: CatalogEntry) -> Self {
        Self {
            project_id: entry.source_project_id,
            skill_id: entry.source_skill_id,
            skill_name: entry.skill_name,
            subject_id: entry.subject_id,
            subject_name: entry.subject_name,
            exported_at: entry.exported_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportOutcome {
    Exported { skill_id: String, result: ExportResult },
    AlreadyExported { skill_id: String },
    Failed { skill_id: String, reason: String },
}

impl ExportOutcome {
    pub fn skill_id(&self) -> &str {
        match self {
            ExportOutcome::Exported { skill_id, .. }
            | ExportOutcome::AlreadyExported { skill_id }
            | ExportOutcome::Failed { skill_id, .. } => skill_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BulkExportResult {
    /// One outcome per requested skill, in request order.
    pub outcomes: Vec<ExportOutcome>,
    pub exported_count: usize,
    pub already_exported_count: usize,
    pub failed_count: usize,
    /// Every requested skill was already in the catalog and nothing changed.
    pub all_already_exported: bool,
}

impl BulkExportResult {
    pub fn from_outcomes(outcomes: Vec<ExportOutcome>) -> Self {
        let mut exported_count = 0;
        let mut already_exported_count = 0;
        let mut failed_count = 0;
        for outcome in &outcomes {
            match outcome {
                ExportOutcome::Exported { .. } => exported_count += 1,
                ExportOutcome::AlreadyExported { .. } => already_exported_count += 1,
                ExportOutcome::Failed { .. } => failed_count += 1,
            }
        }
        Self {
            all_already_exported: !outcomes.is_empty()
                && already_exported_count == outcomes.len(),
            outcomes,
            exported_count,
            already_exported_count,
            failed_count,
        }
    }
}

/// Why a skill cannot be exported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportBlocker {
    SkillNotFound,
    AlreadyExported,
    /// Another project's catalog entry uses the same skill id.
    SkillIdConflict,
    /// Another project's catalog entry uses the same name.
    SkillNameConflict,
    /// The skill itself was imported from the catalog.
    ImportedSkill,
}

impl ExportBlocker {
    pub fn describe(&self) -> &'static str {
        match self {
            ExportBlocker::SkillNotFound => "skill does not exist",
            ExportBlocker::AlreadyExported => "skill is already exported",
            ExportBlocker::SkillIdConflict => "skill id is already used in the catalog",
            ExportBlocker::SkillNameConflict => "skill name is already used in the catalog",
            ExportBlocker::ImportedSkill => "skill was imported from the catalog",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportabilityReport {
    pub skill_id: String,
    pub exportable: bool,
    pub blockers: Vec<ExportBlocker>,
}

// =============================================================================
// Listing
// =============================================================================

/// A catalog entry as presented to a project browsing for imports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogEntryView {
    pub entry_ref: CatalogEntryRef,
    pub skill_name: String,
    pub subject_name: String,
    pub source_project_name: String,
    pub exported_at: i64,
}

impl From<CatalogEntry> for CatalogEntryView {
    fn from(entry: CatalogEntry) -> Self {
        Self {
            entry_ref: CatalogEntryRef::new(entry.source_project_id, entry.source_skill_id),
            skill_name: entry.skill_name,
            subject_name: entry.subject_name,
            source_project_name: entry.source_project_name,
            exported_at: entry.exported_at,
        }
    }
}

/// A catalog entry as listed for its own source project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportedSkillView {
    pub skill_id: String,
    pub skill_name: String,
    pub subject_id: String,
    pub subject_name: String,
    pub exported_at: i64,
    pub importer_count: i64,
}

impl From<ExportedEntrySummary> for ExportedSkillView {
    fn from(summary: ExportedEntrySummary) -> Self {
        Self {
            skill_id: summary.entry.source_skill_id,
            skill_name: summary.entry.skill_name,
            subject_id: summary.entry.subject_id,
            subject_name: summary.entry.subject_name,
            exported_at: summary.entry.exported_at,
            importer_count: summary.importer_count,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImporterView {
    pub destination_project_id: String,
    pub destination_project_name: String,
    pub destination_project_enabled: bool,
    pub imported_at: i64,
    pub finalized: bool,
}

// =============================================================================
// Import
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOutcome {
    Imported {
        entry_ref: CatalogEntryRef,
        binding: ImportBinding,
    },
    Failed {
        entry_ref: CatalogEntryRef,
        code: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BulkImportResult {
    pub outcomes: Vec<ImportOutcome>,
    pub imported_count: usize,
    pub failed_count: usize,
}

impl BulkImportResult {
    pub fn from_outcomes(outcomes: Vec<ImportOutcome>) -> Self {
        let imported_count = outcomes
            .iter()
            .filter(|o| matches!(o, ImportOutcome::Imported { .. }))
            .count();
        Self {
            failed_count: outcomes.len() - imported_count,
            imported_count,
            outcomes,
        }
    }
}

// =============================================================================
// Finalization
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedFinalization {
    pub binding_id: i64,
    pub skill_id: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FinalizationSummary {
    pub project_id: String,
    pub finalized_count: usize,
    /// Bindings that failed. They stay unfinalized until the next trigger.
    pub failed: Vec<FailedFinalization>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PointRange {
    pub min_points: i64,
    pub max_points: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutOfRangeSkill {
    pub skill_id: String,
    pub skill_name: String,
    pub total_points: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PendingPointTotals {
    /// Project total counting only enabled skills.
    pub current_total_points: i64,
    /// Project total once the pending imports are finalized.
    pub total_points_including_pending: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FinalizeInfo {
    pub project_id: String,
    pub num_skills_to_finalize: usize,
    pub is_running: bool,
    /// Range of total points over the project's own skills, if it has any.
    pub project_point_range: Option<PointRange>,
    pub skills_out_of_range: Vec<OutOfRangeSkill>,
    pub point_totals: PendingPointTotals,
}

// =============================================================================
// Deletion
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeletionResult {
    pub deleted: bool,
    pub importer_count: i64,
    /// Informational, never blocks the deletion.
    pub message: Option<String>,
}
