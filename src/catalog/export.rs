//! Publishing project skills to the catalog.

use super::error::{CatalogError, CatalogResult};
use super::models::{
    BulkExportResult, ExportBlocker, ExportOutcome, ExportResult, ExportabilityReport,
    ExportedSkillView,
};
use crate::catalog_store::{CatalogStore, ExportedQuery, NewCatalogEntry, Page};
use crate::server::metrics;
use crate::skill_store::{Project, Skill, SkillStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ExportService {
    catalog: Arc<dyn CatalogStore>,
    skills: Arc<dyn SkillStore>,
    min_project_points: i64,
}

impl ExportService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        skills: Arc<dyn SkillStore>,
        min_project_points: i64,
    ) -> Self {
        Self {
            catalog,
            skills,
            min_project_points,
        }
    }

    fn require_project(&self, project_id: &str) -> CatalogResult<Project> {
        self.skills
            .get_project(project_id)?
            .ok_or_else(|| CatalogError::NotFound(format!("Project {} not found", project_id)))
    }

    /// Export blockers other than the skill being missing.
    fn blockers_for(&self, project_id: &str, skill: &Skill) -> CatalogResult<Vec<ExportBlocker>> {
        let mut blockers = Vec::new();
        if self.catalog.get_entry(project_id, &skill.skill_id)?.is_some() {
            blockers.push(ExportBlocker::AlreadyExported);
        }
        if skill.is_imported() {
            blockers.push(ExportBlocker::ImportedSkill);
        }
        let id_taken = self
            .catalog
            .find_entries_by_skill_id(&skill.skill_id)?
            .iter()
            .any(|entry| entry.source_project_id != project_id);
        if id_taken {
            blockers.push(ExportBlocker::SkillIdConflict);
        }
        let name_taken = self
            .catalog
            .find_entries_by_skill_name(&skill.name)?
            .iter()
            .any(|entry| entry.source_project_id != project_id);
        if name_taken {
            blockers.push(ExportBlocker::SkillNameConflict);
        }
        Ok(blockers)
    }

    pub fn check_exportable(
        &self,
        project_id: &str,
        skill_ids: &[String],
    ) -> CatalogResult<Vec<ExportabilityReport>> {
        self.require_project(project_id)?;
        skill_ids
            .iter()
            .map(|skill_id| -> CatalogResult<ExportabilityReport> {
                let blockers = match self.skills.get_skill(project_id, skill_id)? {
                    Some(skill) => self.blockers_for(project_id, &skill)?,
                    None => vec![ExportBlocker::SkillNotFound],
                };
                Ok(ExportabilityReport {
                    skill_id: skill_id.clone(),
                    exportable: blockers.is_empty(),
                    blockers,
                })
            })
            .collect()
    }

    /// Whether any catalog entry uses `skill_id_or_name` as its skill id or,
    /// ignoring case, as its skill name.
    pub fn exists_in_catalog(&self, project_id: &str, skill_id_or_name: &str) -> CatalogResult<bool> {
        self.require_project(project_id)?;
        if !self.catalog.find_entries_by_skill_id(skill_id_or_name)?.is_empty() {
            return Ok(true);
        }
        Ok(!self
            .catalog
            .find_entries_by_skill_name(skill_id_or_name)?
            .is_empty())
    }

    /// The project's own catalog entries with their importer counts.
    pub fn list_exported(
        &self,
        project_id: &str,
        query: &ExportedQuery,
    ) -> CatalogResult<Page<ExportedSkillView>> {
        self.require_project(project_id)?;
        let page = self.catalog.list_entries_for_project(project_id, query)?;
        Ok(page.map(ExportedSkillView::from))
    }

    pub fn export_one(&self, project_id: &str, skill_id: &str) -> CatalogResult<ExportResult> {
        let result = self.export_inner(project_id, skill_id);
        metrics::record_export(match &result {
            Ok(_) => "exported",
            Err(e) => e.code(),
        });
        result
    }

    fn export_inner(&self, project_id: &str, skill_id: &str) -> CatalogResult<ExportResult> {
        let project = self.require_project(project_id)?;
        let skill = self.skills.get_skill(project_id, skill_id)?.ok_or_else(|| {
            CatalogError::NotFound(format!("Skill {} not found in project {}", skill_id, project_id))
        })?;

        let blockers = self.blockers_for(project_id, &skill)?;
        if blockers.contains(&ExportBlocker::AlreadyExported) {
            return Err(CatalogError::Conflict(format!(
                "Skill {} of project {} is already exported",
                skill_id, project_id
            )));
        }
        if !blockers.is_empty() {
            return Err(CatalogError::NotExportable {
                skill_id: skill_id.to_string(),
                reasons: blockers.iter().map(|b| b.describe().to_string()).collect(),
            });
        }

        if project.total_points < self.min_project_points {
            return Err(CatalogError::InsufficientPoints {
                project_id: project_id.to_string(),
                total_points: project.total_points,
                required: self.min_project_points,
            });
        }

        let subject_name = self
            .skills
            .get_subject(project_id, &skill.subject_id)?
            .map(|subject| subject.name)
            .unwrap_or_else(|| skill.subject_id.clone());

        let new_entry = NewCatalogEntry {
            source_project_id: project_id.to_string(),
            source_skill_id: skill.skill_id.clone(),
            source_project_name: project.name,
            subject_id: skill.subject_id.clone(),
            subject_name,
            skill_name: skill.name.clone(),
        };
        // A concurrent export of the same skill wins the unique constraint
        let entry = self.catalog.insert_entry(&new_entry)?.ok_or_else(|| {
            CatalogError::Conflict(format!(
                "Skill {} of project {} is already exported",
                skill_id, project_id
            ))
        })?;

        info!("Exported skill {}/{} to the catalog", project_id, skill_id);
        metrics::set_catalog_entries(self.catalog.count_entries()?);
        Ok(entry.into())
    }

    /// Exports each skill independently, in the given order.
    pub fn export_many(&self, project_id: &str, skill_ids: &[String]) -> CatalogResult<BulkExportResult> {
        // Store failures abort the batch, per-skill failures do not
        self.require_project(project_id)?;

        let mut outcomes = Vec::with_capacity(skill_ids.len());
        for skill_id in skill_ids {
            let outcome = match self.export_one(project_id, skill_id) {
                Ok(result) => ExportOutcome::Exported {
                    skill_id: skill_id.clone(),
                    result,
                },
                Err(CatalogError::Conflict(_)) => ExportOutcome::AlreadyExported {
                    skill_id: skill_id.clone(),
                },
                Err(CatalogError::Store(e)) => return Err(CatalogError::Store(e)),
                Err(e) => {
                    warn!("Bulk export of {}/{} failed: {}", project_id, skill_id, e);
                    ExportOutcome::Failed {
                        skill_id: skill_id.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let result = BulkExportResult::from_outcomes(outcomes);
        if result.all_already_exported {
            debug!(
                "Bulk export for {}: all {} skills already in the catalog",
                project_id, result.already_exported_count
            );
        } else {
            info!(
                "Bulk export for {}: {} exported, {} already exported, {} failed",
                project_id, result.exported_count, result.already_exported_count, result.failed_count
            );
        }
        Ok(result)
    }
}
