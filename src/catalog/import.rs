//! Browsing the catalog and importing skills from it.

use super::error::{CatalogError, CatalogResult};
use super::finalization::FinalizationWorker;
use super::models::{
    BulkImportResult, CatalogEntryRef, CatalogEntryView, FinalizationSummary, FinalizeInfo,
    ImportOutcome, OutOfRangeSkill, PendingPointTotals, PointRange,
};
use crate::catalog_store::{
    CatalogStore, ImportBinding, ImportableQuery, NewImportBinding, Page,
};
use crate::server::metrics;
use crate::skill_store::{NewSkill, SkillStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ImportService {
    catalog: Arc<dyn CatalogStore>,
    skills: Arc<dyn SkillStore>,
    worker: Arc<FinalizationWorker>,
}

impl ImportService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        skills: Arc<dyn SkillStore>,
        worker: Arc<FinalizationWorker>,
    ) -> Self {
        Self {
            catalog,
            skills,
            worker,
        }
    }

    fn require_project(&self, project_id: &str) -> CatalogResult<()> {
        match self.skills.get_project(project_id)? {
            Some(_) => Ok(()),
            None => Err(CatalogError::NotFound(format!(
                "Project {} not found",
                project_id
            ))),
        }
    }

    /// Entries of other projects not yet imported by `destination_project_id`.
    pub fn list_importable(
        &self,
        destination_project_id: &str,
        query: &ImportableQuery,
    ) -> CatalogResult<Page<CatalogEntryView>> {
        self.require_project(destination_project_id)?;
        let page = self
            .catalog
            .list_importable_entries(destination_project_id, query)?;
        Ok(page.map(CatalogEntryView::from))
    }

    pub fn import_one(
        &self,
        destination_project_id: &str,
        destination_subject_id: &str,
        entry_ref: &CatalogEntryRef,
    ) -> CatalogResult<ImportBinding> {
        let result = self.import_inner(destination_project_id, destination_subject_id, entry_ref);
        metrics::record_import(match &result {
            Ok(_) => "imported",
            Err(e) => e.code(),
        });
        result
    }

    fn import_inner(
        &self,
        destination_project_id: &str,
        destination_subject_id: &str,
        entry_ref: &CatalogEntryRef,
    ) -> CatalogResult<ImportBinding> {
        if self.worker.is_draining(destination_project_id) {
            return Err(CatalogError::FinalizationInProgress(
                destination_project_id.to_string(),
            ));
        }

        let entry = self
            .catalog
            .get_entry(&entry_ref.project_id, &entry_ref.skill_id)?
            .ok_or_else(|| {
                CatalogError::NotFound(format!(
                    "Skill {} of project {} is not in the catalog",
                    entry_ref.skill_id, entry_ref.project_id
                ))
            })?;

        if entry.source_project_id == destination_project_id {
            return Err(CatalogError::SelfImport {
                project_id: destination_project_id.to_string(),
                skill_id: entry.source_skill_id,
            });
        }
        if self
            .catalog
            .find_binding_for_entry(entry.id, destination_project_id)?
            .is_some()
        {
            return Err(CatalogError::AlreadyImported {
                source_project_id: entry.source_project_id,
                skill_id: entry.source_skill_id,
                destination_project_id: destination_project_id.to_string(),
            });
        }

        self.require_project(destination_project_id)?;
        if self
            .skills
            .get_subject(destination_project_id, destination_subject_id)?
            .is_none()
        {
            return Err(CatalogError::NotFound(format!(
                "Subject {} not found in project {}",
                destination_subject_id, destination_project_id
            )));
        }
        if self
            .skills
            .get_skill(destination_project_id, &entry.source_skill_id)?
            .is_some()
        {
            return Err(CatalogError::Conflict(format!(
                "Project {} already has a skill with id {}",
                destination_project_id, entry.source_skill_id
            )));
        }

        let source = self
            .skills
            .get_skill(&entry.source_project_id, &entry.source_skill_id)?
            .ok_or_else(|| {
                CatalogError::NotFound(format!(
                    "Source skill {}/{} no longer exists",
                    entry.source_project_id, entry.source_skill_id
                ))
            })?;

        // Disabled until finalized; starts from the source increment, owned locally afterwards
        let shadow = NewSkill {
            skill_id: source.skill_id.clone(),
            name: source.name.clone(),
            description: source.description.clone(),
            help_url: source.help_url.clone(),
            point_increment: source.point_increment,
            num_perform_to_completion: source.num_perform_to_completion,
            time_window_minutes: source.time_window_minutes,
            num_max_occurrences_in_window: source.num_max_occurrences_in_window,
            enabled: false,
            copied_from_project_id: Some(entry.source_project_id.clone()),
        };
        self.skills
            .create_skill(destination_project_id, destination_subject_id, &shadow)?;

        let new_binding = NewImportBinding {
            catalog_entry_id: entry.id,
            destination_project_id: destination_project_id.to_string(),
            destination_subject_id: destination_subject_id.to_string(),
            destination_skill_id: source.skill_id.clone(),
        };
        let binding = match self.catalog.insert_binding(&new_binding) {
            Ok(Some(binding)) => binding,
            outcome => {
                // Lost a race with a concurrent import, or the store failed
                if let Err(e) = self
                    .skills
                    .delete_skill(destination_project_id, &source.skill_id)
                {
                    warn!(
                        "Failed to roll back shadow skill {}/{}: {}",
                        destination_project_id, source.skill_id, e
                    );
                }
                return Err(match outcome {
                    Ok(_) => CatalogError::AlreadyImported {
                        source_project_id: entry.source_project_id,
                        skill_id: entry.source_skill_id,
                        destination_project_id: destination_project_id.to_string(),
                    },
                    Err(e) => CatalogError::Store(e),
                });
            }
        };

        self.withdraw_if_draining(&binding)?;

        info!(
            "Project {} imported {}/{} into subject {} (binding {})",
            destination_project_id,
            entry.source_project_id,
            entry.source_skill_id,
            destination_subject_id,
            binding.id
        );
        self.worker.enqueue(binding.id);
        Ok(binding)
    }

    /// A drain that started after the check at the top of the import has
    /// already taken its snapshot and would not see this binding, so the
    /// import is undone.
    fn withdraw_if_draining(&self, binding: &ImportBinding) -> CatalogResult<()> {
        let project_id = &binding.destination_project_id;
        if !self.worker.is_draining(project_id) {
            return Ok(());
        }
        self.catalog.delete_binding(binding.id)?;
        self.skills
            .delete_skill(project_id, &binding.destination_skill_id)?;
        Err(CatalogError::FinalizationInProgress(project_id.clone()))
    }

    /// Imports each entry independently, in the given order.
    pub fn import_many(
        &self,
        destination_project_id: &str,
        destination_subject_id: &str,
        entry_refs: &[CatalogEntryRef],
    ) -> CatalogResult<BulkImportResult> {
        let mut outcomes = Vec::with_capacity(entry_refs.len());
        for entry_ref in entry_refs {
            match self.import_one(destination_project_id, destination_subject_id, entry_ref) {
                Ok(binding) => outcomes.push(ImportOutcome::Imported {
                    entry_ref: entry_ref.clone(),
                    binding,
                }),
                Err(CatalogError::Store(e)) => return Err(CatalogError::Store(e)),
                Err(e) => outcomes.push(ImportOutcome::Failed {
                    entry_ref: entry_ref.clone(),
                    code: e.code().to_string(),
                    reason: e.to_string(),
                }),
            }
        }
        Ok(BulkImportResult::from_outcomes(outcomes))
    }

    /// Waits until every pending import of the project has been synced once.
    pub async fn finalize_project(&self, project_id: &str) -> CatalogResult<FinalizationSummary> {
        self.require_project(project_id)?;
        Ok(self.worker.drain_project(project_id).await?)
    }

    pub fn finalize_info(&self, project_id: &str) -> CatalogResult<FinalizeInfo> {
        let project = self.skills.get_project(project_id)?.ok_or_else(|| {
            CatalogError::NotFound(format!("Project {} not found", project_id))
        })?;

        let pending_ids: HashSet<String> = self
            .catalog
            .list_unfinalized_bindings(Some(project_id))?
            .into_iter()
            .map(|binding| binding.destination_skill_id)
            .collect();
        let skills = self.skills.list_skills(project_id)?;

        let project_point_range = skills
            .iter()
            .filter(|skill| !skill.is_imported())
            .map(|skill| skill.total_points)
            .fold(None, |range: Option<PointRange>, points| {
                Some(match range {
                    None => PointRange {
                        min_points: points,
                        max_points: points,
                    },
                    Some(range) => PointRange {
                        min_points: range.min_points.min(points),
                        max_points: range.max_points.max(points),
                    },
                })
            });

        let pending: Vec<_> = skills
            .iter()
            .filter(|skill| pending_ids.contains(&skill.skill_id))
            .collect();
        let skills_out_of_range = match project_point_range {
            Some(range) => pending
                .iter()
                .filter(|skill| {
                    skill.total_points < range.min_points || skill.total_points > range.max_points
                })
                .map(|skill| OutOfRangeSkill {
                    skill_id: skill.skill_id.clone(),
                    skill_name: skill.name.clone(),
                    total_points: skill.total_points,
                })
                .collect(),
            None => Vec::new(),
        };
        let pending_points: i64 = pending
            .iter()
            .filter(|skill| !skill.enabled)
            .map(|skill| skill.total_points)
            .sum();

        Ok(FinalizeInfo {
            project_id: project_id.to_string(),
            num_skills_to_finalize: pending.len(),
            is_running: self.worker.is_draining(project_id),
            project_point_range,
            skills_out_of_range,
            point_totals: PendingPointTotals {
                current_total_points: project.total_points,
                total_points_including_pending: project.total_points + pending_points,
            },
        })
    }

    /// Drops the binding of a shadow skill its project deleted. Returns
    /// whether the skill was bound.
    pub fn destination_skill_deleted(&self, project_id: &str, skill_id: &str) -> CatalogResult<bool> {
        match self.catalog.find_binding_for_destination(project_id, skill_id)? {
            Some(binding) => {
                self.catalog.delete_binding(binding.id)?;
                info!(
                    "Imported skill {}/{} deleted, removed binding {}",
                    project_id, skill_id, binding.id
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
