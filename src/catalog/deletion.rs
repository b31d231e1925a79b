//! Removing entries from the catalog.
//!
//! The entry and its bindings go away in one transaction. Shadow skills in the
//! importing projects live in a different store, so they are detached afterwards
//! from the durable pending list, which is retried until it is empty.

use super::error::{CatalogError, CatalogResult};
use super::models::{DeletionResult, ImporterView};
use crate::catalog_store::{CatalogStore, PendingDetachment};
use crate::server::metrics;
use crate::skill_store::SkillStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Text the user must type to confirm a deletion.
pub const DELETE_CONFIRMATION: &str = "Delete Me";

pub struct CatalogDeletionService {
    catalog: Arc<dyn CatalogStore>,
    skills: Arc<dyn SkillStore>,
}

impl CatalogDeletionService {
    pub fn new(catalog: Arc<dyn CatalogStore>, skills: Arc<dyn SkillStore>) -> Self {
        Self { catalog, skills }
    }

    pub fn delete_entry(
        &self,
        project_id: &str,
        skill_id: &str,
        confirmation_text: &str,
    ) -> CatalogResult<DeletionResult> {
        let result = self.delete_inner(project_id, skill_id, confirmation_text);
        metrics::record_deletion(match &result {
            Ok(_) => "deleted",
            Err(e) => e.code(),
        });
        result
    }

    fn delete_inner(
        &self,
        project_id: &str,
        skill_id: &str,
        confirmation_text: &str,
    ) -> CatalogResult<DeletionResult> {
        if confirmation_text != DELETE_CONFIRMATION {
            return Err(CatalogError::ValidationError(format!(
                "Confirmation text must be exactly '{}'",
                DELETE_CONFIRMATION
            )));
        }

        let entry = self
            .catalog
            .get_entry(project_id, skill_id)?
            .ok_or_else(|| {
                CatalogError::NotFound(format!(
                    "Skill {} of project {} is not in the catalog",
                    skill_id, project_id
                ))
            })?;

        let importer_count = self.catalog.count_bindings_for_entry(entry.id)?;
        let removed = self.catalog.delete_entry_cascade(entry.id)?;
        info!(
            "Deleted catalog entry {}/{} with {} imports",
            project_id,
            skill_id,
            removed.len()
        );

        for binding in &removed {
            let pending = PendingDetachment {
                destination_project_id: binding.destination_project_id.clone(),
                destination_skill_id: binding.destination_skill_id.clone(),
                queued_at: 0,
                attempts: 0,
            };
            // Failures stay queued for the worker's retry sweep
            let _ = detach(self.catalog.as_ref(), self.skills.as_ref(), &pending);
        }

        metrics::set_catalog_entries(self.catalog.count_entries()?);

        let message = (importer_count > 0).then(|| {
            format!(
                "This skill is currently imported by {} projects",
                importer_count
            )
        });
        Ok(DeletionResult {
            deleted: true,
            importer_count,
            message,
        })
    }

    /// Projects importing an entry, with their current status.
    pub fn list_importers(&self, project_id: &str, skill_id: &str) -> CatalogResult<Vec<ImporterView>> {
        let Some(entry) = self.catalog.get_entry(project_id, skill_id)? else {
            return Ok(Vec::new());
        };

        let mut importers = Vec::new();
        for binding in self.catalog.list_bindings_for_entry(entry.id)? {
            let project = self.skills.get_project(&binding.destination_project_id)?;
            importers.push(ImporterView {
                destination_project_name: project
                    .as_ref()
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| binding.destination_project_id.clone()),
                destination_project_enabled: project.is_some_and(|p| p.enabled),
                destination_project_id: binding.destination_project_id,
                imported_at: binding.imported_at,
                finalized: binding.finalized,
            });
        }
        importers.sort_by(|a, b| a.destination_project_name.cmp(&b.destination_project_name));
        Ok(importers)
    }
}

/// Detaches one shadow skill and clears its pending record. A skill that is
/// already gone or already detached counts as done.
fn detach(
    catalog: &dyn CatalogStore,
    skills: &dyn SkillStore,
    pending: &PendingDetachment,
) -> anyhow::Result<()> {
    let outcome = skills
        .detach_imported_skill(&pending.destination_project_id, &pending.destination_skill_id)
        .and_then(|_| {
            catalog.complete_detachment(
                &pending.destination_project_id,
                &pending.destination_skill_id,
            )
        });
    match outcome {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(
                "Failed to detach imported skill {}/{}: {:#}",
                pending.destination_project_id, pending.destination_skill_id, e
            );
            catalog.record_detachment_attempt(
                &pending.destination_project_id,
                &pending.destination_skill_id,
            )?;
            Err(e)
        }
    }
}

/// Retries every queued detachment. Returns how many completed.
pub fn retry_pending_detachments(
    catalog: &dyn CatalogStore,
    skills: &dyn SkillStore,
) -> anyhow::Result<usize> {
    let mut completed = 0;
    for pending in catalog.list_pending_detachments()? {
        if detach(catalog, skills, &pending).is_ok() {
            completed += 1;
        }
    }
    Ok(completed)
}
