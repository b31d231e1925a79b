//! Storage traits of the catalog.
//!
//! `CatalogRegistry` owns exported skill entries, `ImportBindingStore` owns the
//! bindings that reference them. `CatalogStore` combines both and adds the
//! operations that must span them in one transaction.

use super::models::{
    CatalogEntry, ExportedEntrySummary, ExportedQuery, ImportBinding, ImportableQuery,
    NewCatalogEntry, NewImportBinding, Page, PendingDetachment,
};
use anyhow::Result;

pub trait CatalogRegistry: Send + Sync {
    /// Inserts an entry. Returns None when the skill is already exported.
    fn insert_entry(&self, entry: &NewCatalogEntry) -> Result<Option<CatalogEntry>>;

    fn get_entry(&self, source_project_id: &str, source_skill_id: &str)
        -> Result<Option<CatalogEntry>>;

    fn get_entry_by_id(&self, entry_id: i64) -> Result<Option<CatalogEntry>>;

    /// Entries exported by a project, with their importer counts.
    fn list_entries_for_project(
        &self,
        source_project_id: &str,
        query: &ExportedQuery,
    ) -> Result<Page<ExportedEntrySummary>>;

    /// Entries from other projects that `destination_project_id` has not imported yet.
    fn list_importable_entries(
        &self,
        destination_project_id: &str,
        query: &ImportableQuery,
    ) -> Result<Page<CatalogEntry>>;

    /// Entries, from any project, whose source skill id equals `skill_id`.
    fn find_entries_by_skill_id(&self, skill_id: &str) -> Result<Vec<CatalogEntry>>;

    /// Entries, from any project, whose skill name equals `name` ignoring case.
    fn find_entries_by_skill_name(&self, name: &str) -> Result<Vec<CatalogEntry>>;

    /// Refreshes the denormalized display fields of an entry.
    fn refresh_display_fields(
        &self,
        entry_id: i64,
        skill_name: &str,
        subject_name: &str,
        source_project_name: &str,
    ) -> Result<bool>;

    fn count_entries(&self) -> Result<i64>;
}

pub trait ImportBindingStore: Send + Sync {
    /// Inserts a binding. Returns None when the destination project already
    /// imported this entry or the destination skill is already bound.
    fn insert_binding(&self, binding: &NewImportBinding) -> Result<Option<ImportBinding>>;

    fn get_binding(&self, binding_id: i64) -> Result<Option<ImportBinding>>;

    fn find_binding_for_entry(
        &self,
        catalog_entry_id: i64,
        destination_project_id: &str,
    ) -> Result<Option<ImportBinding>>;

    fn find_binding_for_destination(
        &self,
        destination_project_id: &str,
        destination_skill_id: &str,
    ) -> Result<Option<ImportBinding>>;

    fn list_bindings_for_entry(&self, catalog_entry_id: i64) -> Result<Vec<ImportBinding>>;

    fn list_bindings_for_project(&self, destination_project_id: &str) -> Result<Vec<ImportBinding>>;

    /// Bindings not yet finalized, optionally restricted to one destination project.
    fn list_unfinalized_bindings(
        &self,
        destination_project_id: Option<&str>,
    ) -> Result<Vec<ImportBinding>>;

    fn count_bindings_for_entry(&self, catalog_entry_id: i64) -> Result<i64>;

    /// Marks a binding finalized and stamps its last sync time.
    fn mark_binding_synced(&self, binding_id: i64, synced_at: i64) -> Result<bool>;

    fn delete_binding(&self, binding_id: i64) -> Result<bool>;
}

pub trait CatalogStore: CatalogRegistry + ImportBindingStore {
    /// Atomically deletes an entry and its bindings, queueing every bound
    /// destination skill for detachment. Returns the removed bindings.
    fn delete_entry_cascade(&self, entry_id: i64) -> Result<Vec<ImportBinding>>;

    fn list_pending_detachments(&self) -> Result<Vec<PendingDetachment>>;

    fn complete_detachment(
        &self,
        destination_project_id: &str,
        destination_skill_id: &str,
    ) -> Result<bool>;

    fn record_detachment_attempt(
        &self,
        destination_project_id: &str,
        destination_skill_id: &str,
    ) -> Result<()>;
}
