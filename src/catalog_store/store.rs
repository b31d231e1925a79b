//! SQLite-backed catalog store.

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::{CatalogRegistry, CatalogStore, ImportBindingStore};
use crate::mutex_ext::MutexExt;
use crate::sqlite_persistence::{open_in_memory_db, open_versioned_db};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const ENTRY_COLUMNS: &str = "e.id, e.source_project_id, e.source_skill_id, e.source_project_name,
    e.subject_id, e.subject_name, e.skill_name, e.exported_at";

const BINDING_COLUMNS: &str = "id, catalog_entry_id, destination_project_id,
    destination_subject_id, destination_skill_id, imported_at, finalized, last_synced_at";

#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        info!(
            "Catalog database ready with {} exported skills",
            store.count_entries()?
        );
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory_db(CATALOG_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CatalogEntry> {
        Ok(CatalogEntry {
            id: row.get("id")?,
            source_project_id: row.get("source_project_id")?,
            source_skill_id: row.get("source_skill_id")?,
            source_project_name: row.get("source_project_name")?,
            subject_id: row.get("subject_id")?,
            subject_name: row.get("subject_name")?,
            skill_name: row.get("skill_name")?,
            exported_at: row.get("exported_at")?,
        })
    }

    fn row_to_binding(row: &rusqlite::Row) -> rusqlite::Result<ImportBinding> {
        Ok(ImportBinding {
            id: row.get("id")?,
            catalog_entry_id: row.get("catalog_entry_id")?,
            destination_project_id: row.get("destination_project_id")?,
            destination_subject_id: row.get("destination_subject_id")?,
            destination_skill_id: row.get("destination_skill_id")?,
            imported_at: row.get("imported_at")?,
            finalized: row.get::<_, i32>("finalized")? != 0,
            last_synced_at: row.get("last_synced_at")?,
        })
    }

    fn query_entries(
        conn: &Connection,
        where_clause: &str,
        param: &str,
    ) -> Result<Vec<CatalogEntry>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM exported_skills e WHERE {} ORDER BY e.id",
            ENTRY_COLUMNS, where_clause
        ))?;
        let entries = stmt
            .query_map(params![param], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn query_bindings(
        conn: &Connection,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ImportBinding>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_bindings WHERE {} ORDER BY id",
            BINDING_COLUMNS, where_clause
        ))?;
        let bindings = stmt
            .query_map(params, Self::row_to_binding)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bindings)
    }

    fn query_binding(
        conn: &Connection,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<ImportBinding>> {
        let binding = conn
            .query_row(
                &format!(
                    "SELECT {} FROM import_bindings WHERE {}",
                    BINDING_COLUMNS, where_clause
                ),
                params,
                Self::row_to_binding,
            )
            .optional()?;
        Ok(binding)
    }
}

impl CatalogRegistry for SqliteCatalogStore {
    fn insert_entry(&self, entry: &NewCatalogEntry) -> Result<Option<CatalogEntry>> {
        let conn = self.conn.lock_or_recover();
        let exported_at = now_millis();
        let inserted = conn
            .execute(
                "INSERT INTO exported_skills (source_project_id, source_skill_id,
                    source_project_name, subject_id, subject_name, skill_name, exported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (source_project_id, source_skill_id) DO NOTHING",
                params![
                    entry.source_project_id,
                    entry.source_skill_id,
                    entry.source_project_name,
                    entry.subject_id,
                    entry.subject_name,
                    entry.skill_name,
                    exported_at,
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to insert catalog entry for {}/{}",
                    entry.source_project_id, entry.source_skill_id
                )
            })?;
        if inserted == 0 {
            return Ok(None);
        }

        Ok(Some(CatalogEntry {
            id: conn.last_insert_rowid(),
            source_project_id: entry.source_project_id.clone(),
            source_skill_id: entry.source_skill_id.clone(),
            source_project_name: entry.source_project_name.clone(),
            subject_id: entry.subject_id.clone(),
            subject_name: entry.subject_name.clone(),
            skill_name: entry.skill_name.clone(),
            exported_at,
        }))
    }

    fn get_entry(
        &self,
        source_project_id: &str,
        source_skill_id: &str,
    ) -> Result<Option<CatalogEntry>> {
        let conn = self.conn.lock_or_recover();
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM exported_skills e
                     WHERE e.source_project_id = ?1 AND e.source_skill_id = ?2",
                    ENTRY_COLUMNS
                ),
                params![source_project_id, source_skill_id],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn get_entry_by_id(&self, entry_id: i64) -> Result<Option<CatalogEntry>> {
        let conn = self.conn.lock_or_recover();
        let entry = conn
            .query_row(
                &format!("SELECT {} FROM exported_skills e WHERE e.id = ?1", ENTRY_COLUMNS),
                params![entry_id],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn list_entries_for_project(
        &self,
        source_project_id: &str,
        query: &ExportedQuery,
    ) -> Result<Page<ExportedEntrySummary>> {
        let conn = self.conn.lock_or_recover();
        let total_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM exported_skills WHERE source_project_id = ?1",
            params![source_project_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {},
                (SELECT COUNT(*) FROM import_bindings b WHERE b.catalog_entry_id = e.id)
                    AS importer_count
             FROM exported_skills e
             WHERE e.source_project_id = ?1
             {}
             LIMIT ?2 OFFSET ?3",
            ENTRY_COLUMNS,
            query.order_by()
        ))?;
        let items = stmt
            .query_map(
                params![
                    source_project_id,
                    query.page.page_size as i64,
                    query.page.offset()
                ],
                |row| {
                    Ok(ExportedEntrySummary {
                        entry: Self::row_to_entry(row)?,
                        importer_count: row.get("importer_count")?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total_count,
            page: query.page.page,
            page_size: query.page.page_size,
        })
    }

    fn list_importable_entries(
        &self,
        destination_project_id: &str,
        query: &ImportableQuery,
    ) -> Result<Page<CatalogEntry>> {
        let conn = self.conn.lock_or_recover();
        let filter = r"e.source_project_id != ?1
            AND NOT EXISTS (
                SELECT 1 FROM import_bindings b
                WHERE b.catalog_entry_id = e.id AND b.destination_project_id = ?1
            )
            AND (?2 IS NULL OR e.skill_name LIKE ?2 ESCAPE '\')
            AND (?3 IS NULL OR e.source_project_name LIKE ?3 ESCAPE '\')";
        let skill_name = query.skill_name.as_deref().map(like_pattern);
        let project_name = query.project_name.as_deref().map(like_pattern);

        let total_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM exported_skills e WHERE {}", filter),
            params![destination_project_id, skill_name, project_name],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM exported_skills e WHERE {} {} LIMIT ?4 OFFSET ?5",
            ENTRY_COLUMNS,
            filter,
            query.order_by()
        ))?;
        let items = stmt
            .query_map(
                params![
                    destination_project_id,
                    skill_name,
                    project_name,
                    query.page.page_size as i64,
                    query.page.offset()
                ],
                Self::row_to_entry,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total_count,
            page: query.page.page,
            page_size: query.page.page_size,
        })
    }

    fn find_entries_by_skill_id(&self, skill_id: &str) -> Result<Vec<CatalogEntry>> {
        let conn = self.conn.lock_or_recover();
        Self::query_entries(&conn, "e.source_skill_id = ?1", skill_id)
    }

    fn find_entries_by_skill_name(&self, name: &str) -> Result<Vec<CatalogEntry>> {
        let conn = self.conn.lock_or_recover();
        Self::query_entries(&conn, "e.skill_name = ?1 COLLATE NOCASE", name)
    }

    fn refresh_display_fields(
        &self,
        entry_id: i64,
        skill_name: &str,
        subject_name: &str,
        source_project_name: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock_or_recover();
        let updated = conn.execute(
            "UPDATE exported_skills SET skill_name = ?1, subject_name = ?2, source_project_name = ?3
             WHERE id = ?4",
            params![skill_name, subject_name, source_project_name, entry_id],
        )?;
        Ok(updated > 0)
    }

    fn count_entries(&self) -> Result<i64> {
        let conn = self.conn.lock_or_recover();
        let count = conn.query_row("SELECT COUNT(*) FROM exported_skills", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl ImportBindingStore for SqliteCatalogStore {
    fn insert_binding(&self, binding: &NewImportBinding) -> Result<Option<ImportBinding>> {
        let conn = self.conn.lock_or_recover();
        let imported_at = now_millis();
        let inserted = conn
            .execute(
                "INSERT INTO import_bindings (catalog_entry_id, destination_project_id,
                    destination_subject_id, destination_skill_id, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT DO NOTHING",
                params![
                    binding.catalog_entry_id,
                    binding.destination_project_id,
                    binding.destination_subject_id,
                    binding.destination_skill_id,
                    imported_at,
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to insert import binding of entry {} into {}",
                    binding.catalog_entry_id, binding.destination_project_id
                )
            })?;
        if inserted == 0 {
            return Ok(None);
        }

        Ok(Some(ImportBinding {
            id: conn.last_insert_rowid(),
            catalog_entry_id: binding.catalog_entry_id,
            destination_project_id: binding.destination_project_id.clone(),
            destination_subject_id: binding.destination_subject_id.clone(),
            destination_skill_id: binding.destination_skill_id.clone(),
            imported_at,
            finalized: false,
            last_synced_at: None,
        }))
    }

    fn get_binding(&self, binding_id: i64) -> Result<Option<ImportBinding>> {
        let conn = self.conn.lock_or_recover();
        Self::query_binding(&conn, "id = ?1", &[&binding_id])
    }

    fn find_binding_for_entry(
        &self,
        catalog_entry_id: i64,
        destination_project_id: &str,
    ) -> Result<Option<ImportBinding>> {
        let conn = self.conn.lock_or_recover();
        Self::query_binding(
            &conn,
            "catalog_entry_id = ?1 AND destination_project_id = ?2",
            &[&catalog_entry_id, &destination_project_id],
        )
    }

    fn find_binding_for_destination(
        &self,
        destination_project_id: &str,
        destination_skill_id: &str,
    ) -> Result<Option<ImportBinding>> {
        let conn = self.conn.lock_or_recover();
        Self::query_binding(
            &conn,
            "destination_project_id = ?1 AND destination_skill_id = ?2",
            &[&destination_project_id, &destination_skill_id],
        )
    }

    fn list_bindings_for_entry(&self, catalog_entry_id: i64) -> Result<Vec<ImportBinding>> {
        let conn = self.conn.lock_or_recover();
        Self::query_bindings(&conn, "catalog_entry_id = ?1", &[&catalog_entry_id])
    }

    fn list_bindings_for_project(&self, destination_project_id: &str) -> Result<Vec<ImportBinding>> {
        let conn = self.conn.lock_or_recover();
        Self::query_bindings(
            &conn,
            "destination_project_id = ?1",
            &[&destination_project_id],
        )
    }

    fn list_unfinalized_bindings(
        &self,
        destination_project_id: Option<&str>,
    ) -> Result<Vec<ImportBinding>> {
        let conn = self.conn.lock_or_recover();
        Self::query_bindings(
            &conn,
            "finalized = 0 AND (?1 IS NULL OR destination_project_id = ?1)",
            &[&destination_project_id],
        )
    }

    fn count_bindings_for_entry(&self, catalog_entry_id: i64) -> Result<i64> {
        let conn = self.conn.lock_or_recover();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM import_bindings WHERE catalog_entry_id = ?1",
            params![catalog_entry_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn mark_binding_synced(&self, binding_id: i64, synced_at: i64) -> Result<bool> {
        let conn = self.conn.lock_or_recover();
        let updated = conn.execute(
            "UPDATE import_bindings SET finalized = 1, last_synced_at = ?1 WHERE id = ?2",
            params![synced_at, binding_id],
        )?;
        Ok(updated > 0)
    }

    fn delete_binding(&self, binding_id: i64) -> Result<bool> {
        let conn = self.conn.lock_or_recover();
        let deleted = conn.execute(
            "DELETE FROM import_bindings WHERE id = ?1",
            params![binding_id],
        )?;
        Ok(deleted > 0)
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn delete_entry_cascade(&self, entry_id: i64) -> Result<Vec<ImportBinding>> {
        let mut conn = self.conn.lock_or_recover();
        let tx = conn.transaction()?;

        let bindings = Self::query_bindings(&tx, "catalog_entry_id = ?1", &[&entry_id])?;
        let queued_at = now_millis();
        for binding in &bindings {
            tx.execute(
                "INSERT INTO pending_detachments (destination_project_id, destination_skill_id, queued_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (destination_project_id, destination_skill_id) DO NOTHING",
                params![
                    binding.destination_project_id,
                    binding.destination_skill_id,
                    queued_at
                ],
            )?;
        }
        tx.execute(
            "DELETE FROM import_bindings WHERE catalog_entry_id = ?1",
            params![entry_id],
        )?;
        let deleted = tx.execute("DELETE FROM exported_skills WHERE id = ?1", params![entry_id])?;
        tx.commit()
            .with_context(|| format!("Failed to commit deletion of catalog entry {}", entry_id))?;

        debug!(
            "Deleted catalog entry {} ({} rows) with {} bindings",
            entry_id,
            deleted,
            bindings.len()
        );
        Ok(bindings)
    }

    fn list_pending_detachments(&self) -> Result<Vec<PendingDetachment>> {
        let conn = self.conn.lock_or_recover();
        let mut stmt = conn.prepare(
            "SELECT destination_project_id, destination_skill_id, queued_at, attempts
             FROM pending_detachments ORDER BY id",
        )?;
        let pending = stmt
            .query_map([], |row| {
                Ok(PendingDetachment {
                    destination_project_id: row.get(0)?,
                    destination_skill_id: row.get(1)?,
                    queued_at: row.get(2)?,
                    attempts: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pending)
    }

    fn complete_detachment(
        &self,
        destination_project_id: &str,
        destination_skill_id: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock_or_recover();
        let deleted = conn.execute(
            "DELETE FROM pending_detachments
             WHERE destination_project_id = ?1 AND destination_skill_id = ?2",
            params![destination_project_id, destination_skill_id],
        )?;
        Ok(deleted > 0)
    }

    fn record_detachment_attempt(
        &self,
        destination_project_id: &str,
        destination_skill_id: &str,
    ) -> Result<()> {
        let conn = self.conn.lock_or_recover();
        conn.execute(
            "UPDATE pending_detachments SET attempts = attempts + 1
             WHERE destination_project_id = ?1 AND destination_skill_id = ?2",
            params![destination_project_id, destination_skill_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(project_id: &str, skill_id: &str, skill_name: &str) -> NewCatalogEntry {
        NewCatalogEntry {
            source_project_id: project_id.to_string(),
            source_skill_id: skill_id.to_string(),
            source_project_name: format!("Project {}", project_id),
            subject_id: "subj1".to_string(),
            subject_name: "Subject 1".to_string(),
            skill_name: skill_name.to_string(),
        }
    }

    fn new_binding(entry_id: i64, project_id: &str, skill_id: &str) -> NewImportBinding {
        NewImportBinding {
            catalog_entry_id: entry_id,
            destination_project_id: project_id.to_string(),
            destination_subject_id: "subj".to_string(),
            destination_skill_id: skill_id.to_string(),
        }
    }

    fn importable_query() -> ImportableQuery {
        ImportableQuery {
            page: PageRequest {
                page: 1,
                page_size: 10,
            },
            skill_name: None,
            project_name: None,
            sort_by: ImportableSortField::ExportedAt,
            sort_dir: SortDirection::Desc,
        }
    }

    fn create_test_store() -> SqliteCatalogStore {
        SqliteCatalogStore::in_memory().unwrap()
    }

    #[test]
    fn test_insert_entry_twice_returns_none() {
        let store = create_test_store();
        let entry = new_entry("proj1", "skill1", "Very Great Skill 1");

        let created = store.insert_entry(&entry).unwrap().unwrap();
        assert_eq!(created.skill_name, "Very Great Skill 1");
        assert!(store.insert_entry(&entry).unwrap().is_none());
        assert_eq!(store.count_entries().unwrap(), 1);
        assert_eq!(
            store.get_entry("proj1", "skill1").unwrap().unwrap().id,
            created.id
        );
    }

    #[test]
    fn test_importable_excludes_own_and_imported_entries() {
        let store = create_test_store();
        let own = store.insert_entry(&new_entry("proj2", "own", "Own")).unwrap().unwrap();
        let imported = store.insert_entry(&new_entry("proj1", "a", "A")).unwrap().unwrap();
        let available = store.insert_entry(&new_entry("proj1", "b", "B")).unwrap().unwrap();
        store
            .insert_binding(&new_binding(imported.id, "proj2", "a"))
            .unwrap()
            .unwrap();

        let page = store
            .list_importable_entries("proj2", &importable_query())
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items, vec![available.clone()]);

        let page = store
            .list_importable_entries("proj3", &importable_query())
            .unwrap();
        let ids: Vec<i64> = page.items.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![available.id, imported.id, own.id]);
    }

    #[test]
    fn test_importable_filters_and_sorts() {
        let store = create_test_store();
        store.insert_entry(&new_entry("proj1", "a", "beta skill")).unwrap();
        store.insert_entry(&new_entry("proj1", "b", "Alpha Skill")).unwrap();
        store.insert_entry(&new_entry("proj3", "c", "Gamma 100%")).unwrap();

        let mut query = importable_query();
        query.sort_by = ImportableSortField::SkillName;
        query.sort_dir = SortDirection::Asc;
        let names: Vec<String> = store
            .list_importable_entries("proj2", &query)
            .unwrap()
            .items
            .into_iter()
            .map(|e| e.skill_name)
            .collect();
        assert_eq!(names, vec!["Alpha Skill", "beta skill", "Gamma 100%"]);

        query.skill_name = Some("SKILL".to_string());
        assert_eq!(store.list_importable_entries("proj2", &query).unwrap().total_count, 2);

        query.skill_name = Some("0%".to_string());
        assert_eq!(store.list_importable_entries("proj2", &query).unwrap().total_count, 1);

        query.skill_name = None;
        query.project_name = Some("proj3".to_string());
        let page = store.list_importable_entries("proj2", &query).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].source_skill_id, "c");
    }

    #[test]
    fn test_importable_paging() {
        let store = create_test_store();
        for i in 0..5 {
            store
                .insert_entry(&new_entry("proj1", &format!("skill{}", i), &format!("Skill {}", i)))
                .unwrap();
        }
        let mut query = importable_query();
        query.page = PageRequest {
            page: 2,
            page_size: 2,
        };
        query.sort_by = ImportableSortField::SkillName;
        query.sort_dir = SortDirection::Asc;

        let page = store.list_importable_entries("proj2", &query).unwrap();
        assert_eq!(page.total_count, 5);
        let names: Vec<&str> = page.items.iter().map(|e| e.skill_name.as_str()).collect();
        assert_eq!(names, vec!["Skill 2", "Skill 3"]);
    }

    #[test]
    fn test_binding_uniqueness() {
        let store = create_test_store();
        let a = store.insert_entry(&new_entry("proj1", "a", "A")).unwrap().unwrap();
        let b = store.insert_entry(&new_entry("proj1", "b", "B")).unwrap().unwrap();

        assert!(store.insert_binding(&new_binding(a.id, "proj2", "a")).unwrap().is_some());
        // Same entry into the same project
        assert!(store.insert_binding(&new_binding(a.id, "proj2", "other")).unwrap().is_none());
        // Same destination skill from another entry
        assert!(store.insert_binding(&new_binding(b.id, "proj2", "a")).unwrap().is_none());
        assert!(store.insert_binding(&new_binding(a.id, "proj3", "a")).unwrap().is_some());

        assert_eq!(store.count_bindings_for_entry(a.id).unwrap(), 2);
        assert_eq!(store.count_bindings_for_entry(b.id).unwrap(), 0);
    }

    #[test]
    fn test_list_exported_with_importer_counts() {
        let store = create_test_store();
        let a = store.insert_entry(&new_entry("proj1", "a", "A")).unwrap().unwrap();
        store.insert_entry(&new_entry("proj1", "b", "B")).unwrap();
        store.insert_entry(&new_entry("proj9", "c", "C")).unwrap();
        store.insert_binding(&new_binding(a.id, "proj2", "a")).unwrap();
        store.insert_binding(&new_binding(a.id, "proj3", "a")).unwrap();

        let query = ExportedQuery {
            page: PageRequest {
                page: 1,
                page_size: 10,
            },
            sort_by: ExportedSortField::ImporterCount,
            sort_dir: SortDirection::Desc,
        };
        let page = store.list_entries_for_project("proj1", &query).unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.items[0].entry.source_skill_id, "a");
        assert_eq!(page.items[0].importer_count, 2);
        assert_eq!(page.items[1].importer_count, 0);
    }

    #[test]
    fn test_mark_synced_and_unfinalized_listing() {
        let store = create_test_store();
        let a = store.insert_entry(&new_entry("proj1", "a", "A")).unwrap().unwrap();
        let b2 = store.insert_binding(&new_binding(a.id, "proj2", "a")).unwrap().unwrap();
        let b3 = store.insert_binding(&new_binding(a.id, "proj3", "a")).unwrap().unwrap();

        assert_eq!(store.list_unfinalized_bindings(None).unwrap().len(), 2);
        assert!(store.mark_binding_synced(b2.id, 42).unwrap());

        let synced = store.get_binding(b2.id).unwrap().unwrap();
        assert!(synced.finalized);
        assert_eq!(synced.last_synced_at, Some(42));

        let pending = store.list_unfinalized_bindings(None).unwrap();
        assert_eq!(pending, vec![b3.clone()]);
        assert!(store.list_unfinalized_bindings(Some("proj2")).unwrap().is_empty());
        assert_eq!(store.list_unfinalized_bindings(Some("proj3")).unwrap(), vec![b3]);
    }

    #[test]
    fn test_delete_entry_cascade_queues_detachments() {
        let store = create_test_store();
        let a = store.insert_entry(&new_entry("proj1", "a", "A")).unwrap().unwrap();
        store.insert_binding(&new_binding(a.id, "proj2", "a")).unwrap();
        store.insert_binding(&new_binding(a.id, "proj3", "a")).unwrap();

        let removed = store.delete_entry_cascade(a.id).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(store.get_entry_by_id(a.id).unwrap().is_none());
        assert!(store.list_bindings_for_entry(a.id).unwrap().is_empty());

        let pending = store.list_pending_detachments().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].destination_project_id, "proj2");

        store.record_detachment_attempt("proj2", "a").unwrap();
        assert_eq!(store.list_pending_detachments().unwrap()[0].attempts, 1);
        assert!(store.complete_detachment("proj2", "a").unwrap());
        assert!(!store.complete_detachment("proj2", "a").unwrap());
        assert_eq!(store.list_pending_detachments().unwrap().len(), 1);
    }

    #[test]
    fn test_find_entries_by_name_ignores_case() {
        let store = create_test_store();
        store.insert_entry(&new_entry("proj1", "a", "Very Great Skill 1")).unwrap();

        assert_eq!(store.find_entries_by_skill_name("very great SKILL 1").unwrap().len(), 1);
        assert_eq!(store.find_entries_by_skill_id("a").unwrap().len(), 1);
        assert!(store.find_entries_by_skill_id("b").unwrap().is_empty());
    }
}
