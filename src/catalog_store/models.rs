//! Rows of the catalog database and the query shapes used to page through them.

use serde::{Deserialize, Serialize};

// =============================================================================
// Stored records
// =============================================================================

/// A skill published to the catalog by its source project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub source_project_id: String,
    pub source_skill_id: String,
    pub source_project_name: String,
    pub subject_id: String,
    pub subject_name: String,
    pub skill_name: String,
    pub exported_at: i64,
}

#[derive(Clone, Debug)]
pub struct NewCatalogEntry {
    pub source_project_id: String,
    pub source_skill_id: String,
    pub source_project_name: String,
    pub subject_id: String,
    pub subject_name: String,
    pub skill_name: String,
}

/// Link between a catalog entry and the shadow skill created by an importer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportBinding {
    pub id: i64,
    pub catalog_entry_id: i64,
    pub destination_project_id: String,
    pub destination_subject_id: String,
    pub destination_skill_id: String,
    pub imported_at: i64,
    pub finalized: bool,
    pub last_synced_at: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct NewImportBinding {
    pub catalog_entry_id: i64,
    pub destination_project_id: String,
    pub destination_subject_id: String,
    pub destination_skill_id: String,
}

/// A shadow skill whose catalog entry was deleted but which the skill store
/// has not yet confirmed as detached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingDetachment {
    pub destination_project_id: String,
    pub destination_skill_id: String,
    pub queued_at: i64,
    pub attempts: i64,
}

/// A catalog entry as listed for its source project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportedEntrySummary {
    pub entry: CatalogEntry,
    pub importer_count: i64,
}

// =============================================================================
// Paging and sorting
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportedSortField {
    SkillName,
    SubjectName,
    #[default]
    ExportedAt,
    ImporterCount,
}

impl ExportedSortField {
    fn order_expr(&self) -> &'static str {
        match self {
            ExportedSortField::SkillName => "e.skill_name COLLATE NOCASE",
            ExportedSortField::SubjectName => "e.subject_name COLLATE NOCASE",
            ExportedSortField::ExportedAt => "e.exported_at",
            ExportedSortField::ImporterCount => "importer_count",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportableSortField {
    SkillName,
    SourceProjectName,
    #[default]
    ExportedAt,
}

impl ImportableSortField {
    fn order_expr(&self) -> &'static str {
        match self {
            ImportableSortField::SkillName => "e.skill_name COLLATE NOCASE",
            ImportableSortField::SourceProjectName => "e.source_project_name COLLATE NOCASE",
            ImportableSortField::ExportedAt => "e.exported_at",
        }
    }
}

/// ORDER BY clause with the entry id as a stable tie-breaker.
pub(super) fn order_by(expr: &str, direction: SortDirection) -> String {
    format!(
        "ORDER BY {expr} {dir}, e.id {dir}",
        expr = expr,
        dir = direction.as_sql()
    )
}

/// 1-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.page_size as i64
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedQuery {
    pub page: PageRequest,
    pub sort_by: ExportedSortField,
    pub sort_dir: SortDirection,
}

impl ExportedQuery {
    pub(super) fn order_by(&self) -> String {
        order_by(self.sort_by.order_expr(), self.sort_dir)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportableQuery {
    pub page: PageRequest,
    /// Case-insensitive substring of the skill name.
    pub skill_name: Option<String>,
    /// Case-insensitive substring of the source project name.
    pub project_name: Option<String>,
    pub sort_by: ImportableSortField,
    pub sort_dir: SortDirection,
}

impl ImportableQuery {
    pub(super) fn order_by(&self) -> String {
        order_by(self.sort_by.order_expr(), self.sort_dir)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Escapes `%`, `_` and `\` for use inside a `LIKE ... ESCAPE '\'` pattern.
pub(super) fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("skill"), "%skill%");
        assert_eq!(like_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }

    #[test]
    fn page_offset_is_one_based() {
        let page = PageRequest {
            page: 3,
            page_size: 10,
        };
        assert_eq!(page.offset(), 20);
        let first = PageRequest {
            page: 0,
            page_size: 10,
        };
        assert_eq!(first.offset(), 0);
    }

    #[test]
    fn sort_params_parse_from_snake_case() {
        let field: ImportableSortField = serde_json::from_str("\"source_project_name\"").unwrap();
        assert_eq!(field, ImportableSortField::SourceProjectName);
        let dir: SortDirection = serde_json::from_str("\"asc\"").unwrap();
        assert_eq!(dir, SortDirection::Asc);
        assert_eq!(ExportedSortField::default(), ExportedSortField::ExportedAt);
    }
}
