//! SQLite schema of the catalog database.
//!
//! Catalog entries and import bindings share one database so that deleting an
//! entry together with all its bindings is a single transaction.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};
use anyhow::Result;
use rusqlite::Connection;

// =============================================================================
// Version 1
// =============================================================================

/// One row per exported skill, unique per (source project, source skill).
const EXPORTED_SKILLS_TABLE: Table = Table {
    name: "exported_skills",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("source_project_id", &SqlType::Text, non_null = true),
        sqlite_column!("source_skill_id", &SqlType::Text, non_null = true),
        sqlite_column!("source_project_name", &SqlType::Text, non_null = true),
        sqlite_column!("subject_id", &SqlType::Text, non_null = true),
        sqlite_column!("subject_name", &SqlType::Text, non_null = true),
        sqlite_column!("skill_name", &SqlType::Text, non_null = true),
        sqlite_column!("exported_at", &SqlType::Integer, non_null = true), // unix millis
    ],
    indices: &[
        ("idx_exported_skills_exported_at", "exported_at"),
        ("idx_exported_skills_skill_name", "skill_name"),
    ],
    unique_constraints: &[&["source_project_id", "source_skill_id"]],
};

const CATALOG_ENTRY_FK: ForeignKey = ForeignKey {
    foreign_table: "exported_skills",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// Each destination skill is bound at most once, and each project imports an entry at most once.
const IMPORT_BINDINGS_TABLE: Table = Table {
    name: "import_bindings",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "catalog_entry_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&CATALOG_ENTRY_FK)
        ),
        sqlite_column!("destination_project_id", &SqlType::Text, non_null = true),
        sqlite_column!("destination_subject_id", &SqlType::Text, non_null = true),
        sqlite_column!("destination_skill_id", &SqlType::Text, non_null = true),
        sqlite_column!("imported_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "finalized",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("last_synced_at", &SqlType::Integer),
    ],
    indices: &[
        ("idx_import_bindings_entry", "catalog_entry_id"),
        ("idx_import_bindings_destination", "destination_project_id"),
    ],
    unique_constraints: &[
        &["catalog_entry_id", "destination_project_id"],
        &["destination_project_id", "destination_skill_id"],
    ],
};

// =============================================================================
// Version 2
// =============================================================================

/// Shadow skills still to be detached after their entry was deleted.
const PENDING_DETACHMENTS_TABLE: Table = Table {
    name: "pending_detachments",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("destination_project_id", &SqlType::Text, non_null = true),
        sqlite_column!("destination_skill_id", &SqlType::Text, non_null = true),
        sqlite_column!("queued_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "attempts",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[&["destination_project_id", "destination_skill_id"]],
};

fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    PENDING_DETACHMENTS_TABLE.create(conn)
}

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[EXPORTED_SKILLS_TABLE, IMPORT_BINDINGS_TABLE],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            EXPORTED_SKILLS_TABLE,
            IMPORT_BINDINGS_TABLE,
            PENDING_DETACHMENTS_TABLE,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];
