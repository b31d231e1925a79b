//! Schema of the skills database (projects, subjects, skills).

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

const PROJECT_FK: ForeignKey = ForeignKey {
    foreign_table: "projects",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const PROJECTS_TABLE: Table = Table {
    name: "projects",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "enabled",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "total_points",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const SUBJECTS_TABLE: Table = Table {
    name: "subjects",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "project_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&PROJECT_FK)
        ),
        sqlite_column!("subject_id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "total_points",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[&["project_id", "subject_id"]],
};

const SKILLS_TABLE: Table = Table {
    name: "skills",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "project_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&PROJECT_FK)
        ),
        sqlite_column!("subject_id", &SqlType::Text, non_null = true),
        sqlite_column!("skill_id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("help_url", &SqlType::Text),
        sqlite_column!("point_increment", &SqlType::Integer, non_null = true),
        sqlite_column!("num_perform_to_completion", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "time_window_minutes",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "num_max_occurrences_in_window",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("total_points", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "enabled",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("copied_from_project_id", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_skills_subject", "project_id, subject_id"),
        ("idx_skills_copied_from", "copied_from_project_id"),
    ],
    unique_constraints: &[&["project_id", "skill_id"]],
};

pub const SKILLS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[PROJECTS_TABLE, SUBJECTS_TABLE, SKILLS_TABLE],
    migration: None,
}];
