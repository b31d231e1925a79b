//! SQLite-backed skill store.

use super::models::{NewSkill, Project, Skill, SkillUpdate, Subject, SyncedAttributes};
use super::schema::SKILLS_VERSIONED_SCHEMAS;
use crate::mutex_ext::MutexExt;
use crate::sqlite_persistence::{open_in_memory_db, open_versioned_db};
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Project-scoped access to skill definitions and point configuration.
pub trait SkillStore: Send + Sync {
    // ==================== Projects ====================

    fn create_project(&self, project_id: &str, name: &str) -> Result<Project>;

    fn get_project(&self, project_id: &str) -> Result<Option<Project>>;

    fn set_project_enabled(&self, project_id: &str, enabled: bool) -> Result<bool>;

    // ==================== Subjects ====================

    fn create_subject(&self, project_id: &str, subject_id: &str, name: &str) -> Result<Subject>;

    fn get_subject(&self, project_id: &str, subject_id: &str) -> Result<Option<Subject>>;

    // ==================== Skills ====================

    fn create_skill(&self, project_id: &str, subject_id: &str, skill: &NewSkill) -> Result<Skill>;

    fn get_skill(&self, project_id: &str, skill_id: &str) -> Result<Option<Skill>>;

    /// All skills of a project, ordered by subject then skill id.
    fn list_skills(&self, project_id: &str) -> Result<Vec<Skill>>;

    /// Replaces the editable fields of a skill and recomputes its total points.
    fn update_skill(
        &self,
        project_id: &str,
        skill_id: &str,
        update: &SkillUpdate,
    ) -> Result<Option<Skill>>;

    /// Changes only the local point increment of a skill.
    fn set_point_increment(
        &self,
        project_id: &str,
        skill_id: &str,
        point_increment: i64,
    ) -> Result<Option<Skill>>;

    /// Overwrites the synced fields of an imported skill, keeping its own point
    /// increment, and recomputes total points from that increment. `activate`
    /// also enables it. Returns false when the skill is missing or detached.
    fn apply_synced_attributes(
        &self,
        project_id: &str,
        skill_id: &str,
        attributes: &SyncedAttributes,
        activate: bool,
    ) -> Result<bool>;

    /// Turns an imported skill into an ordinary one. Returns false when the
    /// skill does not exist or was already detached.
    fn detach_imported_skill(&self, project_id: &str, skill_id: &str) -> Result<bool>;

    fn delete_skill(&self, project_id: &str, skill_id: &str) -> Result<bool>;

    // ==================== Points ====================

    fn set_point_totals(
        &self,
        project_id: &str,
        subject_totals: &[(String, i64)],
        project_total: i64,
    ) -> Result<()>;
}

pub struct SqliteSkillStore {
    conn: Arc<Mutex<Connection>>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A skill's total points, failing instead of overflowing.
pub fn skill_total_points(point_increment: i64, num_perform_to_completion: i64) -> Result<i64> {
    point_increment
        .checked_mul(num_perform_to_completion)
        .with_context(|| {
            format!(
                "Total points overflow: {} x {}",
                point_increment, num_perform_to_completion
            )
        })
}

const SKILL_COLUMNS: &str = "project_id, subject_id, skill_id, name, description, help_url,
    point_increment, num_perform_to_completion, time_window_minutes,
    num_max_occurrences_in_window, total_points, enabled, copied_from_project_id,
    created_at, updated_at";

impl SqliteSkillStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), SKILLS_VERSIONED_SCHEMAS, "skills")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory_db(SKILLS_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
        Ok(Project {
            id: row.get("id")?,
            name: row.get("name")?,
            enabled: row.get::<_, i32>("enabled")? != 0,
            total_points: row.get("total_points")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_skill(row: &rusqlite::Row) -> rusqlite::Result<Skill> {
        Ok(Skill {
            project_id: row.get("project_id")?,
            subject_id: row.get("subject_id")?,
            skill_id: row.get("skill_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            help_url: row.get("help_url")?,
            point_increment: row.get("point_increment")?,
            num_perform_to_completion: row.get("num_perform_to_completion")?,
            time_window_minutes: row.get("time_window_minutes")?,
            num_max_occurrences_in_window: row.get("num_max_occurrences_in_window")?,
            total_points: row.get("total_points")?,
            enabled: row.get::<_, i32>("enabled")? != 0,
            copied_from_project_id: row.get("copied_from_project_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn query_skill(conn: &Connection, project_id: &str, skill_id: &str) -> Result<Option<Skill>> {
        let skill = conn
            .query_row(
                &format!(
                    "SELECT {} FROM skills WHERE project_id = ?1 AND skill_id = ?2",
                    SKILL_COLUMNS
                ),
                params![project_id, skill_id],
                Self::row_to_skill,
            )
            .optional()?;
        Ok(skill)
    }
}

impl SkillStore for SqliteSkillStore {
    fn create_project(&self, project_id: &str, name: &str) -> Result<Project> {
        let conn = self.conn.lock_or_recover();
        let created_at = now_millis();
        conn.execute(
            "INSERT INTO projects (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![project_id, name, created_at],
        )
        .with_context(|| format!("Failed to create project {}", project_id))?;
        Ok(Project {
            id: project_id.to_string(),
            name: name.to_string(),
            enabled: true,
            total_points: 0,
            created_at,
        })
    }

    fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let conn = self.conn.lock_or_recover();
        let project = conn
            .query_row(
                "SELECT id, name, enabled, total_points, created_at FROM projects WHERE id = ?1",
                params![project_id],
                Self::row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    fn set_project_enabled(&self, project_id: &str, enabled: bool) -> Result<bool> {
        let conn = self.conn.lock_or_recover();
        let updated = conn.execute(
            "UPDATE projects SET enabled = ?1 WHERE id = ?2",
            params![enabled as i32, project_id],
        )?;
        Ok(updated > 0)
    }

    fn create_subject(&self, project_id: &str, subject_id: &str, name: &str) -> Result<Subject> {
        let conn = self.conn.lock_or_recover();
        conn.execute(
            "INSERT INTO subjects (project_id, subject_id, name) VALUES (?1, ?2, ?3)",
            params![project_id, subject_id, name],
        )
        .with_context(|| format!("Failed to create subject {}/{}", project_id, subject_id))?;
        Ok(Subject {
            project_id: project_id.to_string(),
            subject_id: subject_id.to_string(),
            name: name.to_string(),
            total_points: 0,
        })
    }

    fn get_subject(&self, project_id: &str, subject_id: &str) -> Result<Option<Subject>> {
        let conn = self.conn.lock_or_recover();
        let subject = conn
            .query_row(
                "SELECT project_id, subject_id, name, total_points FROM subjects
                 WHERE project_id = ?1 AND subject_id = ?2",
                params![project_id, subject_id],
                |row| {
                    Ok(Subject {
                        project_id: row.get(0)?,
                        subject_id: row.get(1)?,
                        name: row.get(2)?,
                        total_points: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(subject)
    }

    fn create_skill(&self, project_id: &str, subject_id: &str, skill: &NewSkill) -> Result<Skill> {
        let conn = self.conn.lock_or_recover();
        let subject_exists = conn
            .query_row(
                "SELECT 1 FROM subjects WHERE project_id = ?1 AND subject_id = ?2",
                params![project_id, subject_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !subject_exists {
            bail!("Subject {}/{} does not exist", project_id, subject_id);
        }

        let total_points =
            skill_total_points(skill.point_increment, skill.num_perform_to_completion)?;
        let now = now_millis();
        conn.execute(
            "INSERT INTO skills (project_id, subject_id, skill_id, name, description, help_url,
                point_increment, num_perform_to_completion, time_window_minutes,
                num_max_occurrences_in_window, total_points, enabled, copied_from_project_id,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            params![
                project_id,
                subject_id,
                skill.skill_id,
                skill.name,
                skill.description,
                skill.help_url,
                skill.point_increment,
                skill.num_perform_to_completion,
                skill.time_window_minutes,
                skill.num_max_occurrences_in_window,
                total_points,
                skill.enabled as i32,
                skill.copied_from_project_id,
                now,
            ],
        )
        .with_context(|| format!("Failed to create skill {}/{}", project_id, skill.skill_id))?;

        Self::query_skill(&conn, project_id, &skill.skill_id)?
            .with_context(|| format!("Skill {}/{} vanished after insert", project_id, skill.skill_id))
    }

    fn get_skill(&self, project_id: &str, skill_id: &str) -> Result<Option<Skill>> {
        let conn = self.conn.lock_or_recover();
        Self::query_skill(&conn, project_id, skill_id)
    }

    fn list_skills(&self, project_id: &str) -> Result<Vec<Skill>> {
        let conn = self.conn.lock_or_recover();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM skills WHERE project_id = ?1 ORDER BY subject_id, skill_id",
            SKILL_COLUMNS
        ))?;
        let skills = stmt
            .query_map(params![project_id], Self::row_to_skill)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(skills)
    }

    fn update_skill(
        &self,
        project_id: &str,
        skill_id: &str,
        update: &SkillUpdate,
    ) -> Result<Option<Skill>> {
        let total_points =
            skill_total_points(update.point_increment, update.num_perform_to_completion)?;
        let conn = self.conn.lock_or_recover();
        let updated = conn.execute(
            "UPDATE skills SET name = ?1, description = ?2, help_url = ?3, point_increment = ?4,
                num_perform_to_completion = ?5, time_window_minutes = ?6,
                num_max_occurrences_in_window = ?7, total_points = ?12,
                enabled = COALESCE(?8, enabled), updated_at = ?9
             WHERE project_id = ?10 AND skill_id = ?11",
            params![
                update.name,
                update.description,
                update.help_url,
                update.point_increment,
                update.num_perform_to_completion,
                update.time_window_minutes,
                update.num_max_occurrences_in_window,
                update.enabled.map(|e| e as i32),
                now_millis(),
                project_id,
                skill_id,
                total_points,
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        Self::query_skill(&conn, project_id, skill_id)
    }

    fn set_point_increment(
        &self,
        project_id: &str,
        skill_id: &str,
        point_increment: i64,
    ) -> Result<Option<Skill>> {
        let conn = self.conn.lock_or_recover();
        let Some(skill) = Self::query_skill(&conn, project_id, skill_id)? else {
            return Ok(None);
        };
        let total_points = skill_total_points(point_increment, skill.num_perform_to_completion)?;
        conn.execute(
            "UPDATE skills SET point_increment = ?1, total_points = ?2, updated_at = ?3
             WHERE project_id = ?4 AND skill_id = ?5",
            params![point_increment, total_points, now_millis(), project_id, skill_id],
        )?;
        Self::query_skill(&conn, project_id, skill_id)
    }

    fn apply_synced_attributes(
        &self,
        project_id: &str,
        skill_id: &str,
        attributes: &SyncedAttributes,
        activate: bool,
    ) -> Result<bool> {
        let conn = self.conn.lock_or_recover();
        let Some(skill) = Self::query_skill(&conn, project_id, skill_id)? else {
            return Ok(false);
        };
        let total_points =
            skill_total_points(skill.point_increment, attributes.num_perform_to_completion)?;
        // A detached skill belongs to its project and is never overwritten
        let updated = conn.execute(
            "UPDATE skills SET name = ?1, description = ?2, help_url = ?3,
                num_perform_to_completion = ?4, time_window_minutes = ?5,
                num_max_occurrences_in_window = ?6, total_points = ?7,
                enabled = CASE WHEN ?8 THEN 1 ELSE enabled END,
                updated_at = ?9
             WHERE project_id = ?10 AND skill_id = ?11 AND copied_from_project_id IS NOT NULL",
            params![
                attributes.name,
                attributes.description,
                attributes.help_url,
                attributes.num_perform_to_completion,
                attributes.time_window_minutes,
                attributes.num_max_occurrences_in_window,
                total_points,
                activate,
                now_millis(),
                project_id,
                skill_id,
            ],
        )?;
        Ok(updated > 0)
    }

    fn detach_imported_skill(&self, project_id: &str, skill_id: &str) -> Result<bool> {
        let conn = self.conn.lock_or_recover();
        let updated = conn.execute(
            "UPDATE skills SET copied_from_project_id = NULL, updated_at = ?1
             WHERE project_id = ?2 AND skill_id = ?3 AND copied_from_project_id IS NOT NULL",
            params![now_millis(), project_id, skill_id],
        )?;
        Ok(updated > 0)
    }

    fn delete_skill(&self, project_id: &str, skill_id: &str) -> Result<bool> {
        let conn = self.conn.lock_or_recover();
        let deleted = conn.execute(
            "DELETE FROM skills WHERE project_id = ?1 AND skill_id = ?2",
            params![project_id, skill_id],
        )?;
        Ok(deleted > 0)
    }

    fn set_point_totals(
        &self,
        project_id: &str,
        subject_totals: &[(String, i64)],
        project_total: i64,
    ) -> Result<()> {
        let mut conn = self.conn.lock_or_recover();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE subjects SET total_points = 0 WHERE project_id = ?1",
            params![project_id],
        )?;
        for (subject_id, total) in subject_totals {
            tx.execute(
                "UPDATE subjects SET total_points = ?1 WHERE project_id = ?2 AND subject_id = ?3",
                params![total, project_id, subject_id],
            )?;
        }
        tx.execute(
            "UPDATE projects SET total_points = ?1 WHERE id = ?2",
            params![project_total, project_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}
