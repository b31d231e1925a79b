use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub total_points: i64,
    pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub project_id: String,
    pub subject_id: String,
    pub name: String,
    pub total_points: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Skill {
    pub project_id: String,
    pub subject_id: String,
    pub skill_id: String,
    pub name: String,
    pub description: Option<String>,
    pub help_url: Option<String>,
    pub point_increment: i64,
    pub num_perform_to_completion: i64,
    pub time_window_minutes: i64,
    pub num_max_occurrences_in_window: i64,
    pub total_points: i64,
    pub enabled: bool,
    /// Source project of a skill imported from the catalog. Cleared on detach.
    pub copied_from_project_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Skill {
    pub fn is_imported(&self) -> bool {
        self.copied_from_project_id.is_some()
    }

    pub fn synced_attributes(&self) -> SyncedAttributes {
        SyncedAttributes {
            name: self.name.clone(),
            description: self.description.clone(),
            help_url: self.help_url.clone(),
            num_perform_to_completion: self.num_perform_to_completion,
            time_window_minutes: self.time_window_minutes,
            num_max_occurrences_in_window: self.num_max_occurrences_in_window,
        }
    }
}

/// The structural fields that propagate from a catalog skill to its imports.
///
/// Point increment, enabled status and per-user progress are deliberately
/// absent: each importing project owns those.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncedAttributes {
    pub name: String,
    pub description: Option<String>,
    pub help_url: Option<String>,
    pub num_perform_to_completion: i64,
    pub time_window_minutes: i64,
    pub num_max_occurrences_in_window: i64,
}

fn default_true() -> bool {
    true
}

fn default_one() -> i64 {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewSkill {
    pub skill_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub help_url: Option<String>,
    pub point_increment: i64,
    #[serde(default = "default_one")]
    pub num_perform_to_completion: i64,
    #[serde(default)]
    pub time_window_minutes: i64,
    #[serde(default = "default_one")]
    pub num_max_occurrences_in_window: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(skip)]
    pub copied_from_project_id: Option<String>,
}

impl NewSkill {
    pub fn validate(&self) -> Result<(), String> {
        if self.skill_id.trim().is_empty() {
            return Err("skill_id must not be empty".to_string());
        }
        validate_structure(
            &self.name,
            self.point_increment,
            self.num_perform_to_completion,
            self.time_window_minutes,
            self.num_max_occurrences_in_window,
        )
    }
}

/// Full replacement of a skill's editable fields.
#[derive(Clone, Debug, Deserialize)]
pub struct SkillUpdate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub help_url: Option<String>,
    pub point_increment: i64,
    pub num_perform_to_completion: i64,
    #[serde(default)]
    pub time_window_minutes: i64,
    #[serde(default = "default_one")]
    pub num_max_occurrences_in_window: i64,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl SkillUpdate {
    pub fn validate(&self) -> Result<(), String> {
        validate_structure(
            &self.name,
            self.point_increment,
            self.num_perform_to_completion,
            self.time_window_minutes,
            self.num_max_occurrences_in_window,
        )
    }
}

pub const MAX_POINT_INCREMENT: i64 = 10_000;
pub const MAX_NUM_PERFORM_TO_COMPLETION: i64 = 10_000;
/// 30 days.
pub const MAX_TIME_WINDOW_MINUTES: i64 = 43_200;

fn check_range(field: &str, value: i64, min: i64, max: i64) -> Result<(), String> {
    if value < min || value > max {
        return Err(format!("{} must be between {} and {}", field, min, max));
    }
    Ok(())
}

/// Bounds a skill's point increment, also used by the points-only update.
pub fn validate_point_increment(point_increment: i64) -> Result<(), String> {
    check_range("point_increment", point_increment, 1, MAX_POINT_INCREMENT)
}

fn validate_structure(
    name: &str,
    point_increment: i64,
    num_perform: i64,
    time_window_minutes: i64,
    num_max_occurrences: i64,
) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    validate_point_increment(point_increment)?;
    check_range(
        "num_perform_to_completion",
        num_perform,
        1,
        MAX_NUM_PERFORM_TO_COMPLETION,
    )?;
    check_range(
        "time_window_minutes",
        time_window_minutes,
        0,
        MAX_TIME_WINDOW_MINUTES,
    )?;
    check_range(
        "num_max_occurrences_in_window",
        num_max_occurrences,
        1,
        MAX_NUM_PERFORM_TO_COMPLETION,
    )
}
