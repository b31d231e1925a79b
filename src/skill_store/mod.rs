//! Minimal project/subject/skill store the catalog writes shadow skills into,
//! plus the points engine that derives subject and project totals.

mod models;
pub mod points;
mod schema;
mod store;

pub use models::{
    validate_point_increment, NewSkill, Project, Skill, SkillUpdate, Subject, SyncedAttributes,
    MAX_NUM_PERFORM_TO_COMPLETION, MAX_POINT_INCREMENT, MAX_TIME_WINDOW_MINUTES,
};
pub use points::{PointsEngine, ProjectPoints, StorePointsEngine, SubjectPoints};
pub use store::{skill_total_points, SkillStore, SqliteSkillStore};
