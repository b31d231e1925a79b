//! Subject and project point totals derived from skill totals.

use super::store::SkillStore;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubjectPoints {
    pub subject_id: String,
    pub total_points: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectPoints {
    pub project_id: String,
    pub total_points: i64,
    pub subjects: Vec<SubjectPoints>,
}

/// Recomputes totals after a skill's point configuration changes.
pub trait PointsEngine: Send + Sync {
    fn recompute_project(&self, project_id: &str) -> Result<ProjectPoints>;
}

/// Sums the total points of enabled skills, per subject and per project,
/// and stores the results back into the skill store.
pub struct StorePointsEngine {
    skills: Arc<dyn SkillStore>,
}

impl StorePointsEngine {
    pub fn new(skills: Arc<dyn SkillStore>) -> Self {
        Self { skills }
    }
}

impl PointsEngine for StorePointsEngine {
    fn recompute_project(&self, project_id: &str) -> Result<ProjectPoints> {
        let mut per_subject: BTreeMap<String, i64> = BTreeMap::new();
        for skill in self.skills.list_skills(project_id)? {
            let entry = per_subject.entry(skill.subject_id).or_default();
            if skill.enabled {
                *entry += skill.total_points;
            }
        }

        let subject_totals: Vec<(String, i64)> = per_subject.into_iter().collect();
        let total_points: i64 = subject_totals.iter().map(|(_, total)| total).sum();
        self.skills
            .set_point_totals(project_id, &subject_totals, total_points)
            .with_context(|| format!("Failed to store point totals of {}", project_id))?;

        debug!(
            "Recomputed points of project {}: {} across {} subjects",
            project_id,
            total_points,
            subject_totals.len()
        );

        Ok(ProjectPoints {
            project_id: project_id.to_string(),
            total_points,
            subjects: subject_totals
                .into_iter()
                .map(|(subject_id, total_points)| SubjectPoints {
                    subject_id,
                    total_points,
                })
                .collect(),
        })
    }
}
