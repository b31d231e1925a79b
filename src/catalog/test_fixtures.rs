//! In-memory stores wired together the way the server wires them.

use super::export::ExportService;
use super::finalization::{FinalizationWorker, FinalizationWorkerConfig};
use super::import::ImportService;
use super::models::CatalogEntryRef;
use crate::catalog_store::{CatalogStore, SqliteCatalogStore};
use crate::mutex_ext::MutexExt;
use crate::skill_store::{NewSkill, PointsEngine, SkillStore, SqliteSkillStore, StorePointsEngine};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const TEST_MIN_PROJECT_POINTS: i64 = 100;
pub const TEST_SUBJECT_ID: &str = "subj1";

pub struct CatalogFixture {
    pub catalog: Arc<dyn CatalogStore>,
    pub skills: Arc<dyn SkillStore>,
    pub points: Arc<dyn PointsEngine>,
    pub worker: Arc<FinalizationWorker>,
    pub export: ExportService,
    pub import: ImportService,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<i64>>>,
}

impl CatalogFixture {
    pub fn new() -> Self {
        let catalog: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::in_memory().unwrap());
        let skills: Arc<dyn SkillStore> = Arc::new(SqliteSkillStore::in_memory().unwrap());
        let points: Arc<dyn PointsEngine> = Arc::new(StorePointsEngine::new(skills.clone()));
        let (worker, receiver) = FinalizationWorker::new(
            catalog.clone(),
            skills.clone(),
            points.clone(),
            FinalizationWorkerConfig::default(),
        );
        Self {
            export: ExportService::new(catalog.clone(), skills.clone(), TEST_MIN_PROJECT_POINTS),
            import: ImportService::new(catalog.clone(), skills.clone(), worker.clone()),
            catalog,
            skills,
            points,
            worker,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Creates "Project {id}" with subject `subj1` holding one skill.
    pub fn project_with_skill(
        &self,
        project_id: &str,
        skill_id: &str,
        name: &str,
        point_increment: i64,
        num_perform: i64,
    ) {
        self.skills
            .create_project(project_id, &format!("Project {}", project_id))
            .unwrap();
        self.skills
            .create_subject(project_id, TEST_SUBJECT_ID, &format!("Subject {}", TEST_SUBJECT_ID))
            .unwrap();
        self.add_skill(project_id, skill_id, name, point_increment, num_perform);
    }

    pub fn add_skill(
        &self,
        project_id: &str,
        skill_id: &str,
        name: &str,
        point_increment: i64,
        num_perform: i64,
    ) {
        let skill = NewSkill {
            skill_id: skill_id.to_string(),
            name: name.to_string(),
            description: None,
            help_url: None,
            point_increment,
            num_perform_to_completion: num_perform,
            time_window_minutes: 0,
            num_max_occurrences_in_window: 1,
            enabled: true,
            copied_from_project_id: None,
        };
        self.skills
            .create_skill(project_id, TEST_SUBJECT_ID, &skill)
            .unwrap();
        self.points.recompute_project(project_id).unwrap();
    }

    pub fn entry_ref(&self, project_id: &str, skill_id: &str) -> CatalogEntryRef {
        CatalogEntryRef::new(project_id, skill_id)
    }

    /// Hands out the worker's queue. Panics on the second call.
    pub fn take_receiver(&self) -> mpsc::UnboundedReceiver<i64> {
        self.receiver.lock_or_recover().take().unwrap()
    }
}
