use axum::extract::FromRef;

use crate::catalog::{CatalogDeletionService, ExportService, FinalizationWorker, ImportService};
use crate::catalog_store::CatalogStore;
use crate::skill_store::{PointsEngine, SkillStore};
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedSkillStore = Arc<dyn SkillStore>;
pub type GuardedCatalogStore = Arc<dyn CatalogStore>;
pub type GuardedPointsEngine = Arc<dyn PointsEngine>;
pub type GuardedExportService = Arc<ExportService>;
pub type GuardedImportService = Arc<ImportService>;
pub type GuardedDeletionService = Arc<CatalogDeletionService>;
pub type GuardedFinalizationWorker = Arc<FinalizationWorker>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub skill_store: GuardedSkillStore,
    pub catalog_store: GuardedCatalogStore,
    pub points_engine: GuardedPointsEngine,
    pub export_service: GuardedExportService,
    pub import_service: GuardedImportService,
    pub deletion_service: GuardedDeletionService,
    pub finalization_worker: GuardedFinalizationWorker,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        skill_store: GuardedSkillStore,
        catalog_store: GuardedCatalogStore,
        points_engine: GuardedPointsEngine,
        finalization_worker: GuardedFinalizationWorker,
    ) -> ServerState {
        let export_service = Arc::new(ExportService::new(
            catalog_store.clone(),
            skill_store.clone(),
            config.min_project_points,
        ));
        let import_service = Arc::new(ImportService::new(
            catalog_store.clone(),
            skill_store.clone(),
            finalization_worker.clone(),
        ));
        let deletion_service = Arc::new(CatalogDeletionService::new(
            catalog_store.clone(),
            skill_store.clone(),
        ));
        ServerState {
            config,
            start_time: Instant::now(),
            hash: env!("GIT_HASH").to_owned(),
            skill_store,
            catalog_store,
            points_engine,
            export_service,
            import_service,
            deletion_service,
            finalization_worker,
        }
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedSkillStore {
    fn from_ref(input: &ServerState) -> Self {
        input.skill_store.clone()
    }
}

impl FromRef<ServerState> for GuardedCatalogStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog_store.clone()
    }
}

impl FromRef<ServerState> for GuardedPointsEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.points_engine.clone()
    }
}

impl FromRef<ServerState> for GuardedExportService {
    fn from_ref(input: &ServerState) -> Self {
        input.export_service.clone()
    }
}

impl FromRef<ServerState> for GuardedImportService {
    fn from_ref(input: &ServerState) -> Self {
        input.import_service.clone()
    }
}

impl FromRef<ServerState> for GuardedDeletionService {
    fn from_ref(input: &ServerState) -> Self {
        input.deletion_service.clone()
    }
}

impl FromRef<ServerState> for GuardedFinalizationWorker {
    fn from_ref(input: &ServerState) -> Self {
        input.finalization_worker.clone()
    }
}
