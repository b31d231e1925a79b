//! Background propagation of source skill attributes into imported shadow skills.
//!
//! Work items are binding ids. An id waiting in the queue is not queued twice,
//! a binding is never synced by two tasks at once, and at most
//! `concurrency` bindings are synced in parallel. Every sync is idempotent, so
//! retries and duplicate triggers only ever converge on the same state.

use super::deletion::retry_pending_detachments;
use super::error::FinalizationError;
use super::models::{FailedFinalization, FinalizationSummary};
use crate::catalog_store::{CatalogStore, ImportBinding};
use crate::mutex_ext::MutexExt;
use crate::server::metrics;
use crate::skill_store::{skill_total_points, PointsEngine, SkillStore};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct FinalizationWorkerConfig {
    /// Maximum number of bindings synced in parallel.
    pub concurrency: usize,
    /// How often unfinalized bindings and pending detachments are retried.
    pub retry_interval: Duration,
}

impl Default for FinalizationWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry_interval: Duration::from_secs(60),
        }
    }
}

/// Result of syncing one binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Attributes were copied and the binding stamped as synced.
    Synced,
    /// Already finalized and identical to the source.
    Unchanged,
    /// The binding, its entry or its shadow skill no longer exists, or the
    /// shadow was detached.
    BindingRemoved,
}

impl SyncOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Synced => "synced",
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::BindingRemoved => "binding_removed",
        }
    }
}

pub struct FinalizationWorker {
    catalog: Arc<dyn CatalogStore>,
    skills: Arc<dyn SkillStore>,
    points: Arc<dyn PointsEngine>,
    config: FinalizationWorkerConfig,
    sender: mpsc::UnboundedSender<i64>,
    /// Ids sitting in the queue, not yet picked up.
    queued: Mutex<HashSet<i64>>,
    binding_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    semaphore: Arc<Semaphore>,
    /// Projects with a running drain, with the number of concurrent drains.
    draining: Mutex<HashMap<String, usize>>,
}

/// Marks a project as draining for as long as it is alive.
pub(super) struct DrainGuard<'a> {
    draining: &'a Mutex<HashMap<String, usize>>,
    project_id: String,
}

impl<'a> DrainGuard<'a> {
    fn new(draining: &'a Mutex<HashMap<String, usize>>, project_id: &str) -> Self {
        *draining
            .lock_or_recover()
            .entry(project_id.to_string())
            .or_insert(0) += 1;
        Self {
            draining,
            project_id: project_id.to_string(),
        }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut draining = self.draining.lock_or_recover();
        if let Some(count) = draining.get_mut(&self.project_id) {
            *count -= 1;
            if *count == 0 {
                draining.remove(&self.project_id);
            }
        }
    }
}

impl FinalizationWorker {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        skills: Arc<dyn SkillStore>,
        points: Arc<dyn PointsEngine>,
        config: FinalizationWorkerConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<i64>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = Arc::new(Self {
            catalog,
            skills,
            points,
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            config,
            sender,
            queued: Mutex::new(HashSet::new()),
            binding_locks: Mutex::new(HashMap::new()),
            draining: Mutex::new(HashMap::new()),
        });
        (worker, receiver)
    }

    /// Queues a binding for finalization unless it is already waiting.
    pub fn enqueue(&self, binding_id: i64) {
        let mut queued = self.queued.lock_or_recover();
        if !queued.insert(binding_id) {
            debug!("Binding {} already queued, coalescing", binding_id);
            return;
        }
        if self.sender.send(binding_id).is_err() {
            warn!(
                "Finalization queue closed, binding {} will be picked up by a later drain",
                binding_id
            );
        }
        metrics::set_finalization_queue_depth(queued.len());
    }

    pub(super) fn begin_drain(&self, project_id: &str) -> DrainGuard<'_> {
        DrainGuard::new(&self.draining, project_id)
    }

    pub fn is_draining(&self, project_id: &str) -> bool {
        self.draining.lock_or_recover().contains_key(project_id)
    }

    /// Refreshes the display fields of the catalog entry of a source skill and
    /// queues every binding that imports it. Returns the number of bindings queued.
    pub fn source_skill_changed(&self, project_id: &str, skill_id: &str) -> anyhow::Result<usize> {
        let Some(entry) = self.catalog.get_entry(project_id, skill_id)? else {
            return Ok(0);
        };

        if let Some(skill) = self.skills.get_skill(project_id, skill_id)? {
            let subject_name = self
                .skills
                .get_subject(project_id, &skill.subject_id)?
                .map(|subject| subject.name)
                .unwrap_or_else(|| skill.subject_id.clone());
            let project_name = self
                .skills
                .get_project(project_id)?
                .map(|project| project.name)
                .unwrap_or_else(|| entry.source_project_name.clone());
            self.catalog
                .refresh_display_fields(entry.id, &skill.name, &subject_name, &project_name)?;
        }

        let bindings = self.catalog.list_bindings_for_entry(entry.id)?;
        for binding in &bindings {
            self.enqueue(binding.id);
        }
        if !bindings.is_empty() {
            info!(
                "Source skill {}/{} changed, queued {} imports for sync",
                project_id,
                skill_id,
                bindings.len()
            );
        }
        Ok(bindings.len())
    }

    /// Consumes the queue until cancelled, periodically re-queueing unfinalized
    /// bindings and retrying pending detachments.
    pub async fn run(
        self: Arc<Self>,
        mut receiver: mpsc::UnboundedReceiver<i64>,
        cancel: CancellationToken,
    ) {
        info!(
            "Finalization worker started (concurrency {}, retry every {:?})",
            self.config.concurrency, self.config.retry_interval
        );
        // The first tick fires immediately, so leftovers from a previous run are swept at startup
        let mut retry = tokio::time::interval(self.config.retry_interval);
        retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Finalization worker shutting down");
                    break;
                }
                Some(binding_id) = receiver.recv() => {
                    let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    let worker = self.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        let _ = worker.process(binding_id).await;
                    });
                }
                _ = retry.tick() => {
                    self.retry_sweep().await;
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Let in-flight syncs finish, they hold no state worth abandoning
        while tasks.join_next().await.is_some() {}
    }

    async fn retry_sweep(self: &Arc<Self>) {
        let catalog = self.catalog.clone();
        let skills = self.skills.clone();
        let swept = tokio::task::spawn_blocking(move || {
            let unfinalized = catalog.list_unfinalized_bindings(None)?;
            let detached = retry_pending_detachments(catalog.as_ref(), skills.as_ref())?;
            anyhow::Ok((unfinalized, detached))
        })
        .await;

        match swept {
            Ok(Ok((unfinalized, detached))) => {
                for binding in &unfinalized {
                    self.enqueue(binding.id);
                }
                if !unfinalized.is_empty() || detached > 0 {
                    info!(
                        "Retry sweep queued {} unfinalized bindings, completed {} detachments",
                        unfinalized.len(),
                        detached
                    );
                }
            }
            Ok(Err(e)) => error!("Retry sweep failed: {:#}", e),
            Err(e) => error!("Retry sweep task failed: {}", e),
        }
    }

    fn binding_lock(&self, binding_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.binding_locks
            .lock_or_recover()
            .entry(binding_id)
            .or_default()
            .clone()
    }

    fn release_binding_lock(&self, binding_id: i64, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.binding_locks.lock_or_recover();
        drop(lock);
        if locks
            .get(&binding_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&binding_id);
        }
    }

    /// Syncs one binding, serialized with any other sync of the same binding.
    pub async fn process(self: &Arc<Self>, binding_id: i64) -> Result<SyncOutcome, FinalizationError> {
        let lock = self.binding_lock(binding_id);
        let result = {
            let _guard = lock.lock().await;
            // Triggers arriving from now on need a new run
            {
                let mut queued = self.queued.lock_or_recover();
                queued.remove(&binding_id);
                metrics::set_finalization_queue_depth(queued.len());
            }

            let worker = self.clone();
            tokio::task::spawn_blocking(move || worker.sync_binding(binding_id))
                .await
                .map_err(|e| FinalizationError::Task(e.to_string()))
                .and_then(|result| result)
        };
        self.release_binding_lock(binding_id, lock);

        match &result {
            Ok(outcome) => {
                debug!("Binding {} finalization: {}", binding_id, outcome.as_str());
                metrics::record_finalization(outcome.as_str());
            }
            Err(e) => {
                warn!("Finalization of binding {} failed: {}", binding_id, e);
                metrics::record_finalization("failed");
            }
        }
        result
    }

    /// Copies the synced attributes of the source skill into the shadow skill.
    /// The shadow keeps its own point increment; its total becomes that
    /// increment times the source's occurrence count.
    pub fn sync_binding(&self, binding_id: i64) -> Result<SyncOutcome, FinalizationError> {
        let Some(binding) = self.catalog.get_binding(binding_id)? else {
            return Ok(SyncOutcome::BindingRemoved);
        };
        let Some(entry) = self.catalog.get_entry_by_id(binding.catalog_entry_id)? else {
            return Ok(SyncOutcome::BindingRemoved);
        };
        let source = self
            .skills
            .get_skill(&entry.source_project_id, &entry.source_skill_id)?
            .ok_or_else(|| FinalizationError::SourceSkillMissing {
                project_id: entry.source_project_id.clone(),
                skill_id: entry.source_skill_id.clone(),
            })?;

        let Some(shadow) = self
            .skills
            .get_skill(&binding.destination_project_id, &binding.destination_skill_id)?
        else {
            info!(
                "Shadow skill {}/{} is gone, removing binding {}",
                binding.destination_project_id, binding.destination_skill_id, binding.id
            );
            self.catalog.delete_binding(binding.id)?;
            return Ok(SyncOutcome::BindingRemoved);
        };

        if !shadow.is_imported() {
            return self.drop_detached_binding(&binding);
        }

        let attributes = source.synced_attributes();
        let expected_total =
            skill_total_points(shadow.point_increment, attributes.num_perform_to_completion)?;
        if binding.finalized
            && shadow.synced_attributes() == attributes
            && shadow.total_points == expected_total
        {
            return Ok(SyncOutcome::Unchanged);
        }

        let applied = self.skills.apply_synced_attributes(
            &binding.destination_project_id,
            &binding.destination_skill_id,
            &attributes,
            !binding.finalized,
        )?;
        if !applied {
            // Detached or deleted since it was read above
            return self.drop_detached_binding(&binding);
        }
        self.points
            .recompute_project(&binding.destination_project_id)?;
        self.catalog
            .mark_binding_synced(binding.id, chrono::Utc::now().timestamp_millis())?;

        debug!(
            "Synced {}/{} into {}/{}",
            entry.source_project_id,
            entry.source_skill_id,
            binding.destination_project_id,
            binding.destination_skill_id
        );
        Ok(SyncOutcome::Synced)
    }

    fn drop_detached_binding(&self, binding: &ImportBinding) -> Result<SyncOutcome, FinalizationError> {
        info!(
            "Skill {}/{} is no longer imported, removing binding {}",
            binding.destination_project_id, binding.destination_skill_id, binding.id
        );
        self.catalog.delete_binding(binding.id)?;
        Ok(SyncOutcome::BindingRemoved)
    }

    /// Bindings of a project that are unfinalized or have a sync queued.
    fn bindings_to_drain(&self, project_id: &str) -> anyhow::Result<Vec<ImportBinding>> {
        let queued = self.queued.lock_or_recover().clone();
        Ok(self
            .catalog
            .list_bindings_for_project(project_id)?
            .into_iter()
            .filter(|binding| !binding.finalized || queued.contains(&binding.id))
            .collect())
    }

    pub fn pending_for_project(&self, project_id: &str) -> anyhow::Result<usize> {
        Ok(self.bindings_to_drain(project_id)?.len())
    }

    /// Syncs every pending binding of a project and waits for all of them.
    /// Failed bindings are reported and stay pending for the next trigger.
    pub async fn drain_project(
        self: &Arc<Self>,
        project_id: &str,
    ) -> anyhow::Result<FinalizationSummary> {
        let _guard = self.begin_drain(project_id);

        let worker = self.clone();
        let owned_project_id = project_id.to_string();
        let bindings =
            tokio::task::spawn_blocking(move || worker.bindings_to_drain(&owned_project_id))
                .await??;

        info!(
            "Finalizing {} imported skills of project {}",
            bindings.len(),
            project_id
        );

        let mut tasks = JoinSet::new();
        for binding in bindings {
            let worker = self.clone();
            let semaphore = self.semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = worker.process(binding.id).await;
                (binding, result)
            });
        }

        let mut summary = FinalizationSummary {
            project_id: project_id.to_string(),
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(SyncOutcome::Synced | SyncOutcome::Unchanged))) => {
                    summary.finalized_count += 1
                }
                Ok((_, Ok(SyncOutcome::BindingRemoved))) => {}
                Ok((binding, Err(e))) => summary.failed.push(FailedFinalization {
                    binding_id: binding.id,
                    skill_id: binding.destination_skill_id,
                    reason: e.to_string(),
                }),
                Err(e) => error!("Finalization task of project {} failed: {}", project_id, e),
            }
        }
        summary.failed.sort_by_key(|failed| failed.binding_id);

        info!(
            "Finalized {} imported skills of project {}, {} failed",
            summary.finalized_count,
            project_id,
            summary.failed.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_fixtures::CatalogFixture;
    use crate::catalog_store::ImportBindingStore;
    use crate::skill_store::SkillUpdate;

    fn edit_source(fx: &CatalogFixture, name: &str, point_increment: i64, num_perform: i64) {
        let update = SkillUpdate {
            name: name.to_string(),
            description: Some("edited".to_string()),
            help_url: None,
            point_increment,
            num_perform_to_completion: num_perform,
            time_window_minutes: 0,
            num_max_occurrences_in_window: 1,
            enabled: None,
        };
        fx.skills
            .update_skill("proj1", "skill1", &update)
            .unwrap()
            .unwrap();
    }

    fn imported_fixture() -> (CatalogFixture, ImportBinding) {
        let fx = CatalogFixture::new();
        fx.project_with_skill("proj1", "skill1", "Very Great Skill 1", 100, 5);
        fx.project_with_skill("proj2", "own", "Own Skill", 10, 10);
        fx.export.export_one("proj1", "skill1").unwrap();
        let binding = fx
            .import
            .import_one("proj2", "subj1", &fx.entry_ref("proj1", "skill1"))
            .unwrap();
        (fx, binding)
    }

    #[tokio::test]
    async fn test_first_sync_finalizes_and_enables_shadow() {
        let (fx, binding) = imported_fixture();

        assert_eq!(
            fx.worker.process(binding.id).await.unwrap(),
            SyncOutcome::Synced
        );
        let binding = fx.catalog.get_binding(binding.id).unwrap().unwrap();
        assert!(binding.finalized);
        assert!(binding.last_synced_at.is_some());

        let shadow = fx.skills.get_skill("proj2", "skill1").unwrap().unwrap();
        assert!(shadow.enabled);
        assert_eq!(shadow.total_points, 500);
        // 100 own + 500 imported
        assert_eq!(
            fx.skills.get_project("proj2").unwrap().unwrap().total_points,
            600
        );
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let (fx, binding) = imported_fixture();
        fx.worker.process(binding.id).await.unwrap();

        assert_eq!(
            fx.worker.process(binding.id).await.unwrap(),
            SyncOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn test_sync_copies_occurrences_but_not_points() {
        let (fx, binding) = imported_fixture();
        fx.worker.process(binding.id).await.unwrap();
        fx.skills.set_point_increment("proj2", "skill1", 33).unwrap();

        edit_source(&fx, "Renamed Skill", 150, 7);
        assert_eq!(fx.worker.source_skill_changed("proj1", "skill1").unwrap(), 1);
        assert_eq!(
            fx.worker.process(binding.id).await.unwrap(),
            SyncOutcome::Synced
        );

        let shadow = fx.skills.get_skill("proj2", "skill1").unwrap().unwrap();
        assert_eq!(shadow.name, "Renamed Skill");
        assert_eq!(shadow.description.as_deref(), Some("edited"));
        assert_eq!(shadow.num_perform_to_completion, 7);
        assert_eq!(shadow.point_increment, 33);
        assert_eq!(shadow.total_points, 33 * 7);

        let entry = fx.catalog.get_entry("proj1", "skill1").unwrap().unwrap();
        assert_eq!(entry.skill_name, "Renamed Skill");
    }

    #[tokio::test]
    async fn test_missing_source_leaves_binding_pending() {
        let (fx, binding) = imported_fixture();
        fx.skills.delete_skill("proj1", "skill1").unwrap();

        let err = fx.worker.process(binding.id).await.unwrap_err();
        assert!(matches!(err, FinalizationError::SourceSkillMissing { .. }));
        assert!(!fx.catalog.get_binding(binding.id).unwrap().unwrap().finalized);
    }

    #[tokio::test]
    async fn test_deleted_shadow_removes_binding() {
        let (fx, binding) = imported_fixture();
        fx.skills.delete_skill("proj2", "skill1").unwrap();

        assert_eq!(
            fx.worker.process(binding.id).await.unwrap(),
            SyncOutcome::BindingRemoved
        );
        assert!(fx.catalog.get_binding(binding.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detached_shadow_is_left_alone() {
        let (fx, binding) = imported_fixture();
        fx.worker.process(binding.id).await.unwrap();
        edit_source(&fx, "Renamed Skill", 100, 9);
        // Detached while the binding is still around, as during a catalog deletion
        fx.skills.detach_imported_skill("proj2", "skill1").unwrap();

        assert_eq!(
            fx.worker.process(binding.id).await.unwrap(),
            SyncOutcome::BindingRemoved
        );
        let skill = fx.skills.get_skill("proj2", "skill1").unwrap().unwrap();
        assert_eq!(skill.name, "Very Great Skill 1");
        assert_eq!(skill.num_perform_to_completion, 5);
        assert!(fx.catalog.get_binding(binding.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_points_overflow_fails_the_sync() {
        let fx = CatalogFixture::new();
        fx.project_with_skill("proj1", "skill1", "Very Great Skill 1", 100, 1);
        fx.project_with_skill("proj2", "own", "Own Skill", 10, 10);
        fx.export.export_one("proj1", "skill1").unwrap();
        let binding = fx
            .import
            .import_one("proj2", "subj1", &fx.entry_ref("proj1", "skill1"))
            .unwrap();
        fx.worker.process(binding.id).await.unwrap();
        fx.skills
            .set_point_increment("proj2", "skill1", i64::MAX / 2)
            .unwrap();

        edit_source(&fx, "Very Great Skill 1", 100, 3);
        let err = fx.worker.process(binding.id).await.unwrap_err();
        assert!(matches!(err, FinalizationError::Store(_)));

        let shadow = fx.skills.get_skill("proj2", "skill1").unwrap().unwrap();
        assert_eq!(shadow.num_perform_to_completion, 1);
        assert_eq!(shadow.total_points, i64::MAX / 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_syncs_of_one_binding_are_serialized() {
        let (fx, binding) = imported_fixture();

        let (first, second) = tokio::join!(
            fx.worker.process(binding.id),
            fx.worker.process(binding.id)
        );
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|outcome| outcome.as_str());
        // The second sync only runs once the first one committed
        assert_eq!(outcomes, vec![SyncOutcome::Synced, SyncOutcome::Unchanged]);

        assert!(fx.worker.binding_locks.lock_or_recover().is_empty());
        assert!(fx.catalog.get_binding(binding.id).unwrap().unwrap().finalized);
    }

    #[tokio::test]
    async fn test_drain_reports_failures_without_blocking_others() {
        let fx = CatalogFixture::new();
        fx.project_with_skill("proj1", "a", "A", 100, 5);
        fx.add_skill("proj1", "b", "B", 100, 5);
        fx.project_with_skill("proj2", "own", "Own", 10, 10);
        fx.export.export_one("proj1", "a").unwrap();
        fx.export.export_one("proj1", "b").unwrap();
        fx.import
            .import_one("proj2", "subj1", &fx.entry_ref("proj1", "a"))
            .unwrap();
        let failing = fx
            .import
            .import_one("proj2", "subj1", &fx.entry_ref("proj1", "b"))
            .unwrap();
        fx.skills.delete_skill("proj1", "b").unwrap();

        let summary = fx.worker.drain_project("proj2").await.unwrap();
        assert_eq!(summary.finalized_count, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].binding_id, failing.id);
        assert!(!fx.worker.is_draining("proj2"));
        assert_eq!(fx.worker.pending_for_project("proj2").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_coalesces_waiting_ids() {
        let (fx, binding) = imported_fixture();
        // import_one already queued the binding
        fx.worker.enqueue(binding.id);
        fx.worker.enqueue(binding.id);

        let mut receiver = fx.take_receiver();
        assert_eq!(receiver.try_recv().unwrap(), binding.id);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_processes_queue_until_cancelled() {
        let (fx, binding) = imported_fixture();
        let receiver = fx.take_receiver();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(fx.worker.clone().run(receiver, cancel.clone()));

        let mut finalized = false;
        for _ in 0..100 {
            if fx.catalog.get_binding(binding.id).unwrap().unwrap().finalized {
                finalized = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();
        assert!(finalized);
    }
}
