//! Build-cause schedule queue.
//!
//! Per pipeline the queue holds the build cause waiting to be turned into a
//! run and the cause of the run most recently created. Every operation on a
//! pipeline runs under that pipeline's mutex; `create_pipeline` holds it for
//! the whole unit of work so deciding and persisting cannot interleave with
//! another trigger of the same pipeline.

use dashmap::DashMap;
use gatehouse_core::build_cause::BuildCause;
use gatehouse_core::clock::Clock;
use gatehouse_core::ids::PipelineName;
use gatehouse_core::pipeline::PipelineConfig;
use gatehouse_core::ports::PipelineStore;
use gatehouse_core::run::{PipelineInstance, SchedulingContext};
use gatehouse_core::transaction::UnitOfWork;
use gatehouse_core::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::lock::PipelineLockService;

#[derive(Debug, Default)]
struct QueueEntry {
    pending: Option<BuildCause>,
    most_recent: Option<BuildCause>,
}

pub struct ScheduleQueue {
    entries: DashMap<PipelineName, Arc<Mutex<QueueEntry>>>,
    store: Arc<dyn PipelineStore>,
    locks: Arc<PipelineLockService>,
}

impl ScheduleQueue {
    pub fn new(store: Arc<dyn PipelineStore>, locks: Arc<PipelineLockService>) -> Self {
        Self {
            entries: DashMap::new(),
            store,
            locks,
        }
    }

    fn slot(&self, name: &PipelineName) -> Arc<Mutex<QueueEntry>> {
        self.entries.entry(name.clone()).or_default().clone()
    }

    /// The entry for `name`, without creating one.
    fn existing(&self, name: &PipelineName) -> Option<Arc<Mutex<QueueEntry>>> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Number of pipelines the queue holds state for.
    pub fn tracked_pipelines(&self) -> usize {
        self.entries.len()
    }

    /// Offer `candidate` as the next cause to schedule.
    ///
    /// Installed when nothing is pending or when it trumps the pending cause.
    /// Returns whether it was installed.
    pub async fn schedule(&self, name: &PipelineName, candidate: BuildCause) -> bool {
        let slot = self.slot(name);
        let mut entry = slot.lock().await;
        let install = entry
            .pending
            .as_ref()
            .is_none_or(|pending| candidate.trumps(pending));
        if install {
            debug!(pipeline = %name, forced = candidate.is_forced(), "Build cause queued");
            entry.pending = Some(candidate);
        }
        install
    }

    /// Drop the pending cause, if any.
    pub async fn cancel_schedule(&self, name: &PipelineName) {
        if let Some(slot) = self.existing(name) {
            slot.lock().await.pending = None;
        }
    }

    pub async fn pending(&self, name: &PipelineName) -> Option<BuildCause> {
        let slot = self.existing(name)?;
        let entry = slot.lock().await;
        entry.pending.clone()
    }

    pub async fn has_forced_build_cause(&self, name: &PipelineName) -> bool {
        let Some(slot) = self.existing(name) else {
            return false;
        };
        let entry = slot.lock().await;
        entry.pending.as_ref().is_some_and(BuildCause::is_forced)
    }

    /// Snapshot of every pending cause, for the scheduling pass.
    pub async fn to_be_scheduled(&self) -> HashMap<PipelineName, BuildCause> {
        let slots: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut pending = HashMap::new();
        for (name, slot) in slots {
            if let Some(cause) = slot.lock().await.pending.clone() {
                pending.insert(name, cause);
            }
        }
        pending
    }

    /// Forget everything known about a pipeline, including the cached most-recent cause.
    ///
    /// The entry is reset under its mutex before it leaves the table, so a
    /// caller still holding it sees an empty entry.
    pub async fn clear(&self, name: &PipelineName) {
        let Some(slot) = self.existing(name) else {
            return;
        };
        let mut entry = slot.lock().await;
        *entry = QueueEntry::default();
        self.entries
            .remove_if(name, |_, current| Arc::ptr_eq(current, &slot));
        debug!(pipeline = %name, "Queue entry cleared");
    }

    /// Cause of the most recently created run, or the never-run sentinel.
    pub async fn most_recent_scheduled(&self, name: &PipelineName) -> Result<BuildCause> {
        match self.existing(name) {
            Some(slot) => {
                let mut entry = slot.lock().await;
                self.load_most_recent(name, &mut entry).await
            }
            None => Ok(self
                .store
                .most_recent_pipeline(name)
                .await?
                .map_or_else(BuildCause::never_run, |instance| instance.build_cause)),
        }
    }

    async fn load_most_recent(
        &self,
        name: &PipelineName,
        entry: &mut QueueEntry,
    ) -> Result<BuildCause> {
        if let Some(cause) = &entry.most_recent {
            return Ok(cause.clone());
        }
        match self.store.most_recent_pipeline(name).await? {
            Some(instance) => {
                entry.most_recent = Some(instance.build_cause.clone());
                Ok(instance.build_cause)
            }
            None => Ok(BuildCause::never_run()),
        }
    }

    /// Turn `candidate` into a persisted run.
    ///
    /// Returns `None` when the candidate duplicates the most recent run or
    /// turned stale while being persisted; the pending cause is dropped in
    /// both cases.
    pub async fn create_pipeline(
        &self,
        candidate: BuildCause,
        config: &PipelineConfig,
        context: &SchedulingContext,
        config_digest: &str,
        clock: &dyn Clock,
    ) -> Result<Option<PipelineInstance>> {
        let name = &config.name;
        let slot = self.slot(name);
        let mut entry = slot.lock().await;

        let most_recent = self.load_most_recent(name, &mut entry).await?;
        if !candidate.is_forced() && candidate.is_same_as(&most_recent) {
            debug!(pipeline = %name, "Build cause matches most recent run, cancelling");
            entry.pending = None;
            return Ok(None);
        }

        let instance =
            PipelineInstance::instantiate(config, candidate.clone(), context, config_digest, clock)?;

        let mut uow = self.store.begin().await?;
        match self.persist(&mut uow, instance).await {
            Ok(saved) => {
                uow.commit().await?;
                if entry.pending.as_ref() == Some(&candidate) {
                    entry.pending = None;
                }
                entry.most_recent = Some(saved.build_cause.clone());
                info!(
                    pipeline = %name,
                    counter = saved.counter,
                    cause = %saved.build_cause.build_cause_message(),
                    "Pipeline run created"
                );
                Ok(Some(saved))
            }
            Err(e) if e.is_stale_build_cause() => {
                if let Err(rollback) = uow.rollback().await {
                    warn!(pipeline = %name, error = %rollback, "Rollback failed");
                }
                entry.pending = None;
                warn!(pipeline = %name, error = %e, "Build cause is stale, cancelling");
                Ok(None)
            }
            Err(e) => {
                if let Err(rollback) = uow.rollback().await {
                    warn!(pipeline = %name, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn persist(
        &self,
        uow: &mut UnitOfWork,
        instance: PipelineInstance,
    ) -> Result<PipelineInstance> {
        let saved = uow.store().save_pipeline(instance).await?;
        self.locks.lock_if_needed(uow, &saved).await?;
        Ok(saved)
    }
}
