//! In-memory implementation of PipelineStore.
//!
//! Writes made inside a transaction are staged and applied atomically on
//! commit; readers outside the transaction only ever see committed state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::ids::{PipelineIdentifier, PipelineName, StageIdentifier};
use gatehouse_core::ports::{PauseInfo, PipelineStore, StoreTransaction};
use gatehouse_core::run::{PipelineInstance, StageState};
use gatehouse_core::transaction::UnitOfWork;
use gatehouse_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct StoreState {
    instances: HashMap<PipelineName, Vec<PipelineInstance>>,
    locks: HashMap<PipelineName, StageIdentifier>,
    pauses: HashMap<PipelineName, PauseInfo>,
    fail_next_save: Option<String>,
    fail_next_rollback: Option<String>,
}

impl StoreState {
    fn latest_counter(&self, name: &PipelineName) -> u64 {
        self.instances
            .get(name)
            .and_then(|runs| runs.last())
            .map_or(0, |run| run.counter)
    }
}

/// In-memory implementation of PipelineStore.
#[derive(Clone, Default)]
pub struct MemoryPipelineStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryPipelineStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        lock_state(&self.state)
    }

    /// All committed runs of a pipeline, oldest first.
    pub fn instances(&self, name: &PipelineName) -> Vec<PipelineInstance> {
        self.state().instances.get(name).cloned().unwrap_or_default()
    }

    pub fn instance(&self, id: &PipelineIdentifier) -> Option<PipelineInstance> {
        self.state()
            .instances
            .get(&id.name)
            .and_then(|runs| runs.iter().find(|r| r.counter == id.counter))
            .cloned()
    }

    /// Record a state change for one stage of a committed run.
    pub fn update_stage(
        &self,
        id: &PipelineIdentifier,
        stage: &str,
        state: StageState,
    ) -> Result<PipelineInstance> {
        let mut guard = self.state();
        let run = guard
            .instances
            .get_mut(&id.name)
            .and_then(|runs| runs.iter_mut().find(|r| r.counter == id.counter))
            .ok_or_else(|| Error::PipelineNotFound(id.to_string()))?;
        let stage_instance = run.stage_mut(stage).ok_or_else(|| Error::StageNotFound {
            pipeline: id.name.to_string(),
            stage: stage.to_string(),
        })?;
        stage_instance.state = state;
        debug!(pipeline = %id, stage = %stage, ?state, "Stage state updated");
        Ok(run.clone())
    }

    pub fn pause(
        &self,
        name: &PipelineName,
        paused_by: impl Into<String>,
        cause: impl Into<String>,
        paused_at: DateTime<Utc>,
    ) {
        let info = PauseInfo {
            paused_by: paused_by.into(),
            cause: cause.into(),
            paused_at,
        };
        info!(pipeline = %name, paused_by = %info.paused_by, "Pipeline paused");
        self.state().pauses.insert(name.clone(), info);
    }

    pub fn unpause(&self, name: &PipelineName) {
        if self.state().pauses.remove(name).is_some() {
            info!(pipeline = %name, "Pipeline unpaused");
        }
    }

    /// Make the next `save_pipeline` fail with a database error.
    pub fn fail_next_save(&self, message: impl Into<String>) {
        self.state().fail_next_save = Some(message.into());
    }

    /// Make the next rollback fail with a database error.
    pub fn fail_next_rollback(&self, message: impl Into<String>) {
        self.state().fail_next_rollback = Some(message.into());
    }
}

fn lock_state(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PipelineStore for MemoryPipelineStore {
    async fn begin(&self) -> Result<UnitOfWork> {
        Ok(UnitOfWork::new(Box::new(MemoryTransaction {
            state: self.state.clone(),
            staged_runs: Vec::new(),
            staged_locks: HashMap::new(),
        })))
    }

    async fn pipeline_instance(&self, id: &PipelineIdentifier) -> Result<Option<PipelineInstance>> {
        Ok(self.instance(id))
    }

    async fn most_recent_pipeline(
        &self,
        name: &PipelineName,
    ) -> Result<Option<PipelineInstance>> {
        Ok(self
            .state()
            .instances
            .get(name)
            .and_then(|runs| runs.last())
            .cloned())
    }

    async fn lock_holder(&self, name: &PipelineName) -> Result<Option<StageIdentifier>> {
        Ok(self.state().locks.get(name).cloned())
    }

    async fn locked_pipelines(&self) -> Result<Vec<PipelineName>> {
        let mut names: Vec<_> = self.state().locks.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn is_pipeline_active(&self, name: &PipelineName) -> Result<bool> {
        Ok(self
            .state()
            .instances
            .get(name)
            .and_then(|runs| runs.last())
            .is_some_and(|run| run.is_active()))
    }

    async fn is_stage_active(&self, name: &PipelineName, stage: &str) -> Result<bool> {
        Ok(self.state().instances.get(name).is_some_and(|runs| {
            runs.iter()
                .filter_map(|run| run.stage(stage))
                .any(|s| s.state.is_active())
        }))
    }

    async fn pause_info(&self, name: &PipelineName) -> Result<Option<PauseInfo>> {
        Ok(self.state().pauses.get(name).cloned())
    }
}

/// A lock write waiting for commit.
#[derive(Debug, Clone)]
enum StagedLock {
    Lock(StageIdentifier),
    /// Release of the lock that was held when the unlock was staged.
    Unlock { observed: Option<StageIdentifier> },
}

/// Staged writes of one unit of work.
struct MemoryTransaction {
    state: Arc<Mutex<StoreState>>,
    staged_runs: Vec<PipelineInstance>,
    staged_locks: HashMap<PipelineName, StagedLock>,
}

impl MemoryTransaction {
    fn check_materials(instance: &PipelineInstance) -> Result<()> {
        if instance.materials.is_empty() {
            return Ok(());
        }
        for revision in instance.build_cause.revisions.iter() {
            if !instance.materials.iter().any(|m| m == &revision.material) {
                return Err(Error::StaleBuildCause {
                    pipeline: instance.name.to_string(),
                    reason: format!(
                        "material {} was not found in config",
                        revision.material
                    ),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn save_pipeline(&mut self, mut instance: PipelineInstance) -> Result<PipelineInstance> {
        if let Some(message) = lock_state(&self.state).fail_next_save.take() {
            return Err(Error::Database(message));
        }
        Self::check_materials(&instance)?;

        let committed = lock_state(&self.state).latest_counter(&instance.name);
        let staged = self
            .staged_runs
            .iter()
            .filter(|r| r.name == instance.name)
            .map(|r| r.counter)
            .max()
            .unwrap_or(0);
        instance.counter = committed.max(staged) + 1;

        self.staged_runs.push(instance.clone());
        Ok(instance)
    }

    async fn lock_pipeline(&mut self, holder: &StageIdentifier) -> Result<()> {
        let current = self.lock_holder(&holder.pipeline_name).await?;
        if let Some(existing) = current {
            if existing.pipeline_identifier() != holder.pipeline_identifier() {
                return Err(Error::PipelineLocked {
                    pipeline: holder.pipeline_name.to_string(),
                    holder: existing.to_string(),
                });
            }
        }
        self.staged_locks
            .insert(holder.pipeline_name.clone(), StagedLock::Lock(holder.clone()));
        Ok(())
    }

    async fn unlock_pipeline(&mut self, name: &PipelineName) -> Result<()> {
        let observed = match self.staged_locks.remove(name) {
            Some(StagedLock::Unlock { observed }) => observed,
            _ => lock_state(&self.state).locks.get(name).cloned(),
        };
        self.staged_locks
            .insert(name.clone(), StagedLock::Unlock { observed });
        Ok(())
    }

    async fn lock_holder(&mut self, name: &PipelineName) -> Result<Option<StageIdentifier>> {
        match self.staged_locks.get(name) {
            Some(StagedLock::Lock(holder)) => Ok(Some(holder.clone())),
            Some(StagedLock::Unlock { .. }) => Ok(None),
            None => Ok(lock_state(&self.state).locks.get(name).cloned()),
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            state,
            staged_runs,
            staged_locks,
        } = *self;
        let mut guard = lock_state(&state);

        for run in &staged_runs {
            if guard.latest_counter(&run.name) >= run.counter {
                return Err(Error::Database(format!(
                    "counter {} already taken for pipeline {}",
                    run.counter, run.name
                )));
            }
        }
        for (name, staged) in &staged_locks {
            let committed = guard.locks.get(name);
            match staged {
                StagedLock::Lock(holder) => {
                    let taken = committed
                        .filter(|existing| {
                            existing.pipeline_identifier() != holder.pipeline_identifier()
                        });
                    if let Some(existing) = taken {
                        return Err(Error::PipelineLocked {
                            pipeline: name.to_string(),
                            holder: existing.to_string(),
                        });
                    }
                }
                StagedLock::Unlock { observed } => {
                    if committed != observed.as_ref() {
                        return Err(Error::LockChanged {
                            pipeline: name.to_string(),
                        });
                    }
                }
            }
        }

        for run in staged_runs {
            debug!(pipeline = %run.name, counter = run.counter, "Run persisted");
            guard.instances.entry(run.name.clone()).or_default().push(run);
        }
        for (name, staged) in staged_locks {
            match staged {
                StagedLock::Lock(holder) => {
                    guard.locks.insert(name, holder);
                }
                StagedLock::Unlock { .. } => {
                    guard.locks.remove(&name);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!(
            runs = self.staged_runs.len(),
            locks = self.staged_locks.len(),
            "Discarding staged writes"
        );
        if let Some(message) = lock_state(&self.state).fail_next_rollback.take() {
            return Err(Error::Database(message));
        }
        Ok(())
    }
}
