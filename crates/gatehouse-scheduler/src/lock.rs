//! Pipeline lock service.
//!
//! A lockable pipeline admits one in-flight run at a time. The lock row is
//! written by the store inside the caller's unit of work; listeners hear about
//! a transition only once that unit of work has committed.

use async_trait::async_trait;
use gatehouse_core::ids::{PipelineIdentifier, PipelineName, StageIdentifier};
use gatehouse_core::pipeline::{PipelineConfig, PipelineConfigs};
use gatehouse_core::ports::{ConfigChangeListener, ConfigSource, PipelineStore};
use gatehouse_core::run::{PipelineInstance, StageState};
use gatehouse_core::transaction::UnitOfWork;
use gatehouse_core::{Error, Result};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// A committed lock transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatusChange {
    Locked(StageIdentifier),
    Unlocked(PipelineName),
}

impl LockStatusChange {
    pub fn pipeline_name(&self) -> &PipelineName {
        match self {
            LockStatusChange::Locked(holder) => &holder.pipeline_name,
            LockStatusChange::Unlocked(name) => name,
        }
    }
}

/// Reacts to lock transitions. Invoked from post-commit hooks, so it must not block.
pub trait PipelineLockListener: Send + Sync {
    fn lock_status_changed(&self, change: &LockStatusChange) -> Result<()>;
}

type Listeners = Arc<RwLock<Vec<Arc<dyn PipelineLockListener>>>>;

pub struct PipelineLockService {
    store: Arc<dyn PipelineStore>,
    config: Arc<dyn ConfigSource>,
    listeners: Listeners,
}

impl PipelineLockService {
    pub fn new(store: Arc<dyn PipelineStore>, config: Arc<dyn ConfigSource>) -> Self {
        Self {
            store,
            config,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Subscribe to configuration changes so stale locks are released.
    pub fn register_config_listener(self: &Arc<Self>) {
        self.config.register_listener(self.clone());
    }

    pub fn register_listener(&self, listener: Arc<dyn PipelineLockListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Take the lock for a freshly saved run if its pipeline is lockable.
    ///
    /// The lock is written through `uow`; the `Locked` notification is
    /// deferred until `uow` commits.
    pub async fn lock_if_needed(
        &self,
        uow: &mut UnitOfWork,
        instance: &PipelineInstance,
    ) -> Result<()> {
        if !self.config.is_lockable(&instance.name).await? {
            return Ok(());
        }
        let holder = instance.first_stage_identifier().ok_or_else(|| {
            Error::InvalidPipeline(format!("pipeline {} has no stages", instance.name))
        })?;

        uow.store().lock_pipeline(&holder).await?;
        info!(pipeline = %instance.name, holder = %holder, "Pipeline locked");

        let listeners = self.listeners.clone();
        uow.after_commit(move || notify(&listeners, &LockStatusChange::Locked(holder)));
        Ok(())
    }

    pub async fn is_locked(&self, name: &PipelineName) -> Result<bool> {
        Ok(self.store.lock_holder(name).await?.is_some())
    }

    /// The stage holding the lock, if any.
    pub async fn locked_pipeline(&self, name: &PipelineName) -> Result<Option<StageIdentifier>> {
        self.store.lock_holder(name).await
    }

    /// Release the lock. Does nothing if the pipeline is not locked.
    ///
    /// Of several concurrent unlocks only one commits; only that one notifies.
    pub async fn unlock(&self, name: &PipelineName) -> Result<()> {
        let mut uow = self.store.begin().await?;
        if uow.store().lock_holder(name).await?.is_none() {
            debug!(pipeline = %name, "Unlock requested for unlocked pipeline");
            return uow.rollback().await;
        }

        uow.store().unlock_pipeline(name).await?;
        let listeners = self.listeners.clone();
        let change = LockStatusChange::Unlocked(name.clone());
        uow.after_commit(move || notify(&listeners, &change));
        match uow.commit().await {
            Ok(()) => {
                info!(pipeline = %name, "Pipeline unlocked");
                Ok(())
            }
            Err(e) if e.is_lock_changed() => {
                debug!(pipeline = %name, "Lock released concurrently, nothing to unlock");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Whether a stage of run `identifier` may be scheduled with respect to the lock.
    pub async fn can_schedule_stage_in_pipeline(
        &self,
        identifier: &PipelineIdentifier,
    ) -> Result<bool> {
        if !self.config.is_lockable(&identifier.name).await? {
            return Ok(true);
        }
        Ok(match self.locked_pipeline(&identifier.name).await? {
            None => true,
            Some(holder) => holder.pipeline_identifier() == *identifier,
        })
    }

    /// Release the lock held by `instance` once `completed_stage` finished it.
    ///
    /// The lock goes once the last stage completes, whatever its result, or,
    /// for pipelines that unlock when finished, once the run cannot progress
    /// further on its own.
    /// Returns whether the lock was released.
    pub async fn unlock_if_necessary(
        &self,
        instance: &PipelineInstance,
        completed_stage: &str,
    ) -> Result<bool> {
        let Some(config) = self.config.pipeline_config(&instance.name).await? else {
            return Ok(false);
        };
        let Some(holder) = self.locked_pipeline(&instance.name).await? else {
            return Ok(false);
        };
        if holder.pipeline_identifier() != instance.identifier() {
            return Ok(false);
        }
        let stage = instance
            .stage(completed_stage)
            .ok_or_else(|| Error::StageNotFound {
                pipeline: instance.name.to_string(),
                stage: completed_stage.to_string(),
            })?;
        if !stage.state.is_completed() {
            return Ok(false);
        }

        let next = config.next_stage(completed_stage);
        let finished = stage.state != StageState::Passed || next.is_some_and(|s| s.manual_approval);

        if next.is_none() || (config.is_unlockable_when_finished() && finished) {
            self.unlock(&instance.name).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn reconcile(&self, configs: &PipelineConfigs) -> Result<()> {
        for name in self.store.locked_pipelines().await? {
            let keep = configs.get(&name).is_some_and(PipelineConfig::is_lockable);
            if !keep {
                info!(pipeline = %name, "Releasing lock of pipeline that is no longer lockable");
                self.unlock(&name).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigChangeListener for PipelineLockService {
    async fn on_config_change(&self, configs: &PipelineConfigs) -> Result<()> {
        self.reconcile(configs).await
    }

    async fn on_pipeline_change(&self, _pipeline: &PipelineConfig) -> Result<()> {
        let configs = self.config.current().await?;
        self.reconcile(&configs).await
    }
}

fn notify(listeners: &RwLock<Vec<Arc<dyn PipelineLockListener>>>, change: &LockStatusChange) {
    let listeners = listeners
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    for listener in listeners {
        if let Err(e) = listener.lock_status_changed(change) {
            warn!(pipeline = %change.pipeline_name(), error = %e, "Lock listener failed");
        }
    }
}
