//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the scheduling core and the
//! adapters that own persistence, configuration, security and notification.

use crate::ids::{PipelineIdentifier, PipelineName, StageIdentifier};
use crate::pipeline::{PipelineConfig, PipelineConfigs};
use crate::run::PipelineInstance;
use crate::transaction::UnitOfWork;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// Persistence of pipeline runs, pipeline locks and pause state.
///
/// Read methods see committed state only.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Start a unit of work.
    async fn begin(&self) -> Result<UnitOfWork>;

    /// One committed run.
    async fn pipeline_instance(&self, id: &PipelineIdentifier) -> Result<Option<PipelineInstance>>;

    /// Most recent fully-created run of a pipeline.
    async fn most_recent_pipeline(&self, name: &PipelineName)
    -> Result<Option<PipelineInstance>>;

    /// Stage currently holding the pipeline lock.
    async fn lock_holder(&self, name: &PipelineName) -> Result<Option<StageIdentifier>>;

    /// Names of all currently locked pipelines.
    async fn locked_pipelines(&self) -> Result<Vec<PipelineName>>;

    /// Whether any stage of the pipeline's most recent run is scheduled or building.
    async fn is_pipeline_active(&self, name: &PipelineName) -> Result<bool>;

    /// Whether any run of the stage is scheduled or building.
    async fn is_stage_active(&self, name: &PipelineName, stage: &str) -> Result<bool>;

    async fn pause_info(&self, name: &PipelineName) -> Result<Option<PauseInfo>>;
}

/// Writes performed inside one unit of work.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Persist a new run and assign its counter.
    ///
    /// Fails with [`crate::Error::StaleBuildCause`] if the build cause no longer
    /// matches the pipeline's configured materials.
    async fn save_pipeline(&mut self, instance: PipelineInstance) -> Result<PipelineInstance>;

    async fn lock_pipeline(&mut self, holder: &StageIdentifier) -> Result<()>;

    async fn unlock_pipeline(&mut self, name: &PipelineName) -> Result<()>;

    /// Lock holder as seen from inside this transaction.
    async fn lock_holder(&mut self, name: &PipelineName) -> Result<Option<StageIdentifier>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseInfo {
    pub paused_by: String,
    pub cause: String,
    pub paused_at: DateTime<Utc>,
}

/// Read access to the current pipeline configuration.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn pipeline_config(&self, name: &PipelineName) -> Result<Option<PipelineConfig>>;

    async fn current(&self) -> Result<PipelineConfigs>;

    async fn has_pipeline(&self, name: &PipelineName) -> Result<bool> {
        Ok(self.pipeline_config(name).await?.is_some())
    }

    async fn is_lockable(&self, name: &PipelineName) -> Result<bool> {
        Ok(self
            .pipeline_config(name)
            .await?
            .is_some_and(|p| p.is_lockable()))
    }

    async fn is_unlockable_when_finished(&self, name: &PipelineName) -> Result<bool> {
        Ok(self
            .pipeline_config(name)
            .await?
            .is_some_and(|p| p.is_unlockable_when_finished()))
    }

    async fn first_stage_requires_approval(&self, name: &PipelineName) -> Result<bool> {
        Ok(self
            .pipeline_config(name)
            .await?
            .is_some_and(|p| p.first_stage_requires_approval()))
    }

    async fn current_digest(&self) -> Result<String> {
        self.current().await?.digest()
    }

    fn register_listener(&self, listener: Arc<dyn ConfigChangeListener>);
}

/// Reacts to configuration changes. Called synchronously during propagation.
#[async_trait]
pub trait ConfigChangeListener: Send + Sync {
    async fn on_config_change(&self, configs: &PipelineConfigs) -> Result<()>;

    async fn on_pipeline_change(&self, pipeline: &PipelineConfig) -> Result<()>;
}

/// Permission checks.
#[async_trait]
pub trait SecurityService: Send + Sync {
    async fn has_operate_permission_for_pipeline(
        &self,
        user: &str,
        pipeline: &PipelineName,
    ) -> Result<bool>;

    async fn has_operate_permission_for_stage(
        &self,
        user: &str,
        pipeline: &PipelineName,
        stage: &str,
    ) -> Result<bool>;
}

/// Reads free space on a filesystem.
pub trait DiskSpaceReader: Send + Sync {
    /// Available bytes for unprivileged users, or `None` if `path` does not exist.
    fn available_space(&self, path: &Path) -> Result<Option<u64>>;
}

/// Notification sender.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send a notification.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Notification to send.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: NotificationSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
    Critical,
}
