//! Test context wiring the scheduler against in-memory collaborators.

use crate::helpers::{FakeDiskReader, RecordingLockListener, RecordingNotifier};
use chrono::Duration;
use gatehouse_core::build_cause::BuildCause;
use gatehouse_core::clock::ManualClock;
use gatehouse_core::health::ServerHealthResult;
use gatehouse_core::ids::PipelineName;
use gatehouse_core::pipeline::{PipelineConfig, PipelineConfigs};
use gatehouse_core::ports::ConfigSource;
use gatehouse_core::run::{PipelineInstance, SchedulingContext};
use gatehouse_core::{Error, Result};
use gatehouse_scheduler::{
    DiskCheckers, DiskSpaceProbe, ManualTriggerService, PipelineLockService, ScheduleQueue,
    SchedulerConfig, SchedulingCheckerService, TriggerMonitor,
};
use gatehouse_store::{MemoryConfigRepository, MemoryPipelineStore, StaticSecurityService};
use std::sync::Arc;

/// User granted admin rights in every context.
pub const ADMIN: &str = "admin";

/// Everything a trigger goes through, wired the way a server would.
///
/// Both disks start with 10 GB free. Disk samples are cached for the
/// configured refresh interval; call [`TestContext::expire_disk_samples`]
/// after changing a disk.
pub struct TestContext {
    pub settings: SchedulerConfig,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryPipelineStore>,
    pub config: Arc<MemoryConfigRepository>,
    pub security: Arc<StaticSecurityService>,
    pub locks: Arc<PipelineLockService>,
    pub queue: Arc<ScheduleQueue>,
    pub monitor: Arc<TriggerMonitor>,
    pub checkers: Arc<SchedulingCheckerService>,
    pub triggers: ManualTriggerService,
    pub artifacts_disk: Arc<FakeDiskReader>,
    pub database_disk: Arc<FakeDiskReader>,
    pub notifier: Arc<RecordingNotifier>,
    pub lock_events: Arc<RecordingLockListener>,
}

impl TestContext {
    pub fn new(pipelines: Vec<PipelineConfig>) -> Self {
        Self::with_settings(pipelines, SchedulerConfig::default())
    }

    pub fn with_settings(pipelines: Vec<PipelineConfig>, settings: SchedulerConfig) -> Self {
        crate::init_test_logging();

        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryPipelineStore::new());
        let config = Arc::new(MemoryConfigRepository::new(PipelineConfigs::new(pipelines)));
        let security = Arc::new(StaticSecurityService::new());
        security.grant_admin(ADMIN);

        let locks = Arc::new(PipelineLockService::new(store.clone(), config.clone()));
        locks.register_config_listener();
        let lock_events = Arc::new(RecordingLockListener::default());
        locks.register_listener(lock_events.clone());

        let queue = Arc::new(ScheduleQueue::new(store.clone(), locks.clone()));
        let monitor = Arc::new(TriggerMonitor::new());

        let artifacts_disk = Arc::new(FakeDiskReader::with_megabytes(10 * 1024));
        let database_disk = Arc::new(FakeDiskReader::with_megabytes(10 * 1024));
        let notifier = Arc::new(RecordingNotifier::default());
        let disk = DiskCheckers::new(
            &settings,
            Arc::new(DiskSpaceProbe::new(
                settings.artifacts_dir.clone(),
                artifacts_disk.clone(),
                clock.clone(),
                settings.disk_refresh_interval(),
            )),
            Arc::new(DiskSpaceProbe::new(
                settings.database_dir.clone(),
                database_disk.clone(),
                clock.clone(),
                settings.disk_refresh_interval(),
            )),
            notifier.clone(),
        );

        let checkers = Arc::new(SchedulingCheckerService::new(
            store.clone(),
            config.clone(),
            security.clone(),
            locks.clone(),
            queue.clone(),
            monitor.clone(),
            disk,
        ));
        let triggers = ManualTriggerService::new(
            checkers.clone(),
            queue.clone(),
            monitor.clone(),
            config.clone(),
            clock.clone(),
        );

        Self {
            settings,
            clock,
            store,
            config,
            security,
            locks,
            queue,
            monitor,
            checkers,
            triggers,
            artifacts_disk,
            database_disk,
            notifier,
            lock_events,
        }
    }

    /// Move the clock past the disk refresh interval.
    pub fn expire_disk_samples(&self) {
        let interval = Duration::from_std(self.settings.disk_refresh_interval())
            .unwrap_or(Duration::zero());
        self.clock.advance(interval + Duration::milliseconds(1));
    }

    pub async fn pipeline_config(&self, name: &PipelineName) -> Result<PipelineConfig> {
        self.config
            .pipeline_config(name)
            .await?
            .ok_or_else(|| Error::PipelineNotFound(name.to_string()))
    }

    /// Promote `cause` into a run of `name`, as the scheduling pass would.
    pub async fn create(
        &self,
        name: &PipelineName,
        cause: BuildCause,
    ) -> Result<Option<PipelineInstance>> {
        let config = self.pipeline_config(name).await?;
        let digest = self.config.current_digest().await?;
        let context = SchedulingContext::new(cause.approver.clone());
        self.queue
            .create_pipeline(cause, &config, &context, &digest, self.clock.as_ref())
            .await
    }

    /// Offer `cause` and promote whatever is pending afterwards.
    pub async fn schedule_and_create(
        &self,
        name: &PipelineName,
        cause: BuildCause,
    ) -> Result<Option<PipelineInstance>> {
        self.queue.schedule(name, cause).await;
        match self.queue.pending(name).await {
            Some(pending) => self.create(name, pending).await,
            None => Ok(None),
        }
    }

    /// Trigger `name` by hand through the manual trigger service.
    pub async fn trigger_manually(
        &self,
        name: &PipelineName,
        user: &str,
        cause: BuildCause,
    ) -> Result<(ServerHealthResult, Option<PipelineInstance>)> {
        let mut result = ServerHealthResult::new();
        let created = self.triggers.trigger(name, user, cause, &mut result).await?;
        Ok((result, created))
    }
}
