//! Entry points that decide whether a trigger or stage request may proceed.

use gatehouse_core::build_cause::TriggerKind;
use gatehouse_core::health::{OperationResult, ServerHealthResult};
use gatehouse_core::ids::{PipelineIdentifier, PipelineName};
use gatehouse_core::pipeline::PipelineConfig;
use gatehouse_core::ports::{ConfigSource, NotificationSender, PipelineStore, SecurityService};
use std::sync::Arc;
use tracing::debug;

use crate::checkers::{
    AboutToBeTriggeredChecker, CompositeChecker, DiskSpaceChecker, DiskTarget,
    ManualPipelineChecker, PipelineActiveChecker, PipelineExistsChecker, PipelineLockChecker,
    PipelinePauseChecker, PreviousStageChecker, SchedulingChecker, StageActiveChecker,
    StageAuthorizationChecker,
};
use crate::config::SchedulerConfig;
use crate::disk::DiskSpaceProbe;
use crate::lock::PipelineLockService;
use crate::queue::ScheduleQueue;
use crate::triggers::TriggerMonitor;

/// The four disk gates, sharing their edge-trigger state across requests.
pub struct DiskCheckers {
    pub artifacts_full: Arc<DiskSpaceChecker>,
    pub artifacts_warning: Arc<DiskSpaceChecker>,
    pub database_full: Arc<DiskSpaceChecker>,
    pub database_warning: Arc<DiskSpaceChecker>,
}

impl DiskCheckers {
    /// Build the gates for the configured directories and limits.
    ///
    /// Each warning gate is suppressed by the full gate of the same disk.
    pub fn new(
        config: &SchedulerConfig,
        artifacts: Arc<DiskSpaceProbe>,
        database: Arc<DiskSpaceProbe>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        let artifacts_full = Arc::new(DiskSpaceChecker::full(
            DiskTarget::Artifacts,
            config.artifacts_full_limit_bytes(),
            artifacts.clone(),
            notifier.clone(),
        ));
        let artifacts_warning = Arc::new(
            DiskSpaceChecker::warning(
                DiskTarget::Artifacts,
                config.artifacts_warning_limit_bytes(),
                artifacts,
                notifier.clone(),
            )
            .suppressed_by(artifacts_full.clone()),
        );
        let database_full = Arc::new(DiskSpaceChecker::full(
            DiskTarget::Database,
            config.database_full_limit_bytes(),
            database.clone(),
            notifier.clone(),
        ));
        let database_warning = Arc::new(
            DiskSpaceChecker::warning(
                DiskTarget::Database,
                config.database_warning_limit_bytes(),
                database,
                notifier,
            )
            .suppressed_by(database_full.clone()),
        );
        Self {
            artifacts_full,
            artifacts_warning,
            database_full,
            database_warning,
        }
    }
}

pub struct SchedulingCheckerService {
    store: Arc<dyn PipelineStore>,
    config: Arc<dyn ConfigSource>,
    security: Arc<dyn SecurityService>,
    locks: Arc<PipelineLockService>,
    queue: Arc<ScheduleQueue>,
    monitor: Arc<TriggerMonitor>,
    disk: DiskCheckers,
}

impl SchedulingCheckerService {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        config: Arc<dyn ConfigSource>,
        security: Arc<dyn SecurityService>,
        locks: Arc<PipelineLockService>,
        queue: Arc<ScheduleQueue>,
        monitor: Arc<TriggerMonitor>,
        disk: DiskCheckers,
    ) -> Self {
        Self {
            store,
            config,
            security,
            locks,
            queue,
            monitor,
            disk,
        }
    }

    fn with_disk_full(&self, chain: CompositeChecker) -> CompositeChecker {
        chain
            .with(self.disk.artifacts_full.clone())
            .with(self.disk.database_full.clone())
    }

    /// May `user` trigger `name` by hand right now.
    pub async fn can_trigger_manual_pipeline(
        &self,
        name: &PipelineName,
        user: &str,
        result: &mut dyn OperationResult,
    ) -> bool {
        let chain = CompositeChecker::default()
            .with(PipelineExistsChecker::new(self.config.clone(), name.clone()))
            .with(StageAuthorizationChecker::for_pipeline(
                self.security.clone(),
                name.clone(),
                user,
            ))
            .with(AboutToBeTriggeredChecker::new(
                self.queue.clone(),
                self.monitor.clone(),
                name.clone(),
            ))
            .with(PipelinePauseChecker::new(self.store.clone(), name.clone()))
            .with(PipelineLockChecker::for_trigger(self.locks.clone(), name.clone()))
            .with(PipelineActiveChecker::new(self.store.clone(), name.clone()));
        let chain = self
            .with_disk_full(chain)
            .with(self.disk.artifacts_warning.clone())
            .with(self.disk.database_warning.clone());

        self.run(chain, result, "manual trigger", name).await
    }

    /// Checks repeated once the caller holds the trigger mark for `name`.
    ///
    /// Another trigger may have created a run between the first evaluation
    /// and taking the mark; the mark itself is not held against the caller.
    pub async fn can_trigger_claimed_pipeline(
        &self,
        name: &PipelineName,
        result: &mut dyn OperationResult,
    ) -> bool {
        let chain = CompositeChecker::default()
            .with(AboutToBeTriggeredChecker::queued_only(
                self.queue.clone(),
                name.clone(),
            ))
            .with(PipelinePauseChecker::new(self.store.clone(), name.clone()))
            .with(PipelineLockChecker::for_trigger(self.locks.clone(), name.clone()))
            .with(PipelineActiveChecker::new(self.store.clone(), name.clone()));

        self.run(chain, result, "claimed manual trigger", name).await
    }

    /// May a material change trigger `config` automatically.
    pub async fn can_auto_trigger_consumer(&self, config: &PipelineConfig) -> bool {
        let mut result = ServerHealthResult::new();
        let chain = self.automatic_chain(config, TriggerKind::Auto);
        self.run(chain, &mut result, "automatic trigger", &config.name)
            .await
    }

    pub async fn can_trigger_pipeline_with_timer(
        &self,
        config: &PipelineConfig,
        result: &mut dyn OperationResult,
    ) -> bool {
        let chain = self.automatic_chain(config, TriggerKind::Timer);
        self.run(chain, result, "timer trigger", &config.name).await
    }

    fn automatic_chain(&self, config: &PipelineConfig, trigger: TriggerKind) -> CompositeChecker {
        let name = &config.name;
        let chain = CompositeChecker::default()
            .with(ManualPipelineChecker::new(config.clone(), trigger))
            .with(PipelinePauseChecker::new(self.store.clone(), name.clone()))
            .with(PipelineLockChecker::for_trigger(self.locks.clone(), name.clone()))
            .with(PipelineActiveChecker::new(self.store.clone(), name.clone()));
        self.with_disk_full(chain)
    }

    /// May `user` schedule `stage` within run `identifier`.
    pub async fn can_schedule_stage(
        &self,
        identifier: &PipelineIdentifier,
        stage: &str,
        user: &str,
        result: &mut dyn OperationResult,
    ) -> bool {
        let chain = self.stage_chain(CompositeChecker::default(), identifier, stage, user);
        self.run(chain, result, "stage schedule", &identifier.name)
            .await
    }

    /// Like [`Self::can_schedule_stage`], and the pipeline must still be configured.
    pub async fn can_rerun_stage(
        &self,
        identifier: &PipelineIdentifier,
        stage: &str,
        user: &str,
        result: &mut dyn OperationResult,
    ) -> bool {
        let exists = CompositeChecker::default().with(PipelineExistsChecker::new(
            self.config.clone(),
            identifier.name.clone(),
        ));
        let chain = self.stage_chain(exists, identifier, stage, user);
        self.run(chain, result, "stage rerun", &identifier.name).await
    }

    fn stage_chain(
        &self,
        chain: CompositeChecker,
        identifier: &PipelineIdentifier,
        stage: &str,
        user: &str,
    ) -> CompositeChecker {
        let name = &identifier.name;
        let chain = chain
            .with(StageAuthorizationChecker::for_stage(
                self.security.clone(),
                name.clone(),
                stage,
                user,
            ))
            .with(PipelinePauseChecker::new(self.store.clone(), name.clone()))
            .with(StageActiveChecker::new(self.store.clone(), name.clone(), stage))
            .with(PreviousStageChecker::new(
                self.config.clone(),
                self.store.clone(),
                identifier.clone(),
                stage,
            ))
            .with(PipelineLockChecker::for_run(
                self.locks.clone(),
                identifier.clone(),
            ));
        self.with_disk_full(chain)
    }

    /// Whether there is enough disk space to schedule anything at all.
    pub async fn can_schedule(&self, result: &mut dyn OperationResult) -> bool {
        let chain = self.with_disk_full(CompositeChecker::default());
        chain.check(result).await;
        result.can_continue()
    }

    async fn run(
        &self,
        chain: CompositeChecker,
        result: &mut dyn OperationResult,
        request: &str,
        name: &PipelineName,
    ) -> bool {
        chain.check(result).await;
        let allowed = result.can_continue();
        debug!(pipeline = %name, request, allowed, "Admission checks evaluated");
        allowed
    }
}
