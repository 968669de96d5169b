//! Manual trigger flow.
//!
//! A manual trigger is admitted by the checker chain, then takes the
//! pipeline's trigger mark, repeats the checks another trigger could have
//! invalidated in the meantime, and queues and creates the run while holding
//! the mark. The mark is released on every path out.

use gatehouse_core::build_cause::BuildCause;
use gatehouse_core::clock::Clock;
use gatehouse_core::health::{HealthStateScope, HealthStateType, OperationResult, ServerHealthResult};
use gatehouse_core::ids::PipelineName;
use gatehouse_core::ports::ConfigSource;
use gatehouse_core::run::{PipelineInstance, SchedulingContext};
use gatehouse_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::queue::ScheduleQueue;
use crate::service::SchedulingCheckerService;
use crate::triggers::TriggerMonitor;

pub struct ManualTriggerService {
    checkers: Arc<SchedulingCheckerService>,
    queue: Arc<ScheduleQueue>,
    monitor: Arc<TriggerMonitor>,
    config: Arc<dyn ConfigSource>,
    clock: Arc<dyn Clock>,
}

impl ManualTriggerService {
    pub fn new(
        checkers: Arc<SchedulingCheckerService>,
        queue: Arc<ScheduleQueue>,
        monitor: Arc<TriggerMonitor>,
        config: Arc<dyn ConfigSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            checkers,
            queue,
            monitor,
            config,
            clock,
        }
    }

    /// Trigger `name` on behalf of `user` with `cause`.
    ///
    /// A refusal is written to `result` and yields `Ok(None)`; `Err` is kept
    /// for collaborator failures while creating the run.
    pub async fn trigger(
        &self,
        name: &PipelineName,
        user: &str,
        cause: BuildCause,
        result: &mut dyn OperationResult,
    ) -> Result<Option<PipelineInstance>> {
        if !self
            .checkers
            .can_trigger_manual_pipeline(name, user, result)
            .await
        {
            return Ok(None);
        }

        let Some(_claim) = self.monitor.claim(name) else {
            result.conflict(
                &format!("Failed to trigger pipeline [{}]", name),
                &format!("Pipeline {} is already triggered", name),
                HealthStateType::general(HealthStateScope::for_pipeline(name)),
            );
            return Ok(None);
        };

        let mut recheck = ServerHealthResult::new();
        if !self
            .checkers
            .can_trigger_claimed_pipeline(name, &mut recheck)
            .await
        {
            if let Some(outcome) = recheck.last() {
                result.record(outcome.clone());
            }
            debug!(pipeline = %name, user, "Trigger refused after taking the mark");
            return Ok(None);
        }

        self.queue.schedule(name, cause).await;
        let Some(pending) = self.queue.pending(name).await else {
            return Ok(None);
        };
        let config = self
            .config
            .pipeline_config(name)
            .await?
            .ok_or_else(|| Error::PipelineNotFound(name.to_string()))?;
        let digest = self.config.current_digest().await?;
        let context = SchedulingContext::new(pending.approver.clone());

        let created = self
            .queue
            .create_pipeline(pending, &config, &context, &digest, self.clock.as_ref())
            .await?;
        if let Some(run) = &created {
            info!(pipeline = %name, user, counter = run.counter, "Manual trigger accepted");
        }
        Ok(created)
    }
}
