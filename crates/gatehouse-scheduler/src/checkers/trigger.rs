use async_trait::async_trait;
use gatehouse_core::health::{HealthStateScope, HealthStateType, OperationResult};
use gatehouse_core::ids::PipelineName;
use std::sync::Arc;

use super::SchedulingChecker;
use crate::queue::ScheduleQueue;
use crate::triggers::TriggerMonitor;

/// Refuses a manual trigger while another one for the same pipeline is in flight.
pub struct AboutToBeTriggeredChecker {
    queue: Arc<ScheduleQueue>,
    monitor: Option<Arc<TriggerMonitor>>,
    name: PipelineName,
}

impl AboutToBeTriggeredChecker {
    pub fn new(queue: Arc<ScheduleQueue>, monitor: Arc<TriggerMonitor>, name: PipelineName) -> Self {
        Self {
            queue,
            monitor: Some(monitor),
            name,
        }
    }

    /// Looks at the queue only, for callers that hold the trigger mark themselves.
    pub fn queued_only(queue: Arc<ScheduleQueue>, name: PipelineName) -> Self {
        Self {
            queue,
            monitor: None,
            name,
        }
    }

    fn in_flight(&self) -> bool {
        self.monitor
            .as_ref()
            .is_some_and(|monitor| monitor.is_already_triggered(&self.name))
    }
}

#[async_trait]
impl SchedulingChecker for AboutToBeTriggeredChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let state_type = HealthStateType::general(HealthStateScope::for_pipeline(&self.name));
        if self.queue.has_forced_build_cause(&self.name).await || self.in_flight() {
            result.conflict(
                &format!("Failed to trigger pipeline [{}]", self.name),
                &format!("Pipeline {} is already triggered", self.name),
                state_type,
            );
            return;
        }
        result.success(state_type);
    }
}
