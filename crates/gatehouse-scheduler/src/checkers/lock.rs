use async_trait::async_trait;
use gatehouse_core::health::{HealthStateScope, HealthStateType, OperationResult};
use gatehouse_core::ids::{PipelineIdentifier, PipelineName};
use std::sync::Arc;

use super::{SchedulingChecker, collaborator_failed};
use crate::lock::PipelineLockService;

/// Refuses a request while the pipeline is locked by another run.
///
/// A new trigger has no run of its own, so any lock blocks it. A stage
/// request passes when its run is the one holding the lock.
pub struct PipelineLockChecker {
    locks: Arc<PipelineLockService>,
    name: PipelineName,
    requester: Option<PipelineIdentifier>,
}

impl PipelineLockChecker {
    pub fn for_trigger(locks: Arc<PipelineLockService>, name: PipelineName) -> Self {
        Self {
            locks,
            name,
            requester: None,
        }
    }

    pub fn for_run(locks: Arc<PipelineLockService>, requester: PipelineIdentifier) -> Self {
        Self {
            locks,
            name: requester.name.clone(),
            requester: Some(requester),
        }
    }

    async fn blocking_holder(&self) -> gatehouse_core::Result<Option<String>> {
        let Some(holder) = self.locks.locked_pipeline(&self.name).await? else {
            return Ok(None);
        };
        match &self.requester {
            Some(requester) if self.locks.can_schedule_stage_in_pipeline(requester).await? => {
                Ok(None)
            }
            _ => Ok(Some(holder.to_string())),
        }
    }
}

#[async_trait]
impl SchedulingChecker for PipelineLockChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let state_type = HealthStateType::general(HealthStateScope::for_pipeline(&self.name));
        match self.blocking_holder().await {
            Ok(Some(holder)) => result.conflict(
                &format!("Pipeline {} is locked", self.name),
                &format!(
                    "Pipeline {} is locked as {} is still in progress",
                    self.name, holder
                ),
                state_type,
            ),
            Ok(None) => result.success(state_type),
            Err(e) => collaborator_failed(result, "pipeline lock", &e, state_type),
        }
    }
}
