use async_trait::async_trait;
use gatehouse_core::Result;
use gatehouse_core::health::{HealthStateKind, HealthStateType, OperationResult};
use gatehouse_core::ids::PipelineIdentifier;
use gatehouse_core::ports::{ConfigSource, PipelineStore};
use gatehouse_core::run::StageState;
use std::sync::Arc;

use super::{SchedulingChecker, collaborator_failed};

/// Refuses a stage marked `allow_only_on_success` until the stage before it
/// passed in the same run.
pub struct PreviousStageChecker {
    config: Arc<dyn ConfigSource>,
    store: Arc<dyn PipelineStore>,
    identifier: PipelineIdentifier,
    stage: String,
}

impl PreviousStageChecker {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        store: Arc<dyn PipelineStore>,
        identifier: PipelineIdentifier,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            config,
            store,
            identifier,
            stage: stage.into(),
        }
    }

    /// The previous stage and its state, when it keeps this stage from running.
    async fn blocking_stage(&self) -> Result<Option<(String, StageState)>> {
        let Some(config) = self.config.pipeline_config(&self.identifier.name).await? else {
            return Ok(None);
        };
        if !config
            .stage(&self.stage)
            .is_some_and(|s| s.allow_only_on_success)
        {
            return Ok(None);
        }
        let Some(previous) = config.previous_stage(&self.stage) else {
            return Ok(None);
        };
        let Some(run) = self.store.pipeline_instance(&self.identifier).await? else {
            return Ok(None);
        };
        Ok(run
            .stage(&previous.name)
            .filter(|s| !s.state.passed())
            .map(|s| (previous.name.clone(), s.state)))
    }
}

#[async_trait]
impl SchedulingChecker for PreviousStageChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let state_type = HealthStateType::global(HealthStateKind::Forbidden);
        match self.blocking_stage().await {
            Ok(Some((previous, state))) => {
                let message = format!(
                    "Cannot schedule {} as the previous stage {} has {}!",
                    self.stage, previous, state
                );
                result.forbidden(&message, &message, state_type);
            }
            Ok(None) => result.success(state_type),
            Err(e) => collaborator_failed(result, "previous stage", &e, state_type),
        }
    }
}
