use async_trait::async_trait;
use gatehouse_core::health::{HealthStateScope, HealthStateType, OperationResult};
use gatehouse_core::ids::PipelineName;
use gatehouse_core::ports::ConfigSource;
use std::sync::Arc;

use super::{SchedulingChecker, collaborator_failed};

/// Refuses requests for pipelines missing from the current configuration.
pub struct PipelineExistsChecker {
    config: Arc<dyn ConfigSource>,
    name: PipelineName,
}

impl PipelineExistsChecker {
    pub fn new(config: Arc<dyn ConfigSource>, name: PipelineName) -> Self {
        Self { config, name }
    }
}

#[async_trait]
impl SchedulingChecker for PipelineExistsChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let state_type = HealthStateType::general(HealthStateScope::for_pipeline(&self.name));
        match self.config.has_pipeline(&self.name).await {
            Ok(true) => result.success(state_type),
            Ok(false) => result.not_acceptable(
                &format!("Pipeline '{}' does not exist", self.name),
                &format!("Pipeline '{}' is not in the current configuration", self.name),
                state_type,
            ),
            Err(e) => collaborator_failed(result, "pipeline existence", &e, state_type),
        }
    }
}
