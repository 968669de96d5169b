use async_trait::async_trait;
use gatehouse_core::health::{HealthStateType, OperationResult};
use gatehouse_core::ids::PipelineName;
use gatehouse_core::ports::SecurityService;
use std::sync::Arc;

use super::{SchedulingChecker, collaborator_failed};

/// Refuses users without operate permission on the pipeline or stage.
pub struct StageAuthorizationChecker {
    security: Arc<dyn SecurityService>,
    name: PipelineName,
    stage: Option<String>,
    user: String,
}

impl StageAuthorizationChecker {
    pub fn for_pipeline(
        security: Arc<dyn SecurityService>,
        name: PipelineName,
        user: impl Into<String>,
    ) -> Self {
        Self {
            security,
            name,
            stage: None,
            user: user.into(),
        }
    }

    pub fn for_stage(
        security: Arc<dyn SecurityService>,
        name: PipelineName,
        stage: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            security,
            name,
            stage: Some(stage.into()),
            user: user.into(),
        }
    }
}

#[async_trait]
impl SchedulingChecker for StageAuthorizationChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let (allowed, state_type) = match &self.stage {
            Some(stage) => (
                self.security
                    .has_operate_permission_for_stage(&self.user, &self.name, stage)
                    .await,
                HealthStateType::forbidden_for_stage(&self.name, stage),
            ),
            None => (
                self.security
                    .has_operate_permission_for_pipeline(&self.user, &self.name)
                    .await,
                HealthStateType::forbidden_for_pipeline(&self.name),
            ),
        };

        match allowed {
            Ok(true) => result.success(state_type),
            Ok(false) => {
                let description = match &self.stage {
                    Some(stage) => format!(
                        "User {} does not have permission to schedule {}/{}",
                        self.user, self.name, stage
                    ),
                    None => format!(
                        "User {} does not have permission to trigger {}",
                        self.user, self.name
                    ),
                };
                result.forbidden(
                    &format!("Failed to trigger pipeline: {}", self.name),
                    &description,
                    state_type,
                );
            }
            Err(e) => collaborator_failed(result, "authorization", &e, state_type),
        }
    }
}
