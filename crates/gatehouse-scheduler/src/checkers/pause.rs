use async_trait::async_trait;
use gatehouse_core::health::{HealthStateScope, HealthStateType, OperationResult};
use gatehouse_core::ids::PipelineName;
use gatehouse_core::ports::PipelineStore;
use std::sync::Arc;

use super::{SchedulingChecker, collaborator_failed};

pub struct PipelinePauseChecker {
    store: Arc<dyn PipelineStore>,
    name: PipelineName,
}

impl PipelinePauseChecker {
    pub fn new(store: Arc<dyn PipelineStore>, name: PipelineName) -> Self {
        Self { store, name }
    }
}

#[async_trait]
impl SchedulingChecker for PipelinePauseChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let state_type = HealthStateType::general(HealthStateScope::for_pipeline(&self.name));
        match self.store.pause_info(&self.name).await {
            Ok(Some(pause)) => result.conflict(
                &format!("Failed to trigger pipeline [{}]", self.name),
                &format!(
                    "Pipeline {} is paused by {}: {}",
                    self.name, pause.paused_by, pause.cause
                ),
                state_type,
            ),
            Ok(None) => result.success(state_type),
            Err(e) => collaborator_failed(result, "pause", &e, state_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::health::{OutcomeKind, ServerHealthResult};
    use gatehouse_store::MemoryPipelineStore;

    #[tokio::test]
    async fn test_paused_pipeline_conflicts() {
        let store = Arc::new(MemoryPipelineStore::new());
        let name = PipelineName::new("up");
        let checker = PipelinePauseChecker::new(store.clone(), name.clone());

        store.pause(&name, "admin", "release freeze", chrono::Utc::now());
        let mut result = ServerHealthResult::new();
        checker.check(&mut result).await;
        assert_eq!(result.kind(), Some(OutcomeKind::Conflict));
        assert!(result.outcome().unwrap().description.contains("release freeze"));

        store.unpause(&name);
        let mut result = ServerHealthResult::new();
        checker.check(&mut result).await;
        assert!(result.is_success());
    }
}
