use async_trait::async_trait;
use gatehouse_core::health::{HealthStateScope, HealthStateType, OperationResult};
use gatehouse_core::ids::PipelineName;
use gatehouse_core::ports::PipelineStore;
use std::sync::Arc;

use super::{SchedulingChecker, collaborator_failed};

/// Refuses a trigger while the pipeline's latest run is still in progress.
pub struct PipelineActiveChecker {
    store: Arc<dyn PipelineStore>,
    name: PipelineName,
}

impl PipelineActiveChecker {
    pub fn new(store: Arc<dyn PipelineStore>, name: PipelineName) -> Self {
        Self { store, name }
    }
}

#[async_trait]
impl SchedulingChecker for PipelineActiveChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let state_type = HealthStateType::general(HealthStateScope::for_pipeline(&self.name));
        match self.store.is_pipeline_active(&self.name).await {
            Ok(true) => result.conflict(
                &format!("Failed to trigger pipeline [{}]", self.name),
                &format!("Pipeline {} is still in progress", self.name),
                state_type,
            ),
            Ok(false) => result.success(state_type),
            Err(e) => collaborator_failed(result, "pipeline activity", &e, state_type),
        }
    }
}

/// Refuses to schedule a stage while any run of it is scheduled or building.
pub struct StageActiveChecker {
    store: Arc<dyn PipelineStore>,
    name: PipelineName,
    stage: String,
}

impl StageActiveChecker {
    pub fn new(store: Arc<dyn PipelineStore>, name: PipelineName, stage: impl Into<String>) -> Self {
        Self {
            store,
            name,
            stage: stage.into(),
        }
    }
}

#[async_trait]
impl SchedulingChecker for StageActiveChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let state_type =
            HealthStateType::general(HealthStateScope::for_stage(&self.name, &self.stage));
        match self.store.is_stage_active(&self.name, &self.stage).await {
            Ok(true) => {
                let message = format!(
                    "Cannot schedule {} as it is already in progress in pipeline {}",
                    self.stage, self.name
                );
                result.error(&message, &message, state_type);
            }
            Ok(false) => result.success(state_type),
            Err(e) => collaborator_failed(result, "stage activity", &e, state_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::build_cause::{BuildCause, MaterialRevision, MaterialRevisions, Modification};
    use gatehouse_core::clock::{Clock, ManualClock};
    use gatehouse_core::health::{HealthStateKind, OutcomeKind, ServerHealthResult};
    use gatehouse_core::pipeline::{PipelineConfig, StageConfig};
    use gatehouse_core::run::{PipelineInstance, SchedulingContext, StageState};
    use gatehouse_store::MemoryPipelineStore;

    async fn store_with_run() -> (Arc<MemoryPipelineStore>, PipelineInstance) {
        let clock = ManualClock::default();
        let config = PipelineConfig::new("up", vec![StageConfig::new("build")]);
        let cause = BuildCause::auto(
            MaterialRevisions::new(vec![MaterialRevision::new(
                "git",
                vec![Modification::new("r1", clock.now())],
            )]),
            clock.now(),
        );
        let instance = PipelineInstance::instantiate(
            &config,
            cause,
            &SchedulingContext::new("changes"),
            "d",
            &clock,
        )
        .unwrap();
        let store = Arc::new(MemoryPipelineStore::new());
        let mut uow = store.begin().await.unwrap();
        let saved = uow.store().save_pipeline(instance).await.unwrap();
        uow.commit().await.unwrap();
        (store, saved)
    }

    #[tokio::test]
    async fn test_active_pipeline_conflicts_until_finished() {
        let (store, run) = store_with_run().await;
        let checker = PipelineActiveChecker::new(store.clone(), PipelineName::new("up"));

        let mut result = ServerHealthResult::new();
        checker.check(&mut result).await;
        assert_eq!(result.kind(), Some(OutcomeKind::Conflict));

        store
            .update_stage(&run.identifier(), "build", StageState::Passed)
            .unwrap();
        let mut result = ServerHealthResult::new();
        checker.check(&mut result).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_active_stage_is_an_error_scoped_to_the_stage() {
        let (store, _) = store_with_run().await;
        let checker = StageActiveChecker::new(store, PipelineName::new("up"), "build");

        let mut result = ServerHealthResult::new();
        checker.check(&mut result).await;
        assert_eq!(result.kind(), Some(OutcomeKind::Error));
        assert_eq!(
            result.state_type(),
            Some(&HealthStateType {
                scope: HealthStateScope::for_stage(&PipelineName::new("up"), "build"),
                kind: HealthStateKind::General,
            })
        );
    }
}
