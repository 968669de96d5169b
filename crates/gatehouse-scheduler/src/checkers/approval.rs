use async_trait::async_trait;
use gatehouse_core::build_cause::TriggerKind;
use gatehouse_core::health::{HealthStateScope, HealthStateType, OperationResult};
use gatehouse_core::pipeline::PipelineConfig;

use super::SchedulingChecker;

/// Refuses non-manual triggers of a pipeline whose first stage needs approval.
pub struct ManualPipelineChecker {
    config: PipelineConfig,
    trigger: TriggerKind,
}

impl ManualPipelineChecker {
    pub fn new(config: PipelineConfig, trigger: TriggerKind) -> Self {
        Self { config, trigger }
    }
}

#[async_trait]
impl SchedulingChecker for ManualPipelineChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let state_type =
            HealthStateType::general(HealthStateScope::for_pipeline(&self.config.name));
        if self.config.first_stage_requires_approval() && self.trigger != TriggerKind::Manual {
            let message = format!("Failed to trigger pipeline: {}", self.config.name);
            let description = format!(
                "Pipeline {} has a manual first stage and cannot be triggered {}",
                self.config.name,
                trigger_label(self.trigger)
            );
            result.conflict(&message, &description, state_type);
            return;
        }
        result.success(state_type);
    }
}

fn trigger_label(trigger: TriggerKind) -> &'static str {
    match trigger {
        TriggerKind::Auto => "automatically",
        TriggerKind::Manual => "manually",
        TriggerKind::Timer => "by a timer",
        TriggerKind::External => "externally",
    }
}
