//! Admission checks evaluated before a trigger is accepted.
//!
//! Each checker writes exactly one outcome to the result it is given. A
//! passing checker writes a success scoped the same way its failure would
//! be, so an earlier problem recorded for that scope counts as cleared.

mod activity;
mod approval;
mod authorization;
mod disk;
mod exists;
mod lock;
mod pause;
mod previous;
mod trigger;

pub use activity::{PipelineActiveChecker, StageActiveChecker};
pub use approval::ManualPipelineChecker;
pub use authorization::StageAuthorizationChecker;
pub use disk::{DiskSpaceChecker, DiskSpaceSeverity, DiskTarget};
pub use exists::PipelineExistsChecker;
pub use lock::PipelineLockChecker;
pub use pause::PipelinePauseChecker;
pub use previous::PreviousStageChecker;
pub use trigger::AboutToBeTriggeredChecker;

use async_trait::async_trait;
use gatehouse_core::Error;
use gatehouse_core::health::{HealthStateType, OperationResult};
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait SchedulingChecker: Send + Sync {
    async fn check(&self, result: &mut dyn OperationResult);
}

#[async_trait]
impl<T: SchedulingChecker + ?Sized> SchedulingChecker for Arc<T> {
    async fn check(&self, result: &mut dyn OperationResult) {
        (**self).check(result).await
    }
}

/// Runs checkers in order and stops at the first one that does not succeed.
///
/// Warning checkers belong at the end: a warning stops the chain too.
#[derive(Default)]
pub struct CompositeChecker {
    checkers: Vec<Box<dyn SchedulingChecker>>,
}

impl CompositeChecker {
    pub fn new(checkers: Vec<Box<dyn SchedulingChecker>>) -> Self {
        Self { checkers }
    }

    pub fn with(mut self, checker: impl SchedulingChecker + 'static) -> Self {
        self.checkers.push(Box::new(checker));
        self
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

#[async_trait]
impl SchedulingChecker for CompositeChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        for checker in &self.checkers {
            checker.check(result).await;
            if !result.is_success() {
                return;
            }
        }
    }
}

/// Record that a collaborator failed while evaluating `check`.
fn collaborator_failed(
    result: &mut dyn OperationResult,
    check: &str,
    error: &Error,
    state_type: HealthStateType,
) {
    warn!(check, error = %error, "Admission check could not be evaluated");
    result.error(
        &format!("Could not evaluate {} check", check),
        &error.to_string(),
        state_type,
    );
}
