//! Categorized, scoped outcomes written by admission checks.
//!
//! Every check writes exactly one outcome into an [`OperationResult`]. Success
//! outcomes are real writes: they carry the same [`HealthStateType`] a failure
//! would have used, so whoever tracks health state can clear an earlier error
//! for that slot.

use crate::ids::PipelineName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a health condition is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStateScope {
    Global,
    Pipeline(PipelineName),
    Stage { pipeline: PipelineName, stage: String },
    Named(String),
}

impl HealthStateScope {
    pub fn for_pipeline(name: &PipelineName) -> Self {
        HealthStateScope::Pipeline(name.clone())
    }

    pub fn for_stage(name: &PipelineName, stage: impl Into<String>) -> Self {
        HealthStateScope::Stage {
            pipeline: name.clone(),
            stage: stage.into(),
        }
    }
}

impl fmt::Display for HealthStateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStateScope::Global => f.write_str("GLOBAL"),
            HealthStateScope::Pipeline(name) => write!(f, "{}", name),
            HealthStateScope::Stage { pipeline, stage } => write!(f, "{}/{}", pipeline, stage),
            HealthStateScope::Named(key) => f.write_str(key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStateKind {
    General,
    Forbidden,
    ArtifactsDiskFull,
    ArtifactsDiskWarning,
    DatabaseDiskFull,
    DatabaseDiskWarning,
}

/// Addressable slot for "is there an unresolved problem here".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HealthStateType {
    pub scope: HealthStateScope,
    pub kind: HealthStateKind,
}

impl HealthStateType {
    pub fn general(scope: HealthStateScope) -> Self {
        Self {
            scope,
            kind: HealthStateKind::General,
        }
    }

    pub fn forbidden_for_pipeline(name: &PipelineName) -> Self {
        Self {
            scope: HealthStateScope::for_pipeline(name),
            kind: HealthStateKind::Forbidden,
        }
    }

    pub fn forbidden_for_stage(name: &PipelineName, stage: impl Into<String>) -> Self {
        Self {
            scope: HealthStateScope::for_stage(name, stage),
            kind: HealthStateKind::Forbidden,
        }
    }

    pub fn global(kind: HealthStateKind) -> Self {
        Self {
            scope: HealthStateScope::Global,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Warning,
    Error,
    Conflict,
    Forbidden,
    NotAcceptable,
    InsufficientStorage,
}

impl OutcomeKind {
    /// Whether the caller may go ahead with the request.
    pub fn can_continue(&self) -> bool {
        matches!(self, OutcomeKind::Success | OutcomeKind::Warning)
    }

    /// Closest HTTP status, for outer layers that render outcomes.
    pub fn http_code(&self) -> u16 {
        match self {
            OutcomeKind::Success | OutcomeKind::Warning => 200,
            OutcomeKind::Error => 400,
            OutcomeKind::Forbidden => 403,
            OutcomeKind::NotAcceptable => 406,
            OutcomeKind::Conflict => 409,
            OutcomeKind::InsufficientStorage => 507,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthOutcome {
    pub kind: OutcomeKind,
    pub message: String,
    pub description: String,
    pub state_type: HealthStateType,
}

/// Sink for check outcomes.
///
/// Implementors provide [`OperationResult::record`] and [`OperationResult::last`];
/// the category helpers build the outcome.
pub trait OperationResult: Send {
    fn record(&mut self, outcome: HealthOutcome);

    fn success(&mut self, state_type: HealthStateType) {
        self.record(HealthOutcome {
            kind: OutcomeKind::Success,
            message: String::new(),
            description: String::new(),
            state_type,
        });
    }

    fn warning(&mut self, message: &str, description: &str, state_type: HealthStateType) {
        self.record(outcome(OutcomeKind::Warning, message, description, state_type));
    }

    fn error(&mut self, message: &str, description: &str, state_type: HealthStateType) {
        self.record(outcome(OutcomeKind::Error, message, description, state_type));
    }

    fn conflict(&mut self, message: &str, description: &str, state_type: HealthStateType) {
        self.record(outcome(OutcomeKind::Conflict, message, description, state_type));
    }

    fn forbidden(&mut self, message: &str, description: &str, state_type: HealthStateType) {
        self.record(outcome(OutcomeKind::Forbidden, message, description, state_type));
    }

    fn not_acceptable(&mut self, message: &str, description: &str, state_type: HealthStateType) {
        self.record(outcome(
            OutcomeKind::NotAcceptable,
            message,
            description,
            state_type,
        ));
    }

    fn insufficient_storage(
        &mut self,
        message: &str,
        description: &str,
        state_type: HealthStateType,
    ) {
        self.record(outcome(
            OutcomeKind::InsufficientStorage,
            message,
            description,
            state_type,
        ));
    }

    /// The most recent outcome, if any was written.
    fn last(&self) -> Option<&HealthOutcome>;

    fn can_continue(&self) -> bool {
        self.last().is_none_or(|o| o.kind.can_continue())
    }

    fn is_success(&self) -> bool {
        self.last().is_none_or(|o| o.kind == OutcomeKind::Success)
    }
}

fn outcome(
    kind: OutcomeKind,
    message: &str,
    description: &str,
    state_type: HealthStateType,
) -> HealthOutcome {
    HealthOutcome {
        kind,
        message: message.to_string(),
        description: description.to_string(),
        state_type,
    }
}

/// Keeps the last outcome written.
#[derive(Debug, Clone, Default)]
pub struct ServerHealthResult {
    outcome: Option<HealthOutcome>,
}

impl ServerHealthResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self) -> Option<&HealthOutcome> {
        self.outcome.as_ref()
    }

    pub fn kind(&self) -> Option<OutcomeKind> {
        self.outcome.as_ref().map(|o| o.kind)
    }

    pub fn message(&self) -> &str {
        self.outcome.as_ref().map_or("", |o| o.message.as_str())
    }

    pub fn state_type(&self) -> Option<&HealthStateType> {
        self.outcome.as_ref().map(|o| &o.state_type)
    }
}

impl OperationResult for ServerHealthResult {
    fn record(&mut self, outcome: HealthOutcome) {
        self.outcome = Some(outcome);
    }

    fn last(&self) -> Option<&HealthOutcome> {
        self.outcome.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_can_continue() {
        let result = ServerHealthResult::new();
        assert!(result.can_continue());
        assert!(result.is_success());
        assert_eq!(result.message(), "");
    }

    #[test]
    fn test_last_write_wins() {
        let name = PipelineName::new("up");
        let scope = HealthStateType::general(HealthStateScope::for_pipeline(&name));
        let mut result = ServerHealthResult::new();

        result.conflict("locked", "pipeline is locked", scope.clone());
        assert!(!result.can_continue());
        assert_eq!(result.kind(), Some(OutcomeKind::Conflict));

        result.success(scope.clone());
        assert!(result.is_success());
        assert_eq!(result.state_type(), Some(&scope));
    }

    #[test]
    fn test_warning_can_continue() {
        let mut result = ServerHealthResult::new();
        result.warning(
            "low disk",
            "",
            HealthStateType::global(HealthStateKind::ArtifactsDiskWarning),
        );
        assert!(result.can_continue());
        assert!(!result.is_success());
        assert_eq!(result.kind().map(|k| k.http_code()), Some(200));
    }

    #[test]
    fn test_insufficient_storage_http_code() {
        assert_eq!(OutcomeKind::InsufficientStorage.http_code(), 507);
        assert_eq!(OutcomeKind::Conflict.http_code(), 409);
        assert!(!OutcomeKind::Forbidden.can_continue());
    }
}
