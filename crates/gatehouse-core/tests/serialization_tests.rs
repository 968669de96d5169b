//! Serialization tests for gatehouse-core types.

use chrono::Utc;
use gatehouse_core::build_cause::*;
use gatehouse_core::health::*;
use gatehouse_core::ids::*;
use gatehouse_core::pipeline::*;
use gatehouse_core::run::*;
use pretty_assertions::assert_eq;

fn sample_cause() -> BuildCause {
    let now = Utc::now();
    BuildCause::manual(
        MaterialRevisions::new(vec![MaterialRevision::new(
            "git:https://example.com/repo.git",
            vec![Modification::new("9f2c1e", now).by("dev@example.com")],
        )]),
        "admin",
        now,
    )
}

#[test]
fn test_build_cause_roundtrip() {
    let cause = sample_cause();
    let json = serde_json::to_string(&cause).expect("serialize");
    let parsed: BuildCause = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(cause, parsed);
    assert!(parsed.is_same_as(&cause));
}

#[test]
fn test_trigger_kind_uses_snake_case() {
    let json = serde_json::to_string(&TriggerKind::External).expect("serialize");
    assert_eq!(json, "\"external\"");
}

#[test]
fn test_pipeline_instance_roundtrip_keeps_name_case() {
    let config = PipelineConfig::new("Deploy-Prod", vec![StageConfig::new("build")]);
    let instance = PipelineInstance::instantiate(
        &config,
        sample_cause(),
        &SchedulingContext::new("admin"),
        "digest",
        &gatehouse_core::clock::SystemClock,
    )
    .expect("instantiate");

    let json = serde_json::to_value(&instance).expect("serialize");
    assert_eq!(json["name"], "Deploy-Prod");

    let parsed: PipelineInstance = serde_json::from_value(json).expect("deserialize");
    assert_eq!(parsed.name, PipelineName::new("deploy-prod"));
    assert_eq!(parsed.stages[0].state, StageState::Scheduled);
}

#[test]
fn test_health_outcome_roundtrip() {
    let outcome = HealthOutcome {
        kind: OutcomeKind::Conflict,
        message: "Pipeline is locked".to_string(),
        description: "up/3 holds the lock".to_string(),
        state_type: HealthStateType::general(HealthStateScope::for_stage(
            &PipelineName::new("up"),
            "build",
        )),
    };

    let json = serde_json::to_string(&outcome).expect("serialize");
    let parsed: HealthOutcome = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(outcome, parsed);
}
