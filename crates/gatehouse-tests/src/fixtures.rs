//! Test fixtures for creating sample data.

use chrono::{DateTime, Utc};
use gatehouse_core::build_cause::{BuildCause, MaterialRevision, MaterialRevisions, Modification};
use gatehouse_core::pipeline::{LockBehavior, PipelineConfig, StageConfig};

/// Material fingerprint every fixture pipeline builds from.
pub const GIT_MATERIAL: &str = "git:https://example.com/app.git";

/// Factory for pipeline configurations.
pub struct PipelineFixture;

impl PipelineFixture {
    /// Two automatic stages, no locking.
    pub fn simple(name: &str) -> PipelineConfig {
        PipelineConfig::new(
            name,
            vec![StageConfig::new("build"), StageConfig::new("test")],
        )
        .with_materials(vec![GIT_MATERIAL.to_string()])
    }

    /// Locked while running, stays locked after a failure.
    pub fn lockable(name: &str) -> PipelineConfig {
        Self::simple(name).with_lock_behavior(LockBehavior::LockOnFailure)
    }

    /// Locked while running, released once the run cannot progress on its own.
    pub fn unlock_when_finished(name: &str) -> PipelineConfig {
        Self::simple(name).with_lock_behavior(LockBehavior::UnlockWhenFinished)
    }

    /// Lockable, with a deploy stage that waits for approval.
    pub fn with_manual_deploy(name: &str) -> PipelineConfig {
        let mut config = Self::unlock_when_finished(name);
        config.stages.push(StageConfig::new("deploy").manual());
        config
    }

    /// Lockable; `ft` only runs once `dev` passed.
    pub fn gated(name: &str) -> PipelineConfig {
        PipelineConfig::new(
            name,
            vec![StageConfig::new("dev"), StageConfig::new("ft").allow_only_on_success()],
        )
        .with_materials(vec![GIT_MATERIAL.to_string()])
        .with_lock_behavior(LockBehavior::LockOnFailure)
    }

    /// First stage needs a user to approve it.
    pub fn manual_first_stage(name: &str) -> PipelineConfig {
        PipelineConfig::new(
            name,
            vec![StageConfig::new("build").manual(), StageConfig::new("test")],
        )
        .with_materials(vec![GIT_MATERIAL.to_string()])
    }
}

/// Factory for build causes.
pub struct BuildCauseFixture;

impl BuildCauseFixture {
    pub fn revisions(revision: &str, at: DateTime<Utc>) -> MaterialRevisions {
        Self::revisions_of(GIT_MATERIAL, revision, at)
    }

    pub fn revisions_of(material: &str, revision: &str, at: DateTime<Utc>) -> MaterialRevisions {
        MaterialRevisions::new(vec![MaterialRevision::new(
            material,
            vec![Modification::new(revision, at).by("dev")],
        )])
    }

    /// Material change picked up by polling.
    pub fn auto(revision: &str) -> BuildCause {
        let now = Utc::now();
        BuildCause::auto(Self::revisions(revision, now), now)
    }

    /// User-initiated, forced.
    pub fn manual(revision: &str, user: &str) -> BuildCause {
        let now = Utc::now();
        BuildCause::manual(Self::revisions(revision, now), user, now)
    }

    pub fn timer(revision: &str) -> BuildCause {
        let now = Utc::now();
        BuildCause::timer(Self::revisions(revision, now), now)
    }

    /// Built from a material the fixture pipelines do not use.
    pub fn from_removed_material(revision: &str) -> BuildCause {
        let now = Utc::now();
        BuildCause::auto(Self::revisions_of("svn:legacy", revision, now), now)
    }
}
