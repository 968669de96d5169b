//! Pipeline configuration types.
//!
//! Only the slice of pipeline configuration the trigger and admission path
//! needs: stages and their approval type, materials, and lock behavior.

use crate::ids::PipelineName;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// How a pipeline guards against concurrent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockBehavior {
    /// Any number of runs may be in flight.
    #[default]
    None,
    /// Locked while running; a failure before the last stage keeps it locked until unlocked.
    LockOnFailure,
    /// Locked while running; unlocked as soon as the run is considered finished.
    UnlockWhenFinished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    /// Stage waits for a user before it runs.
    #[serde(default)]
    pub manual_approval: bool,
    /// Stage may only be scheduled once the stage before it passed.
    #[serde(default)]
    pub allow_only_on_success: bool,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl StageConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manual_approval: false,
            allow_only_on_success: false,
            variables: BTreeMap::new(),
        }
    }

    pub fn manual(mut self) -> Self {
        self.manual_approval = true;
        self
    }

    pub fn allow_only_on_success(mut self) -> Self {
        self.allow_only_on_success = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: PipelineName,
    /// Fingerprints of the materials this pipeline builds from.
    #[serde(default)]
    pub materials: Vec<String>,
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub lock_behavior: LockBehavior,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl PipelineConfig {
    pub fn new(name: impl Into<PipelineName>, stages: Vec<StageConfig>) -> Self {
        Self {
            name: name.into(),
            materials: Vec::new(),
            stages,
            lock_behavior: LockBehavior::None,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_materials(mut self, materials: Vec<String>) -> Self {
        self.materials = materials;
        self
    }

    pub fn with_lock_behavior(mut self, lock_behavior: LockBehavior) -> Self {
        self.lock_behavior = lock_behavior;
        self
    }

    pub fn is_lockable(&self) -> bool {
        self.lock_behavior != LockBehavior::None
    }

    pub fn is_unlockable_when_finished(&self) -> bool {
        self.lock_behavior == LockBehavior::UnlockWhenFinished
    }

    pub fn first_stage(&self) -> Option<&StageConfig> {
        self.stages.first()
    }

    pub fn first_stage_requires_approval(&self) -> bool {
        self.first_stage().is_some_and(|s| s.manual_approval)
    }

    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// The stage before `name`, or `None` if `name` is the first stage.
    pub fn previous_stage(&self, name: &str) -> Option<&StageConfig> {
        let index = self
            .stages
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))?;
        index.checked_sub(1).and_then(|i| self.stages.get(i))
    }

    /// The stage following `name`, or `None` if `name` is the last stage.
    pub fn next_stage(&self, name: &str) -> Option<&StageConfig> {
        let index = self
            .stages
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))?;
        self.stages.get(index + 1)
    }
}

/// A full configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfigs {
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

impl PipelineConfigs {
    pub fn new(pipelines: Vec<PipelineConfig>) -> Self {
        Self { pipelines }
    }

    pub fn get(&self, name: &PipelineName) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| &p.name == name)
    }

    pub fn contains(&self, name: &PipelineName) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace the pipeline with the same name.
    pub fn upsert(&mut self, config: PipelineConfig) {
        match self.pipelines.iter_mut().find(|p| p.name == config.name) {
            Some(existing) => *existing = config,
            None => self.pipelines.push(config),
        }
    }

    /// Hex SHA-256 of the canonical JSON form; recorded on every run.
    pub fn digest(&self) -> crate::Result<String> {
        let json = serde_json::to_vec(self)?;
        let hash = Sha256::digest(&json);
        Ok(hash.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(name: &str) -> PipelineConfig {
        PipelineConfig::new(
            name,
            vec![StageConfig::new("build"), StageConfig::new("deploy").manual()],
        )
    }

    #[test]
    fn test_lockability_follows_lock_behavior() {
        let p = pipeline("up");
        assert!(!p.is_lockable());
        let p = p.with_lock_behavior(LockBehavior::LockOnFailure);
        assert!(p.is_lockable());
        assert!(!p.is_unlockable_when_finished());
        let p = p.with_lock_behavior(LockBehavior::UnlockWhenFinished);
        assert!(p.is_unlockable_when_finished());
    }

    #[test]
    fn test_next_stage() {
        let p = pipeline("up");
        assert_eq!(p.next_stage("BUILD").map(|s| s.name.as_str()), Some("deploy"));
        assert!(p.next_stage("deploy").is_none());
        assert!(p.next_stage("missing").is_none());
    }

    #[test]
    fn test_previous_stage() {
        let p = pipeline("up");
        assert_eq!(p.previous_stage("Deploy").map(|s| s.name.as_str()), Some("build"));
        assert!(p.previous_stage("build").is_none());
        assert!(p.previous_stage("missing").is_none());
    }

    #[test]
    fn test_configs_lookup_is_case_insensitive() {
        let mut configs = PipelineConfigs::new(vec![pipeline("Up")]);
        assert!(configs.contains(&PipelineName::new("UP")));

        configs.upsert(pipeline("up").with_lock_behavior(LockBehavior::LockOnFailure));
        assert_eq!(configs.pipelines.len(), 1);
        assert!(configs.pipelines[0].is_lockable());
    }

    #[test]
    fn test_digest_changes_with_config() {
        let a = PipelineConfigs::new(vec![pipeline("a")]);
        let b = PipelineConfigs::new(vec![pipeline("b")]);
        let digest = a.digest().unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, a.digest().unwrap());
        assert_ne!(digest, b.digest().unwrap());
    }

    #[test]
    fn test_deserialize_defaults() {
        let yaml = r#"
pipelines:
  - name: Build-Linux
    stages:
      - name: compile
      - name: release
        manual_approval: true
"#;
        let configs: PipelineConfigs = serde_yaml::from_str(yaml).unwrap();
        let p = &configs.pipelines[0];
        assert_eq!(p.lock_behavior, LockBehavior::None);
        assert!(!p.first_stage_requires_approval());
        assert!(p.stages[1].manual_approval);
        assert!(!p.stages[1].allow_only_on_success);
    }
}
