//! Pipeline run (instance) types.

use crate::build_cause::BuildCause;
use crate::clock::Clock;
use crate::ids::{InstanceId, PipelineIdentifier, PipelineName, StageIdentifier};
use crate::pipeline::PipelineConfig;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Scheduled,
    Building,
    Passed,
    Failed,
    Cancelled,
    NotRun,
}

impl StageState {
    pub fn is_active(&self) -> bool {
        matches!(self, StageState::Scheduled | StageState::Building)
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            StageState::Passed | StageState::Failed | StageState::Cancelled
        )
    }

    pub fn passed(&self) -> bool {
        matches!(self, StageState::Passed)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageState::Scheduled => "Scheduled",
            StageState::Building => "Building",
            StageState::Passed => "Passed",
            StageState::Failed => "Failed",
            StageState::Cancelled => "Cancelled",
            StageState::NotRun => "NotRun",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageInstance {
    pub name: String,
    pub counter: u32,
    pub state: StageState,
    pub approved_by: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Inputs the caller resolved for this scheduling attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulingContext {
    pub approved_by: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl SchedulingContext {
    pub fn new(approved_by: impl Into<String>) -> Self {
        Self {
            approved_by: approved_by.into(),
            variables: BTreeMap::new(),
        }
    }

    /// Later values win.
    pub fn override_variables(mut self, variables: &BTreeMap<String, String>) -> Self {
        self.variables
            .extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// A persisted pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInstance {
    pub id: InstanceId,
    pub name: PipelineName,
    /// Assigned by the store on save; zero until then.
    pub counter: u64,
    pub build_cause: BuildCause,
    pub stages: Vec<StageInstance>,
    /// Materials configured for the pipeline when this run was created.
    pub materials: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub config_digest: String,
    pub scheduled_at: DateTime<Utc>,
}

impl PipelineInstance {
    /// Build a new run from a build cause: the first stage is scheduled, the rest wait.
    pub fn instantiate(
        config: &PipelineConfig,
        build_cause: BuildCause,
        context: &SchedulingContext,
        config_digest: &str,
        clock: &dyn Clock,
    ) -> Result<Self> {
        let first = config.first_stage().ok_or_else(|| {
            Error::InvalidPipeline(format!("pipeline {} has no stages", config.name))
        })?;
        let now = clock.now();

        let stages = config
            .stages
            .iter()
            .map(|stage| {
                let is_first = stage.name == first.name;
                StageInstance {
                    name: stage.name.clone(),
                    counter: 1,
                    state: if is_first {
                        StageState::Scheduled
                    } else {
                        StageState::NotRun
                    },
                    approved_by: is_first.then(|| context.approved_by.clone()),
                    scheduled_at: is_first.then_some(now),
                }
            })
            .collect();

        let mut variables = config.variables.clone();
        variables.extend(context.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        variables.extend(build_cause.variables.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Self {
            id: InstanceId::new(),
            name: config.name.clone(),
            counter: 0,
            build_cause,
            stages,
            materials: config.materials.clone(),
            variables,
            config_digest: config_digest.to_string(),
            scheduled_at: now,
        })
    }

    pub fn identifier(&self) -> PipelineIdentifier {
        PipelineIdentifier::new(self.name.clone(), self.counter)
    }

    /// Identifier of the stage that started this run.
    pub fn first_stage_identifier(&self) -> Option<StageIdentifier> {
        self.stages
            .first()
            .map(|s| self.identifier().stage(s.name.clone(), s.counter))
    }

    pub fn stage(&self, name: &str) -> Option<&StageInstance> {
        self.stages.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageInstance> {
        self.stages
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn is_active(&self) -> bool {
        self.stages.iter().any(|s| s.state.is_active())
    }
}
