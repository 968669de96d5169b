//! Strongly-typed identifiers for pipelines, runs and stages.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let uuid_str = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }
    };
}

define_id!(InstanceId, "pin");

/// Case-insensitive pipeline name.
///
/// Equality, ordering and hashing use the lower-cased form; the original
/// spelling is kept for display.
#[derive(Clone)]
pub struct PipelineName {
    display: String,
    folded: String,
}

impl PipelineName {
    pub fn new(name: impl Into<String>) -> Self {
        let display = name.into();
        let folded = display.to_lowercase();
        Self { display, folded }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Lower-cased key used for maps and lock tables.
    pub fn folded(&self) -> &str {
        &self.folded
    }
}

impl PartialEq for PipelineName {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for PipelineName {}

impl Hash for PipelineName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl PartialOrd for PipelineName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PipelineName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded.cmp(&other.folded)
    }
}

impl fmt::Debug for PipelineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipelineName({:?})", self.display)
    }
}

impl fmt::Display for PipelineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<&str> for PipelineName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PipelineName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl Serialize for PipelineName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display)
    }
}

impl<'de> Deserialize<'de> for PipelineName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// One run of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineIdentifier {
    pub name: PipelineName,
    pub counter: u64,
}

impl PipelineIdentifier {
    pub fn new(name: impl Into<PipelineName>, counter: u64) -> Self {
        Self {
            name: name.into(),
            counter,
        }
    }

    pub fn stage(&self, stage_name: impl Into<String>, stage_counter: u32) -> StageIdentifier {
        StageIdentifier {
            pipeline_name: self.name.clone(),
            pipeline_counter: self.counter,
            stage_name: stage_name.into(),
            stage_counter,
        }
    }
}

impl fmt::Display for PipelineIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.counter)
    }
}

/// One run of a stage within a pipeline run. Used as the pipeline lock holder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageIdentifier {
    pub pipeline_name: PipelineName,
    pub pipeline_counter: u64,
    pub stage_name: String,
    pub stage_counter: u32,
}

impl StageIdentifier {
    pub fn pipeline_identifier(&self) -> PipelineIdentifier {
        PipelineIdentifier::new(self.pipeline_name.clone(), self.pipeline_counter)
    }
}

impl fmt::Display for StageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.pipeline_name, self.pipeline_counter, self.stage_name, self.stage_counter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_instance_id_display() {
        let id = InstanceId::new();
        assert!(id.to_string().starts_with("pin_"));
    }

    #[test]
    fn test_instance_id_parse() {
        let id = InstanceId::new();
        let parsed: InstanceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_pipeline_name_is_case_insensitive() {
        let upper = PipelineName::new("Deploy-Prod");
        let lower = PipelineName::new("deploy-prod");
        assert_eq!(upper, lower);
        assert_eq!(upper.to_string(), "Deploy-Prod");

        let mut map = HashMap::new();
        map.insert(upper, 1);
        assert_eq!(map.get(&lower), Some(&1));
    }

    #[test]
    fn test_pipeline_name_serializes_original_case() {
        let name = PipelineName::new("MyPipeline");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"MyPipeline\"");
        let back: PipelineName = serde_json::from_str("\"MYPIPELINE\"").unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn test_stage_identifier_projects_pipeline_identity() {
        let run = PipelineIdentifier::new("Up42", 7);
        let stage = run.stage("build", 1);
        assert_eq!(stage.pipeline_identifier(), PipelineIdentifier::new("up42", 7));
        assert_eq!(stage.to_string(), "Up42/7/build/1");
    }
}
