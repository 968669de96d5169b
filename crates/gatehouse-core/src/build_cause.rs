//! Build causes: the material revisions and trigger metadata that justify a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single change detected on a material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub revision: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    pub modified_at: DateTime<Utc>,
}

impl Modification {
    pub fn new(revision: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        Self {
            revision: revision.into(),
            user: None,
            comment: None,
            modified_at,
        }
    }

    pub fn by(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Modifications on one material, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRevision {
    /// Fingerprint of the material configuration.
    pub material: String,
    pub modifications: Vec<Modification>,
    /// Whether this material changed since the previous run.
    #[serde(default)]
    pub changed: bool,
}

impl MaterialRevision {
    pub fn new(material: impl Into<String>, modifications: Vec<Modification>) -> Self {
        Self {
            material: material.into(),
            modifications,
            changed: true,
        }
    }

    pub fn unchanged(mut self) -> Self {
        self.changed = false;
        self
    }

    /// Latest revision seen for this material.
    pub fn head(&self) -> Option<&Modification> {
        self.modifications.first()
    }
}

/// The set of material revisions a run is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialRevisions(Vec<MaterialRevision>);

impl MaterialRevisions {
    pub fn new(revisions: Vec<MaterialRevision>) -> Self {
        Self(revisions)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialRevision> {
        self.0.iter()
    }

    pub fn materials(&self) -> BTreeSet<&str> {
        self.0.iter().map(|r| r.material.as_str()).collect()
    }

    /// Same materials with the same head revision on each.
    ///
    /// Older modifications and the `changed` flag do not take part.
    pub fn is_same_as(&self, other: &MaterialRevisions) -> bool {
        if self.0.len() != other.0.len() || self.materials() != other.materials() {
            return false;
        }
        self.0.iter().all(|mine| {
            other
                .0
                .iter()
                .find(|theirs| theirs.material == mine.material)
                .is_some_and(|theirs| {
                    mine.head().map(|m| &m.revision) == theirs.head().map(|m| &m.revision)
                })
        })
    }

    pub fn has_changed(&self) -> bool {
        self.0.iter().any(|r| r.changed)
    }

    fn first_changed(&self) -> Option<&MaterialRevision> {
        self.0.iter().find(|r| r.changed).or_else(|| self.0.first())
    }
}

/// What kind of request produced a build cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Material change detected by polling.
    Auto,
    /// A user pressed "trigger".
    Manual,
    /// Cron-style timer.
    Timer,
    /// An external system (webhook, API) asked for a run.
    External,
}

/// Immutable justification for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildCause {
    pub revisions: MaterialRevisions,
    pub trigger: TriggerKind,
    pub approver: String,
    pub forced: bool,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl BuildCause {
    pub const DEFAULT_APPROVER: &'static str = "changes";

    /// Build cause for a material change picked up by polling.
    pub fn auto(revisions: MaterialRevisions, created_at: DateTime<Utc>) -> Self {
        Self {
            revisions,
            trigger: TriggerKind::Auto,
            approver: Self::DEFAULT_APPROVER.to_string(),
            forced: false,
            variables: BTreeMap::new(),
            created_at,
        }
    }

    /// Build cause for a user-initiated run; always forced.
    pub fn manual(
        revisions: MaterialRevisions,
        user: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            revisions,
            trigger: TriggerKind::Manual,
            approver: user.into(),
            forced: true,
            variables: BTreeMap::new(),
            created_at,
        }
    }

    pub fn timer(revisions: MaterialRevisions, created_at: DateTime<Utc>) -> Self {
        Self {
            revisions,
            trigger: TriggerKind::Timer,
            approver: "timer".to_string(),
            forced: false,
            variables: BTreeMap::new(),
            created_at,
        }
    }

    pub fn external(
        revisions: MaterialRevisions,
        source: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            revisions,
            trigger: TriggerKind::External,
            approver: source.into(),
            forced: false,
            variables: BTreeMap::new(),
            created_at,
        }
    }

    /// Sentinel for "this pipeline has never been scheduled".
    pub fn never_run() -> Self {
        Self {
            revisions: MaterialRevisions::default(),
            trigger: TriggerKind::Auto,
            approver: String::new(),
            forced: false,
            variables: BTreeMap::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn has_never_run(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Same material revisions, ignoring who or what triggered.
    ///
    /// A never-run cause is never the same as anything, so duplicate
    /// suppression cannot fire for a pipeline without history.
    pub fn is_same_as(&self, other: &BuildCause) -> bool {
        if self.has_never_run() || other.has_never_run() {
            return false;
        }
        self.revisions.is_same_as(&other.revisions)
    }

    /// Whether this cause should replace `existing` as the pending cause.
    pub fn trumps(&self, existing: &BuildCause) -> bool {
        self.forced && !existing.forced
    }

    pub fn build_cause_message(&self) -> String {
        if self.forced {
            return format!("Forced by {}", self.approver);
        }
        match self.trigger {
            TriggerKind::Timer => "Triggered by timer".to_string(),
            TriggerKind::External => format!("Triggered by {}", self.approver),
            TriggerKind::Auto | TriggerKind::Manual => {
                let user = self
                    .revisions
                    .first_changed()
                    .and_then(|r| r.head())
                    .and_then(|m| m.user.as_deref())
                    .unwrap_or("anonymous");
                format!("modified by {}", user)
            }
        }
    }
}
