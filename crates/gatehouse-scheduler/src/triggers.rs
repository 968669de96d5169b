//! Tracks pipelines that are in the middle of being triggered.

use dashmap::DashSet;
use gatehouse_core::ids::PipelineName;
use tracing::debug;

/// Pipelines currently between "trigger accepted" and "run created".
#[derive(Debug, Default)]
pub struct TriggerMonitor {
    triggered: DashSet<PipelineName>,
}

impl TriggerMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the pipeline as being triggered. Returns `false` if it already was.
    pub fn mark_already_triggered(&self, name: &PipelineName) -> bool {
        let marked = self.triggered.insert(name.clone());
        debug!(pipeline = %name, marked, "Trigger mark requested");
        marked
    }

    pub fn mark_can_be_triggered(&self, name: &PipelineName) {
        self.triggered.remove(name);
    }

    pub fn is_already_triggered(&self, name: &PipelineName) -> bool {
        self.triggered.contains(name)
    }

    /// Mark the pipeline as being triggered until the returned claim is dropped.
    ///
    /// Returns `None` if someone else holds the mark.
    pub fn claim(&self, name: &PipelineName) -> Option<TriggerClaim<'_>> {
        self.mark_already_triggered(name).then(|| TriggerClaim {
            monitor: self,
            name: name.clone(),
        })
    }
}

/// Exclusive right to trigger one pipeline, released on drop.
#[derive(Debug)]
pub struct TriggerClaim<'a> {
    monitor: &'a TriggerMonitor,
    name: PipelineName,
}

impl TriggerClaim<'_> {
    pub fn pipeline_name(&self) -> &PipelineName {
        &self.name
    }
}

impl Drop for TriggerClaim<'_> {
    fn drop(&mut self) {
        self.monitor.mark_can_be_triggered(&self.name);
        debug!(pipeline = %self.name, "Trigger mark released");
    }
}
