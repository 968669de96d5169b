use async_trait::async_trait;
use gatehouse_core::health::{HealthStateKind, HealthStateType, OperationResult};
use gatehouse_core::ports::{Notification, NotificationSender, NotificationSeverity};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use super::{SchedulingChecker, collaborator_failed};
use crate::disk::DiskSpaceProbe;

const MEGABYTE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskSpaceSeverity {
    /// Scheduling stops below the threshold.
    Full,
    /// Scheduling continues with a warning.
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskTarget {
    Artifacts,
    Database,
}

impl DiskTarget {
    fn label(&self) -> &'static str {
        match self {
            DiskTarget::Artifacts => "artifacts",
            DiskTarget::Database => "database",
        }
    }
}

/// Edge-triggered free-space gate.
///
/// Sends one notification when space first drops below the threshold and
/// stays quiet until it has recovered and dropped again. A missing target
/// directory counts as enough space.
pub struct DiskSpaceChecker {
    target: DiskTarget,
    severity: DiskSpaceSeverity,
    threshold_bytes: u64,
    probe: Arc<DiskSpaceProbe>,
    notifier: Arc<dyn NotificationSender>,
    in_error: AtomicBool,
    suppressed_by: Option<Arc<DiskSpaceChecker>>,
}

impl DiskSpaceChecker {
    pub fn full(
        target: DiskTarget,
        threshold_bytes: u64,
        probe: Arc<DiskSpaceProbe>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self::new(target, DiskSpaceSeverity::Full, threshold_bytes, probe, notifier)
    }

    pub fn warning(
        target: DiskTarget,
        threshold_bytes: u64,
        probe: Arc<DiskSpaceProbe>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self::new(target, DiskSpaceSeverity::Warning, threshold_bytes, probe, notifier)
    }

    fn new(
        target: DiskTarget,
        severity: DiskSpaceSeverity,
        threshold_bytes: u64,
        probe: Arc<DiskSpaceProbe>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            target,
            severity,
            threshold_bytes,
            probe,
            notifier,
            in_error: AtomicBool::new(false),
            suppressed_by: None,
        }
    }

    /// Stay silent while `full` reports the same disk as full.
    pub fn suppressed_by(mut self, full: Arc<DiskSpaceChecker>) -> Self {
        self.suppressed_by = Some(full);
        self
    }

    pub fn is_in_error(&self) -> bool {
        self.in_error.load(Ordering::SeqCst)
    }

    pub fn severity(&self) -> DiskSpaceSeverity {
        self.severity
    }

    pub fn state_type(&self) -> HealthStateType {
        HealthStateType::global(match (self.target, self.severity) {
            (DiskTarget::Artifacts, DiskSpaceSeverity::Full) => HealthStateKind::ArtifactsDiskFull,
            (DiskTarget::Artifacts, DiskSpaceSeverity::Warning) => {
                HealthStateKind::ArtifactsDiskWarning
            }
            (DiskTarget::Database, DiskSpaceSeverity::Full) => HealthStateKind::DatabaseDiskFull,
            (DiskTarget::Database, DiskSpaceSeverity::Warning) => {
                HealthStateKind::DatabaseDiskWarning
            }
        })
    }

    fn recover(&self) {
        if self.in_error.swap(false, Ordering::SeqCst) {
            info!(disk = self.target.label(), "Disk space recovered");
        }
    }

    fn describe(&self, available: u64) -> (String, String) {
        let limit_mb = self.threshold_bytes / MEGABYTE;
        let available_mb = available / MEGABYTE;
        match self.severity {
            DiskSpaceSeverity::Full => (
                format!(
                    "Server has run out of {} disk space. Scheduling has been stopped",
                    self.target.label()
                ),
                format!(
                    "Only {}M of {} disk space is available, less than the {}M limit. \
                     Scheduling resumes once more than {}M is available.",
                    available_mb,
                    self.target.label(),
                    limit_mb,
                    limit_mb
                ),
            ),
            DiskSpaceSeverity::Warning => (
                format!("Server's {} disk is running low on space", self.target.label()),
                format!(
                    "Only {}M of {} disk space is available, less than the {}M warning limit.",
                    available_mb,
                    self.target.label(),
                    limit_mb
                ),
            ),
        }
    }

    async fn notify(&self, title: &str, body: &str) {
        let notification = Notification {
            title: title.to_string(),
            body: body.to_string(),
            severity: match self.severity {
                DiskSpaceSeverity::Full => NotificationSeverity::Critical,
                DiskSpaceSeverity::Warning => NotificationSeverity::Warning,
            },
        };
        if let Err(e) = self.notifier.send(&notification).await {
            error!(disk = self.target.label(), error = %e, "Failed to send disk space notification");
        }
    }
}

#[async_trait]
impl SchedulingChecker for DiskSpaceChecker {
    async fn check(&self, result: &mut dyn OperationResult) {
        let state_type = self.state_type();

        if self.suppressed_by.as_ref().is_some_and(|full| full.is_in_error()) {
            self.in_error.store(false, Ordering::SeqCst);
            result.success(state_type);
            return;
        }

        let sample = match self.probe.sample() {
            Ok(sample) => sample,
            Err(e) => {
                collaborator_failed(result, "disk space", &e, state_type);
                return;
            }
        };
        let Some(available) = sample.available_bytes else {
            result.success(state_type);
            return;
        };

        if available >= self.threshold_bytes {
            self.recover();
            result.success(state_type);
            return;
        }

        let (message, description) = self.describe(available);
        if !self.in_error.swap(true, Ordering::SeqCst) {
            warn!(
                disk = self.target.label(),
                available_bytes = available,
                threshold_bytes = self.threshold_bytes,
                "Disk space below threshold"
            );
            self.notify(&message, &description).await;
        }

        match self.severity {
            DiskSpaceSeverity::Full => result.insufficient_storage(&message, &description, state_type),
            DiskSpaceSeverity::Warning => result.warning(&message, &description, state_type),
        }
    }
}
