//! Recording doubles.

use async_trait::async_trait;
use gatehouse_core::ports::{DiskSpaceReader, Notification, NotificationSender};
use gatehouse_core::{Error, Result};
use gatehouse_scheduler::{LockStatusChange, PipelineLockListener};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

pub const MEGABYTE: u64 = 1024 * 1024;

/// Remembers every committed lock transition.
#[derive(Debug, Default)]
pub struct RecordingLockListener {
    changes: Mutex<Vec<LockStatusChange>>,
}

impl RecordingLockListener {
    pub fn changes(&self) -> Vec<LockStatusChange> {
        self.changes.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.changes.lock().unwrap().len()
    }
}

impl PipelineLockListener for RecordingLockListener {
    fn lock_status_changed(&self, change: &LockStatusChange) -> Result<()> {
        self.changes.lock().unwrap().push(change.clone());
        Ok(())
    }
}

/// Collects notifications; can be told to fail the next delivery.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_next: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Notification("mail server unreachable".to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// A disk whose free space the test sets.
#[derive(Debug)]
pub struct FakeDiskReader {
    available: AtomicU64,
    exists: AtomicBool,
    reads: AtomicUsize,
}

impl FakeDiskReader {
    pub fn with_megabytes(megabytes: u64) -> Self {
        Self {
            available: AtomicU64::new(megabytes * MEGABYTE),
            exists: AtomicBool::new(true),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn set_megabytes(&self, megabytes: u64) {
        self.available.store(megabytes * MEGABYTE, Ordering::SeqCst);
        self.exists.store(true, Ordering::SeqCst);
    }

    /// Make the target directory disappear.
    pub fn remove(&self) {
        self.exists.store(false, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DiskSpaceReader for FakeDiskReader {
    fn available_space(&self, _path: &Path) -> Result<Option<u64>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.exists.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.available.load(Ordering::SeqCst)))
    }
}
