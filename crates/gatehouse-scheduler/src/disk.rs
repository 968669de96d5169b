//! Cached free-space measurement of a directory.
//!
//! Many trigger requests consult the disk checks; the probe serves them from
//! one cached sample and re-reads the filesystem at most once per refresh
//! interval.

use chrono::{DateTime, Utc};
use gatehouse_core::clock::Clock;
use gatehouse_core::ports::DiskSpaceReader;
use gatehouse_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpaceSample {
    /// Bytes available to unprivileged users; `None` when the target is missing.
    pub available_bytes: Option<u64>,
    pub target_exists: bool,
    pub sampled_at: DateTime<Utc>,
}

pub struct DiskSpaceProbe {
    target: PathBuf,
    reader: Arc<dyn DiskSpaceReader>,
    clock: Arc<dyn Clock>,
    refresh_interval: chrono::Duration,
    sample: RwLock<Option<DiskSpaceSample>>,
    refresh: Mutex<()>,
}

impl DiskSpaceProbe {
    pub fn new(
        target: impl Into<PathBuf>,
        reader: Arc<dyn DiskSpaceReader>,
        clock: Arc<dyn Clock>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            reader,
            clock,
            refresh_interval: chrono::Duration::from_std(refresh_interval)
                .unwrap_or(chrono::Duration::MAX),
            sample: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Current sample, re-reading the filesystem if the cached one is older
    /// than the refresh interval.
    pub fn sample(&self) -> Result<DiskSpaceSample> {
        let now = self.clock.now();
        if let Some(sample) = self.fresh_sample(now) {
            return Ok(sample);
        }

        let _refresh = self
            .refresh
            .lock()
            .map_err(|_| Error::Internal("disk refresh lock poisoned".to_string()))?;
        if let Some(sample) = self.fresh_sample(now) {
            return Ok(sample);
        }

        let available_bytes = self.reader.available_space(&self.target)?;
        let sample = DiskSpaceSample {
            available_bytes,
            target_exists: available_bytes.is_some(),
            sampled_at: now,
        };
        debug!(
            path = %self.target.display(),
            available_bytes = ?available_bytes,
            "Disk space sample refreshed"
        );
        *self
            .sample
            .write()
            .map_err(|_| Error::Internal("disk sample lock poisoned".to_string()))? = Some(sample);
        Ok(sample)
    }

    fn fresh_sample(&self, now: DateTime<Utc>) -> Option<DiskSpaceSample> {
        let cached = (*self.sample.read().ok()?)?;
        (now - cached.sampled_at <= self.refresh_interval).then_some(cached)
    }
}

/// Reads free space with `statvfs(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsReader;

impl DiskSpaceReader for StatvfsReader {
    #[cfg(target_family = "unix")]
    #[allow(clippy::unnecessary_cast)]
    fn available_space(&self, path: &Path) -> Result<Option<u64>> {
        use std::os::unix::ffi::OsStrExt;

        let path_cstr = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        // SAFETY: statvfs is a plain C struct of integers; all-zero is a valid value.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: path_cstr is a valid NUL-terminated string and stat is a valid
        // out pointer for the duration of the call.
        let rc = unsafe { libc::statvfs(path_cstr.as_ptr(), &mut stat) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::NotFound {
                return Ok(None);
            }
            return Err(Error::Io(err));
        }

        Ok(Some((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64)))
    }

    #[cfg(not(target_family = "unix"))]
    fn available_space(&self, path: &Path) -> Result<Option<u64>> {
        if !path.exists() {
            return Ok(None);
        }
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "disk space check not supported on this platform",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::clock::ManualClock;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    struct CountingReader {
        available: AtomicU64,
        reads: AtomicUsize,
    }

    impl DiskSpaceReader for CountingReader {
        fn available_space(&self, _path: &Path) -> Result<Option<u64>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.available.load(Ordering::SeqCst)))
        }
    }

    fn probe(reader: Arc<CountingReader>, clock: Arc<ManualClock>) -> DiskSpaceProbe {
        DiskSpaceProbe::new("/data", reader, clock, Duration::from_millis(5000))
    }

    #[test]
    fn test_sample_is_cached_within_interval() {
        let reader = Arc::new(CountingReader {
            available: AtomicU64::new(10),
            reads: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::default());
        let probe = probe(reader.clone(), clock.clone());

        assert_eq!(probe.sample().unwrap().available_bytes, Some(10));
        reader.available.store(20, Ordering::SeqCst);
        clock.advance(chrono::Duration::milliseconds(5000));
        assert_eq!(probe.sample().unwrap().available_bytes, Some(10));
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::milliseconds(1));
        assert_eq!(probe.sample().unwrap().available_bytes, Some(20));
        assert_eq!(reader.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_callers_refresh_once() {
        let reader = Arc::new(CountingReader {
            available: AtomicU64::new(10),
            reads: AtomicUsize::new(0),
        });
        let probe = Arc::new(probe(reader.clone(), Arc::new(ManualClock::default())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let probe = probe.clone();
                std::thread::spawn(move || probe.sample().unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_statvfs_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-here");
        assert_eq!(StatvfsReader.available_space(&missing).unwrap(), None);
        assert!(StatvfsReader.available_space(dir.path()).unwrap().is_some());
    }
}
