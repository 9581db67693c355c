//! Disk garbage collection for the output directory.
//!
//! A sweep deletes every file that no live history record references, and
//! every file older than the retention window regardless of references.
//! Records whose file expired are dropped from the history with it.

use crate::history::HistoryStore;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
}

/// Reconciles the output directory against a [`HistoryStore`].
///
/// Only one sweep runs at a time; a sweep requested while another is in
/// flight is skipped.
pub struct RetentionSweeper {
    output_dir: PathBuf,
    retention: Duration,
    running: AtomicBool,
}

/// Clears the in-flight flag when dropped.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RetentionSweeper {
    pub fn new(output_dir: impl Into<PathBuf>, retention_days: u64) -> Self {
        Self::with_retention(output_dir, Duration::from_secs(retention_days * SECS_PER_DAY))
    }

    pub fn with_retention(output_dir: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            retention,
            running: AtomicBool::new(false),
        }
    }

    fn begin(&self) -> Option<SweepGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SweepGuard(&self.running))
    }

    /// Sweep now. Returns `None` if another sweep is already running.
    pub fn sweep(&self, history: &mut HistoryStore) -> Option<SweepReport> {
        self.sweep_at(history, SystemTime::now())
    }

    /// Sweep as if the current time were `now`.
    pub fn sweep_at(&self, history: &mut HistoryStore, now: SystemTime) -> Option<SweepReport> {
        let Some(_guard) = self.begin() else {
            tracing::debug!("sweep already in progress; skipping");
            return None;
        };

        let entries = match std::fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(dir = %self.output_dir.display(), error = %e, "cannot scan output directory");
                return Some(SweepReport::default());
            }
        };

        let referenced = history.referenced_files();
        let mut expired = HashSet::new();
        let mut report = SweepReport::default();

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            report.scanned += 1;

            let name = entry.file_name().to_string_lossy().into_owned();
            let age = meta
                .modified()
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .unwrap_or_default();

            let is_referenced = referenced.contains(&name);
            if !is_referenced || age > self.retention {
                if remove_quietly(&path) {
                    tracing::info!(path = %path.display(), "deleted image");
                    report.deleted += 1;
                }
                if is_referenced {
                    expired.insert(name);
                }
            }
        }

        let forgotten = history.forget(&expired);
        if forgotten > 0 {
            tracing::info!(records = forgotten, "dropped expired records from history");
        }

        tracing::info!(
            scanned = report.scanned,
            deleted = report.deleted,
            "cleanup completed"
        );
        Some(report)
    }
}

/// Best-effort delete. A file that is already gone counts as nothing to do;
/// other failures are logged. Returns true if this call removed the file.
pub(crate) fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to delete image");
            false
        }
    }
}
