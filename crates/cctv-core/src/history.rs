//! Bounded in-memory detection history.
//!
//! The store owns every [`DetectionRecord`] and the annotated image behind
//! it: evicting a record deletes its file. It is not synchronized; callers
//! share it behind a mutex.

use crate::retention::remove_quietly;
use crate::types::DetectionRecord;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

pub struct HistoryStore {
    records: VecDeque<Arc<DetectionRecord>>,
    last: Option<Arc<DetectionRecord>>,
    capacity: usize,
    output_dir: PathBuf,
}

impl HistoryStore {
    pub fn new(output_dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            last: None,
            capacity,
            output_dir: output_dir.into(),
        }
    }

    /// Append a record, evicting (and deleting the images of) the oldest
    /// records while over capacity. The record also becomes [`latest`](Self::latest).
    pub fn append(&mut self, record: DetectionRecord) -> Arc<DetectionRecord> {
        let record = Arc::new(record);
        self.records.push_back(Arc::clone(&record));

        while self.records.len() > self.capacity {
            let Some(evicted) = self.records.pop_front() else {
                break;
            };
            let path = self.output_dir.join(evicted.file_name());
            if remove_quietly(&path) {
                tracing::info!(path = %path.display(), "deleted image from trimmed history");
            }
        }

        self.last = Some(Arc::clone(&record));
        record
    }

    /// Most recently appended record, even if it has since been evicted.
    pub fn latest(&self) -> Option<Arc<DetectionRecord>> {
        self.last.clone()
    }

    /// Up to `limit` records, newest timestamp first; equal timestamps keep insertion order.
    pub fn list(&self, limit: usize) -> Vec<DetectionRecord> {
        let mut sorted: Vec<&Arc<DetectionRecord>> = self.records.iter().collect();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sorted.into_iter().take(limit).map(|r| (**r).clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record whose file is in `names`. Returns how many were dropped.
    pub fn forget(&mut self, names: &HashSet<String>) -> usize {
        if names.is_empty() {
            return 0;
        }
        let before = self.records.len();
        self.records.retain(|r| !names.contains(r.file_name()));
        if self.last.as_ref().is_some_and(|r| names.contains(r.file_name())) {
            self.last = None;
        }
        before - self.records.len()
    }

    /// File names (inside the output directory) referenced by live records.
    pub fn referenced_files(&self) -> HashSet<String> {
        self.records
            .iter()
            .map(|r| r.file_name().to_string())
            .collect()
    }
}
