//! Durable crawl progress.
//!
//! `CrawlState` is the single unit of checkpointing: which pages are done,
//! which listings are done, what is still pending, and the records gathered
//! so far. `CheckpointStore` persists it as one JSON document with
//! atomic-replace semantics — the write goes to a sibling temp file that is
//! fsynced and renamed over the target, so a process death mid-write leaves
//! the previous checkpoint intact.
//!
//! Loading is deliberately forgiving: a missing or unparseable checkpoint
//! yields an empty state and a warning, never an error. A damaged file must
//! cost at worst a re-crawl, not a crawler that refuses to start. Unknown
//! JSON fields are ignored and absent fields default, so a checkpoint
//! written by one build stays readable after a redeploy that added fields.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crawl::{ListingRecord, WorkItem};

/// Current checkpoint format version. Bump only for additive changes.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Errors from checkpoint persistence.
///
/// Only writes can fail; a failed write is fatal to the run because
/// continuing without durability would silently violate the resume
/// guarantee.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure while writing or replacing the checkpoint.
    #[error("checkpoint IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// State could not be serialized.
    #[error("checkpoint serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Snapshot of crawl progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlState {
    /// Format version of the writing build.
    #[serde(default)]
    pub version: u32,

    /// Index pages whose discovery has completed.
    #[serde(default)]
    pub completed_pages: BTreeSet<u32>,

    /// Listing ids that have resolved to records.
    #[serde(default)]
    pub completed_ids: BTreeSet<String>,

    /// Work items discovered but not yet completed.
    #[serde(default)]
    pub pending: Vec<WorkItem>,

    /// Records gathered so far.
    #[serde(default)]
    pub records: Vec<ListingRecord>,

    /// When this snapshot was written.
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl CrawlState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            ..Self::default()
        }
    }

    /// Whether discovery already completed for `page`.
    #[must_use]
    pub fn is_page_completed(&self, page: u32) -> bool {
        self.completed_pages.contains(&page)
    }

    /// Marks a page's discovery as completed.
    pub fn mark_page_completed(&mut self, page: u32) {
        self.completed_pages.insert(page);
    }

    /// Merges freshly discovered items into the pending queue.
    ///
    /// Items whose id is already completed, or already queued, are dropped.
    /// Returns how many items were actually added.
    pub fn merge_discovered(&mut self, items: Vec<WorkItem>) -> usize {
        let mut added = 0;
        for item in items {
            if self.completed_ids.contains(&item.listing_id) {
                continue;
            }
            if self
                .pending
                .iter()
                .any(|pending| pending.listing_id == item.listing_id)
            {
                continue;
            }
            self.pending.push(item);
            added += 1;
        }
        added
    }

    /// Records a completed item: its id moves from pending to completed and
    /// the record is appended.
    pub fn complete_item(&mut self, record: ListingRecord) {
        self.pending
            .retain(|item| item.listing_id != record.listing_id);
        self.completed_ids.insert(record.listing_id.clone());
        self.records.push(record);
    }

    /// The pending queue filtered against completed ids.
    ///
    /// A checkpoint written mid-batch can momentarily hold an id in both
    /// collections on disk; draining always starts from this filtered view
    /// so no completed listing is fetched twice.
    #[must_use]
    pub fn draft_queue(&self) -> Vec<WorkItem> {
        self.pending
            .iter()
            .filter(|item| !self.completed_ids.contains(&item.listing_id))
            .cloned()
            .collect()
    }
}

/// File-backed checkpoint persistence with atomic replace.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Creates a store writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The checkpoint file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a snapshot durably.
    ///
    /// The document is serialized, written to `<path>.tmp`, fsynced, and
    /// renamed over the target. The previous checkpoint stays loadable at
    /// every instant in between.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] when serialization or any filesystem
    /// step fails.
    pub fn save(&self, state: &CrawlState) -> Result<(), CheckpointError> {
        let mut snapshot = state.clone();
        snapshot.version = CHECKPOINT_VERSION;
        snapshot.saved_at = Some(Utc::now());

        let payload = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.tmp_path();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| CheckpointError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut file = fs::File::create(&tmp_path).map_err(|source| CheckpointError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        file.write_all(&payload).map_err(|source| CheckpointError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        file.sync_all().map_err(|source| CheckpointError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            path = %self.path.display(),
            completed_pages = snapshot.completed_pages.len(),
            completed_ids = snapshot.completed_ids.len(),
            pending = snapshot.pending.len(),
            records = snapshot.records.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Loads the last snapshot, or `None` when there is nothing usable.
    ///
    /// A corrupt file is logged and treated as absent — recovery must never
    /// be blocked by a damaged checkpoint.
    #[must_use]
    pub fn load(&self) -> Option<CrawlState> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint unreadable, starting fresh");
                return None;
            }
        };

        match serde_json::from_slice::<CrawlState>(&bytes) {
            Ok(state) => {
                info!(
                    path = %self.path.display(),
                    completed_pages = state.completed_pages.len(),
                    completed_ids = state.completed_ids.len(),
                    pending = state.pending.len(),
                    records = state.records.len(),
                    "checkpoint loaded"
                );
                Some(state)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint corrupt, starting fresh");
                None
            }
        }
    }

    /// Deletes the checkpoint. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] for filesystem failures other than the
    /// file not existing.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}
