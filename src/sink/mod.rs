//! Record sinks.
//!
//! The engine guarantees identifier uniqueness within a run and hands the
//! full record set to a sink at the end. Conflict resolution against
//! pre-existing storage (upsert keyed by listing id) is the sink
//! implementor's concern, not the engine's.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::crawl::ListingRecord;

/// Destination for crawled records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persists the given records.
    async fn write(&self, records: &[ListingRecord]) -> anyhow::Result<()>;
}

/// Writes records as a pretty-printed JSON array.
///
/// The write is atomic the same way the checkpoint's is: temp file, fsync,
/// rename. Re-running the crawler replaces the file wholesale, which keeps
/// the export idempotent per listing id.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    /// Creates a sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The output location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonFileSink {
    async fn write(&self, records: &[ListingRecord]) -> anyhow::Result<()> {
        let payload = serde_json::to_vec_pretty(records)?;

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp_path, &self.path)?;

        info!(
            path = %self.path.display(),
            records = records.len(),
            "records written"
        );
        Ok(())
    }
}
