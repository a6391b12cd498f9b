//! Commit index persistence
//!
//! The commit index is the highest feed position recorded as processed. It is
//! stored as decimal text in `<data_dir>/commit_index` and replaced atomically
//! (write temp file, fsync, rename).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::{Result, StreamError};

/// File name of the persisted commit index
pub const COMMIT_INDEX_FILE: &str = "commit_index";

const TMP_SUFFIX: &str = ".tmp";

/// Durable storage for the commit index
#[derive(Debug, Clone)]
pub struct CommitIndexStore {
    dir: PathBuf,
    path: PathBuf,
    tmp_path: PathBuf,
}

impl CommitIndexStore {
    /// Store rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let dir = data_dir.into();
        let path = dir.join(COMMIT_INDEX_FILE);
        let tmp_path = dir.join(format!("{COMMIT_INDEX_FILE}{TMP_SUFFIX}"));
        Self {
            dir,
            path,
            tmp_path,
        }
    }

    /// Path of the commit index file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted index
    ///
    /// Returns `Ok(None)` when no index has been saved yet.
    ///
    /// # Errors
    /// The file exists but cannot be read or does not hold a decimal index.
    pub async fn load(&self) -> Result<Option<u64>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StreamError::checkpoint(&self.path, e.to_string())),
        };

        let trimmed = content.trim();
        trimmed.parse::<u64>().map(Some).map_err(|e| {
            StreamError::checkpoint(
                &self.path,
                format!("corrupt commit index '{trimmed}': {e}"),
            )
        })
    }

    /// Atomically replace the persisted index
    pub async fn save(&self, index: u64) -> Result<()> {
        let to_err = |e: std::io::Error| StreamError::checkpoint(&self.path, e.to_string());

        tokio::fs::create_dir_all(&self.dir).await.map_err(to_err)?;

        let mut file = tokio::fs::File::create(&self.tmp_path)
            .await
            .map_err(to_err)?;
        file.write_all(format!("{index}\n").as_bytes())
            .await
            .map_err(to_err)?;
        file.sync_all().await.map_err(to_err)?;
        drop(file);

        tokio::fs::rename(&self.tmp_path, &self.path)
            .await
            .map_err(to_err)?;
        Ok(())
    }
}

/// Throttled writer in front of a [`CommitIndexStore`]
///
/// `advance` keeps the in-memory index current and writes it out at most once
/// per interval. `flush` writes whatever is pending.
#[derive(Debug)]
pub struct CommitTracker {
    store: CommitIndexStore,
    interval: Duration,
    current: Option<u64>,
    persisted: Option<u64>,
    last_save: Instant,
}

impl CommitTracker {
    /// Create a tracker; call [`load`](Self::load) before use
    pub fn new(store: CommitIndexStore, interval: Duration) -> Self {
        Self {
            store,
            interval,
            current: None,
            persisted: None,
            last_save: Instant::now(),
        }
    }

    /// Load the persisted index into memory
    #[instrument(name = "commit_tracker_load", skip(self), fields(path = %self.store.path().display()))]
    pub async fn load(&mut self) -> Result<Option<u64>> {
        let loaded = self.store.load().await?;
        self.current = loaded;
        self.persisted = loaded;
        self.last_save = Instant::now();
        if let Some(index) = loaded {
            gauge!("nes_commit_index").set(index as f64);
        }
        debug!(index = ?loaded, "commit index loaded");
        Ok(loaded)
    }

    /// Highest index seen so far
    pub fn current(&self) -> Option<u64> {
        self.current
    }

    /// Last index successfully written to disk
    pub fn persisted(&self) -> Option<u64> {
        self.persisted
    }

    /// Whether the in-memory index is ahead of the persisted one
    pub fn is_dirty(&self) -> bool {
        self.current != self.persisted
    }

    /// Record `index` as processed, saving if the interval has elapsed
    pub async fn advance(&mut self, index: u64) {
        let next = self.current.map_or(index, |current| current.max(index));
        self.current = Some(next);

        if self.is_dirty() && self.last_save.elapsed() >= self.interval {
            // Failures are already logged and counted
            let _ = self.save_current().await;
        }
    }

    /// Save the in-memory index if it is ahead of the persisted one
    pub async fn flush(&mut self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        self.save_current().await
    }

    async fn save_current(&mut self) -> Result<()> {
        let Some(index) = self.current else {
            return Ok(());
        };

        self.last_save = Instant::now();
        match self.store.save(index).await {
            Ok(()) => {
                self.persisted = Some(index);
                counter!("nes_commit_index_saves_total", "status" => "success").increment(1);
                gauge!("nes_commit_index").set(index as f64);
                debug!(index, "commit index saved");
                Ok(())
            }
            Err(e) => {
                counter!("nes_commit_index_saves_total", "status" => "failure").increment(1);
                warn!(index, error = %e, "failed to save commit index");
                Err(e)
            }
        }
    }
}
