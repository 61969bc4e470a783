use crate::error::CrawlError;
use crate::links::{CollectedLink, LinkSet};
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted crawl progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlState {
    /// Every link collected so far, sorted
    #[serde(default)]
    pub collected_urls: Vec<CollectedLink>,

    /// Number of feed pages fully processed
    #[serde(default)]
    pub pages_processed: u64,

    /// When this checkpoint was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CrawlState {
    /// Snapshot the controller's in-memory progress
    pub fn snapshot(collected: &LinkSet, pages_processed: u64) -> Self {
        Self {
            collected_urls: collected.sorted(),
            pages_processed,
            updated_at: Some(Utc::now()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.collected_urls.is_empty() && self.pages_processed == 0
    }
}

/// JSON file holding the [`CrawlState`] between runs
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored state.
    ///
    /// A missing file means a fresh crawl. An unreadable or malformed file is
    /// logged and also treated as a fresh crawl.
    pub fn load(&self) -> CrawlState {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ::log::debug!("No checkpoint at {}, starting fresh", self.path.display());
                return CrawlState::default();
            }
            Err(e) => {
                ::log::warn!(
                    "Unable to read checkpoint {}: {}. Starting a fresh crawl",
                    self.path.display(),
                    e
                );
                return CrawlState::default();
            }
        };

        match serde_json::from_str::<CrawlState>(&contents) {
            Ok(state) => {
                if !state.is_empty() {
                    ::log::info!(
                        "Resuming with {} links collected across {} processed page(s)",
                        state.collected_urls.len(),
                        state.pages_processed
                    );
                }
                state
            }
            Err(e) => {
                ::log::warn!(
                    "Ignoring corrupt checkpoint {}: {}. Starting a fresh crawl",
                    self.path.display(),
                    e
                );
                CrawlState::default()
            }
        }
    }

    /// Atomically replace the stored state
    pub fn save(&self, state: &CrawlState) -> Result<(), CrawlError> {
        write_atomic(&self.path, |w| {
            serde_json::to_writer_pretty(w, state)?;
            Ok(())
        })?;
        ::log::trace!(
            "Checkpoint written: {} links, {} pages",
            state.collected_urls.len(),
            state.pages_processed
        );
        Ok(())
    }

    /// Remove the stored state so the next run starts a new crawl
    pub fn clear(&self) -> Result<(), CrawlError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                ::log::debug!("Checkpoint {} cleared", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CrawlError::persistence(&self.path, e)),
        }
    }
}
