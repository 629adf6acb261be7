//! File watching for manifest hot-reload.
//!
//! The watcher observes the directory holding each watched file, so editors
//! and deploy tools that replace a file by rename are seen as well as
//! in-place writes. Events for other files in the directory are dropped.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use warden_config::FileWatcher;
//!
//! # async fn example() -> Result<(), warden_config::ConfigError> {
//! let mut watcher = FileWatcher::builder()
//!     .with_debounce(Duration::from_millis(250))
//!     .watch_file("manifest.yaml")?
//!     .build()?;
//!
//! while let Some(event) = watcher.next().await {
//!     println!("manifest changed: {:?}", event.path);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{ConfigError, ConfigResult};

/// A coalesced change to a watched file.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    /// Path to the changed file.
    pub path: PathBuf,
    /// Kind of the last change seen.
    pub kind: FileChangeKind,
    /// When the change was detected.
    pub timestamp: Instant,
}

/// Kind of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// File was created or moved into place.
    Created,
    /// File content or metadata changed.
    Modified,
    /// File was removed.
    Deleted,
}

impl FileChangeKind {
    fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Builder for a [`FileWatcher`].
#[derive(Debug)]
pub struct FileWatcherBuilder {
    files: Vec<PathBuf>,
    debounce: Duration,
}

impl Default for FileWatcherBuilder {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            debounce: Duration::from_millis(500),
        }
    }
}

impl FileWatcherBuilder {
    /// Set the debounce window.
    ///
    /// Changes arriving within this window after the first one are merged
    /// into a single event. Default is 500ms.
    #[must_use]
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }

    /// Watch a file. The file must exist.
    pub fn watch_file(mut self, path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::file_not_found(path));
        }
        self.files.push(path.canonicalize()?);
        Ok(self)
    }

    /// Start watching.
    pub fn build(self) -> ConfigResult<FileWatcher> {
        if self.files.is_empty() {
            return Err(ConfigError::watcher("no files configured for file watcher"));
        }

        let (tx, rx) = mpsc::channel(100);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    // The receiver is gone once the watcher is dropped.
                    let _ = tx.blocking_send(event);
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            }
        })
        .map_err(|e| ConfigError::watcher(format!("failed to create file watcher: {e}")))?;

        let dirs: HashSet<PathBuf> = self
            .files
            .iter()
            .filter_map(|file| file.parent().map(Path::to_path_buf))
            .collect();
        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    ConfigError::watcher(format!("failed to watch {}: {e}", dir.display()))
                })?;
        }

        Ok(FileWatcher {
            _watcher: watcher,
            rx,
            files: self.files.into_iter().collect(),
            debounce: self.debounce,
        })
    }
}

/// Watches files and reports debounced changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Event>,
    files: HashSet<PathBuf>,
    debounce: Duration,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("files", &self.files)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Create a watcher builder.
    #[must_use]
    pub fn builder() -> FileWatcherBuilder {
        FileWatcherBuilder::default()
    }

    /// Wait for the next change to a watched file.
    ///
    /// After the first relevant event, waits for the debounce window and
    /// folds every further event for the same file into one. Returns `None`
    /// once the underlying watcher stops.
    pub async fn next(&mut self) -> Option<FileChangeEvent> {
        loop {
            let event = self.rx.recv().await?;
            let Some(mut change) = self.relevant(&event) else {
                continue;
            };

            tokio::time::sleep(self.debounce).await;
            while let Ok(event) = self.rx.try_recv() {
                if let Some(later) = self.relevant(&event) {
                    if later.path == change.path {
                        change.kind = later.kind;
                    }
                }
            }
            return Some(change);
        }
    }

    fn relevant(&self, event: &Event) -> Option<FileChangeEvent> {
        let kind = FileChangeKind::from_event_kind(&event.kind)?;
        let path = event
            .paths
            .iter()
            .find(|path| self.files.contains(path.as_path()))?
            .clone();
        Some(FileChangeEvent {
            path,
            kind,
            timestamp: Instant::now(),
        })
    }
}
