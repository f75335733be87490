//! Data Source Watcher
//!
//! Bridges filesystem notifications for the corpus directory onto a Tokio
//! channel. Delivery order is whatever the OS reports; consumers should treat
//! every notification as "something changed".

use notify::event::EventKind;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Kind of filesystem change observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Other,
}

impl ChangeKind {
    /// Map a notify event kind; reads and opens are not changes.
    fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            EventKind::Remove(_) => Some(ChangeKind::Removed),
            EventKind::Any | EventKind::Other => Some(ChangeKind::Other),
            EventKind::Access(_) => None,
        }
    }
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: Option<PathBuf>,
    pub kind: ChangeKind,
}

/// Errors that can occur while setting up a watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("watch path does not exist: {0:?}")]
    MissingPath(PathBuf),
    #[error("failed to watch {path:?}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Active watch on a directory. Dropping it stops notifications.
pub struct DataWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DataWatcher {
    /// Start watching `path` recursively.
    ///
    /// Returns the watcher and a receiver of change notifications.
    pub fn start(path: &Path) -> Result<(Self, mpsc::UnboundedReceiver<FileChange>), WatchError> {
        if !path.exists() {
            return Err(WatchError::MissingPath(path.to_path_buf()));
        }

        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let Some(kind) = ChangeKind::from_event_kind(&event.kind) else {
                        return;
                    };
                    let change = FileChange {
                        path: event.paths.into_iter().next(),
                        kind,
                    };
                    tracing::debug!(?change, "data source change detected");
                    // Receiver gone means the manager was torn down.
                    let _ = tx.send(change);
                }
                Err(e) => tracing::error!("watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|source| WatchError::Notify {
            path: path.to_path_buf(),
            source,
        })?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Notify {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(path = ?path, "data watcher started");
        Ok((
            Self {
                path: path.to_path_buf(),
                _watcher: watcher,
            },
            rx,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataWatcher {
    fn drop(&mut self) {
        tracing::debug!(path = ?self.path, "data watcher stopped");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn test_change_kind_mapping() {
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Modify(ModifyKind::Any)),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Removed)
        );
        assert_eq!(
            ChangeKind::from_event_kind(&EventKind::Access(AccessKind::Any)),
            None
        );
    }

    #[test]
    fn test_watch_missing_path() {
        let result = DataWatcher::start(Path::new("/nonexistent/design-data"));
        assert!(matches!(result, Err(WatchError::MissingPath(_))));
    }

    #[tokio::test]
    async fn test_watch_detects_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, mut rx) = DataWatcher::start(dir.path()).unwrap();
        assert_eq!(watcher.path(), dir.path());

        std::fs::write(dir.path().join("tokens.json"), "[]").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no change notification")
            .expect("channel closed");
        assert_ne!(change.kind, ChangeKind::Removed);
    }

    #[test]
    fn test_watch_error_display() {
        let err = WatchError::MissingPath(PathBuf::from("/data"));
        assert!(err.to_string().contains("/data"));
    }
}
