//! File-system watching.
//!
//! Wraps a recursive `notify` watcher and translates its events into the
//! engine's event vocabulary. Events are delivered over a channel; the
//! caller (the binary's watch loop) feeds them into
//! [`crate::WorkspaceEngine::handle_event`], which serializes them behind
//! the workspace mutex.

use std::path::Path;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;

use notify::Config;
use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher as NotifyWatcher;
use notify::event::CreateKind;
use notify::event::RemoveKind;

use crate::error::WorkspaceError;

/// A file-system change in engine vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    Created(PathBuf),
    CreatedDirectory(PathBuf),
    Removed(PathBuf),
    RemovedDirectory(PathBuf),
    Modified(PathBuf),
}

/// Watches a workspace tree for changes.
pub struct WorkspaceWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<WorkspaceEvent>,
}

impl WorkspaceWatcher {
    /// Starts watching the workspace root recursively.
    pub fn watch(root: &Path) -> Result<Self, WorkspaceError> {
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let Ok(event) = result else {
                    return;
                };
                for translated in translate(event) {
                    let _ = tx.send(translated);
                }
            },
            Config::default(),
        )
        .map_err(WorkspaceError::WatcherInit)?;

        watcher.watch(root, RecursiveMode::Recursive).map_err(WorkspaceError::WatcherWatch)?;
        tracing::info!("Watching workspace `{}`", root.display());

        Ok(Self { _watcher: watcher, receiver: rx })
    }

    /// The event stream. Blocks on `recv`.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<WorkspaceEvent> {
        &self.receiver
    }
}

fn translate(event: Event) -> Vec<WorkspaceEvent> {
    let mut translated = Vec::new();

    match event.kind {
        EventKind::Create(kind) => {
            for path in event.paths {
                let is_directory = matches!(kind, CreateKind::Folder) || path.is_dir();
                translated.push(if is_directory {
                    WorkspaceEvent::CreatedDirectory(path)
                } else {
                    WorkspaceEvent::Created(path)
                });
            }
        }
        EventKind::Modify(_) => {
            for path in event.paths {
                if path.is_dir() {
                    continue;
                }
                translated.push(WorkspaceEvent::Modified(path));
            }
        }
        EventKind::Remove(kind) => {
            for path in event.paths {
                translated.push(if matches!(kind, RemoveKind::Folder) {
                    WorkspaceEvent::RemovedDirectory(path)
                } else {
                    WorkspaceEvent::Removed(path)
                });
            }
        }
        _ => {}
    }

    translated
}
