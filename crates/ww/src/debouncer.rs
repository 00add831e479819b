//! Debouncing of vault change notifications.
//!
//! Editors emit bursts of events per save. Events are keyed by path and
//! released once no further event for that path arrived within the
//! debounce window; the latest kind recorded for a path wins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use notify::EventKind;

/// What happened to a vault file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Changed,
    Removed,
}

impl ChangeKind {
    /// Map a notify event kind, ignoring access and metadata-only events.
    pub(crate) fn from_notify(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) | EventKind::Modify(_) => Some(Self::Changed),
            EventKind::Remove(_) => Some(Self::Removed),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }
}

/// A settled change to one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

struct Pending {
    kind: ChangeKind,
    deadline: Instant,
}

/// Thread-safe change debouncer.
pub(crate) struct ChangeDebouncer {
    pending: Mutex<HashMap<PathBuf, Pending>>,
    window: Duration,
}

impl ChangeDebouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Record an event. Called from the watcher thread.
    pub(crate) fn record(&self, path: PathBuf, kind: ChangeKind) {
        let deadline = Instant::now() + self.window;
        let Ok(mut pending) = self.pending.lock() else {
            return;
        };
        pending.insert(path, Pending { kind, deadline });
    }

    /// Record every path of a notify event.
    pub(crate) fn record_notify(&self, res: notify::Result<notify::Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Watcher error");
                return;
            }
        };
        let Some(kind) = ChangeKind::from_notify(event.kind) else {
            return;
        };
        for path in event.paths {
            self.record(path, kind);
        }
    }

    /// Take the changes whose debounce window has passed, sorted by path.
    pub(crate) fn drain_ready(&self) -> Vec<Change> {
        let Ok(mut pending) = self.pending.lock() else {
            return Vec::new();
        };
        let now = Instant::now();
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        let mut changes: Vec<Change> = ready
            .into_iter()
            .filter_map(|path| {
                let entry = pending.remove(&path)?;
                Some(Change {
                    path,
                    kind: entry.kind,
                })
            })
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_change_emitted_after_window() {
        let debouncer = ChangeDebouncer::new(Duration::from_millis(10));
        let path = PathBuf::from("/vault/a.md");
        debouncer.record(path.clone(), ChangeKind::Changed);

        assert!(debouncer.drain_ready().is_empty());
        thread::sleep(Duration::from_millis(15));

        assert_eq!(
            debouncer.drain_ready(),
            [Change {
                path,
                kind: ChangeKind::Changed
            }]
        );
        assert!(debouncer.drain_ready().is_empty());
    }

    #[test]
    fn test_burst_coalesces_to_latest_kind() {
        let debouncer = ChangeDebouncer::new(Duration::from_millis(10));
        let path = PathBuf::from("/vault/a.md");
        debouncer.record(path.clone(), ChangeKind::Changed);
        debouncer.record(path.clone(), ChangeKind::Changed);
        debouncer.record(path.clone(), ChangeKind::Removed);

        thread::sleep(Duration::from_millis(15));
        let changes = debouncer.drain_ready();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn test_new_event_extends_window() {
        let debouncer = ChangeDebouncer::new(Duration::from_millis(30));
        let path = PathBuf::from("/vault/a.md");
        debouncer.record(path.clone(), ChangeKind::Changed);
        thread::sleep(Duration::from_millis(20));
        debouncer.record(path, ChangeKind::Changed);
        thread::sleep(Duration::from_millis(20));

        assert!(debouncer.drain_ready().is_empty());
    }

    #[test]
    fn test_access_events_ignored() {
        assert_eq!(
            ChangeKind::from_notify(EventKind::Access(notify::event::AccessKind::Any)),
            None
        );
        assert_eq!(
            ChangeKind::from_notify(EventKind::Remove(notify::event::RemoveKind::File)),
            Some(ChangeKind::Removed)
        );
    }
}
