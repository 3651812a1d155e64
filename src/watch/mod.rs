pub mod poller;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Change-kind filter bits, matching the classic directory-notification
/// completion filter. Captured on registration and reported in status
/// output; delivery does not consult them yet (reserved).
pub type ChangeKindMask = u32;

pub const NOTIFY_CHANGE_FILE_NAME: ChangeKindMask = 1 << 0;
pub const NOTIFY_CHANGE_DIR_NAME: ChangeKindMask = 1 << 1;
pub const NOTIFY_CHANGE_ATTRIBUTES: ChangeKindMask = 1 << 2;
pub const NOTIFY_CHANGE_SIZE: ChangeKindMask = 1 << 3;
pub const NOTIFY_CHANGE_LAST_WRITE: ChangeKindMask = 1 << 4;
pub const NOTIFY_CHANGE_LAST_ACCESS: ChangeKindMask = 1 << 5;
pub const NOTIFY_CHANGE_CREATION: ChangeKindMask = 1 << 6;
pub const NOTIFY_CHANGE_EA: ChangeKindMask = 1 << 7;
pub const NOTIFY_CHANGE_SECURITY: ChangeKindMask = 1 << 8;
pub const NOTIFY_CHANGE_STREAM_NAME: ChangeKindMask = 1 << 9;
pub const NOTIFY_CHANGE_STREAM_SIZE: ChangeKindMask = 1 << 10;
pub const NOTIFY_CHANGE_STREAM_WRITE: ChangeKindMask = 1 << 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Never produced today: the change feed reports current-state-or-
    /// tombstone only, so an addition is indistinguishable from a
    /// modification without a prior baseline listing.
    Added,
    Modified,
    Removed,
}

/// A single change, named relative to the watch's scope directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub name: String,
}

/// What a watch callback receives. `Reset` means prior incremental state
/// is unreliable: changes before this point are not individually reported
/// and the watcher must re-list the directory itself.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchNotification {
    Reset,
    Changes(Vec<ChangeEvent>),
}

/// An `Err` from the callback is caught, logged, and isolated to that one
/// registration for that one delivery cycle.
pub type WatchCallback = Box<dyn Fn(WatchNotification) -> Result<()> + Send + Sync>;

/// One live registration. The registry owns nothing beyond this tuple.
pub struct WatchEntry {
    pub(crate) id: u64,
    pub(crate) callback: WatchCallback,
    /// Scope directory path, normalized lowercase.
    pub(crate) scope: String,
    /// Reserved; see module docs on the filter bits.
    pub(crate) mask: ChangeKindMask,
    pub(crate) recursive: bool,
    /// Set by `WatchHandle::stop` before the registration is removed, so a
    /// delivery working from an older snapshot skips the callback.
    pub(crate) stopped: AtomicBool,
}

impl WatchEntry {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether a changed path falls inside this watch's scope. The scope
    /// itself never matches; non-recursive watches match direct children
    /// only (no further separator past the scope prefix).
    pub(crate) fn matches(&self, path_lower: &str) -> bool {
        let rest = if self.scope == "/" {
            match path_lower.strip_prefix('/') {
                Some(r) => r,
                None => return false,
            }
        } else {
            match path_lower.strip_prefix(self.scope.as_str()) {
                Some(r) => match r.strip_prefix('/') {
                    Some(r) => r,
                    None => return false,
                },
                None => return false,
            }
        };
        if rest.is_empty() {
            return false;
        }
        self.recursive || !rest.contains('/')
    }
}

#[derive(Debug, Serialize)]
pub struct WatchInfo {
    pub id: u64,
    pub scope: String,
    pub mask: ChangeKindMask,
    pub recursive: bool,
}

/// Thread-safe set of active watch registrations. A single mutex guards
/// the collection; it is held only to copy or mutate it, never across a
/// callback invocation.
pub struct WatchRegistry {
    entries: Mutex<HashMap<u64, Arc<WatchEntry>>>,
    next_id: AtomicU64,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn register(
        &self,
        callback: WatchCallback,
        scope: String,
        mask: ChangeKindMask,
        recursive: bool,
    ) -> Arc<WatchEntry> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(WatchEntry {
            id,
            callback,
            scope,
            mask,
            recursive,
            stopped: AtomicBool::new(false),
        });
        self.entries.lock().insert(id, entry.clone());
        debug!("watch {} registered, scope={}", id, entry.scope);
        entry
    }

    pub(crate) fn remove(&self, id: u64) -> Option<Arc<WatchEntry>> {
        let removed = self.entries.lock().remove(&id);
        if removed.is_some() {
            debug!("watch {} removed", id);
        }
        removed
    }

    /// Atomic copy of the current registrations, for the poller to iterate
    /// without holding the lock during delivery.
    pub(crate) fn snapshot(&self) -> Vec<Arc<WatchEntry>> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Registration summaries for status reporting.
    pub fn all_entries(&self) -> Vec<WatchInfo> {
        self.entries
            .lock()
            .values()
            .map(|e| WatchInfo {
                id: e.id,
                scope: e.scope.clone(),
                mask: e.mask,
                recursive: e.recursive,
            })
            .collect()
    }
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Stop capability returned by `create_watch`. Consuming `stop` guarantees
/// no callback invocation for this watch begins after it returns.
pub struct WatchHandle {
    entry: Arc<WatchEntry>,
    registry: Arc<WatchRegistry>,
}

impl WatchHandle {
    pub(crate) fn new(entry: Arc<WatchEntry>, registry: Arc<WatchRegistry>) -> Self {
        Self { entry, registry }
    }

    pub fn id(&self) -> u64 {
        self.entry.id
    }

    pub fn stop(self) {
        // Flag first: a poller cycle still holding an older snapshot checks
        // this immediately before invoking the callback.
        self.entry.stopped.store(true, Ordering::Release);
        self.registry.remove(self.entry.id);
    }
}
