use std::sync::Arc;
use std::thread::ThreadId;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::error::Result;

/// Opaque resumable token marking a position in the change feed or in a
/// paginated directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cursor(pub String);

/// An entry descriptor as reported by the remote store. `Deleted` is a
/// tombstone: it marks removal and carries no content metadata.
#[derive(Debug, Clone)]
pub enum RemoteEntry {
    File {
        name: String,
        path_lower: String,
        id: String,
        size: u64,
        /// Modification time as recorded by the writing client.
        client_modified: DateTime<Utc>,
        /// Modification time as recorded by the server. Used for snapshot
        /// boundary checks since it is monotonic per entry.
        server_modified: DateTime<Utc>,
    },
    Folder {
        name: String,
        path_lower: String,
        id: String,
    },
    Deleted {
        name: String,
        path_lower: String,
    },
}

impl RemoteEntry {
    pub fn name(&self) -> &str {
        match self {
            RemoteEntry::File { name, .. } => name,
            RemoteEntry::Folder { name, .. } => name,
            RemoteEntry::Deleted { name, .. } => name,
        }
    }

    pub fn path_lower(&self) -> &str {
        match self {
            RemoteEntry::File { path_lower, .. } => path_lower,
            RemoteEntry::Folder { path_lower, .. } => path_lower,
            RemoteEntry::Deleted { path_lower, .. } => path_lower,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, RemoteEntry::Deleted { .. })
    }
}

/// One page of a directory listing.
#[derive(Debug, Clone)]
pub struct DirPage {
    pub entries: Vec<RemoteEntry>,
    pub cursor: Cursor,
    pub has_more: bool,
}

/// One batch of the change feed. Entries may be tombstones.
#[derive(Debug, Clone)]
pub struct ChangePage {
    pub entries: Vec<RemoteEntry>,
    pub cursor: Cursor,
    pub has_more: bool,
}

/// The abstract storage backend. Every call is a blocking network round
/// trip on the calling thread; the transport, auth, and pagination
/// mechanics live behind this trait.
pub trait StorageClient: Send + Sync {
    /// Fetch the descriptor for a path. Fails with `FsError::NotFound` if
    /// the path does not resolve.
    fn get_metadata(&self, path: &str) -> Result<RemoteEntry>;

    /// Fetch one page of a directory listing. `cursor` is `None` for the
    /// first page. The root directory is requested with the empty-string
    /// path sentinel, never the literal `/`.
    fn list_folder_page(&self, path: &str, cursor: Option<&Cursor>) -> Result<DirPage>;

    /// Obtain a cursor representing "start of feed from now".
    fn latest_cursor(&self, path: &str, recursive: bool) -> Result<Cursor>;

    /// Fetch the next batch of changes after `cursor`. Fails with
    /// `FsError::CursorInvalidated` when the cursor can no longer be
    /// resumed.
    fn list_changes_since(&self, cursor: &Cursor) -> Result<ChangePage>;

    /// Read `length` bytes (or to end of file when `None`) starting at
    /// `offset`. Fails with `FsError::IsADirectory` when the path names a
    /// directory.
    fn read_range(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Vec<u8>>;
}

/// Hands out client handles. The facade, each open handle, and the poller
/// thread each obtain a handle from the factory and reuse it for their own
/// lifetime, so no handle is mutated across owners.
pub trait ClientFactory: Send + Sync {
    fn client(&self) -> Arc<dyn StorageClient>;
}

/// Blanket adapter so a closure can serve as a factory.
impl<F> ClientFactory for F
where
    F: Fn() -> Arc<dyn StorageClient> + Send + Sync,
{
    fn client(&self) -> Arc<dyn StorageClient> {
        self()
    }
}

/// Factory adapter that memoizes one client per calling thread. Gives the
/// "one network client per thread, constructed on first use" behavior as
/// an explicit component rather than hidden thread-local state.
pub struct PerThreadClientCache {
    inner: Arc<dyn ClientFactory>,
    cache: DashMap<ThreadId, Arc<dyn StorageClient>>,
}

impl PerThreadClientCache {
    pub fn new(inner: Arc<dyn ClientFactory>) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }
}

impl ClientFactory for PerThreadClientCache {
    fn client(&self) -> Arc<dyn StorageClient> {
        let tid = std::thread::current().id();
        self.cache
            .entry(tid)
            .or_insert_with(|| self.inner.client())
            .value()
            .clone()
    }
}
