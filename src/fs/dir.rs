use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::{Cursor, RemoteEntry, StorageClient};
use crate::error::Result;
use crate::metadata::{entry_to_stat, StatRecord};

/// An open directory producing a lazily-paginated, approximately
/// snapshot-consistent listing.
///
/// The backing store cannot produce true snapshots, so the handle records
/// the enumeration start time and stops the listing at the first file
/// whose server-side modification time is after it. Entries produced
/// before that boundary form a consistent point-in-time view even while
/// the store mutates live. Directories are exempt from the boundary check
/// since the store keeps no reliable mtime for them.
pub struct DirHandle {
    client: Arc<dyn StorageClient>,
    /// Normalized lowercase path; `/` for the root.
    path: String,
    id: String,
    /// Snapshot boundary, fixed when the current enumeration began.
    start: DateTime<Utc>,
    cursor: Option<Cursor>,
    buffered: VecDeque<StatRecord>,
    exhausted: bool,
    closed: bool,
}

impl DirHandle {
    pub(crate) fn new(client: Arc<dyn StorageClient>, path: String, id: String) -> Self {
        Self {
            client,
            path,
            id,
            start: Utc::now(),
            cursor: None,
            buffered: VecDeque::new(),
            exhausted: false,
            closed: false,
        }
    }

    /// The directory's normalized path (the scope used by watches).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn remote_id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pull the next entry of the snapshot, or `None` when the sequence is
    /// exhausted. Pages are fetched only as entries are consumed.
    pub fn read(&mut self) -> Result<Option<StatRecord>> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted || self.closed {
                return Ok(None);
            }
            self.fetch_page()?;
        }
    }

    /// Restart the snapshot: new boundary time, cleared pagination state.
    /// The next `read` begins a fresh enumeration from the first page.
    pub fn reset(&mut self) {
        debug!("reset directory listing for {}", self.path);
        self.start = Utc::now();
        self.cursor = None;
        self.buffered.clear();
        self.exhausted = false;
    }

    /// Release the handle. The backing protocol holds no per-listing
    /// resources, so this only marks the handle unusable.
    pub fn close(&mut self) {
        self.closed = true;
        self.buffered.clear();
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page = match &self.cursor {
            // The root directory is requested with the empty-string
            // sentinel, not the literal `/`.
            None => {
                let path = if self.path == "/" { "" } else { &self.path };
                self.client.list_folder_page(path, None)?
            }
            Some(cursor) => self.client.list_folder_page(&self.path, Some(cursor))?,
        };

        for entry in &page.entries {
            if entry.is_deleted() {
                continue;
            }
            if let RemoteEntry::File {
                server_modified, ..
            } = entry
            {
                if *server_modified > self.start {
                    // Snapshot boundary: nothing further from this or any
                    // later page.
                    self.exhausted = true;
                    break;
                }
            }
            self.buffered.push_back(entry_to_stat(entry));
        }

        self.cursor = Some(page.cursor);
        if !page.has_more {
            self.exhausted = true;
        }
        Ok(())
    }
}
