use std::sync::Arc;

use tracing::debug;

use crate::client::StorageClient;
use crate::error::Result;

/// An open file serving positioned byte-range reads. No caching, no
/// read-ahead: every call is a remote round trip.
pub struct FileHandle {
    client: Arc<dyn StorageClient>,
    /// Normalized lowercase path.
    path: String,
    id: String,
    /// Current offset for sequential reads. Owned exclusively by the
    /// handle, advanced only by `read`.
    offset: u64,
}

impl FileHandle {
    pub(crate) fn new(client: Arc<dyn StorageClient>, path: String, id: String) -> Self {
        Self {
            client,
            path,
            id,
            offset: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn remote_id(&self) -> &str {
        &self.id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read `length` bytes (or to end of file when `None`) starting at
    /// `offset`, independent of the handle's sequential position. Fails
    /// with `FsError::IsADirectory` when the path names a directory.
    pub fn pread(&self, offset: u64, length: Option<u64>) -> Result<Vec<u8>> {
        debug!("pread({}, offset={}, length={:?})", self.path, offset, length);
        self.client.read_range(&self.path, offset, length)
    }

    /// Sequential read at the handle's current offset, advancing it by the
    /// number of bytes actually returned.
    pub fn read(&mut self, size: Option<u64>) -> Result<Vec<u8>> {
        let data = self.pread(self.offset, size)?;
        self.offset += data.len() as u64;
        Ok(data)
    }

    /// Read from the current offset through end of file.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.read(None)
    }
}
