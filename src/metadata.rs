use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::RemoteEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Uniform stat record derived from a remote entry descriptor. No identity
/// beyond its fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRecord {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

/// Translate a remote descriptor into a stat record. Folders report size 0
/// and "now" as mtime — the remote store keeps no reliable mtime for them.
/// Tombstones are filtered out upstream and never reach this function; one
/// slipping through is reported as a zero-sized file.
pub fn entry_to_stat(entry: &RemoteEntry) -> StatRecord {
    match entry {
        RemoteEntry::File {
            name,
            size,
            client_modified,
            ..
        } => StatRecord {
            name: name.clone(),
            kind: EntryKind::File,
            size: *size,
            mtime: *client_modified,
        },
        RemoteEntry::Folder { name, .. } => StatRecord {
            name: name.clone(),
            kind: EntryKind::Directory,
            size: 0,
            mtime: Utc::now(),
        },
        RemoteEntry::Deleted { name, .. } => StatRecord {
            name: name.clone(),
            kind: EntryKind::File,
            size: 0,
            mtime: Utc::now(),
        },
    }
}
