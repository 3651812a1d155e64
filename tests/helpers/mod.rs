#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use nimbusfs::client::{
    ChangePage, ClientFactory, Cursor, DirPage, RemoteEntry, StorageClient,
};
use nimbusfs::config::FsConfig;
use nimbusfs::error::{FsError, Result};
use nimbusfs::watch::{WatchCallback, WatchNotification};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Config with intervals short enough for tests to run in milliseconds.
pub fn fast_config() -> FsConfig {
    FsConfig {
        poll_interval: Duration::from_millis(10),
        backoff_interval: Duration::from_millis(25),
    }
}

pub fn file(name: &str, path_lower: &str, modified: DateTime<Utc>, size: u64) -> RemoteEntry {
    RemoteEntry::File {
        name: name.to_string(),
        path_lower: path_lower.to_string(),
        id: format!("id:{}", path_lower),
        size,
        client_modified: modified,
        server_modified: modified,
    }
}

pub fn folder(name: &str, path_lower: &str) -> RemoteEntry {
    RemoteEntry::Folder {
        name: name.to_string(),
        path_lower: path_lower.to_string(),
        id: format!("id:{}", path_lower),
    }
}

pub fn tombstone(name: &str, path_lower: &str) -> RemoteEntry {
    RemoteEntry::Deleted {
        name: name.to_string(),
        path_lower: path_lower.to_string(),
    }
}

pub fn change_page(entries: Vec<RemoteEntry>, cursor: &str, has_more: bool) -> ChangePage {
    ChangePage {
        entries,
        cursor: Cursor(cursor.to_string()),
        has_more,
    }
}

/// Scripted in-memory storage backend.
///
/// Directory listings are primed as explicit page sequences per path (the
/// root under the empty-string key). Change-feed batches are a queue of
/// scripted results; once drained, the feed reports an empty batch with no
/// further pages, parking the poller on its idle interval.
pub struct MockClient {
    metadata: Mutex<HashMap<String, RemoteEntry>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    directories: Mutex<HashSet<String>>,
    listings: Mutex<HashMap<String, Vec<Vec<RemoteEntry>>>>,
    changes: Mutex<VecDeque<Result<ChangePage>>>,
    cursor_seq: AtomicU64,
    /// Every cursor passed to `list_changes_since`, in call order.
    pub change_calls: Mutex<Vec<String>>,
    /// Every `(path, cursor)` passed to `list_folder_page`, in call order.
    pub list_calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            metadata: Mutex::new(HashMap::new()),
            contents: Mutex::new(HashMap::new()),
            directories: Mutex::new(HashSet::new()),
            listings: Mutex::new(HashMap::new()),
            changes: Mutex::new(VecDeque::new()),
            cursor_seq: AtomicU64::new(0),
            change_calls: Mutex::new(Vec::new()),
            list_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn insert_file(&self, path_lower: &str, modified: DateTime<Utc>, content: &[u8]) {
        let name = path_lower.rsplit('/').next().unwrap_or(path_lower);
        self.metadata.lock().insert(
            path_lower.to_string(),
            file(name, path_lower, modified, content.len() as u64),
        );
        self.contents
            .lock()
            .insert(path_lower.to_string(), content.to_vec());
    }

    pub fn insert_folder(&self, path_lower: &str) {
        let name = path_lower.rsplit('/').next().unwrap_or(path_lower);
        self.metadata
            .lock()
            .insert(path_lower.to_string(), folder(name, path_lower));
        self.directories.lock().insert(path_lower.to_string());
    }

    /// Prime the page sequence served for one directory path. The root
    /// listing goes under `""`.
    pub fn set_listing(&self, path: &str, pages: Vec<Vec<RemoteEntry>>) {
        self.listings.lock().insert(path.to_string(), pages);
    }

    pub fn push_changes(&self, page: ChangePage) {
        self.changes.lock().push_back(Ok(page));
    }

    pub fn push_change_error(&self, err: FsError) {
        self.changes.lock().push_back(Err(err));
    }

    pub fn cursors_issued(&self) -> u64 {
        self.cursor_seq.load(Ordering::Relaxed)
    }

    pub fn list_page_calls(&self) -> usize {
        self.list_calls.lock().len()
    }
}

impl StorageClient for MockClient {
    fn get_metadata(&self, path: &str) -> Result<RemoteEntry> {
        self.metadata
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    fn list_folder_page(&self, path: &str, cursor: Option<&Cursor>) -> Result<DirPage> {
        self.list_calls
            .lock()
            .push((path.to_string(), cursor.map(|c| c.0.clone())));

        let (key, index) = match cursor {
            None => (path.to_string(), 0),
            Some(Cursor(token)) => {
                let (idx, key) = token
                    .split_once('@')
                    .ok_or_else(|| FsError::Transient(format!("bad cursor {token}")))?;
                let idx: usize = idx
                    .parse()
                    .map_err(|_| FsError::Transient(format!("bad cursor {token}")))?;
                (key.to_string(), idx)
            }
        };

        let listings = self.listings.lock();
        let pages = listings
            .get(&key)
            .ok_or_else(|| FsError::NotFound(key.clone()))?;
        let entries = pages.get(index).cloned().unwrap_or_default();
        Ok(DirPage {
            entries,
            cursor: Cursor(format!("{}@{}", index + 1, key)),
            has_more: index + 1 < pages.len(),
        })
    }

    fn latest_cursor(&self, _path: &str, _recursive: bool) -> Result<Cursor> {
        let n = self.cursor_seq.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Cursor(format!("delta-{n}")))
    }

    fn list_changes_since(&self, cursor: &Cursor) -> Result<ChangePage> {
        self.change_calls.lock().push(cursor.0.clone());
        match self.changes.lock().pop_front() {
            Some(result) => result,
            None => Ok(ChangePage {
                entries: Vec::new(),
                cursor: cursor.clone(),
                has_more: false,
            }),
        }
    }

    fn read_range(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Vec<u8>> {
        if self.directories.lock().contains(path) {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        let contents = self.contents.lock();
        let data = contents
            .get(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let start = (offset as usize).min(data.len());
        let end = match length {
            Some(len) => (start + len as usize).min(data.len()),
            None => data.len(),
        };
        Ok(data[start..end].to_vec())
    }
}

pub fn factory(client: &Arc<MockClient>) -> Arc<dyn ClientFactory> {
    let client = Arc::clone(client);
    Arc::new(move || Arc::clone(&client) as Arc<dyn StorageClient>)
}

pub type NotificationLog = Arc<Mutex<Vec<WatchNotification>>>;

/// A callback that appends every notification to a shared log.
pub fn recording_callback() -> (WatchCallback, NotificationLog) {
    let log: NotificationLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let callback: WatchCallback = Box::new(move |n| {
        sink.lock().push(n);
        Ok(())
    });
    (callback, log)
}

/// A callback that always fails, for error-isolation tests.
pub fn failing_callback() -> WatchCallback {
    Box::new(|_| Err(FsError::Callback("deliberate test failure".to_string())))
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
