pub mod dir;
pub mod file;

pub use dir::DirHandle;
pub use file::FileHandle;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::client::{ClientFactory, RemoteEntry, StorageClient};
use crate::config::FsConfig;
use crate::error::{FsError, Result};
use crate::metadata::{entry_to_stat, StatRecord};
use crate::watch::poller::{self, PollerStats};
use crate::watch::{ChangeKindMask, WatchCallback, WatchHandle, WatchRegistry};

/// The filesystem facade over a remote storage account: stat, open,
/// directory listing, and directory-change watches.
///
/// Construction spawns the single delta-poller thread for this instance;
/// `close` (also run on drop) signals it and joins deterministically.
pub struct NimbusFs {
    factory: Arc<dyn ClientFactory>,
    watches: Arc<WatchRegistry>,
    shutdown: Arc<AtomicBool>,
    poller: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<PollerStats>,
    start_time: std::time::Instant,
}

impl NimbusFs {
    pub fn new(factory: Arc<dyn ClientFactory>, config: FsConfig) -> Self {
        let watches = Arc::new(WatchRegistry::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PollerStats::default());

        // The poller owns its own client handle for its whole lifetime.
        let handle = poller::start_poller(
            factory.client(),
            Arc::clone(&watches),
            config,
            Arc::clone(&shutdown),
            Arc::clone(&stats),
        );
        info!("filesystem initialized, delta poller running");

        Self {
            factory,
            watches,
            shutdown,
            poller: Mutex::new(Some(handle)),
            stats,
            start_time: std::time::Instant::now(),
        }
    }

    /// Resolve a path to its remote descriptor. The root has no remote
    /// descriptor of its own and is synthesized.
    fn get_md(&self, client: &Arc<dyn StorageClient>, path: &str) -> Result<RemoteEntry> {
        debug!("get_md({})", path);
        if path == "/" {
            return Ok(RemoteEntry::Folder {
                name: "/".to_string(),
                path_lower: "/".to_string(),
                id: "/".to_string(),
            });
        }
        let md = client.get_metadata(path)?;
        if md.is_deleted() {
            return Err(FsError::NotFound(path.to_string()));
        }
        Ok(md)
    }

    fn remote_id(md: &RemoteEntry) -> String {
        match md {
            RemoteEntry::File { id, .. } => id.clone(),
            RemoteEntry::Folder { id, .. } => id.clone(),
            RemoteEntry::Deleted { path_lower, .. } => path_lower.clone(),
        }
    }

    pub fn stat(&self, path: &str) -> Result<StatRecord> {
        let client = self.factory.client();
        let md = self.get_md(&client, path)?;
        Ok(entry_to_stat(&md))
    }

    /// Open a file for positioned reads. Resolution failures surface here;
    /// opening a directory path succeeds and fails at read time, as the
    /// backing protocol reports directory-ness on the read call.
    pub fn open(&self, path: &str) -> Result<FileHandle> {
        let client = self.factory.client();
        let md = self.get_md(&client, path)?;
        Ok(FileHandle::new(
            client,
            md.path_lower().to_string(),
            Self::remote_id(&md),
        ))
    }

    /// Stat an already-open file through its handle.
    pub fn fstat(&self, file: &FileHandle) -> Result<StatRecord> {
        self.stat(file.path())
    }

    /// Open a directory for snapshot enumeration.
    pub fn open_directory(&self, path: &str) -> Result<DirHandle> {
        let client = self.factory.client();
        let md = self.get_md(&client, path)?;
        Ok(DirHandle::new(
            client,
            md.path_lower().to_string(),
            Self::remote_id(&md),
        ))
    }

    /// Register a watch scoped to `dir`'s subtree. The returned handle is
    /// the stop capability; the caller owns the callback's lifetime until
    /// `stop` returns.
    pub fn create_watch(
        &self,
        callback: WatchCallback,
        dir: &DirHandle,
        mask: ChangeKindMask,
        recursive: bool,
    ) -> Result<WatchHandle> {
        if dir.is_closed() {
            return Err(FsError::InvalidArgument(format!(
                "watch scope {} is not an open directory",
                dir.path()
            )));
        }
        let entry = self
            .watches
            .register(callback, dir.path().to_string(), mask, recursive);
        Ok(WatchHandle::new(entry, Arc::clone(&self.watches)))
    }

    /// Introspection snapshot: uptime, watch registrations, poller counters.
    pub fn status_json(&self) -> String {
        serde_json::json!({
            "uptime_seconds": self.start_time.elapsed().as_secs(),
            "active_watches": self.watches.len(),
            "watches": self.watches.all_entries(),
            "poller_cycles": self.stats.cycles.load(Ordering::Relaxed),
            "resets_delivered": self.stats.resets_delivered.load(Ordering::Relaxed),
            "events_delivered": self.stats.events_delivered.load(Ordering::Relaxed),
        })
        .to_string()
    }

    /// Completed poller delivery passes so far.
    pub fn poller_cycles(&self) -> u64 {
        self.stats.cycles.load(Ordering::Relaxed)
    }

    /// Signal the poller and join it. Idempotent; also run on drop.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.poller.lock().take() {
            info!("joining delta poller");
            let _ = handle.join();
        }
    }
}

impl Drop for NimbusFs {
    fn drop(&mut self) {
        self.close();
    }
}
