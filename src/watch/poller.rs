use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{ChangePage, Cursor, StorageClient};
use crate::config::FsConfig;
use crate::error::FsError;
use crate::watch::{ChangeAction, ChangeEvent, WatchEntry, WatchNotification, WatchRegistry};

/// Counters exposed through the facade's status report. `cycles` counts
/// completed delivery passes, which also lets tests synchronize with the
/// poller without sleeping blind.
#[derive(Debug, Default)]
pub struct PollerStats {
    pub cycles: AtomicU64,
    pub resets_delivered: AtomicU64,
    pub events_delivered: AtomicU64,
}

/// Start the delta poller on a dedicated background thread. Exactly one
/// poller exists per filesystem instance; it runs until `shutdown` is set
/// and is joined via the returned handle.
pub(crate) fn start_poller(
    client: Arc<dyn StorageClient>,
    registry: Arc<WatchRegistry>,
    config: FsConfig,
    shutdown: Arc<AtomicBool>,
    stats: Arc<PollerStats>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("nimbusfs-delta".to_string())
        .spawn(move || {
            debug!("delta poller started");
            run(&*client, &registry, &config, &shutdown, &stats);
            debug!("delta poller shutting down");
        })
        .expect("failed to spawn delta poller thread")
}

fn run(
    client: &dyn StorageClient,
    registry: &WatchRegistry,
    config: &FsConfig,
    shutdown: &AtomicBool,
    stats: &PollerStats,
) {
    let mut cursor: Option<Cursor> = None;
    let mut needs_reset = true;

    while !shutdown.load(Ordering::Relaxed) {
        let current = match cursor.take() {
            Some(c) => c,
            None => match client.latest_cursor("", true) {
                Ok(c) => {
                    needs_reset = true;
                    c
                }
                Err(e) => {
                    warn!("failed to obtain change feed cursor: {}", e);
                    sleep_interruptible(config.backoff_interval, shutdown);
                    continue;
                }
            },
        };

        let page = match client.list_changes_since(&current) {
            Ok(page) => page,
            Err(FsError::CursorInvalidated) => {
                info!("change feed cursor invalidated, scheduling reset");
                needs_reset = true;
                sleep_interruptible(config.backoff_interval, shutdown);
                continue;
            }
            Err(e) => {
                warn!("failure while fetching change feed: {}", e);
                // Retry with the same cursor; fixed interval, never give up.
                cursor = Some(current);
                sleep_interruptible(config.backoff_interval, shutdown);
                continue;
            }
        };

        for entry in registry.snapshot() {
            deliver(&entry, &page, needs_reset, stats);
        }

        needs_reset = false;
        cursor = Some(page.cursor);
        stats.cycles.fetch_add(1, Ordering::Relaxed);

        if !page.has_more {
            sleep_interruptible(config.poll_interval, shutdown);
        }
    }
}

/// Deliver one change batch to one registration. Callback errors are
/// logged and contained: they affect neither other registrations nor this
/// registration's future cycles.
fn deliver(entry: &Arc<WatchEntry>, page: &ChangePage, needs_reset: bool, stats: &PollerStats) {
    if entry.is_stopped() {
        return;
    }

    if needs_reset {
        stats.resets_delivered.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = (entry.callback)(WatchNotification::Reset) {
            warn!("watch {} failed handling reset: {}", entry.id, e);
        }
    }

    let mut matched = Vec::new();
    for change in &page.entries {
        if !entry.matches(change.path_lower()) {
            continue;
        }
        let action = if change.is_deleted() {
            ChangeAction::Removed
        } else {
            ChangeAction::Modified
        };
        matched.push(ChangeEvent {
            action,
            name: change.name().to_string(),
        });
    }

    if matched.is_empty() || entry.is_stopped() {
        return;
    }

    stats
        .events_delivered
        .fetch_add(matched.len() as u64, Ordering::Relaxed);
    if let Err(e) = (entry.callback)(WatchNotification::Changes(matched)) {
        warn!("watch {} callback failed: {}", entry.id, e);
    }
}

/// Sleep in short ticks so the shutdown flag is noticed promptly.
fn sleep_interruptible(duration: Duration, shutdown: &AtomicBool) {
    let tick = Duration::from_millis(20);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let step = remaining.min(tick);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
