use std::time::Duration;

/// Tunables for the background delta poller.
#[derive(Debug, Clone)]
pub struct FsConfig {
    /// How long to sleep after a change-feed page reports no further pages.
    pub poll_interval: Duration,
    /// How long to sleep after a feed error before retrying.
    pub backoff_interval: Duration,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            backoff_interval: Duration::from_secs(60),
        }
    }
}
