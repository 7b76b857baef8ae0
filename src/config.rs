use std::time::Duration;

/// Timeouts for the per-collection processing lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Lifetime of a held lock; it expires even if never released.
    pub hold_timeout: Duration,
    /// How long a worker waits for a contended lock before proceeding without it.
    pub wait_timeout: Duration,
    /// First delay between acquisition attempts; doubles up to `max_poll_interval`.
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
    /// Upper bound on a single release or connect call to the coordination backend.
    pub backend_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            hold_timeout: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            max_poll_interval: Duration::from_secs(1),
            backend_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub lock: LockConfig,
    /// An event left in PROCESSING longer than this may be reclaimed by a redelivery.
    pub stale_after: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            lock: LockConfig::default(),
            stale_after: Duration::from_secs(300),
        }
    }
}

impl ReconcilerConfig {
    pub fn with_lock_timeouts(mut self, hold_timeout: Duration, wait_timeout: Duration) -> Self {
        self.lock.hold_timeout = hold_timeout;
        self.lock.wait_timeout = wait_timeout;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}
