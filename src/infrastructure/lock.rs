//! Lock providers, selected once at startup.

use crate::config::LockConfig;
use crate::domain::lock::{Acquisition, ScopedLock};
use crate::domain::ports::{LockProvider, SharedCoordinationBackend};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mutual exclusion through a shared coordination backend.
///
/// Acquisition is "set if absent, with expiry" polled with exponential
/// backoff until `wait_timeout`. Each backend call is bounded by the time
/// left in that window. A backend error or an unanswered call degrades to
/// running without exclusivity rather than failing the webhook.
pub struct CoordinatedLockProvider {
    backend: SharedCoordinationBackend,
    poll_interval: Duration,
    max_poll_interval: Duration,
    release_timeout: Duration,
}

impl CoordinatedLockProvider {
    pub fn new(backend: SharedCoordinationBackend, config: &LockConfig) -> Self {
        Self {
            backend,
            poll_interval: config.poll_interval,
            max_poll_interval: config.max_poll_interval.max(config.poll_interval),
            release_timeout: config.backend_timeout,
        }
    }
}

#[async_trait]
impl LockProvider for CoordinatedLockProvider {
    async fn acquire(
        &self,
        key: &str,
        hold_timeout: Duration,
        wait_timeout: Duration,
    ) -> Acquisition {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait_timeout;
        let mut delay = self.poll_interval;

        loop {
            // A zero wait still gets one attempt
            let budget = deadline
                .saturating_duration_since(Instant::now())
                .max(self.poll_interval);
            let attempt = self.backend.set_if_absent(key, &token, hold_timeout);
            match timeout(budget, attempt).await {
                Ok(Ok(true)) => {
                    debug!(key, "lock acquired");
                    let lock = ScopedLock::new(
                        Arc::clone(&self.backend),
                        key.to_string(),
                        token,
                        self.release_timeout,
                    );
                    return Acquisition::Exclusive(lock);
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    warn!(key, error = %e, "coordination backend error, continuing without lock");
                    return Acquisition::Degraded;
                }
                Err(_) => {
                    warn!(
                        key,
                        budget_ms = budget.as_millis() as u64,
                        "coordination backend did not answer, continuing without lock"
                    );
                    return Acquisition::Degraded;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                info!(
                    key,
                    wait_ms = wait_timeout.as_millis() as u64,
                    "lock wait timed out"
                );
                return Acquisition::Unavailable;
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(self.max_poll_interval);
        }
    }
}

/// Used when no coordination backend is configured. Always succeeds;
/// correctness then rests on the forward-only status rule alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct DegradedLockProvider;

#[async_trait]
impl LockProvider for DegradedLockProvider {
    async fn acquire(
        &self,
        key: &str,
        _hold_timeout: Duration,
        _wait_timeout: Duration,
    ) -> Acquisition {
        debug!(key, "no coordination backend, skipping lock");
        Acquisition::Degraded
    }
}
