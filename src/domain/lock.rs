use super::ports::SharedCoordinationBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outcome of asking for exclusive access to a business key.
pub enum Acquisition {
    Exclusive(ScopedLock),
    /// No coordination backend is configured or it could not be reached.
    Degraded,
    /// The wait timeout elapsed while another worker held the key.
    Unavailable,
}

impl Acquisition {
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Exclusive(_) => "exclusive",
            Self::Degraded => "degraded",
            Self::Unavailable => "unavailable",
        }
    }

    /// Releases the lock if one is held.
    pub async fn release(self) {
        if let Self::Exclusive(lock) = self {
            lock.release().await;
        }
    }
}

/// A held lock. The key is deleted only while it still carries this
/// holder's token, so a lock reclaimed after expiry is never released by
/// the previous owner.
///
/// Dropping without [`ScopedLock::release`] (a panic or a cancelled task)
/// schedules the release on the current runtime; the backend expiry covers
/// the case where no runtime is left.
pub struct ScopedLock {
    backend: SharedCoordinationBackend,
    key: String,
    token: String,
    release_timeout: Duration,
    released: bool,
}

impl ScopedLock {
    /// `release_timeout` bounds the delete call; an unanswered release is
    /// left to the backend expiry.
    pub fn new(
        backend: SharedCoordinationBackend,
        key: String,
        token: String,
        release_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            key,
            token,
            release_timeout,
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns whether this holder still owned the key.
    pub async fn release(mut self) -> bool {
        self.released = true;
        let delete = self.backend.delete_if_owner(&self.key, &self.token);
        match timeout(self.release_timeout, delete).await {
            Ok(Ok(true)) => {
                debug!(key = %self.key, "lock released");
                true
            }
            Ok(Ok(false)) => {
                warn!(key = %self.key, "lock expired or was reclaimed before release");
                false
            }
            Ok(Err(e)) => {
                warn!(key = %self.key, error = %e, "failed to release lock, leaving it to expire");
                false
            }
            Err(_) => {
                warn!(key = %self.key, "lock release timed out, leaving it to expire");
                false
            }
        }
    }
}

impl Drop for ScopedLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let backend = Arc::clone(&self.backend);
            let key = std::mem::take(&mut self.key);
            let token = std::mem::take(&mut self.token);
            let release_timeout = self.release_timeout;
            handle.spawn(async move {
                match timeout(release_timeout, backend.delete_if_owner(&key, &token)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(key = %key, error = %e, "background lock release failed"),
                    Err(_) => warn!(key = %key, "background lock release timed out"),
                }
            });
        }
    }
}
