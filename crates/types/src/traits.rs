//! Async traits shared across all subproxy crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `subproxy-types`, not on each other.

use crate::{Credential, CredentialSet, ProviderKey, ProxyError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Durable storage for one credential per provider key.
///
/// Implementations treat a missing backing record as an empty set. Any other
/// read failure is a hard [`ProxyError::Storage`] error.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the credential stored under `key`.
    async fn get(&self, key: &ProviderKey) -> Result<Option<Credential>>;
    /// Overwrite the credential stored under `key`.
    async fn set(&self, key: &ProviderKey, credential: &Credential) -> Result<()>;
    /// Delete the credential stored under `key`; a missing key is not an error.
    async fn remove(&self, key: &ProviderKey) -> Result<()>;
    /// Load the whole credential set.
    async fn get_all(&self) -> Result<CredentialSet>;
}

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// A manually driven [`Clock`] for tests.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    #[must_use]
    pub fn new(now_ms: u64) -> Self {
        Self(AtomicU64::new(now_ms))
    }

    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_fixed_clock_advance() {
        let clock = FixedClock::new(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3_000);
        clock.set(5);
        assert_eq!(clock.now_ms(), 5);
    }
}
