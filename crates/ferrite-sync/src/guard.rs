//! Concurrency guard.
//!
//! Transaction-scoped advisory locks keyed by a stable hash of the entity
//! identifier. Acquisition never blocks inside the database: it tries the
//! lock and backs off with jitter between a bounded number of retries.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

use ferrite_db::AdvisoryLock;

use crate::config::LockConfig;
use crate::error::GuardError;

/// Serializes reconciliations of the same entity.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGuard {
    config: LockConfig,
}

impl ConcurrencyGuard {
    #[must_use]
    pub fn new(config: LockConfig) -> Self {
        Self { config }
    }

    /// Non-negative 64-bit lock key for an entity identifier.
    #[must_use]
    pub fn lock_key(entity: &str) -> i64 {
        let digest = Sha256::digest(entity.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(bytes) & 0x7fff_ffff_ffff_ffff) as i64
    }

    /// Take the lock for `entity` on the caller's transaction.
    ///
    /// The lock lives until the transaction commits or rolls back.
    pub async fn acquire<L>(&self, tx: &mut L, entity: &str) -> Result<(), GuardError>
    where
        L: AdvisoryLock + ?Sized,
    {
        let key = Self::lock_key(entity);
        let attempts = self.config.retries + 1;

        for attempt in 0..attempts {
            if tx.try_advisory_xact_lock(key).await? {
                debug!(entity, key, attempt, "Acquired advisory lock");
                return Ok(());
            }
            if attempt + 1 < attempts {
                let delay = self.backoff(attempt);
                debug!(entity, attempt, delay_ms = delay.as_millis() as u64, "Advisory lock busy, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        warn!(entity, attempts, "Advisory lock still held, giving up");
        Err(GuardError::Contended {
            entity: entity.to_string(),
            attempts,
        })
    }

    /// Exponential backoff for retry `attempt` (0-based) plus random jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .config
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16));
        let jitter = if self.config.max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.config.max_jitter_ms)
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ferrite_db::DbError;

    /// Lock that is busy for the first `busy_for` attempts.
    struct FlakyLock {
        busy_for: u32,
        calls: u32,
    }

    #[async_trait]
    impl AdvisoryLock for FlakyLock {
        async fn try_advisory_xact_lock(&mut self, _key: i64) -> Result<bool, DbError> {
            self.calls += 1;
            Ok(self.calls > self.busy_for)
        }
    }

    fn fast_guard(retries: u32) -> ConcurrencyGuard {
        ConcurrencyGuard::new(LockConfig {
            retries,
            base_delay_ms: 1,
            max_jitter_ms: 1,
        })
    }

    #[test]
    fn test_lock_key_is_stable_and_non_negative() {
        let id = "0d6f0c1e-8a4f-4a53-9f0a-0c3c2b0b7a11";
        assert_eq!(ConcurrencyGuard::lock_key(id), ConcurrencyGuard::lock_key(id));
        assert!(ConcurrencyGuard::lock_key(id) >= 0);
        assert_ne!(ConcurrencyGuard::lock_key(id), ConcurrencyGuard::lock_key("other"));
    }

    #[test]
    fn test_backoff_grows_exponentially_within_jitter() {
        let guard = ConcurrencyGuard::new(LockConfig::default());
        for attempt in 0..3 {
            let delay = guard.backoff(attempt).as_millis() as u64;
            let base = 300 * (1 << attempt);
            assert!(delay >= base && delay <= base + 100, "attempt {attempt}: {delay}ms");
        }
    }

    #[tokio::test]
    async fn test_acquire_retries_until_free() {
        let mut lock = FlakyLock {
            busy_for: 2,
            calls: 0,
        };
        fast_guard(3).acquire(&mut lock, "resource").await.unwrap();
        assert_eq!(lock.calls, 3);
    }

    #[tokio::test]
    async fn test_acquire_gives_up_after_retries() {
        let mut lock = FlakyLock {
            busy_for: u32::MAX,
            calls: 0,
        };
        let err = fast_guard(2).acquire(&mut lock, "resource").await.unwrap_err();
        assert!(matches!(err, GuardError::Contended { attempts: 3, .. }));
        assert_eq!(lock.calls, 3);
    }
}
