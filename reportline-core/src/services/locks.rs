//! In-process key locks
//!
//! At most one merge runs per (tenant, date). Different keys never share
//! a lock, and a key's entry disappears once its holder is done.

use std::thread;

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::RetryPolicy;
use crate::domain::result::{Error, Result};
use crate::domain::TenantKey;

type LockKey = (TenantKey, NaiveDate);

/// Table of held (tenant, date) locks
pub struct KeyLocks {
    held: DashMap<LockKey, ()>,
    policy: RetryPolicy,
}

/// Releases its key on drop
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: LockKey,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.remove(&self.key);
    }
}

impl KeyLocks {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            held: DashMap::new(),
            policy,
        }
    }

    /// Take the lock for (tenant, date), backing off while someone else holds it
    pub fn acquire(&self, tenant: TenantKey, date: NaiveDate) -> Result<KeyGuard<'_>> {
        let key = (tenant, date);
        for attempt in 0..self.policy.attempts {
            if let Some(guard) = self.try_acquire(key) {
                return Ok(guard);
            }
            if attempt + 1 < self.policy.attempts {
                let delay = self.policy.delay(attempt);
                tracing::debug!(%tenant, %date, attempt = attempt + 1, "key busy, backing off");
                thread::sleep(delay);
            }
        }

        tracing::warn!(%tenant, %date, attempts = self.policy.attempts, "gave up waiting for key");
        Err(Error::ConflictRetryExhausted(format!(
            "merge for {} on {} still busy after {} attempts",
            tenant, date, self.policy.attempts
        )))
    }

    fn try_acquire(&self, key: LockKey) -> Option<KeyGuard<'_>> {
        match self.held.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(KeyGuard { locks: self, key })
            }
        }
    }

    /// Number of keys currently held
    pub fn held(&self) -> usize {
        self.held.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    #[test]
    fn test_same_key_is_exclusive() {
        let locks = KeyLocks::new(policy(3));
        let tenant = TenantKey::generate();

        let guard = locks.acquire(tenant, date(4)).unwrap();
        assert!(matches!(
            locks.acquire(tenant, date(4)),
            Err(Error::ConflictRetryExhausted(_))
        ));

        drop(guard);
        assert!(locks.acquire(tenant, date(4)).is_ok());
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let locks = KeyLocks::new(policy(1));
        let a = TenantKey::generate();
        let b = TenantKey::generate();

        let _g1 = locks.acquire(a, date(4)).unwrap();
        let _g2 = locks.acquire(a, date(5)).unwrap();
        let _g3 = locks.acquire(b, date(4)).unwrap();
        assert_eq!(locks.held(), 3);
    }

    #[test]
    fn test_released_keys_are_removed() {
        let locks = KeyLocks::new(policy(1));
        {
            let _guard = locks.acquire(TenantKey::generate(), date(1)).unwrap();
            assert_eq!(locks.held(), 1);
        }
        assert_eq!(locks.held(), 0);
    }
}
