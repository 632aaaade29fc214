//! Per-user async locks.
//!
//! A metered action holds its user's lock from the balance check until the
//! charge is written, so two requests from one user cannot both pass the
//! check on the same balance. Different users use different locks.

use coach_core::UserId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Prune idle entries once the table grows past this
const PRUNE_THRESHOLD: usize = 4_096;

#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`
    pub async fn lock(&self, user_id: &UserId) -> OwnedMutexGuard<()> {
        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune();
        }
        let lock = Arc::clone(self.locks.entry(user_id.clone()).or_default().value());
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_exclusive() {
        let locks = KeyedLocks::new();
        let user: UserId = "u1".parse().unwrap();

        let guard = locks.lock(&user).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(&user)).await;
        assert!(second.is_err());

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), locks.lock(&user)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_other_users_do_not_wait() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(&"a".parse().unwrap()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&"b".parse().unwrap())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = KeyedLocks::new();
        let held = locks.lock(&"held".parse().unwrap()).await;
        drop(locks.lock(&"idle".parse().unwrap()).await);

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
    }
}
