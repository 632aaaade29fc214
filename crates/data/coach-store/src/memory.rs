//! In-memory store.
//!
//! The map only resolves a user id to that user's partition; all reads and
//! writes then happen under the partition's own async mutex.

use crate::{Record, StateStore};
use async_trait::async_trait;
use coach_core::{Result, UserId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Partition<T> = Arc<Mutex<Option<T>>>;

/// Process-local store, one partition per user
pub struct MemoryStore<T> {
    partitions: DashMap<UserId, Partition<T>>,
}

impl<T: Record> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }

    /// Number of users with a partition
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Remove an empty partition that only the map and `partition` reference
    fn discard_if_unused(&self, user_id: &UserId, partition: &Partition<T>) {
        self.partitions.remove_if(user_id, |_, existing| {
            Arc::ptr_eq(existing, partition)
                && Arc::strong_count(existing) == 2
                && existing.try_lock().map(|slot| slot.is_none()).unwrap_or(false)
        });
    }

    fn partition(&self, user_id: &UserId) -> Partition<T> {
        // clone the Arc so the shard lock is released before any await
        Arc::clone(self.partitions.entry(user_id.clone()).or_default().value())
    }
}

impl<T: Record> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> StateStore<T> for MemoryStore<T> {
    async fn load(&self, user_id: &UserId) -> Result<Option<T>> {
        let partition = match self.partitions.get(user_id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(None),
        };
        let slot = partition.lock().await;
        Ok(slot.clone())
    }

    async fn store(&self, user_id: &UserId, record: &T) -> Result<()> {
        let partition = self.partition(user_id);
        let mut slot = partition.lock().await;
        *slot = Some(record.clone());
        Ok(())
    }

    async fn update(
        &self,
        user_id: &UserId,
        apply: &(dyn Fn(Option<T>) -> Result<T> + Send + Sync),
    ) -> Result<T> {
        let partition = self.partition(user_id);
        let mut slot = partition.lock().await;
        match apply(slot.clone()) {
            Ok(next) => {
                *slot = Some(next.clone());
                Ok(next)
            }
            Err(e) => {
                let empty = slot.is_none();
                drop(slot);
                if empty {
                    self.discard_if_unused(user_id, &partition);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::{
        parse_activity_date, CreditAccount, Credits, Error, ProgressionState, SubscriptionStatus,
    };

    fn user(id: &str) -> UserId {
        id.parse().unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_progression() {
        let store = MemoryStore::<ProgressionState>::new();
        let state = ProgressionState::restore(
            user("a"),
            1250,
            4,
            Some(parse_activity_date("2024-01-10").unwrap()),
        );

        store.store(&user("a"), &state).await.unwrap();
        assert_eq!(store.load(&user("a")).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_round_trip_account() {
        let store = MemoryStore::<CreditAccount>::new();
        let account = CreditAccount {
            user_id: user("b"),
            subscription_status: SubscriptionStatus::Canceled,
            credits: "3.25".parse().unwrap(),
            free_plan_used: true,
        };

        store.store(&user("b"), &account).await.unwrap();
        assert_eq!(store.load(&user("b")).await.unwrap(), Some(account));
        assert_eq!(store.load(&user("nobody")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_record() {
        let store = MemoryStore::<CreditAccount>::new();
        let account = CreditAccount::new(user("c"), Credits::whole(2));
        store.store(&user("c"), &account).await.unwrap();

        let result = store
            .update(&user("c"), &|_| Err(Error::NotFound("nope".into())))
            .await;
        assert!(result.is_err());
        assert_eq!(store.load(&user("c")).await.unwrap(), Some(account));
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_partition() {
        let store = MemoryStore::<CreditAccount>::new();
        for _ in 0..3 {
            let result = store
                .update(&user("ghost"), &|cur| cur.ok_or_else(|| Error::NotFound("ghost".into())))
                .await;
            assert!(matches!(result, Err(Error::NotFound(_))));
        }
        assert!(store.is_empty());
        assert_eq!(store.load(&user("ghost")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_consume_ends_at_zero() {
        const N: u64 = 64;
        let store = Arc::new(MemoryStore::<CreditAccount>::new());
        let amount: Credits = "0.1".parse().unwrap();
        let id = user("racer");
        store
            .store(&id, &CreditAccount::new(id.clone(), amount.saturating_mul(N)))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..N)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                tokio::spawn(async move {
                    store
                        .update(&id, &|cur| {
                            let account = cur.ok_or_else(|| Error::NotFound("account".into()))?;
                            Ok(account.consume(amount))
                        })
                        .await
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let account = store.load(&id).await.unwrap().unwrap();
        assert_eq!(account.credits, Credits::ZERO);
    }

    #[tokio::test]
    async fn test_users_are_partitioned() {
        let store = MemoryStore::<CreditAccount>::new();
        for name in ["x", "y"] {
            store
                .store(&user(name), &CreditAccount::new(user(name), Credits::whole(5)))
                .await
                .unwrap();
        }

        store
            .update(&user("x"), &|cur| Ok(cur.unwrap().consume(Credits::whole(5))))
            .await
            .unwrap();

        assert_eq!(store.load(&user("x")).await.unwrap().unwrap().credits, Credits::ZERO);
        assert_eq!(store.load(&user("y")).await.unwrap().unwrap().credits, Credits::whole(5));
        assert_eq!(store.len(), 2);
    }
}
