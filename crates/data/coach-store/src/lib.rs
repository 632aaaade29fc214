//! # Coach Store
//!
//! Key-value persistence for per-user records, keyed by user id.
//!
//! Every write goes through [`StateStore::update`], an atomic
//! read-modify-write on one user's partition. Two concurrent updates for the
//! same user are serialized; updates for different users never contend.
//!
//! - [`MemoryStore`]: one async mutex per user partition
//! - [`MongoStore`]: versioned documents with a compare-and-swap retry loop

pub mod audit;
pub mod memory;
pub mod mongo;

pub use audit::{AuditEntry, AuditSink, MemoryAuditLog, MongoAuditLog, NullAuditSink};
pub use memory::MemoryStore;
pub use mongo::{connect, MongoStore};

use async_trait::async_trait;
use coach_core::{CreditAccount, ProgressionState, Result, UserId};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record type that can live in a [`StateStore`]
pub trait Record:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + Unpin + 'static
{
    /// Collection (table) name for document stores
    const COLLECTION: &'static str;
}

impl Record for ProgressionState {
    const COLLECTION: &'static str = "xp";
}

impl Record for CreditAccount {
    const COLLECTION: &'static str = "users";
}

/// Async key-value store for one record type
#[async_trait]
pub trait StateStore<T: Record>: Send + Sync {
    /// Current record, or `None` if the user has none yet
    async fn load(&self, user_id: &UserId) -> Result<Option<T>>;

    /// Unconditionally replace the record
    async fn store(&self, user_id: &UserId, record: &T) -> Result<()>;

    /// Atomically apply `apply` to the current record and persist the result.
    ///
    /// `apply` may run more than once under contention and must be pure.
    /// An error from `apply` aborts the update and leaves the record as it was.
    async fn update(
        &self,
        user_id: &UserId,
        apply: &(dyn Fn(Option<T>) -> Result<T> + Send + Sync),
    ) -> Result<T>;
}

/// Load the record, creating it with `create` if absent
pub async fn load_or_create<T, S, F>(store: &S, user_id: &UserId, create: F) -> Result<T>
where
    T: Record,
    S: StateStore<T> + ?Sized,
    F: Fn() -> T + Send + Sync,
{
    if let Some(existing) = store.load(user_id).await? {
        return Ok(existing);
    }
    store
        .update(user_id, &|current| Ok(current.unwrap_or_else(&create)))
        .await
}
