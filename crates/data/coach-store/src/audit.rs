//! Audit sinks for metered actions.
//!
//! Append-only: one record per completed action. The in-memory log also
//! chains each entry to the previous one so tampering is detectable.

use async_trait::async_trait;
use coach_core::{AuditRecord, Error, Result, UserId};
use mongodb::{Collection, Database};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Chain hash of the (empty) log before its first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Append-only sink for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<()>;
}

/// Discards everything
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn append(&self, _record: &AuditRecord) -> Result<()> {
        Ok(())
    }
}

/// A record plus its position in the hash chain
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub record: AuditRecord,
    /// SHA256 of the record's JSON
    pub record_hash: String,
    /// SHA256(prev_chain_hash + record_hash)
    pub chain_hash: String,
}

struct ChainState {
    entries: VecDeque<AuditEntry>,
    /// Chain hash just before the oldest retained entry
    base_hash: String,
    last_hash: String,
}

/// Bounded in-memory audit log
pub struct MemoryAuditLog {
    state: Mutex<ChainState>,
    max_entries: usize,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Keep at most `max_entries`, dropping the oldest first
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(ChainState {
                entries: VecDeque::new(),
                base_hash: GENESIS_HASH.to_string(),
                last_hash: GENESIS_HASH.to_string(),
            }),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn last_hash(&self) -> String {
        self.state.lock().await.last_hash.clone()
    }

    /// Most recent entries first
    pub async fn recent(&self, count: usize) -> Vec<AuditEntry> {
        let state = self.state.lock().await;
        state.entries.iter().rev().take(count).cloned().collect()
    }

    /// Records for one user, oldest first
    pub async fn for_user(&self, user_id: &UserId) -> Vec<AuditRecord> {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .filter(|e| &e.record.user_id == user_id)
            .map(|e| e.record.clone())
            .collect()
    }

    /// Recompute every hash from the oldest retained entry forward
    pub async fn verify_chain(&self) -> bool {
        let state = self.state.lock().await;
        let mut prev = state.base_hash.clone();
        for entry in &state.entries {
            let Ok(record_hash) = hash_record(&entry.record) else {
                return false;
            };
            if record_hash != entry.record_hash || chain_hash(&prev, &record_hash) != entry.chain_hash {
                return false;
            }
            prev = entry.chain_hash.clone();
        }
        prev == state.last_hash
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let record_hash = hash_record(record)?;
        let mut state = self.state.lock().await;
        let chain = chain_hash(&state.last_hash, &record_hash);

        state.entries.push_back(AuditEntry {
            record: record.clone(),
            record_hash,
            chain_hash: chain.clone(),
        });
        state.last_hash = chain;

        while state.entries.len() > self.max_entries {
            if let Some(dropped) = state.entries.pop_front() {
                state.base_hash = dropped.chain_hash;
            }
        }
        Ok(())
    }
}

/// Writes records to the `ai_conversations` collection
pub struct MongoAuditLog {
    collection: Collection<AuditRecord>,
}

impl MongoAuditLog {
    pub const COLLECTION: &'static str = "ai_conversations";

    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(Self::COLLECTION),
        }
    }
}

#[async_trait]
impl AuditSink for MongoAuditLog {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        self.collection
            .insert_one(record)
            .await
            .map_err(|e| Error::Store(format!("audit insert failed: {}", e)))?;
        Ok(())
    }
}

fn hash_record(record: &AuditRecord) -> Result<String> {
    let json = serde_json::to_vec(record)
        .map_err(|e| Error::Store(format!("audit record not serializable: {}", e)))?;
    Ok(hex::encode(Sha256::digest(&json)))
}

fn chain_hash(prev_hash: &str, record_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(record_hash.as_bytes());
    hex::encode(hasher.finalize())
}
