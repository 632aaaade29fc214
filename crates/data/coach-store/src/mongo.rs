//! MongoDB store.
//!
//! Each user's record lives in one document `{_id, version, state, updated_at}`.
//! Updates replace the document only if `version` is unchanged since it was
//! read, and retry otherwise.

use crate::{Record, StateStore};
use async_trait::async_trait;
use bson::doc;
use coach_core::{Error, Result, UserId};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};

/// Give up after this many lost compare-and-swap races
const MAX_CAS_ATTEMPTS: usize = 16;

/// Mongo duplicate key error code
const DUPLICATE_KEY: i32 = 11000;

/// Connect and select a database
pub async fn connect(uri: &str, database: &str) -> Result<Database> {
    let client = Client::with_uri_str(uri)
        .await
        .map_err(|e| Error::Store(format!("mongodb connect failed: {}", e)))?;
    tracing::info!(database, "connected to mongodb");
    Ok(client.database(database))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    pub(crate) version: i64,
    pub(crate) state: T,
    pub(crate) updated_at: bson::DateTime,
}

impl<T> Envelope<T> {
    fn new(user_id: &UserId, version: i64, state: T) -> Self {
        Self {
            id: user_id.as_str().to_string(),
            version,
            state,
            updated_at: bson::DateTime::now(),
        }
    }
}

/// Store backed by one MongoDB collection per record type
pub struct MongoStore<T: Record> {
    collection: Collection<Envelope<T>>,
}

impl<T: Record> MongoStore<T> {
    /// Use the record type's default collection
    pub fn new(database: &Database) -> Self {
        Self::with_collection(database, T::COLLECTION)
    }

    pub fn with_collection(database: &Database, name: &str) -> Self {
        Self {
            collection: database.collection(name),
        }
    }

    async fn fetch(&self, user_id: &UserId) -> Result<Option<Envelope<T>>> {
        self.collection
            .find_one(doc! { "_id": user_id.as_str() })
            .await
            .map_err(|e| store_error("find", e))
    }
}

#[async_trait]
impl<T: Record> StateStore<T> for MongoStore<T> {
    async fn load(&self, user_id: &UserId) -> Result<Option<T>> {
        Ok(self.fetch(user_id).await?.map(|env| env.state))
    }

    async fn store(&self, user_id: &UserId, record: &T) -> Result<()> {
        let record = record.clone();
        self.update(user_id, &move |_| Ok(record.clone())).await?;
        Ok(())
    }

    async fn update(
        &self,
        user_id: &UserId,
        apply: &(dyn Fn(Option<T>) -> Result<T> + Send + Sync),
    ) -> Result<T> {
        for attempt in 0..MAX_CAS_ATTEMPTS {
            match self.fetch(user_id).await? {
                None => {
                    let next = apply(None)?;
                    let envelope = Envelope::new(user_id, 0, next.clone());
                    match self.collection.insert_one(&envelope).await {
                        Ok(_) => return Ok(next),
                        Err(e) if is_duplicate_key(&e) => {
                            tracing::debug!(user = %user_id, attempt, "concurrent create, retrying");
                        }
                        Err(e) => return Err(store_error("insert", e)),
                    }
                }
                Some(current) => {
                    let next = apply(Some(current.state.clone()))?;
                    if next == current.state {
                        return Ok(next);
                    }

                    let replacement = Envelope::new(user_id, current.version + 1, next.clone());
                    let result = self
                        .collection
                        .replace_one(
                            doc! { "_id": user_id.as_str(), "version": current.version },
                            &replacement,
                        )
                        .await
                        .map_err(|e| store_error("replace", e))?;

                    if result.matched_count == 1 {
                        return Ok(next);
                    }
                    tracing::debug!(user = %user_id, attempt, "version conflict, retrying");
                }
            }
        }

        tracing::warn!(user = %user_id, collection = T::COLLECTION, "update abandoned after repeated conflicts");
        Err(Error::Store(format!(
            "update for {} lost {} consecutive races",
            user_id, MAX_CAS_ATTEMPTS
        )))
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

fn store_error(op: &str, err: mongodb::error::Error) -> Error {
    Error::Store(format!("mongodb {} failed: {}", op, err))
}
