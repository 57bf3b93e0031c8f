//! Redis-backed context store for production deployments.
//!
//! Each user is one hash, `{prefix}:{user_id}`. Every top-level field of the
//! stored document is one hash field holding its JSON encoding, so HSET with
//! the record's fields is exactly a top-level merge and fields written by
//! other systems survive.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::domain::foundation::UserId;
use crate::ports::{ContextStore, ContextStoreError, StoredContext};

/// Redis-backed context store.
#[derive(Clone)]
pub struct RedisContextStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    timeout: Duration,
}

impl RedisContextStore {
    pub fn new(conn: MultiplexedConnection, key_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            timeout,
        }
    }

    /// Opens a multiplexed connection to `url`.
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ContextStoreError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = tokio::time::timeout(timeout, client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| ContextStoreError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(unavailable)?;
        Ok(Self::new(conn, key_prefix, timeout))
    }

    fn key(&self, user_id: &UserId) -> String {
        document_key(&self.key_prefix, user_id)
    }

    async fn bounded<T, F>(&self, command: F) -> Result<T, ContextStoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, command).await {
            Ok(result) => result.map_err(unavailable),
            Err(_) => Err(ContextStoreError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl ContextStore for RedisContextStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<StoredContext>, ContextStoreError> {
        let key = self.key(user_id);
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = self.bounded(conn.hgetall(&key)).await?;
        if raw.is_empty() {
            return Ok(None);
        }
        let fields = decode_fields(user_id, raw)?;
        StoredContext::from_fields(user_id, fields).map(Some)
    }

    async fn set(&self, record: StoredContext) -> Result<(), ContextStoreError> {
        let key = self.key(&record.user_id);
        let items = encode_fields(record.to_fields()?)?;
        let mut conn = self.conn.clone();
        self.bounded(conn.hset_multiple::<_, _, _, ()>(&key, &items))
            .await
    }
}

impl std::fmt::Debug for RedisContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisContextStore")
            .field("key_prefix", &self.key_prefix)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn unavailable(err: redis::RedisError) -> ContextStoreError {
    ContextStoreError::Unavailable(err.to_string())
}

fn document_key(prefix: &str, user_id: &UserId) -> String {
    format!("{}:{}", prefix, user_id.as_str())
}

fn encode_fields(fields: Map<String, Value>) -> Result<Vec<(String, String)>, ContextStoreError> {
    fields
        .into_iter()
        .map(|(name, value)| {
            serde_json::to_string(&value)
                .map(|encoded| (name, encoded))
                .map_err(|e| ContextStoreError::Serialization(e.to_string()))
        })
        .collect()
}

fn decode_fields(
    user_id: &UserId,
    raw: HashMap<String, String>,
) -> Result<Map<String, Value>, ContextStoreError> {
    raw.into_iter()
        .map(|(name, encoded)| {
            serde_json::from_str(&encoded)
                .map(|value| (name.clone(), value))
                .map_err(|e| ContextStoreError::Corrupt {
                    user_id: user_id.as_str().to_string(),
                    reason: format!("field {}: {}", name, e),
                })
        })
        .collect()
}
