//! Short-lived cache of calendar availability.
//!
//! Entries are fresh for the configured TTL. Once expired they are kept
//! around so a failed refresh can still answer with the last known list,
//! until they pass `STALE_RETENTION` TTLs and are swept on the next insert.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::foundation::UserId;
use crate::domain::scheduling::{Slot, SlotQuery};
use crate::ports::ExternalError;

/// How many TTLs an expired entry survives as a fallback.
pub const STALE_RETENTION: u32 = 10;

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    Fresh(V),
    /// Past its TTL, usable only as a fallback.
    Stale(V),
    Missing,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Map with a freshness window per entry.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    retention: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            retention: ttl.saturating_mul(STALE_RETENTION),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Lookup<V> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Lookup::Fresh(entry.value.clone()),
            Some(entry) if entry.stored_at.elapsed() < self.retention => {
                Lookup::Stale(entry.value.clone())
            }
            _ => Lookup::Missing,
        }
    }

    /// Stores `value`, sweeping entries past the retention window.
    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        let retention = self.retention;
        entries.retain(|_, entry| entry.stored_at.elapsed() < retention);
        entries.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops every entry whose key matches.
    pub async fn remove_where(&self, mut matches: impl FnMut(&K) -> bool) {
        self.entries.write().await.retain(|key, _| !matches(key));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AvailabilityKey {
    user: UserId,
    query: SlotQuery,
}

/// Slot lists per user and query.
#[derive(Debug)]
pub struct AvailabilityCache {
    slots: TtlCache<AvailabilityKey, Vec<Slot>>,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: TtlCache::new(ttl),
        }
    }

    /// Returns the cached list while fresh, otherwise calls `fetch`.
    ///
    /// A failed fetch falls back to an expired entry when one exists.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        user: &UserId,
        query: SlotQuery,
        fetch: F,
    ) -> Result<Vec<Slot>, ExternalError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Slot>, ExternalError>>,
    {
        let key = AvailabilityKey {
            user: user.clone(),
            query,
        };
        let stale = match self.slots.get(&key).await {
            Lookup::Fresh(slots) => {
                tracing::debug!(user_id = %user, "availability cache hit");
                return Ok(slots);
            }
            Lookup::Stale(slots) => Some(slots),
            Lookup::Missing => None,
        };
        match fetch().await {
            Ok(slots) => {
                self.slots.insert(key, slots.clone()).await;
                Ok(slots)
            }
            Err(err) => match stale {
                Some(slots) => {
                    tracing::warn!(user_id = %user, error = %err, "serving expired availability");
                    Ok(slots)
                }
                None => Err(err),
            },
        }
    }

    /// Forgets everything cached for `user`.
    pub async fn invalidate_user(&self, user: &UserId) {
        self.slots.remove_where(|key| &key.user == user).await;
        tracing::debug!(user_id = %user, "availability invalidated");
    }
}
