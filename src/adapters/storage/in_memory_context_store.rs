//! In-Memory Context Store Adapter
//!
//! Keeps each user's document as a JSON field map. Useful for testing and
//! development; everything is lost on restart.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::UserId;
use crate::ports::{ContextStore, ContextStoreError, StoredContext};

/// In-memory storage for conversation contexts
#[derive(Debug, Clone, Default)]
pub struct InMemoryContextStore {
    documents: Arc<RwLock<HashMap<UserId, Map<String, Value>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryContextStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes raw fields, merged like `set`, bypassing the typed record.
    ///
    /// Lets tests plant documents written by other systems or corrupt ones.
    pub async fn insert_raw(&self, user_id: &UserId, fields: Map<String, Value>) {
        let mut documents = self.documents.write().await;
        documents.entry(user_id.clone()).or_default().extend(fields);
    }

    /// Raw stored fields for a user
    pub async fn raw(&self, user_id: &UserId) -> Option<Map<String, Value>> {
        self.documents.read().await.get(user_id).cloned()
    }

    /// Makes every call fail as if the store were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Get the number of stored documents
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), ContextStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ContextStoreError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<StoredContext>, ContextStoreError> {
        self.check_available()?;
        let fields = self.documents.read().await.get(user_id).cloned();
        fields
            .map(|fields| StoredContext::from_fields(user_id, fields))
            .transpose()
    }

    async fn set(&self, record: StoredContext) -> Result<(), ContextStoreError> {
        self.check_available()?;
        let fields = record.to_fields()?;
        let mut documents = self.documents.write().await;
        documents.entry(record.user_id).or_default().extend(fields);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::{ConversationContext, TurnRole};
    use serde_json::json;

    fn user() -> UserId {
        UserId::new("+56911112222").unwrap()
    }

    #[tokio::test]
    async fn unknown_user_loads_none() {
        let store = InMemoryContextStore::new();
        assert!(store.get(&user()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_restores_context() {
        let store = InMemoryContextStore::new();
        let mut ctx = ConversationContext::new(user());
        ctx.record_turn(TurnRole::User, "hola", 10);

        store.set(StoredContext::from_context(&ctx).unwrap()).await.unwrap();

        let loaded = store.get(&user()).await.unwrap().unwrap().into_context().unwrap();
        assert_eq!(loaded, ctx);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn set_keeps_fields_it_does_not_know() {
        let store = InMemoryContextStore::new();
        let mut extra = Map::new();
        extra.insert("crm_tag".to_string(), json!("vip"));
        store.insert_raw(&user(), extra).await;

        let ctx = ConversationContext::new(user());
        store.set(StoredContext::from_context(&ctx).unwrap()).await.unwrap();

        let raw = store.raw(&user()).await.unwrap();
        assert_eq!(raw.get("crm_tag"), Some(&json!("vip")));
        assert_eq!(raw.get("workflow"), Some(&json!("none")));
    }

    #[tokio::test]
    async fn switched_off_store_is_retryable() {
        let store = InMemoryContextStore::new();
        store.set_unavailable(true);
        let err = store.get(&user()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
