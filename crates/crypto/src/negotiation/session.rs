//! [`SessionStore`]: negotiated sessions by `x_session_id`.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::debug;

use super::{KeyExchangeResult, NegotiationError};

/// Async map of live sessions.
///
/// Expired entries stay until the next insert prunes them; until then `get`
/// reports them as [`NegotiationError::Expired`] so the caller knows to
/// renegotiate.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Arc<KeyExchangeResult>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) a result under its session id, dropping every
    /// expired entry first.
    pub async fn insert(&self, result: KeyExchangeResult) -> Arc<KeyExchangeResult> {
        let result = Arc::new(result);
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, r| !r.is_expired());
        let pruned = before - map.len();
        if pruned > 0 {
            debug!(pruned, "expired sessions removed");
        }
        map.insert(result.x_session_id().to_owned(), Arc::clone(&result));
        result
    }

    /// Look up a live session.
    ///
    /// # Errors
    ///
    /// [`NegotiationError::UnknownSession`] if absent,
    /// [`NegotiationError::Expired`] once past its expiry.
    pub async fn get(
        &self,
        x_session_id: &str,
    ) -> Result<Arc<KeyExchangeResult>, NegotiationError> {
        let lock = self.inner.read().await;
        let result = lock
            .get(x_session_id)
            .cloned()
            .ok_or_else(|| NegotiationError::UnknownSession(x_session_id.to_owned()))?;
        if result.is_expired() {
            return Err(NegotiationError::Expired(x_session_id.to_owned()));
        }
        Ok(result)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, expire_time: i64) -> KeyExchangeResult {
        KeyExchangeResult::new("pk", id, &[1; 32], &[2; 16], 256, expire_time)
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = SessionStore::new();
        assert!(store.is_empty().await);
        store.insert(result("s1", i64::MAX)).await;
        assert_eq!(store.get("s1").await.unwrap().local_key(), &[1; 32]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_session() {
        let store = SessionStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(NegotiationError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn expired_session_is_reported_and_replaceable() {
        let store = SessionStore::new();
        store.insert(result("s1", 0)).await;
        assert!(matches!(
            store.get("s1").await,
            Err(NegotiationError::Expired(_))
        ));

        store.insert(result("s1", i64::MAX)).await;
        assert!(store.get("s1").await.is_ok());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn insert_prunes_expired_sessions() {
        let store = SessionStore::new();
        for i in 0..1000 {
            store.insert(result(&format!("old-{i}"), 0)).await;
        }
        store.insert(result("fresh", i64::MAX)).await;
        assert_eq!(store.len().await, 1);
        assert!(matches!(
            store.get("old-7").await,
            Err(NegotiationError::UnknownSession(_))
        ));
        assert!(store.get("fresh").await.is_ok());
    }
}
