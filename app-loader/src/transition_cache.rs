// app-loader/src/transition_cache.rs
use common::{Account, AuthTransition};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LoaderError, LoaderResult, StoreError};
use crate::store::KeyValueStore;

/// Default lifetime of both key shapes
pub const TRANSITION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Composite key for the fast path: `account::appUrlWithoutQuery`, always
/// ending in `/` so mail and calendar variants of one app share a session
pub fn auth_key(account: &Account, app_url: &str) -> String {
    let without_query = app_url.split_once('?').map_or(app_url, |(base, _)| base);
    if without_query.ends_with('/') {
        format!("{}::{}", account.name, without_query)
    } else {
        format!("{}::{}/", account.name, without_query)
    }
}

/// Transitions stored under their own id and under the account/app key
#[derive(Clone)]
pub struct TransitionCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl TransitionCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, TRANSITION_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Previously cached transition for this account and app. Store failures
    /// are logged and reported as a miss.
    pub async fn lookup(&self, account: &Account, app_url: &str) -> Option<AuthTransition> {
        let key = auth_key(account, app_url);
        let json = match self.store.get(&key).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Error looking up auth transition {}: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(transition) => Some(transition),
            Err(e) => {
                tracing::error!("Discarding undecodable auth transition {}: {}", key, e);
                None
            }
        }
    }

    /// Write the transition under its id and under the account/app key.
    ///
    /// The id entry is create-if-absent, so a concurrent writer can never
    /// clobber it. The account/app entry is replaced so the newest session
    /// wins the fast path. Any store error fails the whole write.
    pub async fn store(
        &self,
        account: &Account,
        app_url: &str,
        transition: &AuthTransition,
    ) -> LoaderResult<()> {
        let json = serde_json::to_string(transition)
            .map_err(|e| LoaderError::CacheWrite(StoreError::from(e)))?;
        let key = auth_key(account, app_url);

        let created = self
            .store
            .set_if_absent(&transition.uuid, &json, self.ttl)
            .await
            .map_err(LoaderError::CacheWrite)?;
        if !created {
            tracing::warn!("Auth transition {} already exists, keeping the original", transition.uuid);
        }

        self.store.delete(&key).await.map_err(LoaderError::CacheWrite)?;
        let indexed = self
            .store
            .set_if_absent(&key, &json, self.ttl)
            .await
            .map_err(LoaderError::CacheWrite)?;
        if !indexed {
            tracing::debug!("Lost race indexing {}, a concurrent login got there first", key);
        }

        tracing::info!("Cached auth transition {} for {}", transition.uuid, key);
        Ok(())
    }

    /// Drop a transition that no longer logs the user in
    pub async fn invalidate(&self, transition: &AuthTransition) {
        match self.store.delete(&transition.uuid).await {
            Ok(_) => tracing::info!("Invalidated auth transition {}", transition.uuid),
            Err(e) => tracing::error!("Error invalidating auth transition {}: {}", transition.uuid, e),
        }
    }

    /// Fetch a transition by id for replay
    pub async fn get(&self, uuid: &str) -> LoaderResult<Option<AuthTransition>> {
        let json = self.store.get(uuid).await.map_err(LoaderError::Cache)?;
        json.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| LoaderError::Cache(StoreError::from(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use common::StoredCookie;

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    fn alice() -> Account {
        Account::new("alice", "wonderland")
    }

    fn transition() -> AuthTransition {
        AuthTransition::new(
            "https://cloud.example.com/roundcube/",
            vec![StoredCookie::new("roundcube_sessid", "abc")],
        )
    }

    #[test]
    fn test_auth_key_strips_query_and_normalises_slash() {
        assert_eq!(
            auth_key(&alice(), "https://cloud.example.com/roundcube/?_task=calendar"),
            "alice::https://cloud.example.com/roundcube/"
        );
        assert_eq!(
            auth_key(&alice(), "https://cloud.example.com/owncloud"),
            "alice::https://cloud.example.com/owncloud/"
        );
    }

    #[tokio::test]
    async fn test_store_writes_both_keys() {
        let store = Arc::new(MemoryStore::new());
        let cache = TransitionCache::new(store.clone());
        let app_url = "https://cloud.example.com/roundcube/";
        let t = transition();

        cache.store(&alice(), app_url, &t).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(cache.get(&t.uuid).await.unwrap(), Some(t.clone()));
        assert_eq!(cache.lookup(&alice(), app_url).await, Some(t));
    }

    #[tokio::test]
    async fn test_store_never_overwrites_existing_id() {
        let store = Arc::new(MemoryStore::new());
        let cache = TransitionCache::new(store.clone());
        let first = transition();
        let mut second = transition();
        second.uuid = first.uuid.clone();
        second.redirect_uri = "https://cloud.example.com/roundcube/?_task=mail".to_string();

        cache.store(&alice(), "https://cloud.example.com/roundcube/", &first).await.unwrap();
        cache.store(&alice(), "https://cloud.example.com/roundcube/", &second).await.unwrap();

        assert_eq!(cache.get(&first.uuid).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_newest_transition_wins_account_key() {
        let cache = TransitionCache::new(Arc::new(MemoryStore::new()));
        let app_url = "https://cloud.example.com/roundcube/";
        let older = transition();
        let newer = transition();

        cache.store(&alice(), app_url, &older).await.unwrap();
        cache.store(&alice(), app_url, &newer).await.unwrap();

        assert_eq!(cache.lookup(&alice(), app_url).await.map(|t| t.uuid), Some(newer.uuid));
    }

    #[tokio::test]
    async fn test_invalidate_removes_only_id_entry() {
        let store = Arc::new(MemoryStore::new());
        let cache = TransitionCache::new(store.clone());
        let app_url = "https://cloud.example.com/roundcube/";
        let t = transition();
        cache.store(&alice(), app_url, &t).await.unwrap();

        cache.invalidate(&t).await;

        assert!(cache.get(&t.uuid).await.unwrap().is_none());
        assert!(cache.lookup(&alice(), app_url).await.is_some());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_a_miss() {
        let cache = TransitionCache::new(Arc::new(BrokenStore));
        assert!(cache.lookup(&alice(), "https://cloud.example.com/roundcube/").await.is_none());
        // invalidation failures are swallowed too
        cache.invalidate(&transition()).await;
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let cache = TransitionCache::new(Arc::new(BrokenStore));
        let err = cache
            .store(&alice(), "https://cloud.example.com/roundcube/", &transition())
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::CacheWrite(_)));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_if_absent("alice::https://cloud.example.com/roundcube/", "not json", TRANSITION_TTL)
            .await
            .unwrap();
        let cache = TransitionCache::new(store);
        assert!(cache.lookup(&alice(), "https://cloud.example.com/roundcube/").await.is_none());
    }
}
