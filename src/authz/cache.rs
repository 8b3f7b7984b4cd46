//! Read-through cache for action and resource type metadata.
//!
//! Every key family lives in its own `DashMap` so lookups from concurrent
//! compilations never contend on a global lock. Entries expire after
//! `ttl + jitter()`; the jitter function is injected so tests can pin it.
//! Concurrent misses on the same key may each hit the source, loads are
//! plain reads so the duplicate work is harmless.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::authz::errors::{AuthzError, LookupError};
use crate::authz::types::{Action, ActionDetail, ResourceType};
use crate::errors::HubError;
use crate::settings;

/// Authoritative metadata store behind the cache.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn action_by_pk(&self, pk: i64) -> Result<Option<Action>, HubError>;

    async fn action_detail(
        &self,
        system: &str,
        action_id: &str,
    ) -> Result<Option<ActionDetail>, HubError>;

    async fn resource_type_pk(&self, system: &str, id: &str) -> Result<Option<i64>, HubError>;

    async fn resource_type_by_pk(&self, pk: i64) -> Result<Option<ResourceType>, HubError>;
}

pub type JitterFn = Arc<dyn Fn() -> Duration + Send + Sync>;

/// Uniform jitter in `[0, max)`.
pub fn random_jitter(max: Duration) -> JitterFn {
    let max_ms = max.as_millis() as u64;
    Arc::new(move || {
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    })
}

pub fn no_jitter() -> JitterFn {
    Arc::new(|| Duration::ZERO)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Action { system: String, id: String },
    ActionPk(i64),
    ResourceType { system: String, id: String },
    ResourceTypePk(i64),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Action { system, id } => write!(f, "action:{}:{}", system, id),
            CacheKey::ActionPk(pk) => write!(f, "action:pk:{}", pk),
            CacheKey::ResourceType { system, id } => write!(f, "resourcetype:{}:{}", system, id),
            CacheKey::ResourceTypePk(pk) => write!(f, "resourcetype:pk:{}", pk),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: Result<V, LookupError>,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct CacheOptions {
    pub enabled: bool,
    pub ttl: Duration,
    pub error_ttl: Duration,
    pub jitter: JitterFn,
}

impl CacheOptions {
    pub fn from_settings(cfg: &settings::Cache) -> Self {
        Self {
            enabled: cfg.enabled,
            ttl: cfg.ttl(),
            error_ttl: cfg.error_ttl(),
            jitter: random_jitter(Duration::from_secs(cfg.jitter_secs)),
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::from_settings(&settings::Cache::default())
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("enabled", &self.enabled)
            .field("ttl", &self.ttl)
            .field("error_ttl", &self.error_ttl)
            .finish_non_exhaustive()
    }
}

pub struct MetadataCache<S> {
    source: S,
    options: CacheOptions,
    actions: DashMap<i64, CachedEntry<Action>>,
    action_details: DashMap<(String, String), CachedEntry<ActionDetail>>,
    resource_type_pks: DashMap<(String, String), CachedEntry<i64>>,
    resource_types: DashMap<i64, CachedEntry<ResourceType>>,
}

impl<S: MetadataSource> MetadataCache<S> {
    pub fn new(source: S, options: CacheOptions) -> Self {
        Self {
            source,
            options,
            actions: DashMap::new(),
            action_details: DashMap::new(),
            resource_type_pks: DashMap::new(),
            resource_types: DashMap::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn action(&self, pk: i64) -> Result<Action, AuthzError> {
        let key = CacheKey::ActionPk(pk);
        let load = self.source.action_by_pk(pk);
        Ok(self.read_through(&self.actions, pk, &key, load).await?)
    }

    pub async fn action_detail(&self, system: &str, action_id: &str) -> Result<ActionDetail, AuthzError> {
        let key = CacheKey::Action {
            system: system.to_string(),
            id: action_id.to_string(),
        };
        let load = self.source.action_detail(system, action_id);
        let map_key = (system.to_string(), action_id.to_string());
        Ok(self
            .read_through(&self.action_details, map_key, &key, load)
            .await?)
    }

    pub async fn resource_type_pk(&self, system: &str, id: &str) -> Result<i64, AuthzError> {
        let key = CacheKey::ResourceType {
            system: system.to_string(),
            id: id.to_string(),
        };
        let load = self.source.resource_type_pk(system, id);
        let map_key = (system.to_string(), id.to_string());
        Ok(self
            .read_through(&self.resource_type_pks, map_key, &key, load)
            .await?)
    }

    pub async fn resource_type(&self, pk: i64) -> Result<ResourceType, AuthzError> {
        let key = CacheKey::ResourceTypePk(pk);
        let load = self.source.resource_type_by_pk(pk);
        Ok(self
            .read_through(&self.resource_types, pk, &key, load)
            .await?)
    }

    async fn read_through<K, V, F>(
        &self,
        map: &DashMap<K, CachedEntry<V>>,
        map_key: K,
        key: &CacheKey,
        load: F,
    ) -> Result<V, LookupError>
    where
        K: Eq + Hash,
        V: Clone,
        F: Future<Output = Result<Option<V>, HubError>>,
    {
        if !self.options.enabled {
            return resolve(key, load.await);
        }

        let now = Instant::now();
        let cached = map
            .get(&map_key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone());
        if let Some(value) = cached {
            return value;
        }

        let value = resolve(key, load.await);
        let ttl = match &value {
            Ok(_) => self.options.ttl + (self.options.jitter)(),
            Err(_) => self.options.error_ttl,
        };
        map.insert(
            map_key,
            CachedEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        value
    }

    /// Drops a single entry.
    pub fn invalidate(&self, key: &CacheKey) {
        match key {
            CacheKey::Action { system, id } => {
                self.action_details.remove(&(system.clone(), id.clone()));
            }
            CacheKey::ActionPk(pk) => {
                self.actions.remove(pk);
            }
            CacheKey::ResourceType { system, id } => {
                self.resource_type_pks.remove(&(system.clone(), id.clone()));
            }
            CacheKey::ResourceTypePk(pk) => {
                self.resource_types.remove(pk);
            }
        }
        tracing::debug!(key = %key, "metadata cache entry invalidated");
    }

    /// Drops every entry describing the given action, by id and by pk.
    /// Drops the action's entries. Cached failures of the pk family go too,
    /// a pk that missed before may belong to this action now.
    pub fn invalidate_action(&self, system: &str, action_id: &str) {
        self.action_details
            .remove(&(system.to_string(), action_id.to_string()));
        self.actions.retain(|_, entry| match &entry.value {
            Ok(action) => !(action.system == system && action.id == action_id),
            Err(_) => false,
        });
        tracing::debug!(system, action_id, "action metadata invalidated");
    }

    pub fn invalidate_resource_type(&self, system: &str, id: &str) {
        self.resource_type_pks
            .remove(&(system.to_string(), id.to_string()));
        self.resource_types.retain(|_, entry| match &entry.value {
            Ok(rt) => !(rt.system == system && rt.id == id),
            Err(_) => false,
        });
        tracing::debug!(system, resource_type_id = id, "resource type metadata invalidated");
    }

    pub fn clear(&self) {
        self.actions.clear();
        self.action_details.clear();
        self.resource_type_pks.clear();
        self.resource_types.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
            + self.action_details.len()
            + self.resource_type_pks.len()
            + self.resource_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn resolve<V>(key: &CacheKey, loaded: Result<Option<V>, HubError>) -> Result<V, LookupError> {
    match loaded {
        Ok(Some(v)) => Ok(v),
        Ok(None) => Err(LookupError::NotFound {
            key: key.to_string(),
        }),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "metadata lookup failed");
            Err(LookupError::Backend {
                key: key.to_string(),
                message: e.to_string(),
            })
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn source() -> FakeSource {
        let src = FakeSource::default();
        src.add_resource_type(1, "sys", "host");
        src.add_action(10, "sys", "view_host", &[("sys", "host")]);
        src
    }

    #[test]
    fn cache_key_rendering() {
        assert_eq!(
            CacheKey::Action {
                system: "bk_cmdb".into(),
                id: "view_host".into()
            }
            .to_string(),
            "action:bk_cmdb:view_host"
        );
        assert_eq!(CacheKey::ActionPk(7).to_string(), "action:pk:7");
        assert_eq!(
            CacheKey::ResourceType {
                system: "bk_cmdb".into(),
                id: "host".into()
            }
            .to_string(),
            "resourcetype:bk_cmdb:host"
        );
        assert_eq!(CacheKey::ResourceTypePk(3).to_string(), "resourcetype:pk:3");
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_memory() {
        let cache = cache_with(source());

        let a = cache.action(10).await.unwrap();
        let b = cache.action(10).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.source().loads(), 1);

        assert_eq!(cache.resource_type_pk("sys", "host").await.unwrap(), 1);
        assert_eq!(cache.resource_type_pk("sys", "host").await.unwrap(), 1);
        assert_eq!(cache.source().loads(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_reloaded() {
        let cache = MetadataCache::new(source(), options(Duration::ZERO));
        cache.resource_type(1).await.unwrap();
        cache.resource_type(1).await.unwrap();
        assert_eq!(cache.source().loads(), 2);
    }

    #[tokio::test]
    async fn jitter_is_added_to_ttl() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let mut opts = options(Duration::ZERO);
        opts.jitter = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Duration::from_secs(60)
        });
        let cache = MetadataCache::new(source(), opts);

        cache.resource_type(1).await.unwrap();
        cache.resource_type(1).await.unwrap();
        // ttl is zero, so only the jitter keeps the entry alive
        assert_eq!(cache.source().loads(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_key_is_reported_and_cached_briefly() {
        let cache = cache_with(source());

        let err = cache.action(99).await.unwrap_err();
        match err {
            AuthzError::Lookup { lookup, source } => {
                assert_eq!(lookup, "action:pk:99");
                assert!(matches!(source, LookupError::NotFound { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(cache.action(99).await.is_err());
        assert_eq!(cache.source().loads(), 1);
    }

    #[tokio::test]
    async fn backend_failure_carries_key_and_message() {
        let src = source();
        *src.fail.lock().unwrap() = true;
        let cache = cache_with(src);

        let err = cache.resource_type_pk("sys", "host").await.unwrap_err();
        match err {
            AuthzError::Lookup {
                source: LookupError::Backend { key, message },
                ..
            } => {
                assert_eq!(key, "resourcetype:sys:host");
                assert!(message.contains("source unavailable"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_cache_always_loads() {
        let mut opts = options(Duration::from_secs(60));
        opts.enabled = false;
        let cache = MetadataCache::new(source(), opts);

        cache.action(10).await.unwrap();
        cache.action(10).await.unwrap();
        assert_eq!(cache.source().loads(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_action_drops_pk_and_detail_entries() {
        let cache = cache_with(source());
        cache.action(10).await.unwrap();
        cache.action_detail("sys", "view_host").await.unwrap();
        cache.resource_type(1).await.unwrap();
        assert_eq!(cache.len(), 3);

        cache.invalidate_action("sys", "view_host");
        assert_eq!(cache.len(), 1);

        cache.action(10).await.unwrap();
        assert_eq!(cache.source().loads(), 4);
    }

    #[tokio::test]
    async fn invalidation_forgets_cached_misses_by_pk() {
        let cache = cache_with(source());
        assert!(cache.action(99).await.is_err());
        assert!(cache.resource_type(98).await.is_err());

        cache.source().add_resource_type(98, "sys", "rack");
        cache.source().add_action(99, "sys", "new_action", &[("sys", "rack")]);
        // still served from the cached miss
        assert!(cache.action(99).await.is_err());

        cache.invalidate_action("sys", "new_action");
        assert_eq!(cache.action(99).await.unwrap().id, "new_action");

        cache.invalidate_resource_type("sys", "rack");
        assert_eq!(cache.resource_type(98).await.unwrap().id, "rack");
    }

    #[tokio::test]
    async fn invalidate_single_key_and_clear() {
        let cache = cache_with(source());
        cache.resource_type(1).await.unwrap();
        cache.resource_type_pk("sys", "host").await.unwrap();

        cache.invalidate(&CacheKey::ResourceTypePk(1));
        assert_eq!(cache.len(), 1);

        cache.invalidate_resource_type("sys", "host");
        assert!(cache.is_empty());

        cache.action(10).await.unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
