//! Action registry and executor cache
//!
//! The engine resolves `f_id`s through an injected [`ActionRegistry`].
//! Loading may be slow (plugins, remote modules), so the graph keeps an
//! [`ExecutorCache`] in front of it.

use crate::config::GraphConfig;
use crate::error::{ProvenanceError, RegistryError};
use crate::executor::Executor;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use moka::future::Cache;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Resolves action ids to executors
#[async_trait]
pub trait ActionRegistry: Send + Sync {
    /// Load the executor for `f_id`
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownActionId`] for ids the registry does
    /// not know, [`RegistryError::LoadFailed`] if loading fails
    async fn load(&self, f_id: &str) -> Result<Arc<dyn Executor>, RegistryError>;
}

/// Future returned by executor loaders
pub type LoadFuture = BoxFuture<'static, anyhow::Result<Arc<dyn Executor>>>;

type Loader = Arc<dyn Fn() -> LoadFuture + Send + Sync>;

/// In-process registry of executors and executor loaders
#[derive(Default)]
pub struct StaticActionRegistry {
    loaders: DashMap<String, Loader>,
}

impl StaticActionRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready executor
    pub fn register<E>(&self, f_id: impl Into<String>, executor: E)
    where
        E: Executor + 'static,
    {
        let executor: Arc<dyn Executor> = Arc::new(executor);
        self.loaders.insert(
            f_id.into(),
            Arc::new(move || {
                let executor = Arc::clone(&executor);
                Box::pin(async move { Ok::<_, anyhow::Error>(executor) }) as LoadFuture
            }),
        );
    }

    /// Register a loader, invoked on every [`load`](ActionRegistry::load)
    pub fn register_loader<F, Fut>(&self, f_id: impl Into<String>, loader: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Arc<dyn Executor>>> + Send + 'static,
    {
        self.loaders
            .insert(f_id.into(), Arc::new(move || Box::pin(loader()) as LoadFuture));
    }

    /// Check if an id is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, f_id: &str) -> bool {
        self.loaders.contains_key(f_id)
    }

    /// Registered ids, unordered
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.loaders.iter().map(|e| e.key().clone()).collect()
    }

    /// Get number of registered ids
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl fmt::Debug for StaticActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticActionRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

#[async_trait]
impl ActionRegistry for StaticActionRegistry {
    async fn load(&self, f_id: &str) -> Result<Arc<dyn Executor>, RegistryError> {
        // Clone the loader out so no map guard lives across the await
        let loader = self
            .loaders
            .get(f_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| RegistryError::UnknownActionId(f_id.to_owned()))?;
        loader().await.map_err(|e| RegistryError::load_failed(f_id, e))
    }
}

/// Executor cache keyed by action id
///
/// Concurrent lookups of the same id share one registry load. Failed loads
/// are not cached.
#[derive(Clone)]
pub struct ExecutorCache {
    registry: Arc<dyn ActionRegistry>,
    inner: Cache<String, Arc<dyn Executor>>,
}

impl ExecutorCache {
    /// Create cache in front of `registry`
    #[must_use]
    pub fn new(registry: Arc<dyn ActionRegistry>, config: &GraphConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.executor_cache_capacity);
        if let Some(ttl) = config.executor_cache_ttl() {
            builder = builder.time_to_live(ttl);
        }
        Self {
            registry,
            inner: builder.build(),
        }
    }

    /// Get or load the executor for `f_id`
    ///
    /// # Errors
    /// Returns error if the registry cannot resolve the id
    pub async fn get(&self, f_id: &str) -> Result<Arc<dyn Executor>, ProvenanceError> {
        let registry = Arc::clone(&self.registry);
        let key = f_id.to_owned();
        self.inner
            .try_get_with(key, async move {
                tracing::debug!(f_id, "loading executor");
                registry.load(f_id).await
            })
            .await
            .map_err(|e| ProvenanceError::from_registry(f_id, e))
    }

    /// Drop a cached executor
    pub async fn invalidate(&self, f_id: &str) {
        self.inner.invalidate(f_id).await;
    }

    /// Drop all cached executors
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Get approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl fmt::Debug for ExecutorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorCache")
            .field("entry_count", &self.inner.entry_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CmdResult, ExecContext};
    use retrace_model::ObjectRef;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Noop;

    #[async_trait]
    impl Executor for Noop {
        async fn execute(&self, _: &[ObjectRef], _: &Value, _: &ExecContext) -> anyhow::Result<CmdResult> {
            Ok(CmdResult::new())
        }
    }

    #[tokio::test]
    async fn unknown_id_is_reported() {
        let registry = StaticActionRegistry::new();
        let err = registry.load("missing").await.err().unwrap();
        assert!(matches!(err, RegistryError::UnknownActionId(ref id) if id == "missing"));
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let registry = StaticActionRegistry::new();
        let counter = Arc::clone(&loads);
        registry.register_loader("slow", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Arc::new(Noop) as Arc<dyn Executor>)
            }
        });

        let cache = ExecutorCache::new(Arc::new(registry), &GraphConfig::default());
        let lookups = (0..8).map(|_| cache.get("slow"));
        let results = futures::future::join_all(lookups).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_loads_are_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let registry = StaticActionRegistry::new();
        let counter = Arc::clone(&attempts);
        registry.register_loader("flaky", move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    anyhow::bail!("first load fails");
                }
                Ok(Arc::new(Noop) as Arc<dyn Executor>)
            }
        });

        let cache = ExecutorCache::new(Arc::new(registry), &GraphConfig::default());
        let first = cache.get("flaky").await;
        assert!(matches!(first, Err(ProvenanceError::ExecutorLoadFailed { .. })));
        assert!(cache.get("flaky").await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
