// Pool metadata cache
// Stale-while-revalidate holder for pool tables. Lookups only take a brief
// read lock and never wait on a fetch; a background task refreshes the value
// on a fixed interval.
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::transport::http::HttpClient;
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info, warn};

/// What a failed refresh does to the cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Keep serving the last good value.
    RetainOnFailure,
    /// Drop the value so lookups see nothing until the next success.
    ClearOnFailure,
}

#[async_trait]
pub trait PoolFetcher<T>: Send + Sync {
    async fn fetch(&self) -> Result<T, AggrError>;
}

/// Serves a fixed table, e.g. pools declared in the chain tables file.
pub struct StaticPoolFetcher<T>(pub T);

#[async_trait]
impl<T: Clone + Send + Sync> PoolFetcher<T> for StaticPoolFetcher<T> {
    async fn fetch(&self) -> Result<T, AggrError> {
        Ok(self.0.clone())
    }
}

/// Loads a pool table from the metadata service.
pub struct HttpPoolFetcher<T> {
    client: HttpClient,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HttpPoolFetcher<T> {
    pub fn new(client: HttpClient, path: impl Into<String>) -> Self {
        Self { client, path: path.into(), _marker: PhantomData }
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> PoolFetcher<T> for HttpPoolFetcher<T> {
    async fn fetch(&self) -> Result<T, AggrError> {
        self.client.get_json(&self.path, "pools").await
    }
}

pub struct PoolCache<T> {
    name: &'static str,
    value: Arc<RwLock<Option<Arc<T>>>>,
    fetcher: Arc<dyn PoolFetcher<T>>,
    policy: RefreshPolicy,
}

impl<T> Clone for PoolCache<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            value: Arc::clone(&self.value),
            fetcher: Arc::clone(&self.fetcher),
            policy: self.policy,
        }
    }
}

impl<T: Send + Sync + 'static> PoolCache<T> {
    pub fn new(name: &'static str, fetcher: Arc<dyn PoolFetcher<T>>, policy: RefreshPolicy) -> Self {
        Self {
            name,
            value: Arc::new(RwLock::new(None)),
            fetcher,
            policy,
        }
    }

    /// Current value, possibly stale. `None` before the first successful
    /// refresh or after a cleared failure.
    pub async fn get(&self) -> Option<Arc<T>> {
        self.value.read().await.clone()
    }

    /// Fetch once and apply the refresh policy on failure.
    pub async fn refresh_now(&self) -> Result<(), AggrError> {
        match self.fetcher.fetch().await {
            Ok(fresh) => {
                *self.value.write().await = Some(Arc::new(fresh));
                debug!(cache = self.name, "pool cache refreshed");
                Ok(())
            }
            Err(err) => {
                if self.policy == RefreshPolicy::ClearOnFailure {
                    *self.value.write().await = None;
                }
                warn!(cache = self.name, policy = ?self.policy, error = %err, "pool cache refresh failed");
                Err(err)
            }
        }
    }

    /// Spawn the periodic refresh. The first tick is skipped; call
    /// [`PoolCache::refresh_now`] to warm the cache at startup.
    pub fn spawn_refresh(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticks = IntervalStream::new(tokio::time::interval(every));
            ticks.next().await;
            info!(cache = cache.name, every_secs = every.as_secs(), "pool cache refresh started");
            while ticks.next().await.is_some() {
                // failures are logged and handled by the policy
                let _ = cache.refresh_now().await;
            }
        })
    }
}

/// Type-erased handle so caches of different pool types can be warmed and
/// scheduled together.
#[async_trait]
pub trait Refresh: Send + Sync {
    fn name(&self) -> &'static str;

    async fn refresh_now(&self) -> Result<(), AggrError>;

    fn spawn_refresh(&self, every: Duration) -> JoinHandle<()>;
}

#[async_trait]
impl<T: Send + Sync + 'static> Refresh for PoolCache<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn refresh_now(&self) -> Result<(), AggrError> {
        PoolCache::refresh_now(self).await
    }

    fn spawn_refresh(&self, every: Duration) -> JoinHandle<()> {
        PoolCache::spawn_refresh(self, every)
    }
}
