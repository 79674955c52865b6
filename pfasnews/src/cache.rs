use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::aggregator::NewsItem;
use crate::clock::Clock;
use crate::error::FetchError;

/// Items shared between the cache and every response built from it.
pub type Items = Arc<Vec<NewsItem>>;

type Refresh = Shared<BoxFuture<'static, Result<Items, FetchError>>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    items: Items,
    stored_at: DateTime<Utc>,
}

struct Inner {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, Refresh>>,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, Refresh>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fresh(&self, scope: &str) -> Option<Items> {
        let entries = self.entries();
        let entry = entries.get(scope)?;
        if self.clock.now() - entry.stored_at < self.ttl {
            Some(entry.items.clone())
        } else {
            None
        }
    }

    fn store(&self, scope: &str, items: Items) {
        let entry = CacheEntry {
            items,
            stored_at: self.clock.now(),
        };
        self.entries().insert(scope.to_string(), entry);
    }
}

/// Whether a lookup was answered from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

/// In-memory, per-scope cache of aggregated items.
///
/// An entry is fresh while `now - stored_at < ttl`. Entries are only ever
/// replaced, never evicted. Concurrent misses on one scope share a single
/// refresh whose outcome reaches every waiter; failures are not stored.
#[derive(Clone)]
pub struct NewsCache {
    inner: Arc<Inner>,
}

impl NewsCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                ttl,
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Fresh items for `scope`, if any.
    pub fn get(&self, scope: &str) -> Option<Items> {
        self.inner.fresh(scope)
    }

    /// Replace the entry of `scope`, stamped with the current time.
    pub fn put(&self, scope: &str, items: Vec<NewsItem>) {
        self.inner.store(scope, Arc::new(items));
    }

    /// Return fresh items or run `refresh` to produce them.
    ///
    /// When a refresh for `scope` is already running, this call waits for it
    /// instead of starting another one.
    pub async fn get_or_refresh<F, Fut>(&self, scope: &str, refresh: F) -> (Lookup, Result<Items, FetchError>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<NewsItem>, FetchError>> + Send + 'static,
    {
        if let Some(items) = self.get(scope) {
            debug!(scope, "cache hit");
            return (Lookup::Hit, Ok(items));
        }

        let pending = {
            let mut in_flight = self.inner.in_flight();
            match in_flight.get(scope) {
                Some(pending) => {
                    debug!(scope, "joining in-flight refresh");
                    pending.clone()
                }
                None => {
                    // Re-check under the lock: a refresh may have finished between
                    // the first lookup and here.
                    if let Some(items) = self.get(scope) {
                        return (Lookup::Hit, Ok(items));
                    }
                    info!(scope, "cache miss, refreshing");
                    let pending = self.spawn_refresh(scope, refresh());
                    in_flight.insert(scope.to_string(), pending.clone());
                    pending
                }
            }
        };

        (Lookup::Miss, pending.await)
    }

    fn spawn_refresh<Fut>(&self, scope: &str, refresh: Fut) -> Refresh
    where
        Fut: Future<Output = Result<Vec<NewsItem>, FetchError>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let scope = scope.to_string();
        async move {
            let outcome = refresh.await.map(Arc::new);
            if let Ok(items) = &outcome {
                inner.store(&scope, items.clone());
            }
            inner.in_flight().remove(&scope);
            outcome
        }
        .boxed()
        .shared()
    }
}
