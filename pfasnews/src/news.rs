use anyhow::{Context, Result};
use chrono::Duration;
use common::Config;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::aggregator::Aggregator;
use crate::cache::{Items, Lookup, NewsCache};
use crate::clock::{Clock, SystemClock};
use crate::error::NewsError;
use crate::ingestion::HttpFeedFetcher;
use crate::registry::{FeedRegistry, DEFAULT_SCOPE};

/// Request-level orchestration: validate the scope, then serve from the cache
/// or aggregate and store.
#[derive(Clone)]
pub struct NewsService {
    aggregator: Arc<Aggregator>,
    cache: NewsCache,
}

impl NewsService {
    pub fn new(aggregator: Arc<Aggregator>, cache: NewsCache) -> Self {
        Self { aggregator, cache }
    }

    /// Wire the production stack: HTTP fetcher, wall clock, configured registry and TTL.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(FeedRegistry::from_config(&config.scopes));
        let fetcher = Arc::new(HttpFeedFetcher::new(
            config.fetch.timeout_seconds,
            &config.fetch.user_agent,
        )?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ttl = i64::try_from(config.cache.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .context("cache.ttl_seconds is out of range")?;

        info!(
            scopes = ?registry.scopes(),
            ttl_seconds = config.cache.ttl_seconds,
            parallel = config.fetch.parallel,
            "news service configured"
        );

        let aggregator = Aggregator::new(registry, fetcher, clock.clone())
            .with_max_items(config.cache.max_items)
            .with_parallel(config.fetch.parallel);
        Ok(Self::new(Arc::new(aggregator), NewsCache::new(clock, ttl)))
    }

    /// Items for `scope` (default `global` when absent or empty), newest first.
    pub async fn news(&self, scope: Option<&str>) -> Result<Items, NewsError> {
        let scope = scope.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SCOPE);
        let registry = self.aggregator.registry();
        if !registry.contains(scope) {
            warn!(scope, "rejected unknown scope");
            return Err(NewsError::InvalidScope {
                scope: scope.to_string(),
                message: registry.invalid_scope_message(),
            });
        }

        let aggregator = self.aggregator.clone();
        let owned = scope.to_string();
        let (lookup, outcome) = self
            .cache
            .get_or_refresh(scope, move || async move { aggregator.aggregate(&owned).await })
            .await;

        outcome.map_err(|e| {
            if lookup == Lookup::Miss {
                error!(scope, url = e.url(), error = %e, "aggregation failed");
            }
            NewsError::Fetch(e)
        })
    }
}
