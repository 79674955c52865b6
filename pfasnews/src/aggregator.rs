use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use common::CacheConfig;
use futures::future::try_join_all;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::FetchError;
use crate::ingestion::{FeedFetcher, RawEntry};
use crate::registry::FeedRegistry;

/// One entry of the aggregated list, as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    #[serde(rename = "pubDate", serialize_with = "iso_millis")]
    pub pub_date: DateTime<Utc>,
}

fn iso_millis<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl NewsItem {
    /// Map a raw entry. The date falls back from `published` to `updated` to `now`,
    /// so undated entries sort as the most recent ones.
    fn from_raw(entry: RawEntry, now: DateTime<Utc>) -> Option<Self> {
        let link = entry.link?;
        let pub_date = entry.published.or(entry.updated).unwrap_or(now);
        Some(Self {
            title: entry.title.unwrap_or_default(),
            link,
            pub_date: pub_date.trunc_subsecs(3),
        })
    }
}

/// Fans a scope out to its feed sources and merges the results.
pub struct Aggregator {
    registry: Arc<FeedRegistry>,
    fetcher: Arc<dyn FeedFetcher>,
    clock: Arc<dyn Clock>,
    max_items: usize,
    parallel: bool,
}

impl Aggregator {
    pub fn new(
        registry: Arc<FeedRegistry>,
        fetcher: Arc<dyn FeedFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            clock,
            max_items: CacheConfig::default().max_items,
            parallel: false,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Fetch every source of a scope concurrently. Results are still merged in
    /// registry order.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &FeedRegistry {
        &self.registry
    }

    /// Fetch, merge, dedupe, sort and cap the items of `scope`.
    ///
    /// Any failing source fails the whole aggregation. An unknown scope yields
    /// an empty list; callers validate scopes before getting here.
    pub async fn aggregate(&self, scope: &str) -> Result<Vec<NewsItem>, FetchError> {
        let sources = self.registry.sources_for(scope).unwrap_or_default();

        let batches = if self.parallel {
            try_join_all(sources.iter().map(|url| self.fetcher.fetch(url))).await?
        } else {
            let mut batches = Vec::with_capacity(sources.len());
            for url in sources {
                let entries = self.fetcher.fetch(url).await?;
                debug!(scope, url = %url, entries = entries.len(), "source fetched");
                batches.push(entries);
            }
            batches
        };

        let now = self.clock.now();
        let items = merge(batches, now, self.max_items);
        info!(scope, sources = sources.len(), items = items.len(), "scope aggregated");
        Ok(items)
    }
}

/// Concatenate batches in order, keep the first occurrence of each link,
/// sort newest first (stable) and truncate to `max_items`.
pub fn merge(batches: Vec<Vec<RawEntry>>, now: DateTime<Utc>, max_items: usize) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    let mut items: Vec<NewsItem> = batches
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let item = NewsItem::from_raw(entry, now);
            if item.is_none() {
                debug!("skipping feed entry without a link");
            }
            item
        })
        .filter(|item| seen.insert(item.link.clone()))
        .collect();

    items.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
    items.truncate(max_items);
    items
}
