use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use feed_rs::model::Feed;
use feed_rs::parser;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// The parts of a feed entry the aggregator cares about.
///
/// Dates are kept separate so the caller decides the fallback order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// RSS `pubDate` / Atom `published`
    pub published: Option<DateTime<Utc>>,
    /// Atom `updated`, else the entry's `dc:date`
    pub updated: Option<DateTime<Utc>>,
}

/// Retrieves one feed document and returns its entries.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>, FetchError>;
}

/// Fetches feeds over HTTP and parses them with feed-rs.
/// No retries and no caching happen at this layer.
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let entries = parse_feed(url, bytes.as_ref())?;
        debug!(url, entries = entries.len(), "feed fetched");
        Ok(entries)
    }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

/// Parse an RSS/Atom document into raw entries.
pub fn parse_feed(url: &str, body: &[u8]) -> Result<Vec<RawEntry>, FetchError> {
    let feed = parser::parse(body).map_err(|e| FetchError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let mut entries = entries_from_feed(feed);
    if entries.iter().any(|e| e.updated.is_none()) {
        fill_dc_dates(url, body, &mut entries);
    }
    Ok(entries)
}

fn entries_from_feed(feed: Feed) -> Vec<RawEntry> {
    feed.entries
        .into_iter()
        .map(|entry| RawEntry {
            title: entry.title.map(|t| t.content),
            link: entry.links.into_iter().next().map(|l| l.href),
            published: entry.published,
            updated: entry.updated,
        })
        .collect()
}

/// Copy each entry's `dc:date` into `updated` where feed-rs left it empty.
///
/// Entries are matched by position, so nothing is filled when the element
/// count differs from what feed-rs produced.
fn fill_dc_dates(url: &str, body: &[u8], entries: &mut [RawEntry]) {
    let dates = match dc_dates(body) {
        Ok(dates) => dates,
        Err(e) => {
            debug!(url, error = %e, "skipping dc:date scan");
            return;
        }
    };
    if dates.len() != entries.len() {
        debug!(url, scanned = dates.len(), entries = entries.len(), "dc:date scan out of step");
        return;
    }
    for (entry, date) in entries.iter_mut().zip(dates) {
        if entry.updated.is_none() {
            entry.updated = date;
        }
    }
}

/// One slot per `item`/`entry` element, holding its `dc:date` if present.
fn dc_dates(body: &[u8]) -> Result<Vec<Option<DateTime<Utc>>>, quick_xml::Error> {
    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut dates = Vec::new();
    let mut in_entry = false;
    let mut in_date = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"item" | b"entry" => {
                    in_entry = true;
                    dates.push(None);
                }
                b"dc:date" if in_entry => in_date = true,
                _ => {}
            },
            Event::Empty(e) if matches!(e.name().as_ref(), b"item" | b"entry") => dates.push(None),
            Event::Text(t) if in_date => {
                let text = t.unescape()?;
                if let Some(slot) = dates.last_mut() {
                    if slot.is_none() {
                        *slot = parse_dc_date(&text);
                    }
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"item" | b"entry" => in_entry = false,
                b"dc:date" => in_date = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(dates)
}

/// W3C-DTF as used by Dublin Core: full RFC 3339, minutes-only offsets, or a bare date.
fn parse_dc_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z"))
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}
