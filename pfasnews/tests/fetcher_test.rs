use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pfasnews::aggregator::Aggregator;
use pfasnews::clock::ManualClock;
use pfasnews::error::FetchError;
use pfasnews::ingestion::{FeedFetcher, HttpFeedFetcher};
use pfasnews::registry::FeedRegistry;

fn rss(items: &[(&str, &str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, link, date)| {
            format!(
                "<item><title>{}</title><link>{}</link><pubDate>{}</pubDate></item>",
                title, link, date
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>t</title><link>https://example.com</link><description>d</description>{}</channel></rss>"#,
        body
    )
}

fn fetcher() -> HttpFeedFetcher {
    HttpFeedFetcher::new(5, "pfasnews-test").expect("build fetcher")
}

#[tokio::test]
async fn fetches_and_parses_rss_over_http() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(rss(&[
            ("PFAS limits tightened", "https://news.example/limits", "Mon, 01 Jan 2024 09:00:00 GMT"),
            ("Water testing expands", "https://news.example/testing", "Tue, 02 Jan 2024 09:00:00 GMT"),
        ]))
        .expect(1)
        .create_async()
        .await;

    let entries = fetcher()
        .fetch(&format!("{}/feed", server.url()))
        .await
        .expect("fetch ok");

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].title.as_deref(), Some("PFAS limits tightened"));
    assert_eq!(entries[1].link.as_deref(), Some("https://news.example/testing"));
    mock.assert_async().await;
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing")
        .with_status(404)
        .create_async()
        .await;

    let err = fetcher()
        .fetch(&format!("{}/missing", server.url()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn malformed_body_is_a_parse_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/broken")
        .with_status(200)
        .with_body("this is not xml")
        .create_async()
        .await;

    let err = fetcher()
        .fetch(&format!("{}/broken", server.url()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Parse { .. }));
}

#[tokio::test]
async fn unreachable_host_is_a_request_error() {
    // port 9 (discard) is closed on test machines
    let err = fetcher().fetch("http://127.0.0.1:9/feed").await.unwrap_err();
    assert!(matches!(err, FetchError::Request { .. }), "got {:?}", err);
    assert_eq!(err.url(), "http://127.0.0.1:9/feed");
}

#[tokio::test]
async fn slow_feed_hits_the_timeout() {
    let mut server = mockito::Server::new_async().await;
    let _slow = server
        .mock("GET", "/slow")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_secs(3));
            w.write_all(b"<rss/>")
        })
        .create_async()
        .await;

    let url = format!("{}/slow", server.url());
    let fetcher = HttpFeedFetcher::new(1, "pfasnews-test").expect("build fetcher");
    let started = std::time::Instant::now();
    let err = fetcher.fetch(&url).await.unwrap_err();

    assert!(matches!(err, FetchError::Timeout { .. }), "got {:?}", err);
    assert_eq!(err.url(), url);
    assert!(started.elapsed() < Duration::from_secs(3));
}

async fn aggregate_two_sources(parallel: bool) {
    let mut server = mockito::Server::new_async().await;
    let _first = server
        .mock("GET", "/first")
        .with_status(200)
        .with_body(rss(&[
            ("Shared story (first)", "https://news.example/shared", "Mon, 01 Jan 2024 09:00:00 GMT"),
            ("Only in first", "https://news.example/a", "Wed, 03 Jan 2024 09:00:00 GMT"),
        ]))
        .create_async()
        .await;
    let _second = server
        .mock("GET", "/second")
        .with_status(200)
        .with_body(rss(&[
            ("Shared story (second)", "https://news.example/shared", "Fri, 05 Jan 2024 09:00:00 GMT"),
            ("Only in second", "https://news.example/b", "Thu, 04 Jan 2024 09:00:00 GMT"),
        ]))
        .create_async()
        .await;

    let mut scopes = std::collections::BTreeMap::new();
    scopes.insert(
        "local".to_string(),
        vec![format!("{}/first", server.url()), format!("{}/second", server.url())],
    );
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()));
    let aggregator = Aggregator::new(Arc::new(FeedRegistry::new(scopes)), Arc::new(fetcher()), clock)
        .with_parallel(parallel);

    let items = aggregator.aggregate("local").await.expect("aggregate");
    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        ["Only in second", "Only in first", "Shared story (first)"],
        "parallel = {}",
        parallel
    );
}

#[tokio::test]
async fn aggregates_sources_sequentially_with_first_source_precedence() {
    aggregate_two_sources(false).await;
}

#[tokio::test]
async fn parallel_fetch_keeps_registry_order_for_dedup() {
    aggregate_two_sources(true).await;
}

async fn one_failing_source_fails_the_scope(parallel: bool) {
    let mut server = mockito::Server::new_async().await;
    let _ok = server
        .mock("GET", "/ok")
        .with_status(200)
        .with_body(rss(&[("fine", "https://news.example/fine", "Mon, 01 Jan 2024 09:00:00 GMT")]))
        .create_async()
        .await;
    let _down = server
        .mock("GET", "/down")
        .with_status(503)
        .create_async()
        .await;

    let mut scopes = std::collections::BTreeMap::new();
    scopes.insert(
        "mixed".to_string(),
        vec![format!("{}/ok", server.url()), format!("{}/down", server.url())],
    );
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let aggregator = Aggregator::new(Arc::new(FeedRegistry::new(scopes)), Arc::new(fetcher()), clock)
        .with_parallel(parallel);

    let err = aggregator.aggregate("mixed").await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 503, .. }), "parallel = {}", parallel);
    assert!(err.url().ends_with("/down"));
}

#[tokio::test]
async fn sequential_fetch_fails_fast() {
    one_failing_source_fails_the_scope(false).await;
}

#[tokio::test]
async fn parallel_fetch_fails_fast() {
    one_failing_source_fails_the_scope(true).await;
}
