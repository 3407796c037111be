//! End-to-end crawl scenarios against a mock site.
//!
//! The mock serves the three-section listing pages, detail pages, and the
//! phone-reveal endpoint the way the real site does. Assertions are on set
//! membership, never completion order — items finish in whatever order
//! their fetches resolve.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use turbocrawl_core::checkpoint::{CheckpointStore, CrawlState};
use turbocrawl_core::crawl::{
    CrawlEngine, CrawlOutcome, CrawlReport, EngineOptions, ItemWorker, PageDiscoverer,
};
use turbocrawl_core::fetch::{Fetcher, FetcherConfig, ProxyPool, RateLimiter, RetryPolicy};
use turbocrawl_core::site::TurboDetailExtractor;

/// Listing-index page with the promoted sections the parser must skip.
fn listing_page_html(ids: &[u32]) -> String {
    let cards: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<div class="products-i">
                     <div class="products-i__icon--loan"></div>
                     <a class="products-i__link" href="/autos/{id}-test-car"></a>
                   </div>"#
            )
        })
        .collect();
    format!(
        r#"<html><body>
          <div class="section-title"><p class="section-title_name">VIP ELANLAR</p></div>
          <div class="tz-container"><div class="products">
            <div class="products-i"><a class="products-i__link" href="/autos/999999-vip-car"></a></div>
          </div></div>
          <div class="section-title"><p class="section-title_name">ELANLAR</p></div>
          <div class="tz-container"><div class="products">{cards}</div></div>
        </body></html>"#
    )
}

fn detail_html(id: u32) -> String {
    format!(
        r#"<html><head><meta name="csrf-token" content="tok-{id}"></head><body>
          <h1 class="product-title">Test Car {id}</h1>
          <div class="product-price__i--bold">{id}00 AZN</div>
          <div class="product-properties__i">
            <label class="product-properties__i-name">Marka</label>
            <span class="product-properties__i-value">Test</span>
          </div>
        </body></html>"#
    )
}

/// Mounts an index page at the given page number.
///
/// Page 1 is requested without a `page` query parameter, so its mock has no
/// query matcher; it gets a low priority so the page-specific mocks win for
/// `?page=N` requests.
async fn mount_page(server: &MockServer, page: u32, ids: &[u32]) {
    let body = ResponseTemplate::new(200).set_body_string(listing_page_html(ids));
    if page > 1 {
        Mock::given(method("GET"))
            .and(path("/autos"))
            .and(query_param("page", page.to_string()))
            .respond_with(body)
            .mount(server)
            .await;
    } else {
        Mock::given(method("GET"))
            .and(path("/autos"))
            .respond_with(body)
            .with_priority(200)
            .mount(server)
            .await;
    }
}

/// Mounts a detail page and its phone endpoint.
async fn mount_listing(server: &MockServer, id: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/autos/{id}-test-car")))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_html(id)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/autos/{id}/show_phones")))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"phones": [{"primary": format!("(050) 000-00-{id:02}")}]}),
        ))
        .mount(server)
        .await;
}

fn build_engine(server_uri: &str, checkpoint: &std::path::Path, options: EngineOptions) -> CrawlEngine {
    let pool = Arc::new(ProxyPool::new(vec![]));
    let fetcher = Fetcher::new(&FetcherConfig::default(), Arc::clone(&pool)).unwrap();
    let retry = RetryPolicy::new(2, Duration::from_millis(1));
    let limiter = Arc::new(RateLimiter::disabled());
    let base_url = Url::parse(&format!("{server_uri}/autos")).unwrap();

    let discoverer = PageDiscoverer::new(
        fetcher.clone(),
        retry.clone(),
        Arc::clone(&pool),
        Arc::clone(&limiter),
        base_url.clone(),
    );
    let worker = ItemWorker::new(
        fetcher,
        retry,
        pool,
        limiter,
        base_url,
        Arc::new(TurboDetailExtractor),
    );
    CrawlEngine::new(discoverer, worker, CheckpointStore::new(checkpoint), options).unwrap()
}

async fn run(engine: &CrawlEngine) -> CrawlReport {
    engine.run(Arc::new(AtomicBool::new(false))).await.unwrap()
}

fn record_ids(report: &CrawlReport) -> Vec<String> {
    let mut ids: Vec<String> = report.records.iter().map(|r| r.listing_id.clone()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn three_pages_drain_completely_and_clear_the_checkpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("state.json");

    // Pages 1-3 with 10 unique listings each.
    for page in 1..=3u32 {
        let ids: Vec<u32> = (page * 100..page * 100 + 10).collect();
        mount_page(&server, page, &ids).await;
        for id in ids {
            mount_listing(&server, id).await;
        }
    }

    let engine = build_engine(
        &server.uri(),
        &checkpoint,
        EngineOptions {
            start_page: 1,
            end_page: 3,
            concurrency: 5,
            checkpoint_every: 10,
        },
    );
    let report = run(&engine).await;

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.records.len(), 30);
    assert_eq!(report.items_completed, 30);
    assert_eq!(report.items_pending, 0);
    assert_eq!(report.pages_discovered, 3);

    // The promoted listing never entered the crawl.
    assert!(!record_ids(&report).contains(&"999999".to_string()));

    // Identifier uniqueness within the run.
    let mut ids = record_ids(&report);
    ids.dedup();
    assert_eq!(ids.len(), 30);

    // Clean runs leave no resume state behind.
    assert!(!checkpoint.exists());

    // Records carry badges from the card and phones from the reveal.
    let sample = &report.records[0];
    assert!(sample.badges.credit);
    assert!(sample.field("phones").is_some());
}

#[tokio::test]
async fn failed_item_stays_pending_and_a_rerun_retries_only_it() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("state.json");

    mount_page(&server, 1, &[1, 2, 3]).await;
    mount_listing(&server, 1).await;
    mount_listing(&server, 3).await;
    // Listing 2's detail page is down for the whole first run.
    Mock::given(method("GET"))
        .and(path("/autos/2-test-car"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let options = EngineOptions {
        start_page: 1,
        end_page: 1,
        concurrency: 2,
        checkpoint_every: 1,
    };
    let engine = build_engine(&server.uri(), &checkpoint, options.clone());
    let report = run(&engine).await;

    assert_eq!(report.outcome, CrawlOutcome::Incomplete);
    assert_eq!(record_ids(&report), vec!["1", "3"]);
    assert_eq!(report.items_failed, 1);
    assert_eq!(report.items_pending, 1);
    assert!(checkpoint.exists());

    let saved = CheckpointStore::new(&checkpoint).load().unwrap();
    assert_eq!(saved.pending.len(), 1);
    assert_eq!(saved.pending[0].listing_id, "2");
    // No id is both pending and completed in any checkpoint.
    assert!(!saved.completed_ids.contains("2"));

    // The site recovers; rerun with the same configuration.
    server.reset().await;
    mount_page(&server, 1, &[1, 2, 3]).await;
    mount_listing(&server, 2).await;

    let engine = build_engine(&server.uri(), &checkpoint, options);
    let report = run(&engine).await;

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(record_ids(&report), vec!["1", "2", "3"]);
    assert_eq!(report.items_completed, 1);
    assert!(!checkpoint.exists());

    // Only listing 2 was fetched this run: no request touched the
    // already-completed listings, and page 1 was not re-discovered.
    let requests = server.received_requests().await.unwrap();
    for request in &requests {
        let req_path = request.url.path();
        assert!(
            !req_path.contains("/autos/1-") && !req_path.contains("/autos/3-"),
            "completed listing re-fetched: {req_path}"
        );
        assert_ne!(req_path, "/autos", "completed page re-discovered");
    }
}

#[tokio::test]
async fn resume_from_checkpoint_skips_completed_work() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("state.json");

    // Page 1 was fully handled by a previous (killed) run; page 2 was not.
    mount_page(&server, 2, &[21, 22]).await;
    mount_listing(&server, 21).await;
    mount_listing(&server, 22).await;

    let store = CheckpointStore::new(&checkpoint);
    let mut state = CrawlState::new();
    state.mark_page_completed(1);
    state.completed_ids.insert("11".to_string());
    state.completed_ids.insert("12".to_string());
    store.save(&state).unwrap();

    let engine = build_engine(
        &server.uri(),
        &checkpoint,
        EngineOptions {
            start_page: 1,
            end_page: 2,
            concurrency: 3,
            checkpoint_every: 5,
        },
    );
    let report = run(&engine).await;

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    // This run only did page 2's work.
    assert_eq!(report.pages_discovered, 1);
    assert_eq!(report.items_completed, 2);
    assert!(!checkpoint.exists());

    // Page 1 was never re-fetched: every index request carries page=2.
    let requests = server.received_requests().await.unwrap();
    for request in &requests {
        if request.url.path() == "/autos" {
            assert!(
                request.url.query().is_some_and(|q| q.contains("page=2")),
                "page 1 was re-discovered: {}",
                request.url
            );
        }
    }
}

#[tokio::test]
async fn failed_page_discovery_keeps_the_run_incomplete() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("state.json");

    mount_page(&server, 1, &[1]).await;
    mount_listing(&server, 1).await;
    // Page 2 is down for the whole run.
    Mock::given(method("GET"))
        .and(path("/autos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let engine = build_engine(
        &server.uri(),
        &checkpoint,
        EngineOptions {
            start_page: 1,
            end_page: 2,
            concurrency: 2,
            checkpoint_every: 5,
        },
    );
    let report = run(&engine).await;

    // Listing 1 completed, but the run is not clean: page 2 must be
    // retried by the next invocation, so the checkpoint survives.
    assert_eq!(report.outcome, CrawlOutcome::Incomplete);
    assert_eq!(report.items_completed, 1);
    assert!(checkpoint.exists());

    let saved = CheckpointStore::new(&checkpoint).load().unwrap();
    assert!(saved.is_page_completed(1));
    assert!(!saved.is_page_completed(2));
}

#[tokio::test]
async fn empty_page_counts_as_discovered() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("state.json");

    mount_page(&server, 1, &[]).await;

    let engine = build_engine(
        &server.uri(),
        &checkpoint,
        EngineOptions {
            start_page: 1,
            end_page: 1,
            concurrency: 1,
            checkpoint_every: 5,
        },
    );
    let report = run(&engine).await;

    // An empty page that fetched fine is complete; the end of the listing
    // range comes from the configured bound, not from emptiness.
    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.pages_discovered, 1);
    assert_eq!(report.records.len(), 0);
    assert!(!checkpoint.exists());
}

#[tokio::test]
async fn interrupt_checkpoints_the_exact_split() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("state.json");

    let ids: Vec<u32> = (1..=6).collect();
    mount_page(&server, 1, &ids).await;
    for id in &ids {
        // Slow detail pages so the interrupt lands mid-drain.
        Mock::given(method("GET"))
            .and(path(format!("/autos/{id}-test-car")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(detail_html(*id))
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/autos/{id}/show_phones")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"phones": []})))
            .mount(&server)
            .await;
    }

    let engine = build_engine(
        &server.uri(),
        &checkpoint,
        EngineOptions {
            start_page: 1,
            end_page: 1,
            concurrency: 2,
            checkpoint_every: 1,
        },
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    let trip = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        flag.store(true, Ordering::SeqCst);
    });

    let report = engine.run(interrupted).await.unwrap();
    trip.await.unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Interrupted);
    // Whatever happened, nothing was lost or duplicated.
    assert_eq!(report.items_completed + report.items_pending, 6);
    assert!(checkpoint.exists());

    let saved = CheckpointStore::new(&checkpoint).load().unwrap();
    assert_eq!(saved.completed_ids.len(), report.items_completed);
    assert_eq!(saved.pending.len(), report.items_pending);
    assert!(
        saved
            .pending
            .iter()
            .all(|item| !saved.completed_ids.contains(&item.listing_id)),
        "an id is both pending and completed"
    );

    // Resuming finishes the remainder without re-fetching completed items.
    server.reset().await;
    mount_page(&server, 1, &ids).await;
    for id in &ids {
        mount_listing(&server, *id).await;
    }
    let engine = build_engine(
        &server.uri(),
        &checkpoint,
        EngineOptions {
            start_page: 1,
            end_page: 1,
            concurrency: 2,
            checkpoint_every: 1,
        },
    );
    let report = run(&engine).await;

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.records.len(), 6);
    let mut all_ids = record_ids(&report);
    all_ids.dedup();
    assert_eq!(all_ids.len(), 6, "duplicate identifiers after resume");
    assert!(!checkpoint.exists());
}
