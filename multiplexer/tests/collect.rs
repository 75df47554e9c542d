use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use httpmock::prelude::*;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use collector::{CollectError, Collector, FetchPool, FetchResult};
use multiplexer::router::router;
use ratelimit::Limiter;

/// Limiter stub with a fixed verdict, so middleware behavior is tested
/// without depending on wall-clock windows.
struct Always(bool);

impl Limiter for Always {
    fn allow(&self) -> bool {
        self.0
    }
}

struct FailingCollector;

#[async_trait]
impl Collector for FailingCollector {
    async fn collect(
        &self,
        _cancel: CancellationToken,
        _urls: Vec<String>,
        _limit: usize,
    ) -> Result<Vec<FetchResult>, CollectError> {
        Err(CollectError::Exhausted)
    }
}

fn fetch_pool(fixed: usize, overflow: usize) -> Arc<FetchPool> {
    let pool = Arc::new(FetchPool::new(fixed, overflow, Duration::from_secs(1)));
    pool.start(CancellationToken::new());
    pool
}

async fn spawn_app(
    collector: Arc<dyn Collector>,
    limiter: Arc<dyn Limiter>,
    max_urls: usize,
    fetch_limit: usize,
) -> SocketAddr {
    let app = router(collector, limiter, max_urls, fetch_limit, false);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind an ephemeral port");
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

async fn post_collect(address: SocketAddr, body: String) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{address}/collect"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("request failed")
}

#[tokio::test]
async fn collects_urls_and_returns_their_bodies() -> Result<()> {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/page");
        then.status(200).body("some_text");
    });

    let address = spawn_app(fetch_pool(4, 0), Arc::new(Always(true)), 20, 4).await;

    let urls = vec![upstream.url("/page"); 3];
    let res = post_collect(address, json!(urls).to_string()).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/json; charset=utf-8"
    );

    let data = res.json::<Value>().await?;
    let items = data.as_array().unwrap();
    assert_eq!(items.len(), 3);
    for item in items {
        assert_eq!(item["Url"], upstream.url("/page"));
        assert_eq!(item["Body"], "some_text");
    }

    Ok(())
}

#[tokio::test]
async fn upstream_error_status_is_still_a_body() -> Result<()> {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/broken");
        then.status(500).body("oops");
    });

    let address = spawn_app(fetch_pool(2, 0), Arc::new(Always(true)), 20, 2).await;

    let res = post_collect(address, json!([upstream.url("/broken")]).to_string()).await;

    assert_eq!(res.status(), StatusCode::OK);
    let data = res.json::<Value>().await?;
    assert_eq!(data[0]["Body"], "oops");

    Ok(())
}

#[tokio::test]
async fn oversized_url_list_is_rejected() -> Result<()> {
    let address = spawn_app(fetch_pool(2, 0), Arc::new(Always(true)), 2, 2).await;

    let urls = vec!["http://localhost/".to_string(); 3];
    let res = post_collect(address, json!(urls).to_string()).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text().await?, "Bad Request: url list size is too big");

    Ok(())
}

#[tokio::test]
async fn malformed_payload_is_rejected() -> Result<()> {
    let address = spawn_app(fetch_pool(2, 0), Arc::new(Always(true)), 20, 2).await;

    let res = post_collect(address, "not json at all".to_string()).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res
        .text()
        .await?
        .starts_with("Bad Request: failed to decode request"));

    Ok(())
}

#[tokio::test]
async fn empty_url_list_is_rejected() -> Result<()> {
    let address = spawn_app(fetch_pool(2, 0), Arc::new(Always(true)), 20, 2).await;

    let res = post_collect(address, "[]".to_string()).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text().await?, "Bad Request: no urls to collect");

    Ok(())
}

#[tokio::test]
async fn denied_request_gets_429_and_never_reaches_the_pool() -> Result<()> {
    let address = spawn_app(Arc::new(FailingCollector), Arc::new(Always(false)), 20, 2).await;

    let res = post_collect(address, json!(["http://localhost/"]).to_string()).await;

    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.text().await?, "Too many requests\n");

    Ok(())
}

#[tokio::test]
async fn engine_failure_surfaces_as_internal_server_error() -> Result<()> {
    let address = spawn_app(Arc::new(FailingCollector), Arc::new(Always(true)), 20, 2).await;

    let res = post_collect(address, json!(["http://localhost/"]).to_string()).await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        res.text().await?,
        "Internal Server Error: all overflow fetchers are in use"
    );

    Ok(())
}

#[tokio::test]
async fn fetch_failure_names_the_failing_url() -> Result<()> {
    let address = spawn_app(fetch_pool(2, 0), Arc::new(Always(true)), 20, 2).await;

    // Port 1 is never listening; the connection is refused immediately.
    let res = post_collect(address, json!(["http://127.0.0.1:1/"]).to_string()).await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res
        .text()
        .await?
        .starts_with("Internal Server Error: http://127.0.0.1:1/"));

    Ok(())
}
