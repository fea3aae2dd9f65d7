//! Integration tests for the fetch endpoint
//!
//! These tests start the real service on a local port, point it at wiremock
//! upstreams and on-disk spec projects, and call it over HTTP.

use serde_json::{json, Value};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sumi_bot::config::load_config_with_hash;
use sumi_bot::engine::EngineSupervisor;
use sumi_bot::extraction::FsSpecProvider;
use sumi_bot::server::{build_service, serve, PendingTable};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCT_PAGE: &str = r#"<html><head><title>Shop</title></head><body>
    <div class="product"><h1>Blue Widget</h1><span class="price">$1,299.00</span></div>
    <div class="product"><h1>Red Widget</h1><span class="price">$5</span></div>
</body></html>"#;

/// A running service plus the handles needed to inspect and stop it
struct TestBot {
    addr: SocketAddr,
    client: reqwest::Client,
    supervisor: EngineSupervisor,
    pending: Arc<PendingTable>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
    _dir: TempDir,
}

impl TestBot {
    async fn start(classification: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let specs_root = dir.path().join("projects");
        write_project(&specs_root);

        let config_path = dir.path().join("bot.toml");
        fs::write(
            &config_path,
            format!(
                r#"
[server]
bind = "127.0.0.1:0"

[engine]
worker-name = "slyd"
idle-interval-ms = 20
request-timeout-secs = 5
connect-timeout-secs = 2

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[specs]
root = '{}'

[extraction]
classification = "{}"
"#,
                specs_root.display(),
                classification
            ),
        )
        .unwrap();

        let (config, _hash) = load_config_with_hash(&config_path).unwrap();
        let provider = Arc::new(FsSpecProvider::new(config.specs.root.clone()));
        let service = build_service(&config, provider).unwrap();

        let listener = TcpListener::bind(config.server.bind.as_str()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let router = service.router;
        let server = tokio::spawn(async move {
            serve(listener, router, async move {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::builder()
                .pool_max_idle_per_host(0)
                .build()
                .unwrap(),
            supervisor: service.supervisor,
            pending: service.pending,
            shutdown: Some(shutdown_tx),
            server: Some(server),
            _dir: dir,
        }
    }

    fn endpoint(&self) -> String {
        format!("http://{}/bot/fetch", self.addr)
    }

    async fn post_raw(&self, body: impl Into<reqwest::Body>) -> reqwest::Response {
        self.client
            .post(self.endpoint())
            .body(body)
            .send()
            .await
            .unwrap()
    }

    async fn fetch(&self, body: Value) -> Value {
        let response = self.post_raw(body.to_string()).await;
        assert_eq!(response.status(), 200);
        read_json(response).await
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            server.await.unwrap();
        }
        self.supervisor.shutdown().await;
    }
}

async fn read_json(response: reqwest::Response) -> Value {
    let body = response.bytes().await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Project `p1` with spider `s1` scraping products
fn write_project(root: &Path) {
    let project = root.join("p1");
    fs::create_dir_all(project.join("spiders")).unwrap();
    fs::write(
        project.join("items.json"),
        r#"{"product": {"fields": {
            "name": {"type": "text", "required": true},
            "price": {"type": "price"}
        }}}"#,
    )
    .unwrap();
    fs::write(
        project.join("spiders").join("s1.json"),
        r#"{"templates": [{
            "scrapes": "product",
            "container": "div.product",
            "annotations": [
                {"field": "name", "selector": "h1"},
                {"field": "price", "selector": ".price"}
            ]
        }]}"#,
    )
    .unwrap();
}

async fn html_upstream(page: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page, "text/html"))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_fetch_page_without_spec() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = html_upstream("<html>hello</html>").await;

    let payload = bot
        .fetch(json!({"request": {"url": format!("{}/page", upstream.uri())}}))
        .await;

    assert_eq!(payload, json!({"page": "<html>hello</html>"}));
    assert!(bot.pending.is_empty());
    bot.stop().await;
}

#[tokio::test]
async fn test_fetch_page_with_spec_returns_items() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = html_upstream(PRODUCT_PAGE).await;
    let url = format!("{}/page", upstream.uri());

    let payload = bot
        .fetch(json!({"request": {"url": url}, "project": "p1", "spider": "s1"}))
        .await;

    assert_eq!(payload["page"], PRODUCT_PAGE);
    assert_eq!(
        payload["items"],
        json!([
            {"_type": "product", "url": url, "name": ["Blue Widget"], "price": ["1299.00"]},
            {"_type": "product", "url": url, "name": ["Red Widget"], "price": ["5"]}
        ])
    );
    bot.stop().await;
}

#[tokio::test]
async fn test_unknown_project_or_spider_is_page_only() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = html_upstream(PRODUCT_PAGE).await;
    let url = format!("{}/page", upstream.uri());

    for (project, spider) in [("missing", "s1"), ("p1", "missing")] {
        let payload = bot
            .fetch(json!({"request": {"url": url}, "project": project, "spider": spider}))
            .await;
        assert_eq!(payload, json!({"page": PRODUCT_PAGE}));
    }
    bot.stop().await;
}

#[tokio::test]
async fn test_connection_refused_is_error_payload() {
    let bot = TestBot::start("short-circuit").await;

    let payload = bot
        .fetch(json!({"request": {"url": "http://127.0.0.1:1/"}, "project": "p1", "spider": "s1"}))
        .await;

    let error = payload["error"].as_str().unwrap();
    assert!(error.starts_with("unexpected error response: "), "{}", error);
    assert!(payload.get("page").is_none());
    bot.stop().await;
}

#[tokio::test]
async fn test_server_error_status_is_error_payload() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_raw("<html>oops</html>", "text/html"))
        .mount(&upstream)
        .await;

    let payload = bot
        .fetch(json!({"request": {"url": format!("{}/broken", upstream.uri())}}))
        .await;

    assert_eq!(payload, json!({"error": "Received http 500"}));
    bot.stop().await;
}

#[tokio::test]
async fn test_non_html_is_error_payload() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"a": 1}"#, "application/json"))
        .mount(&upstream)
        .await;

    let payload = bot
        .fetch(json!({"request": {"url": format!("{}/data", upstream.uri())}}))
        .await;

    assert_eq!(payload, json!({"error": "Non-html response: application/json"}));
    bot.stop().await;
}

#[tokio::test]
async fn test_malformed_requests_get_structured_errors() {
    let bot = TestBot::start("short-circuit").await;

    for body in [
        "{not json",
        r#"{"project": "p1"}"#,
        r#"{"request": {"url": "ftp://example.com/"}}"#,
    ] {
        let response = bot.post_raw(body).await;
        assert_eq!(response.status(), 200);
        let payload = read_json(response).await;
        let error = payload["error"].as_str().unwrap();
        assert!(error.starts_with("invalid request: "), "{}", error);
    }
    assert_eq!(bot.pending.completed_count(), 0);
    bot.stop().await;
}

#[tokio::test]
async fn test_response_headers_are_exact() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = html_upstream("<html>é</html>").await;

    let response = bot
        .post_raw(json!({"request": {"url": format!("{}/page", upstream.uri())}}).to_string())
        .await;

    assert_eq!(response.headers()["content-type"], "application/json");
    let declared: usize = response.headers()["content-length"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let body = response.bytes().await.unwrap();
    assert_eq!(declared, body.len());
    bot.stop().await;
}

#[tokio::test]
async fn test_request_headers_body_and_cookies_are_forwarded() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/form"))
        .and(header("x-token", "abc"))
        .and(header("cookie", "session=1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html"))
        .expect(1)
        .mount(&upstream)
        .await;

    let payload = bot
        .fetch(json!({"request": {
            "url": format!("{}/form", upstream.uri()),
            "method": "POST",
            "headers": {"X-Token": "abc"},
            "cookies": {"session": "1"},
            "body": "q=1"
        }}))
        .await;

    assert_eq!(payload, json!({"page": "<html>ok</html>"}));
    bot.stop().await;
}

#[tokio::test]
async fn test_repeated_fetches_are_not_deduplicated() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = html_upstream("<html>again</html>").await;
    let request = json!({"request": {"url": format!("{}/page", upstream.uri())}});

    for _ in 0..3 {
        assert_eq!(bot.fetch(request.clone()).await, json!({"page": "<html>again</html>"}));
    }
    assert_eq!(bot.pending.completed_count(), 3);
    bot.stop().await;
}

#[tokio::test]
async fn test_fall_through_answers_error_once() {
    let bot = TestBot::start("fall-through").await;
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_raw(PRODUCT_PAGE, "text/html"))
        .mount(&upstream)
        .await;

    let payload = bot
        .fetch(json!({
            "request": {"url": format!("{}/gone", upstream.uri())},
            "project": "p1",
            "spider": "s1"
        }))
        .await;
    assert_eq!(payload, json!({"error": "Received http 404"}));

    // The extraction result arrives after the error and is refused
    let mut rejected = 0;
    for _ in 0..100 {
        rejected = bot.pending.rejected_count();
        if rejected > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(rejected, 1);
    assert_eq!(bot.pending.completed_count(), 1);
    bot.stop().await;
}

#[tokio::test]
async fn test_concurrent_requests_are_correlated() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = MockServer::start().await;
    for i in 0..8 {
        Mock::given(method("GET"))
            .and(path(format!("/page/{}", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(format!("<html>page {}</html>", i), "text/html")
                    .set_delay(Duration::from_millis(10 * (8 - i))),
            )
            .mount(&upstream)
            .await;
    }

    let mut calls = Vec::new();
    for i in 0..8u64 {
        let client = bot.client.clone();
        let endpoint = bot.endpoint();
        let request = json!({"request": {"url": format!("{}/page/{}", upstream.uri(), i)}});
        calls.push(tokio::spawn(async move {
            let response = client
                .post(endpoint)
                .body(request.to_string())
                .send()
                .await
                .unwrap();
            (i, read_json(response).await)
        }));
    }

    let mut results = Vec::new();
    for call in calls {
        results.push(call.await.unwrap());
    }

    for (i, payload) in results {
        assert_eq!(payload, json!({"page": format!("<html>page {}</html>", i)}));
    }
    assert!(bot.pending.is_empty());
    assert_eq!(bot.pending.completed_count(), 8);
    bot.stop().await;
}

#[tokio::test]
async fn test_engine_survives_idle_periods() {
    let bot = TestBot::start("short-circuit").await;
    let upstream = html_upstream("<html>still here</html>").await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(bot.supervisor.is_running());
    assert!(bot.supervisor.idle_vetoes() >= 3);

    let payload = bot
        .fetch(json!({"request": {"url": format!("{}/page", upstream.uri())}}))
        .await;
    assert_eq!(payload, json!({"page": "<html>still here</html>"}));
    bot.stop().await;
}

#[tokio::test]
async fn test_get_is_not_allowed() {
    let bot = TestBot::start("short-circuit").await;

    let response = bot.client.get(bot.endpoint()).send().await.unwrap();
    assert_eq!(response.status(), 405);
    bot.stop().await;
}
