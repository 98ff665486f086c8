//! End-to-end tests for the HTTP surface, run against the in-memory store.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use nvsurl::{
    config::{AppConfig, StoreBackend},
    models::LinkTable,
    store::{LinkStore, MemoryBackend},
    AppState,
};

const ADMIN_KEY: &str = "test-admin-key";

/// Peer address of ordinary test requests.
const CLIENT: [u8; 4] = [192, 0, 2, 10];
/// The one reverse proxy the test config trusts.
const PROXY: [u8; 4] = [127, 0, 0, 1];

// =============================================================================
// Test Setup
// =============================================================================

struct Harness {
    state: Arc<AppState>,
    backend: Arc<MemoryBackend>,
    app: Router,
}

fn test_config(max_requests_per_hour: u32) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 5480,
        app_domain: "https://s.example".into(),
        store: StoreBackend::Memory,
        admin_key: Some(ADMIN_KEY.into()),
        max_requests_per_hour,
        trusted_proxies: vec!["127.0.0.1".into()],
    }
}

async fn harness_with_limit(max_requests_per_hour: u32) -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    let store = LinkStore::initialize(backend.clone(), None)
        .await
        .expect("memory store initializes");
    let state = Arc::new(AppState::new(
        test_config(max_requests_per_hour),
        Arc::new(store),
    ));
    let app = nvsurl::app(state.clone());
    Harness {
        state,
        backend,
        app,
    }
}

async fn harness() -> Harness {
    harness_with_limit(35).await
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

impl Harness {
    /// Send as the default client.
    async fn send(&self, req: Request<Body>) -> Reply {
        self.send_from(CLIENT, req).await
    }

    /// Send with `peer` as the socket address, as the server sees it.
    async fn send_from(&self, peer: [u8; 4], mut req: Request<Body>) -> Reply {
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        let response = self
            .app
            .clone()
            .oneshot(req)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes()
            .to_vec();
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn get(&self, uri: &str) -> Reply {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, body: Value) -> Reply {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn shorten(&self, body: Value) -> Reply {
        self.post_json("/shorten", body).await
    }

    /// Create a link with a known slug and return it.
    async fn create(&self, slug: &str, url: &str) -> Value {
        let reply = self
            .shorten(json!({ "originalUrl": url, "customSlug": slug }))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text());
        reply.json()["data"].clone()
    }

    async fn stored_clicks(&self, slug: &str) -> Option<u64> {
        let table = self.state.store.read_all().await.ok()?;
        table.links.get(slug).map(|l| l.clicks)
    }
}

// =============================================================================
// POST /shorten
// =============================================================================

#[tokio::test]
async fn shorten_generates_a_slug() {
    let h = harness().await;
    let reply = h
        .shorten(json!({ "originalUrl": "https://example.com" }))
        .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    let body = reply.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "URL shortened successfully");

    let data = &body["data"];
    let slug = data["slug"].as_str().unwrap();
    assert!((5..=8).contains(&slug.len()), "slug: {slug}");
    assert!(slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    assert_eq!(data["clicks"], 0);
    assert_eq!(data["isActive"], true);
    assert_eq!(data["originalUrl"], "https://example.com");
    assert_eq!(data["shortUrl"], format!("https://s.example/r/{slug}"));
    assert_eq!(data["metadata"]["createdVia"], "API");

    assert!(h.stored_clicks(slug).await.is_some());
}

#[tokio::test]
async fn shorten_keeps_title_and_client_metadata() {
    let h = harness().await;
    let reply = h
        .send_from(
            PROXY,
            Request::post("/shorten")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::USER_AGENT, "integration-test/1.0")
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::from(
                    json!({
                        "originalUrl": "https://example.com/docs",
                        "customSlug": "docs",
                        "title": "Docs",
                        "description": ""
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    let body = reply.json();
    let data = &body["data"];
    assert_eq!(data["slug"], "docs");
    assert_eq!(data["title"], "Docs");
    assert!(data["description"].is_null());
    assert_eq!(data["metadata"]["ip"], "203.0.113.9");
    assert_eq!(data["metadata"]["userAgent"], "integration-test/1.0");
}

#[tokio::test]
async fn shorten_rejects_invalid_url() {
    let h = harness().await;
    let reply = h.shorten(json!({ "originalUrl": "not-a-url" })).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let body = reply.json();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("valid URL"));
    assert_eq!(body["errors"][0], "originalUrl must be a valid URL");
}

#[tokio::test]
async fn shorten_reports_every_invalid_field() {
    let h = harness().await;
    let reply = h.shorten(json!({ "customSlug": "bad slug!" })).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let body = reply.json();
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("originalUrl is required, customSlug"));
}

#[tokio::test]
async fn shorten_rejects_malformed_json() {
    let h = harness().await;
    let reply = h
        .send(
            Request::post("/shorten")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["success"], false);
}

#[tokio::test]
async fn custom_slug_conflict_is_409() {
    let h = harness().await;
    h.create("taken", "https://example.com/one").await;

    let reply = h
        .shorten(json!({ "originalUrl": "https://example.com/two", "customSlug": "taken" }))
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.json()["message"], "Slug already exists");

    // The original target is untouched.
    let table = h.state.store.read_all().await.unwrap();
    assert_eq!(table.links["taken"].original_url, "https://example.com/one");
}

#[tokio::test]
async fn shorten_fails_with_500_when_store_is_down() {
    let h = harness().await;
    h.backend.set_failing(true);

    let reply = h
        .shorten(json!({ "originalUrl": "https://example.com", "customSlug": "nope" }))
        .await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.json()["message"], "Failed to shorten URL");
}

// =============================================================================
// GET /r/:slug
// =============================================================================

#[tokio::test]
async fn two_redirects_count_two_clicks() {
    let h = harness().await;
    h.create("twice", "https://example.com/target").await;

    // Start from cold caches so the first request takes the slow path.
    h.state.clear_caches();

    for _ in 0..2 {
        let reply = h.get("/r/twice").await;
        assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(reply.location(), Some("https://example.com/target"));
    }

    // The second click is counted by a background task.
    let mut clicks = None;
    for _ in 0..100 {
        clicks = h.stored_clicks("twice").await;
        if clicks == Some(2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(clicks, Some(2));

    let stored = h.state.store.read_all().await.unwrap();
    assert!(stored.links["twice"].last_accessed.is_some());
}

#[tokio::test]
async fn unknown_slug_redirects_home_with_error() {
    let h = harness().await;
    let reply = h.get("/r/missing").await;

    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.location(), Some("/?error=link-not-found"));
}

#[tokio::test]
async fn redirect_reports_server_error_when_click_cannot_be_saved() {
    let h = harness().await;
    h.create("fragile", "https://example.com").await;
    h.state.cache.delete("fragile");

    // The store cache still resolves the slug, but the write fails.
    h.backend.set_failing(true);
    let reply = h.get("/r/fragile").await;

    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.location(), Some("/?error=server-error"));
}

#[tokio::test]
async fn redirect_to_link_deleted_elsewhere_is_not_cached() {
    let h = harness().await;
    h.create("stale", "https://example.com/stale").await;
    h.state.cache.delete("stale");

    // Another writer removed it; only the store cache still knows the slug.
    h.backend
        .insert_document(h.state.store.document_id(), &LinkTable::empty())
        .await
        .unwrap();

    let reply = h.get("/r/stale").await;
    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.location(), Some("/?error=link-not-found"));
    assert!(h.state.cache.get("stale").is_none());
    assert!(h.state.store.cached("stale").is_none());

    assert_eq!(
        h.get("/r/stale").await.location(),
        Some("/?error=link-not-found")
    );
}

#[tokio::test]
async fn deleted_link_stops_redirecting_from_the_cache() {
    let h = harness().await;
    h.create("brief", "https://example.com/brief").await;
    assert_eq!(h.get("/r/brief").await.status, StatusCode::MOVED_PERMANENTLY);

    let reply = h.post_json("/delete.html?slug=brief", json!({})).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = h.get("/r/brief").await;
    assert_eq!(reply.status, StatusCode::FOUND);
    assert!(h.state.cache.get("brief").is_none());
}

// =============================================================================
// GET /stats, /stats/:slug, /health
// =============================================================================

#[tokio::test]
async fn link_stats_found_and_missing() {
    let h = harness().await;
    h.create("info", "https://example.com/info").await;

    let reply = h.get("/stats/info").await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["message"], "Link statistics");
    assert_eq!(body["data"]["originalUrl"], "https://example.com/info");

    let reply = h.get("/stats/nothing-here").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["message"], "Link not found");
}

#[tokio::test]
async fn global_stats_aggregate_store_and_server() {
    let h = harness().await;
    h.create("g1", "https://a.example").await;
    h.create("g2", "https://b.example").await;

    let reply = h.get("/stats").await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    let data = &body["data"];
    assert_eq!(data["totalLinks"], 2);
    assert_eq!(data["totalClicks"], 0);
    assert!(data["server"]["uptime"].as_str().unwrap().ends_with('m'));
    assert_eq!(data["server"]["cache"]["memoryCache"]["size"], 2);
    assert_eq!(data["server"]["cache"]["memoryCache"]["ttlSeconds"], 300);
    assert_eq!(data["server"]["cache"]["gistCache"]["ttlSeconds"], 120);
    assert_eq!(data["rateLimit"]["maxPerHour"], 35);
}

#[tokio::test]
async fn global_stats_degrade_when_store_is_down() {
    let h = harness().await;
    h.create("g1", "https://a.example").await;
    h.backend.set_failing(true);

    let reply = h.get("/stats").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["data"]["totalLinks"], 0);
}

#[tokio::test]
async fn health_reflects_store_reachability() {
    let h = harness().await;
    h.create("h1", "https://a.example").await;

    let reply = h.get("/health").await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["gist"]["connected"], true);
    assert_eq!(body["data"]["gist"]["totalLinks"], 1);

    h.backend.set_failing(true);
    let reply = h.get("/health").await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    let body = reply.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "SERVICE_UNHEALTHY");
}

// =============================================================================
// /delete.html
// =============================================================================

#[tokio::test]
async fn json_delete_evicts_both_cache_layers() {
    let h = harness().await;
    h.create("bye", "https://example.com/bye").await;
    assert!(h.state.cache.get("bye").is_some());
    assert!(h.state.store.cached("bye").is_some());

    let reply = h.post_json("/delete.html?slug=bye", json!({})).await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["message"], "Link deleted successfully");
    assert_eq!(body["data"]["deletedSlug"], "bye");
    assert_eq!(body["data"]["originalUrl"], "https://example.com/bye");

    assert!(h.state.cache.get("bye").is_none());
    assert!(h.state.store.cached("bye").is_none());
    assert!(h.state.store.get_link("bye").await.is_none());
    assert_eq!(h.get("/stats/bye").await.status, StatusCode::NOT_FOUND);

    let reply = h.post_json("/delete.html?slug=bye", json!({})).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn html_delete_flow() {
    let h = harness().await;
    h.create("page", "https://example.com/page").await;

    let form = h.get("/delete.html").await;
    assert_eq!(form.status, StatusCode::OK);
    assert!(form.text().contains("name=\"slug\""));

    let confirm = h.get("/delete.html?slug=page").await;
    assert_eq!(confirm.status, StatusCode::OK);
    assert!(confirm.text().contains("example.com"));
    assert!(confirm.text().contains("Delete this link"));

    let done = h
        .send(
            Request::post("/delete.html?slug=page")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(done.status, StatusCode::OK);
    assert!(done.text().contains("Deleted"));
    assert!(h.state.store.get_link("page").await.is_none());

    let missing = h.get("/delete.html?slug=page").await;
    assert!(missing.text().contains("No link with slug"));
}

// =============================================================================
// Admin endpoints
// =============================================================================

#[tokio::test]
async fn clear_cache_requires_admin_key() {
    let h = harness().await;

    for uri in ["/clear-cache", "/clear-cache?adminKey=wrong"] {
        let reply = h.get(uri).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        let body = reply.json();
        assert_eq!(body["message"], "Unauthorized");
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn clear_cache_drops_stale_entries() {
    let h = harness().await;
    h.create("moved", "https://old.example").await;

    // Someone edits the gist behind our back.
    let mut table = h.state.store.read_all().await.unwrap();
    table.links.get_mut("moved").unwrap().original_url = "https://new.example".into();
    h.backend
        .insert_document(h.state.store.document_id(), &table)
        .await
        .unwrap();

    assert_eq!(
        h.get("/r/moved").await.location(),
        Some("https://old.example")
    );

    let reply = h.get(&format!("/clear-cache?adminKey={ADMIN_KEY}")).await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["message"], "All caches cleared successfully");
    assert!(body["data"]["clearedAt"].is_string());
    assert!(h.state.cache.is_empty());

    let link = h.state.store.get_link("moved").await.unwrap();
    assert_eq!(link.original_url, "https://new.example");
    assert_eq!(
        h.get("/r/moved").await.location(),
        Some("https://new.example")
    );
}

#[tokio::test]
async fn link_data_dumps_the_table() {
    let h = harness().await;
    h.create("d1", "https://a.example").await;
    h.create("d2", "https://b.example").await;

    assert_eq!(
        h.get("/linkdata?adminKey=nope").await.status,
        StatusCode::UNAUTHORIZED
    );

    let reply = h.get(&format!("/linkdata?adminKey={ADMIN_KEY}")).await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    let data = &body["data"];
    assert_eq!(data["metadata"]["totalLinks"], 2);
    assert_eq!(data["stats"]["totalLinks"], 2);
    assert_eq!(data["links"]["d2"]["originalUrl"], "https://b.example");
}

// =============================================================================
// Pages
// =============================================================================

#[tokio::test]
async fn home_renders_stats_and_notices() {
    let h = harness().await;
    h.create("home", "https://example.com").await;

    let reply = h.get("/?error=link-not-found").await;
    assert_eq!(reply.status, StatusCode::OK);
    let html = reply.text();
    assert!(html.contains("NVSURL - URL Shortener"));
    assert!(html.contains("does not exist"));
    assert!(!html.contains("Failed to load statistics"));

    h.backend.set_failing(true);
    let reply = h.get("/").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.text().contains("Failed to load statistics"));
}

#[tokio::test]
async fn unknown_route_is_a_404_page() {
    let h = harness().await;
    let reply = h.get("/no/such/page").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.text().contains("Page not found"));
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn hourly_limiter_covers_api_routes_only() {
    let h = harness_with_limit(2).await;

    let first = h.get("/stats").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.headers["ratelimit-limit"], "2");
    assert_eq!(first.headers["ratelimit-remaining"], "1");

    assert_eq!(h.get("/health").await.status, StatusCode::OK);

    let denied = h.get("/stats/anything").await;
    assert_eq!(denied.status, StatusCode::TOO_MANY_REQUESTS);
    let body = denied.json();
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "Too many requests. Maximum 2 requests per hour."
    );

    // Pages and redirects are not limited.
    assert_eq!(h.get("/").await.status, StatusCode::OK);
    assert_eq!(h.get("/r/whatever").await.status, StatusCode::FOUND);
}

#[tokio::test]
async fn creation_limiter_allows_ten_per_window() {
    let h = harness().await;

    for i in 0..10 {
        let reply = h
            .shorten(json!({ "originalUrl": format!("https://example.com/{i}") }))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
    }

    let reply = h
        .shorten(json!({ "originalUrl": "https://example.com/eleven" }))
        .await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        reply.json()["message"],
        "Too many link creation attempts. Please wait 15 minutes."
    );

    // Another client still gets through.
    let reply = h
        .send_from(
            [198, 51, 100, 77],
            Request::post("/shorten")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "originalUrl": "https://example.com/other" }).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
}

#[tokio::test]
async fn forwarded_headers_from_untrusted_peers_do_not_reset_the_limit() {
    let h = harness_with_limit(2).await;

    let mut statuses = Vec::new();
    for i in 0..5 {
        let reply = h
            .send(
                Request::get("/stats")
                    .header("x-forwarded-for", format!("10.0.0.{i}"))
                    .header("x-real-ip", format!("10.1.0.{i}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        statuses.push(reply.status);
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
}

#[tokio::test]
async fn trusted_proxy_is_limited_per_forwarded_client() {
    let h = harness_with_limit(1).await;

    let via_proxy = |client: &'static str| {
        Request::get("/stats")
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(h.send_from(PROXY, via_proxy("203.0.113.1")).await.status, StatusCode::OK);
    assert_eq!(
        h.send_from(PROXY, via_proxy("203.0.113.1")).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(h.send_from(PROXY, via_proxy("203.0.113.2")).await.status, StatusCode::OK);
}
