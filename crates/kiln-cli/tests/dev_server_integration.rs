// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Integration tests for the development server request stages.
//!
//! The router is driven with `oneshot` and a fake entry handler, so no
//! runtime process is involved.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE, TRANSFER_ENCODING};
use http::{Request, StatusCode};
use tempfile::tempdir;
use tower::ServiceExt;

use kiln::{
    Body, BoxError, Config, EntryHandler, KilnError, Manifest, Mode, ModuleLoader, ValidatedConfig,
};
use kiln_cli::server::{create_router, DevState};

/// Echoes the request, or fails depending on the path.
#[derive(Default)]
struct TestEntry {
    calls: AtomicUsize,
}

#[async_trait]
impl EntryHandler for TestEntry {
    async fn fetch(&self, request: kiln::Request) -> Result<kiln::Response, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = request.uri().path().to_string();

        match path.as_str() {
            "/fail" => Err("database <offline>".into()),
            "/panic" => panic!("render exploded"),
            "/cookies" => Ok(http::Response::builder()
                .header(SET_COOKIE, "session=abc; Path=/; Expires=Wed, 21 Oct 2015 07:28:00 GMT, theme=dark")
                .body(Body::empty())?),
            "/recover" => Err("recoverable".into()),
            _ => {
                let uri = request.uri().to_string();
                let method = request.method().to_string();
                let body = request.into_body().text().await?;
                Ok(http::Response::builder()
                    .status(if path == "/missing" { 404 } else { 200 })
                    .body(Body::from(format!("{} {} {}", method, uri, body)))?)
            }
        }
    }

    async fn on_error(&self, error: &KilnError) -> Option<kiln::Response> {
        if error.to_string().contains("recoverable") {
            return http::Response::builder()
                .status(503)
                .body(Body::from("custom error page"))
                .ok();
        }
        None
    }
}

struct TestLoader {
    entry: Arc<TestEntry>,
}

#[async_trait]
impl ModuleLoader for TestLoader {
    async fn load_entry(&self) -> kiln::Result<Arc<dyn EntryHandler>> {
        Ok(self.entry.clone())
    }

    async fn invalidate(&self) {}
}

/// Create a test project structure in a temp directory
fn setup_test_project(dir: &Path) {
    fs::create_dir_all(dir.join("static/images")).unwrap();
    fs::create_dir_all(dir.join("src/views/blog")).unwrap();
    fs::write(dir.join("static/robots.txt"), "User-agent: *").unwrap();
    fs::write(dir.join("static/images/logo.png"), [137u8, 80, 78, 71]).unwrap();
    fs::write(dir.join("src/views/index.html"), "<h1>home</h1>").unwrap();
    fs::write(dir.join("src/views/blog/post.css"), "h1 { color: red; }").unwrap();
    fs::write(dir.join("src/views/blog/post.ts"), "export const x = 1;").unwrap();
    fs::write(dir.join("src/server.js"), "export default {};").unwrap();
}

fn router_with(dir: &Path, raw: Config, mode: Mode) -> (axum::Router, Arc<TestEntry>) {
    let config = Arc::new(ValidatedConfig::resolve(raw, dir).unwrap());
    let manifest = Manifest::collect(&config).unwrap();
    let entry = Arc::new(TestEntry::default());
    let loader = Arc::new(TestLoader {
        entry: entry.clone(),
    });
    let state = DevState::new(config, manifest, loader).with_mode(mode);
    (create_router(Arc::new(state)), entry)
}

fn router(dir: &Path) -> (axum::Router, Arc<TestEntry>) {
    router_with(dir, Config::default(), Mode::Development)
}

fn get(uri: &str) -> Request<AxumBody> {
    Request::builder().uri(uri).body(AxumBody::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn test_static_asset_is_served_without_entry() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, entry) = router(dir.path());

    let response = app.oneshot(get("/robots.txt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
    assert_eq!(body_text(response).await, "User-agent: *");
    assert_eq!(entry.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_asset_case_mismatch_falls_through_to_entry() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, entry) = router(dir.path());

    let response = app.oneshot(get("/images/Logo.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "GET http://localhost/images/Logo.png ");
    assert_eq!(entry.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_asset_respects_base_path() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let mut raw = Config::default();
    raw.paths.base = "/docs".into();
    let (app, _) = router_with(dir.path(), raw, Mode::Development);

    let response = app.clone().oneshot(get("/docs/robots.txt")).await.unwrap();
    assert_eq!(body_text(response).await, "User-agent: *");

    let response = app.oneshot(get("/robots.txt")).await.unwrap();
    assert_eq!(body_text(response).await, "GET http://localhost/robots.txt ");
}

#[tokio::test]
async fn test_source_query_serves_views_with_mime() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, _) = router(dir.path());

    let response = app.clone().oneshot(get("/x?s=blog/post.ts")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/javascript");

    let response = app.clone().oneshot(get("/x?s=blog%2Fpost.css")).await.unwrap();
    assert_eq!(response.headers()[CONTENT_TYPE], "text/css");
    assert_eq!(body_text(response).await, "h1 { color: red; }");

    let response = app.oneshot(get("/x?s=../../src/server.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_service_worker_stub() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());

    let (app, _) = router(dir.path());
    let response = app.oneshot(get("/service-worker.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    fs::write(dir.path().join("src/service-worker.js"), "self.skipWaiting();").unwrap();
    let (app, entry) = router(dir.path());
    let response = app.oneshot(get("/service-worker.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/javascript");
    let body = body_text(response).await;
    assert!(body.starts_with("import '/@fs/"));
    assert!(body.ends_with("src/service-worker.js';"));
    assert_eq!(entry.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_entry_receives_method_url_and_body() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, _) = router(dir.path());

    let request = Request::builder()
        .method("POST")
        .uri("/form?a=1")
        .header("host", "example.test")
        .header(CONTENT_TYPE, "text/plain")
        .header(CONTENT_LENGTH, "5")
        .body(AxumBody::from("hello"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(body_text(response).await, "POST http://example.test/form?a=1 hello");
}

#[tokio::test]
async fn test_scheme_is_applied_to_request_url() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let config = Arc::new(ValidatedConfig::resolve(Config::default(), dir.path()).unwrap());
    let manifest = Manifest::collect(&config).unwrap();
    let loader = Arc::new(TestLoader {
        entry: Arc::new(TestEntry::default()),
    });
    let state = DevState::new(config, manifest, loader).with_scheme("https");
    let app = create_router(Arc::new(state));

    let request = Request::builder()
        .uri("/page")
        .header("host", "example.test")
        .body(AxumBody::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(body_text(response).await, "GET https://example.test/page ");
}

#[tokio::test]
async fn test_entry_status_is_preserved() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, _) = router(dir.path());

    let response = app.oneshot(get("/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_set_cookie_values_are_split() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, _) = router(dir.path());

    let response = app.oneshot(get("/cookies")).await.unwrap();
    let cookies: Vec<_> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(
        cookies,
        vec![
            "session=abc; Path=/; Expires=Wed, 21 Oct 2015 07:28:00 GMT".to_string(),
            "theme=dark".to_string()
        ]
    );
}

#[tokio::test]
async fn test_declared_body_over_limit_is_rejected_before_entry() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let mut raw = Config::default();
    raw.dev.body_size_limit = 4;
    let (app, entry) = router_with(dir.path(), raw, Mode::Development);

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(CONTENT_TYPE, "text/plain")
        .header(CONTENT_LENGTH, "5")
        .body(AxumBody::from("hello"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body_text(response).await.contains("Content-length of 5 exceeds limit of 4 bytes."));
    assert_eq!(entry.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chunked_body_over_limit_fails_in_entry() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let mut raw = Config::default();
    raw.dev.body_size_limit = 4;
    let (app, entry) = router_with(dir.path(), raw, Mode::Development);

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(CONTENT_TYPE, "text/plain")
        .header(TRANSFER_ENCODING, "chunked")
        .body(AxumBody::from("hello world"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("request body size exceeded body_size_limit of 4"));
    assert_eq!(entry.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_error_renders_overlay_in_development() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, _) = router(dir.path());

    let response = app.oneshot(get("/fail")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let body = body_text(response).await;
    assert!(body.contains("database &lt;offline&gt;"));
    assert!(!body.contains("<offline>"));
}

#[tokio::test]
async fn test_handler_error_is_opaque_in_production() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, _) = router_with(dir.path(), Config::default(), Mode::Production);

    let response = app.oneshot(get("/fail")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "Internal Server Error");
}

#[tokio::test]
async fn test_handler_panic_is_caught() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, _) = router(dir.path());

    let response = app.oneshot(get("/panic")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("render exploded"));
}

#[tokio::test]
async fn test_on_error_response_wins() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let (app, _) = router(dir.path());

    let response = app.oneshot(get("/recover")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_text(response).await, "custom error page");
}
