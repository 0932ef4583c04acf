use std::sync::Arc;

use assetshift_common::{app, rewriting::RawOptions, state::Config};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

const KEY: &str = "0123456789abcdef0123456789abcdef";

fn config(upstream: &str, api_key: &str) -> Arc<Config> {
    Arc::new(Config {
        upstream: upstream.to_string(),
        home_url: "https://origin.com".to_string(),
        cdn: RawOptions {
            url: Some("https://cdn.example".to_string()),
            relative: Some(false.into()),
            api_key: Some(api_key.to_string()),
            ..RawOptions::default()
        },
        ..Config::default()
    })
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(host: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::HOST, host)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn api_reports_status() {
    let app = app(config("http://127.0.0.1:9", KEY)).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::HOST, "api.origin.com:3069")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["active"], json!(true));
    assert_eq!(body["activation"], json!("active"));
    assert_eq!(body["cdn_base_url"], json!("https://cdn.example"));
}

#[tokio::test]
async fn api_reports_why_rewriting_is_off() {
    let app = app(config("http://127.0.0.1:9", "too-short")).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::HOST, "api.origin.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["active"], json!(false));
    assert_eq!(body["activation"], json!("missing_api_key"));
}

#[tokio::test]
async fn api_rewrites_content_fields() {
    let app = app(config("http://127.0.0.1:9", KEY)).unwrap();

    let response = app
        .oneshot(post_json(
            "api.origin.com",
            "/rewrite",
            json!({ "html": r#"<p><img src="/wp-content/uploads/a.png"><a href="/wp-content/x.php">x</a></p>"# }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({
            "html": r#"<p><img src="https://cdn.example/wp-content/uploads/a.png"><a href="/wp-content/x.php">x</a></p>"#,
            "candidates": 2,
            "rewritten": 1,
        })
    );
}

#[tokio::test]
async fn api_classifies_urls() {
    let app = app(config("http://127.0.0.1:9", KEY)).unwrap();

    let eligible = app
        .clone()
        .oneshot(post_json(
            "api.origin.com",
            "/classify",
            json!({ "url": "//origin.com/wp-includes/a.js?ver=1" }),
        ))
        .await
        .unwrap();
    assert_eq!(
        json_body(eligible).await,
        json!({
            "eligible": true,
            "replacement": "https://cdn.example/wp-includes/a.js?ver=1",
            "reason": null,
        })
    );

    let skipped = app
        .oneshot(post_json(
            "api.origin.com",
            "/classify",
            json!({ "url": "https://other.org/wp-content/a.png" }),
        ))
        .await
        .unwrap();
    assert_eq!(
        json_body(skipped).await,
        json!({
            "eligible": false,
            "replacement": null,
            "reason": "foreign_host",
        })
    );
}

#[tokio::test]
async fn api_resolves_candidate_options() {
    let app = app(config("http://127.0.0.1:9", KEY)).unwrap();

    let resolved = app
        .clone()
        .oneshot(post_json(
            "api.origin.com",
            "/resolve",
            json!({
                "url": "https://cdn.example/sites/origin.com/",
                "dirs": "wp-content, assets",
                "excludes": ".php, .SVG",
                "relative": "0",
                "https": true,
                "api_key": KEY,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resolved.status(), StatusCode::OK);
    let body = json_body(resolved).await;
    assert_eq!(body["included_dirs"], json!(["wp-content", "assets"]));
    assert_eq!(body["output_form"], json!("absolute"));
    assert_eq!(body["force_https"], json!(true));
    assert_eq!(body["activation"], json!("active"));

    let rejected = app
        .oneshot(post_json(
            "api.origin.com",
            "/resolve",
            json!({ "url": "https://cdn.example", "api_key": "short" }),
        ))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let reason = json_body(rejected).await["error"].as_str().unwrap().to_string();
    assert!(reason.contains("API key"), "{reason}");
}

#[tokio::test]
async fn rejects_a_non_http_upstream() {
    assert!(app(config("ftp://127.0.0.1", KEY)).is_err());
    assert!(app(config("/relative", KEY)).is_err());
}

async fn spawn_upstream() -> String {
    let upstream = Router::new()
        .route(
            "/",
            get(|| async {
                Html(r#"<html><body><img src="/wp-content/uploads/a.png"><a href="/shop/">Shop</a></body></html>"#)
            }),
        )
        .route(
            "/wp-content/style.css",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/css")],
                    ".a{background:url(/wp-content/uploads/b.png)}",
                )
                    .into_response()
            }),
        )
        .route(
            "/shouting",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "Text/HTML; Charset=UTF-8")],
                    r#"<img src="/wp-content/uploads/c.png">"#,
                )
                    .into_response()
            }),
        )
        .route(
            "/latin1",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html; charset=windows-1252")],
                    &b"<p>Caf\xE9</p><img alt=\"caf\xE9\" src=\"/wp-content/uploads/d.png\">"[..],
                )
                    .into_response()
            }),
        )
        .route(
            "/echo",
            axum::routing::post(|body: String| async move { format!("got {}", body) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });

    format!("http://{}/", address)
}

async fn proxied(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let (status, bytes) = proxied_bytes(app, method, uri, body).await;
    (status, String::from_utf8(bytes).unwrap())
}

async fn proxied_bytes(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::HOST, "origin.com")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn proxy_rewrites_html_pages() {
    let app = app(config(&spawn_upstream().await, KEY)).unwrap();

    let (status, body) = proxied(app, "GET", "/", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        r#"<html><body><img src="https://cdn.example/wp-content/uploads/a.png"><a href="/shop/">Shop</a></body></html>"#
    );
}

#[tokio::test]
async fn proxy_matches_the_content_type_case_insensitively() {
    let app = app(config(&spawn_upstream().await, KEY)).unwrap();

    let (_, body) = proxied(app, "GET", "/shouting", "").await;

    assert_eq!(
        body,
        r#"<img src="https://cdn.example/wp-content/uploads/c.png">"#
    );
}

#[tokio::test]
async fn proxy_rewrites_pages_in_their_declared_charset() {
    let app = app(config(&spawn_upstream().await, KEY)).unwrap();

    let (status, body) = proxied_bytes(app, "GET", "/latin1", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        b"<p>Caf\xE9</p><img alt=\"caf\xE9\" src=\"https://cdn.example/wp-content/uploads/d.png\">"
            .to_vec()
    );
}

#[tokio::test]
async fn proxy_streams_other_content_unchanged() {
    let upstream = spawn_upstream().await;

    let (status, body) = proxied(
        app(config(&upstream, KEY)).unwrap(),
        "GET",
        "/wp-content/style.css",
        "",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ".a{background:url(/wp-content/uploads/b.png)}");

    let (status, body) = proxied(app(config(&upstream, KEY)).unwrap(), "POST", "/echo", "hi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "got hi");

    let (status, _) = proxied(app(config(&upstream, KEY)).unwrap(), "GET", "/missing", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn proxy_leaves_pages_alone_when_inactive() {
    let app = app(config(&spawn_upstream().await, "")).unwrap();

    let (_, body) = proxied(app, "GET", "/", "").await;

    assert_eq!(
        body,
        r#"<html><body><img src="/wp-content/uploads/a.png"><a href="/shop/">Shop</a></body></html>"#
    );
}
