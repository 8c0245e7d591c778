mod common;

use axum::http::StatusCode;
use common::spawn_app;

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;
    let response = app.client().get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "OK");
}

#[tokio::test]
async fn responses_carry_security_headers_and_request_id() {
    let app = spawn_app().await;
    let response = app.client().get("/").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.header("x-request-id").is_some());
    assert_eq!(response.header("x-frame-options"), Some("DENY"));
}

#[tokio::test]
async fn metrics_endpoint_is_absent_without_exporter() {
    let app = spawn_app().await;
    let response = app.client().get("/metrics").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn public_pages_render_for_anonymous_visitors() {
    let app = spawn_app().await;
    let mut client = app.client();

    for path in ["/", "/about", "/login", "/login?mode=signup"] {
        let response = client.get(path).await;
        assert_eq!(response.status, StatusCode::OK, "GET {path}");
    }
}

#[tokio::test]
async fn theme_toggle_persists_in_cookie() {
    let app = spawn_app().await;
    let mut client = app.client();

    let before = client.get("/").await;
    assert!(before.body.contains(r#"data-theme="light""#));

    let toggled = client.post("/theme", &[]).await;
    assert_eq!(toggled.status, StatusCode::OK);
    assert_eq!(toggled.header("hx-refresh"), Some("true"));
    assert!(client.has_cookie("theme"));

    let after = client.get("/").await;
    assert!(after.body.contains(r#"data-theme="dark""#));

    client.post("/theme", &[]).await;
    let back = client.get("/about").await;
    assert!(back.body.contains(r#"data-theme="light""#));
}
