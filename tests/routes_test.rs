use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use meli_proxy::{router, AppState, Config};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    router(AppState::new(Config::default()))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_webhook(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/meli/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn parse_ts(entry: &Value) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(entry["ts"].as_str().unwrap())
        .unwrap()
        .with_timezone(&chrono::Utc)
}

#[tokio::test]
async fn webhook_dedup_consume_end_to_end() {
    let app = app();

    let payload = json!({ "topic": "orders_v2", "user_id": "S1", "id": "123" });
    let (status, body) = send(&app, post_webhook(payload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let (_, first_listing) = send(&app, get("/meli/webhook/events")).await;
    let first_ts = parse_ts(&first_listing[0]);

    // Same order again, later timestamp.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    send(&app, post_webhook(payload)).await;

    // Listing dedups to one entry carrying the later timestamp.
    let (status, listing) = send(&app, get("/meli/webhook/events")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = listing.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["order_id"], "123");
    assert_eq!(entries[0]["seller_id"], "S1");
    assert!(parse_ts(&entries[0]) > first_ts);

    // Consume returns that entry, then the buffer is empty.
    let (status, consumed) = send(&app, get("/meli/webhook/consume")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(consumed.as_array().unwrap().len(), 1);

    let (_, listing) = send(&app, get("/meli/webhook/events")).await;
    assert_eq!(listing, json!([]));
}

#[tokio::test]
async fn non_orders_topic_is_ignored_but_acknowledged() {
    let app = app();

    let (status, body) =
        send(&app, post_webhook(json!({ "topic": "items", "user_id": "S1", "id": "9" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let (_, listing) = send(&app, get("/meli/webhook/events")).await;
    assert_eq!(listing, json!([]));
}

#[tokio::test]
async fn malformed_body_is_acknowledged() {
    let app = app();

    let request = Request::builder()
        .method("POST")
        .uri("/meli/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("this is not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn order_id_falls_back_to_resource_path() {
    let app = app();

    let payload = json!({
        "topic": "orders_v2",
        "user_id": 42,
        "resource": "/orders/999888777?source=webhook"
    });
    send(&app, post_webhook(payload)).await;

    let (_, listing) = send(&app, get("/meli/webhook/events")).await;
    let entries = listing.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["order_id"], "999888777");
    assert_eq!(entries[0]["seller_id"], "42");
}

#[tokio::test]
async fn event_without_identifiers_is_not_stored() {
    let app = app();

    send(&app, post_webhook(json!({ "topic": "orders_v2" }))).await;

    let (_, listing) = send(&app, get("/meli/webhook/events")).await;
    assert_eq!(listing, json!([]));
}

#[tokio::test]
async fn delete_clears_the_buffer() {
    let app = app();

    send(
        &app,
        post_webhook(json!({ "topic": "orders_v2", "user_id": "S1", "id": "1" })),
    )
    .await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/meli/webhook/events")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "cleared": true }));

    let (_, listing) = send(&app, get("/meli/webhook/events")).await;
    assert_eq!(listing, json!([]));
}

#[tokio::test]
async fn report_requires_bearer_token() {
    let app = app();

    let (status, body) = send(&app, get("/meli/orders/unshipped")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing Authorization header");

    let request = Request::builder()
        .uri("/meli/orders/unshipped")
        .header(header::AUTHORIZATION, "Basic abc123")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization header must be a Bearer token");
}

#[tokio::test]
async fn report_rejects_invalid_date_range() {
    let app = app();

    let request = Request::builder()
        .uri("/meli/orders/unshipped?from=2026-01-02&to=2026-01-01")
        .header(header::AUTHORIZATION, "Bearer test-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "`from` must be earlier than `to`");

    let request = Request::builder()
        .uri("/meli/orders/unshipped?from=yesterday-ish")
        .header(header::AUTHORIZATION, "Bearer test-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid from parameter");
}

#[tokio::test]
async fn labels_require_bearer_token() {
    let app = app();

    let (status, _) = send(&app, get("/meli/labels/123")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_and_fallback() {
    let app = app();

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(body["time"].is_string());

    let (status, body) = send(&app, get("/no/such/route")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
}
