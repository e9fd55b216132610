use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::backoff::{with_backoff, RetryPolicy};
use crate::buffer::EventBuffer;
use crate::config::Config;
use crate::error::ApiError;
use crate::fetch::fetch_paid_orders;
use crate::report::build_report;
use crate::types::{EventRow, FetchWindow, ReportRow, SellerId, WebhookEvent};
use crate::upstream::MeliClient;

/// Shared state: the ring buffer is the only thing shared across
/// requests. Each report request builds its own upstream client.
#[derive(Clone)]
pub struct AppState {
    pub buffer: Arc<EventBuffer>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            buffer: Arc::new(EventBuffer::new(config.buffer_capacity)),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/meli/webhook", post(receive_webhook))
        .route("/meli/webhook/events", get(list_events).delete(clear_events))
        .route("/meli/webhook/consume", get(consume_events))
        .route("/meli/orders/unshipped", get(unshipped_orders))
        .route("/meli/labels/{shipment_id}", get(shipment_label))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Retry policy used for every upstream call made on behalf of a request.
fn upstream_policy() -> RetryPolicy {
    RetryPolicy::default().with_base_delay(Duration::from_millis(300))
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "time": chrono::Utc::now() }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" })))
}

/// Inbound notification body. Every field is optional; identifiers may
/// arrive as strings or numbers.
#[derive(Debug, Default, Deserialize)]
struct NotificationPayload {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    id: Option<Value>,
}

/// Fire-and-forget webhook intake. Always responds 200 `{ok:true}`,
/// whatever the body looks like; malformed or ignored notifications
/// degrade to a log line.
async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let payload: NotificationPayload = serde_json::from_slice(&body).unwrap_or_default();

    if payload.topic.as_deref() != Some("orders_v2") {
        info!(topic = ?payload.topic, "webhook ignored (not orders_v2)");
        return Json(json!({ "ok": true }));
    }

    let order_id = scalar_string(payload.id.as_ref())
        .or_else(|| payload.resource.as_deref().and_then(parse_resource_id));
    let seller_id = scalar_string(payload.user_id.as_ref());

    match (order_id, seller_id) {
        (Some(order_id), Some(seller_id)) => {
            let event = WebhookEvent::new(order_id, seller_id);
            info!(order_id = %event.order_id.0, seller_id = %event.seller_id.0, "webhook stored");
            state.buffer.push(event).await;
        }
        _ => warn!("webhook missing order_id or seller_id"),
    }

    Json(json!({ "ok": true }))
}

async fn list_events(State(state): State<AppState>) -> Json<Vec<EventRow>> {
    Json(state.buffer.snapshot().await)
}

async fn consume_events(State(state): State<AppState>) -> Json<Vec<EventRow>> {
    Json(state.buffer.consume().await)
}

async fn clear_events(State(state): State<AppState>) -> Json<Value> {
    state.buffer.clear().await;
    Json(json!({ "ok": true, "cleared": true }))
}

#[derive(Debug, Default, Deserialize)]
struct ReportQuery {
    from: Option<String>,
    to: Option<String>,
}

async fn unshipped_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Vec<ReportRow>>, ApiError> {
    let token = extract_bearer(&headers)?;
    let config = &state.config;

    let window = FetchWindow::resolve(
        query.from.as_deref(),
        query.to.as_deref(),
        config.timezone,
        config.lookback_hours,
    )
    .map_err(ApiError::BadRequest)?;

    let client = MeliClient::new(&token, &config.api_base).map_err(|_| {
        ApiError::Unauthorized("Authorization header must be a Bearer token".to_string())
    })?;
    let policy = upstream_policy();

    let seller_id = with_backoff(policy, |_attempt| client.users_me())
        .await
        .map_err(|err| {
            warn!(error = %err, "seller id resolution failed");
            ApiError::BadGateway("Could not resolve seller id from token".to_string())
        })?
        .id
        .ok_or_else(|| ApiError::BadGateway("Seller id not found for token".to_string()))?;
    let seller = SellerId(seller_id.to_string());

    let orders = fetch_paid_orders(&client, &seller, &window, policy).await?;
    let rows = build_report(&client, &orders, &config.allowed_statuses, policy).await?;
    Ok(Json(rows))
}

/// Stream an upstream shipping-label PDF straight through.
async fn shipment_label(
    State(state): State<AppState>,
    Path(shipment_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&headers)?;

    let client = MeliClient::new(&token, &state.config.api_base).map_err(|_| {
        ApiError::Unauthorized("Authorization header must be a Bearer token".to_string())
    })?;

    let response = with_backoff(upstream_policy(), |_attempt| client.label_pdf(&shipment_id)).await?;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"shipment_{shipment_id}.pdf\""),
        )
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

fn extract_bearer(headers: &HeaderMap) -> Result<String, ApiError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let mut parts = raw.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();

    if token.is_empty() || !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiError::Unauthorized(
            "Authorization header must be a Bearer token".to_string(),
        ));
    }

    Ok(token.to_string())
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Pull the trailing numeric path segment out of a resource path,
/// e.g. `/orders/1234567890?foo=bar` -> `1234567890`.
fn parse_resource_id(resource: &str) -> Option<String> {
    let path = resource.split('?').next().unwrap_or(resource);
    let (_, segment) = path.rsplit_once('/')?;
    if !segment.is_empty() && segment.bytes().all(|byte| byte.is_ascii_digit()) {
        Some(segment.to_string())
    } else {
        None
    }
}
