//! HTTP surface for the browser userscript.
//!
//! The userscript posts from a page origin to localhost, so every route is
//! CORS-open and accepts JSON sent as `text/plain`. Writes require the relay
//! key, presented as a bearer token, a `token` query parameter, or a
//! `token` field in the JSON body.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, Level};

use hibiki_api::traits::StatusService;
use hibiki_core::config::ConfigPatch;
use hibiki_core::models::PlaybackEvent;
use hibiki_runtime::{NowPlayingOutcome, Relay, RelayError};

const BODY_LIMIT: usize = 64 * 1024;

type SharedRelay<S> = Arc<Relay<S>>;

pub fn router<S: StatusService + 'static>(relay: SharedRelay<S>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::<S>))
        .route(
            "/now-playing",
            post(post_now_playing::<S>).get(get_now_playing::<S>),
        )
        .route("/set", post(set_status::<S>))
        .route("/test", post(test_status::<S>))
        .route("/config", put(put_config::<S>))
        .route("/debug/events", get(debug_events::<S>))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive().allow_private_network(true))
        .with_state(relay)
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// A request body as the userscript may send it.
enum Payload {
    Json(Value),
    Text(String),
    Empty,
}

impl Payload {
    /// JSON regardless of content type; anything else is kept as text.
    fn parse(bytes: &Bytes) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Self::Empty;
        }
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Json(value),
            Err(_) => match std::str::from_utf8(bytes) {
                Ok(text) => Self::Text(text.to_string()),
                Err(_) => Self::Empty,
            },
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        match self {
            Self::Json(value) => value.get(name).and_then(Value::as_str),
            _ => None,
        }
    }
}

fn presented_key(headers: &HeaderMap, query: &TokenQuery, payload: &Payload) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());

    bearer
        .or_else(|| query.token.clone())
        .or_else(|| payload.field("token").map(str::to_string))
}

struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::Config(_) => StatusCode::BAD_REQUEST,
            RelayError::External(_) | RelayError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "ok": false, "error": self.0.to_string() }))).into_response()
    }
}

async fn root() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "ok")
}

async fn health<S: StatusService + 'static>(State(relay): State<SharedRelay<S>>) -> impl IntoResponse {
    Json(relay.health().await)
}

async fn post_now_playing<S: StatusService + 'static>(
    State(relay): State<SharedRelay<S>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = Payload::parse(&body);
    relay
        .authorize(presented_key(&headers, &query, &payload).as_deref(), "/now-playing")
        .await?;

    let event = match &payload {
        Payload::Json(value) => PlaybackEvent::from_json(value),
        Payload::Text(_) | Payload::Empty => None,
    };
    debug!(event = ?event, "now-playing payload");

    let reply = match relay.now_playing(event).await? {
        NowPlayingOutcome::Applied { status } => json!({ "ok": true, "status": status }),
        NowPlayingOutcome::Cleared => json!({ "ok": true, "cleared": true }),
        NowPlayingOutcome::Skipped { reason, .. } if reason.is_not_playing() => {
            json!({ "ok": true, "cleared": false, "skipped": reason.as_str() })
        }
        NowPlayingOutcome::Skipped { reason, text } => {
            json!({ "ok": true, "skipped": reason.as_str(), "text": text })
        }
    };
    Ok(Json(reply))
}

async fn get_now_playing<S: StatusService + 'static>(
    State(relay): State<SharedRelay<S>>,
) -> Json<Value> {
    let snapshot = relay.engine_snapshot();
    Json(json!({
        "ok": true,
        "status": snapshot.status,
        "last_applied_at": snapshot.last_applied_at,
        "is_set_by_us": snapshot.is_set_by_us,
    }))
}

async fn set_status<S: StatusService + 'static>(
    State(relay): State<SharedRelay<S>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = Payload::parse(&body);
    relay
        .authorize(presented_key(&headers, &query, &payload).as_deref(), "/set")
        .await?;

    let text = match &payload {
        Payload::Json(_) => payload.field("text").unwrap_or_default(),
        Payload::Text(text) => text.as_str(),
        Payload::Empty => "",
    };
    let text = relay.set_manual(text, None).await?;
    Ok(Json(json!({ "ok": true, "text": text })))
}

async fn test_status<S: StatusService + 'static>(
    State(relay): State<SharedRelay<S>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = Payload::parse(&body);
    relay
        .authorize(presented_key(&headers, &query, &payload).as_deref(), "/test")
        .await?;

    let text = relay.send_test(payload.field("text")).await?;
    Ok(Json(json!({ "ok": true, "text": text })))
}

async fn put_config<S: StatusService + 'static>(
    State(relay): State<SharedRelay<S>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = Payload::parse(&body);
    relay
        .authorize(presented_key(&headers, &query, &payload).as_deref(), "/config")
        .await?;

    let patch: ConfigPatch = match payload {
        Payload::Json(value) => serde_json::from_value(value)
            .map_err(|e| RelayError::Config(format!("invalid config patch: {e}")))?,
        Payload::Text(_) | Payload::Empty => {
            return Err(RelayError::Config("expected a JSON config patch".into()).into());
        }
    };

    let summary = relay.patch_config(patch).await?;
    Ok(Json(json!({ "ok": true, "config": summary })))
}

async fn debug_events<S: StatusService + 'static>(
    State(relay): State<SharedRelay<S>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Value>, ApiError> {
    relay
        .authorize(presented_key(&headers, &query, &Payload::Empty).as_deref(), "/debug/events")
        .await?;
    Ok(Json(json!({ "ok": true, "events": relay.activity() })))
}
