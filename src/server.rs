//! HTTP surface of the callback service.
//!
//! # Endpoints
//!
//! - `ANY /new` - Registers a deferred request built from the inbound one
//!   (returns 201 Created)
//! - `GET /callbacks/{id}` - Reports a pending callback (200, or 404 once
//!   it has fired or been cancelled)
//! - `DELETE /callbacks/{id}` - Cancels a pending callback (204, or 404)
//! - `GET /health` - Returns 200 if the server is running

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use serde::Serialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::engine::Engine;
use crate::error::{EngineError, InputError};
use crate::types::{CallbackId, CancelOutcome, NewCallback};

/// Shared application state, handed to every handler.
#[derive(Clone)]
pub struct AppState {
    engine: Engine,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed control headers.
    #[error("{0}")]
    Input(#[from] InputError),

    /// Path id is not an unsigned integer.
    #[error("Invalid callback id.")]
    InvalidId(String),

    /// Unknown id, or the callback already fired or was cancelled.
    #[error("callback not found: {0}")]
    NotFound(CallbackId),

    /// Engine refused the registration.
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// Response body could not be encoded.
    #[error("failed to encode response: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Input(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::InvalidId(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Engine(EngineError::Shutdown) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ApiError::Engine(EngineError::DelayOutOfRange) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Serialization(err) => {
                error!(error = %err, "failed to encode response");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, message).into_response()
    }
}

/// Builds the router with all endpoints.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/new", any(new_callback))
        .route("/callbacks/{id}", get(get_callback).delete(delete_callback))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Registers a callback.
///
/// The deferred request reuses the inbound method, every header except
/// `Callback-Url` and `Callback-Delay`, and the body.
///
/// ```ignore
/// POST /new HTTP/1.1
/// Callback-Url: http://example/x
/// Callback-Delay: 2
///
/// abc
///
/// HTTP/1.1 201 Created
/// Content-Type: application/json
///
/// {"request_id":1,"callback_info":"POST http://example/x","time_remaining":2}
/// ```
async fn new_callback(
    State(app_state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let callback = NewCallback::from_request_parts(method, &headers, body)?;
    let registration = app_state.engine.register(callback).await?;
    json_response(StatusCode::CREATED, &registration.status())
}

async fn get_callback(
    State(app_state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&raw_id)?;
    let status = app_state
        .engine
        .status(id)
        .await
        .ok_or(ApiError::NotFound(id))?;
    json_response(StatusCode::OK, &status)
}

async fn delete_callback(
    State(app_state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&raw_id)?;
    match app_state.engine.cancel(id).await {
        CancelOutcome::Cancelled => Ok(StatusCode::NO_CONTENT),
        CancelOutcome::NotFound => Err(ApiError::NotFound(id)),
    }
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

fn parse_id(raw: &str) -> Result<CallbackId, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidId(raw.to_string()))
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response, ApiError> {
    let bytes = serde_json::to_vec(body)?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::dispatcher::{Dispatcher, OutboundRequest};
    use crate::error::DispatchError;
    use crate::types::CallbackStatus;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<OutboundRequest>>,
    }

    #[async_trait]
    impl Dispatcher for Recorder {
        async fn send(&self, request: OutboundRequest) -> Result<(), DispatchError> {
            self.sent.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn test_app() -> (Router, Arc<Recorder>, Engine) {
        let recorder = Arc::new(Recorder::default());
        let engine = Engine::new(recorder.clone());
        (build_router(AppState::new(engine.clone())), recorder, engine)
    }

    fn new_request(delay: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/new")
            .header("Callback-Url", "http://example/x")
            .header("X-Trace", "t-1");
        if let Some(delay) = delay {
            builder = builder.header("Callback-Delay", delay);
        }
        builder.body(Body::from("abc")).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap()
    }

    async fn read_status(response: Response) -> CallbackStatus {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn new_returns_201_with_full_delay() {
        let (app, _recorder, _engine) = test_app();

        let response = app.oneshot(new_request(Some("2"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let status = read_status(response).await;
        assert_eq!(status.request_id, CallbackId(1));
        assert_eq!(status.callback_info, "POST http://example/x");
        assert_eq!(status.time_remaining, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn new_fires_once_with_original_request() {
        let (app, recorder, _engine) = test_app();

        app.oneshot(new_request(Some("2"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].url.as_str(), "http://example/x");
        assert_eq!(&sent[0].body[..], b"abc");
        assert_eq!(sent[0].headers["x-trace"], "t-1");
        assert!(sent[0].headers.get("callback-url").is_none());
        assert!(sent[0].headers.get("callback-delay").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn new_mirrors_inbound_method() {
        let (app, recorder, _engine) = test_app();

        let request = Request::builder()
            .method("PUT")
            .uri("/new")
            .header("Callback-Url", "http://example/x")
            .header("Callback-Delay", "0")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(recorder.sent.lock().unwrap()[0].method, Method::PUT);
    }

    #[tokio::test]
    async fn new_without_delay_is_400_and_registers_nothing() {
        let (app, _recorder, engine) = test_app();

        let response = app.oneshot(new_request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(
            &body[..],
            br#""Callback-Url" and "Callback-Delay" headers must be provided."#
        );
        assert_eq!(engine.pending().await, 0);
    }

    #[tokio::test]
    async fn new_with_unparsable_delay_is_400() {
        let (app, _recorder, engine) = test_app();

        let response = app.oneshot(new_request(Some("two"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Invalid callback delay.");
        assert_eq!(engine.pending().await, 0);
    }

    #[tokio::test]
    async fn new_with_out_of_range_delay_is_400() {
        let (app, _recorder, engine) = test_app();

        for delay in ["18446744073709551615", "31536001"] {
            let response = app.clone().oneshot(new_request(Some(delay))).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"Invalid callback delay.");
        }
        assert_eq!(engine.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn get_reports_pending_callback() {
        let (app, _recorder, _engine) = test_app();

        app.clone().oneshot(new_request(Some("2"))).await.unwrap();
        let response = app.oneshot(get("/callbacks/1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let status = read_status(response).await;
        assert_eq!(status.request_id, CallbackId(1));
        assert!(status.time_remaining > 0 && status.time_remaining <= 2);
    }

    #[tokio::test]
    async fn get_unknown_is_404() {
        let (app, _recorder, _engine) = test_app();
        let response = app.oneshot(get("/callbacks/999999")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_unparsable_id_is_400() {
        let (app, _recorder, _engine) = test_app();
        let response = app.oneshot(get("/callbacks/abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_id_is_404() {
        let (app, _recorder, _engine) = test_app();
        let response = app.oneshot(get("/callbacks/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_before_fire_prevents_dispatch() {
        let (app, recorder, _engine) = test_app();

        app.clone().oneshot(new_request(Some("2"))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let response = app.clone().oneshot(delete("/callbacks/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.clone().oneshot(get("/callbacks/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(recorder.sent.lock().unwrap().is_empty());

        let response = app.oneshot(delete("/callbacks/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_callback_is_404() {
        let (app, recorder, _engine) = test_app();

        app.clone().oneshot(new_request(Some("1"))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
        let response = app.clone().oneshot(get("/callbacks/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app.oneshot(delete("/callbacks/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_unparsable_id_is_400() {
        let (app, _recorder, _engine) = test_app();
        let response = app.oneshot(delete("/callbacks/-3")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn new_after_shutdown_is_503() {
        let (app, _recorder, engine) = test_app();
        engine.shutdown().await;

        let response = app.oneshot(new_request(Some("2"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_returns_200() {
        let (app, _recorder, _engine) = test_app();

        let response = app.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }
}
