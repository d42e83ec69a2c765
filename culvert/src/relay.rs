// Copyright 2026 The Culvert Project
// SPDX-License-Identifier: Apache-2.0

// HTTP relay surface.
//
// Responsibilities:
// - POST /v1/generate: forward the JSON request body upstream via the
//   injected backend, respond with the decoded semantic events as SSE
//   data lines, then a tool-call summary, then a terminator
// - GET /v1/heartbeat: liveness probe
// - Map upstream failures to appropriate HTTP statuses

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

use crate::client::{ClientError, GenerationClient, GenerationOutcome};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while serving a relay request.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error(transparent)]
    Upstream(#[from] ClientError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, public_message) = match &self {
            RelayError::MalformedJson(_) => {
                (StatusCode::BAD_REQUEST, "request body is not valid JSON")
            }
            RelayError::EmptyBody => (StatusCode::BAD_REQUEST, "request body is empty"),
            RelayError::Upstream(ClientError::Status { status: 429 }) => {
                (StatusCode::TOO_MANY_REQUESTS, "upstream rate limited")
            }
            RelayError::Upstream(ClientError::FirstChunkTimeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "upstream timed out")
            }
            RelayError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream request failed"),
        };
        (status, public_message.to_string()).into_response()
    }
}

// ---------------------------------------------------------------------------
// Trait: GenerationBackend (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the upstream generation call.
///
/// Implementations must be Send + Sync so they can be shared across
/// request handlers via `Arc`. The production implementation is
/// `GenerationClient`; tests inject scripted backends.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: Value) -> Result<GenerationOutcome, ClientError>;
}

#[async_trait::async_trait]
impl GenerationBackend for GenerationClient {
    async fn generate(&self, request: Value) -> Result<GenerationOutcome, ClientError> {
        GenerationClient::generate(self, request).await
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn GenerationBackend>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// Generation handler.
///
/// Validates the body, runs the upstream generation to completion, and
/// streams the decoded timeline back as SSE: one `data:` line per
/// semantic event, a `tool_calls` summary line, then `data: [DONE]`.
pub async fn generate_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    if body.is_empty() {
        return RelayError::EmptyBody.into_response();
    }
    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return RelayError::MalformedJson(e.to_string()).into_response(),
    };

    let outcome = match state.backend.generate(request).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(%err, "upstream generation failed");
            return RelayError::Upstream(err).into_response();
        }
    };

    let lines = sse_lines(&outcome);
    let stream = tokio_stream::iter(lines.into_iter().map(Ok::<_, std::convert::Infallible>));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap()
        .into_response()
}

/// Serialize a decoded outcome into SSE data lines.
fn sse_lines(outcome: &GenerationOutcome) -> Vec<Bytes> {
    let mut lines = Vec::with_capacity(outcome.events.len() + 2);
    for event in &outcome.events {
        lines.push(sse_line(event));
    }
    lines.push(sse_line(&serde_json::json!({
        "type": "tool_calls",
        "calls": outcome.tool_calls,
    })));
    lines.push(Bytes::from_static(b"data: [DONE]\n\n"));
    lines
}

fn sse_line<T: serde::Serialize>(value: &T) -> Bytes {
    // Serializing our own event types cannot fail; fall back to an empty
    // object rather than poisoning the stream if it ever does.
    let json = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {json}\n\n"))
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with the relay routes and heartbeat endpoint.
///
/// The backend is injected; no side effects, no hard-coded clients.
pub fn build_router(backend: Arc<dyn GenerationBackend>) -> Router {
    let state = AppState { backend };

    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/v1/generate", post(generate_handler))
        .with_state(state)
}

/// The address the relay binds to. Always localhost, never 0.0.0.0.
pub const BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 9900);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{FinalizedToolCall, SemanticEvent};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt; // for oneshot

    /// Backend returning a fixed outcome.
    struct FixedBackend {
        outcome: GenerationOutcome,
    }

    #[async_trait::async_trait]
    impl GenerationBackend for FixedBackend {
        async fn generate(&self, _request: Value) -> Result<GenerationOutcome, ClientError> {
            Ok(self.outcome.clone())
        }
    }

    /// Backend that always fails with a given error.
    struct FailingBackend {
        make_err: fn() -> ClientError,
    }

    #[async_trait::async_trait]
    impl GenerationBackend for FailingBackend {
        async fn generate(&self, _request: Value) -> Result<GenerationOutcome, ClientError> {
            Err((self.make_err)())
        }
    }

    fn sample_outcome() -> GenerationOutcome {
        GenerationOutcome {
            events: vec![
                SemanticEvent::Content {
                    text: "Hello".to_string(),
                },
                SemanticEvent::Usage { value: json!(2) },
            ],
            tool_calls: vec![FinalizedToolCall {
                id: "t1".to_string(),
                name: "search".to_string(),
                arguments: "{\"q\":\"x\"}".to_string(),
            }],
            stopped_early: true,
        }
    }

    fn generate_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/generate")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_string(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn heartbeat_returns_200() {
        let app = build_router(Arc::new(FixedBackend {
            outcome: sample_outcome(),
        }));

        let req = Request::builder()
            .method("GET")
            .uri("/v1/heartbeat")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // -----------------------------------------------------------------------
    // SSE event stream shape
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn generate_streams_events_summary_and_terminator() {
        let app = build_router(Arc::new(FixedBackend {
            outcome: sample_outcome(),
        }));

        let resp = app
            .oneshot(generate_request(r#"{"prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let body = body_string(resp).await;

        let hello = body
            .find(r#"data: {"type":"content","text":"Hello"}"#)
            .expect("content event present");
        let usage = body
            .find(r#""type":"usage""#)
            .expect("usage event present");
        let summary = body
            .find(r#""type":"tool_calls""#)
            .expect("tool-call summary present");
        let done = body.find("data: [DONE]").expect("terminator present");

        assert!(hello < usage && usage < summary && summary < done);
        assert!(body.contains(r#""name":"search""#));
    }

    #[tokio::test]
    async fn empty_tool_call_list_still_gets_a_summary_line() {
        let app = build_router(Arc::new(FixedBackend {
            outcome: GenerationOutcome {
                events: vec![],
                tool_calls: vec![],
                stopped_early: false,
            },
        }));

        let resp = app.oneshot(generate_request("{}")).await.unwrap();
        let body = body_string(resp).await;

        assert!(body.contains(r#""calls":[]"#));
        assert!(body.contains("data: [DONE]"));
    }

    // -----------------------------------------------------------------------
    // Request validation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn empty_body_returns_400() {
        let app = build_router(Arc::new(FixedBackend {
            outcome: sample_outcome(),
        }));

        let resp = app.oneshot(generate_request("")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("empty"));
    }

    #[tokio::test]
    async fn malformed_json_returns_400() {
        let app = build_router(Arc::new(FixedBackend {
            outcome: sample_outcome(),
        }));

        let resp = app
            .oneshot(generate_request("this is not json {{{"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("not valid JSON"));
    }

    // -----------------------------------------------------------------------
    // Upstream error mapping
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn upstream_rate_limit_maps_to_429() {
        let app = build_router(Arc::new(FailingBackend {
            make_err: || ClientError::Status { status: 429 },
        }));

        let resp = app.oneshot(generate_request("{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn upstream_timeout_maps_to_504() {
        let app = build_router(Arc::new(FailingBackend {
            make_err: || ClientError::FirstChunkTimeout(200),
        }));

        let resp = app.oneshot(generate_request("{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_502() {
        let app = build_router(Arc::new(FailingBackend {
            make_err: || ClientError::Transport("connection refused".to_string()),
        }));

        let resp = app.oneshot(generate_request("{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    // -----------------------------------------------------------------------
    // Binding enforcement
    // -----------------------------------------------------------------------

    #[test]
    fn bind_address_is_localhost_only() {
        assert_eq!(BIND_ADDR.0, [127, 0, 0, 1]);
        assert_ne!(BIND_ADDR.0, [0, 0, 0, 0]);
    }
}
