// Copyright 2026 The Culvert Project
// SPDX-License-Identifier: Apache-2.0

// Upstream generation client.
//
// Sends one generation request to the backend and feeds the streamed
// response bytes through an `EventStreamDecoder`. Transport concerns live
// here and only here: retries with capped exponential backoff on
// retryable failures, a first-chunk timeout, an inter-chunk idle timeout,
// and early disconnect once the decoder reports completion. The decode
// core itself never errors; once bytes are flowing, transport trouble
// degrades to the partial result decoded so far.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;

use crate::config::{Config, RetryConfig};
use crate::stream::{EventStreamDecoder, FinalizedToolCall, SemanticEvent};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to callers of the generation client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream returned status {status}")]
    Status { status: u16 },

    #[error("no data received within {0}ms of the request")]
    FirstChunkTimeout(u64),

    #[error("token provider failed: {0}")]
    Auth(String),
}

impl ClientError {
    /// Whether a fresh attempt could plausibly succeed.
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::FirstChunkTimeout(_) => true,
            ClientError::Status { status } => *status == 429 || *status >= 500,
            ClientError::Auth(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

/// A streaming HTTP response: status plus the raw byte-chunk stream.
pub struct StreamingResponse {
    pub status: u16,
    pub body: BoxStream<'static, Result<Bytes, String>>,
}

/// Sends the generation request upstream.
///
/// Implementations must be Send + Sync so they can be shared across
/// request handlers via `Arc`. Tests inject scripted senders.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(
        &self,
        url: &str,
        body: Value,
        bearer: Option<String>,
    ) -> Result<StreamingResponse, ClientError>;
}

/// Supplies the bearer token for upstream requests.
///
/// Credential storage and refresh live entirely behind this boundary;
/// the client just asks for the current token per attempt.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<Option<String>, ClientError>;
}

/// Environment variable holding the upstream bearer token.
pub const TOKEN_ENV: &str = "CULVERT_TOKEN";

/// Reads a static token from the environment. Absent is fine; some
/// deployments front the backend with ambient network auth.
pub struct EnvTokenProvider;

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn bearer_token(&self) -> Result<Option<String>, ClientError> {
        Ok(std::env::var(TOKEN_ENV).ok())
    }
}

// ---------------------------------------------------------------------------
// Reqwest sender
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(
        &self,
        url: &str,
        body: Value,
        bearer: Option<String>,
    ) -> Result<StreamingResponse, ClientError> {
        let mut req = self.client.post(url).json(&body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp.bytes_stream().map_err(|e| e.to_string()).boxed();
        Ok(StreamingResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The decoded result of one generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    /// Semantic events in emission order.
    pub events: Vec<SemanticEvent>,
    /// Finalized, de-duplicated tool calls.
    pub tool_calls: Vec<FinalizedToolCall>,
    /// True when reading stopped on the decoder's completion signal
    /// rather than transport end-of-stream.
    pub stopped_early: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// One client serves many requests; each request gets its own decoder.
pub struct GenerationClient {
    http: Arc<dyn HttpSender>,
    tokens: Arc<dyn TokenProvider>,
    config: Arc<Config>,
}

impl GenerationClient {
    /// Default wiring: reqwest sender, env token provider. The connect
    /// timeout comes from `upstream.request_timeout_ms`; stream pacing is
    /// handled separately by the first-chunk and idle timeouts.
    pub fn new(config: Arc<Config>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.upstream.request_timeout_ms))
            .build()
            .unwrap_or_default();
        Self::new_with(
            Arc::new(ReqwestHttpSender::new(client)),
            Arc::new(EnvTokenProvider),
            config,
        )
    }

    pub fn new_with(
        http: Arc<dyn HttpSender>,
        tokens: Arc<dyn TokenProvider>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            http,
            tokens,
            config,
        }
    }

    /// Send a generation request and decode its full event timeline.
    ///
    /// Retryable failures before the stream produces anything (transport
    /// errors, 429/5xx, first-chunk timeout) are retried with capped
    /// exponential backoff. Once data has arrived, failures degrade to
    /// the partial result decoded so far.
    pub async fn generate(&self, request: Value) -> Result<GenerationOutcome, ClientError> {
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_generate(&request).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if attempt < retry.max_attempts && err.is_retryable() => {
                    let delay = backoff_delay(retry, attempt);
                    tracing::warn!(
                        %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying upstream request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_generate(&self, request: &Value) -> Result<GenerationOutcome, ClientError> {
        let bearer = self.tokens.bearer_token().await?;
        let response = self
            .http
            .send(&self.config.upstream.endpoint, request.clone(), bearer)
            .await?;

        if !(200..300).contains(&response.status) {
            return Err(ClientError::Status {
                status: response.status,
            });
        }

        self.drain(response.body).await
    }

    async fn drain(
        &self,
        mut body: BoxStream<'static, Result<Bytes, String>>,
    ) -> Result<GenerationOutcome, ClientError> {
        let first_timeout = Duration::from_millis(self.config.stream.first_event_timeout_ms);
        let idle_timeout = Duration::from_millis(self.config.stream.idle_timeout_ms);

        let mut decoder = EventStreamDecoder::new();
        let mut events = Vec::new();
        let mut stopped_early = false;
        let mut saw_chunk = false;

        loop {
            let wait = if saw_chunk {
                idle_timeout
            } else {
                first_timeout
            };
            let chunk = match tokio::time::timeout(wait, body.next()).await {
                Err(_) if !saw_chunk => {
                    return Err(ClientError::FirstChunkTimeout(
                        first_timeout.as_millis() as u64
                    ));
                }
                Err(_) => {
                    tracing::warn!("idle timeout mid-stream, keeping partial result");
                    break;
                }
                Ok(Some(Err(err))) if !saw_chunk => {
                    return Err(ClientError::Transport(err));
                }
                Ok(Some(Err(err))) => {
                    tracing::warn!(%err, "transport error mid-stream, keeping partial result");
                    break;
                }
                Ok(None) => break,
                Ok(Some(Ok(chunk))) => chunk,
            };

            saw_chunk = true;
            events.extend(decoder.feed(&chunk));

            // The backend is known to hold the connection open after
            // logically finishing; drop it as soon as the decoder says
            // the response is complete.
            if decoder.is_complete() {
                stopped_early = true;
                break;
            }
        }

        let tool_calls = decoder.finalized_tool_calls();
        tracing::debug!(
            events = events.len(),
            tool_calls = tool_calls.len(),
            stopped_early,
            "generation stream drained"
        );
        Ok(GenerationOutcome {
            events,
            tool_calls,
            stopped_early,
        })
    }
}

fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let ms = retry
        .backoff_base_ms
        .saturating_mul(1u64 << exp)
        .min(retry.backoff_cap_ms);
    Duration::from_millis(ms)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
