// Stream coordinator.
//
// Owns all per-request decode state: the byte cursor fed by the transport,
// the last-content value used for duplicate suppression, the single
// tool-call slot, and the finalized tool-call list. Each `feed` call runs
// frame splitting, payload parsing, classification, and dispatch, and
// returns the events that chunk completed.

use serde_json::Value;
use uuid::Uuid;

use super::classifier::classify;
use super::dedupe::dedupe_tool_calls;
use super::frame::split_frames;
use super::types::{EventKind, FinalizedToolCall, SemanticEvent, ToolCallBuffer, ToolCallState};

/// Incremental decoder for one model-generation response stream.
///
/// Feed it raw transport chunks in arrival order; it emits semantic events
/// with strict ordering and no duplication, and assembles streamed
/// tool-call fragments into finalized calls. One instance corresponds to
/// one request; reuse requires `reset` or a fresh instance.
///
/// `feed` is not reentrant and must be called sequentially by a single
/// owner. Nothing here suspends, blocks, or performs I/O.
///
/// Known trade-off: duplicate suppression compares each content chunk to
/// the previous one by exact match, which absorbs the backend's resend
/// quirk but also drops a model output that legitimately repeats the exact
/// same chunk back-to-back. The wire format carries no sequence numbers to
/// tell the two apart.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    cursor: Vec<u8>,
    last_content: Option<String>,
    tool_call: ToolCallState,
    finalized: Vec<FinalizedToolCall>,
    usage_seen: bool,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns the events it completed.
    ///
    /// Chunk boundaries are arbitrary: the same bytes fed whole or split at
    /// any points yield the same event sequence and the same finalized
    /// tool-call list. Anomalies never surface as errors: corrupt framing
    /// resyncs, a malformed payload is dropped, and processing continues
    /// with the next payload.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SemanticEvent> {
        self.cursor.extend_from_slice(chunk);
        let split = split_frames(&self.cursor);
        self.cursor = split.remaining;

        let mut events = Vec::new();
        for payload in &split.payloads {
            let Ok(value) = serde_json::from_str::<Value>(payload) else {
                tracing::debug!(len = payload.len(), "dropping unparseable payload");
                continue;
            };
            self.dispatch(&value, &mut events);
        }
        events
    }

    /// True once the backend has reported usage and no tool call is open.
    ///
    /// The backend is known to hold the connection open after logically
    /// finishing; callers use this, re-checked after every `feed`, to stop
    /// reading without waiting for transport end-of-stream.
    pub fn is_complete(&self) -> bool {
        self.usage_seen && matches!(self.tool_call, ToolCallState::Idle)
    }

    /// Close any still-open tool call and return the de-duplicated list.
    ///
    /// A stream that ends without an explicit stop still yields its last
    /// call. Safe to call repeatedly; later calls return the same list.
    pub fn finalized_tool_calls(&mut self) -> Vec<FinalizedToolCall> {
        self.finalize_current();
        dedupe_tool_calls(&self.finalized)
    }

    /// Clear all state back to initial.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn dispatch(&mut self, payload: &Value, events: &mut Vec<SemanticEvent>) {
        match classify(payload) {
            Some(EventKind::Content) => self.on_content(payload, events),
            Some(EventKind::ToolStart) => self.on_tool_start(payload),
            Some(EventKind::ToolInput) => self.on_tool_input(payload),
            Some(EventKind::ToolStop) => {
                if truthy(payload.get("stop")) {
                    self.finalize_current();
                }
            }
            Some(EventKind::Usage) => {
                self.usage_seen = true;
                events.push(SemanticEvent::Usage {
                    value: payload.get("usage").cloned().unwrap_or(Value::from(0)),
                });
            }
            Some(EventKind::ContextUsage) => {
                events.push(SemanticEvent::ContextUsage {
                    value: payload
                        .get("contextUsagePercentage")
                        .cloned()
                        .unwrap_or(Value::from(0)),
                });
            }
            // Followup payloads are classified but inert; unknown payloads
            // are skipped.
            Some(EventKind::Followup) | None => {}
        }
    }

    fn on_content(&mut self, payload: &Value, events: &mut Vec<SemanticEvent>) {
        // A followup-prompt payload is not assistant text even when it
        // carries a content field.
        if payload.get("followupPrompt").is_some() {
            return;
        }

        let text = payload.get("content").and_then(Value::as_str).unwrap_or("");

        // The backend sometimes resends the last chunk; consecutive
        // identical chunks collapse to one.
        if self.last_content.as_deref() == Some(text) {
            return;
        }
        self.last_content = Some(text.to_string());
        events.push(SemanticEvent::Content {
            text: text.to_string(),
        });
    }

    fn on_tool_start(&mut self, payload: &Value) {
        // A new tool call always closes the previous one, explicit stop
        // signal or not.
        self.finalize_current();

        let id = payload
            .get("toolUseId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let mut buffer = ToolCallBuffer::new(id, name);
        buffer.append_arguments(&input_fragment(payload));
        self.tool_call = ToolCallState::Accumulating(buffer);

        // Some backends open and close an argument-less call in one frame.
        if truthy(payload.get("stop")) {
            self.finalize_current();
        }
    }

    fn on_tool_input(&mut self, payload: &Value) {
        match &mut self.tool_call {
            ToolCallState::Accumulating(buffer) => {
                buffer.append_arguments(&input_fragment(payload));
            }
            ToolCallState::Idle => {
                // No open call to attach the fragment to.
                tracing::debug!("dropping tool input fragment with no open tool call");
            }
        }
    }

    fn finalize_current(&mut self) {
        let state = std::mem::take(&mut self.tool_call);
        if let ToolCallState::Accumulating(buffer) = state {
            let arguments = buffer.canonical_arguments();
            self.finalized.push(FinalizedToolCall {
                id: buffer.id,
                name: buffer.name,
                arguments,
            });
        }
    }
}

/// Extract the fragment text carried by a payload's `input` field.
///
/// String fragments append as-is, since they are slices of a larger JSON text
/// and quoting them would corrupt the reassembly. Anything else is
/// serialized; an absent field contributes nothing.
fn input_fragment(payload: &Value) -> String {
    match payload.get("input") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}
