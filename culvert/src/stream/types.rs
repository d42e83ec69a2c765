// Copyright 2026 The Culvert Project
// SPDX-License-Identifier: Apache-2.0

// Stream types: semantic events, payload classification kinds, tool-call
// accumulation state, and finalized tool-call records.

use serde::Serialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Semantic events
// ---------------------------------------------------------------------------

/// An event emitted to the consumer for one decoded payload.
///
/// Tool-call payloads never appear here: a tool call surfaces only once it
/// is finalized, via `EventStreamDecoder::finalized_tool_calls`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SemanticEvent {
    /// A chunk of assistant text, already de-duplicated against the
    /// previous chunk.
    Content { text: String },
    /// Metering value reported by the backend, passed through unparsed.
    Usage { value: Value },
    /// Context-window usage percentage, passed through unparsed.
    ContextUsage { value: Value },
}

// ---------------------------------------------------------------------------
// Payload classification
// ---------------------------------------------------------------------------

/// The kind of one decoded payload, determined by key presence.
///
/// The wire payloads carry no type tag; see `classify` for the predicate
/// order that derives these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Assistant text chunk.
    Content,
    /// A tool call begins (may carry its first argument fragment).
    ToolStart,
    /// An argument fragment for the open tool call.
    ToolInput,
    /// The open tool call is complete.
    ToolStop,
    /// Suggested follow-up prompt; inert beyond suppressing content.
    Followup,
    /// Metering report.
    Usage,
    /// Context-window usage report.
    ContextUsage,
}

// ---------------------------------------------------------------------------
// Tool-call accumulation
// ---------------------------------------------------------------------------

/// Canonical arguments used when nothing parseable was accumulated.
pub const EMPTY_ARGUMENTS: &str = "{}";

/// The decoder's single tool-call slot.
///
/// At most one tool call is ever in flight; a new start while one is open
/// finalizes the previous call first. Modeled as an explicit state rather
/// than an `Option` so the supersession transition is visible at the type
/// level.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ToolCallState {
    /// No tool call in progress.
    #[default]
    Idle,
    /// A tool call is being assembled from streamed fragments.
    Accumulating(ToolCallBuffer),
}

/// Accumulates one tool call's argument text across fragments.
///
/// Fragments are raw slices of a larger JSON text and are concatenated
/// verbatim; only the final concatenation is parsed, at finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallBuffer {
    /// Tool-use id from the wire, or a generated one when absent.
    pub id: String,
    /// Tool name from the wire; empty when the backend omitted it.
    pub name: String,
    /// Raw concatenation of streamed argument fragments.
    pub arguments_json: String,
}

impl ToolCallBuffer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments_json: String::new(),
        }
    }

    /// Append one raw argument fragment.
    pub fn append_arguments(&mut self, fragment: &str) {
        self.arguments_json.push_str(fragment);
    }

    /// Canonicalize the accumulated text.
    ///
    /// Blank input yields the empty-object placeholder. Parseable input is
    /// re-serialized, which normalizes formatting across fragment
    /// boundaries. Unparseable input degrades to the placeholder rather
    /// than failing; the stream must keep flowing.
    pub fn canonical_arguments(&self) -> String {
        let raw = self.arguments_json.trim();
        if raw.is_empty() {
            return EMPTY_ARGUMENTS.to_string();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => value.to_string(),
            Err(err) => {
                tracing::warn!(
                    tool = %self.name,
                    %err,
                    "accumulated tool arguments are not valid JSON, using empty object"
                );
                EMPTY_ARGUMENTS.to_string()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Finalized tool calls
// ---------------------------------------------------------------------------

/// A closed tool call. Immutable once appended to the finalized list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedToolCall {
    pub id: String,
    pub name: String,
    /// Canonical JSON text; `"{}"` when nothing usable was accumulated.
    pub arguments: String,
}
