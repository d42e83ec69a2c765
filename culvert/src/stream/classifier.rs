// Copyright 2026 The Culvert Project
// SPDX-License-Identifier: Apache-2.0

// Payload classification.
//
// Backend payloads carry no explicit type tag; the kind of each event is
// derived from which keys are present. The predicate order is load-bearing:
// a payload can satisfy several predicates at once (a tool-start fragment
// carries `name`, usually `input`, sometimes `stop`), and the order below
// encodes the backend's precedence. First match wins.

use serde_json::Value;

use super::types::EventKind;

/// Classify one decoded payload by key presence.
///
/// Returns `None` for payloads with none of the known keys; callers skip
/// those silently. Malformed or partial objects still classify; this is
/// structural inspection, not schema validation.
pub fn classify(payload: &Value) -> Option<EventKind> {
    if payload.get("content").is_some() {
        return Some(EventKind::Content);
    }
    if payload.get("name").is_some() {
        return Some(EventKind::ToolStart);
    }
    // `name` was checked above, so a bare `input` here is a fragment for
    // an already-open tool call, and a bare `stop` closes one.
    if payload.get("input").is_some() {
        return Some(EventKind::ToolInput);
    }
    if payload.get("stop").is_some() {
        return Some(EventKind::ToolStop);
    }
    if payload.get("followupPrompt").is_some() {
        return Some(EventKind::Followup);
    }
    if payload.get("usage").is_some() {
        return Some(EventKind::Usage);
    }
    if payload.get("contextUsagePercentage").is_some() {
        return Some(EventKind::ContextUsage);
    }
    None
}
