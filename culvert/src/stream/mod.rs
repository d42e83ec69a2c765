// Copyright 2026 The Culvert Project
// SPDX-License-Identifier: Apache-2.0

// Wire-stream decoding.
//
// Responsibilities:
// - Split the backend's length-prefixed binary frames out of a growing byte buffer
// - Classify each frame's JSON payload by key presence (no type tag on the wire)
// - Assemble streamed tool-call fragments into finalized, de-duplicated calls
// - Absorb backend quirks: resent content chunks, repeated tool starts,
//   stray stop flags, fragments split at arbitrary byte boundaries
// - Expose a completion signal so the transport layer can stop reading early
//
// Everything in this module is pure computation over in-memory buffers and
// never raises an error to the caller; anomalies degrade to the best
// available partial result.

mod classifier;
mod decoder;
mod dedupe;
mod frame;
mod types;

pub use classifier::classify;
pub use decoder::EventStreamDecoder;
pub use dedupe::dedupe_tool_calls;
pub use frame::{encode_frame, split_frames, FrameSplit, MAX_FRAME_LEN, MIN_FRAME_LEN};
pub use types::{EventKind, FinalizedToolCall, SemanticEvent, ToolCallBuffer, ToolCallState};
