// Finalized tool-call deduplication.
//
// Backend retries and redundant stop signaling can finalize the same
// logical call more than once: once with a partial or empty argument set
// and again complete, or twice complete under two generated ids. This
// pass collapses those duplicates after the stream is fully decoded.

use std::collections::{HashMap, HashSet};

use super::types::{FinalizedToolCall, EMPTY_ARGUMENTS};

/// Collapse duplicate and partial records out of a finalized list.
///
/// Pass 1 keeps one record per id: real arguments beat the empty-object
/// placeholder, and longer argument text beats shorter (fragments only
/// ever grow before finalization, so longer means more complete).
/// Records without an id are unusable downstream and are dropped.
///
/// Pass 2 drops records whose (name, arguments) pair repeats one already
/// kept: the same logical call finalized under two different generated
/// ids, as happens across a retried request segment.
///
/// Order of first occurrence by id is preserved.
pub fn dedupe_tool_calls(calls: &[FinalizedToolCall]) -> Vec<FinalizedToolCall> {
    let mut order: Vec<&str> = Vec::new();
    let mut best: HashMap<&str, &FinalizedToolCall> = HashMap::new();

    for call in calls {
        if call.id.is_empty() {
            continue;
        }
        if let Some(kept) = best.get(call.id.as_str()).copied() {
            if prefer_over(call, kept) {
                best.insert(call.id.as_str(), call);
            }
        } else {
            order.push(call.id.as_str());
            best.insert(call.id.as_str(), call);
        }
    }

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut result = Vec::with_capacity(order.len());
    for id in order {
        let call = best[id];
        if seen.insert((call.name.as_str(), call.arguments.as_str())) {
            result.push(call.clone());
        }
    }
    result
}

/// True when `candidate` should replace `kept` for the same id.
fn prefer_over(candidate: &FinalizedToolCall, kept: &FinalizedToolCall) -> bool {
    if candidate.arguments == EMPTY_ARGUMENTS {
        return false;
    }
    kept.arguments == EMPTY_ARGUMENTS || candidate.arguments.len() > kept.arguments.len()
}
