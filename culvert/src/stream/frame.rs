// Copyright 2026 The Culvert Project
// SPDX-License-Identifier: Apache-2.0

// Binary frame splitting.
//
// The backend wire format is a sequence of length-prefixed frames:
//
//   [0:4)     total message length (u32, big-endian, includes prelude and trailing checksum)
//   [4:8)     headers length       (u32, big-endian)
//   [8:12)    prelude checksum     (u32, not verified here)
//   [12:12+H)                      header bytes (not parsed)
//   [12+H : total-4)               payload bytes (UTF-8 JSON text)
//   [total-4 : total)              trailing message checksum (u32, not verified here)
//
// There is no frame-start marker, so recovery from corruption is a 1-byte
// resync: an offset whose claimed total length is implausible is treated as
// garbage and skipped. Splitting never fails; a hostile buffer is at worst
// consumed one byte at a time.

/// Prelude size: total length, headers length, prelude checksum.
const PRELUDE_LEN: usize = 12;

/// Trailing checksum size.
const CHECKSUM_LEN: usize = 4;

/// Smallest plausible frame: prelude plus trailing checksum, no body.
pub const MIN_FRAME_LEN: usize = 16;

/// Largest plausible frame. A length claim above this is corruption.
pub const MAX_FRAME_LEN: usize = 1_000_000;

/// Result of one splitting pass over a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameSplit {
    /// Non-blank payload texts, in wire order.
    pub payloads: Vec<String>,
    /// Unconsumed tail: an incomplete frame or a short prelude. The caller
    /// prepends this to the next batch of bytes.
    pub remaining: Vec<u8>,
}

/// Split every complete frame out of `buffer`.
///
/// Scans from the front. A complete frame with a plausible length yields
/// its payload (lossy UTF-8, blank payloads dropped) and the scan jumps
/// past it; an implausible length advances the scan by a single byte; an
/// incomplete frame stops the scan and is returned as `remaining` along
/// with any trailing bytes too short to hold a prelude.
pub fn split_frames(buffer: &[u8]) -> FrameSplit {
    let mut payloads = Vec::new();
    let mut offset = 0usize;

    while buffer.len() - offset >= PRELUDE_LEN {
        let total_len = read_u32(buffer, offset) as usize;

        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_len) {
            // Implausible length claim. No start marker exists to seek to,
            // so resync one byte at a time.
            offset += 1;
            continue;
        }

        if offset + total_len > buffer.len() {
            // Frame not fully buffered yet; wait for more bytes.
            break;
        }

        let headers_len = read_u32(buffer, offset + 4) as usize;
        let payload_start = offset + PRELUDE_LEN + headers_len;
        let payload_end = offset + total_len - CHECKSUM_LEN;

        // A headers length that swallows the whole frame leaves no payload
        // region; such a frame is silently empty.
        if payload_start < payload_end {
            let text = String::from_utf8_lossy(&buffer[payload_start..payload_end]);
            if !text.trim().is_empty() {
                payloads.push(text.into_owned());
            }
        }

        offset += total_len;
    }

    FrameSplit {
        payloads,
        remaining: buffer[offset..].to_vec(),
    }
}

fn read_u32(buffer: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buffer[at], buffer[at + 1], buffer[at + 2], buffer[at + 3]])
}

/// Encode one frame around a payload, with no header bytes and zeroed
/// checksums (the decode path never verifies them; real checksums are
/// produced backend-side). Used to build fixtures in tests and by the
/// frame-dump diagnostic; the service itself only ever decodes.
pub fn encode_frame(payload: &str) -> Vec<u8> {
    let total = PRELUDE_LEN + payload.len() + CHECKSUM_LEN;
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&(total as u32).to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(payload.as_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf
}
