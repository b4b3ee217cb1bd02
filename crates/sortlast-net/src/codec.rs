//! Fragment envelope encode/decode for exchange and reduction transfers.
//!
//! Envelopes are serialized with bincode (standard config). The pixel payload
//! travels as raw bytes inside `data`; its interpretation depends on
//! [`PayloadEncoding`]. The fixed-size final gather does not use envelopes.

use serde::{Deserialize, Serialize};

use sortlast_types::Rect;

use crate::error::{NetError, Result};

// ── Message Types ─────────────────────────────────────────────────────────────

/// How the pixel payload of a [`FragmentMessage`] is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadEncoding {
    /// Every pixel of the span, in order.
    Dense,
    /// Only pixels inside `roi` (full-image coordinates) that fall in the span,
    /// row segment by row segment.
    Roi { roi: Rect },
    /// Run-length pairs `[u32 LE count][pixel record]` covering the span.
    Runs,
}

/// One pixel span sent to a partner during a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentMessage {
    /// Round or reduction step that produced this fragment.
    pub stage: u32,
    /// Wire id of the pixel format.
    pub format_id: u32,
    /// First linear pixel index covered.
    pub first_pixel: u64,
    /// Number of pixels covered.
    pub pixel_count: u64,
    pub encoding: PayloadEncoding,
    pub data: Vec<u8>,
}

/// Encode a [`FragmentMessage`] for a point-to-point send.
pub fn encode_fragment(msg: &FragmentMessage) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(msg, bincode::config::standard())
        .map_err(|e| NetError::Serialization(e.to_string()))
}

/// Decode a [`FragmentMessage`], rejecting inputs larger than `max_bytes`.
pub fn decode_fragment(data: &[u8], max_bytes: usize) -> Result<FragmentMessage> {
    if data.len() > max_bytes {
        return Err(NetError::MessageTooLarge {
            actual: data.len(),
            max: max_bytes,
        });
    }
    let (msg, consumed) =
        bincode::serde::decode_from_slice(data, bincode::config::standard())
            .map_err(|e| NetError::Serialization(e.to_string()))?;
    if consumed != data.len() {
        return Err(NetError::Serialization(format!(
            "{} trailing bytes after fragment envelope",
            data.len() - consumed
        )));
    }
    Ok(msg)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
