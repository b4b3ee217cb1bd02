//! Run-length pixel payloads for the compressed merge modes.
//!
//! A payload is a sequence of `[u32 LE count][pixel record]` pairs. Runs
//! never have a zero count and together cover the whole span.

use crate::error::{CompositeError, Result};

const COUNT_BYTES: usize = 4;

/// Run-length encode `pixels`, a slice of whole `bpp`-byte records.
pub fn encode_runs(pixels: &[u8], bpp: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut records = pixels.chunks_exact(bpp).peekable();
    while let Some(first) = records.next() {
        let mut count: u32 = 1;
        while count < u32::MAX && records.peek() == Some(&first) {
            records.next();
            count += 1;
        }
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(first);
    }
    out
}

/// Iterator over `(count, pixel record)` pairs of a run-length payload.
pub struct Runs<'a> {
    data: &'a [u8],
    bpp: usize,
}

impl<'a> Runs<'a> {
    pub fn new(data: &'a [u8], bpp: usize) -> Self {
        Self { data, bpp }
    }
}

impl<'a> Iterator for Runs<'a> {
    type Item = Result<(usize, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let record = COUNT_BYTES + self.bpp;
        if self.data.len() < record {
            self.data = &[];
            return Some(Err(CompositeError::ProtocolMismatch(
                "truncated run-length payload".into(),
            )));
        }
        let (head, rest) = self.data.split_at(record);
        self.data = rest;

        let mut count = [0u8; COUNT_BYTES];
        count.copy_from_slice(&head[..COUNT_BYTES]);
        let count = u32::from_le_bytes(count) as usize;
        if count == 0 {
            self.data = &[];
            return Some(Err(CompositeError::ProtocolMismatch(
                "zero-length run in payload".into(),
            )));
        }
        Some(Ok((count, &head[COUNT_BYTES..])))
    }
}

/// Expand a run-length payload back into `expected_pixels` dense records.
pub fn expand_runs(data: &[u8], bpp: usize, expected_pixels: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_pixels * bpp);
    let mut pixels = 0;
    for run in Runs::new(data, bpp) {
        let (count, pixel) = run?;
        pixels += count;
        if pixels > expected_pixels {
            break;
        }
        for _ in 0..count {
            out.extend_from_slice(pixel);
        }
    }
    if pixels != expected_pixels {
        return Err(CompositeError::ProtocolMismatch(format!(
            "run-length payload covers {pixels} pixels, expected {expected_pixels}"
        )));
    }
    Ok(out)
}
