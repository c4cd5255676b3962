//! Posting-list codec: review-id gaps plus frequencies, varint-packed.
//!
//! Review ids in a posting list are strictly increasing, so successive gaps
//! stay small and the variable-byte encoding (7 data bits per byte, high bit
//! set on continuation bytes) keeps lists compact. Decoding is one sequential
//! scan; there is no random access inside a list.

use crate::error::{IndexError, Result};
use crate::ReviewId;

pub fn write_varint(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u32> {
    let mut value = 0u32;
    let mut shift = 0u32;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| IndexError::Corruption("truncated varint".to_string()))?;
        *pos += 1;
        if shift == 28 && byte & 0x70 != 0 {
            return Err(IndexError::Corruption("varint overflows u32".to_string()));
        }
        value |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 28 {
            return Err(IndexError::Corruption("varint overflows u32".to_string()));
        }
    }
}

/// Encode one posting list. The first review id is absolute, the rest are
/// gaps from the previous id; frequencies are stored verbatim, interleaved.
pub fn encode_postings(list: &[(ReviewId, u32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(list.len() * 2);
    let mut prev = 0u32;
    for (i, &(review_id, frequency)) in list.iter().enumerate() {
        debug_assert!(i == 0 || review_id > prev, "posting list must be strictly increasing");
        let gap = if i == 0 { review_id } else { review_id - prev };
        write_varint(&mut out, gap);
        write_varint(&mut out, frequency);
        prev = review_id;
    }
    out
}

/// Decode a blob slice produced by [`encode_postings`].
pub fn decode_postings(bytes: &[u8]) -> Result<Vec<(ReviewId, u32)>> {
    let mut list = Vec::new();
    let mut pos = 0usize;
    let mut prev = 0u32;
    while pos < bytes.len() {
        let gap = read_varint(bytes, &mut pos)?;
        let frequency = read_varint(bytes, &mut pos)?;
        let review_id = if list.is_empty() { gap } else { prev + gap };
        list.push((review_id, frequency));
        prev = review_id;
    }
    Ok(list)
}
