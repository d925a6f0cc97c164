//! Run-length coding for bookmark state blobs.
//!
//! State snapshots are dominated by zeroed RAM, so they are run-length coded
//! before being hex-encoded into the log. The stream is a sequence of blocks:
//!
//! - `0x00 | len u32 LE | len literal bytes`
//! - `0x01 | len u32 LE | value` (value repeated `len` times)
//!
//! Runs shorter than [`MIN_RUN`] are folded into the surrounding literal block.

/// Shortest run of equal bytes worth a run block.
pub const MIN_RUN: usize = 5;

/// Upper bound on the size of a decoded blob.
pub const MAX_DECODED_LEN: usize = 64 << 20;

const TAG_LITERAL: u8 = 0;
const TAG_RUN: u8 = 1;
const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RleError {
    #[error("unknown block tag {tag:#04x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("block truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("decoded size exceeds {} bytes", MAX_DECODED_LEN)]
    TooLarge,
}

/// Encode `data`. An empty input encodes to an empty stream.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(data.len() / 4 + HEADER_LEN);
    let mut literal_start = 0;
    let mut i = 0;

    while i < data.len() {
        let run = data[i..].iter().take_while(|&&b| b == data[i]).count();
        if run >= MIN_RUN {
            push_literal(&mut encoded, &data[literal_start..i]);
            push_block(&mut encoded, TAG_RUN, run);
            encoded.push(data[i]);
            i += run;
            literal_start = i;
        } else {
            i += run;
        }
    }
    push_literal(&mut encoded, &data[literal_start..]);

    encoded
}

fn push_block(encoded: &mut Vec<u8>, tag: u8, len: usize) {
    encoded.push(tag);
    encoded.extend_from_slice(&(len as u32).to_le_bytes());
}

fn push_literal(encoded: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    push_block(encoded, TAG_LITERAL, bytes.len());
    encoded.extend_from_slice(bytes);
}

/// Decode a stream produced by [`encode`].
pub fn decode(encoded: &[u8]) -> Result<Vec<u8>, RleError> {
    let mut decoded = Vec::new();
    let mut pos = 0;

    while pos < encoded.len() {
        let header = encoded
            .get(pos..pos + HEADER_LEN)
            .ok_or(RleError::Truncated { offset: pos })?;
        let tag = header[0];
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;

        if decoded.len().saturating_add(len) > MAX_DECODED_LEN {
            return Err(RleError::TooLarge);
        }

        let body = pos + HEADER_LEN;
        match tag {
            TAG_LITERAL => {
                let bytes = encoded
                    .get(body..body + len)
                    .ok_or(RleError::Truncated { offset: pos })?;
                decoded.extend_from_slice(bytes);
                pos = body + len;
            }
            TAG_RUN => {
                let value = *encoded
                    .get(body)
                    .ok_or(RleError::Truncated { offset: pos })?;
                decoded.resize(decoded.len() + len, value);
                pos = body + 1;
            }
            tag => return Err(RleError::UnknownTag { tag, offset: pos }),
        }
    }

    Ok(decoded)
}
