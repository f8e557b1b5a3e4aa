//! A bucket: `Z` block slots, serialized as one blob before encryption.

use crate::block::Block;
use crate::error::OramError;

/// An ordered list of exactly `Z` slots, each holding one block (possibly
/// dummy).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// The blocks held by this bucket, always of length `Z`.
    pub slots: Vec<Block>,
}

impl Bucket {
    /// A bucket with all `z` slots set to dummy.
    pub fn dummy(z: usize) -> Self {
        Self {
            slots: vec![Block::dummy(); z],
        }
    }

    /// Serializes the bucket as `Z` concatenated block records.
    pub fn to_bytes(&self, payload_len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.slots.len() * (1 + 8 + 4 + payload_len));
        for slot in &self.slots {
            out.extend(slot.to_bytes(payload_len));
        }
        out
    }

    /// Parses a bucket of `z` slots from its serialized form.
    pub fn from_bytes(bytes: &[u8], z: usize, payload_len: usize) -> Result<Self, OramError> {
        let record_len = 1 + 8 + 4 + payload_len;
        if bytes.len() != record_len * z {
            return Err(OramError::Protocol(format!(
                "bucket blob was {} bytes, expected {}",
                bytes.len(),
                record_len * z
            )));
        }
        let mut slots = Vec::with_capacity(z);
        for chunk in bytes.chunks_exact(record_len) {
            slots.push(Block::from_bytes(chunk, payload_len)?);
        }
        Ok(Self { slots })
    }
}
