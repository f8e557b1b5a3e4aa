//! The fixed-size record stored in every bucket slot.
//!
//! Serialization is little-endian, per the design: `[tag: 1 | addr: 8 |
//! leaf: 4 | payload: B]`. The tag byte is the authoritative discriminant
//! between a filler slot and a real block (Design Notes §9); `addr` is kept
//! at `0` for dummies as a redundant, human-debuggable convention.

use crate::error::OramError;
use crate::path_oram::LeafLabel;
use crate::Address;

const DUMMY_TAG: u8 = 0;
const REAL_TAG: u8 = 1;

/// A block: either a filler occupying a slot, or real client data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    /// A filler block. Participates in encryption and eviction but is
    /// semantically absent.
    Dummy,
    /// A live client block.
    Real {
        /// Stable logical address, unique within a shard.
        addr: Address,
        /// The leaf label naming the path this block currently lives on.
        leaf: LeafLabel,
        /// The block's plaintext payload, exactly `B` bytes.
        payload: Vec<u8>,
    },
}

impl Block {
    /// Returns a filler block.
    pub fn dummy() -> Self {
        Block::Dummy
    }

    /// True for filler blocks.
    pub fn is_dummy(&self) -> bool {
        matches!(self, Block::Dummy)
    }

    /// The block's address, or `0` for a dummy.
    pub fn addr(&self) -> Address {
        match self {
            Block::Dummy => 0,
            Block::Real { addr, .. } => *addr,
        }
    }

    /// The block's leaf label, if it is real.
    pub fn leaf(&self) -> Option<LeafLabel> {
        match self {
            Block::Dummy => None,
            Block::Real { leaf, .. } => Some(*leaf),
        }
    }

    /// Overwrites the leaf label of a real block. No-op on a dummy.
    pub fn set_leaf(&mut self, new_leaf: LeafLabel) {
        if let Block::Real { leaf, .. } = self {
            *leaf = new_leaf;
        }
    }

    /// The block's payload, or an empty slice for a dummy.
    pub fn payload(&self) -> &[u8] {
        match self {
            Block::Dummy => &[],
            Block::Real { payload, .. } => payload,
        }
    }

    /// Overwrites the payload of a real block. No-op on a dummy.
    pub fn set_payload(&mut self, data: Vec<u8>) {
        if let Block::Real { payload, .. } = self {
            *payload = data;
        }
    }

    /// Serializes the block into exactly `1 + 8 + 4 + payload_len` bytes.
    pub fn to_bytes(&self, payload_len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 8 + 4 + payload_len);
        match self {
            Block::Dummy => {
                out.push(DUMMY_TAG);
                out.extend_from_slice(&0u64.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend(std::iter::repeat(0u8).take(payload_len));
            }
            Block::Real { addr, leaf, payload } => {
                debug_assert_eq!(payload.len(), payload_len);
                out.push(REAL_TAG);
                out.extend_from_slice(&addr.to_le_bytes());
                out.extend_from_slice(&(*leaf as u32).to_le_bytes());
                out.extend_from_slice(payload);
                out.resize(1 + 8 + 4 + payload_len, 0);
            }
        }
        out
    }

    /// Parses a block from a `1 + 8 + 4 + payload_len`-byte record.
    pub fn from_bytes(bytes: &[u8], payload_len: usize) -> Result<Self, OramError> {
        let expected = 1 + 8 + 4 + payload_len;
        if bytes.len() != expected {
            return Err(OramError::Protocol(format!(
                "block record was {} bytes, expected {expected}",
                bytes.len()
            )));
        }
        let tag = bytes[0];
        let addr = u64::from_le_bytes(bytes[1..9].try_into().unwrap());
        let leaf = u32::from_le_bytes(bytes[9..13].try_into().unwrap());
        let payload = bytes[13..].to_vec();
        match tag {
            DUMMY_TAG => Ok(Block::Dummy),
            REAL_TAG => Ok(Block::Real {
                addr,
                leaf: leaf as LeafLabel,
                payload,
            }),
            other => Err(OramError::Protocol(format!("unrecognized block tag {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_dummy() {
        let block = Block::dummy();
        let bytes = block.to_bytes(16);
        assert_eq!(bytes.len(), 1 + 8 + 4 + 16);
        assert_eq!(Block::from_bytes(&bytes, 16).unwrap(), Block::Dummy);
    }

    #[test]
    fn round_trips_real() {
        let block = Block::Real {
            addr: 0x42,
            leaf: 7,
            payload: vec![9u8; 16],
        };
        let bytes = block.to_bytes(16);
        let back = Block::from_bytes(&bytes, 16).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn rejects_bad_length() {
        assert!(Block::from_bytes(&[0u8; 4], 16).is_err());
    }
}
