//! The Path ORAM access protocol: remap, fetch path, serve, evict, write
//! path (§4.6).

pub mod bucket;
pub mod position_map;
pub mod stash;
pub mod tree_index;

pub use bucket::Bucket;
pub use position_map::PositionMap;
pub use stash::Stash;
pub use tree_index::CompleteBinaryTreeIndex;

use crate::cipher::Cipher;
use crate::error::OramError;
use crate::transport::PathTransport;
use crate::{Address, ShardIndex};
use rand::{CryptoRng, RngCore};

/// A tree node id, doubling as a leaf label (see `tree_index`).
pub type LeafLabel = u64;
/// The height `L` of a bucket tree.
pub type TreeHeight = u32;

/// The parameter `Z` from the Path ORAM literature: blocks per bucket.
/// Typical values are 3 or 4; this crate follows the more conservative
/// default of 4.
pub const DEFAULT_BLOCKS_PER_BUCKET: usize = 4;

/// The requested operation of an [`PathOram::access`] call.
#[derive(Clone, Debug)]
pub enum AccessOp {
    /// Read the current payload.
    Read,
    /// Overwrite the payload with `0`.
    Write(Vec<u8>),
}

/// One Path ORAM instance: a bucket tree's client-side counterpart — a
/// stash, a position map, and the cipher used to open/seal its buckets.
///
/// `PathOram` owns no network state; every access takes the transport it
/// should use, so that an [`crate::shard::AdjustableShardSet`] can share one
/// transport (one TCP connection) across all of its sub-ORAMs.
#[derive(Debug)]
pub struct PathOram {
    shard: ShardIndex,
    height: TreeHeight,
    z: usize,
    payload_len: usize,
    stash: Stash,
    position_map: PositionMap,
    cipher: Cipher,
}

impl PathOram {
    /// Builds a new, empty Path ORAM. The caller is responsible for having
    /// provisioned the server-side tree for `shard` (see
    /// `Server::init_shard`) before the first access.
    pub fn new(
        shard: ShardIndex,
        height: TreeHeight,
        z: usize,
        payload_len: usize,
        stash_cap: usize,
        cipher: Cipher,
    ) -> Self {
        Self {
            shard,
            height,
            z,
            payload_len,
            stash: Stash::new(stash_cap),
            position_map: PositionMap::new(),
            cipher,
        }
    }

    /// Height of this ORAM's bucket tree.
    pub fn height(&self) -> TreeHeight {
        self.height
    }

    /// Current stash occupancy, for invariant checks and monitoring.
    pub fn stash_len(&self) -> usize {
        self.stash.len()
    }

    /// The payload length `B`, in bytes, of blocks in this ORAM.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Number of live addresses currently tracked by the position map.
    pub fn position_map_len(&self) -> usize {
        self.position_map.len()
    }

    /// Every `(addr, leaf)` entry of the position map, for checkpointing.
    pub fn position_map_entries(&self) -> impl Iterator<Item = (Address, LeafLabel)> + '_ {
        self.position_map.iter()
    }

    /// Every real block currently held in the stash, for checkpointing.
    pub fn stash_blocks(&self) -> Vec<&crate::block::Block> {
        self.stash.iter().collect()
    }

    /// Replaces this ORAM's position map and stash wholesale, as done when
    /// restoring from a checkpoint. The caller is responsible for having
    /// matched this ORAM's `(height, z, payload_len)` against the
    /// checkpoint it is restoring.
    pub fn restore_checkpoint(
        &mut self,
        entries: Vec<(Address, LeafLabel)>,
        blocks: Vec<crate::block::Block>,
    ) -> Result<(), OramError> {
        self.position_map.clear();
        for (addr, leaf) in entries {
            self.position_map.set(addr, leaf);
        }
        self.stash.clear();
        for block in blocks {
            self.stash.add(block)?;
        }
        Ok(())
    }

    /// Performs one oblivious access: read, or write plus return of the
    /// prior value's success. Implements the five phases of §4.6.
    pub fn access<T: PathTransport + ?Sized, R: RngCore + CryptoRng>(
        &mut self,
        transport: &mut T,
        op: AccessOp,
        addr: Address,
        rng: &mut R,
    ) -> Result<Option<Vec<u8>>, OramError> {
        // Phase (i): remap. An address that has never been assigned a leaf
        // is still given a pseudo-random "current" leaf to fetch, so the
        // server sees an identically shaped access whether or not the
        // address has ever been written (§8 scenario 1).
        let previous_leaf = self.position_map.get(addr);
        let had_entry = previous_leaf.is_some();
        let fetch_leaf = previous_leaf.unwrap_or_else(|| LeafLabel::random_leaf(self.height, rng));
        let new_leaf = LeafLabel::random_leaf(self.height, rng);
        self.position_map.set(addr, new_leaf);

        // Phase (ii): read path.
        if let Err(e) = self.read_path_into_stash(transport, fetch_leaf) {
            self.position_map.restore(addr, previous_leaf);
            return Err(e);
        }

        // Phase (iii): serve.
        let existed_in_stash = self.stash.find(addr).is_some();
        let unknown_address = matches!(op, AccessOp::Read) && !had_entry && !existed_in_stash;

        let result = match &op {
            AccessOp::Read => {
                let value = self.stash.find(addr).map(|b| b.payload().to_vec());
                if let Some(block) = self.stash.find_mut(addr) {
                    block.set_leaf(new_leaf);
                }
                value
            }
            AccessOp::Write(data) => {
                if let Some(block) = self.stash.find_mut(addr) {
                    block.set_payload(data.clone());
                    block.set_leaf(new_leaf);
                } else {
                    let block = crate::block::Block::Real {
                        addr,
                        leaf: new_leaf,
                        payload: data.clone(),
                    };
                    if let Err(e) = self.stash.add(block) {
                        self.position_map.restore(addr, previous_leaf);
                        return Err(e);
                    }
                }
                None
            }
        };

        // Phase (iv): evict, leaf-first (depth L down to 0), and
        // (v) write path.
        if let Err(e) = self.evict_and_write_path(transport, fetch_leaf, rng) {
            self.position_map.restore(addr, previous_leaf);
            return Err(e);
        }

        if unknown_address {
            self.position_map.restore(addr, previous_leaf);
            return Err(OramError::UnknownAddress(addr));
        }
        Ok(result)
    }

    fn read_path_into_stash<T: PathTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        leaf: LeafLabel,
    ) -> Result<(), OramError> {
        let ciphertexts = transport.read_path(self.shard, leaf)?;
        if ciphertexts.len() != (self.height + 1) as usize {
            return Err(OramError::Protocol(format!(
                "server returned {} buckets, expected {}",
                ciphertexts.len(),
                self.height + 1
            )));
        }
        for ciphertext in ciphertexts {
            let plaintext = self.cipher.decrypt(&ciphertext)?;
            let bucket = Bucket::from_bytes(&plaintext, self.z, self.payload_len)?;
            for block in bucket.slots {
                if !block.is_dummy() {
                    self.stash.add(block)?;
                }
            }
        }
        Ok(())
    }

    fn evict_and_write_path<T: PathTransport + ?Sized, R: RngCore + CryptoRng>(
        &mut self,
        transport: &mut T,
        leaf: LeafLabel,
        rng: &mut R,
    ) -> Result<(), OramError> {
        let mut new_buckets = Vec::with_capacity(self.height as usize + 1);
        for depth in (0..=self.height).rev() {
            let mut slots = self.stash.drain_for_bucket(leaf, depth, self.height, self.z)?;
            while slots.len() < self.z {
                slots.push(crate::block::Block::dummy());
            }
            new_buckets.push((depth, Bucket { slots }));
        }
        new_buckets.sort_by_key(|(depth, _)| *depth);

        let ciphertexts: Vec<Vec<u8>> = new_buckets
            .iter()
            .map(|(_, bucket)| self.cipher.encrypt(&bucket.to_bytes(self.payload_len), rng))
            .collect();

        if let Err(e) = transport.write_path(self.shard, leaf, ciphertexts) {
            // Roll back: put the drained real blocks back into the stash.
            for (_, bucket) in new_buckets {
                for block in bucket.slots {
                    if !block.is_dummy() {
                        // Capacity cannot be exceeded here: these blocks were
                        // just removed from this same stash.
                        let _ = self.stash.add(block);
                    }
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Server;
    use crate::transport::LocalTransport;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn new_test_oram(height: TreeHeight, z: usize, payload_len: usize, stash_cap: usize) -> (PathOram, LocalTransport) {
        let mut rng = StdRng::seed_from_u64(42);
        let cipher = Cipher::new([11u8; 32]);
        let server = Arc::new(Server::new(vec![height]));
        let dummy_ciphertexts: Vec<Vec<u8>> = (0..((1u64 << (height + 1)) - 1))
            .map(|_| cipher.encrypt(&Bucket::dummy(z).to_bytes(payload_len), &mut rng))
            .collect();
        server.init_shard(0, dummy_ciphertexts).unwrap();
        let transport = LocalTransport::new(server);
        let oram = PathOram::new(0, height, z, payload_len, stash_cap, cipher);
        (oram, transport)
    }

    #[test]
    fn read_of_unknown_address_is_typed_error() {
        let (mut oram, mut transport) = new_test_oram(3, 4, 16, 64);
        let mut rng = StdRng::seed_from_u64(7);
        let result = oram.access(&mut transport, AccessOp::Read, 0x42, &mut rng);
        assert!(matches!(result, Err(OramError::UnknownAddress(0x42))));
    }

    #[test]
    fn repeated_read_of_unknown_address_stays_unknown() {
        let (mut oram, mut transport) = new_test_oram(3, 4, 16, 64);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..3 {
            let result = oram.access(&mut transport, AccessOp::Read, 0x42, &mut rng);
            assert!(matches!(result, Err(OramError::UnknownAddress(0x42))));
        }
        assert_eq!(oram.position_map.get(0x42), None);
    }

    #[test]
    fn write_then_read_round_trips() {
        let (mut oram, mut transport) = new_test_oram(3, 4, 16, 64);
        let mut rng = StdRng::seed_from_u64(7);
        let payload = vec![7u8; 16];
        oram.access(&mut transport, AccessOp::Write(payload.clone()), 0x42, &mut rng)
            .unwrap();
        let result = oram
            .access(&mut transport, AccessOp::Read, 0x42, &mut rng)
            .unwrap();
        assert_eq!(result, Some(payload));
    }

    #[test]
    fn position_map_entry_changes_on_every_access() {
        let (mut oram, mut transport) = new_test_oram(3, 4, 16, 64);
        let mut rng = StdRng::seed_from_u64(7);
        oram.access(&mut transport, AccessOp::Write(vec![1u8; 16]), 0x42, &mut rng)
            .unwrap();
        let leaf_after_write = oram.position_map.get(0x42).unwrap();
        oram.access(&mut transport, AccessOp::Read, 0x42, &mut rng)
            .unwrap();
        let leaf_after_read = oram.position_map.get(0x42).unwrap();
        assert_ne!(leaf_after_write, leaf_after_read);
    }

    #[test]
    fn many_random_accesses_never_overflow_stash() {
        let (mut oram, mut transport) = new_test_oram(7, 4, 16, 64);
        let mut rng = StdRng::seed_from_u64(99);
        let mut mirror = std::collections::HashMap::new();
        use rand::Rng;
        for i in 0..2000u64 {
            let addr = rng.gen_range(0..64);
            let payload = vec![(i % 251) as u8; 16];
            oram.access(&mut transport, AccessOp::Write(payload.clone()), addr, &mut rng)
                .unwrap();
            mirror.insert(addr, payload);
            assert!(oram.stash_len() <= 64);
        }
        for (addr, payload) in mirror {
            let result = oram
                .access(&mut transport, AccessOp::Read, addr, &mut rng)
                .unwrap();
            assert_eq!(result, Some(payload));
        }
    }
}
