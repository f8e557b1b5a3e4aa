//! Adjustable-leakage sharding: `2^b` independent Path ORAM instances
//! selected by the top `b` bits of the address (§4.7).

use crate::cipher::Cipher;
use crate::config::{ClientConfig, KeySource};
use crate::error::OramError;
use crate::path_oram::{AccessOp, PathOram};
use crate::transport::PathTransport;
use crate::{Address, ShardIndex};
use rand::{CryptoRng, RngCore};
use std::fs;

/// A tuple of `2^b` independent Path ORAMs, one per leaked address prefix.
pub struct AdjustableShardSet {
    leaked_bits: u8,
    address_width: u32,
    shards: Vec<PathOram>,
}

impl AdjustableShardSet {
    /// Builds a fresh, empty shard set from a validated configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, OramError> {
        config.validate()?;
        let shard_count = config.shard_count();
        let blocks_per_shard = config.blocks_per_shard();
        let height = ((blocks_per_shard as f64) / (config.z as f64)).log2().ceil().max(0.0) as u32;
        let keys = load_keys(&config.key_source, shard_count)?;

        let shards = keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| {
                PathOram::new(
                    i as ShardIndex,
                    height,
                    config.z,
                    config.b,
                    config.stash_cap,
                    Cipher::new(key),
                )
            })
            .collect();

        Ok(Self {
            leaked_bits: config.leaked_bits,
            address_width: Address::BITS,
            shards,
        })
    }

    /// Number of shards, `2^b`.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Splits a global address into its shard index and the address's local
    /// bits within that shard (§4.7): `i = a >> (A - b)`, using only the low
    /// `A - b` bits internally.
    pub fn shard_index(&self, addr: Address) -> (ShardIndex, Address) {
        if self.leaked_bits == 0 {
            return (0, addr);
        }
        let shift = self.address_width - self.leaked_bits as u32;
        let shard = (addr >> shift) as ShardIndex;
        let local_mask = (1u64 << shift) - 1;
        (shard, addr & local_mask)
    }

    /// Delegates one access to the sub-ORAM selected by `addr`'s leaked
    /// prefix.
    pub fn access<T: PathTransport + ?Sized, R: RngCore + CryptoRng>(
        &mut self,
        transport: &mut T,
        op: AccessOp,
        addr: Address,
        rng: &mut R,
    ) -> Result<Option<Vec<u8>>, OramError> {
        let (shard, local_addr) = self.shard_index(addr);
        let oram = self
            .shards
            .get_mut(shard as usize)
            .ok_or_else(|| OramError::Protocol(format!("address {addr:#x} maps to unknown shard {shard}")))?;
        oram.access(transport, op, local_addr, rng)
    }

    /// Access to the underlying sub-ORAMs, for checkpointing.
    pub fn shards(&self) -> &[PathOram] {
        &self.shards
    }

    /// Mutable access to the underlying sub-ORAMs, for checkpoint restore.
    pub fn shards_mut(&mut self) -> &mut [PathOram] {
        &mut self.shards
    }
}

fn load_keys(source: &KeySource, shard_count: usize) -> Result<Vec<[u8; 32]>, OramError> {
    match source {
        KeySource::Inline(keys) => Ok(keys.clone()),
        KeySource::File(path) => {
            let bytes = fs::read(path)?;
            if bytes.len() != shard_count * 32 {
                return Err(OramError::Config(format!(
                    "key file {} held {} bytes, expected {}",
                    path.display(),
                    bytes.len(),
                    shard_count * 32
                )));
            }
            Ok(bytes
                .chunks_exact(32)
                .map(|chunk| chunk.try_into().unwrap())
                .collect())
        }
    }
}
