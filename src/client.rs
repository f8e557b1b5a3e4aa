//! The public data store API: sharding, transport, and checkpointing tied
//! together behind `get`/`put`.

use crate::checkpoint::{load_checkpoint, save_checkpoint};
use crate::config::ClientConfig;
use crate::error::OramError;
use crate::path_oram::AccessOp;
use crate::shard::AdjustableShardSet;
use crate::transport::{PathTransport, TcpTransport};
use crate::Address;
use log::info;
use rand::rngs::StdRng;
use rand::{CryptoRng, RngCore, SeedableRng};
use std::path::Path;

/// The oblivious data store's client handle: one TCP connection, one
/// [`AdjustableShardSet`], and the RNG used for remapping and IVs.
pub struct Client<T: PathTransport, R: RngCore + CryptoRng> {
    shards: AdjustableShardSet,
    transport: T,
    rng: R,
}

impl Client<TcpTransport, StdRng> {
    /// Connects to `config.server_addr` and builds a fresh (empty) shard
    /// set. Use [`Client::restore`] instead to resume from a checkpoint.
    pub fn connect(config: &ClientConfig) -> Result<Self, OramError> {
        config.validate()?;
        let transport = TcpTransport::connect(&config.server_addr)?;
        let shards = AdjustableShardSet::new(config)?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!("client connected to {} with {} shard(s)", config.server_addr, shards.shard_count());
        Ok(Self { shards, transport, rng })
    }

    /// Connects and restores the position map and stash of every shard
    /// from a checkpoint written by [`Client::checkpoint`].
    pub fn restore(config: &ClientConfig, checkpoint_path: &Path) -> Result<Self, OramError> {
        let mut client = Self::connect(config)?;
        load_checkpoint(checkpoint_path, &mut client.shards)?;
        Ok(client)
    }
}

impl<T: PathTransport, R: RngCore + CryptoRng> Client<T, R> {
    /// Builds a client directly from its parts. Mainly useful for tests,
    /// where the transport is a [`crate::transport::LocalTransport`].
    pub fn from_parts(shards: AdjustableShardSet, transport: T, rng: R) -> Self {
        Self { shards, transport, rng }
    }

    /// Obliviously reads the payload at `addr`. Returns
    /// `Err(OramError::UnknownAddress)` if `addr` has never been written.
    pub fn get(&mut self, addr: Address) -> Result<Vec<u8>, OramError> {
        self.shards
            .access(&mut self.transport, AccessOp::Read, addr, &mut self.rng)
            .map(|value| value.expect("a successful Read access always returns a payload"))
    }

    /// Obliviously writes `payload` to `addr`, creating the address if it
    /// did not already exist.
    pub fn put(&mut self, addr: Address, payload: Vec<u8>) -> Result<(), OramError> {
        self.shards
            .access(&mut self.transport, AccessOp::Write(payload), addr, &mut self.rng)
            .map(|_| ())
    }

    /// Atomically checkpoints every shard's position map and stash to
    /// `path` (§6). Should be called before clean shutdown.
    pub fn checkpoint(&self, path: &Path) -> Result<(), OramError> {
        save_checkpoint(path, &self.shards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::Cipher;
    use crate::config::KeySource;
    use crate::path_oram::Bucket;
    use crate::server::Server;
    use crate::transport::LocalTransport;
    use std::sync::Arc;

    fn test_client(n: u64, z: usize, payload_len: usize) -> Client<LocalTransport, StdRng> {
        let config = ClientConfig {
            n,
            z,
            b: payload_len,
            leaked_bits: 0,
            server_addr: "127.0.0.1:0".into(),
            key_source: KeySource::Inline(vec![[2u8; 32]]),
            stash_cap: 64,
            rng_seed: Some(0),
        };
        let mut rng = StdRng::seed_from_u64(0);
        let shards = AdjustableShardSet::new(&config).unwrap();
        let height = shards.shards()[0].height();
        let cipher = Cipher::new([2u8; 32]);
        let server = Arc::new(Server::new(vec![height]));
        let dummy_ciphertexts: Vec<Vec<u8>> = (0..((1u64 << (height + 1)) - 1))
            .map(|_| cipher.encrypt(&Bucket::dummy(z).to_bytes(payload_len), &mut rng))
            .collect();
        server.init_shard(0, dummy_ciphertexts).unwrap();
        let transport = LocalTransport::new(server);
        Client::from_parts(shards, transport, rng)
    }

    #[test]
    fn empty_read_is_unknown_address() {
        let mut client = test_client(16, 4, 16);
        assert!(matches!(client.get(0x42), Err(OramError::UnknownAddress(0x42))));
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut client = test_client(16, 4, 16);
        client.put(0x42, vec![1u8; 16]).unwrap();
        assert_eq!(client.get(0x42).unwrap(), vec![1u8; 16]);
    }
}
