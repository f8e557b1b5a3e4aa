//! The untrusted server: a flat array of bucket ciphertexts per shard
//! (§4.2, §6), served over [`crate::transport`].
//!
//! The server never decrypts a bucket; it only ever moves opaque blobs
//! between the network and its flat array, indexed `node_id = 1 ..
//! 2^(L+1) - 1` per Design Notes §9.

use crate::error::OramError;
use crate::path_oram::tree_index::CompleteBinaryTreeIndex;
use crate::path_oram::{LeafLabel, TreeHeight};
use crate::ShardIndex;
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

/// One shard's server-resident bucket tree: a flat, 1-indexed array of
/// ciphertext blobs.
#[derive(Clone, Debug)]
pub struct BucketTree {
    height: TreeHeight,
    /// Index `0` is unused; node `i` lives at `nodes[i]`.
    nodes: Vec<Vec<u8>>,
}

impl BucketTree {
    /// Builds a tree of the given height with every bucket set to
    /// `dummy_bucket` (typically an encrypted all-dummy bucket).
    pub fn new(height: TreeHeight, dummy_bucket: Vec<u8>) -> Self {
        let node_count = (1usize << (height + 1)) - 1;
        Self {
            height,
            nodes: vec![dummy_bucket; node_count + 1],
        }
    }

    /// Builds a tree from already-encrypted per-node ciphertexts, in
    /// pre-order starting at node `1`.
    pub fn from_nodes(height: TreeHeight, nodes: Vec<Vec<u8>>) -> Result<Self, OramError> {
        let expected = (1usize << (height + 1)) - 1;
        if nodes.len() != expected {
            return Err(OramError::Protocol(format!(
                "expected {expected} bucket ciphertexts for height {height}, got {}",
                nodes.len()
            )));
        }
        let mut padded = Vec::with_capacity(expected + 1);
        padded.push(Vec::new());
        padded.extend(nodes);
        Ok(Self {
            height,
            nodes: padded,
        })
    }

    /// The tree's height.
    pub fn height(&self) -> TreeHeight {
        self.height
    }

    /// Returns the `height + 1` bucket ciphertexts on `P(leaf)`, root first.
    pub fn read_path(&self, leaf: LeafLabel) -> Result<Vec<Vec<u8>>, OramError> {
        let mut out = Vec::with_capacity(self.height as usize + 1);
        for depth in 0..=self.height {
            let node_id = leaf.node_on_path(depth, self.height)?;
            out.push(self.nodes[node_id as usize].clone());
        }
        Ok(out)
    }

    /// Replaces every bucket on `P(leaf)` with `buckets` (root first).
    pub fn write_path(&mut self, leaf: LeafLabel, buckets: Vec<Vec<u8>>) -> Result<(), OramError> {
        if buckets.len() != self.height as usize + 1 {
            return Err(OramError::Protocol(format!(
                "write_path supplied {} buckets, expected {}",
                buckets.len(),
                self.height + 1
            )));
        }
        for (depth, bucket) in buckets.into_iter().enumerate() {
            let node_id = leaf.node_on_path(depth as TreeHeight, self.height)?;
            self.nodes[node_id as usize] = bucket;
        }
        Ok(())
    }

    /// All node ciphertexts in pre-order, node `1` first, for persistence.
    pub fn nodes(&self) -> &[Vec<u8>] {
        &self.nodes[1..]
    }
}

/// The server side of the protocol: one [`BucketTree`] per shard, each
/// guarded by its own mutex so unrelated shards never contend (§5).
#[derive(Debug, Default)]
pub struct Server {
    shards: Vec<Mutex<Option<BucketTree>>>,
}

impl Server {
    /// Creates a server with `heights.len()` shards, each uninitialized
    /// until [`Server::init_shard`] is called.
    pub fn new(heights: Vec<TreeHeight>) -> Self {
        Self {
            shards: heights.into_iter().map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Provisions shard `i` with a fresh all-dummy tree built from
    /// pre-order ciphertexts (typically produced by encrypting dummy
    /// buckets client-side, so the server never sees plaintext).
    pub fn init_shard(&self, shard: ShardIndex, node_ciphertexts: Vec<Vec<u8>>) -> Result<(), OramError> {
        let total = node_ciphertexts.len() as u64 + 1;
        if !total.is_power_of_two() {
            return Err(OramError::Protocol(format!(
                "{} bucket ciphertexts do not form a complete binary tree",
                node_ciphertexts.len()
            )));
        }
        let height = total.trailing_zeros() - 1;
        let tree = BucketTree::from_nodes(height, node_ciphertexts)?;
        let mut slot = self.shard_mutex(shard)?.lock().unwrap();
        *slot = Some(tree);
        Ok(())
    }

    fn shard_mutex(&self, shard: ShardIndex) -> Result<&Mutex<Option<BucketTree>>, OramError> {
        self.shards
            .get(shard as usize)
            .ok_or_else(|| OramError::Protocol(format!("unknown shard {shard}")))
    }

    /// Fetches the bucket ciphertexts on `P(leaf)` for a shard.
    pub fn read_path(&self, shard: ShardIndex, leaf: LeafLabel) -> Result<Vec<Vec<u8>>, OramError> {
        let guard = self.shard_mutex(shard)?.lock().unwrap();
        let tree = guard
            .as_ref()
            .ok_or_else(|| OramError::Protocol(format!("shard {shard} is not initialized")))?;
        debug!("read_path shard={shard} leaf={leaf}");
        tree.read_path(leaf)
    }

    /// Replaces the bucket ciphertexts on `P(leaf)` for a shard.
    pub fn write_path(
        &self,
        shard: ShardIndex,
        leaf: LeafLabel,
        buckets: Vec<Vec<u8>>,
    ) -> Result<(), OramError> {
        let mut guard = self.shard_mutex(shard)?.lock().unwrap();
        let tree = guard
            .as_mut()
            .ok_or_else(|| OramError::Protocol(format!("shard {shard} is not initialized")))?;
        debug!("write_path shard={shard} leaf={leaf}");
        tree.write_path(leaf, buckets)
    }

    /// Persists every shard's bucket ciphertexts to a flat file: shard
    /// count, then for each shard its height and pre-order node
    /// ciphertexts, all length-prefixed (§6).
    pub fn save(&self, path: &std::path::Path) -> Result<(), OramError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        crate::transport::write_frame(&mut writer, &(self.shards.len() as u32).to_be_bytes())?;
        for shard in &self.shards {
            let guard = shard.lock().unwrap();
            let tree = guard
                .as_ref()
                .ok_or_else(|| OramError::Config("cannot save an uninitialized shard".into()))?;
            crate::transport::write_frame(&mut writer, &tree.height().to_be_bytes())?;
            crate::transport::write_frame(&mut writer, &(tree.nodes().len() as u32).to_be_bytes())?;
            for node in tree.nodes() {
                crate::transport::write_frame(&mut writer, node)?;
            }
        }
        Ok(())
    }

    /// Loads server state previously written by [`Server::save`].
    pub fn load(path: &std::path::Path) -> Result<Self, OramError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let shard_count =
            u32::from_be_bytes(crate::transport::read_frame(&mut reader)?.try_into().unwrap());
        let mut shards = Vec::with_capacity(shard_count as usize);
        for _ in 0..shard_count {
            let height =
                TreeHeight::from_be_bytes(crate::transport::read_frame(&mut reader)?.try_into().unwrap());
            let node_count =
                u32::from_be_bytes(crate::transport::read_frame(&mut reader)?.try_into().unwrap());
            let mut nodes = Vec::with_capacity(node_count as usize);
            for _ in 0..node_count {
                nodes.push(crate::transport::read_frame(&mut reader)?);
            }
            shards.push(Mutex::new(Some(BucketTree::from_nodes(height, nodes)?)));
        }
        Ok(Self { shards })
    }

    /// Runs the request-accept loop: one thread per connection, each
    /// serving requests against this shared server until the peer
    /// disconnects.
    pub fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), OramError> {
        info!("server listening on {:?}", listener.local_addr());
        for stream in listener.incoming() {
            let stream = stream?;
            let server = Arc::clone(&self);
            std::thread::spawn(move || {
                if let Err(e) = Self::serve_connection(&server, stream) {
                    debug!("connection closed: {e}");
                }
            });
        }
        Ok(())
    }

    fn serve_connection(server: &Arc<Server>, mut stream: std::net::TcpStream) -> Result<(), OramError> {
        crate::transport::read_preamble(&mut stream)?;
        loop {
            let payload = match crate::transport::read_frame(&mut stream) {
                Ok(payload) => payload,
                Err(OramError::Transport(_)) => return Ok(()),
                Err(e) => return Err(e),
            };
            let request = crate::transport::Request::decode(&payload)?;
            let response = Self::dispatch(server, &request)?;
            crate::transport::write_frame(&mut stream, &response.encode())?;
        }
    }

    fn dispatch(
        server: &Arc<Server>,
        request: &crate::transport::Request,
    ) -> Result<crate::transport::Response, OramError> {
        match request.op {
            crate::transport::Op::ReadPath => Ok(crate::transport::Response::Path(
                server.read_path(request.shard, request.leaf)?,
            )),
            crate::transport::Op::WritePath => {
                server.write_path(request.shard, request.leaf, request.buckets.clone())?;
                Ok(crate::transport::Response::Ack)
            }
        }
    }
}
