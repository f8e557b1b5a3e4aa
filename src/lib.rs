//! An adjustable-leakage Path ORAM data store.
//!
//! The address space is split into `2^b` shards by the top `b` bits of the
//! address (§4.7); each shard is an independent Path ORAM (§4.1-§4.6) served
//! over a length-prefixed binary protocol (§4.8) by [`server::Server`].
//! [`client::Client`] ties sharding, transport, and per-shard position
//! maps/stashes together into the data store's public API.

#![warn(clippy::doc_markdown, missing_docs)]

pub mod block;
pub mod checkpoint;
pub mod cipher;
pub mod client;
pub mod config;
pub mod error;
pub mod path_oram;
pub mod server;
pub mod shard;
pub mod transport;

/// The numeric type used to address individual blocks of the data store.
pub type Address = u64;
/// The numeric type identifying one shard of an [`shard::AdjustableShardSet`].
pub type ShardIndex = u16;
