//! Error types for the ORAM store.

use crate::Address;
use thiserror::Error;

/// Errors that can arise from a client access or from crate configuration.
#[derive(Error, Debug)]
pub enum OramError {
    /// The connection to the server dropped, a read was short, or the
    /// framing of a request/response was malformed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Decryption failed or a ciphertext was malformed. Indicates server
    /// corruption or a key mismatch; never recoverable.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The server returned a bucket count that did not match `L+1`, an
    /// unrecognized opcode, or a version mismatch.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Eviction could not place all real blocks within the configured
    /// stash capacity. Indicates parameter mis-sizing or a broken RNG.
    #[error("stash overflow: held {size} blocks, capacity is {capacity}")]
    StashOverflow {
        /// Number of blocks the stash was asked to hold.
        size: usize,
        /// The configured `stash_cap`.
        capacity: usize,
    },

    /// A read was issued against an address that has never been written.
    #[error("address {0:#x} has never been written")]
    UnknownAddress(Address),

    /// `N`, `Z`, `B`, or `b` at startup were invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}
