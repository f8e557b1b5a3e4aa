//! A very simple demonstration of the data store: run `oram-server` in one
//! terminal, then this demo in another.

extern crate adj_path_oram;

use adj_path_oram::client::Client;
use adj_path_oram::config::{ClientConfig, KeySource};
use adj_path_oram::error::OramError;

fn main() -> Result<(), OramError> {
    let config = ClientConfig {
        n: 256,
        z: 4,
        b: 16,
        leaked_bits: 0,
        server_addr: "127.0.0.1:7878".to_string(),
        key_source: KeySource::Inline(vec![[0u8; 32]]),
        stash_cap: 64,
        rng_seed: None,
    };

    let mut client = Client::connect(&config)?;
    client.put(0, b"hello, oblivious world".to_vec())?;
    let payload = client.get(0)?;
    println!("{}", String::from_utf8_lossy(&payload));
    Ok(())
}
