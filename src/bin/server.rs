//! A minimal standalone server binary. Provisions one all-dummy shard per
//! `ServerConfig::shard_heights` and serves requests until killed.
//!
//! CLI parsing and configuration file loading are out of scope (spec §1);
//! operators wanting a different address or shard layout should use
//! `adj_path_oram::server::Server` as a library instead of this binary.

use adj_path_oram::cipher::Cipher;
use adj_path_oram::config::ServerConfig;
use adj_path_oram::path_oram::Bucket;
use adj_path_oram::server::Server;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::TcpListener;
use std::sync::Arc;

fn default_config() -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:7878".to_string(),
        shard_heights: vec![8],
        z: 4,
        payload_len: 16,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let config = default_config();
    config.validate()?;

    let mut rng = StdRng::from_entropy();
    let cipher = Cipher::new([0u8; 32]);
    let server = Arc::new(Server::new(config.shard_heights.clone()));
    for (shard, &height) in config.shard_heights.iter().enumerate() {
        let dummy_ciphertexts: Vec<Vec<u8>> = (0..((1u64 << (height + 1)) - 1))
            .map(|_| cipher.encrypt(&Bucket::dummy(config.z).to_bytes(config.payload_len), &mut rng))
            .collect();
        server.init_shard(shard as u16, dummy_ciphertexts)?;
    }

    log::info!(
        "serving {} shard(s) on {}",
        config.shard_heights.len(),
        config.listen_addr
    );
    let listener = TcpListener::bind(&config.listen_addr)?;
    server.serve(listener)?;
    Ok(())
}
