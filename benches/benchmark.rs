//! Benchmarks for the access path, run in-process against a `LocalTransport`
//! so the numbers reflect ORAM overhead rather than network latency.

extern crate criterion;

use adj_path_oram::cipher::Cipher;
use adj_path_oram::config::{ClientConfig, KeySource};
use adj_path_oram::path_oram::{AccessOp, Bucket};
use adj_path_oram::server::Server;
use adj_path_oram::shard::AdjustableShardSet;
use adj_path_oram::transport::LocalTransport;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const CAPACITIES_TO_BENCHMARK: [u64; 2] = [256, 4096];
const PAYLOAD_LEN: usize = 64;
const NUM_RANDOM_OPERATIONS_TO_RUN: usize = 64;

fn make_store(n: u64, rng: &mut StdRng) -> (AdjustableShardSet, LocalTransport) {
    let config = ClientConfig {
        n,
        z: 4,
        b: PAYLOAD_LEN,
        leaked_bits: 0,
        server_addr: "127.0.0.1:0".into(),
        key_source: KeySource::Inline(vec![[9u8; 32]]),
        stash_cap: 128,
        rng_seed: Some(0),
    };
    let shards = AdjustableShardSet::new(&config).unwrap();
    let height = shards.shards()[0].height();
    let cipher = Cipher::new([9u8; 32]);
    let dummy_ciphertexts: Vec<Vec<u8>> = (0..((1u64 << (height + 1)) - 1))
        .map(|_| cipher.encrypt(&Bucket::dummy(config.z).to_bytes(config.b), rng))
        .collect();
    let server = Arc::new(Server::new(vec![height]));
    server.init_shard(0, dummy_ciphertexts).unwrap();
    (shards, LocalTransport::new(server))
}

fn benchmark_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    for capacity in CAPACITIES_TO_BENCHMARK {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &n| {
            let mut rng = StdRng::seed_from_u64(0);
            let (mut shards, mut transport) = make_store(n, &mut rng);
            b.iter(|| {
                let addr = rng.gen_range(0..n);
                shards
                    .access(
                        &mut transport,
                        AccessOp::Write(black_box(vec![1u8; PAYLOAD_LEN])),
                        addr,
                        &mut rng,
                    )
                    .unwrap();
            });
        });
    }
    group.finish();
}

fn benchmark_random_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_workload");
    for capacity in CAPACITIES_TO_BENCHMARK {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &n| {
            let mut rng = StdRng::seed_from_u64(0);
            let (mut shards, mut transport) = make_store(n, &mut rng);
            for addr in 0..NUM_RANDOM_OPERATIONS_TO_RUN as u64 {
                shards
                    .access(&mut transport, AccessOp::Write(vec![0u8; PAYLOAD_LEN]), addr % n, &mut rng)
                    .unwrap();
            }
            b.iter(|| {
                let addr = rng.gen_range(0..n);
                let op = if rng.gen_bool(0.5) {
                    AccessOp::Read
                } else {
                    AccessOp::Write(vec![2u8; PAYLOAD_LEN])
                };
                let _ = shards.access(&mut transport, op, addr, &mut rng);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_write, benchmark_random_operations);
criterion_main!(benches);
