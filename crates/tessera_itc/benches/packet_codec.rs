//! # Packet Codec Benchmark
//!
//! Measures encode and decode cost for the largest site-bearing packet,
//! which bounds the per-packet overhead of a full cache exchange.
//!
//! Run with: `cargo bench --package tessera_itc`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tessera_core::{Atom, Dir};
use tessera_itc::{decode, encode, Packet, SiteUpdate, SiteVec, MAX_SITES_PER_PACKET};

fn full_xfer() -> Packet {
    let mut sites = SiteVec::new();
    for i in 0..MAX_SITES_PER_PACKET {
        sites.push(SiteUpdate {
            x: i as u8,
            y: (i * 3) as u8,
            atom: Atom::of_type(i as u16 + 1),
        });
    }
    Packet::Xfer { sites }
}

/// Benchmark: encode the largest cache-exchange packet.
fn bench_encode(c: &mut Criterion) {
    let packet = full_xfer();

    c.bench_function("encode_full_xfer", |b| {
        b.iter(|| encode(Dir::East, black_box(&packet)).expect("encode"));
    });
}

/// Benchmark: decode the largest cache-exchange packet.
fn bench_decode(c: &mut Criterion) {
    let buffer = encode(Dir::East, &full_xfer()).expect("encode");

    c.bench_function("decode_full_xfer", |b| {
        b.iter(|| decode(black_box(buffer.as_slice())).expect("decode"));
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
