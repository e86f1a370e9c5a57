use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use parapet::aes::{Aes, CounterMode, Ctr};
use parapet::chacha::ChaCha20;
use parapet::csx::Csx512;
use parapet::kmac::{Kmac256, Kpa256};
use parapet::poly1305::Poly1305;
use parapet::rcs::Rcs256;
use parapet::scb::Scb256;
use parapet::sha2::{sha256, sha512, HmacSha256};
use parapet::sha3::{sha3_256, sha3_512, Shake256};

const INPUT: usize = 100 * 1024;

fn hash_benchmarks(c: &mut Criterion) {
    let mut g = c.benchmark_group("hash");
    g.throughput(Throughput::Bytes(INPUT as u64));

    g.bench_with_input("SHA3-256", &[0u8; INPUT], |b, block| b.iter(|| sha3_256(block)));
    g.bench_with_input("SHA3-512", &[0u8; INPUT], |b, block| b.iter(|| sha3_512(block)));
    g.bench_with_input("SHAKE-256", &[0u8; INPUT], |b, block| {
        b.iter(|| {
            let mut out = [0u8; 32];
            Shake256::compute(block, &mut out);
            out
        })
    });
    g.bench_with_input("SHA-256", &[0u8; INPUT], |b, block| b.iter(|| sha256(block)));
    g.bench_with_input("SHA-512", &[0u8; INPUT], |b, block| b.iter(|| sha512(block)));
    g.finish();
}

fn mac_benchmarks(c: &mut Criterion) {
    let mut g = c.benchmark_group("mac");
    g.throughput(Throughput::Bytes(INPUT as u64));

    g.bench_with_input("KMAC-256", &[0u8; INPUT], |b, block| {
        b.iter(|| {
            let mut tag = [0u8; 32];
            Kmac256::compute(b"0123456789abcdef0123456789abcdef", b"", block, &mut tag);
            tag
        })
    });
    g.bench_with_input("KPA-256", &[0u8; INPUT], |b, block| {
        b.iter(|| {
            let mut tag = [0u8; 32];
            Kpa256::compute(b"0123456789abcdef0123456789abcdef", b"", block, &mut tag);
            tag
        })
    });
    g.bench_with_input("HMAC-SHA2-256", &[0u8; INPUT], |b, block| {
        b.iter(|| HmacSha256::compute(b"0123456789abcdef", block))
    });
    g.bench_with_input("Poly1305", &[0u8; INPUT], |b, block| {
        b.iter(|| Poly1305::compute(&[7u8; 32], block))
    });
    g.finish();
}

fn cipher_benchmarks(c: &mut Criterion) {
    let mut g = c.benchmark_group("cipher");
    g.throughput(Throughput::Bytes(INPUT as u64));

    g.bench_function("AES-256-CTR", |b| {
        let mut data = vec![0u8; INPUT];
        b.iter(|| {
            let mut ctr = Ctr::new(Aes::new_256(&[1u8; 32]), [2u8; 16], CounterMode::BigEndian);
            ctr.transform(&mut data);
        })
    });
    g.bench_function("ChaCha20", |b| {
        let mut data = vec![0u8; INPUT];
        b.iter(|| ChaCha20::new(&[1u8; 32], &[2u8; 12], 0).apply_keystream(&mut data))
    });
    g.finish();
}

fn aead_benchmarks(c: &mut Criterion) {
    let mut g = c.benchmark_group("aead");
    g.throughput(Throughput::Bytes(INPUT as u64));

    g.bench_with_input("RCS-256", &vec![0u8; INPUT], |b, block| {
        b.iter(|| Rcs256::new(&[1u8; 32], &[2u8; 16], None).encrypt(block))
    });
    g.bench_with_input("CSX-512", &vec![0u8; INPUT], |b, block| {
        b.iter(|| Csx512::new(&[1u8; 64], &[2u8; 16], None).encrypt(block))
    });
    g.finish();
}

fn kdf_benchmarks(c: &mut Criterion) {
    let mut g = c.benchmark_group("kdf");
    g.sample_size(10);

    g.bench_function("SCB-256 c1/m1", |b| {
        b.iter(|| {
            let mut kdf = Scb256::new(&[3u8; 32], b"", 1, 1).unwrap();
            let mut out = [0u8; 32];
            kdf.generate(&mut out).unwrap();
            out
        })
    });
    g.finish();
}

criterion_group!(
    benches,
    hash_benchmarks,
    mac_benchmarks,
    cipher_benchmarks,
    aead_benchmarks,
    kdf_benchmarks
);
criterion_main!(benches);
