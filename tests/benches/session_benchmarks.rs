//! # Bramble Session Benchmarks
//!
//! Hot paths of an established session:
//!
//! | Path | Runs |
//! |------|------|
//! | Secret rotation | once per endpoint per rotation period |
//! | Tag encoding | once per window slot on every recognition |
//! | Frame seal / open | once per frame |
//! | Shared secret | once per key agreement |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::RngCore;
use shared_crypto::{
    derive_frame_key, derive_next_secret, derive_shared_secret, derive_tag_key, encode_tag,
    AgreementKeyPair, FrameCipher, IV_LENGTH,
};
use shared_types::SecretKey;
use std::time::Duration;

fn random_secret() -> SecretKey {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    SecretKey::from_bytes(bytes)
}

// ============================================================================
// Key derivation
// ============================================================================

fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key-derivation");
    let secret = random_secret();

    group.bench_function("derive_next_secret", |b| {
        b.iter(|| derive_next_secret(black_box(&secret), black_box(7)).unwrap())
    });
    group.bench_function("derive_frame_key", |b| {
        b.iter(|| derive_frame_key(black_box(&secret), black_box(3), true, true).unwrap())
    });
    group.finish();
}

// ============================================================================
// Recognition tags
// ============================================================================

fn bench_tag_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("tags");
    let tag_key = derive_tag_key(&random_secret(), true).unwrap();

    group.bench_function("encode_tag", |b| {
        b.iter(|| encode_tag(black_box(&tag_key), black_box(42)).unwrap())
    });

    // Refilling a whole connection window after a recognition.
    group.throughput(Throughput::Elements(32));
    group.bench_function("encode_window", |b| {
        b.iter(|| {
            for connection in 0..32u64 {
                black_box(encode_tag(&tag_key, connection).unwrap());
            }
        })
    });
    group.finish();
}

// ============================================================================
// Frame encryption
// ============================================================================

fn bench_frame_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame-cipher");
    group.measurement_time(Duration::from_secs(5));
    let cipher = FrameCipher::new(&random_secret());
    let iv = [0u8; IV_LENGTH];
    let aad = [0u8; 6];

    for frame_length in [64usize, 1024, 16 * 1024] {
        let mut plaintext = vec![0u8; frame_length];
        rand::thread_rng().fill_bytes(&mut plaintext);
        let sealed = cipher.seal(&iv, &aad, &plaintext).unwrap();

        group.throughput(Throughput::Bytes(frame_length as u64));
        group.bench_with_input(BenchmarkId::new("seal", frame_length), &plaintext, |b, p| {
            b.iter(|| cipher.seal(&iv, &aad, black_box(p)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("open", frame_length), &sealed, |b, s| {
            b.iter(|| cipher.open(&iv, &aad, black_box(s)).unwrap())
        });
    }
    group.finish();
}

// ============================================================================
// Key agreement
// ============================================================================

fn bench_key_agreement(c: &mut Criterion) {
    let mut group = c.benchmark_group("key-agreement");
    let alice = AgreementKeyPair::generate();
    let bob = AgreementKeyPair::generate();

    group.bench_function("generate_key_pair", |b| b.iter(AgreementKeyPair::generate));
    group.bench_function("derive_shared_secret", |b| {
        b.iter(|| derive_shared_secret(black_box(&alice), bob.public(), true, 4).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_tag_encoding,
    bench_frame_cipher,
    bench_key_agreement,
);
criterion_main!(benches);
