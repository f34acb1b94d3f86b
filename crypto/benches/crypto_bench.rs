use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn ed25519_sign_bench(c: &mut Criterion) {
    let kp = quorum_crypto::generate_keypair();
    let msg = [42u8; 128];

    c.bench_function("ed25519_sign_128B", |b| {
        b.iter(|| quorum_crypto::sign_message(black_box(&msg), &kp.private))
    });
}

fn ed25519_verify_bench(c: &mut Criterion) {
    let kp = quorum_crypto::generate_keypair();
    let msg = [42u8; 128];
    let sig = quorum_crypto::sign_full(&msg, &kp);

    c.bench_function("ed25519_verify_128B", |b| {
        b.iter(|| quorum_crypto::verify_full(black_box(&msg), &sig))
    });
}

fn sha256_bench(c: &mut Criterion) {
    let data = [0xABu8; 256];

    c.bench_function("sha256_256B", |b| {
        b.iter(|| quorum_crypto::sha256(black_box(&data)))
    });
}

fn chain_hash_bench(c: &mut Criterion) {
    let prev = quorum_crypto::sha256(b"previous serial");
    let next = quorum_crypto::sha256(b"message");

    c.bench_function("chain_hash", |b| {
        b.iter(|| quorum_crypto::chain_hash(black_box(&prev), black_box(&next)))
    });
}

criterion_group!(
    benches,
    ed25519_sign_bench,
    ed25519_verify_bench,
    sha256_bench,
    chain_hash_bench,
);
criterion_main!(benches);
