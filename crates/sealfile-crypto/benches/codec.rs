use sealfile_crypto::{FileCodec, KdfParams};

// Argon2id dominates at default cost; keep it cheap so the AEAD path is visible.
const BENCH_PARAMS: KdfParams = KdfParams {
    mem_cost_kib: 1024,
    time_cost: 1,
    parallelism: 1,
};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_whole_file(bencher: divan::Bencher, size: usize) {
    let codec = FileCodec::new(BENCH_PARAMS);
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            codec
                .encrypt(divan::black_box(&data), divan::black_box(b"bench-passphrase"))
                .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_whole_file(bencher: divan::Bencher, size: usize) {
    let codec = FileCodec::new(BENCH_PARAMS);
    let data = make_data(size);
    let encrypted = codec.encrypt(&data, b"bench-passphrase").unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            codec
                .decrypt(divan::black_box(&encrypted), divan::black_box(b"bench-passphrase"))
                .unwrap()
        });
}

#[divan::bench(args = [65536, 1048576])]
fn bench_encrypt_stream(bencher: divan::Bencher, size: usize) {
    let codec = FileCodec::new(BENCH_PARAMS).streaming_default();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            codec
                .encrypt(divan::black_box(&data), divan::black_box(b"bench-passphrase"))
                .unwrap()
        });
}

#[divan::bench]
fn bench_derive_key_default_params() -> sealfile_crypto::DerivedKey {
    sealfile_crypto::derive_key(
        divan::black_box(b"bench-passphrase"),
        divan::black_box(&[7u8; 16]),
        &KdfParams::default(),
    )
    .unwrap()
}

fn main() {
    divan::main();
}
