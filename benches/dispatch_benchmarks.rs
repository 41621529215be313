use alloy::primitives::address;
use criterion::{Criterion, criterion_group, criterion_main};
use reward_relayer::app::dispatcher::{
    DEFAULT_CHAIN_ID, DEFAULT_GAS_LIMIT, DEFAULT_REWARDS_CONTRACT,
};
use reward_relayer::domain::parse_recipient;
use reward_relayer::infra::blockchain::{TransactionBuilder, TreasurySigner, encode_reward_call};
use secrecy::SecretString;
use std::hint::black_box;

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn bench_recipient_parsing(c: &mut Criterion) {
    c.bench_function("parse_recipient", |b| {
        b.iter(|| parse_recipient(black_box("0x71C7656EC7ab88b098defB751B7401B5f6d8976F")))
    });
}

fn bench_reward_call_encoding(c: &mut Criterion) {
    let recipient = address!("71C7656EC7ab88b098defB751B7401B5f6d8976F");
    c.bench_function("encode_reward_call", |b| {
        b.iter(|| encode_reward_call(black_box(recipient)))
    });
}

fn bench_build_and_sign(c: &mut Criterion) {
    let key = SecretString::from(DEV_KEY.to_string());
    let signer = TreasurySigner::from_secret(Some(&key)).unwrap();
    let builder =
        TransactionBuilder::new(DEFAULT_REWARDS_CONTRACT, DEFAULT_CHAIN_ID, DEFAULT_GAS_LIMIT);
    let recipient = address!("71C7656EC7ab88b098defB751B7401B5f6d8976F");

    c.bench_function("build_and_sign_reward", |b| {
        b.iter(|| {
            let unsigned = builder.build(black_box(recipient), 5, 110);
            signer.sign(&unsigned).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_recipient_parsing,
    bench_reward_call_encoding,
    bench_build_and_sign
);
criterion_main!(benches);
