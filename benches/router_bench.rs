//! Router Benchmarks - Hot-Path Performance Validation
//!
//! Benchmarks frame demultiplexing and dispatch, which run once per
//! received frame on the single ingestion task.
//!
//! Run with: cargo bench --bench router_bench

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use crypto_data_stream::adapters::feeds::registry::{FrameHandler, HandlerError, HandlerRegistry};
use crypto_data_stream::adapters::feeds::router::{decode_frame, MessageRouter};
use crypto_data_stream::adapters::persistence::{InMemoryStore, MarketRepository};
use crypto_data_stream::adapters::feeds::register_market_handlers;
use crypto_data_stream::domain::retention::RetentionPolicies;

const ENVELOPED: &[u8] = br#"{"stream":"btcusdt@depth20@100ms","data":{"e":"depthUpdate","E":1700000000300,"T":1700000000299,"s":"BTCUSDT","U":1,"u":42,"pu":41,"b":[["37000.00","1.0"],["36999.90","2.0"]],"a":[["37000.10","2.0"],["37000.20","1.5"]]}}"#;

const DIRECT: &[u8] = br#"{"e":"bookTicker","u":400900218,"s":"ETHUSDT","b":"2000.00","B":"3.0","a":"2000.10","A":"4.0"}"#;

const AGG_TRADE: &[u8] = br#"{"stream":"btcusdt@aggTrade","data":{"e":"aggTrade","E":1700000000100,"s":"BTCUSDT","a":26129,"p":"37000.50","q":"0.010","f":100,"l":105,"T":1700000000099,"m":true}}"#;

struct Discard;

#[async_trait]
impl FrameHandler for Discard {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        black_box(payload);
        Ok(())
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Benchmark structural decode of both frame shapes.
fn bench_decode(c: &mut Criterion) {
    c.bench_function("decode_enveloped", |b| {
        b.iter(|| decode_frame(black_box(ENVELOPED)).is_ok());
    });
    c.bench_function("decode_direct_fallback", |b| {
        b.iter(|| decode_frame(black_box(DIRECT)).is_ok());
    });
}

/// Benchmark routing to a handler that does no work.
fn bench_route_noop(c: &mut Criterion) {
    let mut registry = HandlerRegistry::new();
    registry.register("depth20", Arc::new(Discard));
    registry.register("bookTicker", Arc::new(Discard));
    let router = MessageRouter::new(Arc::new(registry));
    let rt = runtime();

    c.bench_function("route_enveloped_noop", |b| {
        b.to_async(&rt).iter(|| router.route(black_box(ENVELOPED)));
    });
    c.bench_function("route_direct_noop", |b| {
        b.to_async(&rt).iter(|| router.route(black_box(DIRECT)));
    });
}

/// Benchmark the full decode + persist path against the in-memory store.
fn bench_route_to_store(c: &mut Criterion) {
    let store = Arc::new(InMemoryStore::new());
    let repo = Arc::new(MarketRepository::new(store, RetentionPolicies::default()));
    let mut registry = HandlerRegistry::new();
    register_market_handlers(&mut registry, repo);
    let router = MessageRouter::new(Arc::new(registry));
    let rt = runtime();

    c.bench_function("route_agg_trade_to_memory", |b| {
        b.to_async(&rt).iter(|| router.route(black_box(AGG_TRADE)));
    });
}

criterion_group!(benches, bench_decode, bench_route_noop, bench_route_to_store);
criterion_main!(benches);
