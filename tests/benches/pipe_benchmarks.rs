//! # Pipe Benchmarks
//!
//! Per-request costs on the receive path:
//!
//! | Stage | What is measured |
//! |-------|------------------|
//! | Signing | EIP-191 hash + recoverable signature over the request id |
//! | Authentication | address recovery + requester comparison |
//! | Classification | JSON envelope sniffing |
//! | Routing | first-match dispatch over a realistic route table |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pipe_core::{handler, Router};
use pipe_signature::{authenticate, sign_request, LocalAccount};
use pipe_types::{Envelope, Method, RequestId, SendRequest};
use serde_json::json;
use std::time::Duration;

fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature");
    group.measurement_time(Duration::from_secs(5));

    let account = LocalAccount::random();
    let unsigned = SendRequest::new(Method::Get, "/actors/0x01")
        .into_request(RequestId::new(), account.address());
    let mut signed = unsigned.clone();
    sign_request(&account, &mut signed).unwrap();

    group.bench_function("sign_request", |b| {
        b.iter(|| {
            let mut request = unsigned.clone();
            sign_request(&account, &mut request).unwrap();
            black_box(request)
        })
    });

    group.bench_function("authenticate", |b| {
        b.iter(|| black_box(authenticate(&signed).unwrap()))
    });

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");

    let account = LocalAccount::random();
    let mut request = SendRequest::new(Method::Post, "/echo")
        .with_body(json!({ "items": (0..32).collect::<Vec<u32>>() }))
        .into_request(RequestId::new(), account.address());
    sign_request(&account, &mut request).unwrap();
    let text = serde_json::to_string(&request).unwrap();

    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("classify_request", |b| {
        b.iter(|| black_box(Envelope::classify(black_box(&text))))
    });
    group.bench_function("classify_junk", |b| {
        b.iter(|| black_box(Envelope::classify(black_box("gm, how are you?"))))
    });

    group.finish();
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("router");

    for size in [10usize, 100] {
        let router = Router::new();
        for i in 0..size {
            router
                .register(
                    Method::Get,
                    &format!("/resource{i}/:id/items/:item"),
                    handler(|_req| async { anyhow::Ok(()) }),
                )
                .unwrap();
        }
        let last = format!("/resource{}/42/items/7", size - 1);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("dispatch_last", size), &last, |b, path| {
            b.iter(|| black_box(router.dispatch(Method::Get, path).is_some()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_signatures, bench_classify, bench_routing);
criterion_main!(benches);
