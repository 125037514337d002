// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Loopback latency benchmarks: one process, producer and consumer on the
// same thread. Measures the ring round-trip itself — no polling sleeps are
// ever hit because every send is immediately drained.
//
// Run with:
//   cargo bench --bench latency
//
// Groups, each swept across the payload ladder below:
//   pubsub_roundtrip    — overwrite write + private-cursor read
//   pushpull_roundtrip  — non-overwrite write + shared-tail read (file lock)
//   publish_only        — bare overwrite write, no reader

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use shmcomm::{Publisher, Puller, Pusher, Subscriber};

// Payload sizes from tiny control messages up to a full default slot
// (4096-byte slots leave 4092 bytes after the length prefix).
const SIZES: &[(&str, usize)] = &[
    ("64B", 64),
    ("512B", 512),
    ("1KiB", 1024),
    ("full_slot_4092B", 4092),
];

fn bench_pubsub_roundtrip(c: &mut Criterion) {
    let channel = format!("bench_pubsub_{}", std::process::id());
    let mut publisher = Publisher::new(&channel).expect("publisher");
    let mut subscriber = Subscriber::new(&channel).expect("subscriber");

    let mut group = c.benchmark_group("pubsub_roundtrip");
    for &(label, size) in SIZES {
        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, payload| {
            b.iter(|| {
                publisher.send_bytes(payload).expect("send");
                let msg = subscriber
                    .recv_bytes(Some(Duration::from_secs(1)))
                    .expect("recv")
                    .expect("message");
                black_box(msg)
            });
        });
    }
    group.finish();
}

fn bench_pushpull_roundtrip(c: &mut Criterion) {
    let channel = format!("bench_pushpull_{}", std::process::id());
    let mut pusher = Pusher::new(&channel).expect("pusher");
    let mut puller = Puller::new(&channel).expect("puller");

    let mut group = c.benchmark_group("pushpull_roundtrip");
    for &(label, size) in SIZES {
        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, payload| {
            b.iter(|| {
                pusher.send_bytes(payload).expect("send");
                let msg = puller
                    .recv_bytes(Some(Duration::from_secs(1)))
                    .expect("recv")
                    .expect("message");
                black_box(msg)
            });
        });
    }
    group.finish();
}

fn bench_publish_only(c: &mut Criterion) {
    let channel = format!("bench_pubonly_{}", std::process::id());
    let mut publisher = Publisher::new(&channel).expect("publisher");

    let mut group = c.benchmark_group("publish_only");
    for &(label, size) in SIZES {
        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, payload| {
            b.iter(|| publisher.send_bytes(black_box(payload)).expect("send"));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_pubsub_roundtrip,
    bench_pushpull_roundtrip,
    bench_publish_only
);
criterion_main!(benches);
