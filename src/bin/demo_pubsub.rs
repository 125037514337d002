// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Minimal publish/subscribe demo.
//
// Usage:
//   demo_pubsub pub <channel> [count]
//   demo_pubsub sub <channel>
//
// Run the subscriber in one terminal, the publisher in another. The
// publisher sends `count` telemetry samples (default 50) at 10 Hz, then
// closes the channel; the subscriber prints whatever it sees until the
// stream goes quiet. RUST_LOG=shmcomm=debug shows the slot traffic.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shmcomm::{Publisher, Subscriber};

#[derive(Debug, Serialize, Deserialize)]
struct Sample {
    seq: u64,
    millis: u64,
}

fn run_publisher(channel: &str, count: u64) {
    let mut publisher = Publisher::new(channel).expect("create publisher");
    println!("publishing {count} samples on '{channel}'");

    for seq in 0..count {
        let sample = Sample { seq, millis: seq * 100 };
        publisher.send(&sample).expect("send");
        std::thread::sleep(Duration::from_millis(100));
    }

    let stats = publisher.stats().expect("stats");
    println!("done: msg_count={} drop_count={}", stats.msg_count, stats.drop_count);
}

fn run_subscriber(channel: &str) {
    let mut subscriber = Subscriber::new(channel).expect("attach subscriber");
    println!("subscribed to '{channel}'");

    loop {
        match subscriber.recv::<Sample>(Some(Duration::from_secs(2))) {
            Ok(Some(sample)) => println!("recv seq={} millis={}", sample.seq, sample.millis),
            Ok(None) => {
                println!("stream quiet for 2s, exiting");
                return;
            }
            Err(e) => {
                eprintln!("recv failed: {e}");
                return;
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: demo_pubsub pub <channel> [count]");
        eprintln!("       demo_pubsub sub <channel>");
        std::process::exit(1);
    }

    match args[1].as_str() {
        "pub" => {
            let count = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(50);
            run_publisher(&args[2], count);
        }
        "sub" => run_subscriber(&args[2]),
        other => {
            eprintln!("unknown role: {other}");
            std::process::exit(1);
        }
    }
}
