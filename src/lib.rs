// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// shmcomm — messaging patterns over named shared-memory ring buffers.
//
// Three patterns, all single-host, all sub-microsecond on the hot path:
//
// - `Publisher` / `Subscriber` — one producer broadcasts, any number of
//   subscribers follow with private cursors; slow subscribers miss data
//   instead of slowing the publisher down.
// - `Requester` / `Replier`    — paired SPSC rings carrying requests one
//   way and replies the other.
// - `Pusher` / `Puller`        — a work queue: pullers compete under a
//   cross-process file lock and each message goes to exactly one of them.
//
// Quick start:
//
//     use shmcomm::{Publisher, Subscriber};
//     use std::time::Duration;
//
//     let mut publisher = Publisher::new("telemetry")?;
//     let mut subscriber = Subscriber::new("telemetry")?;
//
//     publisher.send(&42u32)?;
//     let value: Option<u32> = subscriber.recv(Some(Duration::from_secs(1)))?;

pub mod codec;
pub mod error;
pub mod lock;
pub mod ring;
pub mod segment;
pub mod util;

mod platform;

pub mod patterns;

pub use codec::Codec;
pub use error::{Result, ShmError};
pub use lock::{FileLock, FileLockGuard};
pub use ring::{RingStats, WriteMode};
pub use segment::Segment;
pub use util::{force_unlink, list_segments};

pub use patterns::pipeline::{Puller, Pusher};
pub use patterns::pubsub::{Publisher, Subscriber};
pub use patterns::reqrep::{Replier, Requester};
