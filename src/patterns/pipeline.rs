// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Push/pull (work queue): one pusher writes non-overwriting, several
// pullers compete for the messages, and each message reaches exactly one
// puller. The shared tail cursor is the contended resource; a cross-process
// file lock keyed by the segment name serialises its advancement.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::codec::Codec;
use crate::error::{Result, ShmError};
use crate::lock::FileLock;
use crate::ring::{self, RingStats, WriteMode};
use crate::segment::{Segment, ATTACH_POLL_INTERVAL, ATTACH_TIMEOUT};
use crate::util::{poll_until, push_segment_name, RECV_POLL_INTERVAL};

/// Default ring depth for push/pull channels.
pub const DEFAULT_NUM_SLOTS: usize = 128;

/// Default slot size (payload + 4-byte prefix) for push/pull channels.
pub const DEFAULT_SLOT_SIZE: usize = 4096;

// ---------------------------------------------------------------------------
// Pusher
// ---------------------------------------------------------------------------

/// The owning, writing side of a push/pull channel.
///
/// Writes are non-overwriting: a work item is never silently lost to a
/// wrapping ring. The default [`send`](Self::send) blocks until a slot
/// frees up, which is what a work queue usually wants.
pub struct Pusher {
    channel: String,
    codec: Codec,
    seg: Option<Segment>,
}

impl Pusher {
    /// Create a pusher with the default geometry and codec.
    pub fn new(channel: &str) -> Result<Self> {
        Self::with_options(channel, DEFAULT_NUM_SLOTS, DEFAULT_SLOT_SIZE, Codec::default())
    }

    /// Create a pusher with explicit ring geometry and codec.
    pub fn with_options(
        channel: &str,
        num_slots: usize,
        slot_size: usize,
        codec: Codec,
    ) -> Result<Self> {
        let seg = Segment::create(&push_segment_name(channel), num_slots, slot_size)?;
        info!(channel, num_slots, slot_size, "pusher ready");
        Ok(Self {
            channel: channel.to_string(),
            codec,
            seg: Some(seg),
        })
    }

    fn seg(&self) -> Result<&Segment> {
        self.seg
            .as_ref()
            .ok_or_else(|| ShmError::Connection(format!("pusher '{}' is closed", self.channel)))
    }

    /// Serialize `value` and push it, blocking until the ring has room.
    pub fn send<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let payload = self.codec.encode(value)?;
        ring::write_message(self.seg()?, &payload, WriteMode::Block(None))?;
        Ok(())
    }

    /// Push, blocking at most `timeout`; a ring still full at the deadline
    /// is `ShmError::BufferFull`.
    pub fn send_timeout<T: Serialize>(&mut self, value: &T, timeout: Duration) -> Result<()> {
        let payload = self.codec.encode(value)?;
        ring::write_message(self.seg()?, &payload, WriteMode::Block(Some(timeout)))?;
        Ok(())
    }

    /// Push without blocking. Returns `Ok(false)` (and counts a drop) when
    /// the ring is full.
    pub fn try_send<T: Serialize>(&mut self, value: &T) -> Result<bool> {
        let payload = self.codec.encode(value)?;
        ring::write_message(self.seg()?, &payload, WriteMode::Drop)
    }

    /// Raw-bytes variant of [`send`](Self::send).
    pub fn send_bytes(&mut self, payload: &[u8]) -> Result<()> {
        ring::write_message(self.seg()?, payload, WriteMode::Block(None))?;
        Ok(())
    }

    /// Raw-bytes variant of [`send_timeout`](Self::send_timeout).
    pub fn send_bytes_timeout(&mut self, payload: &[u8], timeout: Duration) -> Result<()> {
        ring::write_message(self.seg()?, payload, WriteMode::Block(Some(timeout)))?;
        Ok(())
    }

    /// Raw-bytes variant of [`try_send`](Self::try_send).
    pub fn try_send_bytes(&mut self, payload: &[u8]) -> Result<bool> {
        ring::write_message(self.seg()?, payload, WriteMode::Drop)
    }

    /// Ring statistics snapshot.
    pub fn stats(&self) -> Result<RingStats> {
        Ok(ring::stats(self.seg()?))
    }

    /// Destroy the channel. Idempotent.
    pub fn close(&mut self) {
        if let Some(seg) = self.seg.take() {
            seg.close(true);
            info!(channel = %self.channel, "pusher closed");
        }
    }
}

impl Drop for Pusher {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Puller
// ---------------------------------------------------------------------------

/// A competing consumer on a push/pull channel.
///
/// Every claim happens under the channel's file lock, so concurrent pullers
/// never receive the same message. The payload is copied out of shared
/// memory before the lock is released; decoding happens outside it.
pub struct Puller {
    channel: String,
    codec: Codec,
    seg: Option<Segment>,
    lock: FileLock,
}

impl Puller {
    /// Attach to a channel with the default connect timeout and codec.
    pub fn new(channel: &str) -> Result<Self> {
        Self::with_options(channel, ATTACH_TIMEOUT, Codec::default())
    }

    /// Attach with an explicit connect timeout and codec.
    pub fn with_options(channel: &str, timeout_connect: Duration, codec: Codec) -> Result<Self> {
        let seg_name = push_segment_name(channel);
        let seg = Segment::attach(&seg_name, timeout_connect, ATTACH_POLL_INTERVAL)?;
        let lock = FileLock::new(&seg_name)?;
        info!(channel, "puller attached");
        Ok(Self {
            channel: channel.to_string(),
            codec,
            seg: Some(seg),
            lock,
        })
    }

    /// Claim at most one message under the file lock.
    fn try_claim(&mut self) -> Result<Option<Vec<u8>>> {
        let seg = self
            .seg
            .as_ref()
            .ok_or_else(|| ShmError::Connection(format!("puller '{}' is closed", self.channel)))?;
        let guard = self.lock.acquire(None)?;
        Ok(ring::read_message_shared(seg, &guard))
        // Guard drops here; the payload is already copied out.
    }

    /// Claim the next work item and decode it.
    ///
    /// `None` timeout blocks indefinitely; `Some(Duration::ZERO)` polls
    /// once. A timeout is not an error: the result is `Ok(None)`.
    pub fn recv<T: DeserializeOwned>(&mut self, timeout: Option<Duration>) -> Result<Option<T>> {
        let codec = self.codec;
        match poll_until(|| self.try_claim(), timeout, RECV_POLL_INTERVAL)? {
            Some(raw) => Ok(Some(codec.decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Like [`recv`](Self::recv) but returns the raw payload bytes.
    pub fn recv_bytes(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        poll_until(|| self.try_claim(), timeout, RECV_POLL_INTERVAL)
    }

    /// Ring statistics snapshot.
    pub fn stats(&self) -> Result<RingStats> {
        let seg = self
            .seg
            .as_ref()
            .ok_or_else(|| ShmError::Connection(format!("puller '{}' is closed", self.channel)))?;
        Ok(ring::stats(seg))
    }

    /// Detach from the channel (the segment belongs to the pusher).
    /// Idempotent.
    pub fn close(&mut self) {
        if let Some(seg) = self.seg.take() {
            seg.close(false);
            info!(channel = %self.channel, "puller closed");
        }
    }
}

impl Drop for Puller {
    fn drop(&mut self) {
        self.close();
    }
}
