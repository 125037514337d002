// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Publish/subscribe: one publisher writes in overwrite mode, any number of
// subscribers follow with private cursors and never coordinate with each
// other or with the publisher. A slow subscriber simply misses messages
// once the ring wraps past it — that is the contract, not a failure.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::codec::Codec;
use crate::error::{Result, ShmError};
use crate::ring::{self, RingStats, WriteMode};
use crate::segment::{Segment, ATTACH_POLL_INTERVAL, ATTACH_TIMEOUT};
use crate::util::{poll_until, pub_segment_name, RECV_POLL_INTERVAL};

/// Default ring depth for pub/sub channels.
pub const DEFAULT_NUM_SLOTS: usize = 64;

/// Default slot size (payload + 4-byte prefix) for pub/sub channels.
pub const DEFAULT_SLOT_SIZE: usize = 4096;

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// The owning, writing side of a pub/sub channel.
///
/// Creates (and on close destroys) the backing segment. Exactly one
/// publisher may exist per channel; owning the handle is owning the
/// producer role.
pub struct Publisher {
    channel: String,
    codec: Codec,
    seg: Option<Segment>,
}

impl Publisher {
    /// Create a publisher with the default geometry and codec.
    pub fn new(channel: &str) -> Result<Self> {
        Self::with_options(channel, DEFAULT_NUM_SLOTS, DEFAULT_SLOT_SIZE, Codec::default())
    }

    /// Create a publisher with explicit ring geometry and codec.
    pub fn with_options(
        channel: &str,
        num_slots: usize,
        slot_size: usize,
        codec: Codec,
    ) -> Result<Self> {
        let seg = Segment::create(&pub_segment_name(channel), num_slots, slot_size)?;
        info!(channel, num_slots, slot_size, "publisher ready");
        Ok(Self {
            channel: channel.to_string(),
            codec,
            seg: Some(seg),
        })
    }

    fn seg(&self) -> Result<&Segment> {
        self.seg
            .as_ref()
            .ok_or_else(|| ShmError::Connection(format!("publisher '{}' is closed", self.channel)))
    }

    /// Serialize and publish `value`.
    ///
    /// Publishing never blocks and never reports a full ring: the write
    /// overwrites the oldest slot and lagging subscribers skip it.
    pub fn send<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let payload = self.codec.encode(value)?;
        ring::write_message(self.seg()?, &payload, WriteMode::Overwrite)?;
        Ok(())
    }

    /// Publish raw bytes, bypassing the codec.
    pub fn send_bytes(&mut self, payload: &[u8]) -> Result<()> {
        ring::write_message(self.seg()?, payload, WriteMode::Overwrite)?;
        Ok(())
    }

    /// Ring statistics snapshot.
    pub fn stats(&self) -> Result<RingStats> {
        Ok(ring::stats(self.seg()?))
    }

    /// Destroy the channel. Subscribers still attached keep their mapping
    /// until they detach, but see no further messages. Idempotent.
    pub fn close(&mut self) {
        if let Some(seg) = self.seg.take() {
            seg.close(true);
            info!(channel = %self.channel, "publisher closed");
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// Statistics for a subscriber: the ring counters plus this subscriber's
/// own cursor (the `tail` inside `ring` belongs to shared-tail consumers
/// and stays 0 on pub/sub channels).
#[derive(Debug, Clone, Copy)]
pub struct SubscriberStats {
    pub ring: RingStats,
    pub local_tail: i64,
}

/// The attaching, reading side of a pub/sub channel.
///
/// Each subscriber keeps a private cursor, initialised to the publisher's
/// HEAD at attach time: subscription is a live stream, and the historical
/// backlog in the ring is deliberately skipped.
#[derive(Debug)]
pub struct Subscriber {
    channel: String,
    codec: Codec,
    seg: Option<Segment>,
    local_tail: i64,
}

impl Subscriber {
    /// Attach to a channel with the default connect timeout and codec.
    pub fn new(channel: &str) -> Result<Self> {
        Self::with_options(channel, ATTACH_TIMEOUT, Codec::default())
    }

    /// Attach with an explicit connect timeout (how long to wait for the
    /// publisher to create the segment) and codec.
    pub fn with_options(channel: &str, timeout_connect: Duration, codec: Codec) -> Result<Self> {
        let seg = Segment::attach(&pub_segment_name(channel), timeout_connect, ATTACH_POLL_INTERVAL)?;
        let local_tail = seg.header().head();
        info!(channel, local_tail, "subscriber attached");
        Ok(Self {
            channel: channel.to_string(),
            codec,
            seg: Some(seg),
            local_tail,
        })
    }

    fn try_recv_raw(&mut self) -> Result<Option<Vec<u8>>> {
        let seg = self.seg.as_ref().ok_or_else(|| {
            ShmError::Connection(format!("subscriber '{}' is closed", self.channel))
        })?;
        match ring::read_message_private(seg, self.local_tail) {
            Some((payload, new_tail)) => {
                self.local_tail = new_tail;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    /// Wait for the next message and decode it.
    ///
    /// `None` timeout blocks indefinitely; `Some(Duration::ZERO)` polls
    /// once. A timeout is not an error: the result is `Ok(None)`.
    pub fn recv<T: DeserializeOwned>(&mut self, timeout: Option<Duration>) -> Result<Option<T>> {
        let codec = self.codec;
        match poll_until(|| self.try_recv_raw(), timeout, RECV_POLL_INTERVAL)? {
            Some(raw) => Ok(Some(codec.decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Like [`recv`](Self::recv) but returns the raw payload bytes.
    pub fn recv_bytes(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        poll_until(|| self.try_recv_raw(), timeout, RECV_POLL_INTERVAL)
    }

    /// Ring statistics plus this subscriber's private cursor.
    pub fn stats(&self) -> Result<SubscriberStats> {
        let seg = self.seg.as_ref().ok_or_else(|| {
            ShmError::Connection(format!("subscriber '{}' is closed", self.channel))
        })?;
        Ok(SubscriberStats {
            ring: ring::stats(seg),
            local_tail: self.local_tail,
        })
    }

    /// Detach from the channel (the segment itself belongs to the
    /// publisher). Idempotent.
    pub fn close(&mut self) {
        if let Some(seg) = self.seg.take() {
            seg.close(false);
            info!(channel = %self.channel, "subscriber closed");
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.close();
    }
}
