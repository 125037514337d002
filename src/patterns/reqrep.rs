// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Request/reply over two SPSC rings per service:
//
//     shmcomm_req_{name}   requester → replier
//     shmcomm_rep_{name}   replier  → requester
//
// Both sides read with private cursors, so the hot path stays lock-free.
// The one-request-one-reply rhythm is a convention between the peers; the
// rings do not enforce strict alternation.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::codec::Codec;
use crate::error::{Result, ShmError};
use crate::ring::{self, WriteMode};
use crate::segment::{Segment, ATTACH_POLL_INTERVAL, ATTACH_TIMEOUT};
use crate::util::{poll_until, rep_segment_name, req_segment_name, RECV_POLL_INTERVAL};

/// Default ring depth for request/reply channels (low volume).
pub const DEFAULT_NUM_SLOTS: usize = 16;

/// Default slot size, roomier than pub/sub to fit service responses.
pub const DEFAULT_SLOT_SIZE: usize = 8192;

// ---------------------------------------------------------------------------
// Replier
// ---------------------------------------------------------------------------

/// The server side of a request/reply service.
///
/// Creates both segments, so it must start before its requester, and
/// destroys both on close.
pub struct Replier {
    service: String,
    codec: Codec,
    req_seg: Option<Segment>,
    rep_seg: Option<Segment>,
    req_tail: i64,
}

impl Replier {
    /// Create a replier with the default geometry and codec.
    pub fn new(service: &str) -> Result<Self> {
        Self::with_options(service, DEFAULT_NUM_SLOTS, DEFAULT_SLOT_SIZE, Codec::default())
    }

    /// Create a replier with explicit ring geometry (shared by the request
    /// and reply rings) and codec.
    pub fn with_options(
        service: &str,
        num_slots: usize,
        slot_size: usize,
        codec: Codec,
    ) -> Result<Self> {
        let req_seg = Segment::create(&req_segment_name(service), num_slots, slot_size)?;
        let rep_seg = match Segment::create(&rep_segment_name(service), num_slots, slot_size) {
            Ok(seg) => seg,
            Err(e) => {
                req_seg.close(true);
                return Err(e);
            }
        };
        info!(service, num_slots, slot_size, "replier ready");
        Ok(Self {
            service: service.to_string(),
            codec,
            req_seg: Some(req_seg),
            rep_seg: Some(rep_seg),
            req_tail: 0,
        })
    }

    fn closed_err(&self) -> ShmError {
        ShmError::Connection(format!("replier '{}' is closed", self.service))
    }

    fn try_recv_raw(&mut self) -> Result<Option<Vec<u8>>> {
        let seg = self.req_seg.as_ref().ok_or_else(|| self.closed_err())?;
        match ring::read_message_private(seg, self.req_tail) {
            Some((payload, new_tail)) => {
                self.req_tail = new_tail;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    /// Wait for the next request and decode it. `Ok(None)` on timeout.
    pub fn recv<T: DeserializeOwned>(&mut self, timeout: Option<Duration>) -> Result<Option<T>> {
        let codec = self.codec;
        match poll_until(|| self.try_recv_raw(), timeout, RECV_POLL_INTERVAL)? {
            Some(raw) => Ok(Some(codec.decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Like [`recv`](Self::recv) but returns the raw request bytes.
    pub fn recv_bytes(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        poll_until(|| self.try_recv_raw(), timeout, RECV_POLL_INTERVAL)
    }

    /// Send a reply. Returns `Ok(false)` if the reply ring is full (the
    /// requester has stopped draining it).
    pub fn send<T: Serialize>(&mut self, value: &T) -> Result<bool> {
        let payload = self.codec.encode(value)?;
        let seg = self.rep_seg.as_ref().ok_or_else(|| self.closed_err())?;
        ring::write_message(seg, &payload, WriteMode::Drop)
    }

    /// Raw-bytes variant of [`send`](Self::send).
    pub fn send_bytes(&mut self, payload: &[u8]) -> Result<bool> {
        let seg = self.rep_seg.as_ref().ok_or_else(|| self.closed_err())?;
        ring::write_message(seg, payload, WriteMode::Drop)
    }

    /// Destroy both segments. Idempotent.
    pub fn close(&mut self) {
        if let Some(seg) = self.req_seg.take() {
            seg.close(true);
        }
        if let Some(seg) = self.rep_seg.take() {
            seg.close(true);
            info!(service = %self.service, "replier closed");
        }
    }
}

impl Drop for Replier {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Requester
// ---------------------------------------------------------------------------

/// The client side of a request/reply service.
///
/// Attaches to the segments created by the [`Replier`]; start the replier
/// first.
#[derive(Debug)]
pub struct Requester {
    service: String,
    codec: Codec,
    req_seg: Option<Segment>,
    rep_seg: Option<Segment>,
    rep_tail: i64,
}

impl Requester {
    /// Connect to a service with the default connect timeout and codec.
    pub fn new(service: &str) -> Result<Self> {
        Self::with_options(service, ATTACH_TIMEOUT, Codec::default())
    }

    /// Connect with an explicit connect timeout and codec.
    pub fn with_options(service: &str, timeout_connect: Duration, codec: Codec) -> Result<Self> {
        let req_seg = Segment::attach(
            &req_segment_name(service),
            timeout_connect,
            ATTACH_POLL_INTERVAL,
        )?;
        let rep_seg = Segment::attach(
            &rep_segment_name(service),
            timeout_connect,
            ATTACH_POLL_INTERVAL,
        )?;
        info!(service, "requester connected");
        Ok(Self {
            service: service.to_string(),
            codec,
            req_seg: Some(req_seg),
            rep_seg: Some(rep_seg),
            rep_tail: 0,
        })
    }

    fn closed_err(&self) -> ShmError {
        ShmError::Connection(format!("requester '{}' is closed", self.service))
    }

    /// Send a request. Returns `Ok(false)` if the request ring is full (the
    /// replier has fallen that far behind).
    pub fn send<T: Serialize>(&mut self, value: &T) -> Result<bool> {
        let payload = self.codec.encode(value)?;
        let seg = self.req_seg.as_ref().ok_or_else(|| self.closed_err())?;
        ring::write_message(seg, &payload, WriteMode::Drop)
    }

    /// Raw-bytes variant of [`send`](Self::send).
    pub fn send_bytes(&mut self, payload: &[u8]) -> Result<bool> {
        let seg = self.req_seg.as_ref().ok_or_else(|| self.closed_err())?;
        ring::write_message(seg, payload, WriteMode::Drop)
    }

    fn try_recv_raw(&mut self) -> Result<Option<Vec<u8>>> {
        let seg = self.rep_seg.as_ref().ok_or_else(|| self.closed_err())?;
        match ring::read_message_private(seg, self.rep_tail) {
            Some((payload, new_tail)) => {
                self.rep_tail = new_tail;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    /// Wait for the reply to the last request. `Ok(None)` on timeout.
    pub fn recv<T: DeserializeOwned>(&mut self, timeout: Option<Duration>) -> Result<Option<T>> {
        let codec = self.codec;
        match poll_until(|| self.try_recv_raw(), timeout, RECV_POLL_INTERVAL)? {
            Some(raw) => Ok(Some(codec.decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Like [`recv`](Self::recv) but returns the raw reply bytes.
    pub fn recv_bytes(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        poll_until(|| self.try_recv_raw(), timeout, RECV_POLL_INTERVAL)
    }

    /// Send a request and wait for its reply.
    ///
    /// Unlike [`recv`](Self::recv), a missing reply here IS an error:
    /// `ShmError::Timeout` after `timeout`.
    pub fn request<T: Serialize, R: DeserializeOwned>(
        &mut self,
        value: &T,
        timeout: Option<Duration>,
    ) -> Result<R> {
        self.send(value)?;
        match self.recv(timeout)? {
            Some(reply) => Ok(reply),
            None => Err(ShmError::Timeout(format!(
                "no reply from service '{}' within {:.3}s",
                self.service,
                timeout.unwrap_or(Duration::ZERO).as_secs_f64()
            ))),
        }
    }

    /// Detach from both segments (they belong to the replier). Idempotent.
    pub fn close(&mut self) {
        if let Some(seg) = self.req_seg.take() {
            seg.close(false);
        }
        if let Some(seg) = self.rep_seg.take() {
            seg.close(false);
            info!(service = %self.service, "requester closed");
        }
    }
}

impl Drop for Requester {
    fn drop(&mut self) {
        self.close();
    }
}
