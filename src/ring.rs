// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Hot-path ring buffer operations over an open segment.
//
// One producer per segment, two consumption disciplines:
//   private cursor — each consumer tracks its own tail (pub/sub),
//   shared tail    — consumers compete for slots under the channel file
//                    lock (push/pull).
// The slot at HEAD is reserved as a sentinel, so a ring of N slots holds
// N − 1 messages; HEAD == TAIL therefore always means empty, never full.
//
// Commit protocol: the producer writes the slot bytes, then advances HEAD
// with a release store. Consumers acquire-load HEAD before touching any
// slot behind it, so they can never observe a partially written payload.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, ShmError};
use crate::lock::FileLockGuard;
use crate::segment::{Segment, SLOT_PREFIX_SIZE};

/// Sleep between retries while a non-overwriting blocking write waits for a
/// free slot.
const FULL_RETRY_SLEEP: Duration = Duration::from_micros(50);

/// Producer behaviour when the ring is full.
#[derive(Debug, Clone, Copy)]
pub enum WriteMode {
    /// Write regardless of the shared tail. Slow consumers silently miss
    /// overwritten slots; this is the publish/subscribe semantics.
    Overwrite,
    /// Count the message as dropped and return `Ok(false)` when full.
    Drop,
    /// Spin until a slot frees up or the deadline passes
    /// (`ShmError::BufferFull`). `None` waits forever.
    Block(Option<Duration>),
}

// ---------------------------------------------------------------------------
// Slot I/O
// ---------------------------------------------------------------------------

/// Write `payload` into `slot_index`. Does not advance any cursor.
unsafe fn write_slot(seg: &Segment, slot_index: i64, payload: &[u8]) {
    let slot = seg.slot_ptr(slot_index);
    let len = (payload.len() as u32).to_le_bytes();
    std::ptr::copy_nonoverlapping(len.as_ptr(), slot, SLOT_PREFIX_SIZE);
    std::ptr::copy_nonoverlapping(payload.as_ptr(), slot.add(SLOT_PREFIX_SIZE), payload.len());
}

/// Copy the payload stored in `slot_index` out of shared memory.
unsafe fn read_slot(seg: &Segment, slot_index: i64) -> Vec<u8> {
    let slot = seg.slot_ptr(slot_index);
    let mut len_bytes = [0u8; SLOT_PREFIX_SIZE];
    std::ptr::copy_nonoverlapping(slot, len_bytes.as_mut_ptr(), SLOT_PREFIX_SIZE);
    // Clamp against a corrupt prefix so the copy stays inside the slot.
    let len = (u32::from_le_bytes(len_bytes) as usize).min(seg.max_payload());
    let mut payload = vec![0u8; len];
    std::ptr::copy_nonoverlapping(slot.add(SLOT_PREFIX_SIZE), payload.as_mut_ptr(), len);
    payload
}

// ---------------------------------------------------------------------------
// Producer path
// ---------------------------------------------------------------------------

/// Write `payload` into the ring.
///
/// The caller must be the only producer for this segment. Returns
/// `Ok(false)` only in `WriteMode::Drop` when the ring was full (the drop
/// counter is bumped); every other outcome is `Ok(true)` or an error.
pub fn write_message(seg: &Segment, payload: &[u8], mode: WriteMode) -> Result<bool> {
    if payload.len() > seg.max_payload() {
        return Err(ShmError::Argument(format!(
            "payload of {} bytes exceeds slot capacity {}; \
             increase slot_size when creating the channel",
            payload.len(),
            seg.max_payload()
        )));
    }

    let hdr = seg.header();
    let n = seg.num_slots();

    match mode {
        WriteMode::Overwrite => {}
        WriteMode::Drop | WriteMode::Block(_) => {
            let deadline = match mode {
                WriteMode::Block(Some(timeout)) => Some(Instant::now() + timeout),
                _ => None,
            };
            loop {
                let head = hdr.head();
                if (head + 1) % n != hdr.tail() {
                    break; // a slot is free
                }
                match mode {
                    WriteMode::Drop => {
                        hdr.bump_drop_count();
                        debug!(segment = seg.name(), "ring full, message dropped");
                        return Ok(false);
                    }
                    _ => {
                        if let Some(dl) = deadline {
                            if Instant::now() >= dl {
                                return Err(ShmError::BufferFull(format!(
                                    "ring buffer of segment '{}' still full after {:?}",
                                    seg.name(),
                                    mode_timeout(mode)
                                )));
                            }
                        }
                        std::thread::sleep(FULL_RETRY_SLEEP);
                    }
                }
            }
        }
    }

    let head = hdr.head();
    let next = (head + 1) % n;

    unsafe { write_slot(seg, head, payload) };

    // Commit: the release store on HEAD publishes the slot bytes.
    hdr.store_head(next);
    hdr.bump_msg_count();

    debug!(
        segment = seg.name(),
        bytes = payload.len(),
        slot = head,
        "wrote message"
    );
    Ok(true)
}

fn mode_timeout(mode: WriteMode) -> Duration {
    match mode {
        WriteMode::Block(Some(t)) => t,
        _ => Duration::ZERO,
    }
}

// ---------------------------------------------------------------------------
// Consumer paths
// ---------------------------------------------------------------------------

/// Non-blocking read with a caller-owned cursor (single-consumer path).
///
/// Returns the payload and the advanced cursor, or `None` when the ring
/// holds nothing past `local_tail`. The shared TAIL cell is never touched;
/// coexisting consumers each keep their own cursor.
pub fn read_message_private(seg: &Segment, local_tail: i64) -> Option<(Vec<u8>, i64)> {
    if local_tail < 0 || local_tail >= seg.num_slots() {
        return None; // cursor from a different geometry
    }
    let hdr = seg.header();
    if local_tail == hdr.head() {
        return None; // empty
    }

    let payload = unsafe { read_slot(seg, local_tail) };
    let new_tail = (local_tail + 1) % seg.num_slots();

    debug!(
        segment = seg.name(),
        bytes = payload.len(),
        slot = local_tail,
        "read message (private cursor)"
    );
    Some((payload, new_tail))
}

/// Non-blocking read that claims a slot through the shared TAIL cell
/// (competing-consumer path).
///
/// The guard parameter is the capability: holding the channel's file lock
/// for the whole call is what keeps two consumers from claiming the same
/// slot, so the signature demands proof of it.
pub fn read_message_shared(seg: &Segment, _guard: &FileLockGuard) -> Option<Vec<u8>> {
    let hdr = seg.header();
    let tail = hdr.tail();
    if tail == hdr.head() {
        return None; // empty
    }

    let payload = unsafe { read_slot(seg, tail) };
    hdr.store_tail((tail + 1) % seg.num_slots());

    debug!(segment = seg.name(), slot = tail, "claimed message (shared tail)");
    Some(payload)
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of a ring's header counters.
///
/// `msg_count` and `drop_count` are statistics: the producer updates them
/// after the HEAD commit, so they may briefly trail the cursors. Never use
/// them for synchronisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStats {
    pub head: i64,
    pub tail: i64,
    pub num_slots: i64,
    pub slot_size: i64,
    pub msg_count: i64,
    pub drop_count: i64,
    pub used_slots: i64,
    pub free_slots: i64,
}

/// Snapshot the ring statistics for `seg`.
pub fn stats(seg: &Segment) -> RingStats {
    let hdr = seg.header();
    let head = hdr.head();
    let tail = hdr.tail();
    let num_slots = seg.num_slots();
    let used = (head - tail).rem_euclid(num_slots);

    RingStats {
        head,
        tail,
        num_slots,
        slot_size: seg.slot_size(),
        msg_count: hdr.msg_count(),
        drop_count: hdr.drop_count(),
        used_slots: used,
        free_slots: num_slots - used - 1,
    }
}
