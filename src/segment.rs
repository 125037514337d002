// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Segment lifecycle: create / attach / close / destroy for named shared
// memory regions, and the 128-byte header contract every ring shares.
//
// Header layout (16 little-endian i64 cells, 8-byte aligned):
//     Cell  Offset  Field
//     0     0       MAGIC       0x53484D434F4D4D31 ("SHMCOMM1")
//     1     8       VERSION
//     2     16      HEAD        next write slot (written only by producer)
//     3     24      TAIL        shared-tail read cursor (push/pull only)
//     4     32      MSG_COUNT   producer write counter
//     5     40      DROP_COUNT  producer drop counter
//     6     48      NUM_SLOTS   ring capacity (immutable after init)
//     7     56      SLOT_SIZE   bytes per slot incl. 4-byte prefix (immutable)
//     8-15  64-127  reserved, zero
//
// Slot data starts at byte offset 128. Each header cell has exactly one
// designated writer, so cross-process access needs no locks — only the
// acquire/release pairing on the cursor cells.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, ShmError};
use crate::platform::ShmMapping;

/// Identifies the segment format ("SHMCOMM1" as a little-endian i64).
pub const MAGIC: i64 = 0x53484D434F4D4D31;

/// Current header version.
pub const VERSION: i64 = 1;

/// Header size in bytes; slot data begins at this offset.
pub const HEADER_SIZE: usize = 128;

/// Every slot starts with a little-endian u32 payload length.
pub const SLOT_PREFIX_SIZE: usize = 4;

/// Default time to wait for a segment to appear on attach.
pub const ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default sleep between attach retries.
pub const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(5);

const IDX_MAGIC: usize = 0;
const IDX_VERSION: usize = 1;
const IDX_HEAD: usize = 2;
const IDX_TAIL: usize = 3;
const IDX_MSG_COUNT: usize = 4;
const IDX_DROP_COUNT: usize = 5;
const IDX_NUM_SLOTS: usize = 6;
const IDX_SLOT_SIZE: usize = 7;

const HEADER_CELLS: usize = 16;

/// Total shared memory size in bytes for the given ring geometry.
pub fn segment_size(num_slots: usize, slot_size: usize) -> usize {
    HEADER_SIZE + num_slots * slot_size
}

// ---------------------------------------------------------------------------
// SegmentHeader — live atomic view of the 128-byte header
// ---------------------------------------------------------------------------

/// The header cells, viewed in place through `AtomicI64`.
///
/// Aligned 64-bit loads and stores are single instructions on mainstream
/// platforms; the explicit acquire/release pairing on HEAD and TAIL is what
/// makes slot contents visible before the cursor that commits them, even on
/// weakly ordered hardware.
#[repr(C, align(8))]
pub struct SegmentHeader {
    cells: [AtomicI64; HEADER_CELLS],
}

impl SegmentHeader {
    /// Next slot the producer will write. Acquire-paired with the producer's
    /// release store, so a consumer that observes the new value also observes
    /// the slot bytes behind it.
    pub fn head(&self) -> i64 {
        self.cells[IDX_HEAD].load(Ordering::Acquire)
    }

    /// Advance the producer cursor. Release ordering commits the slot bytes
    /// written before this store. Producer-only.
    pub(crate) fn store_head(&self, head: i64) {
        self.cells[IDX_HEAD].store(head, Ordering::Release);
    }

    /// Shared-tail read cursor. Stays 0 when consumers use private cursors.
    pub fn tail(&self) -> i64 {
        self.cells[IDX_TAIL].load(Ordering::Acquire)
    }

    /// Advance the shared tail. Callers hold the channel file lock.
    pub(crate) fn store_tail(&self, tail: i64) {
        self.cells[IDX_TAIL].store(tail, Ordering::Release);
    }

    /// Monotonic count of committed writes. Statistics only — it is updated
    /// after HEAD and must never be used to synchronise with the producer.
    pub fn msg_count(&self) -> i64 {
        self.cells[IDX_MSG_COUNT].load(Ordering::Relaxed)
    }

    pub(crate) fn bump_msg_count(&self) {
        self.cells[IDX_MSG_COUNT].fetch_add(1, Ordering::Relaxed);
    }

    /// Monotonic count of non-blocking writes rejected because the ring was
    /// full. Statistics only.
    pub fn drop_count(&self) -> i64 {
        self.cells[IDX_DROP_COUNT].load(Ordering::Relaxed)
    }

    pub(crate) fn bump_drop_count(&self) {
        self.cells[IDX_DROP_COUNT].fetch_add(1, Ordering::Relaxed);
    }

    /// Ring capacity in slots. Immutable after init.
    pub fn num_slots(&self) -> i64 {
        self.cells[IDX_NUM_SLOTS].load(Ordering::Relaxed)
    }

    /// Bytes per slot including the 4-byte length prefix. Immutable after init.
    pub fn slot_size(&self) -> i64 {
        self.cells[IDX_SLOT_SIZE].load(Ordering::Relaxed)
    }

    fn magic(&self) -> i64 {
        self.cells[IDX_MAGIC].load(Ordering::Acquire)
    }

    fn version(&self) -> i64 {
        self.cells[IDX_VERSION].load(Ordering::Relaxed)
    }

    /// Write the initial header into a freshly created segment.
    /// MAGIC goes last so attachers polling the header cannot validate a
    /// half-initialised segment.
    fn init(&self, num_slots: i64, slot_size: i64) {
        for cell in &self.cells {
            cell.store(0, Ordering::Relaxed);
        }
        self.cells[IDX_VERSION].store(VERSION, Ordering::Relaxed);
        self.cells[IDX_NUM_SLOTS].store(num_slots, Ordering::Relaxed);
        self.cells[IDX_SLOT_SIZE].store(slot_size, Ordering::Relaxed);
        self.cells[IDX_MAGIC].store(MAGIC, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// An open named shared-memory segment holding one ring buffer.
///
/// Created by the producer-side owner (Publisher, Pusher, Replier) and
/// attached by consumers. Only the owner destroys the OS-level name;
/// attachers merely detach. A `Segment` is a non-copyable handle — owning
/// it is what makes the single-producer discipline hold.
pub struct Segment {
    map: ShmMapping,
    name: String,
    num_slots: i64,
    slot_size: i64,
}

impl Segment {
    /// Create a segment named `name` with the given ring geometry and
    /// initialise its header.
    ///
    /// Any stale segment with the same name (left behind by a crashed owner)
    /// is removed first, best-effort.
    pub fn create(name: &str, num_slots: usize, slot_size: usize) -> Result<Self> {
        if num_slots < 2 {
            return Err(ShmError::Argument(format!(
                "num_slots must be at least 2 (one slot is the empty/full sentinel), got {num_slots}"
            )));
        }
        if slot_size <= SLOT_PREFIX_SIZE {
            return Err(ShmError::Argument(format!(
                "slot_size must exceed the {SLOT_PREFIX_SIZE}-byte length prefix, got {slot_size}"
            )));
        }

        let size = segment_size(num_slots, slot_size);
        let map = ShmMapping::create(name, size).map_err(|e| {
            ShmError::Connection(format!(
                "failed to create shared memory '{name}' ({size} bytes): {e}"
            ))
        })?;

        let seg = Self {
            map,
            name: name.to_string(),
            num_slots: num_slots as i64,
            slot_size: slot_size as i64,
        };
        seg.header().init(seg.num_slots, seg.slot_size);

        info!(segment = name, num_slots, slot_size, "created shared memory segment");
        Ok(seg)
    }

    /// Attach to an existing segment, polling until it appears and its
    /// header validates, or `timeout` elapses.
    ///
    /// A present-but-invalid header (wrong magic or version) fails
    /// immediately without retrying: waiting will not fix talking to the
    /// wrong segment.
    pub fn attach(name: &str, timeout: Duration, poll_interval: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        let mut last_err: Option<std::io::Error> = None;

        loop {
            match ShmMapping::open(name) {
                Ok(map) => {
                    let (num_slots, slot_size) = Self::validate(&map, name)?;
                    info!(segment = name, "attached to shared memory segment");
                    return Ok(Self {
                        map,
                        name: name.to_string(),
                        num_slots,
                        slot_size,
                    });
                }
                Err(e) => last_err = Some(e),
            }

            if Instant::now() >= deadline {
                return Err(ShmError::Connection(format!(
                    "shared memory segment '{name}' did not appear within {:.1}s; \
                     is the owning endpoint running? (last error: {})",
                    timeout.as_secs_f64(),
                    last_err
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "none".into()),
                )));
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Attach with the default 5 s timeout and 5 ms poll interval.
    pub fn attach_default(name: &str) -> Result<Self> {
        Self::attach(name, ATTACH_TIMEOUT, ATTACH_POLL_INTERVAL)
    }

    fn validate(map: &ShmMapping, name: &str) -> Result<(i64, i64)> {
        if map.len() < HEADER_SIZE {
            return Err(ShmError::Connection(format!(
                "shared memory '{name}' is only {} bytes — too small for a segment header",
                map.len()
            )));
        }

        let hdr = unsafe { &*(map.as_ptr() as *const SegmentHeader) };
        if hdr.magic() != MAGIC {
            return Err(ShmError::Connection(format!(
                "shared memory '{name}' has invalid magic {:#018X} (expected {MAGIC:#018X}); \
                 are you connecting to the right segment?",
                hdr.magic()
            )));
        }
        if hdr.version() != VERSION {
            return Err(ShmError::Connection(format!(
                "shared memory '{name}' has header version {} but this library expects {VERSION}",
                hdr.version()
            )));
        }

        let num_slots = hdr.num_slots();
        let slot_size = hdr.slot_size();
        if num_slots < 2 || slot_size <= SLOT_PREFIX_SIZE as i64 {
            return Err(ShmError::Connection(format!(
                "shared memory '{name}' declares corrupt geometry \
                 (num_slots={num_slots}, slot_size={slot_size})"
            )));
        }
        if map.len() < segment_size(num_slots as usize, slot_size as usize) {
            return Err(ShmError::Connection(format!(
                "shared memory '{name}' is {} bytes but its header declares {} — truncated segment",
                map.len(),
                segment_size(num_slots as usize, slot_size as usize)
            )));
        }

        Ok((num_slots, slot_size))
    }

    /// Detach from the segment; with `destroy`, also remove the OS-level
    /// name so the region disappears once every process has detached.
    ///
    /// Teardown never fails loudly: problems are logged and swallowed.
    pub fn close(self, destroy: bool) {
        if destroy {
            self.map.unlink();
            info!(segment = %self.name, "destroyed shared memory segment");
        } else {
            debug!(segment = %self.name, "detached from shared memory segment");
        }
        // Unmapping happens in ShmMapping::drop.
    }

    /// Live view of the header cells.
    pub fn header(&self) -> &SegmentHeader {
        unsafe { &*(self.map.as_ptr() as *const SegmentHeader) }
    }

    /// OS-level segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ring capacity in slots.
    pub fn num_slots(&self) -> i64 {
        self.num_slots
    }

    /// Bytes per slot including the 4-byte length prefix.
    pub fn slot_size(&self) -> i64 {
        self.slot_size
    }

    /// Largest payload a slot can carry.
    pub fn max_payload(&self) -> usize {
        self.slot_size as usize - SLOT_PREFIX_SIZE
    }

    /// Pointer to the first byte of slot `index`.
    ///
    /// # Safety
    /// `index` must be in `[0, num_slots)`; the caller must respect the
    /// producer/consumer ownership rules for the slot.
    pub(crate) unsafe fn slot_ptr(&self, index: i64) -> *mut u8 {
        debug_assert!(index >= 0 && index < self.num_slots);
        self.map
            .as_mut_ptr()
            .add(HEADER_SIZE + index as usize * self.slot_size as usize)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("num_slots", &self.num_slots)
            .field("slot_size", &self.slot_size)
            .finish()
    }
}

