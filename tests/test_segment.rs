// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Segment lifecycle tests: create / attach / close / destroy, header
// validation, stale-segment cleanup, and the force-unlink utility.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use shmcomm::segment::{segment_size, Segment, HEADER_SIZE};
use shmcomm::{force_unlink, ShmError};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("shmcomm_test_seg_{prefix}_{}_{n}", std::process::id())
}

#[test]
fn segment_size_is_header_plus_slots() {
    assert_eq!(segment_size(64, 4096), HEADER_SIZE + 64 * 4096);
    assert_eq!(segment_size(2, 8), 128 + 16);
}

#[test]
fn create_initialises_header() {
    let name = unique_name("init");
    let seg = Segment::create(&name, 16, 256).expect("create");

    let hdr = seg.header();
    assert_eq!(hdr.head(), 0);
    assert_eq!(hdr.tail(), 0);
    assert_eq!(hdr.msg_count(), 0);
    assert_eq!(hdr.drop_count(), 0);
    assert_eq!(hdr.num_slots(), 16);
    assert_eq!(hdr.slot_size(), 256);
    assert_eq!(seg.max_payload(), 252);

    seg.close(true);
}

#[test]
fn degenerate_geometry_is_an_argument_error() {
    assert!(matches!(
        Segment::create(&unique_name("one_slot"), 1, 256),
        Err(ShmError::Argument(_))
    ));
    assert!(matches!(
        Segment::create(&unique_name("tiny_slot"), 8, 4),
        Err(ShmError::Argument(_))
    ));
}

#[test]
fn attach_sees_creator_geometry() {
    let name = unique_name("attach");
    let owner = Segment::create(&name, 8, 512).expect("create");

    let attached =
        Segment::attach(&name, Duration::from_secs(1), Duration::from_millis(5)).expect("attach");
    assert_eq!(attached.num_slots(), 8);
    assert_eq!(attached.slot_size(), 512);

    attached.close(false);
    owner.close(true);
}

#[test]
fn attach_missing_segment_times_out_with_connection_error() {
    let name = unique_name("missing");

    let start = Instant::now();
    let err = Segment::attach(&name, Duration::from_millis(200), Duration::from_millis(5))
        .expect_err("attach should fail");
    let elapsed = start.elapsed();

    assert!(matches!(err, ShmError::Connection(_)));
    assert!(elapsed >= Duration::from_millis(200), "gave up after {elapsed:?}");
}

#[test]
fn attach_before_create_blocks_until_create() {
    let name = unique_name("late_create");

    let creator = {
        let name = name.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            Segment::create(&name, 8, 256).expect("create")
        })
    };

    let attached =
        Segment::attach(&name, Duration::from_secs(2), Duration::from_millis(5)).expect("attach");
    assert_eq!(attached.num_slots(), 8);

    attached.close(false);
    creator.join().unwrap().close(true);
}

#[cfg(target_os = "linux")]
#[test]
fn attach_header_mismatch_fails_immediately() {
    let name = unique_name("bad_magic");
    let seg = Segment::create(&name, 8, 256).expect("create");

    // Corrupt the magic through the file-system view of the segment.
    let path = format!("/dev/shm/{name}");
    let mut contents = std::fs::read(&path).expect("read segment");
    contents[..8].copy_from_slice(&0xDEADBEEFu64.to_le_bytes());
    std::fs::write(&path, &contents).expect("corrupt segment");

    let start = Instant::now();
    let err = Segment::attach(&name, Duration::from_secs(5), Duration::from_millis(5))
        .expect_err("attach should fail");
    let elapsed = start.elapsed();

    assert!(matches!(err, ShmError::Connection(_)));
    // Fatal on first sight — nowhere near the 5 s retry budget.
    assert!(elapsed < Duration::from_secs(1), "retried for {elapsed:?}");

    seg.close(true);
}

#[test]
fn create_replaces_stale_segment() {
    let name = unique_name("stale");

    // Simulate a crashed owner: the mapping goes away but the OS name stays.
    let stale = Segment::create(&name, 8, 128).expect("first create");
    drop(stale);

    let fresh = Segment::create(&name, 16, 256).expect("second create");
    let attached =
        Segment::attach(&name, Duration::from_secs(1), Duration::from_millis(5)).expect("attach");
    assert_eq!(attached.num_slots(), 16);
    assert_eq!(attached.slot_size(), 256);

    attached.close(false);
    fresh.close(true);
}

#[test]
fn destroy_removes_the_os_name() {
    let name = unique_name("destroy");
    let seg = Segment::create(&name, 8, 128).expect("create");
    seg.close(true);

    let err = Segment::attach(&name, Duration::from_millis(100), Duration::from_millis(5))
        .expect_err("attach after destroy should fail");
    assert!(matches!(err, ShmError::Connection(_)));
}

#[test]
fn detach_keeps_the_os_name() {
    let name = unique_name("detach");
    let owner = Segment::create(&name, 8, 128).expect("create");

    let attached =
        Segment::attach(&name, Duration::from_secs(1), Duration::from_millis(5)).expect("attach");
    attached.close(false);

    // Still attachable: only the owner's destroy removes the name.
    let again =
        Segment::attach(&name, Duration::from_secs(1), Duration::from_millis(5)).expect("re-attach");
    again.close(false);
    owner.close(true);
}

#[test]
fn force_unlink_is_idempotent() {
    let name = unique_name("force");
    let seg = Segment::create(&name, 8, 128).expect("create");
    drop(seg); // keep the OS name alive, drop only the mapping

    assert!(force_unlink(&name));
    assert!(!force_unlink(&name));
}

#[cfg(target_os = "linux")]
#[test]
fn list_segments_shows_created_segment() {
    let name = unique_name("list");
    let seg = Segment::create(&name, 8, 128).expect("create");

    let listed = shmcomm::list_segments();
    assert!(listed.contains(&name), "{name} missing from {listed:?}");

    seg.close(true);
    assert!(!shmcomm::list_segments().contains(&name));
}
