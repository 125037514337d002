// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// File lock tests. The lock is advisory and process-scoped, so contention
// has to be exercised with a second process; within one process these
// tests cover the guard lifecycle, timeouts against a held lock in a
// child process, and path sanitisation.

use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use shmcomm::lock::FileLock;
use shmcomm::ShmError;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test_lock_{prefix}_{}_{n}", std::process::id())
}

#[test]
fn lock_file_is_created_in_tempdir() {
    let name = unique_name("path");
    let lock = FileLock::new(&name).expect("create lock");

    assert!(lock.path().exists());
    assert!(lock.path().starts_with(std::env::temp_dir()));
    let file_name = lock.path().file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(file_name, format!("shmcomm_{name}.lock"));
}

#[test]
fn slashes_in_names_are_sanitised() {
    let lock = FileLock::new("robot/arm\\joint").expect("create lock");
    let file_name = lock.path().file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(file_name, "shmcomm_robot_arm_joint.lock");
}

#[test]
fn acquire_and_release_roundtrip() {
    let name = unique_name("roundtrip");
    let lock = FileLock::new(&name).expect("create lock");

    let guard = lock.acquire(Some(Duration::from_secs(1))).expect("acquire");
    drop(guard);

    // Re-acquirable immediately after release.
    let guard = lock.acquire(Some(Duration::from_secs(1))).expect("re-acquire");
    drop(guard);
}

#[test]
fn release_is_idempotent() {
    let name = unique_name("idem");
    let lock = FileLock::new(&name).expect("create lock");

    let mut guard = lock.acquire(Some(Duration::from_secs(1))).expect("acquire");
    guard.release();
    guard.release(); // second call is a no-op
    drop(guard);

    lock.acquire(Some(Duration::from_secs(1))).expect("re-acquire");
}

#[test]
fn acquire_times_out_while_held_elsewhere() {
    let name = unique_name("contended");
    let lock = FileLock::new(&name).expect("create lock");

    // Hold the lock from a child process; flock exclusion is per-process.
    let mut holder = Command::new(std::env::current_exe().unwrap())
        .env("SHMCOMM_HOLD_LOCK", &name)
        .arg("hold_lock_helper")
        .arg("--exact")
        .arg("--nocapture")
        .spawn()
        .expect("spawn holder");

    // Wait for the child to signal (via the marker file) that it holds the lock.
    let marker = std::env::temp_dir().join(format!("shmcomm_{name}.held"));
    let deadline = Instant::now() + Duration::from_secs(10);
    while !marker.exists() {
        assert!(Instant::now() < deadline, "helper never acquired the lock");
        std::thread::sleep(Duration::from_millis(10));
    }

    let start = Instant::now();
    let err = lock
        .acquire(Some(Duration::from_millis(100)))
        .expect_err("should time out while held elsewhere");
    let elapsed = start.elapsed();

    assert!(matches!(err, ShmError::Timeout(_)));
    assert!(elapsed >= Duration::from_millis(100));

    holder.wait().expect("holder exit");
    let _ = std::fs::remove_file(&marker);

    // Once the holder exits the OS released its lock.
    lock.acquire(Some(Duration::from_secs(1))).expect("acquire after holder exit");
}

// Helper "test" run in a child process by acquire_times_out_while_held_elsewhere:
// acquires the named lock, drops a marker file, and holds for a moment.
#[test]
fn hold_lock_helper() {
    let Ok(name) = std::env::var("SHMCOMM_HOLD_LOCK") else {
        return; // normal test runs skip the helper
    };

    let lock = FileLock::new(&name).expect("create lock");
    let _guard = lock.acquire(Some(Duration::from_secs(5))).expect("acquire");

    let marker = std::env::temp_dir().join(format!("shmcomm_{name}.held"));
    std::fs::write(&marker, b"held").expect("write marker");

    std::thread::sleep(Duration::from_millis(500));
}
