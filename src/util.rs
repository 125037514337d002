// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Segment naming, bounded polling, and cleanup helpers.

use std::time::{Duration, Instant};

use tracing::info;

use crate::error::Result;
use crate::platform::ShmMapping;

/// Prefix shared by every segment this crate creates; `list_segments`
/// filters on it.
pub const SEGMENT_PREFIX: &str = "shmcomm_";

/// Sleep between endpoint receive polls.
pub(crate) const RECV_POLL_INTERVAL: Duration = Duration::from_micros(100);

// ---------------------------------------------------------------------------
// Segment names
// ---------------------------------------------------------------------------

/// Segment name for a publish/subscribe channel.
pub fn pub_segment_name(channel: &str) -> String {
    format!("shmcomm_pub_{channel}")
}

/// Segment name for a push/pull channel.
pub fn push_segment_name(channel: &str) -> String {
    format!("shmcomm_push_{channel}")
}

/// Segment name for request traffic (requester → replier).
pub fn req_segment_name(channel: &str) -> String {
    format!("shmcomm_req_{channel}")
}

/// Segment name for reply traffic (replier → requester).
pub fn rep_segment_name(channel: &str) -> String {
    format!("shmcomm_rep_{channel}")
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Call `attempt` until it yields a value or `timeout` expires.
///
/// `None` polls forever; `Some(Duration::ZERO)` makes exactly one attempt.
/// Errors from `attempt` propagate immediately.
pub(crate) fn poll_until<T, F>(
    mut attempt: F,
    timeout: Option<Duration>,
    poll_interval: Duration,
) -> Result<Option<T>>
where
    F: FnMut() -> Result<Option<T>>,
{
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        if let Some(value) = attempt()? {
            return Ok(Some(value));
        }
        if let Some(dl) = deadline {
            if Instant::now() >= dl {
                return Ok(None);
            }
        }
        std::thread::sleep(poll_interval);
    }
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// Forcibly remove a segment by OS-level name, e.g. after a crash during
/// development.
///
/// Returns `true` iff a segment existed and was removed; calling it again
/// returns `false`.
pub fn force_unlink(segment_name: &str) -> bool {
    let removed = ShmMapping::unlink_by_name(segment_name);
    if removed {
        info!(segment = segment_name, "force-unlinked segment");
    }
    removed
}

/// List the shmcomm segments visible on this host.
///
/// Shared memory is file-system-visible only on Linux (`/dev/shm`); other
/// platforms return an empty list rather than erroring.
#[cfg(target_os = "linux")]
pub fn list_segments() -> Vec<String> {
    use tracing::warn;

    match std::fs::read_dir("/dev/shm") {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with(SEGMENT_PREFIX))
            .collect(),
        Err(e) => {
            warn!("could not list /dev/shm: {e}");
            Vec::new()
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn list_segments() -> Vec<String> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_names_are_prefixed() {
        assert_eq!(pub_segment_name("sensors"), "shmcomm_pub_sensors");
        assert_eq!(push_segment_name("jobs"), "shmcomm_push_jobs");
        assert_eq!(req_segment_name("ctl"), "shmcomm_req_ctl");
        assert_eq!(rep_segment_name("ctl"), "shmcomm_rep_ctl");
    }

    #[test]
    fn channel_passes_through_verbatim() {
        assert_eq!(pub_segment_name("robot/pose"), "shmcomm_pub_robot/pose");
    }

    #[test]
    fn poll_until_zero_timeout_is_one_attempt() {
        let mut calls = 0;
        let result: Result<Option<i32>> = poll_until(
            || {
                calls += 1;
                Ok(None)
            },
            Some(Duration::ZERO),
            Duration::from_micros(100),
        );
        assert!(matches!(result, Ok(None)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn poll_until_returns_first_value() {
        let mut calls = 0;
        let result = poll_until(
            || {
                calls += 1;
                Ok(if calls == 3 { Some(calls) } else { None })
            },
            Some(Duration::from_secs(1)),
            Duration::from_micros(100),
        );
        assert_eq!(result.unwrap(), Some(3));
    }

    #[test]
    fn force_unlink_missing_segment_is_false() {
        assert!(!force_unlink("shmcomm_pub_definitely_not_here"));
    }
}
