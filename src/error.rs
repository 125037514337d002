// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Error taxonomy for the crate. All fallible operations return
// `shmcomm::Result`; a receive that times out is NOT an error and yields
// `Ok(None)` instead (only `Requester::request` promotes that to
// `ShmError::Timeout`).

use thiserror::Error;

/// Errors surfaced by segment, ring, lock, and endpoint operations.
#[derive(Debug, Error)]
pub enum ShmError {
    /// A segment could not be created or attached: OS allocation failure,
    /// segment missing after the attach timeout, or header mismatch.
    #[error("connection error: {0}")]
    Connection(String),

    /// A blocking operation (file-lock acquire, `request`) exceeded its
    /// deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A non-overwriting blocking write still found the ring full when the
    /// deadline elapsed. Distinct from `Timeout` so callers can react by
    /// resizing the ring instead of retrying.
    #[error("ring buffer full: {0}")]
    BufferFull(String),

    /// Codec encode or decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid caller input: oversized payload, degenerate ring geometry,
    /// or an unknown serialization method name.
    #[error("invalid argument: {0}")]
    Argument(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ShmError>;
