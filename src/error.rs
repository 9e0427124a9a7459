// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Errors that can occur while building or scanning a [`crate::Index`].
///
/// The taxonomy mirrors §7 of the design: only input-invalid, capacity,
/// format and unsupported-operation errors ever reach the caller. Internal
/// retries (the parallel-scan CAS loop) never surface as errors.
#[derive(Debug)]
pub enum Error {
    /// I/O error reading or writing the page file.
    Io(std::io::Error),

    /// Serialization failed.
    Encode(EncodeError),

    /// Deserialization failed.
    Decode(DecodeError),

    /// A build-time row was NULL where a key or required INCLUDE value was
    /// expected, had the wrong number of key columns, or named more than 16
    /// INCLUDE columns. Fatal at build time; no index is written.
    InvalidInput(&'static str),

    /// A single row did not fit in the free space of one page, even alone.
    /// Fatal at build time.
    RowTooLarge {
        /// Encoded row size in bytes.
        row_len: usize,
        /// Usable payload space per page.
        available: usize,
    },

    /// A page's declared item count disagreed with its run structure, or the
    /// metapage magic/version did not match. The index is unusable.
    FormatViolation(&'static str),

    /// The caller asked for a write path (insert/update/delete) that this
    /// read-only, immutable-after-build engine does not support.
    Unsupported(&'static str),

    /// A scan observed its cancellation token set and stopped before
    /// exhausting its range. Never produced internally; only surfaces when a
    /// caller supplies a [`crate::scan::CancellationToken`].
    Cancelled,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "SmolIndexError: I/O error: {e}"),
            Self::Encode(e) => write!(f, "SmolIndexError: encode error: {e}"),
            Self::Decode(e) => write!(f, "SmolIndexError: decode error: {e}"),
            Self::InvalidInput(msg) => write!(f, "SmolIndexError: invalid input: {msg}"),
            Self::RowTooLarge { row_len, available } => write!(
                f,
                "SmolIndexError: row of {row_len} bytes does not fit in a page with {available} bytes of payload space"
            ),
            Self::FormatViolation(msg) => write!(f, "SmolIndexError: format violation: {msg}"),
            Self::Unsupported(msg) => write!(f, "SmolIndexError: unsupported operation: {msg}"),
            Self::Cancelled => write!(f, "SmolIndexError: scan cancelled"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Index result type.
pub type Result<T> = std::result::Result<T, Error>;
