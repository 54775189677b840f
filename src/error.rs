//! Error types for the muxer core.

use thiserror::Error;

/// Errors the muxer core can report.
///
/// This does not cover the `NeedMoreData` suspension path, which is control
/// flow rather than failure — see [`crate::muxer::ProcessOutcome`].
#[derive(Debug, Error)]
pub enum MuxError {
    /// A capacity computation overflowed, or a required buffer could not be
    /// sized (e.g. a rescale result did not fit the target range).
    #[error("allocation failed while sizing an internal buffer")]
    AllocFailed,

    /// Malformed or truncated input was detected mid-mux.
    #[error("bad data: {0}")]
    BadData(String),

    /// A filter rejected a frame it was asked to encode.
    #[error("filter error: {0}")]
    Filter(String),
}

pub type Result<T> = std::result::Result<T, MuxError>;
