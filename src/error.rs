/// Failure taxonomy for the detection pipeline.
///
/// None of these ever change detector state on their own: parse and decode
/// failures leave the cycle where it was, alert failures never block the
/// reset that follows a detection.
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectError {
    /// Marker, quotes, or hex fields of a warning segment are malformed.
    #[error("malformed warning segment: {0}")]
    Parse(&'static str),

    /// Declared fragment count needs more payload than the line carries.
    #[error("warning segment truncated: {pages} pages need {needed} hex chars, have {have}")]
    TruncatedMessage {
        pages: usize,
        needed: usize,
        have: usize,
    },

    /// Decoder could not be run, timed out, or produced nothing.
    #[error("fragment decoder unavailable: {0}")]
    DecodeUnavailable(String),

    /// Operator notification channel failed.
    #[error("alert dispatch failed: {0}")]
    AlertDispatch(String),
}
