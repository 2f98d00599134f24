//! Wire-level error types.

use thiserror::Error;

/// Errors raised while encoding or decoding wire types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A media frame was shorter than the minimum `frame_counter` prefix.
    #[error("media frame truncated: expected at least {expected} bytes, got {actual}")]
    FrameTruncated {
        /// Minimum bytes required.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// JSON envelope body did not match the declared `type`.
    #[error("envelope body mismatch for type {type_name}")]
    EnvelopeBodyMismatch {
        /// The declared envelope type.
        type_name: &'static str,
    },

    /// CBOR encode/decode failure.
    #[error("cbor error: {0}")]
    Cbor(String),

    /// JSON encode/decode failure.
    #[error("json error: {0}")]
    Json(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, ProtocolError>;
