//! `EngineError`: composes every lower-layer error type into the taxonomy
//! the host sees on the `Error` event (message, fatal flag, recovery hint).

use marmot_client::TransportError;
use marmot_core::{IdentityError, MlsError};
use thiserror::Error;

/// Coarse error classification, independent of which crate raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Out-of-order MLS wrapper, missing pending proposal. Retry after
    /// epoch advance.
    TransientMls,
    /// Reset stream, track not found, connection churn. Retry with backoff.
    TransientTransport,
    /// Invalid signature, removed from group. Not recoverable in place.
    FatalCrypto,
    /// Malformed URL or secret, rejected at construction.
    FatalConfig,
    /// Bootstrap did not complete within the configured timeout.
    HandshakeTimeout,
}

/// What the host should do in response to an `Error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryHint {
    /// Retry the same operation; the condition is expected to clear itself.
    Retry,
    /// The session is unrecoverable; the host must re-initialize it.
    Refresh,
    /// Likely a connectivity problem outside the engine's control.
    CheckConnection,
    /// No action needed; informational.
    None,
}

/// The engine's top-level error type: every lower-layer error composed via
/// `#[from]`, exposing exactly the taxonomy in the engine's design notes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// An MLS group operation failed.
    #[error(transparent)]
    Mls(#[from] MlsError),

    /// Identity key handling failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The transport bridge reported an error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The bootstrap handshake did not complete in time.
    #[error("bootstrap handshake timed out")]
    HandshakeTimeout,

    /// A session configuration value was invalid.
    #[error("invalid session configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Coarse classification for logging and for callers that branch on it.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Mls(err) if err.is_transient() => ErrorKind::TransientMls,
            Self::Mls(_) | Self::Identity(_) => ErrorKind::FatalCrypto,
            Self::Transport(err) if err.is_transient() => ErrorKind::TransientTransport,
            Self::Transport(_) => ErrorKind::FatalCrypto,
            Self::HandshakeTimeout => ErrorKind::HandshakeTimeout,
            Self::Config(_) => ErrorKind::FatalConfig,
        }
    }

    /// Whether this error leaves the engine in a stopped state requiring
    /// `Shutdown` and re-initialization, as opposed to one the engine
    /// recovers from locally.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::TransientMls | ErrorKind::TransientTransport)
    }

    /// What the host should do about this error.
    #[must_use]
    pub fn recovery(&self) -> RecoveryHint {
        match self.kind() {
            ErrorKind::TransientMls => RecoveryHint::Retry,
            ErrorKind::TransientTransport => RecoveryHint::CheckConnection,
            ErrorKind::FatalCrypto | ErrorKind::FatalConfig => RecoveryHint::Refresh,
            ErrorKind::HandshakeTimeout => RecoveryHint::Retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_mls_error_recommends_retry_and_is_not_fatal() {
        let err = EngineError::Mls(MlsError::Unprocessable {
            reason: "future epoch".to_string(),
            transient: true,
        });
        assert_eq!(err.kind(), ErrorKind::TransientMls);
        assert!(!err.is_fatal());
        assert_eq!(err.recovery(), RecoveryHint::Retry);
    }

    #[test]
    fn removed_from_group_is_fatal_crypto() {
        let err = EngineError::Mls(MlsError::RemovedFromGroup("booted".to_string()));
        assert_eq!(err.kind(), ErrorKind::FatalCrypto);
        assert!(err.is_fatal());
        assert_eq!(err.recovery(), RecoveryHint::Refresh);
    }

    #[test]
    fn handshake_timeout_is_fatal_with_retry_hint() {
        let err = EngineError::HandshakeTimeout;
        assert!(err.is_fatal());
        assert_eq!(err.recovery(), RecoveryHint::Retry);
    }
}
