//! Rookery Error Types
//!
//! Two layers of errors live here. [`ErrorCode`] mirrors the negative
//! integers the server puts in reply envelopes. [`RookeryError`] is the
//! client-side error type every public operation returns; server codes are
//! folded into it as the [`RookeryError::Server`] variant, while connection
//! and session failures get dedicated variants because callers branch on
//! them.

use thiserror::Error;

/// Error codes reported by the server in the reply envelope.
///
/// `Ok` is zero; everything else is negative on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    SystemError,
    RuntimeInconsistency,
    DataInconsistency,
    ConnectionLoss,
    MarshallingError,
    Unimplemented,
    OperationTimeout,
    BadArguments,
    ApiError,
    NoNode,
    NoAuth,
    BadVersion,
    NoChildrenForEphemerals,
    NodeExists,
    NotEmpty,
    SessionExpired,
    InvalidCallback,
    InvalidAcl,
    AuthFailed,
}

impl ErrorCode {
    /// The wire value of this code.
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::SystemError => -1,
            ErrorCode::RuntimeInconsistency => -2,
            ErrorCode::DataInconsistency => -3,
            ErrorCode::ConnectionLoss => -4,
            ErrorCode::MarshallingError => -5,
            ErrorCode::Unimplemented => -6,
            ErrorCode::OperationTimeout => -7,
            ErrorCode::BadArguments => -8,
            ErrorCode::ApiError => -100,
            ErrorCode::NoNode => -101,
            ErrorCode::NoAuth => -102,
            ErrorCode::BadVersion => -103,
            ErrorCode::NoChildrenForEphemerals => -108,
            ErrorCode::NodeExists => -110,
            ErrorCode::NotEmpty => -111,
            ErrorCode::SessionExpired => -112,
            ErrorCode::InvalidCallback => -113,
            ErrorCode::InvalidAcl => -114,
            ErrorCode::AuthFailed => -115,
        }
    }

    /// Decodes a wire value; unknown codes collapse to `SystemError`.
    pub fn from_i32(value: i32) -> ErrorCode {
        match value {
            0 => ErrorCode::Ok,
            -1 => ErrorCode::SystemError,
            -2 => ErrorCode::RuntimeInconsistency,
            -3 => ErrorCode::DataInconsistency,
            -4 => ErrorCode::ConnectionLoss,
            -5 => ErrorCode::MarshallingError,
            -6 => ErrorCode::Unimplemented,
            -7 => ErrorCode::OperationTimeout,
            -8 => ErrorCode::BadArguments,
            -100 => ErrorCode::ApiError,
            -101 => ErrorCode::NoNode,
            -102 => ErrorCode::NoAuth,
            -103 => ErrorCode::BadVersion,
            -108 => ErrorCode::NoChildrenForEphemerals,
            -110 => ErrorCode::NodeExists,
            -111 => ErrorCode::NotEmpty,
            -112 => ErrorCode::SessionExpired,
            -113 => ErrorCode::InvalidCallback,
            -114 => ErrorCode::InvalidAcl,
            -115 => ErrorCode::AuthFailed,
            _ => ErrorCode::SystemError,
        }
    }
}

#[derive(Error, Debug)]
pub enum RookeryError {
    #[error("invalid connect string: {0}")]
    BadConnectString(String),

    #[error("invalid path: {0}")]
    BadPath(String),

    #[error("invalid ACL: the list must not be empty")]
    InvalidAcl,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection lost while the request was in flight")]
    ConnectionLoss,

    #[error("no frame received within the read deadline")]
    OperationTimeout,

    #[error("session expired")]
    SessionExpired,

    #[error("authentication failed")]
    AuthFailed,

    #[error("server error {code:?} for {path:?}")]
    Server {
        code: ErrorCode,
        path: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RookeryError {
    /// Builds a [`RookeryError::Server`] from a wire error code.
    pub fn server(code: ErrorCode, path: Option<String>) -> RookeryError {
        RookeryError::Server { code, path }
    }

    /// Returns the server error code, if this error carries one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RookeryError::Server { code, .. } => Some(*code),
            RookeryError::ConnectionLoss => Some(ErrorCode::ConnectionLoss),
            RookeryError::OperationTimeout => Some(ErrorCode::OperationTimeout),
            RookeryError::SessionExpired => Some(ErrorCode::SessionExpired),
            RookeryError::AuthFailed => Some(ErrorCode::AuthFailed),
            _ => None,
        }
    }

    /// Returns whether this error is transient.
    ///
    /// Retryable errors are connection-level failures: the client recovers
    /// the session silently and the caller may resubmit. Whether a retry is
    /// *safe* is the caller's decision; a create that died with
    /// `ConnectionLoss` may still have been applied by the server.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RookeryError::ConnectionLoss | RookeryError::OperationTimeout | RookeryError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RookeryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_round_trip() {
        for code in [
            ErrorCode::Ok,
            ErrorCode::ConnectionLoss,
            ErrorCode::NoNode,
            ErrorCode::NodeExists,
            ErrorCode::NotEmpty,
            ErrorCode::SessionExpired,
            ErrorCode::InvalidAcl,
            ErrorCode::AuthFailed,
        ] {
            assert_eq!(ErrorCode::from_i32(code.as_i32()), code);
        }
    }

    #[test]
    fn test_unknown_code_collapses_to_system_error() {
        assert_eq!(ErrorCode::from_i32(-9999), ErrorCode::SystemError);
        assert_eq!(ErrorCode::from_i32(42), ErrorCode::SystemError);
    }

    #[test]
    fn test_is_retryable() {
        assert!(RookeryError::ConnectionLoss.is_retryable());
        assert!(RookeryError::OperationTimeout.is_retryable());

        assert!(!RookeryError::SessionExpired.is_retryable());
        assert!(!RookeryError::AuthFailed.is_retryable());
        assert!(!RookeryError::InvalidAcl.is_retryable());
        assert!(!RookeryError::server(ErrorCode::NoNode, Some("/a".into())).is_retryable());
    }

    #[test]
    fn test_server_error_exposes_code() {
        let err = RookeryError::server(ErrorCode::NodeExists, Some("/dup".into()));
        assert_eq!(err.code(), Some(ErrorCode::NodeExists));
        assert_eq!(RookeryError::SessionExpired.code(), Some(ErrorCode::SessionExpired));
        assert_eq!(RookeryError::InvalidAcl.code(), None);
    }
}
