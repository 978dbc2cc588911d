//! SSH/SFTP capability error types

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Classification of a failure reported by the remote SFTP server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The remote path does not exist
    NotFound,
    /// The server refused the operation
    PermissionDenied,
    /// A directory was required but the path is something else
    NotADirectory,
    /// The transferred byte count differs from the file size
    SizeMismatch,
    /// Any other server-side failure
    Failure,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotFound => "no such file",
            Self::PermissionDenied => "permission denied",
            Self::NotADirectory => "not a directory",
            Self::SizeMismatch => "size mismatch",
            Self::Failure => "failure",
        };
        f.write_str(text)
    }
}

/// Transport-specific errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// TCP connection or SSH handshake error
    #[error("SSH connection error: {0}")]
    Connection(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Socket-level I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The SFTP server rejected an operation on a path
    #[error("Remote error on {path}: {kind}: {message}")]
    Remote {
        /// Remote path the operation targeted
        path: String,
        /// Failure classification
        kind: RemoteErrorKind,
        /// Server or library message
        message: String,
    },

    /// Local filesystem error during a transfer
    #[error("Local I/O error on {}: {source}", path.display())]
    LocalIo {
        /// Local path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The handle has already been closed
    #[error("Handle is closed")]
    Closed,
}

impl TransportError {
    /// Build a [`TransportError::Remote`]
    pub fn remote(path: impl Into<String>, kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }

    /// Build a [`TransportError::LocalIo`]
    pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Remote failure classification, if this is a remote error
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the failure originated on the local filesystem
    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalIo { .. })
    }
}

#[cfg(feature = "ssh2")]
mod ssh2_conv {
    use super::{RemoteErrorKind, TransportError};
    use ssh2::ErrorCode;

    // libssh2 constants
    const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
    const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
    const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
    const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;
    const LIBSSH2_FX_PERMISSION_DENIED: i32 = 3;
    const LIBSSH2_FX_NO_SUCH_PATH: i32 = 10;
    const LIBSSH2_FX_NOT_A_DIRECTORY: i32 = 19;

    /// Classify an SFTP status code
    pub(crate) fn remote_kind(code: i32) -> RemoteErrorKind {
        match code {
            LIBSSH2_FX_NO_SUCH_FILE | LIBSSH2_FX_NO_SUCH_PATH => RemoteErrorKind::NotFound,
            LIBSSH2_FX_PERMISSION_DENIED => RemoteErrorKind::PermissionDenied,
            LIBSSH2_FX_NOT_A_DIRECTORY => RemoteErrorKind::NotADirectory,
            _ => RemoteErrorKind::Failure,
        }
    }

    impl TransportError {
        /// Convert an error from an SFTP call on `path`
        pub(crate) fn from_sftp(path: &str, err: ssh2::Error) -> Self {
            match err.code() {
                ErrorCode::SFTP(code) => Self::remote(path, remote_kind(code), err.message()),
                ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => Self::Timeout,
                ErrorCode::Session(_) => Self::Protocol(err.to_string()),
            }
        }

        /// Convert an error from a session-level call
        pub(crate) fn from_session(context: &str, err: ssh2::Error) -> Self {
            match err.code() {
                ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => Self::Timeout,
                ErrorCode::Session(LIBSSH2_ERROR_AUTHENTICATION_FAILED) => {
                    Self::Authentication(format!("{}: {}", context, err.message()))
                }
                ErrorCode::Session(LIBSSH2_ERROR_SOCKET_DISCONNECT) => {
                    Self::Connection(format!("{}: {}", context, err.message()))
                }
                _ => Self::Protocol(format!("{}: {}", context, err)),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_sftp_status_classification() {
            assert_eq!(remote_kind(2), RemoteErrorKind::NotFound);
            assert_eq!(remote_kind(10), RemoteErrorKind::NotFound);
            assert_eq!(remote_kind(3), RemoteErrorKind::PermissionDenied);
            assert_eq!(remote_kind(19), RemoteErrorKind::NotADirectory);
            assert_eq!(remote_kind(4), RemoteErrorKind::Failure);
        }
    }
}
