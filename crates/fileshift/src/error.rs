//! Error types for the fileshift library

use fileshift_ssh::TransportError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fileshift operations
#[derive(Debug, Error)]
pub enum FileshiftError {
    /// Connecting or authenticating failed
    #[error("Could not establish session: {0}")]
    Authentication(#[source] TransportError),

    /// A remote file operation failed
    #[error("Remote I/O error during {operation}: {source}")]
    RemoteIo {
        /// Operation that failed
        operation: Operation,
        /// Underlying capability error
        #[source]
        source: TransportError,
    },

    /// A local filesystem operation failed during a transfer
    #[error("Local I/O error on {}: {source}", path.display())]
    LocalIo {
        /// Local path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The session has been closed
    #[error("Session is not open")]
    NotOpen,

    /// Invalid connection configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FileshiftError {
    /// Attribute a capability error from `operation` to the remote or local side
    pub(crate) fn from_operation(operation: Operation, err: TransportError) -> Self {
        match err {
            TransportError::LocalIo { path, source } => Self::LocalIo { path, source },
            source => Self::RemoteIo { operation, source },
        }
    }

    /// The capability error behind this error, if any
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Authentication(e) | Self::RemoteIo { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FileshiftError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("JSON error: {}", err))
    }
}

/// Session operations that can fail remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Listing a directory
    ListDirectory,
    /// Changing the working directory
    ChangeDirectory,
    /// Deleting a file
    DeleteFile,
    /// Downloading a file
    DownloadFile,
    /// Uploading a file
    UploadFile,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListDirectory => "list_dir",
            Self::ChangeDirectory => "change_dir",
            Self::DeleteFile => "delete_file",
            Self::DownloadFile => "download_file",
            Self::UploadFile => "upload_file",
        };
        f.write_str(name)
    }
}

/// Which handle failed to close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    /// The SSH transport
    Transport,
    /// The SFTP client
    Client,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// Non-fatal failure while closing a stale handle.
///
/// Produced by reconnect and close; logged at warn level and handed back
/// to the caller instead of being raised.
#[derive(Debug)]
pub struct CleanupWarning {
    /// Handle whose close failed
    pub handle: Handle,
    /// Close error
    pub source: TransportError,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error closing existing {}: {}", self.handle, self.source)
    }
}
