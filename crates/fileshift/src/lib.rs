//! # fileshift
//!
//! A small SFTP session manager: connect and authenticate once, then list,
//! navigate, upload, download and delete remote files over that session,
//! with liveness checks and single-shot reconnection.
//!
//! Protocol work is delegated to the capabilities in [`fileshift_ssh`].

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use fileshift_ssh as ssh;

/// Error types for the fileshift library
pub mod error;

/// Connection configuration
pub mod config;

/// Session management and connection handling
pub mod session;

pub use error::{CleanupWarning, FileshiftError, Handle, Operation};
pub use config::ConnectionConfig;
pub use session::{ReconnectOutcome, Session, SessionBuilder, SessionState};

/// Result type alias for fileshift operations
pub type Result<T> = std::result::Result<T, FileshiftError>;
