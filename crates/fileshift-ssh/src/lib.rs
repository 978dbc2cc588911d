//! # fileshift SSH transport
//!
//! Capability traits for opening an SSH transport and issuing SFTP file
//! operations over it, with a libssh2 backend and an in-memory backend.

#![warn(missing_docs)]

/// Transport abstraction and implementations
pub mod transport;

/// File-operation client abstraction and implementations
pub mod client;

/// Remote path resolution
pub mod path;

/// In-memory server for tests
pub mod mock;

/// SSH-specific error types
pub mod error;

pub use transport::{Connector, Transport, ConnectionInfo, TransportType, Ssh2Options};
#[cfg(feature = "ssh2")]
pub use transport::{Ssh2Connector, Ssh2Transport};
pub use client::FileClient;
#[cfg(feature = "ssh2")]
pub use client::Ssh2Client;
pub use mock::{MockServer, MockConnector, MockTransport, MockClient};
pub use error::{TransportError, RemoteErrorKind};
