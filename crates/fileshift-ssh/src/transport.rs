//! Transport abstraction and implementations

use crate::{FileClient, TransportError};
use std::time::Duration;

/// Opens transports to a remote host
pub trait Connector {
    /// Transport produced by this connector
    type Transport: Transport;

    /// Open an unauthenticated transport to `host:port`
    fn open(&self, host: &str, port: u16) -> Result<Self::Transport, TransportError>;
}

/// An encrypted connection to a remote host
pub trait Transport {
    /// File-operation client derived from this transport
    type Client: FileClient;

    /// Authenticate as `username`. `None` attempts authentication without a password.
    fn authenticate(&mut self, username: &str, password: Option<&str>) -> Result<(), TransportError>;

    /// Whether the transport reports itself active
    fn is_active(&self) -> bool;

    /// Derive a file-operation client bound to this transport
    fn open_client(&mut self) -> Result<Self::Client, TransportError>;

    /// Get connection information
    fn connection_info(&self) -> ConnectionInfo;

    /// Close the transport. Closing twice is not an error.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Connection information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Remote hostname or IP
    pub host: String,
    /// Remote port
    pub port: u16,
    /// Authenticated user, once authentication succeeded
    pub username: Option<String>,
    /// Connection type
    pub transport_type: TransportType,
}

/// Transport type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// SSH with libssh2
    SshLibssh2,
    /// In-memory server (for testing)
    Memory,
}

/// Tuning for the libssh2 backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ssh2Options {
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Timeout for each blocking libssh2 call; zero disables it
    pub io_timeout: Duration,
    /// Keepalive interval used by the liveness probe.
    ///
    /// libssh2 sends at most one keepalive per interval, so a dead peer can
    /// still report active for up to this long. Must be at least one second.
    pub keepalive_interval: Duration,
}

impl Default for Ssh2Options {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(300),
            keepalive_interval: Duration::from_secs(60),
        }
    }
}

#[cfg(feature = "ssh2")]
pub use self::libssh2::{Ssh2Connector, Ssh2Transport};

#[cfg(feature = "ssh2")]
mod libssh2 {
    use super::{ConnectionInfo, Connector, Ssh2Options, Transport, TransportType};
    use crate::{Ssh2Client, TransportError};
    use ssh2::Session;
    use std::net::{TcpStream, ToSocketAddrs};
    use tracing::{debug, info};

    /// Connector backed by libssh2 over a blocking TCP socket
    #[derive(Debug, Clone, Default)]
    pub struct Ssh2Connector {
        options: Ssh2Options,
    }

    impl Ssh2Connector {
        /// Create a connector with the given options
        pub fn new(options: Ssh2Options) -> Self {
            Self { options }
        }

        /// Backend options
        pub fn options(&self) -> &Ssh2Options {
            &self.options
        }

        fn connect_tcp(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
            let addrs = (host, port)
                .to_socket_addrs()
                .map_err(|e| TransportError::Connection(format!("Failed to resolve {}:{}: {}", host, port, e)))?;

            let mut last_error = None;
            for addr in addrs {
                debug!("Trying {}", addr);
                match TcpStream::connect_timeout(&addr, self.options.connect_timeout) {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last_error = Some(e),
                }
            }

            Err(match last_error {
                Some(e) if e.kind() == std::io::ErrorKind::TimedOut => TransportError::Timeout,
                Some(e) => TransportError::Connection(format!("TCP connection to {}:{} failed: {}", host, port, e)),
                None => TransportError::Connection(format!("No addresses found for {}:{}", host, port)),
            })
        }
    }

    impl Connector for Ssh2Connector {
        type Transport = Ssh2Transport;

        fn open(&self, host: &str, port: u16) -> Result<Ssh2Transport, TransportError> {
            let keepalive = self.options.keepalive_interval.as_secs();
            if keepalive == 0 {
                return Err(TransportError::Connection(
                    "keepalive_interval must be at least one second".to_string(),
                ));
            }

            info!("Connecting to {}:{}", host, port);

            let tcp = self.connect_tcp(host, port)?;

            let mut session = Session::new()
                .map_err(|e| TransportError::Connection(format!("Failed to create SSH session: {}", e)))?;
            session.set_tcp_stream(tcp);
            session.set_timeout(millis(self.options.io_timeout));
            session
                .handshake()
                .map_err(|e| TransportError::from_session("SSH handshake failed", e))?;

            session.set_keepalive(true, u32::try_from(keepalive).unwrap_or(u32::MAX));

            debug!("SSH handshake with {}:{} completed", host, port);
            Ok(Ssh2Transport {
                session,
                info: ConnectionInfo {
                    host: host.to_string(),
                    port,
                    username: None,
                    transport_type: TransportType::SshLibssh2,
                },
                closed: false,
            })
        }
    }

    fn millis(duration: std::time::Duration) -> u32 {
        u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
    }

    /// libssh2 session over TCP
    pub struct Ssh2Transport {
        session: Session,
        info: ConnectionInfo,
        closed: bool,
    }

    impl std::fmt::Debug for Ssh2Transport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Ssh2Transport")
                .field("info", &self.info)
                .field("closed", &self.closed)
                .finish()
        }
    }

    impl Transport for Ssh2Transport {
        type Client = Ssh2Client;

        fn authenticate(&mut self, username: &str, password: Option<&str>) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Closed);
            }

            match password {
                Some(password) => {
                    debug!("Authenticating {} with password", username);
                    self.session
                        .userauth_password(username, password)
                        .map_err(|e| match TransportError::from_session("Password authentication failed", e) {
                            TransportError::Protocol(msg) => TransportError::Authentication(msg),
                            other => other,
                        })?;
                }
                None => {
                    // Listing methods sends a "none" request, which some servers accept.
                    let methods = self
                        .session
                        .auth_methods(username)
                        .map_err(|e| TransportError::from_session("Failed to query authentication methods", e))?
                        .to_string();
                    if !self.session.authenticated() {
                        return Err(TransportError::Authentication(format!(
                            "Server requires authentication for {} (offered: {})",
                            username, methods
                        )));
                    }
                }
            }

            if !self.session.authenticated() {
                return Err(TransportError::Authentication(format!(
                    "Server did not accept credentials for {}",
                    username
                )));
            }

            self.info.username = Some(username.to_string());
            Ok(())
        }

        /// Sends a keepalive when one is due. Between keepalives a dead peer
        /// goes unnoticed, for at most `keepalive_interval`.
        fn is_active(&self) -> bool {
            if self.closed || !self.session.authenticated() {
                return false;
            }
            match self.session.keepalive_send() {
                Ok(_) => true,
                Err(e) => {
                    debug!("Keepalive failed: {}", e);
                    false
                }
            }
        }

        fn open_client(&mut self) -> Result<Ssh2Client, TransportError> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            let sftp = self
                .session
                .sftp()
                .map_err(|e| TransportError::from_session("Failed to open SFTP channel", e))?;
            Ok(Ssh2Client::new(sftp))
        }

        fn connection_info(&self) -> ConnectionInfo {
            self.info.clone()
        }

        fn close(&mut self) -> Result<(), TransportError> {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            debug!("Disconnecting from {}:{}", self.info.host, self.info.port);
            self.session
                .disconnect(None, "closing session", None)
                .map_err(|e| TransportError::from_session("Disconnect failed", e))
        }
    }

}
