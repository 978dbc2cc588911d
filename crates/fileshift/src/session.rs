//! Session management and connection handling

use crate::error::{CleanupWarning, Handle, Operation};
use crate::{ConnectionConfig, FileshiftError, Result};
use fileshift_ssh::{ConnectionInfo, Connector, FileClient, Transport};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use tracing::{debug, dispatcher, info, info_span, warn, Dispatch, Span};
use uuid::Uuid;

#[cfg(feature = "ssh2")]
use fileshift_ssh::Ssh2Connector;

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport and client are live
    Open,
    /// Handles have been released
    Closed,
}

/// Result of a successful reconnect
#[derive(Debug, Default)]
pub struct ReconnectOutcome {
    /// Failures while closing the previous handles
    pub cleanup_warnings: Vec<CleanupWarning>,
}

impl ReconnectOutcome {
    /// Whether the previous handles closed without error
    pub fn is_clean(&self) -> bool {
        self.cleanup_warnings.is_empty()
    }
}

/// Transport and the client derived from it, created and released together
struct Link<T: Transport> {
    transport: T,
    client: T::Client,
}

impl<T: Transport> Link<T> {
    fn release(mut self) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();

        if let Err(source) = self.client.close() {
            warnings.push(CleanupWarning {
                handle: Handle::Client,
                source,
            });
        }
        if let Err(source) = self.transport.close() {
            warnings.push(CleanupWarning {
                handle: Handle::Transport,
                source,
            });
        }

        warnings
    }
}

/// Session builder for configuring connections
pub struct SessionBuilder {
    host: String,
    port: u16,
    username: String,
    password: Option<SecretString>,
    logger: Option<Dispatch>,
}

impl SessionBuilder {
    /// Create a new session builder
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: crate::config::DEFAULT_PORT,
            username: username.into(),
            password: None,
            logger: None,
        }
    }

    /// Set the remote port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Authenticate with a password
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(SecretString::from(password));
        self
    }

    /// Send this session's log events to `logger` instead of the current default
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build and validate the connection configuration
    pub fn build_config(&self) -> Result<ConnectionConfig> {
        let config = ConnectionConfig::new(
            self.host.clone(),
            self.port,
            self.username.clone(),
            self.password.as_ref().map(|p| p.expose_secret()),
        );
        config.validate()?;
        Ok(config)
    }

    /// Connect through `connector` and authenticate
    pub fn connect_with<C: Connector>(self, connector: C) -> Result<Session<C>> {
        let config = self.build_config()?;
        Session::establish(config, connector, self.logger)
    }

    /// Connect over SSH with default backend options and authenticate
    #[cfg(feature = "ssh2")]
    pub fn connect(self) -> Result<Session<Ssh2Connector>> {
        self.connect_with(Ssh2Connector::default())
    }
}

/// One authenticated SFTP connection.
///
/// Every operation is synchronous and goes straight to the live handles.
/// The handles are released by [`Session::close`] or when the session is
/// dropped; close failures at that point are logged, never raised.
pub struct Session<C: Connector> {
    id: Uuid,
    config: ConnectionConfig,
    connector: C,
    link: Option<Link<C::Transport>>,
    logger: Dispatch,
    span: Span,
}

#[cfg(feature = "ssh2")]
impl Session<Ssh2Connector> {
    /// Create a new SSH session builder
    pub fn builder(host: impl Into<String>, username: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(host, username)
    }

    /// Connect to `host:port` and authenticate with `password`
    pub fn open(host: &str, username: &str, password: Option<&str>, port: u16) -> Result<Self> {
        let config = ConnectionConfig::new(host, port, username, password);
        Self::connect(config, Ssh2Connector::default())
    }
}

impl<C: Connector> Session<C> {
    /// Connect with `config` through `connector` and authenticate.
    ///
    /// Fails with [`FileshiftError::Authentication`] if the host cannot be
    /// reached or the credentials are rejected; no session is returned.
    pub fn connect(config: ConnectionConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Self::establish(config, connector, None)
    }

    fn establish(config: ConnectionConfig, connector: C, logger: Option<Dispatch>) -> Result<Self> {
        let logger = logger.unwrap_or_else(|| dispatcher::get_default(Dispatch::clone));
        let id = Uuid::new_v4();
        let span = dispatcher::with_default(&logger, || {
            info_span!(
                "fileshift_session",
                %id,
                host = %config.host(),
                port = config.port(),
                username = %config.username()
            )
        });

        let mut session = Self {
            id,
            config,
            connector,
            link: None,
            logger,
            span,
        };

        let link = session.observe(Self::authenticate)?;
        session.link = Some(link);
        Ok(session)
    }

    /// Run `f` with this session's logger and span active
    fn observe<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        dispatcher::with_default(&self.logger, || self.span.in_scope(|| f(self)))
    }

    fn observe_mut<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let logger = self.logger.clone();
        let span = self.span.clone();
        dispatcher::with_default(&logger, || span.in_scope(|| f(self)))
    }

    /// Open a transport, authenticate, and derive a client from it
    fn authenticate(&self) -> Result<Link<C::Transport>> {
        info!("Establishing a new SFTP session with the remote server");

        let mut transport = self
            .connector
            .open(self.config.host(), self.config.port())
            .map_err(FileshiftError::Authentication)?;

        if let Err(e) = transport.authenticate(self.config.username(), self.config.password()) {
            Self::discard(&mut transport);
            return Err(FileshiftError::Authentication(e));
        }

        let client = match transport.open_client() {
            Ok(client) => client,
            Err(e) => {
                Self::discard(&mut transport);
                return Err(FileshiftError::Authentication(e));
            }
        };

        info!("SFTP session established");
        Ok(Link { transport, client })
    }

    fn discard(transport: &mut C::Transport) {
        if let Err(e) = transport.close() {
            debug!("Error closing failed transport: {}", e);
        }
    }

    /// Take the handles out of the session and close them, logging failures
    fn release(&mut self) -> Vec<CleanupWarning> {
        let Some(link) = self.link.take() else {
            return Vec::new();
        };

        let warnings = link.release();
        for warning in &warnings {
            warn!(handle = %warning.handle, "Error closing existing connection: {}", warning.source);
        }
        warnings
    }

    fn link_mut(&mut self) -> Result<&mut Link<C::Transport>> {
        self.link.as_mut().ok_or(FileshiftError::NotOpen)
    }

    /// Close the current handles and authenticate again.
    ///
    /// Failures closing the old handles are logged and returned in the
    /// outcome; only a failure to re-authenticate is an error. Works on a
    /// closed session as well.
    pub fn reconnect(&mut self) -> Result<ReconnectOutcome> {
        self.observe_mut(|session| -> Result<ReconnectOutcome> {
            info!("Establishing a secure connection and authenticating with the SFTP server");

            let cleanup_warnings = session.release();
            let link = session.authenticate()?;
            session.link = Some(link);

            Ok(ReconnectOutcome { cleanup_warnings })
        })
    }

    /// Whether the transport reports itself active.
    ///
    /// Liveness comes from the backend's keepalive probe, so a peer that
    /// vanished may still be reported connected until the next keepalive is
    /// due (see [`fileshift_ssh::Ssh2Options::keepalive_interval`]).
    pub fn is_connected(&self) -> bool {
        self.observe(|session| {
            info!("Checking if the SFTP connection is currently active");
            session
                .link
                .as_ref()
                .is_some_and(|link| link.transport.is_active())
        })
    }

    /// Names of the entries in a remote directory; `"."` lists the current one.
    ///
    /// Order is whatever the server returns.
    pub fn list_dir(&mut self, path: &str) -> Result<Vec<String>> {
        self.observe_mut(|session| {
            info!(path, "Listing the contents of a remote directory");
            session
                .link_mut()?
                .client
                .list_dir(path)
                .map_err(|e| FileshiftError::from_operation(Operation::ListDirectory, e))
        })
    }

    /// Change the remote working directory used for relative paths
    pub fn change_dir(&mut self, path: &str) -> Result<()> {
        self.observe_mut(|session| {
            info!(path, "Changing the remote working directory");
            session
                .link_mut()?
                .client
                .change_dir(path)
                .map_err(|e| FileshiftError::from_operation(Operation::ChangeDirectory, e))
        })
    }

    /// Delete one remote file
    pub fn delete_file(&mut self, filename: &str) -> Result<()> {
        self.observe_mut(|session| {
            info!(filename, "Deleting a remote file");
            session
                .link_mut()?
                .client
                .remove(filename)
                .map_err(|e| FileshiftError::from_operation(Operation::DeleteFile, e))
        })
    }

    /// Download a remote file, overwriting `local_path`. Returns the bytes written.
    ///
    /// A failed download may leave a partial local file.
    pub fn download_file(&mut self, remote_path: &str, local_path: impl AsRef<Path>) -> Result<u64> {
        let local_path = local_path.as_ref();
        self.observe_mut(|session| -> Result<u64> {
            info!(remote_path, local_path = %local_path.display(), "Downloading a remote file");
            let bytes = session
                .link_mut()?
                .client
                .get(remote_path, local_path)
                .map_err(|e| FileshiftError::from_operation(Operation::DownloadFile, e))?;
            debug!(bytes, "Download complete");
            Ok(bytes)
        })
    }

    /// Upload a local file, overwriting `remote_path`. Returns the bytes sent.
    pub fn upload_file(&mut self, local_path: impl AsRef<Path>, remote_path: &str) -> Result<u64> {
        let local_path = local_path.as_ref();
        self.observe_mut(|session| -> Result<u64> {
            info!(local_path = %local_path.display(), remote_path, "Uploading a local file");
            let bytes = session
                .link_mut()?
                .client
                .put(local_path, remote_path)
                .map_err(|e| FileshiftError::from_operation(Operation::UploadFile, e))?;
            debug!(bytes, "Upload complete");
            Ok(bytes)
        })
    }

    /// Release both handles. Safe to call more than once.
    pub fn close(&mut self) -> Vec<CleanupWarning> {
        self.observe_mut(|session| {
            if session.link.is_some() {
                info!("Closing the SFTP session");
            }
            session.release()
        })
    }

    /// Session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get session state
    pub fn state(&self) -> SessionState {
        if self.link.is_some() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    /// Get connection information
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.link.as_ref().map(|link| link.transport.connection_info())
    }

    /// Remote working directory set by [`Session::change_dir`]
    pub fn current_dir(&self) -> Option<&str> {
        self.link.as_ref().and_then(|link| link.client.current_dir())
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        if self.link.is_some() {
            self.close();
        }
    }
}

impl<C: Connector> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
