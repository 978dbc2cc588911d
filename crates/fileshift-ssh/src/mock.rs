//! In-memory SFTP server for exercising code that drives the capability traits.
//!
//! A [`MockServer`] holds a small remote filesystem, a user table and a set of
//! fault switches. Clones share state, so a test keeps one handle to inspect
//! and perturb the server while a session drives it through [`MockConnector`].

use crate::path;
use crate::{ConnectionInfo, Connector, FileClient, RemoteErrorKind, Transport, TransportError, TransportType};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct ServerState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    users: HashMap<String, Option<String>>,
    home: String,
    reachable: bool,
    fail_transport_close: bool,
    fail_client_close: bool,
    fail_open_client: bool,
    generation: u64,
    next_transport_id: u64,
    open_transports: BTreeSet<u64>,
    connects: u64,
    closes: u64,
    requests: Vec<String>,
}

impl ServerState {
    fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    fn mkdir_all(&mut self, path: &str) {
        let mut current = String::new();
        self.dirs.insert("/".to_string());
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            self.dirs.insert(current.clone());
        }
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let is_child = |p: &&String| p.as_str() != "/" && path::parent(p) == dir;
        self.dirs
            .iter()
            .filter(is_child)
            .chain(self.files.keys().filter(is_child))
            .map(|p| path::file_name(p).to_string())
            .collect()
    }
}

/// Shared handle to an in-memory SFTP server
#[derive(Debug, Clone)]
pub struct MockServer {
    host: String,
    port: u16,
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    /// Create a reachable, empty server listening on `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let mut state = ServerState {
            home: "/".to_string(),
            reachable: true,
            ..Default::default()
        };
        state.dirs.insert("/".to_string());

        Self {
            host: host.into(),
            port,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept `username`; `None` means no password is required
    pub fn with_user(self, username: &str, password: Option<&str>) -> Self {
        self.state()
            .users
            .insert(username.to_string(), password.map(str::to_string));
        self
    }

    /// Create a directory and its parents
    pub fn with_dir(self, dir: &str) -> Self {
        self.state().mkdir_all(&path::normalize(dir));
        self
    }

    /// Create a file, creating parent directories as needed
    pub fn with_file(self, file: &str, contents: impl Into<Vec<u8>>) -> Self {
        let file = path::normalize(file);
        {
            let mut state = self.state();
            state.mkdir_all(path::parent(&file));
            state.files.insert(file, contents.into());
        }
        self
    }

    /// Directory new clients start in
    pub fn with_home(self, home: &str) -> Self {
        let home = path::normalize(home);
        {
            let mut state = self.state();
            state.mkdir_all(&home);
            state.home = home;
        }
        self
    }

    /// Connector that opens transports to this server
    pub fn connector(&self) -> MockConnector {
        MockConnector { server: self.clone() }
    }

    /// Refuse or accept new connections
    pub fn set_reachable(&self, reachable: bool) {
        self.state().reachable = reachable;
    }

    /// Make every transport close report a failure
    pub fn set_fail_transport_close(&self, fail: bool) {
        self.state().fail_transport_close = fail;
    }

    /// Make every client close report a failure
    pub fn set_fail_client_close(&self, fail: bool) {
        self.state().fail_client_close = fail;
    }

    /// Make every client open fail after authentication succeeded
    pub fn set_fail_open_client(&self, fail: bool) {
        self.state().fail_open_client = fail;
    }

    /// Sever every existing connection, as a network outage would
    pub fn drop_connections(&self) {
        let mut state = self.state();
        state.generation += 1;
        state.open_transports.clear();
    }

    /// Contents of a remote file
    pub fn file(&self, file: &str) -> Option<Vec<u8>> {
        self.state().files.get(&path::normalize(file)).cloned()
    }

    /// Whether a remote directory exists
    pub fn has_dir(&self, dir: &str) -> bool {
        self.state().is_dir(&path::normalize(dir))
    }

    /// Transports opened and not yet closed
    pub fn open_transports(&self) -> usize {
        self.state().open_transports.len()
    }

    /// Total transports ever opened
    pub fn connects(&self) -> u64 {
        self.state().connects
    }

    /// Total transports closed through [`Transport::close`]
    pub fn closes(&self) -> u64 {
        self.state().closes
    }

    /// Paths received by clients, as sent on the wire
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }
}

/// Connector for a [`MockServer`]
#[derive(Debug, Clone)]
pub struct MockConnector {
    server: MockServer,
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn open(&self, host: &str, port: u16) -> Result<MockTransport, TransportError> {
        if host != self.server.host || port != self.server.port {
            return Err(TransportError::Connection(format!("No route to {}:{}", host, port)));
        }

        let mut state = self.server.state();
        if !state.reachable {
            return Err(TransportError::Connection(format!(
                "Connection to {}:{} refused",
                host, port
            )));
        }

        let id = state.next_transport_id;
        state.next_transport_id += 1;
        state.connects += 1;
        state.open_transports.insert(id);
        debug!("Mock transport {} opened", id);

        Ok(MockTransport {
            server: self.server.clone(),
            id,
            generation: state.generation,
            username: None,
            closed: false,
        })
    }
}

/// Transport to a [`MockServer`]
#[derive(Debug)]
pub struct MockTransport {
    server: MockServer,
    id: u64,
    generation: u64,
    username: Option<String>,
    closed: bool,
}

impl MockTransport {
    fn severed(&self) -> bool {
        self.server.state().generation != self.generation
    }
}

impl Transport for MockTransport {
    type Client = MockClient;

    fn authenticate(&mut self, username: &str, password: Option<&str>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.severed() {
            return Err(TransportError::Connection("Connection reset by peer".to_string()));
        }

        let state = self.server.state();
        let accepted = match state.users.get(username) {
            Some(None) => true,
            Some(Some(expected)) => password == Some(expected.as_str()),
            None => false,
        };
        if !accepted {
            return Err(TransportError::Authentication(format!(
                "Invalid credentials for {}",
                username
            )));
        }
        drop(state);

        self.username = Some(username.to_string());
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.closed && self.username.is_some() && !self.severed()
    }

    fn open_client(&mut self) -> Result<MockClient, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.username.is_none() {
            return Err(TransportError::Authentication("Not authenticated".to_string()));
        }
        if self.severed() {
            return Err(TransportError::Connection("Connection reset by peer".to_string()));
        }
        if self.server.state().fail_open_client {
            return Err(TransportError::Protocol("Failed to open SFTP channel".to_string()));
        }

        Ok(MockClient {
            server: self.server.clone(),
            generation: self.generation,
            cwd: None,
            closed: false,
        })
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            host: self.server.host.clone(),
            port: self.server.port,
            username: self.username.clone(),
            transport_type: TransportType::Memory,
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut state = self.server.state();
        state.open_transports.remove(&self.id);
        state.closes += 1;
        debug!("Mock transport {} closed", self.id);
        if state.fail_transport_close {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "socket already shut down",
            )));
        }
        Ok(())
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if !self.closed {
            self.server.state().open_transports.remove(&self.id);
        }
    }
}

/// File client of a [`MockTransport`]
#[derive(Debug)]
pub struct MockClient {
    server: MockServer,
    generation: u64,
    cwd: Option<String>,
    closed: bool,
}

impl MockClient {
    /// Lock server state after checking that this client is usable
    fn live_state(&self) -> Result<MutexGuard<'_, ServerState>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let state = self.server.state();
        if state.generation != self.generation {
            return Err(TransportError::Connection("Connection reset by peer".to_string()));
        }
        Ok(state)
    }

    /// Record the wire path for `target`, then canonicalise it server-side
    fn resolve(&self, state: &mut ServerState, target: &str) -> String {
        let wire = path::resolve(self.cwd.as_deref(), target);
        let canonical = path::normalize(&path::resolve(Some(state.home.as_str()), &wire));
        state.requests.push(wire);
        canonical
    }
}

fn not_found(target: &str) -> TransportError {
    TransportError::remote(target, RemoteErrorKind::NotFound, "No such file")
}

impl FileClient for MockClient {
    fn list_dir(&mut self, target: &str) -> Result<Vec<String>, TransportError> {
        let mut state = self.live_state()?;
        let resolved = self.resolve(&mut state, target);

        if state.files.contains_key(&resolved) {
            return Err(TransportError::remote(resolved, RemoteErrorKind::NotADirectory, "Not a directory"));
        }
        if !state.is_dir(&resolved) {
            return Err(not_found(&resolved));
        }
        Ok(state.children(&resolved))
    }

    fn change_dir(&mut self, target: &str) -> Result<(), TransportError> {
        let resolved = {
            let mut state = self.live_state()?;
            let resolved = self.resolve(&mut state, target);
            if state.files.contains_key(&resolved) {
                return Err(TransportError::remote(resolved, RemoteErrorKind::NotADirectory, "not a directory"));
            }
            if !state.is_dir(&resolved) {
                return Err(not_found(&resolved));
            }
            resolved
        };
        self.cwd = Some(resolved);
        Ok(())
    }

    fn remove(&mut self, target: &str) -> Result<(), TransportError> {
        let mut state = self.live_state()?;
        let resolved = self.resolve(&mut state, target);

        if state.is_dir(&resolved) {
            return Err(TransportError::remote(resolved, RemoteErrorKind::Failure, "Is a directory"));
        }
        match state.files.remove(&resolved) {
            Some(_) => Ok(()),
            None => Err(not_found(&resolved)),
        }
    }

    fn get(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, TransportError> {
        let data = {
            let mut state = self.live_state()?;
            let resolved = self.resolve(&mut state, remote_path);
            state.files.get(&resolved).cloned().ok_or_else(|| not_found(&resolved))?
        };

        fs::write(local_path, &data).map_err(|e| TransportError::local_io(local_path, e))?;
        Ok(data.len() as u64)
    }

    fn put(&mut self, local_path: &Path, remote_path: &str) -> Result<u64, TransportError> {
        let data = fs::read(local_path).map_err(|e| TransportError::local_io(local_path, e))?;

        let mut state = self.live_state()?;
        let resolved = self.resolve(&mut state, remote_path);
        if state.is_dir(&resolved) {
            return Err(TransportError::remote(resolved, RemoteErrorKind::Failure, "Is a directory"));
        }
        if !state.is_dir(path::parent(&resolved)) {
            return Err(not_found(&resolved));
        }

        let len = data.len() as u64;
        state.files.insert(resolved, data);
        Ok(len)
    }

    fn current_dir(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.server.state().fail_client_close {
            return Err(TransportError::Protocol("SFTP channel close failed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> MockServer {
        MockServer::new("sftp.test", 22)
            .with_user("alice", Some("secret"))
            .with_file("/a/b/x.txt", "x")
            .with_file("/a/b/y.txt", "y")
            .with_dir("/a/b/sub")
    }

    fn open(server: &MockServer) -> (MockTransport, MockClient) {
        let mut transport = server.connector().open("sftp.test", 22).unwrap();
        transport.authenticate("alice", Some("secret")).unwrap();
        let client = transport.open_client().unwrap();
        (transport, client)
    }

    #[test]
    fn test_open_checks_address_and_reachability() {
        let server = server();
        assert!(matches!(
            server.connector().open("other.test", 22),
            Err(TransportError::Connection(_))
        ));

        server.set_reachable(false);
        assert!(matches!(
            server.connector().open("sftp.test", 22),
            Err(TransportError::Connection(_))
        ));
    }

    #[test]
    fn test_authentication() {
        let server = server().with_user("guest", None);
        let connector = server.connector();

        let mut transport = connector.open("sftp.test", 22).unwrap();
        assert!(matches!(
            transport.authenticate("alice", Some("wrong")),
            Err(TransportError::Authentication(_))
        ));
        assert!(matches!(
            transport.authenticate("alice", None),
            Err(TransportError::Authentication(_))
        ));
        assert!(!transport.is_active());
        assert!(transport.open_client().is_err());

        let mut guest = connector.open("sftp.test", 22).unwrap();
        guest.authenticate("guest", None).unwrap();
        assert!(guest.is_active());
        assert_eq!(guest.connection_info().username.as_deref(), Some("guest"));
    }

    #[test]
    fn test_listing_and_cwd() {
        let server = server();
        let (_transport, mut client) = open(&server);

        let mut names = client.list_dir("/a/b").unwrap();
        names.sort();
        assert_eq!(names, vec!["sub", "x.txt", "y.txt"]);

        client.change_dir("/a").unwrap();
        assert_eq!(client.current_dir(), Some("/a"));
        client.change_dir("b").unwrap();
        assert_eq!(client.current_dir(), Some("/a/b"));

        let err = client.change_dir("x.txt").unwrap_err();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::NotADirectory));
        let err = client.list_dir("/nope").unwrap_err();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::NotFound));
    }

    #[test]
    fn test_remove() {
        let server = server();
        let (_transport, mut client) = open(&server);

        client.remove("/a/b/x.txt").unwrap();
        assert!(server.file("/a/b/x.txt").is_none());
        assert_eq!(
            client.remove("/a/b/x.txt").unwrap_err().remote_kind(),
            Some(RemoteErrorKind::NotFound)
        );
        assert_eq!(
            client.remove("/a/b/sub").unwrap_err().remote_kind(),
            Some(RemoteErrorKind::Failure)
        );
    }

    #[test]
    fn test_severed_connection() {
        let server = server();
        let (transport, mut client) = open(&server);
        assert_eq!(server.open_transports(), 1);

        server.drop_connections();
        assert!(!transport.is_active());
        assert!(matches!(client.list_dir("/"), Err(TransportError::Connection(_))));
        assert_eq!(server.open_transports(), 0);
    }

    #[test]
    fn test_close_is_idempotent_and_injectable() {
        let server = server();
        let (mut transport, mut client) = open(&server);

        server.set_fail_client_close(true);
        server.set_fail_transport_close(true);
        assert!(client.close().is_err());
        assert!(transport.close().is_err());
        assert!(client.close().is_ok());
        assert!(transport.close().is_ok());
        assert_eq!(server.open_transports(), 0);
        assert!(matches!(client.list_dir("/"), Err(TransportError::Closed)));
    }

    #[test]
    fn test_open_client_fault() {
        let server = server();
        server.set_fail_open_client(true);

        let mut transport = server.connector().open("sftp.test", 22).unwrap();
        transport.authenticate("alice", Some("secret")).unwrap();
        assert!(matches!(transport.open_client(), Err(TransportError::Protocol(_))));

        transport.close().unwrap();
        assert_eq!(server.closes(), 1);
    }

    #[test]
    fn test_paths_are_recorded_as_sent() {
        let server = server().with_home("/a");
        let (_transport, mut client) = open(&server);

        client.remove("b/sub/../x.txt").unwrap();
        assert!(server.file("/a/b/x.txt").is_none());

        client.change_dir("/a/b").unwrap();
        client.list_dir("sub/..").unwrap();
        assert_eq!(
            server.requests(),
            vec!["b/sub/../x.txt".to_string(), "/a/b".to_string(), "/a/b/sub/..".to_string()]
        );
    }

    #[test]
    fn test_dropped_transport_is_released() {
        let server = server();
        {
            let _pair = open(&server);
            assert_eq!(server.open_transports(), 1);
        }
        assert_eq!(server.open_transports(), 0);
        assert_eq!(server.connects(), 1);
    }
}
