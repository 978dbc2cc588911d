//! Live SFTP server settings for integration tests
//!
//! Live tests are `#[ignore]`d and read their target from the environment:
//! `FILESHIFT_TEST_HOST`, `FILESHIFT_TEST_PORT` (default 22),
//! `FILESHIFT_TEST_USER`, `FILESHIFT_TEST_PASSWORD` and
//! `FILESHIFT_TEST_DIR` (a writable remote directory, default `/tmp`).

use fileshift::ConnectionConfig;
use std::env;

/// Connection settings for a live server
#[derive(Debug, Clone)]
pub struct LiveServer {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub work_dir: String,
}

impl LiveServer {
    /// Read settings from the environment, if a host is configured
    pub fn from_env() -> Option<Self> {
        let host = env::var("FILESHIFT_TEST_HOST").ok()?;
        let port = env::var("FILESHIFT_TEST_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(22);
        let user = env::var("FILESHIFT_TEST_USER").unwrap_or_else(|_| "testuser".to_string());

        Some(Self {
            host,
            port,
            user,
            password: env::var("FILESHIFT_TEST_PASSWORD").ok(),
            work_dir: env::var("FILESHIFT_TEST_DIR").unwrap_or_else(|_| "/tmp".to_string()),
        })
    }

    /// Connection configuration for this server
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(&self.host, self.port, &self.user, self.password.as_deref())
    }

    /// Path inside the remote working directory
    pub fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.work_dir.trim_end_matches('/'), name)
    }
}
