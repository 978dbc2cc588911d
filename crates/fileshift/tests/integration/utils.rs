//! Utility functions for integration tests

use anyhow::{Context, Result};
use fileshift::ssh::MockServer;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Host name the in-memory server answers on
pub const MOCK_HOST: &str = "sftp.test";

/// In-memory server with the directory layout used across scenarios
pub fn scenario_server() -> MockServer {
    MockServer::new(MOCK_HOST, 22)
        .with_user("tester", Some("s3cret"))
        .with_file("/a/b/x.txt", "x contents")
        .with_file("/a/b/y.txt", "y contents")
        .with_dir("/remote")
        .with_home("/home/tester")
}

/// Test file operations and assertions
pub struct FileTestUtils;

impl FileTestUtils {
    /// Create a temporary directory holding one file with `data`
    pub fn create_test_file(name: &str, data: &[u8]) -> Result<(TempDir, PathBuf)> {
        let temp_dir = TempDir::new().context("Failed to create temporary directory")?;
        let file_path = temp_dir.path().join(name);

        fs::write(&file_path, data).context("Failed to write test file")?;

        Ok((temp_dir, file_path))
    }

    /// Verify file content matches expected
    pub fn verify_file_content(path: &Path, expected: &[u8]) -> Result<bool> {
        let content = fs::read(path).context("Failed to read file for verification")?;
        Ok(content == expected)
    }

    /// Deterministic binary payload covering every byte value
    pub fn binary_payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }
}
