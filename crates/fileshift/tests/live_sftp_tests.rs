//! Tests against a real SFTP server over libssh2
//!
//! Run with `cargo test -- --ignored` after setting `FILESHIFT_TEST_*`
//! (see `integration/live.rs`).

#![cfg(feature = "ssh2")]

mod integration;

use anyhow::{Context, Result};
use fileshift::ssh::{Ssh2Connector, Ssh2Options, TransportType};
use fileshift::{ConnectionConfig, FileshiftError, Session};
use integration::*;
use std::time::Duration;

fn live_server() -> Option<LiveServer> {
    let server = LiveServer::from_env();
    if server.is_none() {
        println!("FILESHIFT_TEST_HOST not set, skipping");
    }
    server
}

fn connector() -> Ssh2Connector {
    Ssh2Connector::new(Ssh2Options {
        connect_timeout: Duration::from_secs(10),
        io_timeout: Duration::from_secs(30),
        ..Default::default()
    })
}

#[test]
#[ignore]
fn test_live_connect_and_round_trip() -> Result<()> {
    let Some(server) = live_server() else {
        return Ok(());
    };

    let mut session = Session::connect(server.config(), connector())?;
    assert!(session.is_connected());
    assert_eq!(
        session.connection_info().map(|i| i.transport_type),
        Some(TransportType::SshLibssh2)
    );

    let payload = FileTestUtils::binary_payload(256 * 1024);
    let (dir, local) = FileTestUtils::create_test_file("upload.bin", &payload)?;
    let remote = server.remote_path("fileshift_live_test.bin");

    session.upload_file(&local, &remote)?;
    let copy = dir.path().join("copy.bin");
    session.download_file(&remote, &copy)?;
    assert!(FileTestUtils::verify_file_content(&copy, &payload)?);

    session.change_dir(&server.work_dir)?;
    let names = session.list_dir(".")?;
    assert!(names.iter().any(|n| n == "fileshift_live_test.bin"));

    session.delete_file("fileshift_live_test.bin")?;
    let err = session.delete_file("fileshift_live_test.bin").unwrap_err();
    assert!(matches!(err, FileshiftError::RemoteIo { .. }));

    let warnings = session.close();
    assert!(warnings.is_empty(), "unexpected close warnings: {:?}", warnings);
    Ok(())
}

#[test]
#[ignore]
fn test_live_reconnect() -> Result<()> {
    let Some(server) = live_server() else {
        return Ok(());
    };

    let mut session = Session::connect(server.config(), connector())?;
    session.reconnect().context("reconnect failed")?;
    assert!(session.is_connected());
    assert!(session.list_dir(&server.work_dir).is_ok());
    Ok(())
}

#[test]
#[ignore]
fn test_live_rejects_bad_password() -> Result<()> {
    let Some(server) = live_server() else {
        return Ok(());
    };

    let config = ConnectionConfig::new(&server.host, server.port, &server.user, Some("definitely-wrong"));
    let result = Session::connect(config, connector());
    assert!(matches!(result, Err(FileshiftError::Authentication(_))));
    Ok(())
}
