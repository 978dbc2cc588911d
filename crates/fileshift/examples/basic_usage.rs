//! Basic usage example for fileshift
//!
//! Connects to the server named by `SFTP_HOST`, lists a directory, uploads a
//! file, downloads it back and deletes it. Credentials come from `SFTP_USER`
//! and `SFTP_PASSWORD`; `SFTP_PORT` and `SFTP_DIR` are optional.
//!
//! ```text
//! RUST_LOG=info SFTP_HOST=example.com SFTP_USER=me SFTP_PASSWORD=pw \
//!     cargo run --example basic_usage
//! ```

use anyhow::{Context, Result};
use fileshift::Session;
use std::env;
use std::fs;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let host = env::var("SFTP_HOST").context("SFTP_HOST is not set")?;
    let user = env::var("SFTP_USER").context("SFTP_USER is not set")?;
    let password = env::var("SFTP_PASSWORD").ok();
    let port = env::var("SFTP_PORT")
        .ok()
        .map(|p| p.parse::<u16>())
        .transpose()
        .context("SFTP_PORT is not a port number")?
        .unwrap_or(22);
    let remote_dir = env::var("SFTP_DIR").unwrap_or_else(|_| ".".to_string());

    let mut builder = Session::builder(host, user).with_port(port);
    if let Some(password) = &password {
        builder = builder.with_password(password);
    }
    let mut session = builder.connect()?;
    println!("Connected: {:?}", session.connection_info());

    session.change_dir(&remote_dir)?;
    for name in session.list_dir(".")? {
        println!("  {}", name);
    }

    let scratch = tempfile::tempdir()?;
    let local = scratch.path().join("fileshift_example.txt");
    fs::write(&local, b"Hello from fileshift!\n")?;

    let sent = session.upload_file(&local, "fileshift_example.txt")?;
    println!("Uploaded {} bytes", sent);

    let copy = scratch.path().join("fileshift_example_copy.txt");
    session.download_file("fileshift_example.txt", &copy)?;
    println!("Downloaded: {}", fs::read_to_string(&copy)?.trim());

    session.delete_file("fileshift_example.txt")?;

    if !session.is_connected() {
        println!("Connection dropped, reconnecting");
        session.reconnect()?;
    }

    for warning in session.close() {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}
