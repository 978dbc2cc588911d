//! File-operation client abstraction and the libssh2 SFTP client

use crate::TransportError;
use std::path::Path;

/// Issues file and directory operations over an established transport.
///
/// Relative remote paths are resolved against [`FileClient::current_dir`].
pub trait FileClient {
    /// Names of the entries in a remote directory, excluding `.` and `..`
    fn list_dir(&mut self, path: &str) -> Result<Vec<String>, TransportError>;

    /// Change the remote working directory
    fn change_dir(&mut self, path: &str) -> Result<(), TransportError>;

    /// Remove a single remote file
    fn remove(&mut self, path: &str) -> Result<(), TransportError>;

    /// Copy a remote file to a local path, returning the bytes written
    fn get(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, TransportError>;

    /// Copy a local file to a remote path, returning the bytes sent
    fn put(&mut self, local_path: &Path, remote_path: &str) -> Result<u64, TransportError>;

    /// Remote working directory, if one was set
    fn current_dir(&self) -> Option<&str>;

    /// Close the client. Closing twice is not an error.
    fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg(feature = "ssh2")]
pub use self::libssh2::Ssh2Client;

#[cfg(feature = "ssh2")]
mod libssh2 {
    use super::transfer::{check_size, copy_stream};
    use super::FileClient;
    use crate::{path, RemoteErrorKind, TransportError};
    use ssh2::Sftp;
    use std::fs::File;
    use std::path::Path;
    use tracing::debug;

    /// SFTP client over a libssh2 session
    pub struct Ssh2Client {
        sftp: Option<Sftp>,
        cwd: Option<String>,
    }

    impl Ssh2Client {
        pub(crate) fn new(sftp: Sftp) -> Self {
            Self {
                sftp: Some(sftp),
                cwd: None,
            }
        }

        fn sftp(&self) -> Result<&Sftp, TransportError> {
            self.sftp.as_ref().ok_or(TransportError::Closed)
        }

        fn resolve(&self, path: &str) -> String {
            path::resolve(self.cwd.as_deref(), path)
        }
    }

    impl std::fmt::Debug for Ssh2Client {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Ssh2Client")
                .field("open", &self.sftp.is_some())
                .field("cwd", &self.cwd)
                .finish()
        }
    }

    impl FileClient for Ssh2Client {
        fn list_dir(&mut self, path: &str) -> Result<Vec<String>, TransportError> {
            let resolved = self.resolve(path);
            let entries = self
                .sftp()?
                .readdir(Path::new(&resolved))
                .map_err(|e| TransportError::from_sftp(&resolved, e))?;

            Ok(entries
                .into_iter()
                .filter_map(|(entry, _)| entry.file_name().map(|n| n.to_string_lossy().into_owned()))
                .filter(|name| name != "." && name != "..")
                .collect())
        }

        fn change_dir(&mut self, path: &str) -> Result<(), TransportError> {
            let resolved = self.resolve(path);
            let sftp = self.sftp()?;

            let canonical = sftp
                .realpath(Path::new(&resolved))
                .map_err(|e| TransportError::from_sftp(&resolved, e))?;
            let canonical = canonical.to_string_lossy().into_owned();

            let stat = sftp
                .stat(Path::new(&canonical))
                .map_err(|e| TransportError::from_sftp(&canonical, e))?;
            if !stat.is_dir() {
                return Err(TransportError::remote(
                    canonical,
                    RemoteErrorKind::NotADirectory,
                    "not a directory",
                ));
            }

            debug!("Remote working directory is now {}", canonical);
            self.cwd = Some(canonical);
            Ok(())
        }

        fn remove(&mut self, path: &str) -> Result<(), TransportError> {
            let resolved = self.resolve(path);
            self.sftp()?
                .unlink(Path::new(&resolved))
                .map_err(|e| TransportError::from_sftp(&resolved, e))
        }

        fn get(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, TransportError> {
            let resolved = self.resolve(remote_path);
            let mut remote = self
                .sftp()?
                .open(Path::new(&resolved))
                .map_err(|e| TransportError::from_sftp(&resolved, e))?;
            let expected = remote
                .stat()
                .map_err(|e| TransportError::from_sftp(&resolved, e))?
                .size;

            let mut local = File::create(local_path).map_err(|e| TransportError::local_io(local_path, e))?;
            let copied = copy_stream(
                &mut remote,
                &mut local,
                |e| TransportError::remote(resolved.as_str(), RemoteErrorKind::Failure, e.to_string()),
                |e| TransportError::local_io(local_path, e),
            )?;

            check_size("get", &resolved, copied, expected)?;
            Ok(copied)
        }

        fn put(&mut self, local_path: &Path, remote_path: &str) -> Result<u64, TransportError> {
            let resolved = self.resolve(remote_path);
            let mut local = File::open(local_path).map_err(|e| TransportError::local_io(local_path, e))?;
            let sftp = self.sftp()?;

            let copied = {
                let mut remote = sftp
                    .create(Path::new(&resolved))
                    .map_err(|e| TransportError::from_sftp(&resolved, e))?;
                copy_stream(
                    &mut local,
                    &mut remote,
                    |e| TransportError::local_io(local_path, e),
                    |e| TransportError::remote(resolved.as_str(), RemoteErrorKind::Failure, e.to_string()),
                )?
            };

            let stat = sftp
                .stat(Path::new(&resolved))
                .map_err(|e| TransportError::from_sftp(&resolved, e))?;
            check_size("put", &resolved, copied, stat.size)?;
            Ok(copied)
        }

        fn current_dir(&self) -> Option<&str> {
            self.cwd.as_deref()
        }

        fn close(&mut self) -> Result<(), TransportError> {
            match self.sftp.take() {
                Some(mut sftp) => sftp
                    .shutdown()
                    .map_err(|e| TransportError::from_session("SFTP shutdown failed", e)),
                None => Ok(()),
            }
        }
    }
}

/// Streaming copy and size verification shared by transfer implementations
#[cfg(any(feature = "ssh2", test))]
mod transfer {
    use crate::{RemoteErrorKind, TransportError};
    use std::io::{self, Read, Write};

    const COPY_BUFFER_SIZE: usize = 32 * 1024;

    /// Copy `reader` into `writer`, attributing failures to the side that failed
    pub(super) fn copy_stream<R, W, FR, FW>(
        reader: &mut R,
        writer: &mut W,
        read_err: FR,
        write_err: FW,
    ) -> Result<u64, TransportError>
    where
        R: Read,
        W: Write,
        FR: Fn(io::Error) -> TransportError,
        FW: Fn(io::Error) -> TransportError,
    {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(read_err(e)),
            };
            writer.write_all(&buf[..n]).map_err(&write_err)?;
            total += n as u64;
        }

        writer.flush().map_err(&write_err)?;
        Ok(total)
    }

    /// Compare transferred bytes against the size reported for the file
    pub(super) fn check_size(
        direction: &str,
        remote_path: &str,
        transferred: u64,
        expected: Option<u64>,
    ) -> Result<(), TransportError> {
        match expected {
            Some(size) if size != transferred => Err(TransportError::remote(
                remote_path,
                RemoteErrorKind::SizeMismatch,
                format!("size mismatch in {}: {} != {}", direction, transferred, size),
            )),
            _ => Ok(()),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::Cursor;

        struct FailingWriter;

        impl Write for FailingWriter {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        #[test]
        fn test_copy_stream_counts_bytes() {
            let data = vec![7u8; COPY_BUFFER_SIZE * 2 + 13];
            let mut reader = Cursor::new(data.clone());
            let mut out = Vec::new();

            let copied = copy_stream(&mut reader, &mut out, TransportError::Io, TransportError::Io).unwrap();
            assert_eq!(copied, data.len() as u64);
            assert_eq!(out, data);
        }

        #[test]
        fn test_copy_stream_attributes_write_failure() {
            let mut reader = Cursor::new(b"payload".to_vec());
            let result = copy_stream(
                &mut reader,
                &mut FailingWriter,
                |e| TransportError::remote("/r", RemoteErrorKind::Failure, e.to_string()),
                |e| TransportError::local_io("/l", e),
            );
            assert!(matches!(result, Err(TransportError::LocalIo { .. })));
        }

        #[test]
        fn test_check_size() {
            assert!(check_size("get", "/f", 10, Some(10)).is_ok());
            assert!(check_size("get", "/f", 10, None).is_ok());

            let err = check_size("put", "/f", 9, Some(10)).unwrap_err();
            assert_eq!(err.remote_kind(), Some(RemoteErrorKind::SizeMismatch));
            assert!(err.to_string().contains("size mismatch in put: 9 != 10"));
        }
    }
}
