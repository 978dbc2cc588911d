//! Client-side remote path resolution
//!
//! SFTP has no server-side working directory, so clients resolve relative
//! paths themselves. Remote paths are always POSIX, regardless of the local
//! platform, and are handled as strings.

/// Join a relative `path` onto `cwd`; anything else is returned as given.
///
/// The result is not normalised. `..` must be resolved by the server, which
/// knows where symlinks point. Without a working directory, relative paths
/// go out unchanged and the server resolves them against the login directory.
pub fn resolve(cwd: Option<&str>, path: &str) -> String {
    match cwd {
        Some(cwd) if !path.starts_with('/') => format!("{}/{}", cwd.trim_end_matches('/'), path),
        _ => path.to_string(),
    }
}

/// Lexically normalise a remote path.
///
/// Collapses duplicate separators and `.` components and folds `..` into
/// its parent. Absolute paths never climb above `/`; leading `..` of a
/// relative path are kept.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Final component of a remote path
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Parent directory of a normalised absolute path
pub fn parent(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}
