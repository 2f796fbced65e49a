//! Client tool resolution.
//!
//! The OpenSSH driver resolves `ssh`, `scp`, and `ssh-keygen` on every
//! call: either inside the configured override directory, or by walking
//! `PATH` for an executable regular file. The `setsid` session detacher
//! is looked up the same way but its absence is not an error.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::{DriverError, Result};

/// Resolves a client tool, honoring the override directory when set.
///
/// With an override directory the tool must live there; `PATH` is not
/// consulted as a fallback.
///
/// # Errors
///
/// [`DriverError::BinaryNotFound`] when no executable candidate exists.
pub(crate) fn locate_tool(name: &str, override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        let candidate = dir.join(name);
        if candidate_is_executable(&candidate) {
            return Ok(candidate);
        }
        return Err(DriverError::BinaryNotFound {
            binary: name.to_owned(),
        });
    }

    find_on_path(name).ok_or_else(|| DriverError::BinaryNotFound {
        binary: name.to_owned(),
    })
}

/// Looks up the `setsid` utility; `None` simply omits the detach prefix.
pub(crate) fn locate_setsid() -> Option<PathBuf> {
    find_on_path("setsid")
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let search_path = env::var_os("PATH")?;
    find_in_search_path(name, &search_path)
}

fn find_in_search_path(name: &str, search_path: &OsStr) -> Option<PathBuf> {
    for dir in env::split_paths(search_path) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(name);
        if candidate_is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn candidate_is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };

    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn override_directory_takes_precedence_and_is_final() {
        let dir = TempDir::new().unwrap();
        let stub = write_executable(dir.path(), "ssh");

        let found = locate_tool("ssh", Some(dir.path())).unwrap();
        assert_eq!(found, stub);

        // A missing tool in the override directory never falls back to PATH.
        let missing = locate_tool("scp", Some(dir.path()));
        assert!(matches!(
            missing,
            Err(DriverError::BinaryNotFound { ref binary }) if binary == "scp"
        ));
    }

    #[test]
    fn search_walks_directories_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let expected = write_executable(second.path(), "fictional-tool");

        let search_path =
            env::join_paths([first.path(), second.path()]).unwrap();
        let found = find_in_search_path("fictional-tool", &search_path).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn search_skips_non_executable_candidates() {
        let shadow = TempDir::new().unwrap();
        let real = TempDir::new().unwrap();

        let plain = shadow.path().join("fictional-tool");
        fs::write(&plain, "not a program").unwrap();
        fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).unwrap();
        let expected = write_executable(real.path(), "fictional-tool");

        let search_path =
            env::join_paths([shadow.path(), real.path()]).unwrap();
        let found = find_in_search_path("fictional-tool", &search_path).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn search_skips_directories_with_the_tool_name() {
        let trap = TempDir::new().unwrap();
        fs::create_dir(trap.path().join("fictional-tool")).unwrap();

        let search_path = env::join_paths([trap.path()]).unwrap();
        assert!(find_in_search_path("fictional-tool", &search_path).is_none());
    }

    #[test]
    fn absent_tool_reports_its_name() {
        let empty = TempDir::new().unwrap();
        let search_path = env::join_paths([empty.path()]).unwrap();
        assert!(find_in_search_path("no-such-tool", &search_path).is_none());

        let error = locate_tool("no-such-tool", Some(empty.path())).unwrap_err();
        assert_eq!(
            error.to_string(),
            "unable to locate the \"no-such-tool\" binary"
        );
    }
}
