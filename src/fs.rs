//! Shared filesystem helpers for the storage directory.

use std::io::{self, ErrorKind};

use camino::{Utf8Path, Utf8PathBuf};

/// Mode applied to installed binaries on POSIX systems.
pub(crate) const EXECUTABLE_MODE: u32 = 0o755;

/// Resolves a path to an ambient directory handle paired with the relative path component.
///
/// Absolute paths are opened relative to the ambient root; relative paths reuse the current
/// working directory.
#[cfg(unix)]
fn ambient_dir_and_path(path: &Utf8Path) -> io::Result<(cap_std::fs::Dir, Utf8PathBuf)> {
    use cap_std::{ambient_authority, fs::Dir};

    if path.has_root() {
        let stripped = path
            .strip_prefix("/")
            .map_or_else(|_| path.to_path_buf(), Utf8Path::to_path_buf);
        let dir = Dir::open_ambient_dir("/", ambient_authority())?;
        Ok((dir, stripped))
    } else {
        let dir = Dir::open_ambient_dir(".", ambient_authority())?;
        Ok((dir, path.to_path_buf()))
    }
}

/// Ensures the provided directory exists, creating intermediate directories when required.
#[cfg(unix)]
pub(crate) fn ensure_dir_exists(path: &Utf8Path) -> io::Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }

    dir.create_dir_all(relative.as_std_path()).or_else(|err| {
        if err.kind() == ErrorKind::AlreadyExists {
            Ok(())
        } else {
            Err(err)
        }
    })
}

/// Ensures the provided directory exists, creating intermediate directories when required.
#[cfg(not(unix))]
pub(crate) fn ensure_dir_exists(path: &Utf8Path) -> io::Result<()> {
    std::fs::create_dir_all(path).or_else(|err| {
        if err.kind() == ErrorKind::AlreadyExists {
            Ok(())
        } else {
            Err(err)
        }
    })
}

/// Marks the file at `path` executable (`0755`).
#[cfg(unix)]
pub(crate) fn set_executable(path: &Utf8Path) -> io::Result<()> {
    use cap_std::fs::{Permissions, PermissionsExt};

    let (dir, relative) = ambient_dir_and_path(path)?;
    dir.set_permissions(
        relative.as_std_path(),
        Permissions::from_mode(EXECUTABLE_MODE),
    )
}

/// Windows derives executability from the file extension.
#[cfg(not(unix))]
pub(crate) fn set_executable(_path: &Utf8Path) -> io::Result<()> {
    Ok(())
}

/// Returns `true` when `path` is a regular file the current user may execute.
#[cfg(unix)]
#[must_use]
pub(crate) fn is_executable(path: &Utf8Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

/// Returns `true` when `path` is a regular file.
#[cfg(not(unix))]
#[must_use]
pub(crate) fn is_executable(path: &Utf8Path) -> bool {
    path.is_file()
}

/// Makes `path` absolute against the current working directory.
#[must_use]
pub(crate) fn absolutize(path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::path::absolute(path)
        .ok()
        .and_then(|abs| Utf8PathBuf::from_path_buf(abs).ok())
        .unwrap_or_else(|| path.to_path_buf())
}
