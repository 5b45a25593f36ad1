//! Discovery of a qualifying system-installed yq.
//!
//! Only the Go implementation (`mikefarah/yq`) is usable; the unrelated
//! Python wrapper of the same name is rejected by its `--version` output.

use std::ffi::OsStr;
use std::io::{self, ErrorKind};
use std::process::{Command, Stdio};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::fs::is_executable;
use crate::observability::{PROBE_TARGET, ProvisionEvent, ProvisionObserver, RejectReason};
use crate::version::{ReleaseTag, meets_minimum};

/// Substring identifying the Go implementation in `--version` output.
pub const FINGERPRINT: &str = "mikefarah/yq";

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "yq.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "yq";

/// Failure running `<binary> --version`.
#[derive(Debug, Error)]
pub(crate) enum VersionCommandError {
    #[error("failed to launch: {0}")]
    Spawn(#[source] io::Error),
    #[error("did not exit within {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("failed to wait for exit: {0}")]
    Wait(#[source] io::Error),
    #[error("exited with {0}")]
    Failed(std::process::ExitStatus),
    #[error("printed non-UTF-8 output")]
    NonUtf8,
}

/// Runs `<path> --version` and returns its standard output.
///
/// The child is killed when it outlives `timeout`.
pub(crate) fn run_version_command(
    path: &Utf8Path,
    timeout: Duration,
) -> Result<String, VersionCommandError> {
    let mut child = Command::new(path.as_std_path())
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(VersionCommandError::Spawn)?;

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            match child.kill() {
                // `InvalidInput` indicates the child has already exited.
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::InvalidInput => {}
                Err(err) => {
                    debug!(target: PROBE_TARGET, path = %path, error = %err, "failed to kill timed-out probe");
                }
            }
            drop(child.wait());
            return Err(VersionCommandError::TimedOut(timeout));
        }
        Err(err) => {
            drop(child.kill());
            drop(child.wait());
            return Err(VersionCommandError::Wait(err));
        }
    };

    let output = child.wait_with_output().map_err(VersionCommandError::Wait)?;
    if !status.success() {
        return Err(VersionCommandError::Failed(status));
    }
    String::from_utf8(output.stdout).map_err(|_| VersionCommandError::NonUtf8)
}

/// Extracts the `v<digits and dots>` token following the word `version`.
///
/// # Examples
///
/// ```
/// use yq_provision::probe::extract_version_token;
///
/// let output = "yq (https://github.com/mikefarah/yq/) version v4.52.2";
/// assert_eq!(extract_version_token(output), Some("v4.52.2"));
/// assert_eq!(extract_version_token("yq 3.4.1"), None);
/// ```
#[must_use]
pub fn extract_version_token(output: &str) -> Option<&str> {
    output.match_indices("version").find_map(|(index, word)| {
        let after = output.get(index + word.len()..)?;
        let trimmed = after.trim_start();
        if trimmed.len() == after.len() {
            return None;
        }
        let digits = trimmed.strip_prefix('v')?;
        let end = digits
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(digits.len());
        if end == 0 {
            return None;
        }
        trimmed.get(..=end)
    })
}

/// Locates and qualifies a `yq` on the configured search path.
pub struct SystemBinaryProbe<'a> {
    search_path: Option<&'a OsStr>,
    required: &'a ReleaseTag,
    timeout: Duration,
    observer: &'a dyn ProvisionObserver,
}

impl<'a> SystemBinaryProbe<'a> {
    /// Creates a probe; a `None` search path disables discovery.
    #[must_use]
    pub const fn new(
        search_path: Option<&'a OsStr>,
        required: &'a ReleaseTag,
        timeout: Duration,
        observer: &'a dyn ProvisionObserver,
    ) -> Self {
        Self {
            search_path,
            required,
            timeout,
            observer,
        }
    }

    /// Returns the first `yq` on the search path when it is `mikefarah/yq`
    /// at or above the required release.
    ///
    /// Every failure (launch, timeout, non-zero exit, unreadable output)
    /// degrades to `None`.
    #[must_use]
    pub fn find_system_binary(&self) -> Option<Utf8PathBuf> {
        let candidate = self.locate()?;
        let output = match run_version_command(&candidate, self.timeout) {
            Ok(output) => output,
            Err(err) => {
                debug!(target: PROBE_TARGET, path = %candidate, error = %err, "system yq probe failed");
                return None;
            }
        };
        self.qualify(candidate, &output)
    }

    fn locate(&self) -> Option<Utf8PathBuf> {
        let search_path = self.search_path?;
        std::env::split_paths(search_path)
            .filter_map(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .filter(|dir| !dir.as_str().is_empty())
            .map(|dir| dir.join(EXECUTABLE_NAME))
            .find(|candidate| is_executable(candidate))
    }

    fn qualify(&self, path: Utf8PathBuf, output: &str) -> Option<Utf8PathBuf> {
        let reject = |reason| {
            self.observer.on_event(&ProvisionEvent::SystemBinaryRejected {
                path: path.clone(),
                reason,
            });
            None
        };
        if !output.contains(FINGERPRINT) {
            return reject(RejectReason::WrongFlavour);
        }
        let Some(found) = extract_version_token(output) else {
            return reject(RejectReason::UnreadableVersion);
        };
        if !meets_minimum(found, self.required.as_str()) {
            return reject(RejectReason::TooOld {
                found: found.to_owned(),
                required: self.required.to_string(),
            });
        }
        self.observer.on_event(&ProvisionEvent::SystemBinarySelected {
            path: path.clone(),
            version: found.to_owned(),
        });
        Some(path)
    }
}
