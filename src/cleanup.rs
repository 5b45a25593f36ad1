//! Removal of superseded cached binaries.
//!
//! Pruning runs outside the download lock and is best-effort: a file that
//! cannot be deleted (open on Windows, permission denied) is reported and
//! left behind.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::observability::{DOWNLOAD_TARGET, ProvisionEvent, ProvisionObserver};

const LOCK_SUFFIX: &str = ".lock";

/// Deletes cached versions sharing `platform_prefix`, except `keep_filename`.
///
/// Only regular files named `<platform_prefix>-v*` are considered; lock
/// files and hidden temporary downloads never match. Returns the number of
/// files removed.
#[must_use]
pub fn prune_stale_versions(
    dir: &Utf8Path,
    platform_prefix: &str,
    keep_filename: &str,
    observer: &dyn ProvisionObserver,
) -> usize {
    let entries = match dir.read_dir_utf8() {
        Ok(entries) => entries,
        Err(err) => {
            debug!(target: DOWNLOAD_TARGET, dir = %dir, error = %err, "skipping stale version cleanup");
            return 0;
        }
    };

    let version_prefix = format!("{platform_prefix}-v");
    let stale: Vec<Utf8PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            name.starts_with(&version_prefix)
                && name != keep_filename
                && !name.ends_with(LOCK_SUFFIX)
                && entry.file_type().is_ok_and(|kind| kind.is_file())
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();

    let mut removed = 0;
    for path in stale {
        if let Err(err) = std::fs::remove_file(&path) {
            observer.on_event(&ProvisionEvent::StaleVersionRetained {
                path,
                error: err.to_string(),
            });
            continue;
        }
        observer.on_event(&ProvisionEvent::StaleVersionRemoved { path });
        removed += 1;
    }
    removed
}
