//! Storage location discovery.
//!
//! The resolver prefers a per-user binary directory and falls back to a
//! directory inside the installation tree. Each candidate must survive a
//! real write probe; creating a directory is not proof that files can be
//! written into it (read-only homes, restricted sandboxes).

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::config::StorageCandidates;
use crate::error::{ProvisionError, ProvisionResult};
use crate::fs::{absolutize, ensure_dir_exists};
use crate::observability::{ProvisionEvent, ProvisionObserver};

const WRITE_PROBE_PREFIX: &str = ".write_test";

/// Picks a writable storage directory from `candidates`.
///
/// Directories are created when absent but never deleted. The decision is
/// not cached; every call re-evaluates the candidates.
///
/// # Errors
///
/// Returns [`ProvisionError::Location`] when neither candidate is writable.
pub fn choose_storage_location(
    candidates: &StorageCandidates,
    observer: &dyn ProvisionObserver,
) -> ProvisionResult<Utf8PathBuf> {
    let primary_reason = match candidates.primary.as_deref() {
        Some(primary) => match prepare_writable_dir(primary) {
            Ok(()) => return Ok(absolutize(primary)),
            Err(err) => {
                observer.on_event(&ProvisionEvent::StorageRejected {
                    dir: primary.to_path_buf(),
                    reason: err.to_string(),
                });
                err.to_string()
            }
        },
        None => "home directory unavailable".to_owned(),
    };

    let fallback = &candidates.fallback;
    prepare_writable_dir(fallback).map_err(|err| {
        observer.on_event(&ProvisionEvent::StorageRejected {
            dir: fallback.clone(),
            reason: err.to_string(),
        });
        ProvisionError::Location {
            primary: candidates
                .primary
                .as_ref()
                .map_or_else(|| "~/.local/bin".to_owned(), ToString::to_string),
            primary_reason,
            fallback: fallback.clone(),
            fallback_reason: err.to_string(),
        }
    })?;
    Ok(absolutize(fallback))
}

/// Creates `dir` if needed and proves it accepts new files.
fn prepare_writable_dir(dir: &Utf8Path) -> ProvisionResult<()> {
    ensure_dir_exists(dir).map_err(|err| ProvisionError::io("create directory", dir, err))?;
    probe_write_access(dir)
}

/// Creates and deletes a uniquely named marker file inside `dir`.
///
/// Unique names keep concurrent probes from deleting each other's markers.
fn probe_write_access(dir: &Utf8Path) -> ProvisionResult<()> {
    let marker = Builder::new()
        .prefix(WRITE_PROBE_PREFIX)
        .tempfile_in(dir)
        .map_err(|err| ProvisionError::io("write probe file in", dir, err))?;
    marker
        .close()
        .map_err(|err| ProvisionError::io("remove probe file in", dir, err))
}
