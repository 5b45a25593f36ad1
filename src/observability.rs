//! Structured provisioning events and their tracing sink.
//!
//! Components report progress as [`ProvisionEvent`] values sent to a
//! [`ProvisionObserver`]. The default [`TracingObserver`] forwards them to
//! `tracing` under the targets below, so subscribers can filter provisioning
//! output without pulling in unrelated application logs.

use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

/// Target used for resolution-chain events.
pub(crate) const LOG_TARGET: &str = "yq_provision::provision";
/// Target used by the downloader.
pub(crate) const DOWNLOAD_TARGET: &str = "yq_provision::download";
/// Target used by the advisory lock.
pub(crate) const LOCK_TARGET: &str = "yq_provision::lock";
/// Target used by the system binary probe.
pub(crate) const PROBE_TARGET: &str = "yq_provision::probe";

/// Hint shown whenever provisioning falls back to a network download.
pub const INSTALL_HINT: &str =
    "install yq via a package manager to avoid downloads: brew install yq | choco install yq | snap install yq";

/// Why a system-installed binary was not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The version output lacks the mikefarah/yq fingerprint.
    WrongFlavour,
    /// The fingerprint matched but no version token could be read.
    UnreadableVersion,
    /// The reported version is below the required minimum.
    TooOld {
        /// Version reported by the binary.
        found: String,
        /// Minimum release required.
        required: String,
    },
}

/// Progress reported by the resolution chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionEvent {
    /// The explicit override path was accepted.
    OverrideSelected {
        /// Override path.
        path: Utf8PathBuf,
    },
    /// A storage candidate was rejected and the next one will be tried.
    StorageRejected {
        /// Rejected directory.
        dir: Utf8PathBuf,
        /// Failure description.
        reason: String,
    },
    /// The versioned binary was already cached.
    CacheHit {
        /// Cached binary path.
        path: Utf8PathBuf,
    },
    /// A system binary on the search path was accepted.
    SystemBinarySelected {
        /// System binary path.
        path: Utf8PathBuf,
        /// Version it reported.
        version: String,
    },
    /// A system binary on the search path was rejected.
    SystemBinaryRejected {
        /// System binary path.
        path: Utf8PathBuf,
        /// Rejection cause.
        reason: RejectReason,
    },
    /// No usable binary exists locally; a download is about to begin.
    DownloadRequired {
        /// Platform label, e.g. `linux/amd64`.
        platform: String,
        /// Release tag.
        tag: String,
    },
    /// The binary appeared before this process downloaded it.
    AlreadyPresent {
        /// Binary path.
        path: Utf8PathBuf,
        /// `true` when observed after waiting on the lock.
        after_wait: bool,
    },
    /// Checksums for the release were resolved.
    ChecksumsResolved {
        /// `true` for the compiled-in table, `false` for a fetched manifest.
        bundled: bool,
    },
    /// The binary transfer finished and verification is next.
    Downloaded {
        /// Release asset name.
        asset: String,
        /// Bytes written.
        bytes: u64,
    },
    /// The verified binary was renamed into place.
    Installed {
        /// Final binary path.
        path: Utf8PathBuf,
    },
    /// A superseded cached version was deleted.
    StaleVersionRemoved {
        /// Deleted path.
        path: Utf8PathBuf,
    },
    /// A superseded cached version could not be deleted.
    StaleVersionRetained {
        /// Path that remains.
        path: Utf8PathBuf,
        /// Failure description.
        error: String,
    },
}

/// Receives provisioning progress.
pub trait ProvisionObserver: Send + Sync {
    /// Handles a single event.
    fn on_event(&self, event: &ProvisionEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProvisionObserver for TracingObserver {
    fn on_event(&self, event: &ProvisionEvent) {
        match event {
            ProvisionEvent::OverrideSelected { path } => {
                debug!(target: LOG_TARGET, path = %path, "using YQ_BINARY_PATH override");
            }
            ProvisionEvent::StorageRejected { dir, reason } => {
                debug!(target: LOG_TARGET, dir = %dir, reason = %reason, "storage candidate rejected");
            }
            ProvisionEvent::CacheHit { path } => {
                debug!(target: LOG_TARGET, path = %path, "cached yq binary found");
            }
            ProvisionEvent::SystemBinarySelected { path, version } => {
                info!(target: PROBE_TARGET, path = %path, version = %version, "using system-installed yq");
            }
            ProvisionEvent::SystemBinaryRejected { path, reason } => {
                log_rejection(path, reason);
            }
            ProvisionEvent::DownloadRequired { platform, tag } => {
                info!(
                    target: DOWNLOAD_TARGET,
                    platform = %platform,
                    tag = %tag,
                    hint = INSTALL_HINT,
                    "yq binary not found; downloading from release host"
                );
            }
            ProvisionEvent::AlreadyPresent { path, after_wait } => {
                debug!(
                    target: DOWNLOAD_TARGET,
                    path = %path,
                    after_wait,
                    "binary already present"
                );
            }
            ProvisionEvent::ChecksumsResolved { bundled } => {
                debug!(target: DOWNLOAD_TARGET, bundled, "checksums resolved");
            }
            ProvisionEvent::Downloaded { asset, bytes } => {
                debug!(target: DOWNLOAD_TARGET, asset = %asset, bytes, "download complete, verifying");
            }
            ProvisionEvent::Installed { path } => {
                info!(target: DOWNLOAD_TARGET, path = %path, "downloaded and verified yq binary");
            }
            ProvisionEvent::StaleVersionRemoved { path } => {
                info!(target: DOWNLOAD_TARGET, path = %path, "removed superseded yq binary");
            }
            ProvisionEvent::StaleVersionRetained { path, error } => {
                warn!(
                    target: DOWNLOAD_TARGET,
                    path = %path,
                    error = %error,
                    "could not remove superseded yq binary"
                );
            }
        }
    }
}

fn log_rejection(path: &Utf8PathBuf, reason: &RejectReason) {
    match reason {
        RejectReason::WrongFlavour | RejectReason::UnreadableVersion => {
            warn!(
                target: PROBE_TARGET,
                path = %path,
                hint = INSTALL_HINT,
                "found yq on PATH but it is not mikefarah/yq"
            );
        }
        RejectReason::TooOld { found, required } => {
            warn!(
                target: PROBE_TARGET,
                path = %path,
                found = %found,
                required = %required,
                "system yq is older than the required release; downloading instead"
            );
        }
    }
}
