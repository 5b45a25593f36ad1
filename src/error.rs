//! Domain error types for the yq binary provisioner.

use std::fmt;
use std::io;
use std::time::Duration;

use camino::Utf8PathBuf;
use color_eyre::Report;
use thiserror::Error;

use crate::platform::PlatformTarget;
use crate::version::ReleaseTag;

/// Result alias for operations that may return a [`YqProvisionError`].
pub type Result<T> = std::result::Result<T, YqProvisionError>;

/// Result alias for component-level provisioning operations.
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

/// Result alias for the terminal resolution chain.
pub type ResolveResult<T> = std::result::Result<T, BinaryNotFoundError>;

/// Result alias for configuration fallible operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level error exposed by the crate.
#[derive(Debug, Error)]
pub enum YqProvisionError {
    /// Indicates that no usable yq binary could be resolved.
    #[error(transparent)]
    BinaryNotFound(#[from] BinaryNotFoundError),
    /// Indicates configuration parsing failed.
    #[error("configuration parsing failed")]
    Config(#[from] ConfigError),
}

/// Failures raised by the individual provisioning components.
///
/// These never reach callers of [`crate::BinaryProvisioner::resolve`]
/// directly; the downloader wraps them in a [`DownloadError`] and the
/// provisioner folds that into a [`BinaryNotFoundError`].
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Neither the primary nor the fallback storage directory was writable.
    #[error(
        "no writable storage location: {primary} ({primary_reason}); fallback {fallback} ({fallback_reason})"
    )]
    Location {
        /// Primary directory that was attempted.
        primary: String,
        /// Why the primary directory was rejected.
        primary_reason: String,
        /// Fallback directory that was attempted.
        fallback: Utf8PathBuf,
        /// Why the fallback directory was rejected.
        fallback_reason: String,
    },
    /// The release checksum set does not list the required asset.
    #[error("no checksum available for {asset} in release {tag}")]
    ChecksumUnavailable {
        /// Remote asset name that was looked up.
        asset: String,
        /// Release tag whose checksum set was consulted.
        tag: ReleaseTag,
    },
    /// Transport failure or non-success HTTP status.
    #[error("failed to fetch {url}: {reason}")]
    Network {
        /// URL of the failing request.
        url: String,
        /// HTTP status or transport error description.
        reason: String,
    },
    /// The downloaded content does not match the expected digest.
    #[error("checksum verification failed for {asset}: expected {expected}, found {actual}")]
    Verification {
        /// Remote asset name that was verified.
        asset: String,
        /// Digest published for the asset.
        expected: String,
        /// Digest computed from the downloaded bytes.
        actual: String,
    },
    /// Another process held the download lock past the timeout.
    #[error("timed out after {}s waiting for download lock {lock_path}", waited.as_secs())]
    LockTimeout {
        /// Lock file that could not be acquired.
        lock_path: Utf8PathBuf,
        /// How long the caller waited.
        waited: Duration,
    },
    /// A filesystem operation failed.
    #[error("failed to {action} {path}")]
    Io {
        /// Short description of the attempted operation.
        action: &'static str,
        /// Path the operation targeted.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The running OS or architecture has no published yq asset.
    #[error(
        "unsupported platform {os}/{arch}; supported systems are Linux, Darwin (macOS) and Windows on x86_64/amd64 or arm64/aarch64"
    )]
    UnsupportedPlatform {
        /// Operating system reported by the runtime.
        os: String,
        /// Architecture reported by the runtime.
        arch: String,
    },
}

impl ProvisionError {
    /// Builds an [`ProvisionError::Io`] for the given action and path.
    pub(crate) fn io(action: &'static str, path: impl Into<Utf8PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Provisioning failure raised at the downloader boundary.
///
/// Carries enough context (platform, release and target path) that the
/// final message is actionable without correlating logs.
#[derive(Debug, Error)]
#[error("failed to provision yq {tag} for {platform} at {target}")]
pub struct DownloadError {
    platform: PlatformTarget,
    tag: ReleaseTag,
    target: Utf8PathBuf,
    #[source]
    source: Box<ProvisionError>,
}

impl DownloadError {
    /// Wraps a component failure with the download context.
    #[must_use]
    pub fn new(
        platform: PlatformTarget,
        tag: ReleaseTag,
        target: Utf8PathBuf,
        source: ProvisionError,
    ) -> Self {
        Self {
            platform,
            tag,
            target,
            source: Box::new(source),
        }
    }

    /// Returns the platform the download targeted.
    #[must_use]
    pub const fn platform(&self) -> PlatformTarget {
        self.platform
    }

    /// Returns the release tag the download targeted.
    #[must_use]
    pub const fn tag(&self) -> &ReleaseTag {
        &self.tag
    }

    /// Returns the attempted final binary path.
    #[must_use]
    pub const fn target(&self) -> &Utf8PathBuf {
        &self.target
    }

    /// Returns the underlying component failure.
    #[must_use]
    pub fn cause(&self) -> &ProvisionError {
        &self.source
    }
}

/// Categorises terminal resolution failures so callers can branch on them.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BinaryNotFoundKind {
    /// `YQ_BINARY_PATH` does not name an existing regular file.
    InvalidOverride,
    /// The running platform has no published yq asset.
    UnsupportedPlatform,
    /// No writable cache directory is available.
    NoStorage,
    /// The download chain failed.
    DownloadFailed,
    /// A download reported success but the binary is absent.
    MissingAfterDownload,
    /// A resolved binary failed its post-resolution health check.
    ValidationFailed,
}

impl fmt::Display for BinaryNotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidOverride => "invalid override",
            Self::UnsupportedPlatform => "unsupported platform",
            Self::NoStorage => "no storage",
            Self::DownloadFailed => "download failed",
            Self::MissingAfterDownload => "missing after download",
            Self::ValidationFailed => "validation failed",
        };
        f.write_str(label)
    }
}

/// Terminal condition raised once every resolution step is exhausted.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BinaryNotFoundError {
    kind: BinaryNotFoundKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BinaryNotFoundError {
    /// Constructs an error without an underlying cause.
    #[must_use]
    pub fn new(kind: BinaryNotFoundKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Constructs an error that wraps an underlying cause.
    #[must_use]
    pub fn with_source(
        kind: BinaryNotFoundKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the semantic category for this failure.
    #[must_use]
    pub const fn kind(&self) -> BinaryNotFoundKind {
        self.kind
    }

    /// Returns the human-readable message, including remediation hints.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Captures configuration failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ConfigError(#[from] Report);
