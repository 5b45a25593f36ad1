//! Provisions the `yq` command-line query processor on demand.
//!
//! Resolution tries, in order: an explicit `YQ_BINARY_PATH`, a version-pinned
//! binary cached in the storage directory, a qualifying `mikefarah/yq` on
//! `PATH`, and finally a checksum-verified download from the release host.
//! Downloads are serialised across processes with an advisory lock and
//! installed atomically, so concurrent callers sharing a cache directory
//! never observe a partial binary.
//!
//! ```no_run
//! let yq = yq_provision::resolve_binary_path()?;
//! println!("yq resolved to {yq}");
//! # Ok::<(), yq_provision::Error>(())
//! ```

pub mod checksum;
pub mod cleanup;
pub mod client;
mod config;
pub mod download;
mod error;
mod fs;
pub mod location;
pub mod lock;
pub mod observability;
mod platform;
pub mod probe;
mod provisioner;
#[doc(hidden)]
pub mod test_support;
mod version;

pub use config::{
    DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_LOCK_TIMEOUT, DEFAULT_MANIFEST_TIMEOUT,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_RELEASE_BASE_URL, ProvisionConfig, ProvisionConfigBuilder,
    ProvisionEnvCfg, StorageCandidates, auth_token_from_env, version_override_from_env,
};
pub use error::{
    BinaryNotFoundError, BinaryNotFoundKind, ConfigError, ConfigResult, DownloadError,
    ProvisionError, ProvisionResult, ResolveResult, Result, YqProvisionError as Error,
};
pub use observability::{
    INSTALL_HINT, ProvisionEvent, ProvisionObserver, RejectReason, TracingObserver,
};
pub use platform::{Arch, BinaryDescriptor, Os, PlatformTarget};
pub use provisioner::{BinaryProvisioner, ValidatedBinary};
pub use version::{DEFAULT_VERSION, ReleaseTag, Version, meets_minimum, resolve_version};

use camino::Utf8PathBuf;

/// Resolves a usable yq binary using configuration read from the environment.
///
/// Equivalent to building a [`ProvisionConfig`] with
/// [`ProvisionConfig::from_env`] and calling [`BinaryProvisioner::resolve`].
///
/// # Errors
///
/// Returns [`Error::Config`] when a `YQ_*` variable is malformed and
/// [`Error::BinaryNotFound`] when no binary can be provisioned.
pub fn resolve_binary_path() -> Result<Utf8PathBuf> {
    let config = ProvisionConfig::from_env()?;
    Ok(BinaryProvisioner::new(config).resolve()?)
}
