//! Immutable provisioning configuration.
//!
//! Every external input the resolution chain consults (environment
//! variables, the executable search path, the runtime platform) is captured
//! once into a [`ProvisionConfig`] and threaded explicitly through each
//! component. Nothing below this module reads the process environment.
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |---|---|
//! | `YQ_VERSION` | Release override; a leading `v` is added when missing |
//! | `YQ_BINARY_PATH` | Explicit binary path; must name an existing file |
//! | `YQ_CACHE_DIR` | Primary storage directory (defaults to `~/.local/bin`) |
//! | `YQ_LOCK_TIMEOUT_SECS` | Download lock wait, 1 to 3600 seconds |
//! | `YQ_RELEASE_BASE_URL` | Release download root for private mirrors |
//! | `GITHUB_TOKEN` / `GH_TOKEN` | Bearer credential for the download host |

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use ortho_config::OrthoConfig;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult, ProvisionResult};
use crate::platform::PlatformTarget;
use crate::version::ReleaseTag;

/// Release host serving yq assets and checksum manifests.
pub const DEFAULT_RELEASE_BASE_URL: &str = "https://github.com/mikefarah/yq/releases/download";

/// Lock wait sized for a ~14 MB binary at 500 Kbps plus manifest overhead.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);
/// Upper bound accepted for `YQ_LOCK_TIMEOUT_SECS`.
const MAX_LOCK_TIMEOUT_SECS: u64 = 3600;
/// Timeout applied to `yq --version` probes.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout applied to checksum manifest requests.
pub const DEFAULT_MANIFEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout applied to binary downloads.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(240);

const TOKEN_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];
const VERSION_VAR: &str = "YQ_VERSION";
const FALLBACK_SUBDIR: &str = "binaries";

/// Captures provisioning settings supplied via `YQ_*` environment variables.
///
/// `YQ_VERSION` is read verbatim by [`version_override_from_env`] instead, so
/// numeric-looking values such as `5` or `4.53` stay text.
///
/// # Examples
/// ```
/// use yq_provision::ProvisionEnvCfg;
///
/// let cfg = ProvisionEnvCfg::default();
/// assert!(cfg.binary_path.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, OrthoConfig, Default)]
#[ortho_config(prefix = "YQ")]
pub struct ProvisionEnvCfg {
    /// Explicit binary path (`YQ_BINARY_PATH`).
    pub binary_path: Option<Utf8PathBuf>,
    /// Primary storage directory override (`YQ_CACHE_DIR`).
    pub cache_dir: Option<Utf8PathBuf>,
    /// Download lock wait in seconds (`YQ_LOCK_TIMEOUT_SECS`).
    pub lock_timeout_secs: Option<u64>,
    /// Release download root (`YQ_RELEASE_BASE_URL`).
    pub release_base_url: Option<String>,
}

impl ProvisionEnvCfg {
    /// Loads configuration from environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable cannot be parsed.
    pub fn load() -> ConfigResult<Self> {
        let args = [OsString::from("yq-provision")];
        Self::load_from_iter(args).map_err(|err| ConfigError::from(eyre!(err)))
    }
}

/// Directories the location resolver may use, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCandidates {
    /// Preferred per-user directory; `None` when no home directory exists.
    pub primary: Option<Utf8PathBuf>,
    /// Directory inside the installation tree used when the primary fails.
    pub fallback: Utf8PathBuf,
}

impl StorageCandidates {
    /// Returns the default candidates: `~/.local/bin` then the fallback tree.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            primary: default_primary_dir(),
            fallback: default_fallback_dir(),
        }
    }
}

/// Immutable inputs for one provisioning session.
#[derive(Debug)]
pub struct ProvisionConfig {
    tag: ReleaseTag,
    binary_override: Option<Utf8PathBuf>,
    auth_token: Option<SecretString>,
    storage: StorageCandidates,
    runtime_os: String,
    runtime_arch: String,
    release_base_url: String,
    search_path: Option<OsString>,
    lock_timeout: Duration,
    probe_timeout: Duration,
    manifest_timeout: Duration,
    download_timeout: Duration,
}

impl ProvisionConfig {
    /// Starts a builder populated with defaults and no environment input.
    ///
    /// # Examples
    /// ```
    /// use yq_provision::ProvisionConfig;
    ///
    /// let config = ProvisionConfig::builder().version("4.53.0").build();
    /// assert_eq!(config.tag().as_str(), "v4.53.0");
    /// ```
    #[must_use]
    pub fn builder() -> ProvisionConfigBuilder {
        ProvisionConfigBuilder::default()
    }

    /// Captures the process environment into a configuration value.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a `YQ_*` variable is malformed.
    pub fn from_env() -> ConfigResult<Self> {
        let cfg = ProvisionEnvCfg::load()?;
        let mut builder =
            builder_from_env_cfg(&cfg, auth_token_from_env(), env::var_os("PATH"))?;
        if let Some(raw) = version_override_from_env() {
            builder = builder.version(&raw);
        }
        Ok(builder.build())
    }

    /// Builds a configuration from already-parsed inputs.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the lock timeout is out of range.
    pub fn from_env_cfg(
        cfg: &ProvisionEnvCfg,
        auth_token: Option<SecretString>,
        search_path: Option<OsString>,
    ) -> ConfigResult<Self> {
        builder_from_env_cfg(cfg, auth_token, search_path).map(ProvisionConfigBuilder::build)
    }

    /// Release required for this session.
    #[must_use]
    pub const fn tag(&self) -> &ReleaseTag {
        &self.tag
    }

    /// Explicit binary path override, with `~` already expanded.
    #[must_use]
    pub const fn binary_override(&self) -> Option<&Utf8PathBuf> {
        self.binary_override.as_ref()
    }

    /// Bearer credential for the download host.
    #[must_use]
    pub const fn auth_token(&self) -> Option<&SecretString> {
        self.auth_token.as_ref()
    }

    /// Storage directories in preference order.
    #[must_use]
    pub const fn storage(&self) -> &StorageCandidates {
        &self.storage
    }

    /// Platform the binary is provisioned for.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ProvisionError::UnsupportedPlatform`] when the
    /// captured runtime has no release asset.
    pub fn platform(&self) -> ProvisionResult<PlatformTarget> {
        PlatformTarget::from_runtime(&self.runtime_os, &self.runtime_arch)
    }

    /// Release download root without a trailing slash.
    #[must_use]
    pub fn release_base_url(&self) -> &str {
        &self.release_base_url
    }

    /// Executable search path captured for the system probe.
    #[must_use]
    pub fn search_path(&self) -> Option<&OsStr> {
        self.search_path.as_deref()
    }

    /// Maximum wait for the cross-process download lock.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Maximum runtime for a `--version` probe.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Maximum duration of a checksum manifest request.
    #[must_use]
    pub const fn manifest_timeout(&self) -> Duration {
        self.manifest_timeout
    }

    /// Maximum duration of a binary download.
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        self.download_timeout
    }
}

/// Incrementally assembles a [`ProvisionConfig`].
#[derive(Debug)]
pub struct ProvisionConfigBuilder {
    config: ProvisionConfig,
}

impl Default for ProvisionConfigBuilder {
    fn default() -> Self {
        Self {
            config: ProvisionConfig {
                tag: ReleaseTag::pinned(),
                binary_override: None,
                auth_token: None,
                storage: StorageCandidates::defaults(),
                runtime_os: env::consts::OS.to_owned(),
                runtime_arch: env::consts::ARCH.to_owned(),
                release_base_url: DEFAULT_RELEASE_BASE_URL.to_owned(),
                search_path: None,
                lock_timeout: DEFAULT_LOCK_TIMEOUT,
                probe_timeout: DEFAULT_PROBE_TIMEOUT,
                manifest_timeout: DEFAULT_MANIFEST_TIMEOUT,
                download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            },
        }
    }
}

impl ProvisionConfigBuilder {
    /// Overrides the release; blank input keeps the pinned default.
    #[must_use]
    pub fn version(mut self, raw: &str) -> Self {
        self.config.tag = ReleaseTag::normalise(raw).unwrap_or_else(ReleaseTag::pinned);
        self
    }

    /// Sets the explicit binary path; blank input clears it.
    #[must_use]
    pub fn binary_override(mut self, path: impl AsRef<Utf8Path>) -> Self {
        let raw = path.as_ref().as_str().trim();
        self.config.binary_override = if raw.is_empty() {
            None
        } else {
            Some(expand_home(Utf8Path::new(raw)))
        };
        self
    }

    /// Sets the bearer credential for the download host.
    #[must_use]
    pub fn auth_token(mut self, token: SecretString) -> Self {
        self.config.auth_token = Some(token);
        self
    }

    /// Replaces the primary storage directory.
    #[must_use]
    pub fn primary_dir(mut self, dir: Option<Utf8PathBuf>) -> Self {
        self.config.storage.primary = dir;
        self
    }

    /// Replaces the fallback storage directory.
    #[must_use]
    pub fn fallback_dir(mut self, dir: Utf8PathBuf) -> Self {
        self.config.storage.fallback = dir;
        self
    }

    /// Overrides the runtime OS and architecture names.
    #[must_use]
    pub fn platform(mut self, os: &str, arch: &str) -> Self {
        os.clone_into(&mut self.config.runtime_os);
        arch.clone_into(&mut self.config.runtime_arch);
        self
    }

    /// Sets the release download root.
    #[must_use]
    pub fn release_base_url(mut self, url: &str) -> Self {
        self.config.release_base_url = url.trim_end_matches('/').to_owned();
        self
    }

    /// Sets the search path used by the system probe; `None` disables it.
    #[must_use]
    pub fn search_path(mut self, path: Option<OsString>) -> Self {
        self.config.search_path = path;
        self
    }

    /// Sets the maximum wait for the download lock.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Sets the maximum runtime of a `--version` probe.
    #[must_use]
    pub const fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Sets the maximum duration of a manifest request.
    #[must_use]
    pub const fn manifest_timeout(mut self, timeout: Duration) -> Self {
        self.config.manifest_timeout = timeout;
        self
    }

    /// Sets the maximum duration of a binary download.
    #[must_use]
    pub const fn download_timeout(mut self, timeout: Duration) -> Self {
        self.config.download_timeout = timeout;
        self
    }

    /// Finalises the configuration.
    #[must_use]
    pub fn build(self) -> ProvisionConfig {
        self.config
    }
}

fn builder_from_env_cfg(
    cfg: &ProvisionEnvCfg,
    auth_token: Option<SecretString>,
    search_path: Option<OsString>,
) -> ConfigResult<ProvisionConfigBuilder> {
    let mut builder = ProvisionConfig::builder()
        .lock_timeout(lock_timeout_from(cfg.lock_timeout_secs)?)
        .search_path(search_path);

    if let Some(path) = cfg.binary_path.as_deref() {
        builder = builder.binary_override(path);
    }
    if let Some(dir) = cfg
        .cache_dir
        .as_deref()
        .map(|dir| dir.as_str().trim())
        .filter(|dir| !dir.is_empty())
    {
        builder = builder.primary_dir(Some(expand_home(Utf8Path::new(dir))));
    }
    if let Some(url) = cfg
        .release_base_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
    {
        builder = builder.release_base_url(url);
    }
    if let Some(token) = auth_token {
        builder = builder.auth_token(token);
    }
    Ok(builder)
}

fn lock_timeout_from(raw: Option<u64>) -> ConfigResult<Duration> {
    let Some(seconds) = raw else {
        return Ok(DEFAULT_LOCK_TIMEOUT);
    };
    if seconds == 0 {
        return Err(ConfigError::from(eyre!(
            "YQ_LOCK_TIMEOUT_SECS must be at least 1 second (received {seconds})"
        )));
    }
    if seconds > MAX_LOCK_TIMEOUT_SECS {
        return Err(ConfigError::from(eyre!(
            "YQ_LOCK_TIMEOUT_SECS must be {MAX_LOCK_TIMEOUT_SECS} seconds or less (received {seconds})"
        )));
    }
    Ok(Duration::from_secs(seconds))
}

/// Reads `YQ_VERSION` as text, whatever its shape (`5`, `4.53`, `v4.53.1`).
///
/// Blank values are returned as-is; [`ProvisionConfigBuilder::version`]
/// treats them as absent.
#[must_use]
pub fn version_override_from_env() -> Option<String> {
    env::var(VERSION_VAR).ok()
}

/// Reads the first non-blank bearer credential from `GITHUB_TOKEN` or `GH_TOKEN`.
#[must_use]
pub fn auth_token_from_env() -> Option<SecretString> {
    TOKEN_VARS.iter().find_map(|name| {
        let raw = env::var(name).ok()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(SecretString::from(trimmed.to_owned()))
        }
    })
}

fn default_primary_dir() -> Option<Utf8PathBuf> {
    let home = Utf8PathBuf::from_path_buf(dirs::home_dir()?).ok()?;
    Some(home.join(".local").join("bin"))
}

fn default_fallback_dir() -> Utf8PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(FALLBACK_SUBDIR)))
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .unwrap_or_else(|| {
            let temp = env::temp_dir().join("yq-provision").join(FALLBACK_SUBDIR);
            Utf8PathBuf::from_path_buf(temp)
                .unwrap_or_else(|_| Utf8PathBuf::from("yq-provision").join(FALLBACK_SUBDIR))
        })
}

/// Expands a leading `~` to the current user's home directory.
fn expand_home(path: &Utf8Path) -> Utf8PathBuf {
    let Some(rest) = path.as_str().strip_prefix('~') else {
        return path.to_path_buf();
    };
    if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\')) {
        return path.to_path_buf();
    }
    let home = dirs::home_dir().map(PathBuf::into_os_string);
    let Some(home_dir) = home.and_then(|dir| dir.into_string().ok()) else {
        return path.to_path_buf();
    };
    let remainder = rest.trim_start_matches(['/', '\\']);
    if remainder.is_empty() {
        Utf8PathBuf::from(home_dir)
    } else {
        Utf8PathBuf::from(home_dir).join(remainder)
    }
}
