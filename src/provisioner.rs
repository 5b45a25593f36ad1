//! The resolution chain tying the components together.

use std::sync::Arc;

use camino::Utf8PathBuf;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::client::{HttpReleaseClient, ReleaseClient};
use crate::config::ProvisionConfig;
use crate::download::Downloader;
use crate::error::{BinaryNotFoundError, BinaryNotFoundKind, ProvisionError, ResolveResult};
use crate::fs::{absolutize, is_executable};
use crate::location::choose_storage_location;
use crate::observability::{LOG_TARGET, ProvisionEvent, ProvisionObserver, TracingObserver};
use crate::platform::BinaryDescriptor;
use crate::probe::{SystemBinaryProbe, run_version_command};
use crate::version::resolve_version;

/// A resolved binary that passed its health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedBinary {
    /// Absolute path of the binary.
    pub path: Utf8PathBuf,
    /// Trimmed `--version` output.
    pub version: String,
}

/// Resolves a usable yq binary for one configuration.
///
/// # Examples
///
/// ```no_run
/// use yq_provision::{BinaryProvisioner, ProvisionConfig};
///
/// let config = ProvisionConfig::from_env()?;
/// let yq = BinaryProvisioner::new(config).resolve()?;
/// println!("yq lives at {yq}");
/// # Ok::<(), yq_provision::Error>(())
/// ```
pub struct BinaryProvisioner {
    config: ProvisionConfig,
    client: Box<dyn ReleaseClient>,
    observer: Arc<dyn ProvisionObserver>,
}

impl std::fmt::Debug for BinaryProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryProvisioner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BinaryProvisioner {
    /// Creates a provisioner using the HTTP release client and tracing output.
    #[must_use]
    pub fn new(config: ProvisionConfig) -> Self {
        let token = config
            .auth_token()
            .map(|token| SecretString::from(token.expose_secret().to_owned()));
        let client = HttpReleaseClient::new(
            token,
            config.manifest_timeout(),
            config.download_timeout(),
        );
        Self::with_client(config, Box::new(client))
    }

    /// Creates a provisioner with a custom release transport.
    #[must_use]
    pub fn with_client(config: ProvisionConfig, client: Box<dyn ReleaseClient>) -> Self {
        Self {
            config,
            client,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replaces the event observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProvisionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Configuration captured for this provisioner.
    #[must_use]
    pub const fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Returns the absolute path of a usable yq binary.
    ///
    /// Steps run in order: explicit override, platform detection, storage
    /// selection, cached binary, qualifying system binary, download. Nothing
    /// is retried.
    ///
    /// # Errors
    ///
    /// Returns a [`BinaryNotFoundError`] whose [`BinaryNotFoundKind`] names
    /// the step that failed.
    pub fn resolve(&self) -> ResolveResult<Utf8PathBuf> {
        let observer = self.observer.as_ref();

        if let Some(path) = self.config.binary_override() {
            if !path.is_file() {
                return Err(BinaryNotFoundError::new(
                    BinaryNotFoundKind::InvalidOverride,
                    format!("YQ_BINARY_PATH set to '{path}' but file does not exist"),
                ));
            }
            observer.on_event(&ProvisionEvent::OverrideSelected { path: path.clone() });
            return Ok(absolutize(path));
        }

        let platform = self.config.platform().map_err(|err| {
            BinaryNotFoundError::with_source(
                BinaryNotFoundKind::UnsupportedPlatform,
                err.to_string(),
                err,
            )
        })?;

        let storage = choose_storage_location(self.config.storage(), observer)
            .map_err(no_storage)?;

        let tag = resolve_version(&self.config);
        let descriptor = BinaryDescriptor::new(platform, &tag);
        let cached = storage.join(&descriptor.versioned_filename);
        if cached.is_file() {
            observer.on_event(&ProvisionEvent::CacheHit {
                path: cached.clone(),
            });
            return Ok(cached);
        }

        let probe = SystemBinaryProbe::new(
            self.config.search_path(),
            &tag,
            self.config.probe_timeout(),
            observer,
        );
        if let Some(system) = probe.find_system_binary() {
            return Ok(absolutize(&system));
        }

        observer.on_event(&ProvisionEvent::DownloadRequired {
            platform: platform.to_string(),
            tag: tag.to_string(),
        });
        let downloader = Downloader::new(&self.config, self.client.as_ref(), observer);
        let path = downloader
            .acquire(&descriptor, platform, &storage)
            .map_err(|err| {
                BinaryNotFoundError::with_source(
                    BinaryNotFoundKind::DownloadFailed,
                    format!(
                        "yq binary not found for {platform} and auto-download failed: {}\n\
                         Attempted storage location: {}\n\
                         Please ensure you have write permissions to ~/.local/bin/ or the package directory",
                        err.cause(),
                        err.target(),
                    ),
                    err,
                )
            })?;

        if !path.is_file() {
            return Err(BinaryNotFoundError::new(
                BinaryNotFoundKind::MissingAfterDownload,
                format!("binary download completed but file not found at {path}"),
            ));
        }
        Ok(path)
    }

    /// Resolves the binary and confirms it runs.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::resolve`] failures and reports
    /// [`BinaryNotFoundKind::ValidationFailed`] when the binary is not
    /// executable or `--version` fails.
    pub fn validate(&self) -> ResolveResult<ValidatedBinary> {
        let path = self.resolve()?;
        if !is_executable(&path) {
            return Err(BinaryNotFoundError::new(
                BinaryNotFoundKind::ValidationFailed,
                format!("yq binary at {path} is not executable"),
            ));
        }
        let output = run_version_command(&path, self.config.probe_timeout()).map_err(|err| {
            BinaryNotFoundError::with_source(
                BinaryNotFoundKind::ValidationFailed,
                format!("yq binary at {path} failed to report its version: {err}"),
                err,
            )
        })?;
        let version = output.trim().to_owned();
        debug!(target: LOG_TARGET, path = %path, version = %version, "yq binary validated");
        Ok(ValidatedBinary { path, version })
    }
}

fn no_storage(err: ProvisionError) -> BinaryNotFoundError {
    BinaryNotFoundError::with_source(
        BinaryNotFoundKind::NoStorage,
        format!(
            "{err}\nPlease ensure you have write permissions to ~/.local/bin/ or the package directory"
        ),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeReleaseClient, RecordingObserver};
    use tempfile::TempDir;

    fn storage_root() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path");
        (temp, root)
    }

    #[test]
    fn missing_override_fails_without_touching_storage() {
        let (_temp, root) = storage_root();
        let config = ProvisionConfig::builder()
            .binary_override(root.join("missing/yq"))
            .primary_dir(Some(root.join("cache")))
            .build();
        let client = Arc::new(FakeReleaseClient::default());
        let provisioner =
            BinaryProvisioner::with_client(config, Box::new(Arc::clone(&client)));

        let err = provisioner.resolve().expect_err("override missing");

        assert_eq!(err.kind(), BinaryNotFoundKind::InvalidOverride);
        assert!(err.message().contains("missing/yq"), "{}", err.message());
        assert_eq!(client.total_requests(), 0);
        assert!(!root.join("cache").exists());
    }

    #[test]
    fn directory_override_is_rejected() {
        let (_temp, root) = storage_root();
        let config = ProvisionConfig::builder().binary_override(&root).build();

        let err = BinaryProvisioner::with_client(config, Box::new(FakeReleaseClient::default()))
            .resolve()
            .expect_err("directory is not a binary");

        assert_eq!(err.kind(), BinaryNotFoundKind::InvalidOverride);
    }

    #[test]
    fn existing_override_wins_over_everything() {
        let (_temp, root) = storage_root();
        let binary = root.join("custom-yq");
        std::fs::write(&binary, b"yq").expect("write override");
        let observer = Arc::new(RecordingObserver::default());
        let config = ProvisionConfig::builder()
            .binary_override(&binary)
            .platform("plan9", "mips")
            .build();

        let path = BinaryProvisioner::with_client(config, Box::new(FakeReleaseClient::default()))
            .with_observer(Arc::clone(&observer) as Arc<dyn ProvisionObserver>)
            .resolve()
            .expect("override accepted");

        assert_eq!(path, binary);
        assert_eq!(
            observer.events(),
            vec![ProvisionEvent::OverrideSelected { path: binary }]
        );
    }

    #[test]
    fn unsupported_platform_is_reported() {
        let (_temp, root) = storage_root();
        let config = ProvisionConfig::builder()
            .platform("freebsd", "x86_64")
            .primary_dir(Some(root.join("cache")))
            .build();

        let err = BinaryProvisioner::with_client(config, Box::new(FakeReleaseClient::default()))
            .resolve()
            .expect_err("freebsd unsupported");

        assert_eq!(err.kind(), BinaryNotFoundKind::UnsupportedPlatform);
        assert!(err.message().contains("freebsd"), "{}", err.message());
    }

    #[test]
    fn unwritable_storage_is_no_storage() {
        let (_temp, root) = storage_root();
        let blocker = root.join("blocker");
        std::fs::write(&blocker, b"file").expect("write blocker");
        let config = ProvisionConfig::builder()
            .platform("linux", "x86_64")
            .primary_dir(Some(blocker.join("primary")))
            .fallback_dir(blocker.join("fallback"))
            .build();

        let err = BinaryProvisioner::with_client(config, Box::new(FakeReleaseClient::default()))
            .resolve()
            .expect_err("no storage");

        assert_eq!(err.kind(), BinaryNotFoundKind::NoStorage);
        assert!(err.message().contains("write permissions"), "{}", err.message());
    }

    #[test]
    fn download_failure_names_storage_and_hint() {
        let (_temp, root) = storage_root();
        let config = ProvisionConfig::builder()
            .platform("linux", "aarch64")
            .primary_dir(Some(root.join("cache")))
            .build();

        let err = BinaryProvisioner::with_client(config, Box::new(FakeReleaseClient::default()))
            .resolve()
            .expect_err("nothing served");

        assert_eq!(err.kind(), BinaryNotFoundKind::DownloadFailed);
        let message = err.message();
        assert!(message.contains("linux/arm64"), "{message}");
        assert!(message.contains("yq-linux-arm64-v4.52.2"), "{message}");
        assert!(message.contains("write permissions"), "{message}");
    }

    #[test]
    fn cached_binary_is_returned_without_network() {
        let (_temp, root) = storage_root();
        let cache = root.join("cache");
        std::fs::create_dir(&cache).expect("create cache");
        std::fs::write(cache.join("yq-darwin-arm64-v4.52.2"), b"yq").expect("seed cache");
        let config = ProvisionConfig::builder()
            .platform("macos", "aarch64")
            .primary_dir(Some(cache.clone()))
            .build();
        let client = Arc::new(FakeReleaseClient::default());

        let path = BinaryProvisioner::with_client(config, Box::new(Arc::clone(&client)))
            .resolve()
            .expect("cache hit");

        assert_eq!(path, cache.join("yq-darwin-arm64-v4.52.2"));
        assert_eq!(client.total_requests(), 0);
    }
}
