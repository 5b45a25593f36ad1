//! Checksum-verified, lock-protected, atomic binary installation.
//!
//! The final path either does not exist or holds a complete, verified
//! binary. Bytes are streamed into a hidden temporary file in the same
//! directory and renamed into place only after the digest matches, so a
//! reader never observes a partial file even when contenders race.

use std::io::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::checksum::{checksums_for, verify_file};
use crate::cleanup::prune_stale_versions;
use crate::client::{ReleaseClient, asset_url};
use crate::config::ProvisionConfig;
use crate::error::{DownloadError, ProvisionError, ProvisionResult};
use crate::fs::set_executable;
use crate::lock::AdvisoryLock;
use crate::observability::{DOWNLOAD_TARGET, ProvisionEvent, ProvisionObserver};
use crate::platform::{BinaryDescriptor, PlatformTarget};

const TEMP_SUFFIX: &str = ".tmp";
const TEMP_RAND_BYTES: usize = 8;

/// Performs the download critical section for one provisioning session.
pub struct Downloader<'a> {
    config: &'a ProvisionConfig,
    client: &'a dyn ReleaseClient,
    observer: &'a dyn ProvisionObserver,
}

impl<'a> Downloader<'a> {
    /// Creates a downloader sharing the session's configuration, transport
    /// and observer.
    #[must_use]
    pub const fn new(
        config: &'a ProvisionConfig,
        client: &'a dyn ReleaseClient,
        observer: &'a dyn ProvisionObserver,
    ) -> Self {
        Self {
            config,
            client,
            observer,
        }
    }

    /// Ensures `descriptor.versioned_filename` exists in `storage`,
    /// downloading and verifying it when absent.
    ///
    /// Exactly one contender downloads per contention episode; the others
    /// find the binary on their fast path or after waiting on the lock.
    /// Superseded versions are pruned after a successful install.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] wrapping the lock, network, checksum or
    /// filesystem failure together with the platform, release and target.
    pub fn acquire(
        &self,
        descriptor: &BinaryDescriptor,
        platform: PlatformTarget,
        storage: &Utf8Path,
    ) -> Result<Utf8PathBuf, DownloadError> {
        let target = storage.join(&descriptor.versioned_filename);
        if target.is_file() {
            self.observer.on_event(&ProvisionEvent::AlreadyPresent {
                path: target.clone(),
                after_wait: false,
            });
            return Ok(target);
        }

        let installed = self
            .install_locked(descriptor, storage, &target)
            .map_err(|source| {
                DownloadError::new(platform, self.config.tag().clone(), target.clone(), source)
            })?;

        if installed {
            let removed = prune_stale_versions(
                storage,
                &descriptor.platform_prefix,
                &descriptor.versioned_filename,
                self.observer,
            );
            debug!(target: DOWNLOAD_TARGET, removed, "stale version cleanup finished");
        }
        Ok(target)
    }

    /// Runs the locked section; `Ok(true)` means this call installed the file.
    fn install_locked(
        &self,
        descriptor: &BinaryDescriptor,
        storage: &Utf8Path,
        target: &Utf8Path,
    ) -> ProvisionResult<bool> {
        let lock_path = Utf8PathBuf::from(format!("{target}.lock"));
        let _lock = AdvisoryLock::acquire(&lock_path, self.config.lock_timeout())?;

        if target.is_file() {
            self.observer.on_event(&ProvisionEvent::AlreadyPresent {
                path: target.to_path_buf(),
                after_wait: true,
            });
            return Ok(false);
        }

        let tag = self.config.tag();
        let checksums = checksums_for(tag, self.client, self.config.release_base_url())?;
        self.observer.on_event(&ProvisionEvent::ChecksumsResolved {
            bundled: checksums.is_bundled(),
        });
        let asset = descriptor.remote_asset_name.as_str();
        let expected = checksums
            .get(asset)
            .ok_or_else(|| ProvisionError::ChecksumUnavailable {
                asset: asset.to_owned(),
                tag: tag.clone(),
            })?;

        let mut temp = create_temp_file(storage, &descriptor.versioned_filename)?;
        let temp_path = utf8_temp_path(&temp)?;
        let url = asset_url(self.config.release_base_url(), tag, asset);
        let bytes = self
            .client
            .download_to(&url, temp.as_file_mut(), &temp_path)?;
        temp.as_file_mut()
            .flush()
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|err| ProvisionError::io("sync", &temp_path, err))?;
        self.observer.on_event(&ProvisionEvent::Downloaded {
            asset: asset.to_owned(),
            bytes,
        });

        verify_file(&temp_path, asset, expected)?;
        set_executable(&temp_path)
            .map_err(|err| ProvisionError::io("set permissions on", &temp_path, err))?;
        temp.persist(target)
            .map_err(|err| ProvisionError::io("rename temporary file onto", target, err.error))?;
        debug!(target: DOWNLOAD_TARGET, path = %target, bytes, "binary renamed into place");

        self.observer.on_event(&ProvisionEvent::Installed {
            path: target.to_path_buf(),
        });
        Ok(true)
    }
}

/// Creates `.<final>.<random>.tmp` in `storage`; removed on drop unless persisted.
fn create_temp_file(storage: &Utf8Path, final_name: &str) -> ProvisionResult<NamedTempFile> {
    Builder::new()
        .prefix(&format!(".{final_name}."))
        .suffix(TEMP_SUFFIX)
        .rand_bytes(TEMP_RAND_BYTES)
        .tempfile_in(storage)
        .map_err(|err| ProvisionError::io("create temporary file in", storage, err))
}

fn utf8_temp_path(temp: &NamedTempFile) -> ProvisionResult<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).map_err(|path| {
        ProvisionError::io(
            "resolve temporary file",
            Utf8PathBuf::from(path.to_string_lossy().into_owned()),
            std::io::Error::new(std::io::ErrorKind::InvalidData, "non-UTF-8 path"),
        )
    })
}
