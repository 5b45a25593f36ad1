//! Release host transport.
//!
//! [`ReleaseClient`] is the seam between the provisioning logic and the
//! network. Production code uses [`HttpReleaseClient`]; tests substitute a
//! scripted client so no real download host is contacted.

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::OnceLock;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::{DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_MANIFEST_TIMEOUT};
use crate::error::{ProvisionError, ProvisionResult};
use crate::observability::DOWNLOAD_TARGET;
use crate::version::ReleaseTag;

const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Blocking access to release manifests and assets.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseClient: Send + Sync {
    /// Fetches `url` and returns its body as text.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Network`] on transport failure or a
    /// non-success status.
    fn fetch_text(&self, url: &str) -> ProvisionResult<String>;

    /// Streams the body of `url` into `dest`, returning the bytes written.
    ///
    /// `dest_path` names `dest` in error reports.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Network`] on transport failure or a
    /// non-success status, and [`ProvisionError::Io`] when `dest` rejects
    /// the write.
    fn download_to(&self, url: &str, dest: &mut File, dest_path: &Utf8Path)
    -> ProvisionResult<u64>;
}

impl<T: ReleaseClient + ?Sized> ReleaseClient for std::sync::Arc<T> {
    fn fetch_text(&self, url: &str) -> ProvisionResult<String> {
        (**self).fetch_text(url)
    }

    fn download_to(
        &self,
        url: &str,
        dest: &mut File,
        dest_path: &Utf8Path,
    ) -> ProvisionResult<u64> {
        (**self).download_to(url, dest, dest_path)
    }
}

/// URL of the checksum manifest published with `tag`.
#[must_use]
pub fn manifest_url(base_url: &str, tag: &ReleaseTag) -> String {
    format!("{base_url}/{tag}/checksums")
}

/// URL of `asset` in release `tag`.
#[must_use]
pub fn asset_url(base_url: &str, tag: &ReleaseTag, asset: &str) -> String {
    format!("{base_url}/{tag}/{asset}")
}

/// [`ReleaseClient`] backed by `reqwest`'s blocking client.
///
/// The underlying connection pool is created on first use so that resolution
/// paths which never reach the network pay nothing for TLS setup.
#[derive(Debug)]
pub struct HttpReleaseClient {
    client: OnceLock<Client>,
    auth_token: Option<SecretString>,
    manifest_timeout: Duration,
    download_timeout: Duration,
}

impl Default for HttpReleaseClient {
    fn default() -> Self {
        Self::new(None, DEFAULT_MANIFEST_TIMEOUT, DEFAULT_DOWNLOAD_TIMEOUT)
    }
}

impl HttpReleaseClient {
    /// Creates a client that sends `auth_token` as a bearer credential.
    #[must_use]
    pub const fn new(
        auth_token: Option<SecretString>,
        manifest_timeout: Duration,
        download_timeout: Duration,
    ) -> Self {
        Self {
            client: OnceLock::new(),
            auth_token,
            manifest_timeout,
            download_timeout,
        }
    }

    fn client(&self, url: &str) -> ProvisionResult<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = Client::builder()
            .user_agent(concat!("yq-provision/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ProvisionError::Network {
                url: url.to_owned(),
                reason: format!("failed to create HTTP client: {err}"),
            })?;
        Ok(self.client.get_or_init(|| built))
    }

    fn request(&self, url: &str, timeout: Duration) -> ProvisionResult<RequestBuilder> {
        let mut builder = self.client(url)?.get(url).timeout(timeout);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        Ok(builder)
    }

    fn send(url: &str, request: RequestBuilder) -> ProvisionResult<Response> {
        let response = request.send().map_err(|err| network_error(url, &err))?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ProvisionError::Network {
                url: url.to_owned(),
                reason: format!("HTTP {status}"),
            })
        }
    }
}

impl ReleaseClient for HttpReleaseClient {
    fn fetch_text(&self, url: &str) -> ProvisionResult<String> {
        debug!(target: DOWNLOAD_TARGET, url, "fetching checksum manifest");
        let response = Self::send(url, self.request(url, self.manifest_timeout)?)?;
        response.text().map_err(|err| network_error(url, &err))
    }

    fn download_to(
        &self,
        url: &str,
        dest: &mut File,
        dest_path: &Utf8Path,
    ) -> ProvisionResult<u64> {
        debug!(target: DOWNLOAD_TARGET, url, "downloading release asset");
        let mut response = Self::send(url, self.request(url, self.download_timeout)?)?;
        stream_body(url, &mut response, dest, dest_path)
    }
}

/// Copies a response body into `dest` in fixed-size chunks.
///
/// Read failures are transport errors; write failures are local I/O errors
/// against `dest_path`.
#[expect(
    clippy::indexing_slicing,
    reason = "`read` never exceeds the buffer length"
)]
fn stream_body(
    url: &str,
    body: &mut impl Read,
    dest: &mut impl Write,
    dest_path: &Utf8Path,
) -> ProvisionResult<u64> {
    let mut buffer = [0_u8; COPY_CHUNK_BYTES];
    let mut written = 0_u64;
    loop {
        let read = match body.read(&mut buffer) {
            Ok(0) => return Ok(written),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(ProvisionError::Network {
                    url: url.to_owned(),
                    reason: format!("failed to read response body: {err}"),
                });
            }
        };
        dest.write_all(&buffer[..read])
            .map_err(|err| ProvisionError::io("write", dest_path, err))?;
        written = written.saturating_add(u64::try_from(read).unwrap_or(u64::MAX));
    }
}

fn network_error(url: &str, err: &reqwest::Error) -> ProvisionError {
    let reason = if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    };
    ProvisionError::Network {
        url: url.to_owned(),
        reason,
    }
}
