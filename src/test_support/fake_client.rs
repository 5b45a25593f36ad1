//! In-memory stand-in for the release host.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use sha2::{Digest, Sha256};

use crate::client::ReleaseClient;
use crate::error::{ProvisionError, ProvisionResult};

/// Number of placeholder digest columns preceding SHA-256 in a manifest line.
const FILLER_FIELDS: usize = 17;

/// [`ReleaseClient`] serving canned bodies keyed by URL.
///
/// Unknown URLs answer with an HTTP 404 network error. Request counters let
/// tests assert exactly how much network traffic a scenario produced.
#[derive(Debug, Default)]
pub struct FakeReleaseClient {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    manifest_requests: AtomicUsize,
    binary_requests: AtomicUsize,
    transfer_delay: Option<Duration>,
}

impl FakeReleaseClient {
    /// Pauses halfway through every binary transfer for `delay`.
    ///
    /// Widens the window in which concurrent contenders overlap and in which
    /// a partially written temporary file exists.
    #[must_use]
    pub const fn with_transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = Some(delay);
        self
    }

    /// Serves `body` at `url`, replacing any previous body.
    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_owned(), body);
    }

    /// Publishes `asset` in release `tag` under `base_url`, appending its
    /// SHA-256 to the release's `checksums` manifest.
    pub fn publish_release(&self, base_url: &str, tag: &str, asset: &str, body: &[u8]) {
        let digest = format!("{:x}", Sha256::digest(body));
        let filler = vec!["-"; FILLER_FIELDS].join(" ");
        let line = format!("{asset} {filler} {digest}\n");
        let manifest_url = format!("{base_url}/{tag}/checksums");

        let mut bodies = self.bodies.lock().unwrap_or_else(PoisonError::into_inner);
        bodies
            .entry(manifest_url)
            .or_default()
            .extend_from_slice(line.as_bytes());
        bodies.insert(format!("{base_url}/{tag}/{asset}"), body.to_vec());
    }

    /// Number of `fetch_text` calls so far.
    #[must_use]
    pub fn manifest_requests(&self) -> usize {
        self.manifest_requests.load(Ordering::SeqCst)
    }

    /// Number of `download_to` calls so far.
    #[must_use]
    pub fn binary_requests(&self) -> usize {
        self.binary_requests.load(Ordering::SeqCst)
    }

    /// Total requests of either kind.
    #[must_use]
    pub fn total_requests(&self) -> usize {
        self.manifest_requests() + self.binary_requests()
    }

    fn body(&self, url: &str) -> ProvisionResult<Vec<u8>> {
        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or_else(|| ProvisionError::Network {
                url: url.to_owned(),
                reason: "HTTP 404 Not Found".to_owned(),
            })
    }
}

impl ReleaseClient for FakeReleaseClient {
    fn fetch_text(&self, url: &str) -> ProvisionResult<String> {
        self.manifest_requests.fetch_add(1, Ordering::SeqCst);
        let body = self.body(url)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn download_to(
        &self,
        url: &str,
        dest: &mut File,
        dest_path: &Utf8Path,
    ) -> ProvisionResult<u64> {
        self.binary_requests.fetch_add(1, Ordering::SeqCst);
        let body = self.body(url)?;
        let (head, tail) = body.split_at(body.len().div_ceil(2));
        let write_err = |err: std::io::Error| ProvisionError::io("write", dest_path, err);
        dest.write_all(head).map_err(write_err)?;
        dest.flush().map_err(write_err)?;
        if let Some(delay) = self.transfer_delay {
            thread::sleep(delay);
        }
        dest.write_all(tail).map_err(write_err)?;
        u64::try_from(body.len()).map_err(|err| ProvisionError::Network {
            url: url.to_owned(),
            reason: err.to_string(),
        })
    }
}
