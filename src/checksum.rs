//! Expected SHA-256 digests for release assets and file verification.
//!
//! The pinned release ships with a compiled-in table so the default path
//! never fetches a manifest. Other releases read the multi-hash `checksums`
//! file published alongside the assets, where each line lists the asset name
//! followed by digests from several algorithms; the SHA-256 digest is the
//! nineteenth field.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use camino::Utf8Path;
use sha2::{Digest, Sha256};

use crate::client::{ReleaseClient, manifest_url};
use crate::error::{ProvisionError, ProvisionResult};
use crate::version::ReleaseTag;

/// Field index of the asset name in a manifest line.
const NAME_FIELD: usize = 0;
/// Field index of the SHA-256 digest in a manifest line.
const SHA256_FIELD: usize = 18;

const BUNDLED: [(&str, &str); 5] = [
    (
        "yq_darwin_amd64",
        "54a63555210e73abed09108097072e28bf82a6bb20439a72b55509c4dd42378d",
    ),
    (
        "yq_darwin_arm64",
        "34613ea97c4c77e1894a8978dbf72588d187a69a6292c10dab396c767a1ecde7",
    ),
    (
        "yq_linux_amd64",
        "a74bd266990339e0c48a2103534aef692abf99f19390d12c2b0ce6830385c459",
    ),
    (
        "yq_linux_arm64",
        "c82856ac30da522f50dcdd4f53065487b5a2927e9b87ff637956900986f1f7c2",
    ),
    (
        "yq_windows_amd64.exe",
        "2b6cd8974004fa0511f6b6b359d2698214fadeb4599f0b00e8d85ae62b3922d4",
    ),
];

/// Mapping from release asset name to lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumSet {
    digests: BTreeMap<String, String>,
    bundled: bool,
}

impl ChecksumSet {
    /// Returns the compiled-in digests for the pinned release.
    #[must_use]
    pub fn bundled() -> Self {
        Self {
            digests: BUNDLED
                .iter()
                .map(|(name, digest)| ((*name).to_owned(), (*digest).to_owned()))
                .collect(),
            bundled: true,
        }
    }

    /// Parses a release `checksums` manifest.
    ///
    /// Lines with fewer than nineteen whitespace-separated fields are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use yq_provision::checksum::ChecksumSet;
    ///
    /// let filler = vec!["x"; 17].join(" ");
    /// let manifest = format!("yq_linux_amd64 {filler} ABCDEF\nshort line\n");
    /// let set = ChecksumSet::parse_manifest(&manifest);
    /// assert_eq!(set.get("yq_linux_amd64"), Some("abcdef"));
    /// assert_eq!(set.len(), 1);
    /// ```
    #[must_use]
    pub fn parse_manifest(text: &str) -> Self {
        let digests = text
            .lines()
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                let name = fields.get(NAME_FIELD)?;
                let digest = fields.get(SHA256_FIELD)?;
                Some(((*name).to_owned(), digest.to_ascii_lowercase()))
            })
            .collect();
        Self {
            digests,
            bundled: false,
        }
    }

    /// Digest for `asset`, if listed.
    #[must_use]
    pub fn get(&self, asset: &str) -> Option<&str> {
        self.digests.get(asset).map(String::as_str)
    }

    /// Returns `true` for the compiled-in table.
    #[must_use]
    pub const fn is_bundled(&self) -> bool {
        self.bundled
    }

    /// Number of listed assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Returns `true` when no asset is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

/// Resolves the checksum set for `tag`.
///
/// The pinned release is answered from the bundled table with no network
/// access; any other release fetches `<base_url>/<tag>/checksums`.
///
/// # Errors
///
/// Returns [`ProvisionError::Network`] when the manifest cannot be fetched.
pub fn checksums_for(
    tag: &ReleaseTag,
    client: &dyn ReleaseClient,
    base_url: &str,
) -> ProvisionResult<ChecksumSet> {
    if tag.is_pinned() {
        return Ok(ChecksumSet::bundled());
    }
    let text = client.fetch_text(&manifest_url(base_url, tag))?;
    Ok(ChecksumSet::parse_manifest(&text))
}

/// Computes the lowercase hex SHA-256 digest of the file at `path`.
///
/// # Errors
///
/// Returns [`ProvisionError::Io`] when the file cannot be read.
#[expect(
    clippy::indexing_slicing,
    reason = "bytes_read is always <= buffer.len()"
)]
pub fn sha256_file(path: &Utf8Path) -> ProvisionResult<String> {
    let mut file = File::open(path).map_err(|err| ProvisionError::io("open", path, err))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|err| ProvisionError::io("read", path, err))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    let result = hasher.finalize();
    Ok(format!("{result:x}"))
}

/// Checks the file at `path` against `expected`, ignoring hex case.
///
/// # Errors
///
/// Returns [`ProvisionError::Verification`] on mismatch, labelled with
/// `asset`, and [`ProvisionError::Io`] when the file cannot be read.
pub fn verify_file(path: &Utf8Path, asset: &str, expected: &str) -> ProvisionResult<()> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ProvisionError::Verification {
            asset: asset.to_owned(),
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockReleaseClient;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn manifest_line(name: &str, digest: &str) -> String {
        let filler: Vec<String> = (1..SHA256_FIELD).map(|i| format!("h{i}")).collect();
        format!("{name}  {} {digest}", filler.join(" "))
    }

    fn write_temp(contents: &[u8]) -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(temp.path().join("asset")).expect("utf8 path");
        std::fs::write(&path, contents).expect("write asset");
        (temp, path)
    }

    #[test]
    fn bundled_table_covers_every_supported_asset() {
        let set = ChecksumSet::bundled();
        assert!(set.is_bundled());
        assert_eq!(set.len(), 5);
        assert_eq!(
            set.get("yq_linux_amd64"),
            Some("a74bd266990339e0c48a2103534aef692abf99f19390d12c2b0ce6830385c459")
        );
        assert!(set.get("yq_windows_amd64.exe").is_some());
        assert!(set.get("yq_linux_386").is_none());
    }

    #[test]
    fn parse_manifest_reads_nineteenth_field_and_lowercases() {
        let text = format!(
            "{}\n{}\nchecksums.txt too short\n\n",
            manifest_line("yq_linux_amd64", "AAAA"),
            manifest_line("yq_darwin_arm64", "bbbb"),
        );

        let set = ChecksumSet::parse_manifest(&text);

        assert!(!set.is_bundled());
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("yq_linux_amd64"), Some("aaaa"));
        assert_eq!(set.get("yq_darwin_arm64"), Some("bbbb"));
        assert!(set.get("checksums.txt").is_none());
    }

    #[test]
    fn parse_manifest_of_empty_text_is_empty() {
        assert!(ChecksumSet::parse_manifest("").is_empty());
    }

    #[test]
    fn pinned_release_uses_bundled_table_without_network() {
        let mut client = MockReleaseClient::new();
        client.expect_fetch_text().never();

        let set = checksums_for(&ReleaseTag::pinned(), &client, "https://host")
            .expect("bundled checksums");

        assert!(set.is_bundled());
    }

    #[test]
    fn other_release_fetches_manifest() {
        let tag = ReleaseTag::normalise("4.53.0").expect("tag");
        let body = manifest_line("yq_linux_amd64", ABC_SHA256);
        let mut client = MockReleaseClient::new();
        client
            .expect_fetch_text()
            .withf(|url| url == "https://host/v4.53.0/checksums")
            .times(1)
            .returning(move |_| Ok(body.clone()));

        let set = checksums_for(&tag, &client, "https://host").expect("fetched checksums");

        assert_eq!(set.get("yq_linux_amd64"), Some(ABC_SHA256));
    }

    #[test]
    fn manifest_fetch_failure_propagates() {
        let tag = ReleaseTag::normalise("4.53.0").expect("tag");
        let mut client = MockReleaseClient::new();
        client.expect_fetch_text().returning(|url| {
            Err(ProvisionError::Network {
                url: url.to_owned(),
                reason: "HTTP 404 Not Found".into(),
            })
        });

        let err = checksums_for(&tag, &client, "https://host").expect_err("fetch fails");
        assert!(matches!(err, ProvisionError::Network { .. }));
    }

    #[test]
    fn sha256_file_matches_known_digest() {
        let (_temp, path) = write_temp(b"abc");
        assert_eq!(sha256_file(&path).expect("digest"), ABC_SHA256);
    }

    #[test]
    fn sha256_file_streams_multi_chunk_input() {
        let contents = vec![0x5a_u8; 8192 * 3 + 17];
        let (_temp, path) = write_temp(&contents);
        let expected = format!("{:x}", Sha256::digest(&contents));
        assert_eq!(sha256_file(&path).expect("digest"), expected);
    }

    #[test]
    fn verify_file_ignores_hex_case() {
        let (_temp, path) = write_temp(b"abc");
        verify_file(&path, "yq_linux_amd64", &ABC_SHA256.to_ascii_uppercase())
            .expect("case-insensitive match");
    }

    #[test]
    fn verify_file_rejects_single_bit_flip() {
        let (_temp, path) = write_temp(b"abc");
        let original = std::fs::read(&path).expect("read");
        let mut flipped = original;
        if let Some(first) = flipped.first_mut() {
            *first ^= 0x01;
        }
        std::fs::write(&path, &flipped).expect("rewrite");

        let err = verify_file(&path, "yq_linux_amd64", ABC_SHA256).expect_err("mismatch");

        match err {
            ProvisionError::Verification {
                asset,
                expected,
                actual,
            } => {
                assert_eq!(asset, "yq_linux_amd64");
                assert_eq!(expected, ABC_SHA256);
                assert_ne!(actual, ABC_SHA256);
            }
            other => panic!("expected Verification, got {other:?}"),
        }
    }
}
