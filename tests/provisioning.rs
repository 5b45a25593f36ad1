//! End-to-end resolution scenarios against an in-memory release host.
//!
//! Each scenario gets a fresh storage directory and a
//! [`FakeReleaseClient`], so request counters reflect exactly the traffic the
//! resolution chain produced.

use std::error::Error as _;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use tempfile::TempDir;
use yq_provision::test_support::{FakeReleaseClient, RecordingObserver};
use yq_provision::{
    BinaryNotFoundKind, BinaryProvisioner, INSTALL_HINT, ProvisionConfig, ProvisionConfigBuilder,
    ProvisionEvent,
};

const BASE_URL: &str = "https://releases.test/mikefarah/yq";
const BINARY: &[u8] = b"\x7fELF pretend yq binary\n";

struct Sandbox {
    _temp: TempDir,
    root: Utf8PathBuf,
    client: Arc<FakeReleaseClient>,
    observer: Arc<RecordingObserver>,
}

impl Sandbox {
    fn cache(&self) -> Utf8PathBuf {
        self.root.join("home/.local/bin")
    }

    fn builder(&self) -> ProvisionConfigBuilder {
        ProvisionConfig::builder()
            .platform("linux", "x86_64")
            .release_base_url(BASE_URL)
            .primary_dir(Some(self.cache()))
            .fallback_dir(self.root.join("pkg/binaries"))
    }

    fn provisioner(&self, config: ProvisionConfig) -> BinaryProvisioner {
        BinaryProvisioner::with_client(config, Box::new(Arc::clone(&self.client)))
            .with_observer(Arc::clone(&self.observer) as Arc<dyn yq_provision::ProvisionObserver>)
    }

    fn publish(&self, tag: &str, asset: &str, body: &[u8]) {
        self.client.publish_release(BASE_URL, tag, asset, body);
    }
}

fn file_names(dir: &Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = dir
        .read_dir_utf8()
        .expect("read storage dir")
        .map(|entry| entry.expect("dir entry").file_name().to_owned())
        .collect();
    names.sort();
    names
}

#[fixture]
fn sandbox() -> Sandbox {
    let temp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 tempdir");
    Sandbox {
        _temp: temp,
        root,
        client: Arc::new(FakeReleaseClient::default()),
        observer: Arc::new(RecordingObserver::default()),
    }
}

#[rstest]
fn pinned_release_verifies_against_bundled_checksums(sandbox: Sandbox) {
    sandbox.client.serve(
        &format!("{BASE_URL}/v4.52.2/yq_linux_amd64"),
        b"not the published yq binary".to_vec(),
    );
    let provisioner = sandbox.provisioner(sandbox.builder().build());

    let err = provisioner.resolve().expect_err("digest cannot match");

    assert_eq!(err.kind(), BinaryNotFoundKind::DownloadFailed);
    assert_eq!(sandbox.client.manifest_requests(), 0);
    assert_eq!(sandbox.client.binary_requests(), 1);
    let chain = err.source().expect("download error").source().expect("cause");
    assert!(
        chain.to_string().contains("a74bd266990339e0c48a2103534aef692abf99f19390d12c2b0ce6830385c459"),
        "{chain}"
    );
    assert!(file_names(&sandbox.cache()).is_empty());
}

#[rstest]
fn version_override_downloads_verifies_and_installs(sandbox: Sandbox) {
    sandbox.publish("v4.53.0", "yq_linux_amd64", BINARY);
    let provisioner = sandbox.provisioner(sandbox.builder().version("4.53.0").build());

    let path = provisioner.resolve().expect("download succeeds");

    assert!(path.is_absolute());
    assert_eq!(path, sandbox.cache().join("yq-linux-amd64-v4.53.0"));
    assert_eq!(std::fs::read(&path).expect("read binary"), BINARY);
    assert_eq!(sandbox.client.manifest_requests(), 1);
    assert_eq!(sandbox.client.binary_requests(), 1);
    assert_eq!(file_names(&sandbox.cache()), vec!["yq-linux-amd64-v4.53.0"]);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
    let events = sandbox.observer.events();
    assert!(events.contains(&ProvisionEvent::DownloadRequired {
        platform: "linux/amd64".to_owned(),
        tag: "v4.53.0".to_owned(),
    }));
    assert!(events.contains(&ProvisionEvent::ChecksumsResolved { bundled: false }));
    assert!(events.contains(&ProvisionEvent::Installed { path }));
}

#[rstest]
fn second_resolution_is_a_cache_hit(sandbox: Sandbox) {
    sandbox.publish("v4.53.0", "yq_linux_amd64", BINARY);
    let first = sandbox
        .provisioner(sandbox.builder().version("v4.53.0").build())
        .resolve()
        .expect("first resolution downloads");
    let requests = sandbox.client.total_requests();

    let second = sandbox
        .provisioner(sandbox.builder().version("v4.53.0").build())
        .resolve()
        .expect("second resolution hits cache");

    assert_eq!(first, second);
    assert_eq!(sandbox.client.total_requests(), requests);
    assert_eq!(
        sandbox
            .observer
            .count(|event| matches!(event, ProvisionEvent::CacheHit { .. })),
        1
    );
}

#[rstest]
fn invalid_override_fails_before_any_network_io(sandbox: Sandbox) {
    let missing = sandbox.root.join("nowhere/yq");
    let provisioner = sandbox.provisioner(sandbox.builder().binary_override(&missing).build());

    let err = provisioner.resolve().expect_err("override missing");

    assert_eq!(err.kind(), BinaryNotFoundKind::InvalidOverride);
    assert_eq!(
        err.to_string(),
        format!("YQ_BINARY_PATH set to '{missing}' but file does not exist")
    );
    assert_eq!(sandbox.client.total_requests(), 0);
    assert!(!sandbox.cache().exists(), "storage must not be touched");
}

#[rstest]
fn upgrade_prunes_superseded_versions_for_the_same_platform(sandbox: Sandbox) {
    std::fs::create_dir_all(sandbox.cache()).expect("create cache");
    for name in ["yq-linux-amd64-v4.40.0", "yq-linux-amd64-v4.52.2", "yq-darwin-arm64-v4.40.0"] {
        std::fs::write(sandbox.cache().join(name), b"old").expect("seed old version");
    }
    sandbox.publish("v4.53.0", "yq_linux_amd64", BINARY);

    sandbox
        .provisioner(sandbox.builder().version("4.53.0").build())
        .resolve()
        .expect("upgrade succeeds");

    assert_eq!(
        file_names(&sandbox.cache()),
        vec!["yq-darwin-arm64-v4.40.0", "yq-linux-amd64-v4.53.0"]
    );
    assert_eq!(
        sandbox
            .observer
            .count(|event| matches!(event, ProvisionEvent::StaleVersionRemoved { .. })),
        2
    );
}

#[rstest]
fn asset_absent_from_manifest_fails_without_binary_request(sandbox: Sandbox) {
    sandbox.publish("v4.53.0", "yq_darwin_arm64", BINARY);

    let err = sandbox
        .provisioner(sandbox.builder().version("4.53.0").build())
        .resolve()
        .expect_err("no linux checksum");

    assert_eq!(err.kind(), BinaryNotFoundKind::DownloadFailed);
    assert!(err.message().contains("no checksum available for yq_linux_amd64"), "{err}");
    assert!(err.message().contains("write permissions"), "{err}");
    assert_eq!(sandbox.client.binary_requests(), 0);
}

#[rstest]
fn unwritable_primary_falls_back_to_package_directory(sandbox: Sandbox) {
    let blocker = sandbox.root.join("home");
    std::fs::write(&blocker, b"not a directory").expect("write blocker");
    sandbox.publish("v4.53.0", "yq_linux_amd64", BINARY);

    let path = sandbox
        .provisioner(sandbox.builder().version("4.53.0").build())
        .resolve()
        .expect("fallback storage works");

    assert_eq!(path, sandbox.root.join("pkg/binaries/yq-linux-amd64-v4.53.0"));
    assert_eq!(
        sandbox
            .observer
            .count(|event| matches!(event, ProvisionEvent::StorageRejected { .. })),
        1
    );
}

#[rstest]
fn windows_assets_use_exe_names(sandbox: Sandbox) {
    sandbox.publish("v4.53.0", "yq_windows_amd64.exe", BINARY);

    let path = sandbox
        .provisioner(
            sandbox
                .builder()
                .platform("windows", "x86_64")
                .version("4.53.0")
                .build(),
        )
        .resolve()
        .expect("windows asset downloads");

    assert_eq!(path.file_name(), Some("yq-windows-amd64-v4.53.0.exe"));
}

#[cfg(unix)]
#[rstest]
fn validate_runs_the_downloaded_binary(sandbox: Sandbox) {
    let script = b"#!/bin/sh\necho 'yq (https://github.com/mikefarah/yq/) version v4.53.0'\n";
    sandbox.publish("v4.53.0", "yq_linux_amd64", script);

    let validated = sandbox
        .provisioner(sandbox.builder().version("4.53.0").build())
        .validate()
        .expect("binary runs");

    assert_eq!(validated.path, sandbox.cache().join("yq-linux-amd64-v4.53.0"));
    assert_eq!(
        validated.version,
        "yq (https://github.com/mikefarah/yq/) version v4.53.0"
    );
}

#[cfg(unix)]
#[rstest]
fn validate_rejects_non_executable_override(sandbox: Sandbox) {
    let binary = sandbox.root.join("yq");
    std::fs::write(&binary, b"data").expect("write override");

    let err = sandbox
        .provisioner(sandbox.builder().binary_override(&binary).build())
        .validate()
        .expect_err("not executable");

    assert_eq!(err.kind(), BinaryNotFoundKind::ValidationFailed);
}

#[test]
fn install_hint_names_package_managers() {
    assert!(INSTALL_HINT.contains("brew install yq"));
}
