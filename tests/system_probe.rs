//! Selection of a system-installed `yq` from the search path.
#![cfg(unix)]

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use yq_provision::test_support::{FakeReleaseClient, RecordingObserver, fake_yq, write_script};
use yq_provision::{
    BinaryProvisioner, ProvisionConfig, ProvisionEvent, ProvisionObserver, RejectReason,
};

const BASE_URL: &str = "https://releases.test/mikefarah/yq";

struct Host {
    _temp: TempDir,
    root: Utf8PathBuf,
    client: Arc<FakeReleaseClient>,
    observer: Arc<RecordingObserver>,
}

impl Host {
    fn bin_dir(&self, name: &str) -> Utf8PathBuf {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir).expect("create bin dir");
        dir
    }

    fn resolve_with_path(&self, entries: &[&Utf8PathBuf]) -> Utf8PathBuf {
        let search_path = std::env::join_paths(entries.iter().map(|dir| dir.as_std_path()))
            .expect("join search path");
        self.provisioner(Some(search_path))
            .resolve()
            .expect("resolution succeeds")
    }

    fn provisioner(&self, search_path: Option<OsString>) -> BinaryProvisioner {
        let config = ProvisionConfig::builder()
            .platform("linux", "x86_64")
            .version("4.53.0")
            .release_base_url(BASE_URL)
            .primary_dir(Some(self.root.join("cache")))
            .fallback_dir(self.root.join("fallback"))
            .search_path(search_path)
            .build();
        BinaryProvisioner::with_client(config, Box::new(Arc::clone(&self.client)))
            .with_observer(Arc::clone(&self.observer) as Arc<dyn ProvisionObserver>)
    }

    fn rejections(&self) -> Vec<RejectReason> {
        self.observer
            .events()
            .into_iter()
            .filter_map(|event| match event {
                ProvisionEvent::SystemBinaryRejected { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }
}

#[fixture]
fn host() -> Host {
    let temp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 tempdir");
    let client = Arc::new(FakeReleaseClient::default());
    client.publish_release(BASE_URL, "v4.53.0", "yq_linux_amd64", b"downloaded yq");
    Host {
        _temp: temp,
        root,
        client,
        observer: Arc::new(RecordingObserver::default()),
    }
}

#[rstest]
#[case("v4.53.0")]
#[case("v4.53.2")]
#[case("v5.0.0")]
fn qualifying_system_binary_is_used_without_network(host: Host, #[case] version: &str) {
    let bin = host.bin_dir("usr-bin");
    let system_yq = fake_yq(&bin, version);

    let path = host.resolve_with_path(&[&bin]);

    assert_eq!(path, system_yq);
    assert_eq!(host.client.total_requests(), 0);
    assert!(host.observer.events().contains(&ProvisionEvent::SystemBinarySelected {
        path: system_yq,
        version: version.to_owned(),
    }));
}

#[rstest]
fn outdated_system_binary_falls_through_to_download(host: Host) {
    let bin = host.bin_dir("usr-bin");
    let _stale = fake_yq(&bin, "v4.30.8");

    let path = host.resolve_with_path(&[&bin]);

    assert_eq!(path, host.root.join("cache/yq-linux-amd64-v4.53.0"));
    assert_eq!(host.client.binary_requests(), 1);
    assert_eq!(
        host.rejections(),
        vec![RejectReason::TooOld {
            found: "v4.30.8".to_owned(),
            required: "v4.53.0".to_owned(),
        }]
    );
}

#[rstest]
fn python_yq_wrapper_is_rejected(host: Host) {
    let bin = host.bin_dir("usr-bin");
    let _wrapper = write_script(&bin, "yq", "echo 'yq 3.4.3'\n");

    let path = host.resolve_with_path(&[&bin]);

    assert_eq!(path, host.root.join("cache/yq-linux-amd64-v4.53.0"));
    assert_eq!(host.rejections(), vec![RejectReason::WrongFlavour]);
}

#[rstest]
fn non_executable_candidate_is_skipped(host: Host) {
    let bin = host.bin_dir("usr-bin");
    std::fs::write(bin.join("yq"), b"plain data").expect("write candidate");

    let path = host.resolve_with_path(&[&bin]);

    assert_eq!(path, host.root.join("cache/yq-linux-amd64-v4.53.0"));
    assert!(host.rejections().is_empty());
}

#[rstest]
fn only_the_first_search_path_match_is_considered(host: Host) {
    let first = host.bin_dir("first");
    let second = host.bin_dir("second");
    let _old = fake_yq(&first, "v4.10.0");
    let _new = fake_yq(&second, "v4.60.0");

    let path = host.resolve_with_path(&[&first, &second]);

    assert_eq!(path, host.root.join("cache/yq-linux-amd64-v4.53.0"));
    assert_eq!(host.rejections().len(), 1);
}

#[rstest]
fn cached_binary_takes_precedence_over_system_binary(host: Host) {
    let cache = host.bin_dir("cache");
    let cached = cache.join("yq-linux-amd64-v4.53.0");
    std::fs::write(&cached, b"cached").expect("seed cache");
    let bin = host.bin_dir("usr-bin");
    let _system = fake_yq(&bin, "v4.60.0");

    let path = host.resolve_with_path(&[&bin]);

    assert_eq!(path, cached);
    assert!(host.rejections().is_empty());
    assert_eq!(host.client.total_requests(), 0);
}
