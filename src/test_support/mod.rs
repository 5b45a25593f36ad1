//! Helpers re-exported for unit and integration tests.
//!
//! [`FakeReleaseClient`] stands in for the release host, [`RecordingObserver`]
//! captures provisioning events, and the script helpers fabricate `yq`
//! executables for probe scenarios. None of these touch the network.

mod fake_client;
mod logging;
mod observer;
mod scripts;

pub use fake_client::FakeReleaseClient;
pub use logging::capture_logs;
pub use observer::RecordingObserver;
#[cfg(unix)]
pub use scripts::{fake_yq, write_script};
