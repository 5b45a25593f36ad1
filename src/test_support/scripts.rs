//! Shell-script stand-ins for `yq` executables.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};

/// Writes an executable `/bin/sh` script named `name` into `dir`.
///
/// # Panics
///
/// Panics when the script cannot be written; intended for test setup only.
#[must_use]
#[expect(clippy::expect_used, reason = "test fixture setup fails loudly")]
pub fn write_script(dir: &Utf8Path, name: &str, body: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("mark script executable");
    path
}

/// Writes a `yq` script answering `--version` like `mikefarah/yq` at `version`.
///
/// Any other invocation prints a marker and succeeds.
#[must_use]
pub fn fake_yq(dir: &Utf8Path, version: &str) -> Utf8PathBuf {
    write_script(
        dir,
        "yq",
        &format!(
            "if [ \"$1\" = \"--version\" ]; then\n  \
             echo 'yq (https://github.com/mikefarah/yq/) version {version}'\n  \
             exit 0\nfi\necho fake-yq\n"
        ),
    )
}
