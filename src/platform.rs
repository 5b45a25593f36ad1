//! Platform detection and derived binary naming.

use std::fmt;

use crate::error::{ProvisionError, ProvisionResult};
use crate::version::ReleaseTag;

/// Operating systems with a published yq release asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Linux.
    Linux,
    /// macOS, named `darwin` in release assets.
    Darwin,
    /// Windows.
    Windows,
}

impl Os {
    /// Returns the name used in release assets and cached file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }

    fn from_runtime(os: &str) -> Option<Self> {
        match os.to_ascii_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "macos" | "darwin" => Some(Self::Darwin),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }
}

/// CPU architectures with a published yq release asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 64-bit x86.
    Amd64,
    /// 64-bit ARM.
    Arm64,
}

impl Arch {
    /// Returns the name used in release assets and cached file names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }

    fn from_runtime(arch: &str) -> Option<Self> {
        match arch.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Some(Self::Amd64),
            "aarch64" | "arm64" => Some(Self::Arm64),
            _ => None,
        }
    }
}

/// The `(os, arch)` pair a binary is provisioned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformTarget {
    /// Operating system.
    pub os: Os,
    /// Architecture.
    pub arch: Arch,
}

impl PlatformTarget {
    /// Maps runtime OS and architecture names onto a supported target.
    ///
    /// Accepts both Rust's `std::env::consts` spellings (`macos`, `x86_64`,
    /// `aarch64`) and the release asset spellings (`darwin`, `amd64`,
    /// `arm64`).
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::UnsupportedPlatform`] for any other value.
    pub fn from_runtime(os: &str, arch: &str) -> ProvisionResult<Self> {
        match (Os::from_runtime(os), Arch::from_runtime(arch)) {
            (Some(os_kind), Some(arch_kind)) => Ok(Self {
                os: os_kind,
                arch: arch_kind,
            }),
            _ => Err(ProvisionError::UnsupportedPlatform {
                os: os.to_owned(),
                arch: arch.to_owned(),
            }),
        }
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.as_str(), self.arch.as_str())
    }
}

/// File and asset names derived from a platform and release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryDescriptor {
    /// Platform prefix shared by every cached version (`yq-linux-amd64`).
    pub platform_prefix: String,
    /// Cached file name (`yq-linux-amd64-v4.52.2`, `.exe` on Windows).
    pub versioned_filename: String,
    /// Asset name in the release and its checksum manifest (`yq_linux_amd64`).
    pub remote_asset_name: String,
}

impl BinaryDescriptor {
    /// Derives the descriptor for `platform` at release `tag`.
    ///
    /// # Examples
    ///
    /// ```
    /// use yq_provision::{BinaryDescriptor, PlatformTarget, ReleaseTag};
    ///
    /// let platform = PlatformTarget::from_runtime("windows", "x86_64")?;
    /// let descriptor = BinaryDescriptor::new(platform, &ReleaseTag::pinned());
    /// assert_eq!(descriptor.versioned_filename, "yq-windows-amd64-v4.52.2.exe");
    /// assert_eq!(descriptor.remote_asset_name, "yq_windows_amd64.exe");
    /// # Ok::<(), yq_provision::ProvisionError>(())
    /// ```
    #[must_use]
    pub fn new(platform: PlatformTarget, tag: &ReleaseTag) -> Self {
        let os = platform.os.as_str();
        let arch = platform.arch.as_str();
        let platform_prefix = format!("yq-{os}-{arch}");
        let (versioned_filename, remote_asset_name) = match platform.os {
            Os::Windows => (
                format!("{platform_prefix}-{tag}.exe"),
                format!("yq_{os}_{arch}.exe"),
            ),
            Os::Linux | Os::Darwin => (
                format!("{platform_prefix}-{tag}"),
                format!("yq_{os}_{arch}"),
            ),
        };
        Self {
            platform_prefix,
            versioned_filename,
            remote_asset_name,
        }
    }
}
