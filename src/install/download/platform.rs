//! Platform detection for release asset and layout selection

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use once_cell::sync::OnceCell;

use super::extract::{ArchiveExtractor, ExecutableWriter, TarGzExtractor, ZipExtractor};

/// Name of the managed binary (and of the default install directory).
pub const BINARY_NAME: &str = "ollama";

/// Platform tag selecting asset, payload format and on-disk layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    LinuxAmd64,   // tarball with bin/ and lib/
    LinuxArm64,   // tarball with bin/ and lib/
    Darwin,       // universal binary, shipped bare
    WindowsAmd64, // zip with ollama.exe at the root
    WindowsArm64, // zip with ollama.exe at the root
}

/// How the release asset is packaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    TarGz,
    Zip,
    Executable,
}

/// Global cache for platform detection (initialized once, used everywhere)
static PLATFORM_CACHE: OnceCell<Platform> = OnceCell::new();

impl Platform {
    /// Detect current platform (cached after first call)
    pub fn detect() -> Result<Self> {
        PLATFORM_CACHE
            .get_or_try_init(|| Self::from_target(std::env::consts::OS, std::env::consts::ARCH))
            .copied()
    }

    /// Map an OS/architecture pair to a platform tag
    pub fn from_target(os: &str, arch: &str) -> Result<Self> {
        match (os, arch) {
            ("linux", "x86_64") => Ok(Platform::LinuxAmd64),
            ("linux", "aarch64") => Ok(Platform::LinuxArm64),
            ("linux", arch) => Err(anyhow!("Unsupported Linux architecture: {}", arch)),
            ("macos", "aarch64" | "x86_64") => Ok(Platform::Darwin),
            ("windows", "x86_64") => Ok(Platform::WindowsAmd64),
            ("windows", "aarch64") => Ok(Platform::WindowsArm64),
            (os, arch) => Err(anyhow!("Unsupported platform: {} {}", os, arch)),
        }
    }

    /// Release asset published for this platform
    pub fn asset_name(&self) -> &'static str {
        match self {
            Platform::LinuxAmd64 => "ollama-linux-amd64.tgz",
            Platform::LinuxArm64 => "ollama-linux-arm64.tgz",
            Platform::Darwin => "ollama-darwin",
            Platform::WindowsAmd64 => "ollama-windows-amd64.zip",
            Platform::WindowsArm64 => "ollama-windows-arm64.zip",
        }
    }

    pub fn package_format(&self) -> PackageFormat {
        match self {
            Platform::LinuxAmd64 | Platform::LinuxArm64 => PackageFormat::TarGz,
            Platform::Darwin => PackageFormat::Executable,
            Platform::WindowsAmd64 | Platform::WindowsArm64 => PackageFormat::Zip,
        }
    }

    /// Managed executable relative to the install location.
    ///
    /// Empty on macOS, where the install location is the executable.
    fn entry_point(&self) -> PathBuf {
        match self.package_format() {
            PackageFormat::TarGz => Path::new("bin").join(BINARY_NAME),
            PackageFormat::Zip => PathBuf::from(format!("{BINARY_NAME}.exe")),
            PackageFormat::Executable => PathBuf::new(),
        }
    }

    /// Path of the managed executable for an install location
    pub fn executable_in(&self, location: &Path) -> PathBuf {
        match self.package_format() {
            PackageFormat::Executable => location.to_path_buf(),
            _ => location.join(self.entry_point()),
        }
    }

    /// Extractor for this platform's asset.
    ///
    /// `content_length` only matters for bare executables, where it is the
    /// one integrity signal available.
    pub fn extractor(&self, content_length: Option<u64>) -> Box<dyn ArchiveExtractor + Send> {
        match self.package_format() {
            PackageFormat::TarGz => Box::new(TarGzExtractor::new(self.entry_point())),
            PackageFormat::Zip => Box::new(ZipExtractor::new(self.entry_point())),
            PackageFormat::Executable => Box::new(ExecutableWriter::new(content_length)),
        }
    }

    /// Installs made outside this tool, searched after the managed location
    pub fn external_candidates(&self) -> Vec<PathBuf> {
        match self {
            Platform::LinuxAmd64 | Platform::LinuxArm64 => {
                vec![PathBuf::from("/usr/local/bin").join(BINARY_NAME)]
            }
            Platform::Darwin => {
                let mut candidates = vec![
                    PathBuf::from("/usr/local/bin").join(BINARY_NAME),
                    PathBuf::from("/Applications/Ollama.app/Contents/Resources/ollama"),
                ];
                if let Some(home) = dirs::home_dir() {
                    candidates.push(home.join("Applications/Ollama.app/Contents/Resources/ollama"));
                }
                candidates
            }
            Platform::WindowsAmd64 | Platform::WindowsArm64 => {
                // Ollama's own setup installs per-user into UserProgramFiles
                dirs::data_local_dir()
                    .map(|local| local.join("Programs").join("Ollama").join(format!("{BINARY_NAME}.exe")))
                    .into_iter()
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_target() {
        assert_eq!(Platform::from_target("linux", "x86_64").unwrap(), Platform::LinuxAmd64);
        assert_eq!(Platform::from_target("linux", "aarch64").unwrap(), Platform::LinuxArm64);
        assert_eq!(Platform::from_target("macos", "aarch64").unwrap(), Platform::Darwin);
        assert_eq!(Platform::from_target("windows", "x86_64").unwrap(), Platform::WindowsAmd64);
        assert!(Platform::from_target("linux", "riscv64").is_err());
        assert!(Platform::from_target("freebsd", "x86_64").is_err());
    }

    #[test]
    fn test_asset_names_match_release_convention() {
        assert_eq!(Platform::LinuxAmd64.asset_name(), "ollama-linux-amd64.tgz");
        assert_eq!(Platform::LinuxArm64.asset_name(), "ollama-linux-arm64.tgz");
        assert_eq!(Platform::Darwin.asset_name(), "ollama-darwin");
        assert_eq!(Platform::WindowsAmd64.asset_name(), "ollama-windows-amd64.zip");
    }

    #[test]
    fn test_executable_layout() {
        let location = Path::new("/opt/ollama");
        assert_eq!(
            Platform::LinuxAmd64.executable_in(location),
            location.join("bin").join("ollama")
        );
        assert_eq!(
            Platform::WindowsAmd64.executable_in(location),
            location.join("ollama.exe")
        );
        assert_eq!(Platform::Darwin.executable_in(location), location);
    }

    #[test]
    fn test_extractor_entry_point_matches_layout() {
        let location = Path::new("/opt/ollama");
        for platform in [Platform::LinuxAmd64, Platform::Darwin, Platform::WindowsArm64] {
            assert_eq!(
                platform.extractor(None).entry_point(location),
                platform.executable_in(location)
            );
        }
    }
}
