//! File identity comparison
//!
//! Two paths name the same file when the underlying file object matches,
//! whatever the spelling: symlinks, relative paths, hard links and case
//! differences all resolve to one identity.

use std::io;
use std::path::Path;

/// Opaque identity of a file object on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    device: u64,
    index: u64,
}

impl FileIdentity {
    /// Identity of the file `path` refers to, following symlinks.
    #[cfg(unix)]
    pub fn of(path: &Path) -> io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            device: metadata.dev(),
            index: metadata.ino(),
        })
    }

    /// Identity of the file `path` refers to, following symlinks.
    #[cfg(windows)]
    pub fn of(path: &Path) -> io::Result<Self> {
        use std::os::windows::io::AsRawHandle;
        use windows::Win32::Foundation::HANDLE;
        use windows::Win32::Storage::FileSystem::{
            BY_HANDLE_FILE_INFORMATION, GetFileInformationByHandle,
        };

        let file = std::fs::File::open(path)?;
        let mut info = BY_HANDLE_FILE_INFORMATION::default();
        unsafe { GetFileInformationByHandle(HANDLE(file.as_raw_handle()), &mut info) }
            .map_err(|e| io::Error::from_raw_os_error(e.code().0 & 0xFFFF))?;

        Ok(Self {
            device: u64::from(info.dwVolumeSerialNumber),
            index: (u64::from(info.nFileIndexHigh) << 32) | u64::from(info.nFileIndexLow),
        })
    }

    #[cfg(not(any(unix, windows)))]
    pub fn of(_path: &Path) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "file identity is not available on this platform",
        ))
    }

    /// Whether `a` and `b` name the same file
    pub fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
        Ok(Self::of(a)? == Self::of(b)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hard_link_shares_identity() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("ollama");
        let alias = dir.path().join("alias");
        fs::write(&original, b"binary").unwrap();
        fs::hard_link(&original, &alias).unwrap();

        assert!(FileIdentity::same_file(&original, &alias).unwrap());
    }

    #[test]
    fn test_copies_differ() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("ollama");
        let copy = dir.path().join("copy");
        fs::write(&original, b"binary").unwrap();
        fs::copy(&original, &copy).unwrap();

        assert!(!FileIdentity::same_file(&original, &copy).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_and_relative_spellings_share_identity() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        let original = bin.join("ollama");
        fs::write(&original, b"binary").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&original, &link).unwrap();

        assert!(FileIdentity::same_file(&original, &link).unwrap());
        assert!(FileIdentity::same_file(&original, &bin.join("..").join("bin").join("ollama")).unwrap());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = FileIdentity::of(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
