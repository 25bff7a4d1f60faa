//! Release payload extraction
//!
//! Turns a downloaded byte stream into the managed executable on disk:
//! - `tar_gz` - Linux tarballs (`bin/ollama` plus supporting libraries)
//! - `zip_archive` - Windows zip archives (`ollama.exe` plus DLLs)
//! - `executable` - macOS, where the release asset is the binary itself
//!
//! Every format reads its input in a single forward pass. Archive formats
//! stream entries into place and collect hard and symbolic links; the links
//! are created only after the whole stream has been consumed, because an
//! archive may name a link before its target.

mod executable;
pub mod sanitize;
mod tar_gz;
mod zip_archive;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, warn};

pub use executable::ExecutableWriter;
pub use tar_gz::{TarGzExtractor, extract_tar_stream};
pub use zip_archive::ZipExtractor;

/// Integrity and I/O failures raised while materialising a release payload.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("archive entry {entry} resolves outside the install directory")]
    UnsafePath { entry: String },

    #[error("link {entry} points to {target}, outside the install directory")]
    UnsafeLink { entry: String, target: String },

    #[error("archive entry {entry} truncated: extracted {written} of {declared} bytes")]
    Truncated {
        entry: String,
        written: u64,
        declared: u64,
    },

    #[error("archive entry {entry} has unsupported type {kind}")]
    UnsupportedEntry { entry: String, kind: String },

    #[error("could not create link {entry}: {source}")]
    Link {
        entry: String,
        #[source]
        source: io::Error,
    },

    #[error("entry point {} missing after extraction", .0.display())]
    MissingEntryPoint(PathBuf),

    #[error("archive entry {entry} does not match its recorded checksum or size")]
    Corrupt { entry: String },

    #[error("malformed zip archive: {0}")]
    MalformedZip(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        ExtractError::Io {
            context: context.into(),
            source,
        }
    }
}

/// A payload format that can materialise the managed executable.
///
/// Implementations provide the format-specific forward pass; the shared
/// `extract` sequence handles the "already installed" short circuit and
/// removal of partial output on failure.
pub trait ArchiveExtractor {
    /// Where the managed executable lives once `dest` has been populated.
    fn entry_point(&self, dest: &Path) -> PathBuf;

    /// Consume `source` once, writing the payload under `dest`.
    fn unpack(&self, source: &mut dyn Read, dest: &Path) -> Result<(), ExtractError>;

    /// Materialise the payload and return the path of the managed executable.
    ///
    /// If the entry point already exists nothing is read. On any failure `dest`
    /// is removed before the error is returned.
    fn extract(&self, source: &mut dyn Read, dest: &Path) -> Result<PathBuf, ExtractError> {
        let entry_point = self.entry_point(dest);
        match fs::symlink_metadata(&entry_point) {
            Ok(_) => {
                debug!("{} already present, skipping extraction", entry_point.display());
                return Ok(entry_point);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ExtractError::io(
                    format!("failed to check {}", entry_point.display()),
                    e,
                ));
            }
        }

        let guard = RemoveOnFailure::new(dest);
        self.unpack(source, dest)?;
        if !entry_point.exists() {
            return Err(ExtractError::MissingEntryPoint(entry_point));
        }
        guard.disarm();
        Ok(entry_point)
    }
}

/// RAII guard removing a partially written install unless disarmed.
///
/// Removes whole directory trees as well as single files, so it covers both
/// archive layouts and the single-executable layout.
struct RemoveOnFailure<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> RemoveOnFailure<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RemoveOnFailure<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = remove_path(self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("Failed to clean up {}: {}", self.path.display(), e);
        }
    }
}

/// Remove a file, symlink or directory tree.
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    Hard,
    Symbolic,
}

/// A link entry seen during the streaming pass, already validated.
#[derive(Debug)]
struct PendingLink {
    entry: String,
    kind: LinkKind,
    /// Absolute location of the link itself.
    path: PathBuf,
    /// Absolute source for hard links; the verbatim relative target for symlinks.
    target: PathBuf,
}

/// Links collected in phase one, created in encounter order in phase two.
#[derive(Debug)]
pub(crate) struct PendingLinks {
    root: PathBuf,
    links: Vec<PendingLink>,
}

impl PendingLinks {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            links: Vec::new(),
        }
    }

    pub(crate) fn hard(&mut self, entry: &Path, target: &Path) -> Result<(), ExtractError> {
        let path = sanitize::entry_path(&self.root, entry)?;
        let target = sanitize::hard_link_target(&self.root, entry, target)?;
        self.links.push(PendingLink {
            entry: entry.display().to_string(),
            kind: LinkKind::Hard,
            path,
            target,
        });
        Ok(())
    }

    pub(crate) fn symbolic(&mut self, entry: &Path, target: &Path) -> Result<(), ExtractError> {
        let path = sanitize::entry_path(&self.root, entry)?;
        let target = sanitize::symlink_target(entry, target)?;
        self.links.push(PendingLink {
            entry: entry.display().to_string(),
            kind: LinkKind::Symbolic,
            path,
            target,
        });
        Ok(())
    }

    /// Phase two: create every link against the fully extracted tree.
    ///
    /// Earlier links may have turned a directory name into a symlink, so each
    /// link's directory is re-checked on disk before the link is created.
    pub(crate) fn apply(self) -> Result<(), ExtractError> {
        if self.links.is_empty() {
            return Ok(());
        }
        let root = fs::canonicalize(&self.root)
            .map_err(|e| ExtractError::io(format!("failed to resolve {}", self.root.display()), e))?;

        for link in self.links {
            let link_error = |source| ExtractError::Link {
                entry: link.entry.clone(),
                source,
            };
            ensure_parent(&link.path).map_err(link_error)?;
            let dir = match link.path.parent() {
                Some(parent) => fs::canonicalize(parent).map_err(link_error)?,
                None => root.clone(),
            };
            let confined = dir.starts_with(&root)
                && (link.kind == LinkKind::Hard || sanitize::confined(&root, &dir, &link.target));
            if !confined {
                return Err(ExtractError::UnsafeLink {
                    entry: link.entry,
                    target: link.target.display().to_string(),
                });
            }

            let result = match link.kind {
                LinkKind::Hard => fs::hard_link(&link.target, &link.path),
                LinkKind::Symbolic => create_symlink(&link.target, &link.path),
            };
            result.map_err(link_error)?;
        }
        Ok(())
    }
}

pub(crate) fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

/// Apply archive mode bits, dropping setuid, setgid and sticky.
#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Copy one regular file entry, failing if the stream ends early.
pub(crate) fn write_file(
    reader: &mut dyn Read,
    path: &Path,
    entry: &str,
    declared: u64,
) -> Result<(), ExtractError> {
    ensure_parent(path)
        .map_err(|e| ExtractError::io(format!("failed to create parent of {entry}"), e))?;
    let mut file = fs::File::create(path)
        .map_err(|e| ExtractError::io(format!("failed to create {entry}"), e))?;
    let written = io::copy(&mut reader.take(declared), &mut file)
        .map_err(|e| ExtractError::io(format!("failed to copy {entry}"), e))?;
    if written < declared {
        return Err(ExtractError::Truncated {
            entry: entry.to_string(),
            written,
            declared,
        });
    }
    Ok(())
}
