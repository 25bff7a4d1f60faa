//! Entry name validation
//!
//! Every archive entry and link target is normalised lexically before it
//! touches the filesystem. Nothing here consults the disk, so a symlink
//! created by the archive can never influence where a later entry lands.

use std::path::{Component, Path, PathBuf};

use super::ExtractError;

/// Normalise a relative path, rejecting anything that leaves its base.
///
/// `.` components are dropped and `..` pops the previous component, so `./`
/// normalises to the base itself (an empty path). Returns `None` for an empty
/// name, absolute paths, drive prefixes, or a `..` with nothing left to pop.
pub fn normalize_relative(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.into_iter().collect())
}

/// Resolve an archive entry name to its location under `root`.
pub fn entry_path(root: &Path, name: &Path) -> Result<PathBuf, ExtractError> {
    normalize_relative(name)
        .map(|relative| rooted(root, &relative))
        .ok_or_else(|| ExtractError::UnsafePath {
            entry: name.display().to_string(),
        })
}

/// Validate a hard link target, which tar records relative to the archive root.
pub fn hard_link_target(root: &Path, entry: &Path, target: &Path) -> Result<PathBuf, ExtractError> {
    normalize_relative(target)
        .map(|relative| rooted(root, &relative))
        .ok_or_else(|| ExtractError::UnsafeLink {
            entry: entry.display().to_string(),
            target: target.display().to_string(),
        })
}

fn rooted(root: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// Validate a symbolic link target, which is relative to the link's own directory.
///
/// `..` is only accepted as a leading component: after a named component the
/// kernel resolves it against wherever that name points, which a lexical check
/// cannot follow. The target is returned unchanged so the link stays relative
/// on disk.
pub fn symlink_target(entry: &Path, target: &Path) -> Result<PathBuf, ExtractError> {
    let unsafe_link = || ExtractError::UnsafeLink {
        entry: entry.display().to_string(),
        target: target.display().to_string(),
    };

    if target.as_os_str().is_empty() || target.has_root() || !parent_dirs_lead(target) {
        return Err(unsafe_link());
    }
    let link = normalize_relative(entry).ok_or_else(unsafe_link)?;
    let parent = link.parent().unwrap_or_else(|| Path::new(""));
    normalize_relative(&parent.join(target)).ok_or_else(unsafe_link)?;
    Ok(target.to_path_buf())
}

fn parent_dirs_lead(path: &Path) -> bool {
    let mut named = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => named = true,
            Component::ParentDir if named => return false,
            _ => {}
        }
    }
    true
}

/// Whether `target`, resolved from the already canonical directory `dir`,
/// stays under the canonical `root`.
pub fn confined(root: &Path, dir: &Path, target: &Path) -> bool {
    match dir.strip_prefix(root) {
        Ok(relative) => normalize_relative(&relative.join(target)).is_some(),
        Err(_) => false,
    }
}
