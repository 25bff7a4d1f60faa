//! Streaming tar+gzip extraction

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use super::{ArchiveExtractor, ExtractError, PendingLinks, sanitize, set_mode, write_file};

/// Extracts `.tgz` release archives, as published for Linux.
#[derive(Debug, Clone)]
pub struct TarGzExtractor {
    entry_point: PathBuf,
}

impl TarGzExtractor {
    /// `entry_point` is the managed executable relative to the archive root.
    pub fn new(entry_point: impl Into<PathBuf>) -> Self {
        Self {
            entry_point: entry_point.into(),
        }
    }
}

impl ArchiveExtractor for TarGzExtractor {
    fn entry_point(&self, dest: &Path) -> PathBuf {
        dest.join(&self.entry_point)
    }

    fn unpack(&self, source: &mut dyn Read, dest: &Path) -> Result<(), ExtractError> {
        extract_tar_stream(GzDecoder::new(source), dest)
    }
}

/// Extract an uncompressed tar stream under `dest` in one forward pass.
pub fn extract_tar_stream<R: Read>(reader: R, dest: &Path) -> Result<(), ExtractError> {
    let mut archive = Archive::new(reader);
    let mut links = PendingLinks::new(dest);

    let entries = archive
        .entries()
        .map_err(|e| ExtractError::io("error reading tar archive", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ExtractError::io("error reading tar archive", e))?;
        let name = entry
            .path()
            .map_err(|e| ExtractError::io("error reading tar entry name", e))?
            .into_owned();
        let label = name.display().to_string();
        let out_path = sanitize::entry_path(dest, &name)?;
        let header = entry.header();
        let mode = header.mode().ok();
        let entry_type = header.entry_type();

        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&out_path)
                    .map_err(|e| ExtractError::io(format!("error extracting {label}: failed to make directory"), e))?;
                if let Some(mode) = mode {
                    set_mode(&out_path, mode).map_err(|e| {
                        ExtractError::io(format!("error extracting {label}: failed to change permissions"), e)
                    })?;
                }
            }
            EntryType::Regular | EntryType::Continuous => {
                // includes pax size overrides, unlike the raw header field
                let declared = entry.size();
                write_file(&mut entry, &out_path, &label, declared)?;
                if let Some(mode) = mode {
                    set_mode(&out_path, mode).map_err(|e| {
                        ExtractError::io(format!("error extracting {label}: failed to change permissions"), e)
                    })?;
                }
            }
            EntryType::Link | EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(|e| ExtractError::io(format!("error extracting {label}: bad link name"), e))?
                    .ok_or_else(|| ExtractError::UnsafeLink {
                        entry: label.clone(),
                        target: String::new(),
                    })?
                    .into_owned();
                if entry_type == EntryType::Link {
                    links.hard(&name, &target)?;
                } else {
                    links.symbolic(&name, &target)?;
                }
            }
            // pax global headers carry metadata only
            EntryType::XGlobalHeader => {}
            other => {
                return Err(ExtractError::UnsupportedEntry {
                    entry: label,
                    kind: format!("{other:?}"),
                });
            }
        }
    }

    links.apply()
}
