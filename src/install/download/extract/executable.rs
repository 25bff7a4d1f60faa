//! Single-binary release assets (macOS)

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use super::{ArchiveExtractor, ExtractError, ensure_parent, set_mode, write_file};

/// Writes a release asset that is the executable itself.
///
/// `dest` is the executable path, not a directory.
#[derive(Debug, Clone, Default)]
pub struct ExecutableWriter {
    expected_len: Option<u64>,
}

impl ExecutableWriter {
    /// `expected_len` is the advertised download size, when the server sent one.
    pub fn new(expected_len: Option<u64>) -> Self {
        Self { expected_len }
    }
}

impl ArchiveExtractor for ExecutableWriter {
    fn entry_point(&self, dest: &Path) -> PathBuf {
        dest.to_path_buf()
    }

    fn unpack(&self, source: &mut dyn Read, dest: &Path) -> Result<(), ExtractError> {
        let label = dest.display().to_string();
        match self.expected_len {
            Some(declared) => write_file(source, dest, &label, declared)?,
            None => {
                ensure_parent(dest)
                    .map_err(|e| ExtractError::io("failed to create executable directory", e))?;
                let mut file = fs::File::create(dest)
                    .map_err(|e| ExtractError::io("failed to create executable", e))?;
                io::copy(source, &mut file)
                    .map_err(|e| ExtractError::io(format!("failed to write {label}"), e))?;
            }
        }
        set_mode(dest, 0o755)
            .map_err(|e| ExtractError::io(format!("failed to change {label} file mode"), e))
    }
}
