//! Linux process table backed by procfs

use std::fs;
use std::io;
use std::path::PathBuf;

use super::{ProcessEntry, ProcessTable, unix_signal};

/// Process table read from `/proc`
///
/// Each process's executable is reported as the `/proc/<pid>/exe` link, which
/// the kernel resolves to the process image even after it was renamed.
#[derive(Debug, Clone)]
pub struct ProcfsTable {
    root: PathBuf,
}

impl Default for ProcfsTable {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl ProcfsTable {
    /// Read a procfs-shaped tree mounted somewhere other than `/proc`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ProcessTable for ProcfsTable {
    fn processes(&self) -> io::Result<Vec<ProcessEntry>> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            // A process can vanish between readdir calls
            let Ok(dirent) = dirent else { continue };
            let Some(pid) = dirent
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            entries.push(ProcessEntry {
                pid,
                executable: dirent.path().join("exe"),
            });
        }
        Ok(entries)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        unix_signal::terminate(pid)
    }

    fn is_ignorable(&self, err: &io::Error) -> bool {
        unix_signal::is_ignorable(err)
    }
}
