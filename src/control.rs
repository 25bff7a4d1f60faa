//! Process identity - finding and stopping running instances of a binary
//!
//! A running instance is any process whose backing executable is the same
//! file as the managed executable. Each OS exposes the process-to-executable
//! mapping differently, so the raw introspection lives in one adapter per OS:
//! - Linux: `/proc/<pid>/exe`
//! - macOS: `proc_listallpids` + `proc_pidpath`
//! - Windows: `EnumProcesses` + `QueryFullProcessImageNameW`
//!
//! Matching and termination are shared and only see clean `(pid, path)` pairs.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

mod identity;

pub use identity::FileIdentity;

#[cfg(unix)]
mod unix_signal;

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        mod macos_control;
        pub use macos_control::LibprocTable as NativeProcessTable;
    } else if #[cfg(target_os = "linux")] {
        mod linux_control;
        pub use linux_control::ProcfsTable as NativeProcessTable;
    } else if #[cfg(target_os = "windows")] {
        mod windows_control;
        pub use windows_control::PsapiTable as NativeProcessTable;
    } else {
        mod unsupported_control;
        pub use unsupported_control::UnsupportedTable as NativeProcessTable;
    }
}

/// One live process and the executable backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// A path that resolves to the process image. On Linux this is the
    /// `/proc/<pid>/exe` link itself rather than its textual target.
    pub executable: PathBuf,
}

/// OS process table adapter.
pub trait ProcessTable {
    /// Enumerate every visible process.
    ///
    /// Only a failure of the enumeration primitive itself is an error;
    /// processes whose executable cannot be read are left out.
    fn processes(&self) -> io::Result<Vec<ProcessEntry>>;

    /// Request graceful termination of `pid`.
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Whether a `terminate` error only means the process is already gone.
    fn is_ignorable(&self, err: &io::Error) -> bool;
}

impl<T: ProcessTable + ?Sized> ProcessTable for &T {
    fn processes(&self) -> io::Result<Vec<ProcessEntry>> {
        (**self).processes()
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        (**self).terminate(pid)
    }

    fn is_ignorable(&self, err: &io::Error) -> bool {
        (**self).is_ignorable(err)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to get executable info for {}: {source}", path.display())]
    Target {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to list processes: {0}")]
    Enumerate(#[source] io::Error),

    #[error("failed to terminate pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

/// Processes found running the target executable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminateReport {
    /// Every matching pid, signalled or already gone
    pub matched: Vec<u32>,
}

/// Running instances of `target`, by file identity.
///
/// An absent target has no instances.
pub fn find_instances<T: ProcessTable>(table: &T, target: &Path) -> Result<Vec<u32>, ProcessError> {
    let target_id = match FileIdentity::of(target) {
        Ok(id) => id,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ProcessError::Target {
                path: target.to_path_buf(),
                source,
            });
        }
    };

    let processes = table.processes().map_err(ProcessError::Enumerate)?;
    let mut matched = Vec::new();
    for process in processes {
        match FileIdentity::of(&process.executable) {
            Ok(id) if id == target_id => matched.push(process.pid),
            Ok(_) => {}
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) => {}
            Err(e) => debug!(
                "Failed to get executable of process {} ({}): {}",
                process.pid,
                process.executable.display(),
                e
            ),
        }
    }
    Ok(matched)
}

/// Gracefully terminate every running instance of `target`.
///
/// Every match is signalled even if an earlier one failed; the first failure
/// that does not just mean "already exited" is then returned.
pub fn terminate_instances<T: ProcessTable>(
    table: &T,
    target: &Path,
) -> Result<TerminateReport, ProcessError> {
    let matched = find_instances(table, target)?;
    let mut first_failure = None;

    for &pid in &matched {
        match table.terminate(pid) {
            Ok(()) => info!("Terminated process {}", pid),
            Err(e) if table.is_ignorable(&e) => debug!("Process {} already exited: {}", pid, e),
            Err(e) => {
                warn!("Failed to terminate pid {}: {}", pid, e);
                first_failure.get_or_insert(ProcessError::Signal { pid, source: e });
            }
        }
    }

    match first_failure {
        Some(err) => Err(err),
        None => Ok(TerminateReport { matched }),
    }
}
