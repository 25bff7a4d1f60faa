//! macOS process table backed by libproc

use std::ffi::OsString;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use super::{ProcessEntry, ProcessTable, unix_signal};

/// `PROC_PIDPATHINFO_MAXSIZE` from `<sys/proc_info.h>`
const PIDPATH_MAX: usize = 4 * libc::PATH_MAX as usize;

/// Process table read through `proc_listallpids` and `proc_pidpath`
#[derive(Debug, Clone, Default)]
pub struct LibprocTable;

impl LibprocTable {
    fn all_pids() -> io::Result<Vec<libc::pid_t>> {
        // A null buffer asks for the current process count
        let count = unsafe { libc::proc_listallpids(std::ptr::null_mut(), 0) };
        if count < 0 {
            return Err(io::Error::last_os_error());
        }

        // Leave headroom for processes spawned between the two calls
        let mut capacity = count as usize + 64;
        loop {
            let mut pids: Vec<libc::pid_t> = vec![0; capacity];
            let bytes = (capacity * std::mem::size_of::<libc::pid_t>()) as libc::c_int;
            let filled = unsafe { libc::proc_listallpids(pids.as_mut_ptr().cast(), bytes) };
            if filled < 0 {
                return Err(io::Error::last_os_error());
            }
            let filled = filled as usize;
            if filled < capacity {
                pids.truncate(filled);
                return Ok(pids);
            }
            capacity *= 2;
        }
    }

    fn executable_of(pid: libc::pid_t) -> Option<PathBuf> {
        let mut buf = vec![0u8; PIDPATH_MAX];
        let len = unsafe { libc::proc_pidpath(pid, buf.as_mut_ptr().cast(), buf.len() as u32) };
        if len <= 0 {
            return None;
        }
        buf.truncate(len as usize);
        Some(PathBuf::from(OsString::from_vec(buf)))
    }
}

impl ProcessTable for LibprocTable {
    fn processes(&self) -> io::Result<Vec<ProcessEntry>> {
        Ok(Self::all_pids()?
            .into_iter()
            .filter(|&pid| pid > 0)
            .filter_map(|pid| {
                Self::executable_of(pid).map(|executable| ProcessEntry {
                    pid: pid as u32,
                    executable,
                })
            })
            .collect())
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        unix_signal::terminate(pid)
    }

    fn is_ignorable(&self, err: &io::Error) -> bool {
        unix_signal::is_ignorable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_this_process_with_its_executable() {
        let entries = LibprocTable.processes().unwrap();
        let me = entries
            .iter()
            .find(|e| e.pid == std::process::id())
            .expect("current process listed");
        let exe = std::env::current_exe().unwrap();
        assert!(crate::control::FileIdentity::same_file(&me.executable, &exe).unwrap());
    }
}
