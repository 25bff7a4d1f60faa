//! Windows process table using the process status (PSAPI) and threading APIs

use std::ffi::OsString;
use std::io;
use std::os::windows::ffi::OsStringExt;
use std::path::PathBuf;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::ProcessStatus::EnumProcesses;
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_ACCESS_RIGHTS, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
    PROCESS_TERMINATE, QueryFullProcessImageNameW, TerminateProcess,
};
use windows::core::PWSTR;

use super::{ProcessEntry, ProcessTable};

const ERROR_INVALID_PARAMETER: i32 = 87;
const ERROR_INSUFFICIENT_BUFFER: i32 = 122;

/// Win32 error code carried by a `windows` error
fn to_io(err: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(err.code().0 & 0xFFFF)
}

/// RAII wrapper for a process HANDLE
struct ProcessHandle(HANDLE);

impl ProcessHandle {
    fn open(access: PROCESS_ACCESS_RIGHTS, pid: u32) -> io::Result<Self> {
        let handle = unsafe { OpenProcess(access, false, pid) }.map_err(to_io)?;
        Ok(ProcessHandle(handle))
    }

    fn handle(&self) -> HANDLE {
        self.0
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// Process table read through `EnumProcesses`
#[derive(Debug, Clone, Default)]
pub struct PsapiTable;

impl PsapiTable {
    fn all_pids() -> io::Result<Vec<u32>> {
        let mut capacity = 4096usize;
        loop {
            let mut pids = vec![0u32; capacity];
            let mut needed = 0u32;
            let bytes = (capacity * std::mem::size_of::<u32>()) as u32;
            unsafe { EnumProcesses(pids.as_mut_ptr(), bytes, &mut needed) }.map_err(to_io)?;

            // A full buffer may have been truncated
            if needed < bytes {
                pids.truncate(needed as usize / std::mem::size_of::<u32>());
                return Ok(pids);
            }
            capacity *= 2;
        }
    }

    fn executable_of(pid: u32) -> io::Result<PathBuf> {
        let process = ProcessHandle::open(PROCESS_QUERY_LIMITED_INFORMATION, pid)?;
        let mut buf = vec![0u16; 1024];
        loop {
            let mut size = buf.len() as u32;
            let result = unsafe {
                QueryFullProcessImageNameW(
                    process.handle(),
                    PROCESS_NAME_WIN32,
                    PWSTR(buf.as_mut_ptr()),
                    &mut size,
                )
            };
            match result.map_err(to_io) {
                Ok(()) => {
                    buf.truncate(size as usize);
                    return Ok(PathBuf::from(OsString::from_wide(&buf)));
                }
                Err(e) if e.raw_os_error() == Some(ERROR_INSUFFICIENT_BUFFER) => {
                    let doubled = buf.len() * 2;
                    buf.resize(doubled, 0);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl ProcessTable for PsapiTable {
    fn processes(&self) -> io::Result<Vec<ProcessEntry>> {
        Ok(Self::all_pids()?
            .into_iter()
            // System idle process
            .filter(|&pid| pid != 0)
            .filter_map(|pid| {
                Self::executable_of(pid)
                    .ok()
                    .map(|executable| ProcessEntry { pid, executable })
            })
            .collect())
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        let process = ProcessHandle::open(PROCESS_TERMINATE, pid)?;
        unsafe { TerminateProcess(process.handle(), 0) }.map_err(to_io)
    }

    fn is_ignorable(&self, err: &io::Error) -> bool {
        err.raw_os_error() == Some(ERROR_INVALID_PARAMETER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_this_process_with_its_executable() {
        let entries = PsapiTable.processes().unwrap();
        let me = entries
            .iter()
            .find(|e| e.pid == std::process::id())
            .expect("current process listed");
        let exe = std::env::current_exe().unwrap();
        assert!(crate::control::FileIdentity::same_file(&me.executable, &exe).unwrap());
    }

    #[test]
    fn test_missing_process_is_ignorable() {
        // Pids are multiples of four, so this one never exists
        let err = PsapiTable.terminate(3).unwrap_err();
        assert!(PsapiTable.is_ignorable(&err));
    }
}
