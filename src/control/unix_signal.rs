//! SIGTERM delivery shared by the unix process tables

use std::io;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Send SIGTERM to `pid`
///
/// Pid 0 and values outside `pid_t` would address process groups, so they
/// fail with EINVAL instead of reaching `kill`.
pub fn terminate(pid: u32) -> io::Result<()> {
    let raw = i32::try_from(pid)
        .ok()
        .filter(|&raw| raw > 0)
        .ok_or_else(|| io::Error::from_raw_os_error(Errno::EINVAL as i32))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(io::Error::from)
}

/// ESRCH and EINVAL both mean there is nothing left to signal
pub fn is_ignorable(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == Errno::ESRCH as i32 || code == Errno::EINVAL as i32
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_process_is_ignorable() {
        assert!(is_ignorable(&io::Error::from_raw_os_error(Errno::ESRCH as i32)));
        assert!(is_ignorable(&io::Error::from_raw_os_error(Errno::EINVAL as i32)));
        assert!(!is_ignorable(&io::Error::from_raw_os_error(Errno::EPERM as i32)));
        assert!(!is_ignorable(&io::Error::other("boom")));
    }

    #[test]
    fn test_out_of_range_pid_is_ignorable() {
        let err = terminate(u32::MAX).unwrap_err();
        assert!(is_ignorable(&err));
    }
}
