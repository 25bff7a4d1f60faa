//! Fallback for targets without process introspection

use std::io;

use super::{ProcessEntry, ProcessTable};

#[derive(Debug, Clone, Default)]
pub struct UnsupportedTable;

fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "process introspection is not supported on this platform",
    )
}

impl ProcessTable for UnsupportedTable {
    fn processes(&self) -> io::Result<Vec<ProcessEntry>> {
        Err(unsupported())
    }

    fn terminate(&self, _pid: u32) -> io::Result<()> {
        Err(unsupported())
    }

    fn is_ignorable(&self, _err: &io::Error) -> bool {
        false
    }
}
