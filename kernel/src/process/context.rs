//! Execution context
//!
//! A `Process` is everything the kernel keeps for one user program: its
//! address space, open files and lifecycle record. The context is passed
//! explicitly to every operation that acts on "the current process".

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use super::lifecycle::LifecycleRecord;
use crate::config::MAX_NAME_LEN;
use crate::memory::PageDirectory;
use crate::platform::Platform;
use crate::vfs::FdTable;

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Generate a new unique process ID
    pub fn allocate() -> Self {
        static NEXT_PID: AtomicU32 = AtomicU32::new(1);
        ProcessId(NEXT_PID.fetch_add(1, Ordering::SeqCst))
    }

    /// Create a ProcessId from a raw value
    pub const fn from_raw(val: u32) -> Self {
        ProcessId(val)
    }

    /// Get the raw ID value
    pub const fn as_raw(&self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process name for a command line: its first token, cut to `MAX_NAME_LEN`
/// bytes.
pub fn process_name(cmd_line: &[u8]) -> Vec<u8> {
    let first = cmd_line
        .split(|&b| b == b' ')
        .find(|t| !t.is_empty())
        .unwrap_or(&[]);
    first[..first.len().min(MAX_NAME_LEN)].to_vec()
}

/// A user process.
pub struct Process {
    name: Vec<u8>,
    pid: ProcessId,
    /// User address space, `None` before load and after exit
    pub space: Option<PageDirectory>,
    /// Open files
    pub files: FdTable,
    record: Arc<LifecycleRecord>,
    platform: Arc<Platform>,
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.label())
            .field("pid", &self.pid)
            .field("files", &self.files)
            .field("record", &self.record)
            .finish()
    }
}

impl Process {
    /// The first process. It has no parent and no user image.
    pub fn root(name: &str, platform: Arc<Platform>) -> Self {
        let pid = ProcessId::allocate();
        Self::new(process_name(name.as_bytes()), LifecycleRecord::root(pid), platform)
    }

    pub(crate) fn new(name: Vec<u8>, record: Arc<LifecycleRecord>, platform: Arc<Platform>) -> Self {
        Self {
            name,
            pid: record.pid(),
            space: None,
            files: FdTable::new(),
            record,
            platform,
        }
    }

    /// Name as given on the command line.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Name for log output.
    pub fn label(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn record(&self) -> &Arc<LifecycleRecord> {
        &self.record
    }

    pub fn platform(&self) -> &Arc<Platform> {
        &self.platform
    }

    /// True once exit has run for this process.
    pub fn has_exited(&self) -> bool {
        self.record.phase().has_exited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pids_are_unique() {
        let a = ProcessId::allocate();
        let b = ProcessId::allocate();
        assert_ne!(a, b);
        assert!(b.as_raw() > a.as_raw());
    }

    #[test]
    fn test_process_name() {
        assert_eq!(process_name(b"echo hello"), b"echo");
        assert_eq!(process_name(b"   args-none  "), b"args-none");
        assert_eq!(process_name(b"a-very-long-program-name x"), b"a-very-long-pro");
        assert_eq!(process_name(b"\xffname arg"), b"\xffname");
        assert!(process_name(b"").is_empty());
    }
}
