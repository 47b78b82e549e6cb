//! System call handling module.
//!
//! User programs trap into the kernel with the syscall number in the word at
//! the stack pointer, followed by up to three argument words. The number and
//! every argument word are validated before they are read; a call's result
//! goes back in `eax`.
//!
//! ```text
//!   esp + 12 │ arg 2
//!   esp +  8 │ arg 1
//!   esp +  4 │ arg 0
//!   esp      │ syscall number
//! ```
//!
//! Any bad user address terminates the caller with status -1 through the
//! regular exit path.

pub mod handlers;
pub mod trace;
pub mod validate;

use crate::config::KILLED_STATUS;
use crate::memory::PageDirectory;
use crate::process::{manager, Process};

pub use validate::ValidationError;

/// Number of defined system calls.
pub const SYSCALL_COUNT: usize = 14;

/// System call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyscallNumber {
    /// Power the machine off.
    Halt = 0,
    /// Exit the current process.
    Exit = 1,
    /// Start a child process.
    Exec = 2,
    /// Wait for a child process.
    Wait = 3,
    /// Create a file.
    Create = 4,
    /// Remove a file.
    Remove = 5,
    /// Open a file.
    Open = 6,
    /// Size of an open file.
    Filesize = 7,
    /// Read from a file descriptor.
    Read = 8,
    /// Write to a file descriptor.
    Write = 9,
    /// Move a file position.
    Seek = 10,
    /// Report a file position.
    Tell = 11,
    /// Close a file descriptor.
    Close = 12,
    /// Sleep for a number of milliseconds.
    Sleep = 13,
}

impl SyscallNumber {
    /// Every syscall, in number order.
    pub const ALL: [SyscallNumber; SYSCALL_COUNT] = [
        Self::Halt,
        Self::Exit,
        Self::Exec,
        Self::Wait,
        Self::Create,
        Self::Remove,
        Self::Open,
        Self::Filesize,
        Self::Read,
        Self::Write,
        Self::Seek,
        Self::Tell,
        Self::Close,
        Self::Sleep,
    ];

    /// Number of argument words the call takes.
    pub const fn arg_count(self) -> usize {
        match self {
            Self::Halt => 0,
            Self::Exit
            | Self::Exec
            | Self::Wait
            | Self::Remove
            | Self::Open
            | Self::Filesize
            | Self::Tell
            | Self::Close
            | Self::Sleep => 1,
            Self::Create | Self::Seek => 2,
            Self::Read | Self::Write => 3,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Exit => "exit",
            Self::Exec => "exec",
            Self::Wait => "wait",
            Self::Create => "create",
            Self::Remove => "remove",
            Self::Open => "open",
            Self::Filesize => "filesize",
            Self::Read => "read",
            Self::Write => "write",
            Self::Seek => "seek",
            Self::Tell => "tell",
            Self::Close => "close",
            Self::Sleep => "sleep",
        }
    }
}

impl TryFrom<u32> for SyscallNumber {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL.get(value as usize).copied().ok_or(())
    }
}

/// The trapped state of one system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallFrame {
    /// User stack pointer at the trap
    pub esp: u32,
    /// Return value slot
    pub eax: u32,
}

impl SyscallFrame {
    pub fn new(esp: u32) -> Self {
        Self { esp, eax: 0 }
    }
}

/// What happens to the caller after a system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Return to user mode
    Resume,
    /// The process exited with this status and must not run again
    Terminated(i32),
    /// The machine was powered off
    Halted,
}

/// The caller's address space.
pub(crate) fn user_space(process: &Process) -> Result<&PageDirectory, ValidationError> {
    process.space.as_ref().ok_or(ValidationError::NoAddressSpace)
}

/// Read argument word `index` (0-based) above the syscall number.
fn read_arg(process: &Process, esp: u32, index: usize) -> Result<u32, ValidationError> {
    let addr = esp
        .checked_add(4 * (index as u32 + 1))
        .ok_or(ValidationError::Wraparound)?;
    validate::read_word(user_space(process)?, addr)
}

/// Terminate `process` after a failed validation.
fn kill(process: &mut Process, error: ValidationError) -> Flow {
    log::warn!(
        "[KPIO Syscall] Killing process {} '{}': {}",
        process.pid(),
        process.label(),
        error
    );
    manager::exit(process, KILLED_STATUS);
    Flow::Terminated(KILLED_STATUS)
}

/// Decode and run the system call trapped in `frame`.
pub fn dispatch(process: &mut Process, frame: &mut SyscallFrame) -> Flow {
    let pid = process.pid();

    let nr = match user_space(process).and_then(|space| validate::read_word(space, frame.esp)) {
        Ok(nr) => nr,
        Err(e) => return kill(process, e),
    };

    let call = match SyscallNumber::try_from(nr) {
        Ok(call) => call,
        Err(()) => {
            trace::on_unknown_syscall(pid, nr);
            manager::exit(process, KILLED_STATUS);
            return Flow::Terminated(KILLED_STATUS);
        }
    };

    let mut args = [0u32; 3];
    for (index, arg) in args.iter_mut().take(call.arg_count()).enumerate() {
        *arg = match read_arg(process, frame.esp, index) {
            Ok(word) => word,
            Err(e) => return kill(process, e),
        };
    }

    trace::on_syscall_entry(pid, call, &args[..call.arg_count()]);

    let flow = match handlers::handle(call, process, frame, &args) {
        Ok(flow) => flow,
        Err(e) => kill(process, e),
    };

    trace::on_syscall_exit(pid, call, flow, frame.eax);
    flow
}
