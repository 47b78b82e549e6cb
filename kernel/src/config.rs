//! Kernel configuration constants.
//!
//! This module contains compile-time configuration for the user program
//! layer. Values here affect the user address space layout and per-process
//! limits.

/// Page size (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Mask selecting the offset bits of a virtual address.
pub const PAGE_MASK: u32 = (PAGE_SIZE as u32) - 1;

/// First kernel virtual address. User space is `[0, PHYS_BASE)`.
pub const PHYS_BASE: u32 = 0xC000_0000;

/// Maximum number of argv entries marshaled onto a new stack.
pub const MAX_ARGS: usize = 32;

/// Command lines are copied into a single page, terminator included.
pub const MAX_CMDLINE_LEN: usize = PAGE_SIZE - 1;

/// Process names are truncated to this many bytes.
pub const MAX_NAME_LEN: usize = 15;

/// Number of simultaneously open files per process (slots 2..130).
pub const FD_TABLE_CAPACITY: usize = 128;

/// Upper bound on program header entries in an executable.
pub const MAX_PROGRAM_HEADERS: u16 = 1024;

/// Timer interrupt frequency in Hz.
pub const TIMER_FREQUENCY: i64 = 100;

/// Exit status recorded for processes killed by the kernel.
pub const KILLED_STATUS: i32 = -1;

/// Enable syscall tracing from boot.
pub const TRACE_SYSCALLS: bool = cfg!(feature = "trace-syscalls");
