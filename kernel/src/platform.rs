//! Platform services consumed by the user program layer.
//!
//! The loader, lifecycle manager and syscall dispatcher never talk to
//! hardware or storage directly. Everything they need from the rest of the
//! kernel goes through the narrow traits below, bundled into a `Platform`
//! that every process shares.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  loader · process · syscall · vfs::fd        │
//! ├──────────────────────────────────────────────┤
//! │                 Platform                     │
//! │ ┌────┐ ┌───────┐ ┌─────┐ ┌─────────┐ ┌─────┐ │
//! │ │ fs │ │console│ │timer│ │scheduler│ │ cpu │ │
//! │ └────┘ └───────┘ └─────┘ └─────────┘ └─────┘ │
//! └──────────────────────────────────────────────┘
//! ```

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::memory::{FramePool, PageDirectory};
use crate::process::Process;

/// An open file. Dropping the handle closes it.
pub trait File: Send {
    /// Read from the current position, advancing it. Returns bytes read.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Read at an absolute offset without moving the position.
    fn read_at(&mut self, buf: &mut [u8], offset: u32) -> usize;

    /// Write at the current position, advancing it. Returns bytes written.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Move the current position.
    fn seek(&mut self, position: u32);

    /// Current position.
    fn tell(&self) -> u32;

    /// File length in bytes.
    fn length(&self) -> u32;
}

/// Name-based filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Open an existing file.
    fn open(&self, name: &[u8]) -> Option<Box<dyn File>>;

    /// Create a file of `initial_size` zero bytes. Fails if it exists.
    fn create(&self, name: &[u8], initial_size: u32) -> bool;

    /// Remove a file by name.
    fn remove(&self, name: &[u8]) -> bool;
}

/// Console input and output.
pub trait Console: Send + Sync {
    /// Write a buffer to the console.
    fn write(&self, buf: &[u8]);

    /// Block until one key is available and return it.
    fn getc(&self) -> u8;
}

/// Timer services.
pub trait Timer: Send + Sync {
    /// Sleep the calling thread for `ticks` timer ticks.
    fn sleep(&self, ticks: i64);
}

/// Entry routine of a new kernel thread.
pub type ThreadRoutine = Box<dyn FnOnce() + Send + 'static>;

/// Thread creation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnError;

impl core::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Cannot create kernel thread")
    }
}

/// Kernel thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn new(raw: u64) -> Self {
        TaskId(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Kernel thread scheduler.
pub trait Scheduler: Send + Sync {
    /// Start a new kernel thread running `routine`.
    fn spawn(&self, name: &str, routine: ThreadRoutine) -> Result<(), SpawnError>;

    /// The calling thread.
    fn current(&self) -> TaskId;

    /// Take the calling thread off the run queue until it is unblocked.
    ///
    /// An `unblock` that arrives before the thread blocks is not lost: the
    /// next `block_current` returns at once. May return spuriously.
    fn block_current(&self);

    /// Make `task` runnable again.
    fn unblock(&self, task: TaskId);
}

/// Processor control.
pub trait Processor: Send + Sync {
    /// Switch to `space`, or to the kernel-only address space for `None`.
    fn activate(&self, space: Option<&PageDirectory>);

    /// Run user code of `process` from `entry` with stack pointer `esp`.
    ///
    /// Every system call trap is handed to [`crate::syscall::dispatch`].
    /// Returns once the process terminated through a syscall or was stopped
    /// by a fault.
    fn enter_user(&self, process: &mut Process, entry: u32, esp: u32);

    /// Power the machine off.
    fn power_off(&self);
}

/// Services shared by every process.
#[derive(Clone)]
pub struct Platform {
    pub fs: Arc<dyn FileSystem>,
    pub console: Arc<dyn Console>,
    pub timer: Arc<dyn Timer>,
    pub scheduler: Arc<dyn Scheduler>,
    pub cpu: Arc<dyn Processor>,
    /// Frames backing user pages
    pub frames: FramePool,
}
