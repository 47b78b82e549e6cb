//! Process Management
//!
//! This module provides process creation, parent/child bookkeeping and the
//! wait/exit protocol for userspace programs.

pub mod context;
pub mod lifecycle;
pub mod manager;

pub use context::{process_name, Process, ProcessId};
pub use lifecycle::{LifecycleRecord, Phase};
pub use manager::{execute, exit, start_process, wait, ExecError};
