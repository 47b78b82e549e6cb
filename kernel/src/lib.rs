//! KPIO User Program Library
//!
//! Process execution and the system call layer: loading ELF executables
//! into fresh address spaces, marshaling arguments onto the user stack,
//! parent/child wait and exit, and validated system call dispatch.
//!
//! # Modules
//!
//! - `loader`: ELF parsing, segment mapping and the argument stack
//! - `process`: execution contexts and their lifecycle
//! - `syscall`: decoding, validation and handlers
//! - `vfs`: per-process file descriptors
//! - `memory`: frame pool and user page directories
//! - `platform`: services borrowed from the rest of the kernel

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod loader;
pub mod memory;
pub mod platform;
pub mod process;
pub mod sync;
pub mod syscall;
pub mod vfs;

#[cfg(test)]
mod tests;

pub use platform::Platform;
pub use process::{Process, ProcessId};
