//! Virtual File System
//!
//! Per-process file descriptors over the filesystem collaborator in
//! [`crate::platform`]. Name-based operations (create, remove, open) go
//! straight to the filesystem; everything keyed by descriptor goes through
//! the process's [`fd::FdTable`].

pub mod fd;

pub use fd::{FdError, FdTable, FIRST_FILE_FD, STDIN_FILENO, STDOUT_FILENO};
