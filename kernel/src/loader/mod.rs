//! ELF Program Loader
//!
//! Builds the initial user image of a process from an executable on disk.
//!
//! # ELF32 Format Support
//!
//! - ELF32 i386 executable header
//! - Program headers (LOAD segments mapped, informational types ignored)
//! - Dynamic linking is rejected
//!
//! # Security
//!
//! - Validates all header fields and segment placement before mapping
//! - Never maps page 0 or anything at or above `PHYS_BASE`
//! - Never replaces an existing mapping

pub mod args;
pub mod elf;
pub mod segment_loader;

pub use args::{build_stack, ArgumentVector, StackError, StackWriter};
pub use elf::{Elf32Header, Elf32ProgramHeader, ElfError, SegmentFlags};
pub use segment_loader::{load, LoadError, LoadedImage};
