//! Memory management for user programs.
//!
//! This module provides the abstract memory model the user program layer
//! runs on: a bounded pool of page frames and a per-process page directory
//! mapping user pages onto those frames.
//!
//! # Components
//!
//! - **FramePool**: Bounded user page allocator
//! - **PageDirectory**: Per-process user address space
//! - **StackDump**: Structured view of a user stack for diagnostics

pub mod dump;
pub mod frame;
pub mod user_page_table;

pub use dump::StackDump;
pub use frame::{Frame, FramePool};
pub use user_page_table::{MapError, PageDirectory};

use crate::config::{PAGE_MASK, PAGE_SIZE, PHYS_BASE};

/// Returns true if `addr` lies in user space.
#[inline]
pub const fn is_user_vaddr(addr: u32) -> bool {
    addr < PHYS_BASE
}

/// Offset of `addr` within its page.
#[inline]
pub const fn page_offset(addr: u32) -> u32 {
    addr & PAGE_MASK
}

/// Round `addr` down to the start of its page.
#[inline]
pub const fn page_round_down(addr: u32) -> u32 {
    addr & !PAGE_MASK
}

/// Round `len` up to a whole number of pages, in 64-bit space so the
/// result cannot wrap.
#[inline]
pub const fn page_round_up(len: u64) -> u64 {
    (len + PAGE_SIZE as u64 - 1) & !(PAGE_SIZE as u64 - 1)
}
