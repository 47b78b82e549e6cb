//! Command line marshaling.
//!
//! Splits a command line into an argument vector and lays it out on a new
//! user stack following the i386 calling convention for `main`.
//!
//! # Stack Layout
//!
//! ```text
//!   (high address = stack_top)
//!   +-------------------+
//!   | argv[n-1] string  |
//!   | ...               |
//!   | argv[0] string    |
//!   +-------------------+
//!   | padding (align 4) |
//!   +-------------------+
//!   | NULL              | ← argv[argc]
//!   | argv[n-1] ptr     |
//!   | ...               |
//!   | argv[0] ptr       |
//!   +-------------------+
//!   | argv              |
//!   | argc              |
//!   | return address 0  | ← esp points here
//!   +-------------------+
//!   (low address)
//! ```

use alloc::vec::Vec;

use crate::config::MAX_ARGS;
use crate::memory::{page_round_down, PageDirectory};

use super::segment_loader::LoadError;

/// Arguments parsed from a command line.
///
/// Arguments are byte strings; whatever the user passed reaches `main`
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentVector {
    args: Vec<Vec<u8>>,
}

impl ArgumentVector {
    /// Split `cmd_line` on spaces. Runs of spaces separate a single pair of
    /// tokens. Tokens beyond `MAX_ARGS` are dropped.
    pub fn parse(cmd_line: &[u8]) -> Self {
        let args = cmd_line
            .split(|&b| b == b' ')
            .filter(|token| !token.is_empty())
            .take(MAX_ARGS)
            .map(<[u8]>::to_vec)
            .collect();

        Self { args }
    }

    /// The program name (argv[0]).
    pub fn program(&self) -> Option<&[u8]> {
        self.args.first().map(Vec::as_slice)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// True when the command line held no tokens.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Arguments in order.
    pub fn as_slice(&self) -> &[Vec<u8>] {
        &self.args
    }
}

/// Stack construction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// A write would run below the stack page
    Overflow,
    /// The stack page is not mapped
    NoStackPage,
}

impl From<StackError> for LoadError {
    fn from(_: StackError) -> Self {
        LoadError::StackOverflow
    }
}

/// Downward writer over one stack page.
///
/// Every push writes below the current stack pointer and returns the new
/// one; a push that would leave the page fails without writing.
pub struct StackWriter<'a> {
    page: &'a mut [u8],
    base: u32,
    sp: u32,
}

impl<'a> StackWriter<'a> {
    /// Writer over `page`, which is mapped at `base`, starting at `sp`.
    pub fn new(page: &'a mut [u8], base: u32, sp: u32) -> Self {
        Self { page, base, sp }
    }

    /// Current stack pointer.
    pub fn sp(&self) -> u32 {
        self.sp
    }

    /// Push raw bytes. Returns the address they were written at.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<u32, StackError> {
        let offset = (self.sp - self.base) as usize;
        let start = offset.checked_sub(bytes.len()).ok_or(StackError::Overflow)?;
        self.page[start..offset].copy_from_slice(bytes);
        self.sp = self.base + start as u32;
        Ok(self.sp)
    }

    /// Push a little-endian word.
    pub fn push_u32(&mut self, value: u32) -> Result<u32, StackError> {
        self.push_bytes(&value.to_le_bytes())
    }

    /// Push a NUL-terminated copy of `s`.
    pub fn push_cstr(&mut self, s: &[u8]) -> Result<u32, StackError> {
        self.push_bytes(&[0])?;
        self.push_bytes(s)
    }

    /// Zero-pad down to a multiple of `align` (a power of two).
    pub fn align_down(&mut self, align: u32) -> Result<u32, StackError> {
        let pad = (self.sp & (align - 1)) as usize;
        const ZEROS: [u8; 16] = [0; 16];
        self.push_bytes(&ZEROS[..pad])
    }
}

/// Marshal `argv` onto the stack page below `stack_top`.
///
/// Returns the initial user stack pointer.
pub fn build_stack(
    space: &mut PageDirectory,
    stack_top: u32,
    argv: &ArgumentVector,
) -> Result<u32, StackError> {
    let base = page_round_down(stack_top - 1);
    let page = space
        .frame_mut(base)
        .ok_or(StackError::NoStackPage)?
        .bytes_mut();
    let mut stack = StackWriter::new(page, base, stack_top);

    let mut addrs = [0u32; MAX_ARGS];
    for (i, arg) in argv.as_slice().iter().enumerate().rev() {
        addrs[i] = stack.push_cstr(arg)?;
    }

    stack.align_down(4)?;

    stack.push_u32(0)?;
    for &addr in addrs[..argv.len()].iter().rev() {
        stack.push_u32(addr)?;
    }
    let argv_ptr = stack.sp();

    stack.push_u32(argv_ptr)?;
    stack.push_u32(argv.len() as u32)?;
    stack.push_u32(0)?;

    Ok(stack.sp())
}
