//! User pointer validation.
//!
//! Every address a user program hands to the kernel is checked against the
//! caller's page directory before the kernel touches it. An address is
//! valid when it is non-null, below `PHYS_BASE` and inside a mapped page.

use alloc::vec::Vec;

use crate::config::PAGE_SIZE;
use crate::memory::{is_user_vaddr, page_round_down, PageDirectory};

/// Why a user address was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Null pointer
    Null,
    /// Address at or above `PHYS_BASE`
    KernelAddress(u32),
    /// Address in an unmapped page
    Unmapped(u32),
    /// Destination address in a read-only page
    ReadOnly(u32),
    /// Range wraps past the top of the address space
    Wraparound,
    /// The process has no user address space
    NoAddressSpace,
}

impl core::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Null => write!(f, "null pointer"),
            Self::KernelAddress(addr) => write!(f, "kernel address {:#010x}", addr),
            Self::Unmapped(addr) => write!(f, "unmapped address {:#010x}", addr),
            Self::ReadOnly(addr) => write!(f, "read-only address {:#010x}", addr),
            Self::Wraparound => write!(f, "range wraps around"),
            Self::NoAddressSpace => write!(f, "no address space"),
        }
    }
}

/// Check a single user address.
pub fn check_pointer(space: &PageDirectory, addr: u32) -> Result<(), ValidationError> {
    if addr == 0 {
        return Err(ValidationError::Null);
    }
    if !is_user_vaddr(addr) {
        return Err(ValidationError::KernelAddress(addr));
    }
    if !space.is_mapped(addr) {
        return Err(ValidationError::Unmapped(addr));
    }
    Ok(())
}

/// Check every byte of `[addr, addr + len)`.
///
/// Validity is a per-page property, so one check per page touched covers
/// every byte.
pub fn check_buffer(space: &PageDirectory, addr: u32, len: u32) -> Result<(), ValidationError> {
    if len == 0 {
        return Ok(());
    }
    let last = addr.checked_add(len - 1).ok_or(ValidationError::Wraparound)?;

    check_pointer(space, addr)?;
    let mut page = page_round_down(addr);
    while page < page_round_down(last) {
        page += PAGE_SIZE as u32;
        check_pointer(space, page)?;
    }
    Ok(())
}

/// Check that every byte of `[addr, addr + len)` may be written by the
/// kernel on the user's behalf.
pub fn check_writable(space: &PageDirectory, addr: u32, len: u32) -> Result<(), ValidationError> {
    check_buffer(space, addr, len)?;
    if len == 0 {
        return Ok(());
    }
    let last = page_round_down(addr + (len - 1));
    let mut page = page_round_down(addr);
    loop {
        if space.is_writable(page) != Some(true) {
            return Err(ValidationError::ReadOnly(page.max(addr)));
        }
        if page == last {
            return Ok(());
        }
        page += PAGE_SIZE as u32;
    }
}

/// Check a NUL-terminated string and return its length without the NUL.
pub fn check_string(space: &PageDirectory, addr: u32) -> Result<usize, ValidationError> {
    let mut cursor = addr;
    loop {
        check_pointer(space, cursor)?;
        match space.read_u8(cursor) {
            Ok(0) => return Ok((cursor - addr) as usize),
            Ok(_) => {}
            Err(_) => return Err(ValidationError::Unmapped(cursor)),
        }
        cursor = cursor.checked_add(1).ok_or(ValidationError::Wraparound)?;
    }
}

/// Validate and copy a NUL-terminated user string, without its terminator.
///
/// The bytes are returned as they are; no encoding is assumed.
pub fn copy_in_cstr(space: &PageDirectory, addr: u32) -> Result<Vec<u8>, ValidationError> {
    let len = check_string(space, addr)?;
    let mut bytes = Vec::new();
    bytes.resize(len, 0);
    space
        .read_bytes(addr, &mut bytes)
        .map_err(|_| ValidationError::Unmapped(addr))?;
    Ok(bytes)
}

/// Validate and copy `len` bytes of user memory.
pub fn copy_in(space: &PageDirectory, addr: u32, len: u32) -> Result<Vec<u8>, ValidationError> {
    check_buffer(space, addr, len)?;
    let mut bytes = Vec::new();
    bytes.resize(len as usize, 0);
    space
        .read_bytes(addr, &mut bytes)
        .map_err(|_| ValidationError::Unmapped(addr))?;
    Ok(bytes)
}

/// Validate and read the user word at `addr`.
pub fn read_word(space: &PageDirectory, addr: u32) -> Result<u32, ValidationError> {
    check_buffer(space, addr, 4)?;
    space
        .read_u32(addr)
        .map_err(|_| ValidationError::Unmapped(addr))
}
