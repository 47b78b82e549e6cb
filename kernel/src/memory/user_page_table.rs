//! Per-Process User Page Directory
//!
//! Each process owns one `PageDirectory` describing its user address space.
//! Only user pages live here; kernel space above `PHYS_BASE` is never
//! mapped through it.
//!
//! # Address Space Layout
//!
//! ```text
//! 0x0000_0000 - 0x0000_0FFF  Never mapped (null page)
//! 0x0000_1000 - 0xBFFF_EFFF  Program segments
//! 0xBFFF_F000 - 0xBFFF_FFFF  Initial stack page
//! 0xC000_0000 - ...          Kernel space
//! ```
//!
//! Dropping a directory releases every frame it maps.

use alloc::collections::BTreeMap;

use super::frame::Frame;
use super::{is_user_vaddr, page_offset, page_round_down};
use crate::config::PAGE_SIZE;

/// Errors from page directory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The target page already has a mapping
    AlreadyMapped,
    /// The address has no mapping
    NotMapped,
    /// The address is outside user space
    NotUserAddress,
    /// The page address is not page-aligned
    Unaligned,
    /// No frame left in the user pool
    OutOfFrames,
}

impl core::fmt::Display for MapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyMapped => write!(f, "Page already mapped"),
            Self::NotMapped => write!(f, "Page not mapped"),
            Self::NotUserAddress => write!(f, "Address outside user space"),
            Self::Unaligned => write!(f, "Page address not aligned"),
            Self::OutOfFrames => write!(f, "Out of user frames"),
        }
    }
}

/// A mapped user page.
#[derive(Debug)]
struct Mapping {
    frame: Frame,
    writable: bool,
}

/// A user address space.
#[derive(Debug, Default)]
pub struct PageDirectory {
    /// Mappings keyed by page-aligned virtual address
    pages: BTreeMap<u32, Mapping>,
}

impl PageDirectory {
    /// Create an empty address space.
    pub fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
        }
    }

    /// Map `frame` at user page `upage`.
    ///
    /// Fails with `AlreadyMapped` if `upage` is already present; the frame
    /// is released in that case.
    pub fn install(&mut self, upage: u32, frame: Frame, writable: bool) -> Result<(), MapError> {
        if page_offset(upage) != 0 {
            return Err(MapError::Unaligned);
        }
        if !is_user_vaddr(upage) {
            return Err(MapError::NotUserAddress);
        }
        if self.pages.contains_key(&upage) {
            return Err(MapError::AlreadyMapped);
        }

        self.pages.insert(upage, Mapping { frame, writable });
        Ok(())
    }

    /// Whether the page containing `addr` is mapped.
    pub fn is_mapped(&self, addr: u32) -> bool {
        is_user_vaddr(addr) && self.pages.contains_key(&page_round_down(addr))
    }

    /// Writability of the page containing `addr`, if mapped.
    pub fn is_writable(&self, addr: u32) -> Option<bool> {
        self.pages.get(&page_round_down(addr)).map(|m| m.writable)
    }

    /// Frame backing the page containing `addr`.
    pub fn frame(&self, addr: u32) -> Option<&Frame> {
        if !is_user_vaddr(addr) {
            return None;
        }
        self.pages.get(&page_round_down(addr)).map(|m| &m.frame)
    }

    /// Mutable frame backing the page containing `addr`.
    pub fn frame_mut(&mut self, addr: u32) -> Option<&mut Frame> {
        if !is_user_vaddr(addr) {
            return None;
        }
        self.pages.get_mut(&page_round_down(addr)).map(|m| &mut m.frame)
    }

    /// Number of mapped pages.
    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    /// Copy `buf.len()` bytes starting at user address `addr` into `buf`.
    ///
    /// The copy may span pages; every page touched must be mapped.
    pub fn read_bytes(&self, addr: u32, buf: &mut [u8]) -> Result<(), MapError> {
        let mut done = 0usize;
        while done < buf.len() {
            let vaddr = addr
                .checked_add(done as u32)
                .ok_or(MapError::NotUserAddress)?;
            let frame = self.frame(vaddr).ok_or(MapError::NotMapped)?;
            let offset = page_offset(vaddr) as usize;
            let chunk = core::cmp::min(PAGE_SIZE - offset, buf.len() - done);
            buf[done..done + chunk].copy_from_slice(&frame.bytes()[offset..offset + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Copy `data` into user memory starting at `addr`.
    ///
    /// Writes through kernel access and ignores the user writable bit, as
    /// the kernel does when filling a fresh stack or a read buffer.
    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), MapError> {
        let mut done = 0usize;
        while done < data.len() {
            let vaddr = addr
                .checked_add(done as u32)
                .ok_or(MapError::NotUserAddress)?;
            let frame = self.frame_mut(vaddr).ok_or(MapError::NotMapped)?;
            let offset = page_offset(vaddr) as usize;
            let chunk = core::cmp::min(PAGE_SIZE - offset, data.len() - done);
            frame.bytes_mut()[offset..offset + chunk].copy_from_slice(&data[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Read a little-endian word.
    pub fn read_u32(&self, addr: u32) -> Result<u32, MapError> {
        let mut word = [0u8; 4];
        self.read_bytes(addr, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Write a little-endian word.
    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), MapError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Read a single byte.
    pub fn read_u8(&self, addr: u32) -> Result<u8, MapError> {
        let frame = self.frame(addr).ok_or(MapError::NotMapped)?;
        Ok(frame.bytes()[page_offset(addr) as usize])
    }
}
