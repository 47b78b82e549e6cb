//! ELF Segment Memory Loader
//!
//! Connects the ELF header parser (`loader/elf.rs`) to the user page
//! directory (`memory/user_page_table.rs`) to build a fresh address space
//! for a program.
//!
//! # Process
//!
//! 1. Open the executable and validate its header
//! 2. Walk the program headers in file order. For each PT_LOAD segment:
//!    a. Validate placement against the file and the user address space
//!    b. Read the file-backed part page by page
//!    c. Zero-fill the remainder (BSS)
//!    d. Install every page, refusing to replace an existing mapping
//! 3. Map one zeroed stack page just below `PHYS_BASE`
//!
//! The page directory and file handle are owned locally while loading, so
//! every early return releases them.

use alloc::string::String;

use super::elf::{Elf32Header, Elf32ProgramHeader, ElfError, SegmentKind, EHDR_SIZE, PHDR_SIZE};
use crate::config::{PAGE_SIZE, PHYS_BASE};
use crate::memory::{
    is_user_vaddr, page_offset, page_round_down, page_round_up, FramePool, MapError, PageDirectory,
};
use crate::platform::{File, Platform};

/// Errors that can occur while loading an executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The executable could not be opened
    Open,
    /// Short read from the executable
    Read,
    /// Malformed or unsupported header
    Header(ElfError),
    /// Program header offset outside the file
    PhdrOutOfBounds,
    /// Segment needs dynamic linking
    Unsupported,
    /// File offset and virtual address disagree on page offset
    Misaligned,
    /// Segment data starts past the end of the file
    SegmentOutOfBounds,
    /// Memory size smaller than file size
    InvalidMemSize,
    /// Zero-length segment
    EmptySegment,
    /// Segment outside user space or wrapping around
    InvalidAddress,
    /// Segment would map the null page
    NullPage,
    /// A page was already mapped
    AlreadyMapped,
    /// No frame left for a page
    OutOfMemory,
    /// Arguments do not fit on the stack page
    StackOverflow,
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Open => write!(f, "open failed"),
            Self::Read => write!(f, "short read"),
            Self::Header(e) => write!(f, "error loading executable: {}", e),
            Self::PhdrOutOfBounds => write!(f, "program header out of bounds"),
            Self::Unsupported => write!(f, "dynamic linking not supported"),
            Self::Misaligned => write!(f, "segment offset and address misaligned"),
            Self::SegmentOutOfBounds => write!(f, "segment data out of bounds"),
            Self::InvalidMemSize => write!(f, "memory size below file size"),
            Self::EmptySegment => write!(f, "empty segment"),
            Self::InvalidAddress => write!(f, "segment outside user space"),
            Self::NullPage => write!(f, "segment maps page 0"),
            Self::AlreadyMapped => write!(f, "page already mapped"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::StackOverflow => write!(f, "arguments overflow the stack page"),
        }
    }
}

impl From<ElfError> for LoadError {
    fn from(e: ElfError) -> Self {
        LoadError::Header(e)
    }
}

impl From<MapError> for LoadError {
    fn from(e: MapError) -> Self {
        match e {
            MapError::AlreadyMapped => LoadError::AlreadyMapped,
            MapError::OutOfFrames => LoadError::OutOfMemory,
            MapError::NotMapped | MapError::NotUserAddress | MapError::Unaligned => {
                LoadError::InvalidAddress
            }
        }
    }
}

/// A program ready to enter user mode.
#[derive(Debug)]
pub struct LoadedImage {
    /// The new address space
    pub space: PageDirectory,
    /// Entry point address
    pub entry_point: u32,
    /// Initial stack pointer (top of user stack)
    pub stack_top: u32,
}

/// Load the executable `file_name` into a new address space.
pub fn load(platform: &Platform, file_name: &[u8]) -> Result<LoadedImage, LoadError> {
    let mut space = PageDirectory::new();

    let mut file = platform.fs.open(file_name).ok_or(LoadError::Open)?;

    let mut ehdr_bytes = [0u8; EHDR_SIZE];
    if file.read_at(&mut ehdr_bytes, 0) != EHDR_SIZE {
        return Err(ElfError::TooSmall.into());
    }
    let header = Elf32Header::parse(&ehdr_bytes)?;
    header.validate()?;

    let file_len = file.length();
    let mut phdr_offset = header.e_phoff;

    for _ in 0..header.e_phnum {
        if phdr_offset > file_len {
            return Err(LoadError::PhdrOutOfBounds);
        }

        let mut phdr_bytes = [0u8; PHDR_SIZE];
        if file.read_at(&mut phdr_bytes, phdr_offset) != PHDR_SIZE {
            return Err(LoadError::Read);
        }
        phdr_offset = phdr_offset
            .checked_add(PHDR_SIZE as u32)
            .ok_or(LoadError::PhdrOutOfBounds)?;

        let phdr = Elf32ProgramHeader::parse(&phdr_bytes)?;
        match phdr.kind() {
            SegmentKind::Ignored => {}
            SegmentKind::Unsupported => return Err(LoadError::Unsupported),
            SegmentKind::Load => {
                validate_segment(&phdr, file_len)?;
                load_segment(&mut space, &platform.frames, file.as_mut(), &phdr)?;
            }
        }
    }

    let stack_top = setup_stack(&mut space, &platform.frames)?;

    log::debug!(
        "[KPIO Loader] {}: entry {:#010x}, {} pages mapped",
        String::from_utf8_lossy(file_name),
        header.e_entry,
        space.mapped_pages()
    );

    Ok(LoadedImage {
        space,
        entry_point: header.e_entry,
        stack_top,
    })
}

/// Check that a PT_LOAD entry describes a segment we may map.
pub fn validate_segment(phdr: &Elf32ProgramHeader, file_len: u32) -> Result<(), LoadError> {
    if page_offset(phdr.p_offset) != page_offset(phdr.p_vaddr) {
        return Err(LoadError::Misaligned);
    }

    if phdr.p_offset > file_len {
        return Err(LoadError::SegmentOutOfBounds);
    }

    if phdr.p_memsz < phdr.p_filesz {
        return Err(LoadError::InvalidMemSize);
    }

    if phdr.p_memsz == 0 {
        return Err(LoadError::EmptySegment);
    }

    // Both ends inside user space, without wrapping past 4 GiB
    let end = phdr.p_vaddr as u64 + phdr.p_memsz as u64;
    if !is_user_vaddr(phdr.p_vaddr) || end >= PHYS_BASE as u64 {
        return Err(LoadError::InvalidAddress);
    }

    if phdr.p_vaddr < PAGE_SIZE as u32 {
        return Err(LoadError::NullPage);
    }

    Ok(())
}

/// Map one validated segment.
///
/// Starting at the page containing `p_vaddr`, the first
/// `page_offset + p_filesz` bytes come from the file (read from the page
/// containing `p_offset`), the rest up to the rounded-up memory size is
/// zero.
fn load_segment(
    space: &mut PageDirectory,
    frames: &FramePool,
    file: &mut dyn File,
    phdr: &Elf32ProgramHeader,
) -> Result<(), LoadError> {
    let writable = phdr.is_writable();
    let mut file_pos = page_round_down(phdr.p_offset);
    let mut upage = page_round_down(phdr.p_vaddr);
    let lead = page_offset(phdr.p_vaddr) as u64;

    let mut read_bytes = if phdr.p_filesz > 0 {
        lead + phdr.p_filesz as u64
    } else {
        0
    };
    let mut zero_bytes = page_round_up(lead + phdr.p_memsz as u64) - read_bytes;

    while read_bytes > 0 || zero_bytes > 0 {
        let page_read = core::cmp::min(read_bytes, PAGE_SIZE as u64) as usize;
        let page_zero = PAGE_SIZE - page_read;

        let mut frame = frames.allocate().ok_or(LoadError::OutOfMemory)?;
        if page_read > 0 && file.read_at(&mut frame.bytes_mut()[..page_read], file_pos) != page_read
        {
            return Err(LoadError::Read);
        }

        space.install(upage, frame, writable)?;

        read_bytes -= page_read as u64;
        zero_bytes -= page_zero as u64;
        file_pos += page_read as u32;
        upage += PAGE_SIZE as u32;
    }

    Ok(())
}

/// Map a zeroed page at the top of user memory and return the stack top.
pub fn setup_stack(space: &mut PageDirectory, frames: &FramePool) -> Result<u32, LoadError> {
    let frame = frames.allocate().ok_or(LoadError::OutOfMemory)?;
    space.install(PHYS_BASE - PAGE_SIZE as u32, frame, true)?;
    Ok(PHYS_BASE)
}
