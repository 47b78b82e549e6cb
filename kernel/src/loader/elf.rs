//! ELF32 Header Parser
//!
//! Decodes and validates the fixed parts of an i386 executable: the file
//! header and the program header records. Segment contents are streamed by
//! `segment_loader`.

use bitflags::bitflags;

use crate::config::MAX_PROGRAM_HEADERS;

/// ELF identification prefix: magic, 32-bit class, little endian, version 1
pub const ELF_IDENT: [u8; 7] = [0x7F, b'E', b'L', b'F', 1, 1, 1];

/// ELF type: executable
pub const ET_EXEC: u16 = 2;

/// Machine type: Intel 80386
pub const EM_386: u16 = 3;

/// Current ELF version
pub const EV_CURRENT: u32 = 1;

/// Size of the ELF32 file header in bytes
pub const EHDR_SIZE: usize = 52;

/// Size of an ELF32 program header record in bytes
pub const PHDR_SIZE: usize = 32;

/// Program header type: unused entry
pub const PT_NULL: u32 = 0;

/// Program header type: loadable segment
pub const PT_LOAD: u32 = 1;

/// Program header type: dynamic linking info
pub const PT_DYNAMIC: u32 = 2;

/// Program header type: interpreter path
pub const PT_INTERP: u32 = 3;

/// Program header type: auxiliary info
pub const PT_NOTE: u32 = 4;

/// Program header type: reserved
pub const PT_SHLIB: u32 = 5;

/// Program header type: program header table
pub const PT_PHDR: u32 = 6;

/// Program header type: stack hint
pub const PT_GNU_STACK: u32 = 0x6474_E551;

bitflags! {
    /// Segment permission flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        /// Executable
        const X = 1 << 0;
        /// Writable
        const W = 1 << 1;
        /// Readable
        const R = 1 << 2;
    }
}

/// ELF header errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    /// File too small to contain a header
    TooSmall,
    /// Identification bytes are not ELF32 little-endian version 1
    InvalidMagic,
    /// Object type is not an executable
    InvalidType,
    /// Machine is not i386
    InvalidMachine,
    /// Unknown ELF version
    InvalidVersion,
    /// Program header entry size does not match ELF32
    InvalidPhentsize,
    /// Too many program headers
    InvalidPhnum,
}

impl core::fmt::Display for ElfError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TooSmall => write!(f, "File too small for ELF header"),
            Self::InvalidMagic => write!(f, "Bad ELF identification"),
            Self::InvalidType => write!(f, "Not an executable"),
            Self::InvalidMachine => write!(f, "Not an i386 binary"),
            Self::InvalidVersion => write!(f, "Unknown ELF version"),
            Self::InvalidPhentsize => write!(f, "Bad program header size"),
            Self::InvalidPhnum => write!(f, "Too many program headers"),
        }
    }
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// ELF32 file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32Header {
    /// Magic number and other info
    pub e_ident: [u8; 16],
    /// Object file type
    pub e_type: u16,
    /// Machine type
    pub e_machine: u16,
    /// Object file version
    pub e_version: u32,
    /// Entry point virtual address
    pub e_entry: u32,
    /// Program header table file offset
    pub e_phoff: u32,
    /// Section header table file offset
    pub e_shoff: u32,
    /// Processor-specific flags
    pub e_flags: u32,
    /// ELF header size
    pub e_ehsize: u16,
    /// Program header table entry size
    pub e_phentsize: u16,
    /// Program header table entry count
    pub e_phnum: u16,
    /// Section header table entry size
    pub e_shentsize: u16,
    /// Section header table entry count
    pub e_shnum: u16,
    /// Section name string table index
    pub e_shstrndx: u16,
}

impl Elf32Header {
    /// Decode a header from its on-disk bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, ElfError> {
        if bytes.len() < EHDR_SIZE {
            return Err(ElfError::TooSmall);
        }

        let mut e_ident = [0u8; 16];
        e_ident.copy_from_slice(&bytes[0..16]);

        Ok(Self {
            e_ident,
            e_type: u16_at(bytes, 16),
            e_machine: u16_at(bytes, 18),
            e_version: u32_at(bytes, 20),
            e_entry: u32_at(bytes, 24),
            e_phoff: u32_at(bytes, 28),
            e_shoff: u32_at(bytes, 32),
            e_flags: u32_at(bytes, 36),
            e_ehsize: u16_at(bytes, 40),
            e_phentsize: u16_at(bytes, 42),
            e_phnum: u16_at(bytes, 44),
            e_shentsize: u16_at(bytes, 46),
            e_shnum: u16_at(bytes, 48),
            e_shstrndx: u16_at(bytes, 50),
        })
    }

    /// Check that this is an executable we can run.
    pub fn validate(&self) -> Result<(), ElfError> {
        if self.e_ident[..ELF_IDENT.len()] != ELF_IDENT {
            return Err(ElfError::InvalidMagic);
        }
        if self.e_type != ET_EXEC {
            return Err(ElfError::InvalidType);
        }
        if self.e_machine != EM_386 {
            return Err(ElfError::InvalidMachine);
        }
        if self.e_version != EV_CURRENT {
            return Err(ElfError::InvalidVersion);
        }
        if self.e_phentsize as usize != PHDR_SIZE {
            return Err(ElfError::InvalidPhentsize);
        }
        if self.e_phnum > MAX_PROGRAM_HEADERS {
            return Err(ElfError::InvalidPhnum);
        }
        Ok(())
    }
}

/// How the loader treats a program header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Map into memory
    Load,
    /// Requires dynamic linking, which we do not support
    Unsupported,
    /// Informational, skip
    Ignored,
}

/// ELF32 program header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32ProgramHeader {
    /// Segment type
    pub p_type: u32,
    /// Segment file offset
    pub p_offset: u32,
    /// Segment virtual address
    pub p_vaddr: u32,
    /// Segment physical address (unused)
    pub p_paddr: u32,
    /// Segment size in file
    pub p_filesz: u32,
    /// Segment size in memory
    pub p_memsz: u32,
    /// Segment flags
    pub p_flags: u32,
    /// Segment alignment
    pub p_align: u32,
}

impl Elf32ProgramHeader {
    /// Decode a program header record.
    pub fn parse(bytes: &[u8]) -> Result<Self, ElfError> {
        if bytes.len() < PHDR_SIZE {
            return Err(ElfError::TooSmall);
        }

        Ok(Self {
            p_type: u32_at(bytes, 0),
            p_offset: u32_at(bytes, 4),
            p_vaddr: u32_at(bytes, 8),
            p_paddr: u32_at(bytes, 12),
            p_filesz: u32_at(bytes, 16),
            p_memsz: u32_at(bytes, 20),
            p_flags: u32_at(bytes, 24),
            p_align: u32_at(bytes, 28),
        })
    }

    /// Classify this entry.
    pub fn kind(&self) -> SegmentKind {
        match self.p_type {
            PT_LOAD => SegmentKind::Load,
            PT_DYNAMIC | PT_INTERP | PT_SHLIB => SegmentKind::Unsupported,
            // PT_NULL, PT_NOTE, PT_PHDR, PT_GNU_STACK and anything unknown
            _ => SegmentKind::Ignored,
        }
    }

    /// Permission flags
    pub fn flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.p_flags)
    }

    /// Check if segment is writable
    pub fn is_writable(&self) -> bool {
        self.flags().contains(SegmentFlags::W)
    }
}
