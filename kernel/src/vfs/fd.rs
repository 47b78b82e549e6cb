//! File Descriptor Table
//!
//! Maps small integers to open file handles, one table per process.
//! Descriptors 0 and 1 always refer to console input and output; files
//! occupy the descriptors from 2 up to `2 + FD_TABLE_CAPACITY`.
//!
//! The table owns every handle it holds. `open` moves a handle in, `close`
//! moves it out and drops it, which closes the file.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::config::FD_TABLE_CAPACITY;
use crate::platform::{Console, File};

/// Console input.
pub const STDIN_FILENO: i32 = 0;

/// Console output.
pub const STDOUT_FILENO: i32 = 1;

/// Lowest descriptor handed out for files.
pub const FIRST_FILE_FD: i32 = 2;

/// File descriptor errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// Descriptor is out of range or not open
    BadDescriptor,
    /// Every slot is in use
    TableFull,
    /// Reading from console output or writing to console input
    WrongDirection,
}

impl core::fmt::Display for FdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::TableFull => write!(f, "file descriptor table full"),
            Self::WrongDirection => write!(f, "console descriptor used in wrong direction"),
        }
    }
}

/// Per-process descriptor table.
pub struct FdTable {
    slots: Vec<Option<Box<dyn File>>>,
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for FdTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FdTable")
            .field("open", &self.open_count())
            .finish()
    }
}

impl FdTable {
    /// Create a table with only the console descriptors.
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(FD_TABLE_CAPACITY);
        slots.resize_with(FD_TABLE_CAPACITY, || None);
        Self { slots }
    }

    fn index(fd: i32) -> Option<usize> {
        let index = usize::try_from(fd.checked_sub(FIRST_FILE_FD)?).ok()?;
        (index < FD_TABLE_CAPACITY).then_some(index)
    }

    fn file_mut(&mut self, fd: i32) -> Result<&mut Box<dyn File>, FdError> {
        Self::index(fd)
            .and_then(|i| self.slots[i].as_mut())
            .ok_or(FdError::BadDescriptor)
    }

    fn file(&self, fd: i32) -> Result<&dyn File, FdError> {
        Self::index(fd)
            .and_then(|i| self.slots[i].as_deref())
            .ok_or(FdError::BadDescriptor)
    }

    /// Install `file` in the lowest free slot and return its descriptor.
    ///
    /// On `TableFull` the handle is dropped, closing the file.
    pub fn open(&mut self, file: Box<dyn File>) -> Result<i32, FdError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FdError::TableFull)?;

        self.slots[index] = Some(file);
        let fd = index as i32 + FIRST_FILE_FD;
        log::debug!("[KPIO FD] open -> fd {}", fd);
        Ok(fd)
    }

    /// Close `fd`. Unopened and out-of-range descriptors are ignored.
    ///
    /// Returns whether a file was closed.
    pub fn close(&mut self, fd: i32) -> bool {
        match Self::index(fd).and_then(|i| self.slots[i].take()) {
            Some(_file) => {
                log::debug!("[KPIO FD] close fd {}", fd);
                true
            }
            None => false,
        }
    }

    /// Close every open file. Returns how many were closed.
    pub fn close_all(&mut self) -> usize {
        self.slots
            .iter_mut()
            .filter_map(Option::take)
            .count()
    }

    /// Read into `buf`. Descriptor 0 reads keys from the console, one per byte.
    pub fn read(&mut self, fd: i32, buf: &mut [u8], console: &dyn Console) -> Result<usize, FdError> {
        match fd {
            STDIN_FILENO => {
                for byte in buf.iter_mut() {
                    *byte = console.getc();
                }
                Ok(buf.len())
            }
            STDOUT_FILENO => Err(FdError::WrongDirection),
            _ => Ok(self.file_mut(fd)?.read(buf)),
        }
    }

    /// Write `buf`. Descriptor 1 writes to the console.
    pub fn write(&mut self, fd: i32, buf: &[u8], console: &dyn Console) -> Result<usize, FdError> {
        match fd {
            STDOUT_FILENO => {
                console.write(buf);
                Ok(buf.len())
            }
            STDIN_FILENO => Err(FdError::WrongDirection),
            _ => Ok(self.file_mut(fd)?.write(buf)),
        }
    }

    /// Move the position of `fd`, clamped to the file length.
    pub fn seek(&mut self, fd: i32, position: u32) -> Result<(), FdError> {
        let file = self.file_mut(fd)?;
        let position = position.min(file.length());
        file.seek(position);
        Ok(())
    }

    /// Current position of `fd`.
    pub fn tell(&self, fd: i32) -> Result<u32, FdError> {
        Ok(self.file(fd)?.tell())
    }

    /// Length of the file behind `fd`.
    pub fn filesize(&self, fd: i32) -> Result<u32, FdError> {
        Ok(self.file(fd)?.length())
    }

    /// Number of open files.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
