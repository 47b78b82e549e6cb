//! Structured user stack dump.
//!
//! Captures the words between a stack pointer and `PHYS_BASE` so a freshly
//! built stack can be inspected in logs or tests.

use alloc::vec::Vec;

use super::PageDirectory;
use crate::config::PHYS_BASE;

/// One aligned word of a captured stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackWord {
    /// Address of the word
    pub addr: u32,
    /// Word value, or `None` if the page was not mapped
    pub value: Option<u32>,
}

/// Snapshot of a user stack from `esp` up to `PHYS_BASE`.
#[derive(Debug, Clone)]
pub struct StackDump {
    /// Stack pointer the dump starts from
    pub esp: u32,
    /// Captured words, lowest address first
    pub words: Vec<StackWord>,
}

impl StackDump {
    /// Capture the stack of `space` starting at `esp`.
    pub fn capture(space: &PageDirectory, esp: u32) -> Self {
        let start = esp & !3;
        let words = (start..PHYS_BASE)
            .step_by(4)
            .map(|addr| StackWord {
                addr,
                value: space.read_u32(addr).ok(),
            })
            .collect();

        Self { esp, words }
    }

    /// Word stored at `addr`, if captured.
    pub fn word_at(&self, addr: u32) -> Option<u32> {
        self.words
            .iter()
            .find(|w| w.addr == addr)
            .and_then(|w| w.value)
    }
}

impl core::fmt::Display for StackDump {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "esp = {:#010x}", self.esp)?;
        for word in &self.words {
            match word.value {
                Some(value) => {
                    let bytes = value.to_le_bytes();
                    write!(f, "{:#010x}  {:#010x}  ", word.addr, value)?;
                    for b in bytes {
                        let c = if (0x20..0x7F).contains(&b) { b as char } else { '.' };
                        write!(f, "{}", c)?;
                    }
                    writeln!(f)?;
                }
                None => writeln!(f, "{:#010x}  <unmapped>", word.addr)?,
            }
        }
        Ok(())
    }
}
