//! Syscall Tracing and Statistics
//!
//! When tracing is enabled, every syscall entry and exit is logged with
//! the caller's pid, the call's name and argument words, and its result.
//! Per-call invocation counters are kept whether or not tracing is on and
//! are logged by `halt`.
//!
//! # Features
//!
//! - **Syscall tracing**: Log every syscall entry/exit at `trace` level
//! - **Syscall statistics**: Per-syscall invocation counts
//! - **Configurable**: On from boot with the `trace-syscalls` feature, or
//!   toggled at runtime

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{Flow, SyscallNumber, SYSCALL_COUNT};
use crate::config::TRACE_SYSCALLS;
use crate::process::ProcessId;

// ═══════════════════════════════════════════════════════════════════════
// Trace configuration
// ═══════════════════════════════════════════════════════════════════════

/// Global flag controlling whether syscall tracing is active.
static TRACE_ENABLED: AtomicBool = AtomicBool::new(TRACE_SYSCALLS);

/// Enable syscall tracing.
pub fn enable_trace() {
    TRACE_ENABLED.store(true, Ordering::SeqCst);
    log::info!("[KPIO Syscall] Syscall tracing ENABLED");
}

/// Disable syscall tracing.
pub fn disable_trace() {
    TRACE_ENABLED.store(false, Ordering::SeqCst);
    log::info!("[KPIO Syscall] Syscall tracing DISABLED");
}

/// Check if tracing is enabled.
pub fn is_trace_enabled() -> bool {
    TRACE_ENABLED.load(Ordering::Relaxed)
}

// ═══════════════════════════════════════════════════════════════════════
// Syscall statistics
// ═══════════════════════════════════════════════════════════════════════

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);

/// Per-call invocation counters.
#[derive(Debug)]
pub struct SyscallStats {
    /// Counters indexed by syscall number
    counts: [AtomicU64; SYSCALL_COUNT],
    /// Counter for unknown syscall numbers
    unknown_count: AtomicU64,
    /// Total syscall invocations
    total: AtomicU64,
}

impl SyscallStats {
    pub const fn new() -> Self {
        Self {
            counts: [ZERO; SYSCALL_COUNT],
            unknown_count: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record a syscall invocation. `None` is an unknown number.
    pub fn record(&self, call: Option<SyscallNumber>) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match call {
            Some(call) => self.counts[call as usize].fetch_add(1, Ordering::Relaxed),
            None => self.unknown_count.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Invocation count for a specific syscall.
    pub fn count(&self, call: SyscallNumber) -> u64 {
        self.counts[call as usize].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn unknown(&self) -> u64 {
        self.unknown_count.load(Ordering::Relaxed)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in self.counts.iter() {
            counter.store(0, Ordering::Relaxed);
        }
        self.unknown_count.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
    }

    /// Invoked syscalls with their counts, most frequent first.
    pub fn summary(&self) -> Vec<(SyscallNumber, u64)> {
        let mut entries: Vec<(SyscallNumber, u64)> = SyscallNumber::ALL
            .iter()
            .map(|&call| (call, self.count(call)))
            .filter(|&(_, count)| count > 0)
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

impl Default for SyscallStats {
    fn default() -> Self {
        Self::new()
    }
}

static SYSCALL_STATS: SyscallStats = SyscallStats::new();

/// Counters for every syscall dispatched so far.
pub fn stats() -> &'static SyscallStats {
    &SYSCALL_STATS
}

/// Log a summary of syscall statistics.
pub fn dump_stats() {
    log::info!(
        "[KPIO Syscall] {} syscalls, {} unknown",
        SYSCALL_STATS.total(),
        SYSCALL_STATS.unknown()
    );
    for (call, count) in SYSCALL_STATS.summary() {
        log::info!("[KPIO Syscall] {:>3} {:<10} {}", call as u32, call.name(), count);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Trace entry/exit logging
// ═══════════════════════════════════════════════════════════════════════

/// Called from `dispatch` once the syscall number was decoded.
pub fn on_syscall_entry(pid: ProcessId, call: SyscallNumber, args: &[u32]) {
    SYSCALL_STATS.record(Some(call));

    if is_trace_enabled() {
        log::trace!("[KPIO Syscall] pid={} {}{:x?}", pid, call.name(), args);
    }
}

/// Called from `dispatch` after the handler ran.
pub fn on_syscall_exit(pid: ProcessId, call: SyscallNumber, flow: Flow, eax: u32) {
    if !is_trace_enabled() {
        return;
    }
    match flow {
        Flow::Resume => {
            log::trace!("[KPIO Syscall] pid={} {} -> {}", pid, call.name(), eax as i32)
        }
        Flow::Terminated(status) => {
            log::trace!("[KPIO Syscall] pid={} {} terminated ({})", pid, call.name(), status)
        }
        Flow::Halted => log::trace!("[KPIO Syscall] pid={} {} halted", pid, call.name()),
    }
}

/// Called from `dispatch` for a number outside the syscall table.
pub fn on_unknown_syscall(pid: ProcessId, nr: u32) {
    SYSCALL_STATS.record(None);
    log::warn!("[KPIO Syscall] Unknown syscall #{} from pid={}", nr, pid);
}
