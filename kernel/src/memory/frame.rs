//! User page frame pool.
//!
//! Frames backing user pages come from a bounded pool, so exhausting user
//! memory is an ordinary error instead of a kernel allocation failure.
//! A `Frame` returns itself to its pool when dropped, which makes releasing
//! a whole address space a matter of dropping it.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::PAGE_SIZE;

/// Shared accounting for a pool.
#[derive(Debug)]
struct PoolState {
    capacity: usize,
    in_use: AtomicUsize,
}

/// Bounded allocator for user page frames.
#[derive(Debug, Clone)]
pub struct FramePool {
    state: Arc<PoolState>,
}

impl FramePool {
    /// Create a pool able to hand out `capacity` frames at once.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(PoolState {
                capacity,
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    /// Allocate a zero-filled frame, or `None` if the pool is exhausted.
    pub fn allocate(&self) -> Option<Frame> {
        let reserved = self
            .state
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.state.capacity).then_some(used + 1)
            });

        if reserved.is_err() {
            log::warn!("[KPIO Mem] User frame pool exhausted");
            return None;
        }

        Some(Frame {
            bytes: vec![0u8; PAGE_SIZE].into_boxed_slice(),
            pool: Arc::clone(&self.state),
        })
    }

    /// Number of frames currently allocated.
    pub fn in_use(&self) -> usize {
        self.state.in_use.load(Ordering::Acquire)
    }

    /// Number of frames still available.
    pub fn available(&self) -> usize {
        self.state.capacity - self.in_use()
    }

    /// Total number of frames in the pool.
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }
}

/// One page of user memory.
pub struct Frame {
    bytes: Box<[u8]>,
    pool: Arc<PoolState>,
}

impl Frame {
    /// Frame contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable frame contents.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame").field("len", &self.bytes.len()).finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}
