//! Counting semaphore.
//!
//! `down` queues the calling thread and blocks it through the scheduler
//! while no permit is available. `up` hands the permit to the longest
//! waiting thread and unblocks it.

use alloc::collections::VecDeque;
use spin::Mutex;

use crate::platform::{Scheduler, TaskId};

#[derive(Debug)]
struct SemaphoreState {
    permits: usize,
    waiters: VecDeque<TaskId>,
}

/// A counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemaphoreState>,
}

impl Semaphore {
    /// Create a semaphore holding `permits` permits.
    pub const fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                permits,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Take a permit, blocking until one is available.
    pub fn down(&self, scheduler: &dyn Scheduler) {
        let mut queued: Option<TaskId> = None;
        loop {
            {
                let mut state = self.state.lock();
                if state.permits > 0 {
                    state.permits -= 1;
                    // A spurious wakeup may find a permit while still queued
                    if let Some(task) = queued {
                        state.waiters.retain(|&t| t != task);
                    }
                    return;
                }
                let task = *queued.get_or_insert_with(|| scheduler.current());
                if !state.waiters.contains(&task) {
                    state.waiters.push_back(task);
                }
            }
            scheduler.block_current();
        }
    }

    /// Take a permit if one is available.
    pub fn try_down(&self) -> bool {
        let mut state = self.state.lock();
        if state.permits == 0 {
            return false;
        }
        state.permits -= 1;
        true
    }

    /// Release a permit and wake one waiter.
    pub fn up(&self, scheduler: &dyn Scheduler) {
        let waiter = {
            let mut state = self.state.lock();
            state.permits += 1;
            state.waiters.pop_front()
        };
        if let Some(task) = waiter {
            scheduler.unblock(task);
        }
    }

    /// Permits currently available.
    pub fn permits(&self) -> usize {
        self.state.lock().permits
    }

    /// Threads currently queued in `down`.
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }
}
