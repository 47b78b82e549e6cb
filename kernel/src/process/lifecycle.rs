//! Parent/child lifecycle records.
//!
//! Every process owns one `LifecycleRecord`. A parent keeps an owning
//! handle to each child record it has not reaped yet; a child only holds a
//! weak handle back to its parent's record. A record is freed when its last
//! owner lets go, which is either the parent reaping it or the parent
//! exiting without reaping it, and the child process itself having exited.
//!
//! # State Machine
//!
//! ```text
//!   Running ──exit──▶ Exited ──wait──▶ Reaped
//!      │                 ▲
//!      └──exit──▶ Draining (own children still running)
//! ```
//!
//! A `Draining` process has already published its exit status, so its
//! parent may reap it while it waits for its own children.
//!
//! # Lock Order
//!
//! Parent record first, then child record. `finish` and `wait_for` both
//! follow it, so a parent that registers a wait target never misses the
//! child's wakeup.

use alloc::sync::{Arc, Weak};
use hashbrown::HashMap;
use spin::Mutex;

use super::context::ProcessId;
use crate::config::KILLED_STATUS;
use crate::platform::Scheduler;
use crate::sync::Semaphore;

/// Lifecycle phase of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Executing
    Running,
    /// Exited, waiting for its own children to exit
    Draining,
    /// Exited
    Exited,
    /// Exit status collected by the parent
    Reaped,
}

impl Phase {
    /// True once the exit status is final.
    pub fn has_exited(self) -> bool {
        self != Phase::Running
    }
}

struct RecordState {
    phase: Phase,
    loaded: bool,
    exit_status: i32,
    /// Children still in `Running`
    alive_count: usize,
    /// Children not reaped yet
    children: HashMap<ProcessId, Arc<LifecycleRecord>>,
    wait_target: Option<ProcessId>,
}

/// Bookkeeping shared between a process and its parent.
pub struct LifecycleRecord {
    pid: ProcessId,
    parent: Weak<LifecycleRecord>,
    state: Mutex<RecordState>,
    /// Raised once by the child when its load finished
    startup: Semaphore,
    /// Raised by the child this process waits on
    wait_signal: Semaphore,
    /// Raised when the last running child exits while this process drains
    drain_signal: Semaphore,
}

impl core::fmt::Debug for LifecycleRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LifecycleRecord")
            .field("pid", &self.pid)
            .field("phase", &state.phase)
            .field("exit_status", &state.exit_status)
            .field("alive_count", &state.alive_count)
            .field("children", &state.children.len())
            .finish()
    }
}

impl LifecycleRecord {
    fn with_parent(pid: ProcessId, parent: Weak<LifecycleRecord>) -> Arc<Self> {
        Arc::new(Self {
            pid,
            parent,
            state: Mutex::new(RecordState {
                phase: Phase::Running,
                loaded: false,
                exit_status: KILLED_STATUS,
                alive_count: 0,
                children: HashMap::new(),
                wait_target: None,
            }),
            startup: Semaphore::new(0),
            wait_signal: Semaphore::new(0),
            drain_signal: Semaphore::new(0),
        })
    }

    /// Record for a process without a parent.
    pub fn root(pid: ProcessId) -> Arc<Self> {
        let record = Self::with_parent(pid, Weak::new());
        record.state.lock().loaded = true;
        record
    }

    /// Record for a new child of `parent`. Not yet adopted.
    pub fn child_of(parent: &Arc<Self>, pid: ProcessId) -> Arc<Self> {
        Self::with_parent(pid, Arc::downgrade(parent))
    }

    /// Owning process id.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn exit_status(&self) -> i32 {
        self.state.lock().exit_status
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    /// Children still running.
    pub fn alive_count(&self) -> usize {
        self.state.lock().alive_count
    }

    /// Children not reaped yet.
    pub fn child_count(&self) -> usize {
        self.state.lock().children.len()
    }

    /// Take ownership of a running child's record.
    pub fn adopt(&self, child: Arc<Self>) {
        let mut state = self.state.lock();
        state.alive_count += 1;
        state.children.insert(child.pid, child);
    }

    /// Drop a child that never became runnable.
    ///
    /// The child is no longer counted as running if it did not exit on its
    /// own.
    pub fn withdraw(&self, pid: ProcessId) -> Option<Arc<Self>> {
        let mut state = self.state.lock();
        let child = state.children.remove(&pid)?;
        let mut child_state = child.state.lock();
        if child_state.phase == Phase::Running {
            child_state.phase = Phase::Exited;
            state.alive_count = state.alive_count.saturating_sub(1);
        }
        drop(child_state);
        Some(child)
    }

    /// Publish the load outcome and wake the parent blocked in `execute`.
    pub fn report_loaded(&self, loaded: bool, scheduler: &dyn Scheduler) {
        self.state.lock().loaded = loaded;
        self.startup.up(scheduler);
    }

    /// Block until the load outcome was published. Returns it.
    pub fn await_startup(&self, scheduler: &dyn Scheduler) -> bool {
        self.startup.down(scheduler);
        self.is_loaded()
    }

    /// Wait for child `pid` and reap it.
    ///
    /// Returns -1 without blocking if `pid` is not an unreaped child or is
    /// already being waited on.
    pub fn wait_for(&self, pid: ProcessId, scheduler: &dyn Scheduler) -> i32 {
        let child = {
            let mut state = self.state.lock();
            if state.wait_target == Some(pid) {
                return KILLED_STATUS;
            }
            let child = match state.children.remove(&pid) {
                Some(child) => child,
                None => return KILLED_STATUS,
            };

            let mut child_state = child.state.lock();
            if child_state.phase.has_exited() {
                child_state.phase = Phase::Reaped;
                return child_state.exit_status;
            }
            state.wait_target = Some(pid);
            drop(child_state);
            child
        };

        self.wait_signal.down(scheduler);

        let mut child_state = child.state.lock();
        child_state.phase = Phase::Reaped;
        child_state.exit_status
    }

    /// Record this process's exit with `status`.
    ///
    /// Updates the parent's running count and wakes it if it waits on this
    /// process or drains. Returns true if this process still has running
    /// children and must call [`drain`](Self::drain).
    pub fn finish(&self, status: i32, scheduler: &dyn Scheduler) -> bool {
        let parent = self.parent.upgrade();
        let mut parent_state = parent.as_deref().map(|p| p.state.lock());
        let mut state = self.state.lock();

        if state.phase != Phase::Running {
            return false;
        }
        state.exit_status = status;

        if let (Some(parent), Some(ps)) = (parent.as_deref(), parent_state.as_mut()) {
            ps.alive_count = ps.alive_count.saturating_sub(1);

            if ps.wait_target == Some(self.pid) {
                ps.wait_target = None;
                parent.wait_signal.up(scheduler);
            }

            if ps.phase == Phase::Draining && ps.alive_count == 0 {
                parent.drain_signal.up(scheduler);
            }
        }

        if state.alive_count > 0 {
            state.phase = Phase::Draining;
            return true;
        }

        state.phase = Phase::Exited;
        let orphans = core::mem::take(&mut state.children);
        drop(state);
        drop(parent_state);
        drop(orphans);
        false
    }

    /// Block until every running child exited, then release all child
    /// records.
    pub fn drain(&self, scheduler: &dyn Scheduler) {
        self.drain_signal.down(scheduler);

        let orphans = {
            let mut state = self.state.lock();
            if state.phase == Phase::Draining {
                state.phase = Phase::Exited;
            }
            core::mem::take(&mut state.children)
        };
        drop(orphans);
    }
}
