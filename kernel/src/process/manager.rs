//! Process Manager
//!
//! Process creation, loading, waiting and exit.
//!
//! `execute` runs on the parent's thread and blocks until the child has
//! either loaded its image or failed to. `start_process` is the body of the
//! child's kernel thread: it loads the executable, builds the argument
//! stack and enters user mode. Every path out of user mode ends in `exit`.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::context::{process_name, Process, ProcessId};
use super::lifecycle::LifecycleRecord;
use crate::config::{KILLED_STATUS, MAX_CMDLINE_LEN};
use crate::loader::{self, build_stack, ArgumentVector, LoadError};
use crate::memory::StackDump;
use crate::platform::ThreadRoutine;

/// Process creation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// No kernel thread could be created
    Spawn,
    /// The child could not load its executable
    LoadFailed,
}

impl core::fmt::Display for ExecError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spawn => write!(f, "cannot create thread"),
            Self::LoadFailed => write!(f, "load failed"),
        }
    }
}

/// Copy of `cmd_line` that fits a page together with its terminator.
fn bounded_copy(cmd_line: &[u8]) -> Vec<u8> {
    cmd_line[..cmd_line.len().min(MAX_CMDLINE_LEN)].to_vec()
}

/// Start a child of `parent` running `cmd_line`.
///
/// Returns once the child has loaded. A child that fails to load is never
/// visible to `wait`.
pub fn execute(parent: &Process, cmd_line: impl AsRef<[u8]>) -> Result<ProcessId, ExecError> {
    let cmd_line = bounded_copy(cmd_line.as_ref());
    let name = process_name(&cmd_line);
    let label = String::from_utf8_lossy(&name).into_owned();
    let platform = Arc::clone(parent.platform());

    let pid = ProcessId::allocate();
    let record = LifecycleRecord::child_of(parent.record(), pid);
    parent.record().adopt(Arc::clone(&record));

    let child = Process::new(name, Arc::clone(&record), Arc::clone(&platform));
    let routine: ThreadRoutine = Box::new(move || start_process(child, cmd_line));

    if let Err(e) = platform.scheduler.spawn(&label, routine) {
        log::warn!("[KPIO Proc] {}: {}", label, e);
        parent.record().withdraw(pid);
        return Err(ExecError::Spawn);
    }

    if !record.await_startup(platform.scheduler.as_ref()) {
        parent.record().withdraw(pid);
        return Err(ExecError::LoadFailed);
    }

    log::info!(
        "[KPIO Proc] Created process {} '{}' (parent {})",
        pid,
        label,
        parent.pid()
    );
    Ok(pid)
}

/// Body of a new process's kernel thread.
pub fn start_process(mut process: Process, cmd_line: Vec<u8>) {
    let platform = Arc::clone(process.platform());
    let argv = ArgumentVector::parse(&cmd_line);

    match prepare(&mut process, &argv) {
        Ok((entry, esp)) => {
            process.record().report_loaded(true, platform.scheduler.as_ref());
            platform.cpu.enter_user(&mut process, entry, esp);

            // Left user mode without calling exit
            if !process.has_exited() {
                log::warn!(
                    "[KPIO Proc] Process {} '{}' killed",
                    process.pid(),
                    process.label()
                );
                exit(&mut process, KILLED_STATUS);
            }
        }
        Err(e) => {
            log::warn!("[KPIO Loader] {}: {}", process.label(), e);
            exit(&mut process, KILLED_STATUS);
            process.record().report_loaded(false, platform.scheduler.as_ref());
        }
    }
}

/// Load the image, switch to it and marshal `argv`. Returns entry and esp.
fn prepare(process: &mut Process, argv: &ArgumentVector) -> Result<(u32, u32), LoadError> {
    let platform = Arc::clone(process.platform());
    let image = loader::load(&platform, argv.program().unwrap_or(&[]))?;

    let space = process.space.insert(image.space);
    platform.cpu.activate(Some(space));

    let esp = build_stack(space, image.stack_top, argv)?;

    if log::log_enabled!(log::Level::Trace) {
        let dump = StackDump::capture(space, esp);
        log::trace!("[KPIO Loader] {} initial stack:\n{}", process.label(), dump);
    }

    Ok((image.entry_point, esp))
}

/// Wait for child `pid` of `process` and return its exit status.
///
/// -1 if `pid` is not a child or was already waited for.
pub fn wait(process: &Process, pid: ProcessId) -> i32 {
    let scheduler = Arc::clone(&process.platform().scheduler);
    let status = process.record().wait_for(pid, scheduler.as_ref());
    log::debug!("[KPIO Proc] {} waited for {}: {}", process.pid(), pid, status);
    status
}

/// Terminate `process` with `status`.
///
/// Closes all files, reports the exit, settles lifecycle accounting (waiting
/// for running children if needed) and tears down the address space. Does
/// nothing if the process already exited.
pub fn exit(process: &mut Process, status: i32) {
    if process.has_exited() {
        return;
    }
    let platform = Arc::clone(process.platform());

    let closed = process.files.close_all();
    let mut line = process.name().to_vec();
    line.extend_from_slice(format!(": exit({})\n", status).as_bytes());
    platform.console.write(&line);
    log::info!(
        "[KPIO Proc] Process {} '{}' exited with status {} ({} files closed)",
        process.pid(),
        process.label(),
        status,
        closed
    );

    if process.record().finish(status, platform.scheduler.as_ref()) {
        log::debug!(
            "[KPIO Proc] Process {} waiting for {} children",
            process.pid(),
            process.record().alive_count()
        );
        process.record().drain(platform.scheduler.as_ref());
    }

    if let Some(space) = process.space.take() {
        platform.cpu.activate(None);
        drop(space);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_copy() {
        assert_eq!(bounded_copy(b"echo x"), b"echo x");
        let long = "y".repeat(MAX_CMDLINE_LEN + 100);
        assert_eq!(bounded_copy(long.as_bytes()).len(), MAX_CMDLINE_LEN);
    }

    #[test]
    fn test_exec_error_display() {
        assert_eq!(format!("{}", ExecError::LoadFailed), "load failed");
    }
}
