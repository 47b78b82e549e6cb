//! System call handlers.
//!
//! Each handler receives the decoded argument words. Handlers that take a
//! user pointer validate it before use; a `ValidationError` makes the
//! dispatcher kill the caller.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;

use super::validate::{self, ValidationError};
use super::{trace, user_space, Flow, SyscallFrame, SyscallNumber};
use crate::config::TIMER_FREQUENCY;
use crate::process::{manager, Process, ProcessId};

pub type SyscallResult = Result<Flow, ValidationError>;

/// Handle a system call.
pub fn handle(
    syscall: SyscallNumber,
    process: &mut Process,
    frame: &mut SyscallFrame,
    args: &[u32; 3],
) -> SyscallResult {
    let value = match syscall {
        SyscallNumber::Halt => return handle_halt(process),
        SyscallNumber::Exit => return handle_exit(process, args[0] as i32),
        SyscallNumber::Exec => handle_exec(process, args[0])?,
        SyscallNumber::Wait => handle_wait(process, args[0]),
        SyscallNumber::Create => handle_create(process, args[0], args[1])?,
        SyscallNumber::Remove => handle_remove(process, args[0])?,
        SyscallNumber::Open => handle_open(process, args[0])?,
        SyscallNumber::Filesize => handle_filesize(process, args[0] as i32),
        SyscallNumber::Read => handle_read(process, args[0] as i32, args[1], args[2])?,
        SyscallNumber::Write => handle_write(process, args[0] as i32, args[1], args[2])?,
        SyscallNumber::Tell => handle_tell(process, args[0] as i32),
        SyscallNumber::Seek => {
            handle_seek(process, args[0] as i32, args[1]);
            return Ok(Flow::Resume);
        }
        SyscallNumber::Close => {
            handle_close(process, args[0] as i32);
            return Ok(Flow::Resume);
        }
        SyscallNumber::Sleep => {
            handle_sleep(process, args[0] as i32);
            return Ok(Flow::Resume);
        }
    };

    frame.eax = value as u32;
    Ok(Flow::Resume)
}

fn handle_halt(process: &mut Process) -> SyscallResult {
    log::info!("[KPIO Syscall] halt from pid={}", process.pid());
    trace::dump_stats();
    process.platform().cpu.power_off();
    Ok(Flow::Halted)
}

fn handle_exit(process: &mut Process, status: i32) -> SyscallResult {
    process.files.close_all();
    manager::exit(process, status);
    Ok(Flow::Terminated(status))
}

fn handle_exec(process: &mut Process, cmd_line: u32) -> Result<i32, ValidationError> {
    let cmd_line = validate::copy_in_cstr(user_space(process)?, cmd_line)?;
    match manager::execute(process, &cmd_line) {
        Ok(pid) => Ok(pid.as_raw() as i32),
        Err(e) => {
            log::debug!(
                "[KPIO Syscall] exec '{}': {}",
                String::from_utf8_lossy(&cmd_line),
                e
            );
            Ok(-1)
        }
    }
}

fn handle_wait(process: &mut Process, pid: u32) -> i32 {
    manager::wait(process, ProcessId::from_raw(pid))
}

fn handle_create(process: &mut Process, name: u32, initial_size: u32) -> Result<i32, ValidationError> {
    let name = validate::copy_in_cstr(user_space(process)?, name)?;
    Ok(process.platform().fs.create(&name, initial_size) as i32)
}

fn handle_remove(process: &mut Process, name: u32) -> Result<i32, ValidationError> {
    let name = validate::copy_in_cstr(user_space(process)?, name)?;
    Ok(process.platform().fs.remove(&name) as i32)
}

fn handle_open(process: &mut Process, name: u32) -> Result<i32, ValidationError> {
    let name = validate::copy_in_cstr(user_space(process)?, name)?;
    let file = match process.platform().fs.open(&name) {
        Some(file) => file,
        None => return Ok(-1),
    };

    match process.files.open(file) {
        Ok(fd) => Ok(fd),
        Err(e) => {
            log::debug!("[KPIO FD] open '{}': {}", String::from_utf8_lossy(&name), e);
            Ok(-1)
        }
    }
}

fn handle_filesize(process: &mut Process, fd: i32) -> i32 {
    process.files.filesize(fd).map_or(-1, |len| len as i32)
}

fn handle_read(process: &mut Process, fd: i32, buffer: u32, size: u32) -> Result<i32, ValidationError> {
    validate::check_writable(user_space(process)?, buffer, size)?;

    let platform = Arc::clone(process.platform());
    let mut data = vec![0u8; size as usize];
    let read = match process.files.read(fd, &mut data, platform.console.as_ref()) {
        Ok(read) => read,
        Err(_) => return Ok(-1),
    };

    process
        .space
        .as_mut()
        .ok_or(ValidationError::NoAddressSpace)?
        .write_bytes(buffer, &data[..read])
        .map_err(|_| ValidationError::Unmapped(buffer))?;
    Ok(read as i32)
}

fn handle_write(process: &mut Process, fd: i32, buffer: u32, size: u32) -> Result<i32, ValidationError> {
    let data = validate::copy_in(user_space(process)?, buffer, size)?;

    let platform = Arc::clone(process.platform());
    Ok(process
        .files
        .write(fd, &data, platform.console.as_ref())
        .map_or(-1, |written| written as i32))
}

fn handle_seek(process: &mut Process, fd: i32, position: u32) {
    if let Err(e) = process.files.seek(fd, position) {
        log::debug!("[KPIO FD] seek fd {}: {}", fd, e);
    }
}

fn handle_tell(process: &mut Process, fd: i32) -> i32 {
    process.files.tell(fd).map_or(-1, |pos| pos as i32)
}

fn handle_close(process: &mut Process, fd: i32) {
    process.files.close(fd);
}

fn handle_sleep(process: &mut Process, millis: i32) {
    let ticks = TIMER_FREQUENCY * millis as i64 / 1000;
    process.platform().timer.sleep(ticks);
}
