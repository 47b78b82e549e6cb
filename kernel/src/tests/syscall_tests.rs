//! System Call Scenario Tests
//!
//! User programs trapping into the dispatcher with well-formed and
//! malformed frames.

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::vec::Vec;

    use spin::Mutex;

    use crate::config::{FD_TABLE_CAPACITY, PHYS_BASE};
    use crate::process::{execute, wait};
    use crate::syscall::SyscallNumber;
    use crate::tests::mock::{settle, TestRig, User, DATA_BASE, DATA_SIZE, TEXT_BASE};

    /// Run `program` as "prog" and return its exit status.
    fn run<F>(rig: &TestRig, program: F) -> i32
    where
        F: Fn(&mut User<'_>) -> Option<()> + Send + Sync + 'static,
    {
        rig.install("prog", program);
        let root = rig.root();
        let pid = execute(&root, "prog").unwrap();
        wait(&root, pid)
    }

    /// Collects values observed inside a user program.
    fn observer() -> (Arc<Mutex<Vec<i32>>>, Arc<Mutex<Vec<i32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Arc::clone(&seen), seen)
    }

    // ========================================
    // Console
    // ========================================

    #[test]
    fn test_console_write() {
        let rig = TestRig::new();
        let (seen, record) = observer();
        let status = run(&rig, move |u| {
            record.lock().push(u.write(1, b"hello, world\n")?);
            u.exit(0)
        });

        assert_eq!(status, 0);
        assert_eq!(*seen.lock(), [13]);
        assert_eq!(rig.console.output(), "hello, world\nprog: exit(0)\n");
    }

    #[test]
    fn test_zero_byte_write() {
        let rig = TestRig::new();
        let (seen, record) = observer();
        run(&rig, move |u| {
            record.lock().push(u.write(1, b"")?);
            u.exit(0)
        });
        assert_eq!(*seen.lock(), [0]);
    }

    #[test]
    fn test_stdin_read() {
        let rig = TestRig::new();
        rig.console.type_keys(b"hi!");
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&bytes);
        let status = run(&rig, move |u| {
            let (n, data) = u.read(0, 3)?;
            record.lock().extend_from_slice(&data);
            u.exit(n)
        });

        assert_eq!(status, 3);
        assert_eq!(bytes.lock().as_slice(), b"hi!");
    }

    #[test]
    fn test_wrong_direction() {
        let rig = TestRig::new();
        let (seen, record) = observer();
        run(&rig, move |u| {
            let (n, _) = u.read(1, 4)?;
            record.lock().push(n);
            record.lock().push(u.write(0, b"nope")?);
            u.exit(0)
        });
        assert_eq!(*seen.lock(), [-1, -1]);
        assert!(!rig.console.output().contains("nope"));
    }

    // ========================================
    // Files
    // ========================================

    #[test]
    fn test_file_operations() {
        let rig = TestRig::new();
        let (seen, record) = observer();
        let contents = Arc::new(Mutex::new(Vec::new()));
        let read_back = Arc::clone(&contents);
        let status = run(&rig, move |u| {
            let mut log = Vec::new();
            log.push(u.create("notes", 16)?);
            log.push(u.create("notes", 16)?);
            let fd = u.open("notes")?;
            log.push(fd);
            log.push(u.write(fd, b"hello")?);
            log.push(u.tell(fd)?);
            u.seek(fd, 0)?;
            let (n, data) = u.read(fd, 5)?;
            log.push(n);
            read_back.lock().extend_from_slice(&data);
            log.push(u.filesize(fd)?);
            u.seek(fd, 100)?;
            log.push(u.tell(fd)?);
            u.close(fd)?;
            log.push(u.tell(fd)?);
            log.push(u.remove("notes")?);
            log.push(u.open("notes")?);
            record.lock().extend(log);
            u.exit(0)
        });

        assert_eq!(status, 0);
        assert_eq!(*seen.lock(), [1, 0, 2, 5, 5, 5, 16, 16, -1, 1, -1]);
        assert_eq!(contents.lock().as_slice(), b"hello");
    }

    #[test]
    fn test_lowest_fd_reused() {
        let rig = TestRig::new();
        rig.fs.insert("f", std::vec![0; 4]);
        let (seen, record) = observer();
        run(&rig, move |u| {
            let a = u.open("f")?;
            let b = u.open("f")?;
            u.close(a)?;
            let c = u.open("f")?;
            record.lock().extend([a, b, c]);
            u.exit(0)
        });
        assert_eq!(*seen.lock(), [2, 3, 2]);
    }

    #[test]
    fn test_double_close_is_noop() {
        let rig = TestRig::new();
        rig.fs.insert("f", std::vec![0; 4]);
        let status = run(&rig, |u| {
            let fd = u.open("f")?;
            u.close(fd)?;
            u.close(fd)?;
            u.close(0)?;
            u.close(-5)?;
            u.close(1000)?;
            u.exit(7)
        });
        assert_eq!(status, 7);
    }

    #[test]
    fn test_unopened_fd_queries() {
        let rig = TestRig::new();
        let (seen, record) = observer();
        run(&rig, move |u| {
            u.seek(9, 4)?;
            let tell = u.tell(9)?;
            let size = u.filesize(9)?;
            let (n, _) = u.read(9, 4)?;
            let w = u.write(9, b"x")?;
            record.lock().extend([tell, size, n, w]);
            u.exit(0)
        });
        assert_eq!(*seen.lock(), [-1, -1, -1, -1]);
    }

    #[test]
    fn test_seek_on_unopened_fd_resumes() {
        let rig = TestRig::new();
        let status = run(&rig, |u| {
            u.seek(0, 4)?;
            u.seek(1, 4)?;
            u.seek(77, 4)?;
            u.exit(5)
        });
        assert_eq!(status, 5);
    }

    #[test]
    fn test_file_names_keep_raw_bytes() {
        let rig = TestRig::new();
        let (seen, record) = observer();
        run(&rig, move |u| {
            let a = u.create(b"n\xff", 4)?;
            let b = u.create(b"n\xfe", 4)?;
            let again = u.create(b"n\xff", 4)?;
            let fd = u.open(b"n\xfe")?;
            let gone = u.remove(b"n\xff")?;
            let reopen = u.open(b"n\xff")?;
            record.lock().extend([a, b, again, fd, gone, reopen]);
            u.exit(0)
        });
        assert_eq!(*seen.lock(), [1, 1, 0, 2, 1, -1]);
    }

    #[test]
    fn test_fd_table_full() {
        let rig = TestRig::new();
        rig.fs.insert("f", std::vec![0; 4]);
        let (seen, record) = observer();
        run(&rig, move |u| {
            let mut fds = Vec::new();
            for _ in 0..FD_TABLE_CAPACITY {
                fds.push(u.open("f")?);
            }
            let overflow = u.open("f")?;
            let mut log = record.lock();
            log.push(fds[0]);
            log.push(*fds.last()?);
            log.push(overflow);
            drop(log);
            u.exit(0)
        });

        assert_eq!(*seen.lock(), [2, 2 + FD_TABLE_CAPACITY as i32 - 1, -1]);
        assert!(settle(|| rig.fs.open_handles() == 0));
    }

    #[test]
    fn test_open_missing_file() {
        let rig = TestRig::new();
        let status = run(&rig, |u| {
            let fd = u.open("missing")?;
            u.exit(fd)
        });
        assert_eq!(status, -1);
    }

    #[test]
    fn test_exit_closes_files() {
        let rig = TestRig::new();
        rig.fs.insert("f", std::vec![0; 4]);
        let status = run(&rig, |u| {
            u.open("f")?;
            u.open("f")?;
            u.exit(0)
        });
        assert_eq!(status, 0);
        assert_eq!(rig.fs.open_handles(), 0);
    }

    #[test]
    fn test_killed_process_closes_files() {
        let rig = TestRig::new();
        rig.fs.insert("f", std::vec![0; 4]);
        let status = run(&rig, |u| {
            u.open("f")?;
            u.trap(0)?;
            u.exit(0)
        });
        assert_eq!(status, -1);
        assert_eq!(rig.fs.open_handles(), 0);
    }

    // ========================================
    // Malformed frames
    // ========================================

    #[test]
    fn test_unknown_syscall_kills() {
        let rig = TestRig::new();
        let status = run(&rig, |u| {
            u.syscall(99, &[])?;
            u.exit(0)
        });
        assert_eq!(status, -1);
        assert!(rig.console.output().contains("prog: exit(-1)\n"));
    }

    #[test]
    fn test_null_stack_pointer() {
        let rig = TestRig::new();
        assert_eq!(run(&rig, |u| {
            u.trap(0)?;
            u.exit(0)
        }), -1);
    }

    #[test]
    fn test_kernel_stack_pointer() {
        let rig = TestRig::new();
        assert_eq!(run(&rig, |u| {
            u.trap(PHYS_BASE + 0x100)?;
            u.exit(0)
        }), -1);
    }

    #[test]
    fn test_stack_word_straddles_phys_base() {
        let rig = TestRig::new();
        assert_eq!(run(&rig, |u| {
            u.trap(PHYS_BASE - 2)?;
            u.exit(0)
        }), -1);
    }

    #[test]
    fn test_argument_past_stack_top() {
        // The number word is valid but its first argument is not
        let rig = TestRig::new();
        assert_eq!(run(&rig, |u| {
            let esp = PHYS_BASE - 4;
            u.poke(esp, SyscallNumber::Exit as u32)?;
            u.trap(esp)?;
            u.exit(0)
        }), -1);
    }

    #[test]
    fn test_buffer_one_byte_past_segment() {
        let rig = TestRig::new();
        let status = run(&rig, |u| {
            let start = DATA_BASE + DATA_SIZE - 0x100;
            u.syscall(SyscallNumber::Write as u32, &[1, start, 0x100])?;
            u.syscall(SyscallNumber::Write as u32, &[1, start, 0x101])?;
            u.exit(0)
        });
        assert_eq!(status, -1);
    }

    #[test]
    fn test_read_into_unmapped_buffer() {
        let rig = TestRig::new();
        rig.console.type_keys(b"abcd");
        let status = run(&rig, |u| {
            u.syscall(SyscallNumber::Read as u32, &[0, 0x1000_0000, 4])?;
            u.exit(0)
        });
        assert_eq!(status, -1);
    }

    #[test]
    fn test_read_into_read_only_page_kills() {
        let rig = TestRig::new();
        rig.console.type_keys(b"abcd");
        let text = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&text);
        let status = run(&rig, move |u| {
            record.lock().extend(u.read_mem(TEXT_BASE, 4));
            u.syscall(SyscallNumber::Read as u32, &[0, TEXT_BASE, 4])?;
            record.lock().extend(u.read_mem(TEXT_BASE, 4));
            u.exit(0)
        });

        assert_eq!(status, -1);
        assert_eq!(text.lock().as_slice(), [0x90; 4]);
        assert_eq!(rig.console.pending_keys(), 4);
    }

    #[test]
    fn test_bad_string_pointer() {
        let rig = TestRig::new();
        assert_eq!(run(&rig, |u| {
            u.syscall(SyscallNumber::Open as u32, &[PHYS_BASE])?;
            u.exit(0)
        }), -1);

        let rig = TestRig::new();
        assert_eq!(run(&rig, |u| {
            u.syscall(SyscallNumber::Create as u32, &[0, 16])?;
            u.exit(0)
        }), -1);
    }

    #[test]
    fn test_unterminated_string_at_segment_end() {
        let rig = TestRig::new();
        let status = run(&rig, |u| {
            let tail = DATA_BASE + DATA_SIZE - 4;
            u.poke(tail, u32::from_le_bytes(*b"abcd"))?;
            u.syscall(SyscallNumber::Exec as u32, &[tail])?;
            u.exit(0)
        });
        assert_eq!(status, -1);
    }

    // ========================================
    // Misc
    // ========================================

    #[test]
    fn test_sleep_converts_to_ticks() {
        let rig = TestRig::new();
        run(&rig, |u| {
            u.sleep(250)?;
            u.sleep(0)?;
            u.exit(0)
        });
        assert_eq!(*rig.timer.sleeps.lock(), [25, 0]);
    }

    #[test]
    fn test_halt_powers_off() {
        let rig = TestRig::new();
        let status = run(&rig, |u| {
            u.halt()?;
            u.exit(0)
        });
        assert!(rig.cpu.powered_off.load(Ordering::SeqCst));
        assert_eq!(status, -1);
    }
}
