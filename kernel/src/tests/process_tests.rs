//! Process Management Unit Tests
//!
//! Tests for process creation, wait/exit and parent/child bookkeeping.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use std::vec::Vec;

    use spin::Mutex;

    use crate::process::{execute, exit, wait, ExecError, Phase, ProcessId};
    use crate::tests::mock::{settle, TestRig};

    // ========================================
    // Wait semantics
    // ========================================

    #[test]
    fn test_wait_returns_status_once() {
        let rig = TestRig::new();
        rig.install("child", |u| u.exit(42));

        let root = rig.root();
        let pid = execute(&root, "child").unwrap();
        assert_eq!(wait(&root, pid), 42);
        assert_eq!(wait(&root, pid), -1);
        assert!(rig.console.output().contains("child: exit(42)\n"));
    }

    #[test]
    fn test_wait_blocks_until_exit() {
        let rig = TestRig::new();
        let gate = Arc::new(AtomicBool::new(false));
        let release = Arc::clone(&gate);
        rig.install("slow", move |u| {
            while !release.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
            u.exit(9)
        });

        let root = rig.root();
        let pid = execute(&root, "slow").unwrap();
        assert_eq!(root.record().alive_count(), 1);

        let opener = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                gate.store(true, Ordering::SeqCst);
            })
        };

        assert_eq!(wait(&root, pid), 9);
        opener.join().unwrap();
    }

    #[test]
    fn test_blocked_wait_is_parked() {
        let rig = TestRig::new();
        let gate = Arc::new(AtomicBool::new(false));
        let release = Arc::clone(&gate);
        rig.install("slow", move |u| {
            while !release.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
            u.exit(9)
        });

        let root = rig.root();
        let pid = execute(&root, "slow").unwrap();
        let waiter = std::thread::spawn(move || wait(&root, pid));

        assert!(settle(|| rig.scheduler.parked.load(Ordering::SeqCst) == 1));
        let blocks = rig.scheduler.blocks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(rig.scheduler.blocks.load(Ordering::SeqCst), blocks);
        assert_eq!(rig.scheduler.parked.load(Ordering::SeqCst), 1);

        gate.store(true, Ordering::SeqCst);
        assert_eq!(waiter.join().unwrap(), 9);
        assert_eq!(rig.scheduler.parked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wait_on_non_child() {
        let rig = TestRig::new();
        let root = rig.root();
        assert_eq!(wait(&root, ProcessId::from_raw(0)), -1);
        assert_eq!(wait(&root, root.pid()), -1);

        // Another process's child is not ours
        rig.install("kid", |u| u.exit(1));
        let other = rig.root();
        let pid = execute(&other, "kid").unwrap();
        assert_eq!(wait(&root, pid), -1);
        assert_eq!(wait(&other, pid), 1);
    }

    #[test]
    fn test_sibling_exit_order_independent() {
        let rig = TestRig::new();
        let a_may_exit = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&a_may_exit);
        rig.install("a", move |u| {
            while !gate.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
            u.exit(11)
        });
        rig.install("b", |u| u.exit(22));

        let root = rig.root();
        let a = execute(&root, "a").unwrap();
        let b = execute(&root, "b").unwrap();

        assert!(settle(|| root.record().alive_count() == 1));
        a_may_exit.store(true, Ordering::SeqCst);

        assert_eq!(wait(&root, a), 11);
        assert_eq!(wait(&root, b), 22);
    }

    #[test]
    fn test_concurrent_child_exits() {
        const CHILDREN: i32 = 16;
        let rig = TestRig::new();
        let go = Arc::new(AtomicBool::new(false));
        for i in 0..CHILDREN {
            let go = Arc::clone(&go);
            rig.install(&std::format!("c{}", i), move |u| {
                while !go.load(Ordering::SeqCst) {
                    std::thread::yield_now();
                }
                u.exit(i)
            });
        }

        let root = rig.root();
        let pids: Vec<ProcessId> = (0..CHILDREN)
            .map(|i| execute(&root, &std::format!("c{}", i)).unwrap())
            .collect();
        assert_eq!(root.record().alive_count(), CHILDREN as usize);

        go.store(true, Ordering::SeqCst);
        assert!(settle(|| root.record().alive_count() == 0));
        assert_eq!(root.record().child_count(), CHILDREN as usize);

        for (i, pid) in pids.iter().enumerate() {
            assert_eq!(wait(&root, *pid), i as i32);
        }
        assert_eq!(root.record().child_count(), 0);
        assert!(settle(|| rig.frames.in_use() == 0));
    }

    // ========================================
    // Nested processes
    // ========================================

    #[test]
    fn test_exec_and_wait_from_user() {
        let rig = TestRig::new();
        rig.install("leaf", |u| u.exit(3));
        rig.install("parent", |u| {
            let pid = u.exec("leaf")?;
            let status = u.wait(pid)?;
            u.exit(status * 10)
        });

        let root = rig.root();
        let pid = execute(&root, "parent").unwrap();
        assert_eq!(wait(&root, pid), 30);
    }

    #[test]
    fn test_exec_passes_raw_argument_bytes() {
        let rig = TestRig::new();
        let arg = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&arg);
        rig.install("child", move |u| {
            *record.lock() = u.arg_bytes(1);
            let argc = u.argc() as i32;
            u.exit(argc)
        });
        rig.install("parent", |u| {
            let pid = u.exec(b"child \xff")?;
            let status = u.wait(pid)?;
            u.exit(status)
        });

        let root = rig.root();
        let pid = execute(&root, "parent").unwrap();
        assert_eq!(wait(&root, pid), 2);
        assert_eq!(arg.lock().as_slice(), [0xff]);
    }

    #[test]
    fn test_exec_missing_from_user() {
        let rig = TestRig::new();
        rig.install("parent", |u| {
            let pid = u.exec("no-such-file")?;
            let status = u.wait(pid)?;
            u.exit(pid + status)
        });

        let root = rig.root();
        let pid = execute(&root, "parent").unwrap();
        assert_eq!(wait(&root, pid), -2);
    }

    #[test]
    fn test_parent_exit_drains_children() {
        let rig = TestRig::new();
        let release = Arc::new(AtomicBool::new(false));
        let child_pid = Arc::new(AtomicI32::new(0));

        let gate = Arc::clone(&release);
        rig.install("grandchild", move |u| {
            while !gate.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }
            u.exit(7)
        });
        let record = Arc::clone(&child_pid);
        rig.install("middle", move |u| {
            let pid = u.exec("grandchild")?;
            record.store(pid, Ordering::SeqCst);
            u.exit(1)
        });

        let root = rig.root();
        let pid = execute(&root, "middle").unwrap();

        // The exit status is published before the grandchild finished
        assert_eq!(wait(&root, pid), 1);
        assert!(settle(|| child_pid.load(Ordering::SeqCst) != 0));

        release.store(true, Ordering::SeqCst);
        assert!(settle(|| rig
            .console
            .output()
            .contains("grandchild: exit(7)\n")));
        assert!(settle(|| rig.frames.in_use() == 0));
    }

    #[test]
    fn test_orphan_records_released() {
        let rig = TestRig::new();
        rig.install("quick", |u| u.exit(0));
        rig.install("spawner", |u| {
            for _ in 0..4 {
                u.exec("quick")?;
            }
            u.exit(0)
        });

        let root = rig.root();
        let pid = execute(&root, "spawner").unwrap();
        assert_eq!(wait(&root, pid), 0);
        assert!(settle(|| rig.console.output().matches("quick: exit(0)").count() == 4));
        assert!(settle(|| rig.frames.in_use() == 0));
    }

    // ========================================
    // Failure paths
    // ========================================

    #[test]
    fn test_spawn_failure() {
        let rig = TestRig::new();
        rig.install("child", |u| u.exit(0));
        rig.scheduler.fail_next_spawn.store(true, Ordering::SeqCst);

        let root = rig.root();
        assert_eq!(execute(&root, "child"), Err(ExecError::Spawn));
        assert_eq!(root.record().alive_count(), 0);
        assert_eq!(root.record().child_count(), 0);
    }

    #[test]
    fn test_program_without_exit_is_killed() {
        let rig = TestRig::new();
        rig.install("runaway", |_u| Some(()));

        let root = rig.root();
        let pid = execute(&root, "runaway").unwrap();
        assert_eq!(wait(&root, pid), -1);
        assert!(rig.console.output().contains("runaway: exit(-1)\n"));
    }

    #[test]
    fn test_root_exit() {
        let rig = TestRig::new();
        let mut root = rig.root();
        exit(&mut root, 0);
        assert_eq!(root.record().phase(), Phase::Exited);
        assert!(rig.console.output().contains("main: exit(0)\n"));

        // A second exit changes nothing
        exit(&mut root, 5);
        assert_eq!(root.record().exit_status(), 0);
    }

    #[test]
    fn test_long_name_truncated() {
        let rig = TestRig::new();
        rig.install("exceedingly-long-name", |u| u.exit(0));

        let root = rig.root();
        let pid = execute(&root, "exceedingly-long-name").unwrap();
        wait(&root, pid);
        assert!(rig.console.output().contains("exceedingly-lon: exit(0)\n"));
    }
}
