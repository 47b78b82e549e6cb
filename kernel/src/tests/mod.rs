//! Kernel Unit Tests Module
//!
//! Scenario tests that run user programs on the mock platform.

mod process_tests;
mod syscall_tests;
