// packages/agent/src/test_support.rs
//! Helpers for tests that install process-wide hooks
//!
//! Such tests re-run themselves in a child process so the hooks never
//! outlive the test or leak into the rest of the test binary.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// Set in the child to the fault slot path it should use
const CHILD_SLOT_ENV: &str = "PERISCOPE_TEST_CHILD_SLOT";

/// Fault slot path when running as the re-executed child
pub(crate) fn child_slot() -> Option<PathBuf> {
    std::env::var_os(CHILD_SLOT_ENV).map(PathBuf::from)
}

/// Run exactly one test of this binary in a child process
pub(crate) fn run_in_child(test: &str, slot: &Path) -> ExitStatus {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args([test, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_SLOT_ENV, slot)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap()
}

/// Keep an intentional crash from leaving a core file behind
#[cfg(unix)]
pub(crate) fn disable_core_dumps() {
    let limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    unsafe {
        libc::setrlimit(libc::RLIMIT_CORE, &limit);
    }
}
