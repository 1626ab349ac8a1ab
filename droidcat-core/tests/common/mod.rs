//! Shared helpers for integration tests
//!
//! Tests drive a stand-in `adb`: a small POSIX shell script written into a
//! temporary directory that dispatches on its arguments.

#![allow(dead_code)]

use droidcat_core::{LogcatEvent, LogcatSubscription};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// ETXTBSY on Linux and macOS
const TEXT_FILE_BUSY: i32 = 26;

pub struct FakeAdb {
    dir: TempDir,
    path: PathBuf,
}

impl FakeAdb {
    /// Write an executable script whose body follows the shebang line
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("adb");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write fake adb");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake adb");
        wait_until_executable(&path);
        Self { dir, path }
    }

    pub fn path(&self) -> &str {
        self.path.to_str().expect("utf-8 temp path")
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Another test thread may still hold the freshly written file open in a
/// forked child; retry until exec stops reporting ETXTBSY.
fn wait_until_executable(path: &Path) {
    for _ in 0..100 {
        match std::process::Command::new(path).arg("--version").output() {
            Err(e) if e.raw_os_error() == Some(TEXT_FILE_BUSY) => {
                std::thread::sleep(Duration::from_millis(10));
            }
            _ => return,
        }
    }
}

/// Next event, failing the test if nothing arrives in time
pub async fn next_event(subscription: &mut LogcatSubscription) -> LogcatEvent {
    tokio::time::timeout(Duration::from_secs(10), subscription.recv())
        .await
        .expect("timed out waiting for logcat event")
        .expect("event channel closed")
}

/// Collect events up to and including the next `Closed`
pub async fn events_until_closed(subscription: &mut LogcatSubscription) -> Vec<LogcatEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(subscription).await;
        let closed = matches!(event, LogcatEvent::Closed { .. });
        events.push(event);
        if closed {
            return events;
        }
    }
}

/// True if a process with this pid still exists and is not a zombie.
///
/// Killed orphans may wait a while for init to reap them, so a zombie
/// counts as gone.
pub fn process_alive(pid: u32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let state = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next());
        return state != Some('Z');
    }
    std::process::Command::new("/bin/sh")
        .args(["-c", &format!("kill -0 {} 2>/dev/null", pid)])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Wait briefly for a killed process to disappear
pub async fn process_gone(pid: u32) -> bool {
    for _ in 0..200 {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Read a pid written by a test script, waiting for the file to appear
pub async fn read_pid(path: &Path) -> u32 {
    for _ in 0..500 {
        if let Ok(content) = tokio::fs::read_to_string(path).await {
            if let Ok(pid) = content.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no pid written to {}", path.display());
}
