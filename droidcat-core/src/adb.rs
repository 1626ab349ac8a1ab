//! ADB command execution
//!
//! Every call spawns exactly one bridge subprocess. Output is drained from
//! both pipes while the process runs, and a watchdog kills and reaps the
//! process if it outlives the configured timeout.

use crate::{BridgeError, CommandResult, Result, DEFAULT_WIRELESS_PORT};
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default one-shot command budget
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(30_000);

/// How long pipes may stay open after the process itself has exited
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Android Debug Bridge version (?P<version>\d+(?:\.\d+)*)")
        .expect("version pattern is valid")
});

/// Per-call options for [`AdbExecutor::execute`]
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Prepends `-s <serial>` to the argument vector
    pub serial: Option<String>,
    /// Overrides the executor's default timeout
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    pub fn for_serial<S: Into<String>>(serial: S) -> Self {
        Self {
            serial: Some(serial.into()),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Parsed `adb version` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersion {
    /// Dotted version, or `"unknown"` when the banner did not match
    pub version: String,
    pub raw: String,
}

/// Result of `adb connect` / `adb disconnect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub success: bool,
    pub message: String,
}

/// ADB command executor
#[derive(Debug, Clone)]
pub struct AdbExecutor {
    adb_path: String,
    command_timeout: Duration,
}

impl AdbExecutor {
    /// Create a new executor using `adb` from `PATH`
    pub fn new() -> Self {
        Self::with_path("adb")
    }

    /// Create a new executor with a custom bridge binary
    pub fn with_path<S: Into<String>>(adb_path: S) -> Self {
        Self {
            adb_path: adb_path.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the default command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Get the bridge executable path
    pub fn adb_path(&self) -> &str {
        &self.adb_path
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Build a command for the bridge binary with the given argument vector
    pub(crate) fn command(&self, serial: Option<&str>, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(serial) = serial {
            cmd.args(["-s", serial]);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own group, so a timeout can take down anything the bridge forked
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Run one bridge command to completion.
    ///
    /// A non-zero exit status is not an error here; callers inspect
    /// [`CommandResult::exit_code`]. The timeout covers the process only:
    /// once it has exited its pipes get a short grace period, after which
    /// whatever it forked is killed and the output read so far is returned.
    /// If the timeout fires the whole process group is killed and the
    /// process reaped before `Timeout` is returned.
    pub async fn execute(&self, args: &[&str], options: &ExecOptions) -> Result<CommandResult> {
        let budget = options.timeout.unwrap_or(self.command_timeout);
        debug!(
            "Executing ADB command: {} {}{}",
            self.adb_path,
            options
                .serial
                .as_deref()
                .map(|s| format!("-s {} ", s))
                .unwrap_or_default(),
            args.join(" ")
        );

        let mut child = self
            .command(options.serial.as_deref(), args)
            .spawn()
            .map_err(|e| BridgeError::spawn(&self.adb_path, e))?;
        let pid = child.id();

        let (stop_tx, stop_rx) = watch::channel(false);
        let stdout_task = tokio::spawn(drain(child.stdout.take(), stop_rx.clone()));
        let stderr_task = tokio::spawn(drain(child.stderr.take(), stop_rx));

        let status = match timeout(budget, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "ADB command timed out after {} ms, killing: {}",
                    budget.as_millis(),
                    args.join(" ")
                );
                terminate(&mut child).await;
                // dropping stop_tx ends both readers
                return Err(BridgeError::timeout(budget.as_millis() as u64));
            }
        };

        let readers = futures::future::join(stdout_task, stderr_task);
        tokio::pin!(readers);
        let (out, err) = tokio::select! {
            outputs = &mut readers => outputs,
            _ = tokio::time::sleep(OUTPUT_DRAIN_GRACE) => {
                debug!("Output pipes still open after exit, killing leftover processes");
                if let Some(pid) = pid {
                    kill_group(pid);
                }
                let _ = stop_tx.send(true);
                readers.await
            }
        };

        let result = CommandResult {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&joined(out)?).into_owned(),
            stderr: String::from_utf8_lossy(&joined(err)?).into_owned(),
        };
        debug!(exit_code = ?result.exit_code, "ADB command finished");
        Ok(result)
    }

    /// Run a command through the on-device shell
    pub async fn shell(&self, command: &str, options: &ExecOptions) -> Result<CommandResult> {
        self.execute(&["shell", command], options).await
    }

    /// Query the bridge version; never fails on unexpected output
    pub async fn version(&self) -> Result<ToolVersion> {
        let result = self.execute(&["version"], &ExecOptions::default()).await?;
        Ok(parse_version(&result.stdout))
    }

    /// Connect to a device over TCP/IP
    pub async fn connect(&self, host: &str, port: Option<u16>) -> Result<ConnectOutcome> {
        let address = format!("{}:{}", host, port.unwrap_or(DEFAULT_WIRELESS_PORT));
        info!("Connecting to {} via TCP", address);
        let result = self
            .execute(&["connect", &address], &ExecOptions::default())
            .await?;
        Ok(connect_outcome(&result))
    }

    /// Disconnect one TCP/IP device, or all of them when `host` is `None`
    pub async fn disconnect(
        &self,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<ConnectOutcome> {
        let result = match host {
            Some(host) => {
                let address = format!("{}:{}", host, port.unwrap_or(DEFAULT_WIRELESS_PORT));
                info!("Disconnecting from {}", address);
                self.execute(&["disconnect", &address], &ExecOptions::default())
                    .await?
            }
            None => {
                info!("Disconnecting all TCP/IP devices");
                self.execute(&["disconnect"], &ExecOptions::default()).await?
            }
        };
        Ok(connect_outcome(&result))
    }

    /// Clear the on-device log buffer
    pub async fn clear_logcat(&self, serial: Option<&str>) -> Result<CommandResult> {
        let options = ExecOptions {
            serial: serial.map(str::to_string),
            timeout: None,
        };
        let result = self.execute(&["logcat", "-c"], &options).await?;
        if !result.success() {
            warn!("logcat -c exited with {:?}: {}", result.exit_code, result.stderr.trim());
        }
        Ok(result)
    }
}

impl Default for AdbExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a pipe to EOF, or until `stop` fires or its sender is dropped
async fn drain<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    mut stop: watch::Receiver<bool>,
) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let Some(mut pipe) = pipe else {
        return Ok(buf);
    };
    let mut chunk = [0u8; 8 * 1024];
    loop {
        tokio::select! {
            read = pipe.read(&mut chunk) => match read? {
                0 => break,
                n => buf.extend_from_slice(&chunk[..n]),
            },
            _ = stop.changed() => break,
        }
    }
    Ok(buf)
}

fn joined(output: std::result::Result<std::io::Result<Vec<u8>>, JoinError>) -> Result<Vec<u8>> {
    output
        .map_err(|e| BridgeError::Io(format!("output reader failed: {}", e)))?
        .map_err(BridgeError::from)
}

/// SIGKILL every process in the group led by `pid`
#[cfg(unix)]
pub(crate) fn kill_group(pid: u32) {
    // SAFETY: killpg has no memory-safety preconditions
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            "killpg({}) failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_group(_pid: u32) {}

/// Kill the child's process group and the child itself, then reap it
pub(crate) async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }
    if let Err(e) = child.kill().await {
        warn!("Failed to kill ADB process: {}", e);
    }
}

/// Extract the dotted version from `adb version` output
pub fn parse_version(stdout: &str) -> ToolVersion {
    let version = VERSION_RE
        .captures(stdout)
        .map(|caps| caps["version"].to_string())
        .unwrap_or_else(|| "unknown".to_string());
    ToolVersion {
        version,
        raw: stdout.trim().to_string(),
    }
}

/// Decide whether a connect/disconnect succeeded from its output text
pub fn connect_outcome(result: &CommandResult) -> ConnectOutcome {
    let stdout = result.stdout.trim();
    let message = if stdout.is_empty() {
        result.stderr.trim().to_string()
    } else {
        stdout.to_string()
    };
    let lower = message.to_lowercase();

    let failed = ["failed", "cannot", "unable", "error", "no such device"]
        .iter()
        .any(|needle| lower.contains(needle));
    let success = result.success() && !failed;

    ConnectOutcome { success, message }
}
