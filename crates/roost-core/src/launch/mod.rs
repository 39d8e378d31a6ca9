//! Detached dashboard process lifecycle: pid file, SIGTERM stop, signal-0
//! status probe, and a bounded HTTP readiness poll.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, RoostError};

pub const PID_FILE: &str = ".dashboard.pid";
pub const LOG_FILE: &str = "dashboard.log";

pub const DEFAULT_READY_ATTEMPTS: u32 = 30;
pub const DEFAULT_READY_INTERVAL: Duration = Duration::from_secs(1);

/// How the dashboard runs: `npm run dev` or the built `npm run start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Dev,
    Prod,
}

impl Mode {
    pub fn npm_script(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "start",
        }
    }
}

/// Probe verdict for the recorded pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "pid")]
pub enum Status {
    Running(u32),
    Stopped,
    /// A pid is recorded but the process is gone (crash, reboot).
    Stale(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    /// The poll budget ran out. The process may still be starting; this is
    /// reported to the user, not raised as an error.
    NotReady,
}

#[derive(Debug)]
pub struct LaunchResult {
    pub pid: u32,
    pub ready: ReadyState,
    pub log_path: PathBuf,
}

/// Manages the dashboard process rooted at one install directory.
pub struct Launcher {
    install_dir: PathBuf,
    ready_attempts: u32,
    ready_interval: Duration,
}

impl Launcher {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            ready_attempts: DEFAULT_READY_ATTEMPTS,
            ready_interval: DEFAULT_READY_INTERVAL,
        }
    }

    pub fn with_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_attempts = attempts.max(1);
        self.ready_interval = interval;
        self
    }

    pub fn pid_path(&self) -> PathBuf {
        self.install_dir.join(PID_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.install_dir.join(LOG_FILE)
    }

    /// Recorded pid, if the pid file exists and parses.
    pub fn read_pid(&self) -> Option<u32> {
        let contents = std::fs::read_to_string(self.pid_path()).ok()?;
        contents.trim().parse().ok()
    }

    /// Remove the pid record. Missing file is fine.
    pub fn clear_pid(&self) -> Result<()> {
        match std::fs::remove_file(self.pid_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Probe the recorded pid without touching the record. Pure read; the
    /// CLI decides whether to clear a stale entry.
    pub fn status(&self) -> Status {
        match self.read_pid() {
            None => Status::Stopped,
            Some(pid) if process_alive(pid) => Status::Running(pid),
            Some(pid) => Status::Stale(pid),
        }
    }

    /// Remove a stale pid record. No-op when the process is live or no pid
    /// is recorded.
    pub fn clear_stale(&self) -> Result<bool> {
        match self.status() {
            Status::Stale(pid) => {
                debug!(pid, "clearing stale pid record");
                self.clear_pid()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Spawn the dashboard detached and poll until it answers HTTP or the
    /// poll budget runs out.
    pub async fn start(&self, mode: Mode, port: u16) -> Result<LaunchResult> {
        match self.status() {
            Status::Running(pid) => return Err(RoostError::AlreadyRunning(pid)),
            Status::Stale(pid) => {
                debug!(pid, "replacing stale pid record");
                self.clear_pid()?;
            }
            Status::Stopped => {}
        }

        let pid = self.spawn(mode, port)?;
        std::fs::write(self.pid_path(), pid.to_string())?;
        info!(pid, port, script = mode.npm_script(), "dashboard spawned");

        let ready = poll_ready(port, self.ready_attempts, self.ready_interval).await;
        if ready == ReadyState::NotReady {
            warn!(
                attempts = self.ready_attempts,
                "dashboard did not answer within the poll budget; it may still be starting"
            );
        }

        Ok(LaunchResult {
            pid,
            ready,
            log_path: self.log_path(),
        })
    }

    #[cfg(unix)]
    fn spawn(&self, mode: Mode, port: u16) -> Result<u32> {
        use std::os::unix::process::CommandExt;

        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        let log_err = log.try_clone()?;

        let child = std::process::Command::new("npm")
            .args(["run", mode.npm_script()])
            .current_dir(&self.install_dir)
            .env("PORT", port.to_string())
            .stdin(std::process::Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .process_group(0)
            .spawn()
            .map_err(|e| RoostError::Launch(format!("failed to spawn npm: {e}")))?;

        Ok(child.id())
    }

    #[cfg(not(unix))]
    fn spawn(&self, _mode: Mode, _port: u16) -> Result<u32> {
        Err(RoostError::Launch(
            "detached launch is only supported on unix".to_string(),
        ))
    }

    /// SIGTERM the recorded process. Returns `Ok(true)` when a signal was
    /// delivered, `Ok(false)` when nothing was running. The pid file is
    /// removed either way, so stop is idempotent.
    pub fn stop(&self) -> Result<bool> {
        let Some(pid) = self.read_pid() else {
            return Ok(false);
        };

        let delivered = send_sigterm(pid)?;
        if !delivered {
            debug!(pid, "process already gone");
        }
        self.clear_pid()?;
        Ok(delivered)
    }
}

/// GET `http://localhost:<port>/` once per interval until the service
/// answers or `attempts` runs out. 2xx or 404 both count as ready: the
/// listener is up before its routes exist. Sleeps first so a freshly
/// spawned process gets a beat before the first probe.
pub async fn poll_ready(port: u16, attempts: u32, interval: Duration) -> ReadyState {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
    {
        Ok(client) => client,
        Err(_) => return ReadyState::NotReady,
    };
    let url = format!("http://localhost:{port}/");

    for attempt in 1..=attempts {
        tokio::time::sleep(interval).await;
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 404 => {
                debug!(attempt, "dashboard answered");
                return ReadyState::Ready;
            }
            Ok(resp) => debug!(attempt, status = %resp.status(), "not ready yet"),
            Err(_) => debug!(attempt, "no answer yet"),
        }
    }
    ReadyState::NotReady
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // Signal 0: existence probe, nothing delivered.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

/// Returns `Ok(false)` when the process no longer exists (ESRCH).
#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<bool> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        return Ok(true);
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(code) if code == libc::ESRCH => Ok(false),
        _ => Err(RoostError::Launch(format!(
            "failed to signal pid {pid}: {}",
            std::io::Error::last_os_error()
        ))),
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> Result<bool> {
    Ok(false)
}
