//! Spawning and signalling the managed collector process.

use crate::cleanup::ProcessRegistry;
use crate::error::{ProvisionError, Result};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// A running managed process.
#[derive(Debug)]
pub struct ManagedProcess {
    pub pid: u32,
    pub command: String,
    pub log_path: PathBuf,
    child: Child,
}

impl ManagedProcess {
    /// Exit status if the process has already exited.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    pub fn into_child(self) -> Child {
        self.child
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    NotRunning,
}

/// Start `binary` in a new session with stdout and stderr
/// appended to `log_path`.
///
/// Any running instance with the same executable name is stopped and the
/// previous log removed first. The pid and log handle are recorded in
/// `registry` so teardown can reach them.
pub fn launch(
    binary: &Path,
    args: &[String],
    log_path: &Path,
    registry: &ProcessRegistry,
) -> Result<ManagedProcess> {
    let process_name = binary
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| binary.to_string_lossy().to_string());

    tracing::info!("Cleaning up old processes and logs...");
    if stop_stale_instances(&process_name) {
        tracing::info!("Stopped existing {} process", process_name);
    }
    if remove_stale_log(log_path)
        .map_err(|e| ProvisionError::io(format!("Could not delete {}", log_path.display()), e))?
    {
        tracing::info!("Deleted old log {}", log_path.display());
    }

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ProvisionError::io(format!("Could not create {}", parent.display()), e))?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| ProvisionError::io(format!("Could not open {}", log_path.display()), e))?;
    let stdout = log_file
        .try_clone()
        .map_err(|e| ProvisionError::io("Could not clone log file handle", e))?;
    let stderr = log_file
        .try_clone()
        .map_err(|e| ProvisionError::io("Could not clone log file handle", e))?;

    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    #[cfg(unix)]
    {
        // New session: own process group, no controlling terminal.
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(io::Error::from)
            });
        }
    }

    #[cfg(windows)]
    {
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let command = format!("{} {}", binary.display(), args.join(" "));
    tracing::debug!("Executing: {}", command);

    let child = cmd
        .spawn()
        .map_err(|e| ProvisionError::io(format!("Could not start {}", binary.display()), e))?;
    let pid = child.id();

    registry.track_process(pid, &process_name);
    registry.track_descriptor(log_file);
    tracing::info!("Started {} (PID: {})", process_name, pid);

    Ok(ManagedProcess {
        pid,
        command: command.trim_end().to_string(),
        log_path: log_path.to_path_buf(),
        child,
    })
}

/// Best-effort stop of every process whose command line mentions
/// `process_name`. Returns whether anything was signalled.
pub fn stop_stale_instances(process_name: &str) -> bool {
    #[cfg(unix)]
    let output = Command::new("pkill").args(["-f", process_name]).output();

    #[cfg(windows)]
    let output = Command::new("taskkill")
        .args(["/F", "/IM", &format!("{}.exe", process_name.trim_end_matches(".exe"))])
        .output();

    #[cfg(not(any(unix, windows)))]
    let output: io::Result<std::process::Output> =
        Err(io::Error::new(io::ErrorKind::Unsupported, "no process lookup"));

    match output {
        Ok(output) => output.status.success(),
        Err(e) => {
            tracing::debug!("Could not look for running {}: {}", process_name, e);
            false
        }
    }
}

/// Delete `log_path`. A missing file is not an error; returns whether a file
/// was removed.
pub fn remove_stale_log(log_path: &Path) -> io::Result<bool> {
    match fs::remove_file(log_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Ask `pid` to shut down (SIGTERM).
pub fn terminate(pid: u32) -> io::Result<SignalOutcome> {
    #[cfg(unix)]
    {
        send_signal(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    {
        taskkill(pid, false)
    }
}

/// Kill `pid` outright (SIGKILL).
pub fn force_kill(pid: u32) -> io::Result<SignalOutcome> {
    #[cfg(unix)]
    {
        send_signal(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    {
        taskkill(pid, true)
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> io::Result<SignalOutcome> {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {}", pid)))?;

    match nix::sys::signal::kill(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(SignalOutcome::Delivered),
        Err(Errno::ESRCH) => Ok(SignalOutcome::NotRunning),
        Err(e) => Err(io::Error::from(e)),
    }
}

#[cfg(not(unix))]
fn taskkill(pid: u32, force: bool) -> io::Result<SignalOutcome> {
    let pid = pid.to_string();
    let mut args = vec!["/PID", pid.as_str(), "/T"];
    if force {
        args.push("/F");
    }
    let output = Command::new("taskkill").args(&args).output()?;
    if output.status.success() {
        Ok(SignalOutcome::Delivered)
    } else {
        Ok(SignalOutcome::NotRunning)
    }
}

/// Contents of a managed process's log, if it can be read.
pub fn dump_log(log_path: &Path) -> Option<String> {
    fs::read(log_path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
}
