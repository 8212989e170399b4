//! Teardown of managed processes on exit, interrupt, termination and panics.
//!
//! Every trigger funnels into one [`Teardown`], which runs at most once.

use crate::supervisor::{self, SignalOutcome};
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedProcess {
    pub pid: u32,
    pub name: String,
}

/// Processes and open descriptors owned by the current run.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes: Mutex<Vec<TrackedProcess>>,
    descriptors: Mutex<Vec<File>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_process(&self, pid: u32, name: &str) {
        lock(&self.processes).push(TrackedProcess {
            pid,
            name: name.to_string(),
        });
    }

    pub fn track_descriptor(&self, file: File) {
        lock(&self.descriptors).push(file);
    }

    /// Stop tracking `pid` so teardown leaves it running.
    pub fn release(&self, pid: u32) -> bool {
        let mut processes = lock(&self.processes);
        let before = processes.len();
        processes.retain(|p| p.pid != pid);
        processes.len() != before
    }

    pub fn processes(&self) -> Vec<TrackedProcess> {
        lock(&self.processes).clone()
    }

    pub fn descriptor_count(&self) -> usize {
        lock(&self.descriptors).len()
    }

    fn take_descriptors(&self) -> Vec<File> {
        std::mem::take(&mut *lock(&self.descriptors))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupState {
    Armed,
    Fired,
}

#[derive(Debug)]
pub struct Teardown {
    registry: Arc<ProcessRegistry>,
    fired: AtomicBool,
}

impl Teardown {
    pub fn new(registry: Arc<ProcessRegistry>) -> Self {
        Teardown {
            registry,
            fired: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> CleanupState {
        if self.fired.load(Ordering::SeqCst) {
            CleanupState::Fired
        } else {
            CleanupState::Armed
        }
    }

    /// Terminate tracked processes and close tracked descriptors.
    ///
    /// Only the first call does anything; it returns `true`, later calls
    /// return `false`. Never fails: problems are logged and the remaining
    /// resources are still handled.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        let processes = self.registry.processes();
        if !processes.is_empty() {
            tracing::info!("Shutting down...");
        }

        for process in processes {
            tracing::info!("Stopping {} (PID: {})...", process.name, process.pid);
            match supervisor::terminate(process.pid) {
                Ok(SignalOutcome::Delivered) => tracing::info!("{} stopped", process.name),
                Ok(SignalOutcome::NotRunning) => {
                    tracing::debug!("{} was no longer running", process.name)
                }
                Err(e) => tracing::error!("Error stopping {}: {}", process.name, e),
            }
        }

        // Dropping a File closes it and ignores close errors.
        drop(self.registry.take_descriptors());

        true
    }
}

/// Keeps teardown armed for the lifetime of the run; firing it on drop
/// covers a normal return from `main`.
#[derive(Debug)]
pub struct CleanupGuard {
    teardown: Arc<Teardown>,
}

impl CleanupGuard {
    pub(crate) fn new(teardown: Arc<Teardown>) -> Self {
        CleanupGuard { teardown }
    }

    pub fn state(&self) -> CleanupState {
        self.teardown.state()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.teardown.fire();
    }
}

/// Arm teardown for `registry`.
///
/// SIGINT and SIGTERM tear down and exit with status 0; a panic is logged,
/// torn down and exits with status 1. Must be called inside a tokio runtime.
pub fn register_cleanup(registry: Arc<ProcessRegistry>) -> CleanupGuard {
    let teardown = Arc::new(Teardown::new(registry));

    let on_fault = Arc::clone(&teardown);
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("Uncaught fault: {}", info);
        eprintln!("Uncaught fault: {}", info);
        on_fault.fire();
        std::process::exit(1);
    }));

    let on_signal = Arc::clone(&teardown);
    match ShutdownSignals::install() {
        Ok(mut signals) => {
            tokio::spawn(async move {
                let name = signals.recv().await;
                tracing::info!("Received {}", name);
                on_signal.fire();
                std::process::exit(0);
            });
        }
        Err(e) => tracing::warn!("Could not install signal handlers: {}", e),
    }

    CleanupGuard::new(teardown)
}

struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(ShutdownSignals {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(ShutdownSignals {})
        }
    }

    async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            }
        }

        #[cfg(not(unix))]
        {
            // Ctrl-C registration failing leaves nothing to wait for.
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            "Ctrl-C"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn test_fires_only_once() {
        let registry = Arc::new(ProcessRegistry::new());
        registry.track_descriptor(tempfile().unwrap());
        let teardown = Teardown::new(Arc::clone(&registry));

        assert_eq!(teardown.state(), CleanupState::Armed);
        assert!(teardown.fire());
        assert_eq!(teardown.state(), CleanupState::Fired);
        assert_eq!(registry.descriptor_count(), 0);

        registry.track_descriptor(tempfile().unwrap());
        assert!(!teardown.fire());
        assert_eq!(registry.descriptor_count(), 1);
    }

    #[test]
    fn test_concurrent_triggers_fire_once() {
        let teardown = Arc::new(Teardown::new(Arc::new(ProcessRegistry::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let teardown = Arc::clone(&teardown);
                std::thread::spawn(move || teardown.fire())
            })
            .collect();
        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|fired| *fired)
            .count();

        assert_eq!(fired, 1);
    }

    #[test]
    fn test_guard_drop_fires() {
        let registry = Arc::new(ProcessRegistry::new());
        registry.track_descriptor(tempfile().unwrap());
        let teardown = Arc::new(Teardown::new(Arc::clone(&registry)));

        drop(CleanupGuard::new(Arc::clone(&teardown)));

        assert_eq!(teardown.state(), CleanupState::Fired);
        assert_eq!(registry.descriptor_count(), 0);
    }

    #[test]
    fn test_release_untracks_process() {
        let registry = ProcessRegistry::new();
        registry.track_process(41, "a");
        registry.track_process(42, "b");

        assert!(registry.release(41));
        assert!(!registry.release(41));
        assert_eq!(
            registry.processes(),
            vec![TrackedProcess {
                pid: 42,
                name: "b".to_string()
            }]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_terminates_tracked_processes_and_skips_missing_ones() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::Command;

        let mut gone = Command::new("true").spawn().unwrap();
        let gone_pid = gone.id();
        gone.wait().unwrap();

        let mut sleeper = Command::new("sleep").arg("30").spawn().unwrap();

        let registry = Arc::new(ProcessRegistry::new());
        registry.track_process(gone_pid, "true");
        registry.track_process(sleeper.id(), "sleep");
        let teardown = Teardown::new(registry);

        assert!(teardown.fire());
        let status = sleeper.wait().unwrap();
        assert_eq!(status.signal(), Some(15));
    }

    /// Set in the child run of `test_panic_tears_down_and_exits_with_1`.
    #[cfg(unix)]
    const FAULT_CHILD_ENV: &str = "OTELUP_CLEANUP_FAULT_CHILD";

    #[cfg(unix)]
    fn is_running(pid: i32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid), None).is_err() {
            return false;
        }
        // Zombies still accept signal 0.
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat
                .rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => cfg!(not(target_os = "linux")),
        }
    }

    // The panic hook exits the process, so the faulting half runs in a
    // re-executed copy of this test binary.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_panic_tears_down_and_exits_with_1() {
        use std::process::{Command, Stdio};
        use std::time::{Duration, Instant};

        if std::env::var_os(FAULT_CHILD_ENV).is_some() {
            let sleeper = Command::new("sleep")
                .arg("30")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .unwrap();
            println!("sleeper pid: {}", sleeper.id());

            let registry = Arc::new(ProcessRegistry::new());
            registry.track_process(sleeper.id(), "sleep");
            let _guard = register_cleanup(registry);
            panic!("collector state corrupted");
        }

        let output = Command::new(std::env::current_exe().unwrap())
            .args([
                "--exact",
                "cleanup::tests::test_panic_tears_down_and_exits_with_1",
                "--nocapture",
                "--test-threads=1",
                "--quiet",
            ])
            .env(FAULT_CHILD_ENV, "1")
            .output()
            .unwrap();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        assert_eq!(output.status.code(), Some(1), "stdout: {stdout}\nstderr: {stderr}");
        assert!(stderr.contains("Uncaught fault"), "{stderr}");
        assert!(stderr.contains("collector state corrupted"), "{stderr}");

        let pid: i32 = stdout
            .lines()
            .find_map(|line| line.strip_prefix("sleeper pid: "))
            .and_then(|pid| pid.trim().parse().ok())
            .expect("sleeper pid in child output");
        let deadline = Instant::now() + Duration::from_secs(5);
        while is_running(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(!is_running(pid), "sleeper {pid} survived the fault teardown");
    }
}
