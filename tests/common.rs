use otelup::config::{StatePaths, HOME_OVERRIDE_ENV, PROJECT_ENV};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

// Not every test binary uses every helper.
#[allow(dead_code)]
pub struct TestContext {
    pub _temp_dir: TempDir,
    pub home: PathBuf,
    pub project_dir: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let home = temp_dir.path().join("home");
        let project_dir = temp_dir.path().join("project");
        fs::create_dir_all(&home).expect("Failed to create home");
        fs::create_dir_all(&project_dir).expect("Failed to create project dir");

        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_otelup"));

        Self {
            _temp_dir: temp_dir,
            home,
            project_dir,
            bin_path,
        }
    }

    /// Command isolated to this context's home and project directory, with
    /// the project id variable cleared.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.current_dir(&self.project_dir);
        cmd.env("HOME", &self.home);
        cmd.env(HOME_OVERRIDE_ENV, &self.home);
        cmd.env_remove(PROJECT_ENV);
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// State layout the binary computes for `project_dir`.
    pub fn state_paths(&self) -> StatePaths {
        let project = fs::canonicalize(&self.project_dir).expect("Failed to canonicalize");
        StatePaths::for_project(&self.home, &project)
    }

    /// Place an executable at the collector's cache path so no download is
    /// needed.
    #[cfg(unix)]
    pub fn install_fake_collector(&self, script_body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let paths = self.state_paths();
        fs::create_dir_all(&paths.bin_dir).expect("Failed to create bin dir");
        let path = paths.bin_dir.join(otelup::config::COLLECTOR_EXECUTABLE);
        fs::write(&path, format!("#!/bin/sh\n{}\n", script_body)).expect("Failed to write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");
        path
    }
}

#[allow(dead_code)]
pub fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_code(&self, code: i32) -> &Self {
        assert_eq!(
            self.status.code(),
            Some(code),
            "unexpected exit status\nstdout: {}\nstderr: {}",
            self.stdout,
            self.stderr
        );
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}

/// PID printed by `otelup start` in "Waiting for collector to start (PID: N)".
#[allow(dead_code)]
pub fn collector_pid(stdout: &str) -> Option<u32> {
    let start = stdout.find("(PID: ")? + "(PID: ".len();
    let rest = &stdout[start..];
    let end = rest.find(')')?;
    rest[..end].trim().parse().ok()
}
