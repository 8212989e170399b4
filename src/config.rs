use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "otelup";
pub const USER_AGENT: &str = concat!("otelup/", env!("CARGO_PKG_VERSION"));

pub const STATE_DIR_NAME: &str = ".gemini";
pub const TMP_DIR_NAME: &str = "tmp";
pub const OTEL_DIR_NAME: &str = "otel";
pub const BIN_DIR_NAME: &str = "bin";
pub const LOG_FILE_NAME: &str = "collector-gcp.log";
pub const CONFIG_FILE_NAME: &str = "collector-gcp.yaml";

pub const PROJECT_ENV: &str = "OTLP_GOOGLE_CLOUD_PROJECT";
pub const HOME_OVERRIDE_ENV: &str = "OTELUP_HOME";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

pub const COLLECTOR_EXECUTABLE: &str = "otelcol-contrib";
pub const COLLECTOR_REPO: &str = "open-telemetry/opentelemetry-collector-releases";
pub const DEFAULT_OTLP_PORT: u16 = 4317;

/// On-disk layout for one project:
///
/// ```text
/// <home>/.gemini/tmp/<sha256(project root)>/otel/
///     bin/                  installed executables
///     collector-gcp.log     collector stdout + stderr
///     collector-gcp.yaml    generated collector config
/// ```
///
/// Building a `StatePaths` touches nothing on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
    pub bin_dir: PathBuf,
    pub log_file: PathBuf,
    pub config_file: PathBuf,
}

impl StatePaths {
    pub fn for_project(home: &Path, project_root: &Path) -> Self {
        let root = home
            .join(STATE_DIR_NAME)
            .join(TMP_DIR_NAME)
            .join(project_hash(project_root))
            .join(OTEL_DIR_NAME);

        StatePaths {
            bin_dir: root.join(BIN_DIR_NAME),
            log_file: root.join(LOG_FILE_NAME),
            config_file: root.join(CONFIG_FILE_NAME),
            root,
        }
    }

    /// Layout for the current working directory, honoring `OTELUP_HOME`.
    pub fn resolve() -> Result<Self> {
        let home = match std::env::var_os(HOME_OVERRIDE_ENV) {
            Some(home) => PathBuf::from(home),
            None => dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?,
        };
        let project_root =
            std::env::current_dir().context("Could not determine current directory")?;

        let paths = Self::for_project(&home, &project_root);
        tracing::debug!("State directory: {}", paths.root.display());
        Ok(paths)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.bin_dir)
            .with_context(|| format!("Could not create {}", self.bin_dir.display()))?;
        Ok(())
    }
}

pub fn project_hash(project_root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_root.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

/// Reads the required project id, treating an empty value as missing.
pub fn required_project_id() -> crate::error::Result<String> {
    std::env::var(PROJECT_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(crate::error::ProvisionError::PreconditionMissing(PROJECT_ENV))
}
