use crate::config::BIN_DIR_NAME;
use crate::error::Result;
use crate::install::{install_binary, BinarySpec};
use crate::locate::locate_asset;
use crate::platform::PlatformTarget;
use crate::release::{resolve_latest_release, ReleaseSource};
use std::path::{Path, PathBuf};

/// Directory of installed executables.
///
/// A binary counts as installed when its file exists; nothing else is
/// recorded, so a cached binary is never checked against newer releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryCache {
    root: PathBuf,
    bin_dir: PathBuf,
}

impl BinaryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        BinaryCache {
            bin_dir: root.join(BIN_DIR_NAME),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn executable_path(&self, executable_name: &str, target: &PlatformTarget) -> PathBuf {
        self.bin_dir.join(target.executable_file_name(executable_name))
    }

    /// Return the cached executable, installing the latest release first if
    /// it is missing.
    pub async fn ensure_binary<S: ReleaseSource>(
        &self,
        source: &S,
        spec: &BinarySpec,
        target: &PlatformTarget,
    ) -> Result<PathBuf> {
        let executable_path = self.executable_path(&spec.executable_name, target);
        if executable_path.exists() {
            tracing::info!(
                "{} already exists at {}",
                spec.executable_name,
                executable_path.display()
            );
            return Ok(executable_path);
        }

        tracing::info!(
            "{} not found. Downloading from {}...",
            spec.executable_name,
            spec.repo
        );

        let release = resolve_latest_release(source, &spec.repo).await?;
        let asset = locate_asset(&release, target, &*spec.naming)?;
        install_binary(source, &asset, spec, target, self).await
    }
}
