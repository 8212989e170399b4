//! Turning a release asset into an installed executable.
//!
//! The archive is downloaded and unpacked inside a staging directory that
//! lives next to the cache's `bin/` directory. Only once the binary has been
//! found is it renamed to its final path, so an interrupted download or a
//! broken archive never leaves a partial file where the cache looks.

use crate::cache::BinaryCache;
use crate::download::{extract_archive, find_file, list_dir};
use crate::error::{ProvisionError, Result};
use crate::locate::AssetNaming;
use crate::platform::PlatformTarget;
use crate::release::ReleaseSource;
use crate::types::AssetInfo;
use std::fmt;
use std::fs;
use std::path::PathBuf;

const STAGING_PREFIX: &str = ".staging-";
const EXTRACT_DIR_NAME: &str = "extracted";

/// What to install and how its upstream names things.
pub struct BinarySpec {
    /// Name of the executable inside the cache's `bin/` directory.
    pub executable_name: String,
    /// `owner/name` of the GitHub repository publishing releases.
    pub repo: String,
    pub naming: Box<dyn AssetNaming + Send + Sync>,
    /// Name of the binary inside the archive when it differs from
    /// `executable_name`.
    pub binary_name_in_archive: Option<String>,
}

impl BinarySpec {
    pub fn new(
        executable_name: impl Into<String>,
        repo: impl Into<String>,
        naming: impl AssetNaming + Send + Sync + 'static,
    ) -> Self {
        BinarySpec {
            executable_name: executable_name.into(),
            repo: repo.into(),
            naming: Box::new(naming),
            binary_name_in_archive: None,
        }
    }

    pub fn with_binary_name_in_archive(mut self, name: impl Into<String>) -> Self {
        self.binary_name_in_archive = Some(name.into());
        self
    }

    pub fn archive_binary_name(&self) -> &str {
        self.binary_name_in_archive
            .as_deref()
            .unwrap_or(&self.executable_name)
    }
}

impl fmt::Debug for BinarySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinarySpec")
            .field("executable_name", &self.executable_name)
            .field("repo", &self.repo)
            .field("binary_name_in_archive", &self.binary_name_in_archive)
            .finish_non_exhaustive()
    }
}

/// Download `asset`, extract it, and move the binary into `cache`.
pub async fn install_binary<S: ReleaseSource>(
    source: &S,
    asset: &AssetInfo,
    spec: &BinarySpec,
    target: &PlatformTarget,
    cache: &BinaryCache,
) -> Result<PathBuf> {
    let executable_path = cache.executable_path(&spec.executable_name, target);

    fs::create_dir_all(cache.bin_dir())
        .map_err(|e| ProvisionError::io(format!("Could not create {}", cache.bin_dir().display()), e))?;

    // Removed on drop, including the downloaded archive.
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(cache.root())
        .map_err(|e| ProvisionError::io("Could not create staging directory", e))?;
    tracing::debug!("Staging directory: {}", staging.path().display());

    let archive_path = staging.path().join(&asset.name);
    tracing::info!("Downloading {}...", asset.name);
    source.download(&asset.download_url, &archive_path).await?;

    let extract_dir = staging.path().join(EXTRACT_DIR_NAME);
    fs::create_dir_all(&extract_dir)
        .map_err(|e| ProvisionError::io("Could not create extraction directory", e))?;
    extract_archive(&archive_path, &extract_dir)?;

    let name_to_find = target.executable_file_name(spec.archive_binary_name());
    let found = find_file(&extract_dir, &name_to_find).ok_or_else(|| {
        ProvisionError::BinaryNotFoundInArchive {
            name: name_to_find.clone(),
            dir: extract_dir.clone(),
            contents: list_dir(&extract_dir),
        }
    })?;
    tracing::debug!("Found {} at {}", name_to_find, found.display());

    fs::rename(&found, &executable_path).map_err(|e| {
        ProvisionError::io(
            format!("Could not move {} to {}", found.display(), executable_path.display()),
            e,
        )
    })?;

    if !target.is_windows() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&executable_path, fs::Permissions::from_mode(0o755)).map_err(|e| {
                ProvisionError::io(
                    format!("Could not make {} executable", executable_path.display()),
                    e,
                )
            })?;
        }
    }

    tracing::info!(
        "{} installed at {}",
        spec.executable_name,
        executable_path.display()
    );
    Ok(executable_path)
}
