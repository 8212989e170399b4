use crate::error::{ProvisionError, Result};
use crate::platform::PlatformTarget;
use crate::types::{AssetInfo, ReleaseInfo};

/// Naming convention of an upstream project's release assets.
///
/// Implemented for any `Fn(version, os, arch, ext) -> String`, so a closure
/// like `|v, os, arch, ext| format!("tool_{v}_{os}_{arch}.{ext}")` works.
pub trait AssetNaming {
    fn asset_name(&self, version: &str, os: &str, arch: &str, ext: &str) -> String;
}

impl<F> AssetNaming for F
where
    F: Fn(&str, &str, &str, &str) -> String,
{
    fn asset_name(&self, version: &str, os: &str, arch: &str, ext: &str) -> String {
        self(version, os, arch, ext)
    }
}

/// Pick the asset whose name is exactly what `naming` produces for `target`.
pub fn locate_asset<N: AssetNaming + ?Sized>(
    release: &ReleaseInfo,
    target: &PlatformTarget,
    naming: &N,
) -> Result<AssetInfo> {
    let version = release.version();
    let expected = naming.asset_name(
        version,
        target.os.as_str(),
        target.arch.as_str(),
        target.archive_ext.as_str(),
    );
    tracing::debug!("Looking for asset '{}' in {}", expected, release.tag_name);

    if release.assets.is_empty() {
        return Err(ProvisionError::NoAssetsPublished {
            repo: release.repo.clone(),
            tag: release.tag_name.clone(),
        });
    }

    match release.assets.iter().find(|asset| asset.name == expected) {
        Some(asset) => {
            tracing::info!("Found asset '{}'", asset.name);
            Ok(asset.clone())
        }
        None => Err(ProvisionError::AssetNotFound {
            repo: release.repo.clone(),
            version: version.to_string(),
            platform: target.to_string(),
            expected,
            available: release.assets.iter().map(|a| a.name.clone()).collect(),
        }),
    }
}
