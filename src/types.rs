use serde::{Deserialize, Serialize};

/// Release document as returned by the GitHub releases API.
///
/// Every field is optional on the wire so that a document missing its tag or
/// asset list can be reported precisely instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GitHubRelease {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub assets: Option<Vec<GitHubAsset>>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub name: String,
    pub download_url: String,
}

impl From<&GitHubAsset> for AssetInfo {
    fn from(asset: &GitHubAsset) -> Self {
        AssetInfo {
            name: asset.name.clone(),
            download_url: asset.browser_download_url.clone(),
        }
    }
}

/// A resolved release: a tag plus whatever assets were published with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub repo: String,
    pub tag_name: String,
    pub assets: Vec<AssetInfo>,
}

impl ReleaseInfo {
    /// Tag with a single leading `v` removed (`v1.2.3` -> `1.2.3`).
    pub fn version(&self) -> &str {
        self.tag_name.strip_prefix('v').unwrap_or(&self.tag_name)
    }
}
