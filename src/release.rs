//! GitHub release resolution.
//!
//! Fetches the latest-release document for a repository and turns it into a
//! [`ReleaseInfo`]. Network access goes through [`ReleaseSource`] so the rest
//! of the install pipeline can run against an in-memory source in tests.

use crate::config::{GITHUB_TOKEN_ENV, USER_AGENT};
use crate::download::download_file;
use crate::error::{ProvisionError, Result};
use crate::types::{AssetInfo, GitHubRelease, ReleaseInfo};
use futures_util::StreamExt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const EXCERPT_LEN: usize = 500;

/// Where release documents and asset payloads come from.
#[allow(async_fn_in_trait)]
pub trait ReleaseSource {
    /// URL of the latest-release document for `repo`, used in diagnostics.
    fn latest_release_url(&self, repo: &str) -> String;

    /// Raw body of the latest-release document for `repo`.
    async fn latest_release_body(&self, repo: &str) -> Result<String>;

    /// Download `url` to `dest`.
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

pub struct GitHubReleases {
    client: reqwest::Client,
    api_base: String,
}

impl GitHubReleases {
    pub fn new() -> Self {
        Self::with_api_base("https://api.github.com")
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        GitHubReleases {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for GitHubReleases {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseSource for GitHubReleases {
    fn latest_release_url(&self, repo: &str) -> String {
        build_latest_release_url(&self.api_base, repo)
    }

    async fn latest_release_body(&self, repo: &str) -> Result<String> {
        let url = self.latest_release_url(repo);
        tracing::debug!("Fetching GitHub release info from: {}", url);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT);

        if let Ok(token) = std::env::var(GITHUB_TOKEN_ENV) {
            request = request.header("Authorization", format!("token {}", token));
            tracing::debug!("Using {}", GITHUB_TOKEN_ENV);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProvisionError::network(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            // GitHub explains rejections (rate limits, unknown repos) in the body.
            let body = response.text().await.unwrap_or_default();
            tracing::error!("GitHub returned {} for {}: {}", status, url, body.trim());
            return Err(ProvisionError::HttpStatus {
                url,
                status: status.to_string(),
                excerpt: excerpt(body.trim()),
            });
        }

        // The body is spooled to a scratch file that is removed when it drops,
        // whichever way this function returns.
        let mut scratch = tempfile::Builder::new()
            .prefix("otelup-release-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| ProvisionError::io("Could not create scratch file", e))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProvisionError::network(&url, e))?;
            scratch
                .write_all(&chunk)
                .map_err(|e| ProvisionError::io("Could not write scratch file", e))?;
        }

        let mut content = String::new();
        scratch
            .seek(SeekFrom::Start(0))
            .and_then(|_| scratch.read_to_string(&mut content))
            .map_err(|e| ProvisionError::io("Could not read scratch file", e))?;

        Ok(content)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        download_file(&self.client, url, dest).await
    }
}

pub fn build_latest_release_url(api_base: &str, repo: &str) -> String {
    format!("{}/repos/{}/releases/latest", api_base, repo)
}

/// Fetch and validate the latest release of `repo`.
pub async fn resolve_latest_release<S: ReleaseSource>(source: &S, repo: &str) -> Result<ReleaseInfo> {
    tracing::info!("Getting latest release for {}...", repo);

    let url = source.latest_release_url(repo);
    let content = source.latest_release_body(repo).await?;
    parse_release_document(repo, &url, &content)
}

pub fn parse_release_document(repo: &str, url: &str, content: &str) -> Result<ReleaseInfo> {
    if content.trim().is_empty() {
        return Err(ProvisionError::EmptyResponse {
            url: url.to_string(),
        });
    }

    // `null` parses, but carries no release.
    let document: Option<GitHubRelease> = serde_json::from_str(content).map_err(|e| {
        tracing::error!("Failed to parse JSON response from {}: {}", url, e);
        ProvisionError::MalformedResponse {
            url: url.to_string(),
            excerpt: excerpt(content),
        }
    })?;

    let Some(document) = document else {
        return Err(no_release_tag(repo, content));
    };

    let tag_name = document
        .tag_name
        .filter(|tag| !tag.is_empty())
        .ok_or_else(|| no_release_tag(repo, content))?;

    let assets = document
        .assets
        .unwrap_or_default()
        .iter()
        .map(AssetInfo::from)
        .collect();

    Ok(ReleaseInfo {
        repo: repo.to_string(),
        tag_name,
        assets,
    })
}

fn no_release_tag(repo: &str, content: &str) -> ProvisionError {
    ProvisionError::NoReleaseTag {
        repo: repo.to_string(),
        excerpt: excerpt(content.trim()),
    }
}

fn excerpt(content: &str) -> String {
    match content.char_indices().nth(EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}
