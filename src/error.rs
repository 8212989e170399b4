//! Error types for provisioning and supervising the collector binary.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{0} environment variable is required")]
    PreconditionMissing(&'static str),

    #[error("Request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("Request to {url} failed: HTTP {status}. Release data: {excerpt}")]
    HttpStatus {
        url: String,
        status: String,
        excerpt: String,
    },

    #[error("Empty response from {url}")]
    EmptyResponse { url: String },

    #[error("Failed to parse JSON response from {url}. Content: {excerpt}")]
    MalformedResponse { url: String, excerpt: String },

    #[error("Could not get latest release information for {repo}. Release data: {excerpt}")]
    NoReleaseTag { repo: String, excerpt: String },

    #[error("Release {tag} for {repo} has no assets")]
    NoAssetsPublished { repo: String, tag: String },

    #[error(
        "Could not find asset \"{expected}\" for {repo} (version {version}) on platform {platform}. Available assets: {}",
        available.join(", ")
    )]
    AssetNotFound {
        repo: String,
        version: String,
        platform: String,
        expected: String,
        available: Vec<String>,
    },

    #[error("Failed to extract {archive}: {reason}")]
    Extraction { archive: String, reason: String },

    #[error(
        "Could not find binary \"{name}\" in extracted archive at {}. Contents: {}",
        dir.display(),
        contents.join(", ")
    )]
    BinaryNotFoundInArchive {
        name: String,
        dir: PathBuf,
        contents: Vec<String>,
    },

    #[error("Timeout waiting for port {port} to open after {timeout:?}")]
    PortTimeout { port: u16, timeout: Duration },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn network(url: &str, reason: impl std::fmt::Display) -> Self {
        ProvisionError::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_not_found_lists_every_asset() {
        let err = ProvisionError::AssetNotFound {
            repo: "owner/repo".to_string(),
            version: "1.0.0".to_string(),
            platform: "linux/amd64".to_string(),
            expected: "tool_1.0.0_linux_amd64.tar.gz".to_string(),
            available: vec![
                "tool_1.0.0_darwin_arm64.tar.gz".to_string(),
                "tool_1.0.0_windows_amd64.zip".to_string(),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("tool_1.0.0_darwin_arm64.tar.gz, tool_1.0.0_windows_amd64.zip"));
        assert!(message.contains("\"tool_1.0.0_linux_amd64.tar.gz\""));
    }
}
