//! GitHub release API interaction

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::TryStreamExt;
use log::debug;
use serde::Deserialize;
use tokio_util::io::StreamReader;

use super::core::{AssetDownload, ReleaseSource};

/// Sentinel release tag meaning "most recent release"
pub const LATEST: &str = "latest";

const USER_AGENT: &str = concat!("ollama-installer/", env!("CARGO_PKG_VERSION"));
const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30); // Initial connection
const DOWNLOAD_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300); // 5 min no data

/// GitHub release metadata from API
#[derive(Deserialize, Debug)]
pub struct GitHubRelease {
    pub tag_name: String,
    pub assets: Vec<GitHubAsset>,
}

/// GitHub release asset metadata
#[derive(Deserialize, Debug)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// Failures talking to the release registry that callers may want to tell apart
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to find release {release}: unexpected status {status}")]
    ReleaseStatus {
        release: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to find asset {asset:?} in release {release:?}")]
    AssetNotFound { asset: String, release: String },

    #[error("error downloading {asset}: server sent {sent} bytes, release lists {listed}")]
    SizeMismatch { asset: String, sent: u64, listed: u64 },

    #[error("error downloading {asset}: status {status}")]
    DownloadStatus {
        asset: String,
        status: reqwest::StatusCode,
    },
}

impl GitHubRelease {
    /// Select the asset with exactly this name
    pub fn find_asset(&self, asset_name: &str) -> Result<&GitHubAsset, RegistryError> {
        self.assets
            .iter()
            .find(|asset| asset.name == asset_name)
            .ok_or_else(|| RegistryError::AssetNotFound {
                asset: asset_name.to_string(),
                release: self.tag_name.clone(),
            })
    }
}

impl GitHubAsset {
    /// Length the download must have, from the response header or else the
    /// size listed in the release; the two must agree when both are known
    pub fn expected_length(&self, content_length: Option<u64>) -> Result<Option<u64>, RegistryError> {
        let listed = (self.size > 0).then_some(self.size);
        match (content_length, listed) {
            (Some(sent), Some(listed)) if sent != listed => Err(RegistryError::SizeMismatch {
                asset: self.name.clone(),
                sent,
                listed,
            }),
            (sent, listed) => Ok(sent.or(listed)),
        }
    }
}

/// Release registry backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubReleases {
    client: reqwest::Client,
    api_base: String,
    repository: String,
}

impl GitHubReleases {
    /// `repository` is `owner/name`; `api_base` is normally `https://api.github.com`
    pub fn new(api_base: &str, repository: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(DOWNLOAD_CONNECT_TIMEOUT)
            .read_timeout(DOWNLOAD_INACTIVITY_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repository: repository.to_string(),
        })
    }

    /// API URL describing a release tag (or the latest release)
    pub fn release_url(&self, release: &str) -> String {
        if release == LATEST {
            format!("{}/repos/{}/releases/latest", self.api_base, self.repository)
        } else {
            format!("{}/repos/{}/releases/tags/{}", self.api_base, self.repository, release)
        }
    }

    /// Fetch release metadata, including its asset list
    pub async fn get_release(&self, release: &str) -> Result<GitHubRelease> {
        let url = self.release_url(release);
        debug!("Looking up release at {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("failed to find release {release}"))?;

        if !response.status().is_success() {
            return Err(RegistryError::ReleaseStatus {
                release: release.to_string(),
                status: response.status(),
            }
            .into());
        }

        response
            .json()
            .await
            .with_context(|| format!("failed to find release {release}: error decoding response"))
    }
}

impl ReleaseSource for GitHubReleases {
    async fn fetch_asset(&self, release: &str, asset_name: &str) -> Result<AssetDownload> {
        let info = self.get_release(release).await?;
        let asset = info.find_asset(asset_name)?;

        let response = self
            .client
            .get(&asset.browser_download_url)
            .send()
            .await
            .with_context(|| format!("failed to download {}", asset.name))?;
        if !response.status().is_success() {
            return Err(RegistryError::DownloadStatus {
                asset: asset.name.clone(),
                status: response.status(),
            }
            .into());
        }

        let content_length = asset.expected_length(response.content_length())?;
        let stream = Box::pin(response.bytes_stream().map_err(io::Error::other));

        Ok(AssetDownload {
            url: asset.browser_download_url.clone(),
            content_length,
            body: Box::new(StreamReader::new(stream)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE_JSON: &str = r#"{
        "tag_name": "v0.5.7",
        "name": "v0.5.7",
        "assets": [
            {
                "name": "ollama-darwin",
                "browser_download_url": "https://github.com/ollama/ollama/releases/download/v0.5.7/ollama-darwin",
                "size": 1024
            },
            {
                "name": "ollama-linux-amd64.tgz",
                "browser_download_url": "https://github.com/ollama/ollama/releases/download/v0.5.7/ollama-linux-amd64.tgz",
                "size": 2048,
                "content_type": "application/gzip"
            }
        ]
    }"#;

    #[test]
    fn test_release_json_parses_and_selects_asset() {
        let release: GitHubRelease = serde_json::from_str(RELEASE_JSON).unwrap();
        assert_eq!(release.tag_name, "v0.5.7");

        let asset = release.find_asset("ollama-linux-amd64.tgz").unwrap();
        assert_eq!(asset.size, 2048);
        assert!(asset.browser_download_url.ends_with("/ollama-linux-amd64.tgz"));
    }

    #[test]
    fn test_missing_asset_is_distinct_error() {
        let release: GitHubRelease = serde_json::from_str(RELEASE_JSON).unwrap();
        // prefix match must not count
        let err = release.find_asset("ollama-linux").unwrap_err();
        assert!(matches!(err, RegistryError::AssetNotFound { ref release, .. } if release == "v0.5.7"));
    }

    #[test]
    fn test_expected_length_prefers_agreeing_sources() {
        let release: GitHubRelease = serde_json::from_str(RELEASE_JSON).unwrap();
        let asset = release.find_asset("ollama-darwin").unwrap();

        assert_eq!(asset.expected_length(Some(1024)).unwrap(), Some(1024));
        // no Content-Length header: fall back to the listed size
        assert_eq!(asset.expected_length(None).unwrap(), Some(1024));

        let err = asset.expected_length(Some(512)).unwrap_err();
        assert!(matches!(err, RegistryError::SizeMismatch { sent: 512, listed: 1024, .. }));
    }

    #[test]
    fn test_unlisted_size_is_not_checked() {
        let asset: GitHubAsset = serde_json::from_str(
            r#"{"name": "ollama-darwin", "browser_download_url": "https://example.invalid/ollama-darwin"}"#,
        )
        .unwrap();
        assert_eq!(asset.expected_length(None).unwrap(), None);
        assert_eq!(asset.expected_length(Some(7)).unwrap(), Some(7));
    }

    #[test]
    fn test_release_urls() {
        let registry = GitHubReleases::new("https://api.github.com/", "ollama/ollama").unwrap();
        assert_eq!(
            registry.release_url(LATEST),
            "https://api.github.com/repos/ollama/ollama/releases/latest"
        );
        assert_eq!(
            registry.release_url("v0.5.7"),
            "https://api.github.com/repos/ollama/ollama/releases/tags/v0.5.7"
        );
    }
}
