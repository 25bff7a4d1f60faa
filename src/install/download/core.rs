//! Release download and extraction orchestration

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;

use super::platform::Platform;

/// An asset body ready to be streamed, plus what the server said about it.
pub struct AssetDownload {
    pub url: String,
    pub content_length: Option<u64>,
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for AssetDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetDownload")
            .field("url", &self.url)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A remote registry of tagged releases.
pub trait ReleaseSource {
    /// Resolve `release` (or `"latest"`) and open the asset called `asset_name`.
    fn fetch_asset(
        &self,
        release: &str,
        asset_name: &str,
    ) -> impl Future<Output = Result<AssetDownload>> + Send;
}

impl<T: ReleaseSource + Sync> ReleaseSource for &T {
    fn fetch_asset(
        &self,
        release: &str,
        asset_name: &str,
    ) -> impl Future<Output = Result<AssetDownload>> + Send {
        (**self).fetch_asset(release, asset_name)
    }
}

/// Download the platform asset and materialise it at `location`.
///
/// The response body is consumed as it arrives: it is bridged into a blocking
/// reader and extracted on the blocking pool, so the archive is never held in
/// memory. Returns the path of the managed executable.
pub async fn install_release<S: ReleaseSource>(
    source: &S,
    platform: Platform,
    release: &str,
    asset_name: &str,
    location: &Path,
) -> Result<PathBuf> {
    let download = source
        .fetch_asset(release, asset_name)
        .await
        .with_context(|| format!("failed to fetch {asset_name} from release {release}"))?;

    info!("Downloading ollama from {}...", download.url);

    let extractor = platform.extractor(download.content_length);
    let mut reader = SyncIoBridge::new(download.body);
    let dest = location.to_path_buf();

    let executable = tokio::task::spawn_blocking(move || extractor.extract(&mut reader, &dest))
        .await
        .context("extraction task failed")?
        .with_context(|| format!("failed to extract {asset_name} into {}", location.display()))?;

    info!("Installed ollama at {}", executable.display());
    Ok(executable)
}
