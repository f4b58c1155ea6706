// src/services/images.rs

//! Vehicle image cache.
//!
//! Images are keyed by the final path segment of their upstream URL.
//! A file already present under that name is reused without contacting
//! the upstream; a failed download degrades to an empty image ref.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::Result;

/// Downloads route vehicle images into a local directory.
pub struct ImageCache {
    dir: PathBuf,
    client: reqwest::Client,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>, user_agent: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            dir: dir.into(),
            client,
        })
    }

    /// Derive the stable cache key for an image URL.
    ///
    /// Returns `None` when the URL has no usable final path segment.
    pub fn cache_key(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let name = parsed.path_segments()?.next_back()?.to_string();
        if name.is_empty() { None } else { Some(name) }
    }

    /// Ensure an image is cached locally, returning its cache key.
    ///
    /// Returns an empty string when the URL is unusable or the download
    /// fails; routes proceed without an image in that case.
    pub async fn ensure(&self, url: &str) -> String {
        let Some(name) = Self::cache_key(url) else {
            log::warn!("No cache key derivable from image URL {url}");
            return String::new();
        };

        let target = self.dir.join(&name);
        match tokio::fs::try_exists(&target).await {
            Ok(true) => return name,
            Ok(false) => {}
            Err(e) => {
                log::warn!("Cannot stat image cache entry {target:?}: {e}");
                return String::new();
            }
        }

        match self.download(url, &target).await {
            Ok(()) => name,
            Err(e) => {
                log::warn!("Image download failed for {url}: {e}");
                String::new()
            }
        }
    }

    async fn download(&self, url: &str, target: &PathBuf) -> Result<()> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Same temp-then-rename discipline as the state store, so a
        // crash mid-download never leaves a truncated image behind.
        let tmp = target.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, target).await?;
        Ok(())
    }
}
