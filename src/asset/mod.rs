use crate::api::http_client;
use crate::error::{IllustratorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Raw response of a download.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub status: u16,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedAsset { status, bytes })
    }
}

/// Downloads generated images into the output directory.
#[derive(Clone)]
pub struct Materializer {
    fetcher: Arc<dyn Fetcher>,
}

impl Materializer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Writes the body of `url` to `directory/filename`, replacing any existing
    /// file. Anything but HTTP 200 is a [`IllustratorError::Fetch`] and leaves
    /// no file behind.
    pub async fn save(&self, url: &str, directory: &Path, filename: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(directory).await?;

        info!("Downloading image from: {}", url);
        let asset = self.fetcher.fetch(url).await?;
        if asset.status != 200 {
            error!("Failed to download image: {} (HTTP {})", url, asset.status);
            return Err(IllustratorError::Fetch {
                status: asset.status,
                url: url.to_string(),
            });
        }

        let path = directory.join(filename);
        tokio::fs::write(&path, &asset.bytes).await?;
        info!("Image saved: {}", path.display());
        Ok(path)
    }
}
