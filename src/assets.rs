//! Image loading and preloading for the image surface.
//!
//! Handles resolving campaign links, caching downloads and decoding images
//! off the render loop.

use crate::cache::Cache;
use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use url::Url;

/// A decoded image for the link that requested it.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub link: String,
    pub image: Arc<RgbaImage>,
}

/// Resolves links and keeps image assets in the disk cache.
pub struct AssetManager {
    cache: Arc<RwLock<Cache>>,
    base_url: Option<Url>,
    client: reqwest::Client,
}

/// Where an asset is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Local(PathBuf),
    Remote(String),
}

impl AssetManager {
    pub fn new(cache: Arc<RwLock<Cache>>, base_url: Option<&str>, client: reqwest::Client) -> Result<Self> {
        let base_url = base_url
            .map(|b| Url::parse(b).context("Invalid media base URL"))
            .transpose()?;
        Ok(Self {
            cache,
            base_url,
            client,
        })
    }

    pub fn cache(&self) -> &Arc<RwLock<Cache>> {
        &self.cache
    }

    /// Absolute URL for a campaign link; relative links join the base URL.
    pub fn full_url(&self, link: &str) -> Result<String> {
        match Url::parse(link) {
            Ok(url) => Ok(url.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self
                    .base_url
                    .as_ref()
                    .with_context(|| format!("Relative link without media base URL: {}", link))?;
                Ok(base.join(link).context("Invalid relative link")?.to_string())
            }
            Err(e) => Err(e).with_context(|| format!("Invalid media link: {}", link)),
        }
    }

    fn source(&self, link: &str) -> Result<Source> {
        let url = Url::parse(&self.full_url(link)?)?;
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("Invalid file link: {}", link))?;
            return Ok(Source::Local(path));
        }
        Ok(Source::Remote(url.into()))
    }

    /// Ensure an asset is on disk, downloading if necessary.
    pub async fn ensure_cached(&self, link: &str) -> Result<PathBuf> {
        let url = match self.source(link)? {
            Source::Local(path) => return Ok(path),
            Source::Remote(url) => url,
        };

        {
            let mut cache = self.cache.write().await;
            if let Some(path) = cache.get_cached_path(&url) {
                if path.exists() {
                    cache.touch(&url);
                    return Ok(path);
                }
            }
        }

        // The lock is only taken once the bytes are in hand.
        tracing::debug!("Downloading {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request")?
            .error_for_status()
            .context("Server returned error")?;
        let bytes = response.bytes().await.context("Failed to read response")?;

        self.cache.write().await.store(&url, &bytes).await
    }

    /// Fetch and decode an image.
    pub async fn load_image(&self, link: &str) -> Result<RgbaImage> {
        let path = self.ensure_cached(link).await?;
        tokio::task::spawn_blocking(move || -> Result<RgbaImage> {
            let img = image::open(&path).with_context(|| format!("Failed to open image {:?}", path))?;
            Ok(img.to_rgba8())
        })
        .await
        .context("Image decode task failed")?
    }

    /// Remove cached images that the campaign no longer references.
    pub async fn retain_links<'a>(&self, links: impl IntoIterator<Item = &'a str>) {
        let urls: Vec<String> = links
            .into_iter()
            .filter_map(|link| self.full_url(link).ok())
            .collect();
        self.cache
            .write()
            .await
            .cleanup_orphans(urls.iter().map(String::as_str));
    }
}

/// Background image loader feeding decoded images back to the app loop.
pub struct ImageLoader {
    assets: Arc<AssetManager>,
    loaded_tx: mpsc::Sender<Result<LoadedImage, String>>,
}

impl ImageLoader {
    pub fn new(assets: Arc<AssetManager>) -> (Self, mpsc::Receiver<Result<LoadedImage, String>>) {
        let (loaded_tx, rx) = mpsc::channel(16);
        (Self { assets, loaded_tx }, rx)
    }

    /// Load `link` and report it. A failure reports the link as Err.
    pub fn request(&self, link: &str) {
        let assets = self.assets.clone();
        let tx = self.loaded_tx.clone();
        let link = link.to_string();

        tokio::spawn(async move {
            let result = match assets.load_image(&link).await {
                Ok(image) => Ok(LoadedImage {
                    link,
                    image: Arc::new(image),
                }),
                Err(e) => {
                    tracing::warn!("Failed to load image {}: {:#}", link, e);
                    Err(link)
                }
            };
            let _ = tx.send(result).await;
        });
    }

    /// Download `link` ahead of time without decoding it.
    pub fn prefetch(&self, link: &str) {
        let assets = self.assets.clone();
        let link = link.to_string();

        tokio::spawn(async move {
            tracing::debug!("Preloading image: {}", link);
            if let Err(e) = assets.ensure_cached(&link).await {
                tracing::warn!("Failed to preload {}: {:#}", link, e);
            }
        });
    }
}
