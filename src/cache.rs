//! LRU cache module for offline asset storage.
//!
//! Stores downloaded images keyed by a hash of their URL and keeps the last
//! campaign so the player can start without the feed.

use crate::campaign::CampaignPayload;
use anyhow::{Context, Result};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

const CAMPAIGN_FILE: &str = "campaign.json";

/// Metadata for a cached asset.
#[derive(Debug, Clone)]
struct CacheEntry {
    path: PathBuf,
    size: u64,
}

/// LRU cache for media assets.
pub struct Cache {
    /// Base directory for cached files.
    cache_dir: PathBuf,
    /// Maximum cache size in bytes.
    max_size: u64,
    /// Current cache size in bytes.
    current_size: u64,
    /// Entries by URL hash, least recently used first out.
    lru: LruCache<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache with the given directory and size limit.
    pub fn new(cache_dir: PathBuf, max_size_gb: u64) -> Result<Self> {
        Self::with_max_bytes(cache_dir, max_size_gb * 1024 * 1024 * 1024)
    }

    pub fn with_max_bytes(cache_dir: PathBuf, max_size: u64) -> Result<Self> {
        fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;

        let mut cache = Self {
            cache_dir,
            max_size,
            current_size: 0,
            lru: LruCache::unbounded(),
        };
        cache.scan_existing();

        tracing::info!(
            "Cache initialized: {:.2} MB in {} assets",
            cache.current_size as f64 / 1024.0 / 1024.0,
            cache.lru.len()
        );

        Ok(cache)
    }

    /// Index files left from a previous run.
    fn scan_existing(&mut self) {
        for entry in WalkDir::new(&self.cache_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path().to_path_buf();
            if path.file_name().and_then(|n| n.to_str()) == Some(CAMPAIGN_FILE) {
                continue;
            }
            let (Some(key), Ok(metadata)) = (
                path.file_stem().and_then(|n| n.to_str()).map(str::to_string),
                entry.metadata(),
            ) else {
                continue;
            };
            self.current_size += metadata.len();
            self.lru.put(
                key,
                CacheEntry {
                    path,
                    size: metadata.len(),
                },
            );
        }
    }

    /// Cache key for a URL.
    pub fn cache_key(url: &str) -> String {
        let digest = Sha256::digest(url.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Get the path where an asset should be cached.
    fn cache_path(&self, url: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", Self::cache_key(url), extension_of(url)))
    }

    /// Check if an asset is cached and return its path.
    pub fn get_cached_path(&self, url: &str) -> Option<PathBuf> {
        self.lru.peek(&Self::cache_key(url)).map(|e| e.path.clone())
    }

    /// Write `bytes` for `url`, evicting old entries to make room.
    pub async fn store(&mut self, url: &str, bytes: &[u8]) -> Result<PathBuf> {
        let key = Self::cache_key(url);
        let path = self.cache_path(url);
        let size = bytes.len() as u64;

        if let Some(old) = self.lru.pop(&key) {
            self.current_size = self.current_size.saturating_sub(old.size);
        }

        while self.current_size + size > self.max_size {
            if !self.evict_lru() {
                tracing::warn!("Cache full and cannot evict, continuing anyway");
                break;
            }
        }

        let mut file = tokio::fs::File::create(&path)
            .await
            .context("Failed to create cache file")?;
        file.write_all(bytes)
            .await
            .context("Failed to write cache file")?;
        file.flush().await.context("Failed to flush cache file")?;

        self.lru.put(
            key,
            CacheEntry {
                path: path.clone(),
                size,
            },
        );
        self.current_size += size;

        tracing::debug!(
            "Cached {} ({:.2} KB), total: {:.2} MB",
            url,
            size as f64 / 1024.0,
            self.current_size as f64 / 1024.0 / 1024.0
        );

        Ok(path)
    }

    /// Evict the least recently used item.
    fn evict_lru(&mut self) -> bool {
        let Some((_, entry)) = self.lru.pop_lru() else {
            return false;
        };
        tracing::debug!("Evicting {:?}", entry.path);
        remove_file(&entry.path);
        self.current_size = self.current_size.saturating_sub(entry.size);
        true
    }

    /// Mark an asset as recently used.
    pub fn touch(&mut self, url: &str) {
        let _ = self.lru.get(&Self::cache_key(url));
    }

    /// Drop cached assets whose URL is not in `keep`.
    pub fn cleanup_orphans<'a>(&mut self, keep: impl IntoIterator<Item = &'a str>) {
        let keep: HashSet<String> = keep.into_iter().map(Self::cache_key).collect();
        let orphans: Vec<String> = self
            .lru
            .iter()
            .filter(|(key, _)| !keep.contains(*key))
            .map(|(key, _)| key.clone())
            .collect();

        for key in orphans {
            if let Some(entry) = self.lru.pop(&key) {
                tracing::debug!("Removing orphaned cache entry: {:?}", entry.path);
                remove_file(&entry.path);
                self.current_size = self.current_size.saturating_sub(entry.size);
            }
        }
    }

    /// Save the current campaign for offline start.
    pub fn save_campaign(&self, campaign: &CampaignPayload) -> Result<()> {
        let json = serde_json::to_string_pretty(campaign).context("Failed to serialize campaign")?;
        fs::write(self.cache_dir.join(CAMPAIGN_FILE), json).context("Failed to write campaign")?;
        Ok(())
    }

    /// Load the saved campaign, if any.
    pub fn load_campaign(&self) -> Result<Option<CampaignPayload>> {
        let path = self.cache_dir.join(CAMPAIGN_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).context("Failed to read campaign")?;
        let campaign = serde_json::from_str(&json).context("Failed to parse campaign")?;
        tracing::info!("Loaded cached campaign");
        Ok(Some(campaign))
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }
}

fn remove_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Failed to remove cached file {:?}: {}", path, e);
    }
}

/// File extension of the URL path, or `bin`.
fn extension_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{CampaignScrollText, WireItem};
    use tempfile::TempDir;

    #[test]
    fn extension_comes_from_the_path() {
        assert_eq!(extension_of("https://cdn/x/photo.JPG?v=2"), "jpg");
        assert_eq!(extension_of("https://cdn/x/photo"), "bin");
        assert_eq!(extension_of("https://cdn.example/"), "bin");
    }

    #[tokio::test]
    async fn evicts_least_recently_used_when_full() {
        let dir = TempDir::new().unwrap();
        let mut cache = Cache::with_max_bytes(dir.path().to_path_buf(), 10).unwrap();

        cache.store("https://cdn/a.jpg", b"aaaa").await.unwrap();
        cache.store("https://cdn/b.jpg", b"bbbb").await.unwrap();
        cache.touch("https://cdn/a.jpg");
        cache.store("https://cdn/c.jpg", b"cccc").await.unwrap();

        assert!(cache.get_cached_path("https://cdn/a.jpg").is_some());
        assert!(cache.get_cached_path("https://cdn/b.jpg").is_none());
        assert!(cache.get_cached_path("https://cdn/c.jpg").is_some());
        assert_eq!(cache.current_size(), 8);
    }

    #[tokio::test]
    async fn rescans_existing_files() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = Cache::with_max_bytes(dir.path().to_path_buf(), 100).unwrap();
            cache.store("https://cdn/a.jpg", b"aaaa").await.unwrap();
            cache.save_campaign(&CampaignPayload::default()).unwrap();
        }
        let cache = Cache::with_max_bytes(dir.path().to_path_buf(), 100).unwrap();
        assert!(cache.get_cached_path("https://cdn/a.jpg").is_some());
        assert_eq!(cache.current_size(), 4);
    }

    #[tokio::test]
    async fn orphans_are_removed() {
        let dir = TempDir::new().unwrap();
        let mut cache = Cache::with_max_bytes(dir.path().to_path_buf(), 100).unwrap();
        let kept = cache.store("https://cdn/a.jpg", b"aaaa").await.unwrap();
        let dropped = cache.store("https://cdn/b.jpg", b"bbbb").await.unwrap();

        cache.cleanup_orphans(["https://cdn/a.jpg"]);
        assert!(kept.exists());
        assert!(!dropped.exists());
        assert_eq!(cache.current_size(), 4);
    }

    #[test]
    fn campaign_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::with_max_bytes(dir.path().to_path_buf(), 100).unwrap();
        assert!(cache.load_campaign().unwrap().is_none());

        let campaign = CampaignPayload {
            campaign_scroll_text: CampaignScrollText {
                text_content: Some("Sale".into()),
                event_types: vec![WireItem {
                    item_type: Some("image".into()),
                    link: Some("a.jpg".into()),
                    duration: Some("00:00:05".into()),
                }],
            },
            gold_rate_scroll_text: None,
        };
        cache.save_campaign(&campaign).unwrap();
        assert_eq!(cache.load_campaign().unwrap(), Some(campaign));
    }
}
