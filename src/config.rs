//! Layered player configuration.
//!
//! Defaults, then an optional TOML file, then `SIGNAGE__SECTION__KEY`
//! environment overrides.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

/// Token value the launcher passes when no credential was provisioned.
pub const TOKEN_NOT_PROVIDED: &str = "Not provided";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub player: PlayerSettings,
    pub feed: FeedSettings,
    pub embed: EmbedSettings,
    pub playback: PlaybackSettings,
    pub display: DisplaySettings,
    pub connectivity: ConnectivitySettings,
    pub cache: CacheSettings,
    pub exit: ExitSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerSettings {
    /// URI the player was launched with, e.g. `signage://player?token=abc`.
    pub launch_uri: Option<String>,
    /// Explicit token, used when the launch URI carries none.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    pub url: String,
    pub heartbeat_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedSettings {
    pub bridge_url: String,
    pub reconnect_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackSettings {
    pub media_base_url: Option<String>,
    pub min_image_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplaySettings {
    pub font_path: PathBuf,
    pub font_size: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivitySettings {
    pub probe_url: String,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub dir: PathBuf,
    pub max_size_gb: u64,
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitSettings {
    /// Launcher command that hands the screen back to the platform.
    pub platform_close_command: Option<Vec<String>>,
    pub nav_delay_ms: u64,
}

impl Settings {
    /// Load settings from `path` (optional) and the environment.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .set_default("feed.url", "wss://streaming-websocket-dotnet-master.pixl.ai/ws")?
            .set_default("feed.heartbeat_secs", 20)?
            .set_default("embed.bridge_url", "ws://127.0.0.1:8765/bridge")?
            .set_default("embed.reconnect_secs", 5)?
            .set_default("playback.min_image_secs", 0)?
            .set_default("display.font_path", "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf")?
            .set_default("display.font_size", 36)?
            .set_default("connectivity.probe_url", "https://clients3.google.com/generate_204")?
            .set_default("connectivity.probe_interval_secs", 5)?
            .set_default("connectivity.probe_timeout_secs", 3)?
            .set_default("cache.dir", "/var/cache/signage-player")?
            .set_default("cache.max_size_gb", 2)?
            .set_default("cache.download_timeout_secs", 30)?
            .set_default("exit.nav_delay_ms", 100)?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("SIGNAGE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize::<Settings>()
            .context("Invalid configuration")
    }

    /// Access token for the campaign feed, or None when the feed is disabled.
    pub fn launch_token(&self) -> Option<String> {
        let from_uri = self
            .player
            .launch_uri
            .as_deref()
            .and_then(token_from_launch_uri);

        from_uri
            .or_else(|| self.player.token.clone())
            .filter(|t| !t.is_empty() && t != TOKEN_NOT_PROVIDED)
    }
}

/// Read the `token` query parameter from a launch URI.
pub fn token_from_launch_uri(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(launch_uri: Option<&str>, token: Option<&str>) -> Settings {
        let mut settings = Settings::load("does-not-exist.toml").unwrap();
        settings.player.launch_uri = launch_uri.map(str::to_string);
        settings.player.token = token.map(str::to_string);
        settings
    }

    #[test]
    fn defaults_load_without_file() {
        let settings = Settings::load("does-not-exist.toml").unwrap();
        assert_eq!(settings.feed.heartbeat_secs, 20);
        assert_eq!(settings.exit.nav_delay_ms, 100);
        assert_eq!(settings.playback.min_image_secs, 0);
        assert_eq!(settings.cache.download_timeout_secs, 30);
    }

    #[test]
    fn token_comes_from_launch_query() {
        let settings = settings_with(Some("signage://player?screen=2&token=abc%20def"), None);
        assert_eq!(settings.launch_token().as_deref(), Some("abc def"));
    }

    #[test]
    fn sentinel_and_absence_disable_the_feed() {
        assert_eq!(settings_with(None, None).launch_token(), None);
        assert_eq!(
            settings_with(Some("signage://player?token=Not%20provided"), None).launch_token(),
            None
        );
        assert_eq!(settings_with(None, Some("Not provided")).launch_token(), None);
    }

    #[test]
    fn configured_token_is_fallback() {
        let settings = settings_with(Some("signage://player"), Some("xyz"));
        assert_eq!(settings.launch_token().as_deref(), Some("xyz"));
    }
}
