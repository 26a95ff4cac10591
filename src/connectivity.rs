//! Network reachability and the fallback pages it drives.

use crate::navigation::{Navigator, Page};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

/// Fade applied when the connectivity overlay is dismissed.
pub const OVERLAY_FADE: Duration = Duration::from_millis(300);

pub const STILL_OFFLINE_NOTICE: &str = "Still offline. Please check your internet connection.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Hidden,
    Shown,
    FadingOut { since: Instant },
}

#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: bool,
    overlay: OverlayState,
    notice: Option<&'static str>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self {
            online: true,
            overlay: OverlayState::Hidden,
            notice: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn overlay(&self) -> OverlayState {
        self.overlay
    }

    pub fn notice(&self) -> Option<&'static str> {
        self.notice
    }

    /// Overlay opacity in `0.0..=1.0` at `now`.
    pub fn overlay_alpha(&self, now: Instant) -> f32 {
        match self.overlay {
            OverlayState::Hidden => 0.0,
            OverlayState::Shown => 1.0,
            OverlayState::FadingOut { since } => {
                let progress = now.saturating_duration_since(since).as_secs_f32()
                    / OVERLAY_FADE.as_secs_f32();
                (1.0 - progress).clamp(0.0, 1.0)
            }
        }
    }

    /// Returns true when the event caused a navigation.
    pub fn on_network_event(&mut self, event: NetworkEvent, nav: &mut Navigator) -> bool {
        match event {
            NetworkEvent::Offline => {
                tracing::warn!("No internet connection detected, redirecting...");
                self.online = false;
                self.overlay = OverlayState::Shown;
                nav.navigate(Page::NoNetwork)
            }
            NetworkEvent::Online => {
                tracing::info!("Internet connection restored");
                self.online = true;
                self.dismiss();
                false
            }
        }
    }

    /// The feed connection closed: treat it as a server failure.
    pub fn on_server_failure(&mut self, reason: &str, nav: &mut Navigator) -> bool {
        tracing::error!("Server failure detected: {}", reason);
        if nav.current() == Page::ServerFailure {
            return false;
        }
        self.overlay = OverlayState::Shown;
        nav.navigate(Page::ServerFailure)
    }

    /// Result of a manual retry check.
    pub fn on_retry(&mut self, online: bool) {
        self.online = online;
        if online {
            self.dismiss();
        } else {
            tracing::warn!("Retry failed, still offline");
            self.notice = Some(STILL_OFFLINE_NOTICE);
        }
    }

    fn dismiss(&mut self) {
        self.notice = None;
        if self.overlay == OverlayState::Shown {
            self.overlay = OverlayState::FadingOut {
                since: Instant::now(),
            };
        }
    }

    /// Finish a fade that has run its course. Returns true when the player
    /// page was re-entered and must reload.
    pub fn tick(&mut self, now: Instant, nav: &mut Navigator) -> bool {
        let OverlayState::FadingOut { since } = self.overlay else {
            return false;
        };
        if now.saturating_duration_since(since) < OVERLAY_FADE {
            return false;
        }
        self.overlay = OverlayState::Hidden;
        nav.current() != Page::Player && nav.navigate(Page::Player)
    }
}

/// Check whether `url` answers at all. Any HTTP response counts as online.
pub async fn probe(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    match client.head(url).timeout(timeout).send().await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("Connectivity probe failed: {}", e);
            false
        }
    }
}

/// Poll reachability and report transitions only.
pub fn spawn_probe(
    client: reqwest::Client,
    url: String,
    interval: Duration,
    timeout: Duration,
) -> mpsc::Receiver<NetworkEvent> {
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        let mut online = true;
        loop {
            let now_online = probe(&client, &url, timeout).await;
            if now_online != online {
                online = now_online;
                let event = if online {
                    NetworkEvent::Online
                } else {
                    NetworkEvent::Offline
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            sleep(interval).await;
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_redirects_once() {
        let mut monitor = ConnectivityMonitor::new();
        let mut nav = Navigator::new();
        assert!(monitor.on_network_event(NetworkEvent::Offline, &mut nav));
        assert!(!monitor.is_online());
        assert!(!monitor.on_network_event(NetworkEvent::Offline, &mut nav));
        assert_eq!(nav.current(), Page::NoNetwork);
        assert_eq!(nav.history_len(), 2);
    }

    #[test]
    fn flapping_network_does_not_duplicate_redirects() {
        let mut monitor = ConnectivityMonitor::new();
        let mut nav = Navigator::new();
        monitor.on_network_event(NetworkEvent::Offline, &mut nav);
        monitor.on_network_event(NetworkEvent::Online, &mut nav);
        assert!(matches!(monitor.overlay(), OverlayState::FadingOut { .. }));

        assert!(!monitor.on_network_event(NetworkEvent::Offline, &mut nav));
        assert_eq!(monitor.overlay(), OverlayState::Shown);
        assert_eq!(nav.history_len(), 2);
    }

    #[test]
    fn online_fades_overlay_then_reloads_player() {
        let mut monitor = ConnectivityMonitor::new();
        let mut nav = Navigator::new();
        monitor.on_network_event(NetworkEvent::Offline, &mut nav);
        monitor.on_network_event(NetworkEvent::Online, &mut nav);

        let start = Instant::now();
        assert!(!monitor.tick(start, &mut nav));
        assert!(monitor.overlay_alpha(start) > 0.5);

        let later = start + OVERLAY_FADE + Duration::from_millis(1);
        assert!(monitor.tick(later, &mut nav));
        assert_eq!(nav.current(), Page::Player);
        assert_eq!(monitor.overlay(), OverlayState::Hidden);
        assert_eq!(monitor.overlay_alpha(later), 0.0);
    }

    #[test]
    fn retry_while_offline_shows_notice() {
        let mut monitor = ConnectivityMonitor::new();
        let mut nav = Navigator::new();
        monitor.on_network_event(NetworkEvent::Offline, &mut nav);
        monitor.on_retry(false);
        assert_eq!(monitor.notice(), Some(STILL_OFFLINE_NOTICE));
        assert_eq!(monitor.overlay(), OverlayState::Shown);

        monitor.on_retry(true);
        assert_eq!(monitor.notice(), None);
        assert!(matches!(monitor.overlay(), OverlayState::FadingOut { .. }));
    }

    #[test]
    fn server_failure_redirects_once() {
        let mut monitor = ConnectivityMonitor::new();
        let mut nav = Navigator::new();
        assert!(monitor.on_server_failure("WebSocket closed", &mut nav));
        assert!(!monitor.on_server_failure("WebSocket closed", &mut nav));
        assert_eq!(nav.current(), Page::ServerFailure);
        assert_eq!(nav.history_len(), 2);
    }

    #[tokio::test]
    async fn unreachable_probe_is_offline() {
        let client = reqwest::Client::new();
        assert!(!probe(&client, "http://127.0.0.1:1/", Duration::from_millis(200)).await);
    }
}
