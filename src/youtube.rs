//! Bridge to the embedded YouTube player.
//!
//! The player runs inside an embed host process; commands and events travel
//! as JSON text frames over a local WebSocket.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Commands sent from the scheduler to the embedded player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerCommand {
    LoadVideo {
        #[serde(rename = "videoId")]
        video_id: String,
    },
    Pause,
    Play,
}

/// Events reported by the embedded player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    PlayerReady,
    VideoEnded,
    VideoError {
        #[serde(default)]
        error: serde_json::Value,
    },
}

/// Extract the 11-character video id from a YouTube URL.
///
/// Accepts `youtu.be/<id>`, `watch?v=<id>`, `/embed/<id>`, `/shorts/<id>`
/// and `/live/<id>` on youtube.com and youtube-nocookie.com hosts.
pub fn extract_video_id(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    let host = url.host_str()?;

    let candidate = if host == "youtu.be" {
        url.path().trim_start_matches('/').to_string()
    } else if host.contains("youtube.com") || host.contains("youtube-nocookie.com") {
        if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
            v.into_owned()
        } else {
            let path = url.path();
            ["/embed/", "/shorts/", "/live/"]
                .iter()
                .find_map(|prefix| path.strip_prefix(prefix))?
                .to_string()
        }
    } else {
        return None;
    };

    is_video_id(&candidate).then_some(candidate)
}

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Sending half of the player channel, owned by the scheduler.
///
/// Every send is best-effort: a closed channel is logged and ignored.
#[derive(Debug, Clone)]
pub struct YouTubeBridge {
    tx: mpsc::UnboundedSender<PlayerCommand>,
}

impl YouTubeBridge {
    pub fn new(tx: mpsc::UnboundedSender<PlayerCommand>) -> Self {
        Self { tx }
    }

    pub fn load(&self, video_id: &str) {
        self.post(PlayerCommand::LoadVideo {
            video_id: video_id.to_string(),
        });
    }

    pub fn pause(&self) {
        self.post(PlayerCommand::Pause);
    }

    pub fn play(&self) {
        self.post(PlayerCommand::Play);
    }

    fn post(&self, command: PlayerCommand) {
        if let Err(e) = self.tx.send(command) {
            tracing::warn!("Embedded player unreachable, dropped {:?}", e.0);
        }
    }
}

/// Keeps the embed host connection alive and shuttles messages both ways.
pub struct EmbedLink {
    bridge_url: String,
    reconnect: Duration,
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    events: mpsc::Sender<PlayerEvent>,
}

impl EmbedLink {
    pub fn new(
        bridge_url: String,
        reconnect: Duration,
        commands: mpsc::UnboundedReceiver<PlayerCommand>,
        events: mpsc::Sender<PlayerEvent>,
    ) -> Self {
        Self {
            bridge_url,
            reconnect,
            commands,
            events,
        }
    }

    /// Run until the scheduler side of the channel is dropped.
    pub async fn run(mut self) {
        loop {
            match self.connect_and_relay().await {
                Ok(true) => return,
                Ok(false) => tracing::warn!("Embed host disconnected, reconnecting..."),
                Err(e) => tracing::debug!("Embed host unavailable: {:#}", e),
            }

            // The host re-announces playerReady after reconnecting, so
            // commands queued while it was away are stale.
            while let Ok(command) = self.commands.try_recv() {
                tracing::debug!("Dropping command for absent embed host: {:?}", command);
            }

            sleep(self.reconnect).await;
        }
    }

    /// Returns Ok(true) when the command channel closed and the link should stop.
    async fn connect_and_relay(&mut self) -> Result<bool> {
        let (ws_stream, _response) = connect_async(self.bridge_url.as_str())
            .await
            .context("Failed to connect to embed host")?;
        tracing::info!("Embed host connected");

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        return Ok(true);
                    };
                    let text = serde_json::to_string(&command)?;
                    write
                        .send(Message::Text(text))
                        .await
                        .context("Failed to send player command")?;
                }
                msg = read.next() => {
                    let Some(msg) = msg else {
                        return Ok(false);
                    };
                    match msg.context("Failed to receive player message")? {
                        Message::Text(text) => self.forward_event(&text).await,
                        Message::Ping(data) => {
                            write
                                .send(Message::Pong(data))
                                .await
                                .context("Failed to send pong")?;
                        }
                        Message::Close(_) => return Ok(false),
                        _ => {}
                    }
                }
            }
        }
    }

    async fn forward_event(&self, text: &str) {
        match serde_json::from_str::<PlayerEvent>(text) {
            Ok(event) => {
                let _ = self.events.send(event).await;
            }
            Err(e) => tracing::debug!("Ignoring player message: {} - {}", e, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn resolves_supported_url_shapes() {
        let id = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=3"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://youtube.com/shorts/dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://m.youtube.com/live/dQw4w9WgXcQ?si=x"), id);
        assert_eq!(extract_video_id("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ"), id);
    }

    #[test]
    fn rejects_foreign_or_malformed_links() {
        assert_eq!(extract_video_id("https://example.com/x"), None);
        assert_eq!(extract_video_id("not a url"), None);
        assert_eq!(extract_video_id("https://youtu.be/short"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=bad!id!1234"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/channel/abc"), None);
    }

    #[test]
    fn commands_use_the_embed_wire_shape() {
        let load = PlayerCommand::LoadVideo {
            video_id: "dQw4w9WgXcQ".into(),
        };
        assert_eq!(
            serde_json::to_value(&load).unwrap(),
            serde_json::json!({"type": "loadVideo", "videoId": "dQw4w9WgXcQ"})
        );
        assert_eq!(
            serde_json::to_value(PlayerCommand::Pause).unwrap(),
            serde_json::json!({"type": "pause"})
        );
    }

    #[test]
    fn events_parse_from_embed_messages() {
        let ready: PlayerEvent = serde_json::from_str(r#"{"type":"playerReady"}"#).unwrap();
        assert_eq!(ready, PlayerEvent::PlayerReady);
        let error: PlayerEvent =
            serde_json::from_str(r#"{"type":"videoError","error":150}"#).unwrap();
        assert_eq!(
            error,
            PlayerEvent::VideoError {
                error: serde_json::json!(150)
            }
        );
        assert!(serde_json::from_str::<PlayerEvent>(r#"{"type":"buffering"}"#).is_err());
    }

    #[test]
    fn bridge_survives_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        YouTubeBridge::new(tx).pause();
    }

    #[tokio::test]
    async fn relays_commands_and_events_through_embed_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let host = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"type":"playerReady"}"#.into()))
                .await
                .unwrap();
            let Some(Ok(Message::Text(text))) = ws.next().await else {
                panic!("expected a command frame");
            };
            text
        });

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let link = EmbedLink::new(
            format!("ws://{}", addr),
            Duration::from_millis(50),
            cmd_rx,
            event_tx,
        );
        let relay = tokio::spawn(link.run());

        assert_eq!(event_rx.recv().await, Some(PlayerEvent::PlayerReady));
        YouTubeBridge::new(cmd_tx).load("dQw4w9WgXcQ");

        let received = host.await.unwrap();
        assert_eq!(received, r#"{"type":"loadVideo","videoId":"dQw4w9WgXcQ"}"#);
        relay.abort();
    }
}
