//! Campaign feed over a persistent WebSocket.
//!
//! One connection per session, kept alive by a text heartbeat. A closed
//! connection is terminal: the feed never reconnects on its own.

use crate::campaign::CampaignPayload;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Literal liveness ping sent on every heartbeat tick.
pub const HEARTBEAT_TEXT: &str = "pong";

/// Events from the campaign feed.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Connection established.
    Connected,
    /// A new campaign arrived.
    Campaign(CampaignPayload),
    /// Connection closed or could not be opened.
    Closed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Connecting,
    Open,
    Closed,
}

/// Connection status plus the keep-alive timer that only exists while open.
#[derive(Debug)]
pub struct SocketConnection {
    status: SocketStatus,
    keep_alive: Option<Interval>,
    period: Duration,
}

impl SocketConnection {
    pub fn new(period: Duration) -> Self {
        Self {
            status: SocketStatus::Connecting,
            keep_alive: None,
            period,
        }
    }

    pub fn status(&self) -> SocketStatus {
        self.status
    }

    pub fn has_keep_alive(&self) -> bool {
        self.keep_alive.is_some()
    }

    /// Mark open and (re)arm the heartbeat from now.
    pub fn on_open(&mut self) {
        let mut keep_alive = interval_at(Instant::now() + self.period, self.period);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keep_alive = Some(keep_alive);
        self.status = SocketStatus::Open;
    }

    /// Mark closed and drop the heartbeat. Returns false if already closed.
    pub fn on_close(&mut self) -> bool {
        if self.status == SocketStatus::Closed {
            return false;
        }
        self.status = SocketStatus::Closed;
        self.keep_alive = None;
        true
    }

    /// Resolves on the next heartbeat tick; never while no heartbeat is armed.
    pub async fn heartbeat_due(&mut self) {
        match self.keep_alive.as_mut() {
            Some(keep_alive) => {
                keep_alive.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// The JSON object embedded in a frame: first `{` through last `}`.
pub fn extract_json_frame(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Decode a feed frame. Ok(None) for frames that carry no object.
pub fn parse_frame(text: &str) -> Result<Option<CampaignPayload>> {
    let Some(json) = extract_json_frame(text) else {
        return Ok(None);
    };
    let payload = serde_json::from_str(json).context("Invalid campaign payload")?;
    Ok(Some(payload))
}

/// Feed URL for `token`.
pub fn feed_url(base: &str, token: &str) -> Result<Url> {
    let url = format!("{}?access_token={}", base, urlencoding::encode(token));
    Url::parse(&url).context("Invalid feed URL")
}

pub struct CampaignFeed {
    url: Url,
    heartbeat: Duration,
    event_tx: mpsc::Sender<FeedEvent>,
}

impl CampaignFeed {
    pub fn new(url: Url, heartbeat: Duration, event_tx: mpsc::Sender<FeedEvent>) -> Self {
        Self {
            url,
            heartbeat,
            event_tx,
        }
    }

    /// Connect once and relay campaigns until the connection ends.
    pub async fn run(self) {
        let mut conn = SocketConnection::new(self.heartbeat);

        let reason = match self.connect_and_listen(&mut conn).await {
            Ok(()) => "WebSocket closed".to_string(),
            Err(e) => format!("{:#}", e),
        };

        if conn.on_close() {
            tracing::warn!("Campaign feed closed: {}", reason);
            let _ = self.event_tx.send(FeedEvent::Closed { reason }).await;
        }
    }

    async fn connect_and_listen(&self, conn: &mut SocketConnection) -> Result<()> {
        tracing::info!("Connecting to campaign feed...");
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .context("Failed to connect to WebSocket")?;

        let (mut write, mut read) = ws_stream.split();

        conn.on_open();
        let _ = self.event_tx.send(FeedEvent::Connected).await;
        tracing::info!("WebSocket connected");

        loop {
            tokio::select! {
                msg = read.next() => {
                    let Some(msg) = msg else {
                        return Ok(());
                    };
                    match msg.context("Failed to receive message")? {
                        Message::Text(text) => self.handle_message(&text).await,
                        Message::Ping(data) => {
                            write
                                .send(Message::Pong(data))
                                .await
                                .context("Failed to send pong")?;
                        }
                        Message::Close(_) => {
                            tracing::info!("WebSocket closed by server");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                _ = conn.heartbeat_due() => {
                    if conn.status() == SocketStatus::Open {
                        write
                            .send(Message::Text(HEARTBEAT_TEXT.to_string()))
                            .await
                            .context("Failed to send heartbeat")?;
                    }
                }
            }
        }
    }

    async fn handle_message(&self, text: &str) {
        match parse_frame(text) {
            Ok(Some(payload)) => {
                tracing::debug!(
                    "Campaign received with {} items",
                    payload.campaign_scroll_text.event_types.len()
                );
                let _ = self.event_tx.send(FeedEvent::Campaign(payload)).await;
            }
            Ok(None) => tracing::debug!("Ignoring frame without payload"),
            Err(e) => tracing::error!("Failed to parse WebSocket message: {:#}", e),
        }
    }
}

/// Spawn the feed for `token`. None when no token was provided.
pub fn spawn_feed(
    base_url: &str,
    token: Option<&str>,
    heartbeat: Duration,
) -> Result<Option<(mpsc::Receiver<FeedEvent>, JoinHandle<()>)>> {
    let Some(token) = token else {
        tracing::warn!("No access token provided, campaign feed disabled");
        return Ok(None);
    };

    let url = feed_url(base_url, token)?;
    let (tx, rx) = mpsc::channel(32);
    let feed = CampaignFeed::new(url, heartbeat, tx);
    let handle = tokio::spawn(feed.run());

    Ok(Some((rx, handle)))
}
