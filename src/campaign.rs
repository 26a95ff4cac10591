//! Campaign payloads pushed by the control server.
//!
//! Wire items are decoded once here into concrete [`ContentItem`]s so the
//! scheduler never re-derives a content kind at dispatch time.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A full campaign as received from the feed. Replaces the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPayload {
    #[serde(default)]
    pub campaign_scroll_text: CampaignScrollText,
    #[serde(default)]
    pub gold_rate_scroll_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignScrollText {
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub event_types: Vec<WireItem>,
}

/// One playlist entry exactly as the server sends it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WireItem {
    #[serde(rename = "type", default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

/// Resolved content kind with its completion signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// Shown for a fixed time; `None` when the duration was absent or unparsable.
    Image { duration: Option<Duration> },
    /// Local/streamed video, completes on end-of-media.
    Video,
    /// Embedded YouTube video, completes on a player message.
    YouTube,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub kind: ContentKind,
    pub link: String,
}

impl ContentItem {
    pub fn image(link: &str, duration: Option<Duration>) -> Self {
        Self {
            kind: ContentKind::Image { duration },
            link: link.to_string(),
        }
    }

    pub fn video(link: &str) -> Self {
        Self {
            kind: ContentKind::Video,
            link: link.to_string(),
        }
    }

    pub fn youtube(link: &str) -> Self {
        Self {
            kind: ContentKind::YouTube,
            link: link.to_string(),
        }
    }

    /// Decode a wire item. Items without a link or with an unknown type are rejected.
    ///
    /// An explicit `type` always wins; a missing `type` with an `mp4` link is
    /// read as a video for compatibility with older campaign editors.
    pub fn from_wire(item: &WireItem) -> Option<Self> {
        let link = item.link.as_deref().map(str::trim).filter(|l| !l.is_empty());
        let Some(link) = link else {
            tracing::warn!("Dropping content item without link: {:?}", item);
            return None;
        };

        let kind = match item.item_type.as_deref() {
            Some("image") => ContentKind::Image {
                duration: item.duration.as_deref().and_then(parse_duration),
            },
            Some("video") => ContentKind::Video,
            Some("link") => ContentKind::YouTube,
            None if link.contains("mp4") => ContentKind::Video,
            other => {
                tracing::warn!("Dropping content item with unsupported type {:?}: {}", other, link);
                return None;
            }
        };

        Some(Self {
            kind,
            link: link.to_string(),
        })
    }
}

impl CampaignPayload {
    /// Upper ticker text, None when blank.
    pub fn upper_text(&self) -> Option<&str> {
        non_blank(self.campaign_scroll_text.text_content.as_deref())
    }

    /// Bottom ticker text, None when blank.
    pub fn bottom_text(&self) -> Option<&str> {
        non_blank(self.gold_rate_scroll_text.as_deref())
    }

    /// Normalized playlist in server order, malformed items dropped.
    pub fn playlist(&self) -> Vec<ContentItem> {
        self.campaign_scroll_text
            .event_types
            .iter()
            .filter_map(ContentItem::from_wire)
            .collect()
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}

/// Parse an `HH:MM:SS` duration.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let mut parts = text.trim().split(':').map(|p| p.trim().parse::<u64>());
    let (Some(Ok(h)), Some(Ok(m)), Some(Ok(s)), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let secs = h.checked_mul(3600)?.checked_add(m.checked_mul(60)?)?.checked_add(s)?;
    Some(Duration::from_secs(secs))
}
