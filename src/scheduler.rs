//! Content playback scheduler.
//!
//! Owns the playlist, the cursor and the single outstanding completion wait.
//! Everything visible on the media area changes through [`ContentScheduler::advance`].

use crate::campaign::{CampaignPayload, ContentItem, ContentKind};
use crate::youtube::{extract_video_id, PlayerEvent, YouTubeBridge};
use anyhow::Result;
use std::time::Duration;

/// How long an idle scheduler waits before retrying a playlist with no playable item.
const IDLE_RETRY: Duration = Duration::from_secs(10);

/// The three media surfaces. At most one is visible at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Image,
    Video,
    YouTube,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Image, Surface::Video, Surface::YouTube];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerRow {
    Upper,
    Bottom,
}

/// Media area geometry as percentages of the screen height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaLayout {
    pub media_height_pct: u8,
    pub media_bottom_pct: u8,
    pub upper_ticker_bottom_pct: u8,
}

impl MediaLayout {
    pub fn for_tickers(upper_visible: bool, bottom_visible: bool) -> Self {
        match (upper_visible, bottom_visible) {
            (true, true) => Self {
                media_height_pct: 80,
                media_bottom_pct: 20,
                upper_ticker_bottom_pct: 10,
            },
            (true, false) | (false, true) => Self {
                media_height_pct: 90,
                media_bottom_pct: 10,
                upper_ticker_bottom_pct: 0,
            },
            (false, false) => Self {
                media_height_pct: 100,
                media_bottom_pct: 0,
                upper_ticker_bottom_pct: 10,
            },
        }
    }
}

impl Default for MediaLayout {
    fn default() -> Self {
        Self::for_tickers(false, false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Surfaces and timers the scheduler drives.
pub trait PlaybackHost {
    fn hide(&mut self, surface: Surface);
    fn show_image(&mut self, link: &str);
    /// Load and start a video. An error means playback could not start.
    fn show_video(&mut self, link: &str) -> Result<()>;
    fn show_youtube(&mut self);
    fn pause_video(&mut self) -> Result<()>;
    fn resume_video(&mut self) -> Result<()>;
    fn set_ticker(&mut self, row: TickerRow, text: Option<&str>);
    fn apply_layout(&mut self, layout: MediaLayout);
    fn prefetch_image(&mut self, _link: &str) {}
    fn arm_timer(&mut self, delay: Duration) -> TimerId;
    fn cancel_timer(&mut self, id: TimerId);
}

/// What the scheduler is waiting on before the next advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    None,
    Timer(TimerId),
    VideoEnd,
    PlayerMessage,
}

#[derive(Debug)]
struct PlaybackState {
    items: Vec<ContentItem>,
    cursor: Option<usize>,
    active: Option<Surface>,
    pending: Completion,
}

pub struct ContentScheduler {
    state: PlaybackState,
    bridge: YouTubeBridge,
    min_image: Duration,
    paused: bool,
    deferred_advance: bool,
}

impl ContentScheduler {
    pub fn new(bridge: YouTubeBridge, min_image: Duration) -> Self {
        Self {
            state: PlaybackState {
                items: Vec::new(),
                cursor: None,
                active: None,
                pending: Completion::None,
            },
            bridge,
            min_image,
            paused: false,
            deferred_advance: false,
        }
    }

    /// Replace the campaign and start it from the first item.
    pub fn update_campaign(&mut self, payload: &CampaignPayload, host: &mut impl PlaybackHost) {
        self.cancel_pending(host);

        let upper = payload.upper_text();
        let bottom = payload.bottom_text();
        host.set_ticker(TickerRow::Upper, upper);
        host.set_ticker(TickerRow::Bottom, bottom);
        host.apply_layout(MediaLayout::for_tickers(upper.is_some(), bottom.is_some()));

        self.state.items = payload.playlist();
        self.state.cursor = None;
        tracing::info!("Campaign updated: {} items", self.state.items.len());

        if self.state.items.is_empty() {
            self.switch_to(None, host);
            return;
        }

        self.advance(host);
    }

    /// Move to the next playlist item, wrapping at the end.
    ///
    /// Items that cannot be shown are skipped within the same call, for at
    /// most one full cycle.
    pub fn advance(&mut self, host: &mut impl PlaybackHost) {
        if self.paused {
            self.deferred_advance = true;
            return;
        }

        self.cancel_pending(host);

        let len = self.state.items.len();
        if len == 0 {
            return;
        }

        for _ in 0..len {
            let next = self.state.cursor.map_or(0, |c| (c + 1) % len);
            self.state.cursor = Some(next);
            let item = self.state.items[next].clone();

            if self.dispatch(&item, host) {
                self.prefetch_after(next, host);
                return;
            }
        }

        tracing::warn!("No playable item in campaign, retrying in {:?}", IDLE_RETRY);
        self.switch_to(None, host);
        self.state.pending = Completion::Timer(host.arm_timer(IDLE_RETRY));
    }

    /// Show `item`. Returns false when it could not be shown.
    fn dispatch(&mut self, item: &ContentItem, host: &mut impl PlaybackHost) -> bool {
        match item.kind {
            ContentKind::Image { duration } => {
                self.switch_to(Some(Surface::Image), host);
                host.show_image(&item.link);
                let delay = duration.unwrap_or(Duration::ZERO).max(self.min_image);
                self.state.pending = Completion::Timer(host.arm_timer(delay));
                tracing::debug!("Showing image {} for {:?}", item.link, delay);
                true
            }
            ContentKind::Video => {
                self.switch_to(Some(Surface::Video), host);
                match host.show_video(&item.link) {
                    Ok(()) => {
                        self.state.pending = Completion::VideoEnd;
                        tracing::debug!("Video playback started: {}", item.link);
                        true
                    }
                    Err(e) => {
                        tracing::error!("Video playback failed for {}: {:#}", item.link, e);
                        false
                    }
                }
            }
            ContentKind::YouTube => {
                let Some(video_id) = extract_video_id(&item.link) else {
                    tracing::warn!("Skipping unresolvable YouTube link: {}", item.link);
                    return false;
                };
                self.switch_to(Some(Surface::YouTube), host);
                host.show_youtube();
                self.bridge.load(&video_id);
                self.state.pending = Completion::PlayerMessage;
                true
            }
        }
    }

    /// Hide every surface except `target` and record it as active.
    fn switch_to(&mut self, target: Option<Surface>, host: &mut impl PlaybackHost) {
        if self.state.active == Some(Surface::YouTube) && target != Some(Surface::YouTube) {
            self.bridge.pause();
        }
        for surface in Surface::ALL {
            if Some(surface) != target {
                host.hide(surface);
            }
        }
        self.state.active = target;
    }

    fn cancel_pending(&mut self, host: &mut impl PlaybackHost) {
        if let Completion::Timer(id) = self.state.pending {
            host.cancel_timer(id);
        }
        self.state.pending = Completion::None;
    }

    fn prefetch_after(&self, index: usize, host: &mut impl PlaybackHost) {
        let len = self.state.items.len();
        let next = &self.state.items[(index + 1) % len];
        if let ContentKind::Image { .. } = next.kind {
            host.prefetch_image(&next.link);
        }
    }

    /// An image (or idle retry) timer elapsed.
    pub fn on_timer(&mut self, id: TimerId, host: &mut impl PlaybackHost) {
        if self.state.pending != Completion::Timer(id) {
            tracing::debug!("Ignoring stale timer {:?}", id);
            return;
        }
        self.state.pending = Completion::None;
        self.advance(host);
    }

    /// The native video surface reached its end (or failed mid-stream).
    pub fn on_video_ended(&mut self, host: &mut impl PlaybackHost) {
        if self.state.pending != Completion::VideoEnd {
            return;
        }
        tracing::debug!("Video ended, loading next item");
        self.state.pending = Completion::None;
        self.advance(host);
    }

    pub fn on_player_event(&mut self, event: PlayerEvent, host: &mut impl PlaybackHost) {
        match event {
            PlayerEvent::PlayerReady => self.resync_player(host),
            PlayerEvent::VideoEnded | PlayerEvent::VideoError { .. } => {
                if let PlayerEvent::VideoError { error } = &event {
                    tracing::error!("YouTube player error: {}", error);
                }
                if self.state.pending != Completion::PlayerMessage {
                    return;
                }
                self.state.pending = Completion::None;
                self.advance(host);
            }
        }
    }

    /// Reload the current YouTube item for a player that finished
    /// initializing after its slot was selected.
    fn resync_player(&mut self, host: &mut impl PlaybackHost) {
        let Some(item) = self.current_item() else {
            return;
        };
        if item.kind != ContentKind::YouTube {
            tracing::debug!("Player ready, current item is not YouTube");
            return;
        }
        let Some(video_id) = extract_video_id(&item.link) else {
            return;
        };

        tracing::info!("Player ready, reloading {}", video_id);
        self.switch_to(Some(Surface::YouTube), host);
        host.show_youtube();
        self.bridge.load(&video_id);
        self.state.pending = Completion::PlayerMessage;
        if self.paused {
            self.bridge.pause();
        }
    }

    /// Pause whatever is playing. Best-effort.
    pub fn pause(&mut self, host: &mut impl PlaybackHost) {
        if self.paused {
            return;
        }
        self.paused = true;
        match self.state.active {
            Some(Surface::Video) => {
                if let Err(e) = host.pause_video() {
                    tracing::error!("Failed to pause video: {:#}", e);
                }
            }
            Some(Surface::YouTube) => self.bridge.pause(),
            _ => {}
        }
    }

    /// Resume the paused content and run any advance that came due meanwhile.
    pub fn resume(&mut self, host: &mut impl PlaybackHost) {
        if !self.paused {
            return;
        }
        self.paused = false;
        match self.state.active {
            Some(Surface::Video) => {
                if let Err(e) = host.resume_video() {
                    tracing::warn!("Couldn't resume video: {:#}", e);
                }
            }
            Some(Surface::YouTube) => self.bridge.play(),
            _ => {}
        }

        if std::mem::take(&mut self.deferred_advance) {
            self.advance(host);
        }
    }

    /// Drop the campaign and blank every surface.
    pub fn stop(&mut self, host: &mut impl PlaybackHost) {
        self.cancel_pending(host);
        self.switch_to(None, host);
        self.state.items.clear();
        self.state.cursor = None;
        self.deferred_advance = false;
        host.set_ticker(TickerRow::Upper, None);
        host.set_ticker(TickerRow::Bottom, None);
        host.apply_layout(MediaLayout::default());
    }

    pub fn cursor(&self) -> Option<usize> {
        self.state.cursor
    }

    pub fn active_surface(&self) -> Option<Surface> {
        self.state.active
    }

    pub fn current_item(&self) -> Option<&ContentItem> {
        self.state.cursor.and_then(|c| self.state.items.get(c))
    }

    pub fn has_pending_completion(&self) -> bool {
        self.state.pending != Completion::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{CampaignScrollText, WireItem};
    use crate::youtube::PlayerCommand;
    use anyhow::anyhow;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Hide(Surface),
        ShowImage(String),
        ShowVideo(String),
        ShowYouTube,
        PauseVideo,
        ResumeVideo,
        Prefetch(String),
    }

    #[derive(Default)]
    struct FakeHost {
        ops: Vec<Op>,
        visible: HashSet<Surface>,
        timers: HashMap<TimerId, Duration>,
        cancelled: Vec<TimerId>,
        failing_videos: HashSet<String>,
        tickers: HashMap<&'static str, Option<String>>,
        layout: Option<MediaLayout>,
        next_timer: u64,
    }

    impl FakeHost {
        fn show(&mut self, surface: Surface) {
            self.visible.insert(surface);
            assert!(self.visible.len() <= 1, "two surfaces visible: {:?}", self.visible);
        }

        /// The single live timer, if any.
        fn live_timer(&self) -> Option<(TimerId, Duration)> {
            let live: Vec<_> = self
                .timers
                .iter()
                .filter(|(id, _)| !self.cancelled.contains(id))
                .map(|(id, d)| (*id, *d))
                .collect();
            assert!(live.len() <= 1, "overlapping timers: {:?}", live);
            live.first().copied()
        }

        /// Let the live timer elapse, returning its id.
        fn fire(&mut self) -> TimerId {
            let (id, _) = self.live_timer().expect("no live timer");
            self.timers.remove(&id);
            id
        }
    }

    impl PlaybackHost for FakeHost {
        fn hide(&mut self, surface: Surface) {
            self.visible.remove(&surface);
            self.ops.push(Op::Hide(surface));
        }

        fn show_image(&mut self, link: &str) {
            self.show(Surface::Image);
            self.ops.push(Op::ShowImage(link.to_string()));
        }

        fn show_video(&mut self, link: &str) -> Result<()> {
            self.ops.push(Op::ShowVideo(link.to_string()));
            if self.failing_videos.contains(link) {
                return Err(anyhow!("decoder missing"));
            }
            self.show(Surface::Video);
            Ok(())
        }

        fn show_youtube(&mut self) {
            self.show(Surface::YouTube);
            self.ops.push(Op::ShowYouTube);
        }

        fn pause_video(&mut self) -> Result<()> {
            self.ops.push(Op::PauseVideo);
            Ok(())
        }

        fn resume_video(&mut self) -> Result<()> {
            self.ops.push(Op::ResumeVideo);
            Ok(())
        }

        fn set_ticker(&mut self, row: TickerRow, text: Option<&str>) {
            let key = match row {
                TickerRow::Upper => "upper",
                TickerRow::Bottom => "bottom",
            };
            self.tickers.insert(key, text.map(str::to_string));
        }

        fn apply_layout(&mut self, layout: MediaLayout) {
            self.layout = Some(layout);
        }

        fn prefetch_image(&mut self, link: &str) {
            self.ops.push(Op::Prefetch(link.to_string()));
        }

        fn arm_timer(&mut self, delay: Duration) -> TimerId {
            self.next_timer += 1;
            let id = TimerId(self.next_timer);
            self.timers.insert(id, delay);
            id
        }

        fn cancel_timer(&mut self, id: TimerId) {
            self.cancelled.push(id);
        }
    }

    fn wire(item_type: &str, link: &str, duration: Option<&str>) -> WireItem {
        WireItem {
            item_type: Some(item_type.to_string()),
            link: Some(link.to_string()),
            duration: duration.map(str::to_string),
        }
    }

    fn payload(items: Vec<WireItem>) -> CampaignPayload {
        CampaignPayload {
            campaign_scroll_text: CampaignScrollText {
                text_content: Some("Upper".into()),
                event_types: items,
            },
            gold_rate_scroll_text: None,
        }
    }

    fn scheduler() -> (ContentScheduler, mpsc::UnboundedReceiver<PlayerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ContentScheduler::new(YouTubeBridge::new(tx), Duration::ZERO), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PlayerCommand>) -> Vec<PlayerCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    fn last_shown(host: &FakeHost) -> Option<Op> {
        host.ops
            .iter()
            .rev()
            .find(|op| matches!(op, Op::ShowImage(_) | Op::ShowVideo(_) | Op::ShowYouTube))
            .cloned()
    }

    #[test]
    fn image_then_video_then_wraps() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();

        scheduler.update_campaign(
            &payload(vec![
                wire("image", "a.jpg", Some("00:00:05")),
                wire("video", "b.mp4", None),
            ]),
            &mut host,
        );

        assert_eq!(last_shown(&host), Some(Op::ShowImage("a.jpg".into())));
        let (_, delay) = host.live_timer().unwrap();
        assert_eq!(delay, Duration::from_millis(5000));

        let timer = host.fire();
        scheduler.on_timer(timer, &mut host);
        assert_eq!(last_shown(&host), Some(Op::ShowVideo("b.mp4".into())));
        assert_eq!(scheduler.active_surface(), Some(Surface::Video));

        scheduler.on_video_ended(&mut host);
        assert_eq!(last_shown(&host), Some(Op::ShowImage("a.jpg".into())));
        assert_eq!(scheduler.cursor(), Some(0));
    }

    #[test]
    fn cycles_every_item_in_order() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        let items: Vec<_> = (0..4)
            .map(|i| wire("image", &format!("{i}.jpg"), Some("00:00:01")))
            .collect();
        scheduler.update_campaign(&payload(items), &mut host);

        let mut seen = vec![scheduler.cursor().unwrap()];
        for _ in 0..8 {
            let timer = host.fire();
            scheduler.on_timer(timer, &mut host);
            seen.push(scheduler.cursor().unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn update_resets_cursor_and_cancels_timer() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        let items = vec![
            wire("image", "a.jpg", Some("00:00:05")),
            wire("image", "b.jpg", Some("00:00:05")),
        ];
        scheduler.update_campaign(&payload(items.clone()), &mut host);
        let first = host.fire();
        scheduler.on_timer(first, &mut host);
        assert_eq!(scheduler.cursor(), Some(1));
        let (second, _) = host.live_timer().unwrap();

        scheduler.update_campaign(&payload(items), &mut host);
        assert!(host.cancelled.contains(&second));
        assert_eq!(scheduler.cursor(), Some(0));

        // The stale timer firing late must not advance the new campaign.
        scheduler.on_timer(second, &mut host);
        assert_eq!(scheduler.cursor(), Some(0));
    }

    #[test]
    fn empty_campaign_goes_idle() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(&payload(vec![wire("video", "b.mp4", None)]), &mut host);
        assert_eq!(scheduler.active_surface(), Some(Surface::Video));

        scheduler.update_campaign(&payload(vec![]), &mut host);
        assert_eq!(scheduler.active_surface(), None);
        assert!(host.visible.is_empty());
        assert_eq!(scheduler.cursor(), None);

        scheduler.advance(&mut host);
        assert_eq!(scheduler.cursor(), None);
        assert!(!scheduler.has_pending_completion());
    }

    #[test]
    fn failed_video_start_advances_immediately() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        host.failing_videos.insert("bad.mp4".into());
        scheduler.update_campaign(
            &payload(vec![
                wire("video", "bad.mp4", None),
                wire("image", "a.jpg", Some("00:00:02")),
            ]),
            &mut host,
        );
        assert_eq!(scheduler.cursor(), Some(1));
        assert_eq!(scheduler.active_surface(), Some(Surface::Image));
    }

    #[test]
    fn unresolvable_youtube_link_is_skipped() {
        let (mut scheduler, mut rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(
            &payload(vec![
                wire("link", "https://example.com/x", None),
                wire("link", "https://youtu.be/dQw4w9WgXcQ", None),
            ]),
            &mut host,
        );
        assert_eq!(scheduler.cursor(), Some(1));
        assert_eq!(
            drain(&mut rx),
            vec![PlayerCommand::LoadVideo {
                video_id: "dQw4w9WgXcQ".into()
            }]
        );

        scheduler.on_player_event(PlayerEvent::VideoEnded, &mut host);
        assert_eq!(scheduler.cursor(), Some(1));
    }

    #[test]
    fn unplayable_playlist_retries_later() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(
            &payload(vec![wire("link", "https://example.com/x", None)]),
            &mut host,
        );
        assert_eq!(scheduler.active_surface(), None);
        let (_, delay) = host.live_timer().unwrap();
        assert_eq!(delay, IDLE_RETRY);
    }

    #[test]
    fn player_ready_reloads_only_youtube_items() {
        let (mut scheduler, mut rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(
            &payload(vec![
                wire("image", "a.jpg", Some("00:00:03")),
                wire("link", "https://www.youtube.com/watch?v=dQw4w9WgXcQ", None),
            ]),
            &mut host,
        );
        scheduler.on_player_event(PlayerEvent::PlayerReady, &mut host);
        assert!(drain(&mut rx).is_empty());

        let timer = host.fire();
        scheduler.on_timer(timer, &mut host);
        drain(&mut rx);

        scheduler.on_player_event(PlayerEvent::PlayerReady, &mut host);
        assert_eq!(
            drain(&mut rx),
            vec![PlayerCommand::LoadVideo {
                video_id: "dQw4w9WgXcQ".into()
            }]
        );
    }

    #[test]
    fn player_error_advances_like_end() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(
            &payload(vec![
                wire("link", "https://youtu.be/dQw4w9WgXcQ", None),
                wire("image", "a.jpg", None),
            ]),
            &mut host,
        );
        scheduler.on_player_event(
            PlayerEvent::VideoError {
                error: serde_json::json!(101),
            },
            &mut host,
        );
        assert_eq!(scheduler.active_surface(), Some(Surface::Image));
    }

    #[test]
    fn leaving_youtube_pauses_the_player() {
        let (mut scheduler, mut rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(
            &payload(vec![
                wire("link", "https://youtu.be/dQw4w9WgXcQ", None),
                wire("image", "a.jpg", None),
            ]),
            &mut host,
        );
        drain(&mut rx);
        scheduler.on_player_event(PlayerEvent::VideoEnded, &mut host);
        assert_eq!(drain(&mut rx), vec![PlayerCommand::Pause]);
    }

    #[test]
    fn surfaces_are_hidden_before_the_next_is_shown() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(&payload(vec![wire("video", "b.mp4", None)]), &mut host);
        let show = host
            .ops
            .iter()
            .position(|op| *op == Op::ShowVideo("b.mp4".into()))
            .unwrap();
        assert!(host.ops[..show].contains(&Op::Hide(Surface::Image)));
        assert!(host.ops[..show].contains(&Op::Hide(Surface::YouTube)));
    }

    #[test]
    fn missing_duration_is_zero_unless_floored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = ContentScheduler::new(YouTubeBridge::new(tx), Duration::from_secs(3));
        let mut host = FakeHost::default();
        scheduler.update_campaign(&payload(vec![wire("image", "a.jpg", Some("x"))]), &mut host);
        assert_eq!(host.live_timer().unwrap().1, Duration::from_secs(3));

        let (mut scheduler, _rx) = super::tests::scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(&payload(vec![wire("image", "a.jpg", None)]), &mut host);
        assert_eq!(host.live_timer().unwrap().1, Duration::ZERO);
    }

    #[test]
    fn pause_defers_advances_until_resume() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(
            &payload(vec![
                wire("image", "a.jpg", Some("00:00:01")),
                wire("video", "b.mp4", None),
            ]),
            &mut host,
        );
        scheduler.pause(&mut host);
        let timer = host.fire();
        scheduler.on_timer(timer, &mut host);
        assert_eq!(scheduler.cursor(), Some(0));

        scheduler.resume(&mut host);
        assert_eq!(scheduler.cursor(), Some(1));
        assert_eq!(scheduler.active_surface(), Some(Surface::Video));
    }

    #[test]
    fn pause_and_resume_touch_only_the_active_surface() {
        let (mut scheduler, mut rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(&payload(vec![wire("video", "b.mp4", None)]), &mut host);
        drain(&mut rx);

        scheduler.pause(&mut host);
        scheduler.resume(&mut host);
        assert!(host.ops.ends_with(&[Op::PauseVideo, Op::ResumeVideo]));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn prefetches_the_next_image() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        scheduler.update_campaign(
            &payload(vec![wire("video", "b.mp4", None), wire("image", "a.jpg", None)]),
            &mut host,
        );
        assert!(host.ops.contains(&Op::Prefetch("a.jpg".into())));
    }

    #[test]
    fn ticker_visibility_drives_layout() {
        let (mut scheduler, _rx) = scheduler();
        let mut host = FakeHost::default();
        let mut both = payload(vec![]);
        both.gold_rate_scroll_text = Some("Gold 22K".into());
        scheduler.update_campaign(&both, &mut host);
        assert_eq!(host.layout, Some(MediaLayout::for_tickers(true, true)));
        assert_eq!(host.tickers["bottom"].as_deref(), Some("Gold 22K"));

        assert_eq!(MediaLayout::for_tickers(true, true).media_height_pct, 80);
        assert_eq!(MediaLayout::for_tickers(false, true).media_height_pct, 90);
        assert_eq!(MediaLayout::for_tickers(false, false).media_height_pct, 100);
    }
}
