//! Player event loop.
//!
//! Wires the feed, the embedded player link, connectivity probing and SDL
//! input into the scheduler and the exit guard, and renders every frame.

use crate::assets::{AssetManager, ImageLoader, LoadedImage};
use crate::cache::Cache;
use crate::campaign::{CampaignPayload, ContentKind};
use crate::config::Settings;
use crate::connectivity::{self, ConnectivityMonitor, NetworkEvent, OverlayState};
use crate::exit_guard::{
    BackSignal, ExitGuard, ExitShell, KeyOutcome, OverlayButton, PlaybackControl, RemoteKey, Visibility,
};
use crate::feed::{self, FeedEvent};
use crate::navigation::{Navigator, Page};
use crate::renderer::{InputEvent, MediaFrame, OverlayView, Renderer, Scene, TakeoverView};
use crate::scheduler::{ContentScheduler, MediaLayout, PlaybackHost, Surface, TickerRow, TimerId};
use crate::video::VideoSurface;
use crate::youtube::{EmbedLink, PlayerEvent, YouTubeBridge};
use anyhow::{Context, Result};
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Events raised by spawned tasks back into the loop.
#[derive(Debug)]
enum AppEvent {
    Timer(TimerId),
    NavActivation(u64),
    Retry(bool),
    Feed { session: u64, event: FeedEvent },
}

/// The media area and tickers, as driven by the scheduler.
struct Stage {
    video: VideoSurface,
    images: ImageLoader,
    assets: Arc<AssetManager>,
    visible: Option<Surface>,
    wanted_image: Option<String>,
    image: Option<Arc<RgbaImage>>,
    /// Bumped for every image taken onto the stage; keys the renderer's texture.
    image_generation: u64,
    layout: MediaLayout,
    upper_ticker: Option<String>,
    bottom_ticker: Option<String>,
    timers: HashMap<TimerId, JoinHandle<()>>,
    next_timer: u64,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl Stage {
    fn on_image_loaded(&mut self, loaded: LoadedImage) {
        if self.wanted_image.as_deref() == Some(loaded.link.as_str()) {
            self.image_generation += 1;
            self.image = Some(loaded.image);
        }
    }

    fn timer_fired(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    fn media_frame(&self) -> MediaFrame<'_> {
        let frame = match self.visible {
            Some(Surface::Image) => self.image.as_ref().map(|image| MediaFrame::Image {
                generation: self.image_generation,
                image: image.as_ref(),
            }),
            Some(Surface::Video) => self.video.current_frame().map(MediaFrame::Video),
            _ => None,
        };
        frame.unwrap_or(MediaFrame::Blank)
    }
}

impl PlaybackHost for Stage {
    fn hide(&mut self, surface: Surface) {
        match surface {
            Surface::Image => {
                self.wanted_image = None;
                self.image = None;
            }
            Surface::Video => self.video.stop(),
            Surface::YouTube => {}
        }
        if self.visible == Some(surface) {
            self.visible = None;
        }
    }

    fn show_image(&mut self, link: &str) {
        self.visible = Some(Surface::Image);
        self.wanted_image = Some(link.to_string());
        self.images.request(link);
    }

    fn show_video(&mut self, link: &str) -> Result<()> {
        let uri = self.assets.full_url(link)?;
        self.video.play(&uri)?;
        self.visible = Some(Surface::Video);
        Ok(())
    }

    fn show_youtube(&mut self) {
        self.visible = Some(Surface::YouTube);
    }

    fn pause_video(&mut self) -> Result<()> {
        self.video.pause()
    }

    fn resume_video(&mut self) -> Result<()> {
        self.video.resume()
    }

    fn set_ticker(&mut self, row: TickerRow, text: Option<&str>) {
        let text = text.map(str::to_string);
        match row {
            TickerRow::Upper => self.upper_ticker = text,
            TickerRow::Bottom => self.bottom_ticker = text,
        }
    }

    fn apply_layout(&mut self, layout: MediaLayout) {
        self.layout = layout;
    }

    fn prefetch_image(&mut self, link: &str) {
        self.images.prefetch(link);
    }

    fn arm_timer(&mut self, delay: Duration) -> TimerId {
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(AppEvent::Timer(id));
        });
        self.timers.insert(id, handle);
        id
    }

    fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }
}

/// Pauses and resumes the scheduler around the exit overlay.
struct Playback<'a> {
    scheduler: &'a mut ContentScheduler,
    stage: &'a mut Stage,
}

impl PlaybackControl for Playback<'_> {
    fn pause_playback(&mut self) {
        self.scheduler.pause(self.stage);
    }

    fn resume_playback(&mut self) {
        self.scheduler.resume(self.stage);
    }
}

/// Overlay presentation state and the platform exit hooks.
struct Shell {
    overlay: bool,
    cursor: bool,
    quit: bool,
    close_command: Option<Vec<String>>,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl ExitShell for Shell {
    fn show_overlay(&mut self) {
        self.overlay = true;
    }

    fn hide_overlay(&mut self) {
        self.overlay = false;
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        self.cursor = visible;
    }

    fn overlay_buttons(&self) -> Vec<OverlayButton> {
        vec![OverlayButton::Stay, OverlayButton::Exit]
    }

    fn schedule_nav_activation(&mut self, epoch: u64, delay: Duration) {
        let events = self.events.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(AppEvent::NavActivation(epoch));
        });
    }

    fn platform_back(&mut self) -> Result<bool> {
        let Some((program, args)) = self.close_command.as_deref().and_then(|c| c.split_first()) else {
            return Ok(false);
        };
        tokio::process::Command::new(program)
            .args(args)
            .spawn()
            .with_context(|| format!("Failed to run {}", program))?;
        Ok(true)
    }

    fn close_window(&mut self) {
        self.quit = true;
    }
}

/// Receivers owned by the loop itself.
struct Inbox {
    events: mpsc::UnboundedReceiver<AppEvent>,
    player: mpsc::Receiver<PlayerEvent>,
    images: mpsc::Receiver<Result<LoadedImage, String>>,
    network: mpsc::Receiver<NetworkEvent>,
}

pub struct App {
    settings: Settings,
    renderer: Renderer,
    scheduler: ContentScheduler,
    stage: Stage,
    shell: Shell,
    guard: ExitGuard,
    navigator: Navigator,
    monitor: ConnectivityMonitor,
    client: reqwest::Client,
    token: Option<String>,
    feed: Option<JoinHandle<()>>,
    session: u64,
    campaign: Option<CampaignPayload>,
    housekeeping: mpsc::UnboundedSender<CampaignPayload>,
    events: mpsc::UnboundedSender<AppEvent>,
    inbox: Option<Inbox>,
}

impl App {
    pub async fn new(settings: Settings) -> Result<Self> {
        let renderer = Renderer::new(&settings.display.font_path, settings.display.font_size)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.cache.download_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let cache = Cache::new(settings.cache.dir.clone(), settings.cache.max_size_gb)?;
        let campaign = match cache.load_campaign() {
            Ok(campaign) => campaign,
            Err(e) => {
                tracing::warn!("Ignoring cached campaign: {:#}", e);
                None
            }
        };
        let assets = Arc::new(AssetManager::new(
            Arc::new(RwLock::new(cache)),
            settings.playback.media_base_url.as_deref(),
            client.clone(),
        )?);
        let (images, images_rx) = ImageLoader::new(assets.clone());
        let housekeeping = spawn_housekeeping(assets.clone());

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (player_tx, player_rx) = mpsc::channel(16);
        let embed = EmbedLink::new(
            settings.embed.bridge_url.clone(),
            Duration::from_secs(settings.embed.reconnect_secs),
            commands_rx,
            player_tx,
        );
        tokio::spawn(embed.run());

        let network_rx = connectivity::spawn_probe(
            client.clone(),
            settings.connectivity.probe_url.clone(),
            Duration::from_secs(settings.connectivity.probe_interval_secs),
            Duration::from_secs(settings.connectivity.probe_timeout_secs),
        );

        let scheduler = ContentScheduler::new(
            YouTubeBridge::new(commands_tx),
            Duration::from_secs(settings.playback.min_image_secs),
        );

        let stage = Stage {
            video: VideoSurface::new(),
            images,
            assets,
            visible: None,
            wanted_image: None,
            image: None,
            image_generation: 0,
            layout: MediaLayout::default(),
            upper_ticker: None,
            bottom_ticker: None,
            timers: HashMap::new(),
            next_timer: 0,
            events: events_tx.clone(),
        };

        let shell = Shell {
            overlay: false,
            cursor: false,
            quit: false,
            close_command: settings.exit.platform_close_command.clone(),
            events: events_tx.clone(),
        };

        let token = settings.launch_token();
        let guard = ExitGuard::new(Duration::from_millis(settings.exit.nav_delay_ms));

        Ok(Self {
            settings,
            renderer,
            scheduler,
            stage,
            shell,
            guard,
            navigator: Navigator::new(),
            monitor: ConnectivityMonitor::new(),
            client,
            token,
            feed: None,
            session: 0,
            campaign,
            housekeeping,
            events: events_tx,
            inbox: Some(Inbox {
                events: events_rx,
                player: player_rx,
                images: images_rx,
                network: network_rx,
            }),
        })
    }

    /// Run until the window is closed through the exit overlay or Ctrl-C.
    pub async fn run(mut self) -> Result<()> {
        let mut inbox = self.inbox.take().context("App is already running")?;

        self.enter_player();

        let mut frame = interval(FRAME_INTERVAL);
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(event) = inbox.events.recv() => self.handle_event(event),
                Some(event) = inbox.player.recv() => {
                    self.scheduler.on_player_event(event, &mut self.stage);
                }
                Some(result) = inbox.images.recv() => {
                    if let Ok(loaded) = result {
                        self.stage.on_image_loaded(loaded);
                    }
                }
                Some(event) = inbox.network.recv() => {
                    if self.monitor.on_network_event(event, &mut self.navigator) {
                        self.on_navigated();
                    }
                }
                _ = frame.tick() => {
                    self.on_frame();
                    if self.shell.quit {
                        tracing::info!("Window closed");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl-C, shutting down");
                    break;
                }
            }
        }

        self.leave_player();
        Ok(())
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Timer(id) => {
                self.stage.timer_fired(id);
                self.scheduler.on_timer(id, &mut self.stage);
            }
            AppEvent::NavActivation(epoch) => self.guard.activate_nav(epoch, &self.shell),
            AppEvent::Retry(online) => self.monitor.on_retry(online),
            AppEvent::Feed { session, event } => {
                if session != self.session {
                    tracing::debug!("Dropping event from stale feed session {}", session);
                    return;
                }
                self.handle_feed(event);
            }
        }
    }

    fn handle_feed(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Connected => tracing::info!("Campaign feed connected"),
            FeedEvent::Campaign(payload) => {
                if self.housekeeping.send(payload.clone()).is_err() {
                    tracing::warn!("Campaign housekeeping task has stopped");
                }
                self.scheduler.update_campaign(&payload, &mut self.stage);
                self.campaign = Some(payload);
            }
            FeedEvent::Closed { reason } => {
                self.feed = None;
                if self.monitor.on_server_failure(&reason, &mut self.navigator) {
                    self.on_navigated();
                }
            }
        }
    }

    fn on_frame(&mut self) {
        for input in self.renderer.poll_input() {
            self.handle_input(input);
        }

        if self.stage.video.take_finished() {
            self.scheduler.on_video_ended(&mut self.stage);
        }

        if self.monitor.tick(Instant::now(), &mut self.navigator) {
            self.enter_player();
        }

        if let Err(e) = self.render() {
            tracing::warn!("Render failed: {:#}", e);
        }
    }

    fn handle_input(&mut self, input: InputEvent) {
        let mut playback = Playback {
            scheduler: &mut self.scheduler,
            stage: &mut self.stage,
        };

        match input {
            InputEvent::Back(BackSignal::HistoryPop) => {
                let signal = self.navigator.on_history_pop();
                self.guard.on_back_signal(signal, &mut playback, &mut self.shell);
            }
            InputEvent::Back(signal) => {
                self.guard.on_back_signal(signal, &mut playback, &mut self.shell);
            }
            InputEvent::Key(key) => {
                let outcome = self.guard.on_key(key, &mut playback, &mut self.shell);
                if outcome == KeyOutcome::Ignored
                    && key == RemoteKey::Enter
                    && self.navigator.current() != Page::Player
                {
                    self.retry();
                }
            }
        }
    }

    /// Check reachability now, on behalf of the Retry button.
    fn retry(&self) {
        tracing::info!("Retrying connection");
        let client = self.client.clone();
        let url = self.settings.connectivity.probe_url.clone();
        let timeout = Duration::from_secs(self.settings.connectivity.probe_timeout_secs);
        let events = self.events.clone();
        tokio::spawn(async move {
            let online = connectivity::probe(&client, &url, timeout).await;
            let _ = events.send(AppEvent::Retry(online));
        });
    }

    /// A fallback page replaced the player.
    fn on_navigated(&mut self) {
        if self.navigator.current() != Page::Player {
            self.leave_player();
        }
    }

    fn leave_player(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
        self.session += 1;
        self.scheduler.stop(&mut self.stage);
    }

    /// (Re)load the player page: open a fresh feed session and replay the
    /// last known campaign until the feed sends a new one.
    fn enter_player(&mut self) {
        self.session += 1;
        let session = self.session;

        match feed::spawn_feed(
            &self.settings.feed.url,
            self.token.as_deref(),
            Duration::from_secs(self.settings.feed.heartbeat_secs),
        ) {
            Ok(Some((mut rx, handle))) => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        if events.send(AppEvent::Feed { session, event }).is_err() {
                            return;
                        }
                    }
                });
                self.feed = Some(handle);
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Failed to start campaign feed: {:#}", e),
        }

        if let Some(campaign) = self.campaign.clone() {
            self.handle_feed(FeedEvent::Campaign(campaign));
        }
    }

    fn render(&mut self) -> Result<()> {
        let buttons = self.shell.overlay_buttons();
        let overlay = (self.shell.overlay && self.guard.visibility() == Visibility::Visible).then(|| {
            OverlayView {
                buttons: &buttons,
                focused: self.guard.nav().focus_index(),
                alpha: 255,
            }
        });

        let page = self.navigator.current();
        let takeover = (page != Page::Player || self.monitor.overlay() != OverlayState::Hidden).then(|| {
            let (title, message) = page_text(page);
            let alpha = if self.monitor.overlay() == OverlayState::Hidden {
                255
            } else {
                (self.monitor.overlay_alpha(Instant::now()) * 255.0) as u8
            };
            TakeoverView {
                title,
                message,
                notice: self.monitor.notice(),
                alpha,
            }
        });

        let scene = Scene {
            media: self.stage.media_frame(),
            layout: self.stage.layout,
            upper_ticker: self.stage.upper_ticker.as_deref(),
            bottom_ticker: self.stage.bottom_ticker.as_deref(),
            overlay,
            takeover,
            cursor: self.shell.cursor,
        };
        self.renderer.render(&scene)
    }
}

/// Persist each campaign and drop cached images it no longer uses, in
/// arrival order and off the app loop.
fn spawn_housekeeping(assets: Arc<AssetManager>) -> mpsc::UnboundedSender<CampaignPayload> {
    let (tx, mut rx) = mpsc::unbounded_channel::<CampaignPayload>();
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = assets.cache().read().await.save_campaign(&payload) {
                tracing::warn!("Failed to persist campaign: {:#}", e);
            }
            let images: Vec<String> = payload
                .playlist()
                .into_iter()
                .filter(|item| matches!(item.kind, ContentKind::Image { .. }))
                .map(|item| item.link)
                .collect();
            assets.retain_links(images.iter().map(String::as_str)).await;
        }
    });
    tx
}

/// Title and message for a fallback page. The player page keeps the wording
/// of the page it is fading back from.
fn page_text(page: Page) -> (&'static str, &'static str) {
    match page {
        Page::NoNetwork | Page::Player => (
            "No Internet Connection",
            "Please check your network connection and try again.",
        ),
        Page::ServerFailure => (
            "Server Unavailable",
            "We could not reach the campaign server. Please try again.",
        ),
    }
}
