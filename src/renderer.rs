//! SDL2-based rendering module for the player.
//!
//! Draws the media area, ticker rows, the exit overlay and fallback pages,
//! and turns raw SDL input into remote keys and back signals.

use crate::exit_guard::{BackSignal, OverlayButton, RemoteKey};
use crate::scheduler::MediaLayout;
use crate::video::VideoFrame;
use anyhow::{Context, Result};
use image::RgbaImage;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::mouse::MouseButton;
use sdl2::pixels::{Color, PixelFormatEnum};
use sdl2::rect::Rect;
use sdl2::render::{BlendMode, Canvas, Texture, TextureCreator};
use sdl2::ttf::{Font, Sdl2TtfContext};
use sdl2::video::{Window, WindowContext};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Raw key code some TV remotes report for BACK.
const REMOTE_BACK_KEYCODE: i32 = 461;

const TICKER_BG: Color = Color::RGB(20, 20, 20);
const HIGHLIGHT: Color = Color::RGB(230, 160, 30);
const TEXT: Color = Color::RGB(255, 255, 255);
const TEXT_CACHE_LIMIT: usize = 64;

/// Input translated into the player's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(RemoteKey),
    Back(BackSignal),
}

/// What to draw in the media area.
pub enum MediaFrame<'a> {
    Blank,
    /// A decoded image. `generation` changes whenever the stage takes a new one.
    Image { generation: u64, image: &'a RgbaImage },
    Video(Arc<VideoFrame>),
}

pub struct OverlayView<'a> {
    pub buttons: &'a [OverlayButton],
    pub focused: Option<usize>,
    pub alpha: u8,
}

pub struct TakeoverView<'a> {
    pub title: &'a str,
    pub message: &'a str,
    pub notice: Option<&'a str>,
    pub alpha: u8,
}

/// Everything visible in one frame.
pub struct Scene<'a> {
    pub media: MediaFrame<'a>,
    pub layout: MediaLayout,
    pub upper_ticker: Option<&'a str>,
    pub bottom_ticker: Option<&'a str>,
    pub overlay: Option<OverlayView<'a>>,
    pub takeover: Option<TakeoverView<'a>>,
    pub cursor: bool,
}

/// The main renderer struct.
pub struct Renderer {
    canvas: Canvas<Window>,
    event_pump: sdl2::EventPump,
    texture_creator: &'static TextureCreator<WindowContext>,
    font: Font<'static, 'static>,
    screen_width: u32,
    screen_height: u32,
    started: Instant,
    image_texture: Option<(u64, Texture<'static>)>,
    text_cache: HashMap<String, (Texture<'static>, u32, u32)>,
}

impl Renderer {
    /// Initialize SDL2 and create a fullscreen window.
    pub fn new(font_path: &Path, font_size: u16) -> Result<Self> {
        let sdl_context = sdl2::init().map_err(|e| anyhow::anyhow!("SDL init failed: {}", e))?;

        let video_subsystem = sdl_context
            .video()
            .map_err(|e| anyhow::anyhow!("SDL video init failed: {}", e))?;

        let display_mode = video_subsystem
            .desktop_display_mode(0)
            .map_err(|e| anyhow::anyhow!("Failed to get display mode: {}", e))?;

        let screen_width = display_mode.w as u32;
        let screen_height = display_mode.h as u32;

        tracing::info!(
            "Creating fullscreen window: {}x{}",
            screen_width,
            screen_height
        );

        let window = video_subsystem
            .window("Signage Player", screen_width, screen_height)
            .fullscreen_desktop()
            .build()
            .context("Failed to create window")?;

        let mut canvas = window
            .into_canvas()
            .accelerated()
            .present_vsync()
            .build()
            .context("Failed to create canvas")?;

        // Hide cursor for kiosk mode
        sdl_context.mouse().show_cursor(false);

        canvas.set_blend_mode(BlendMode::Blend);
        canvas.set_draw_color(Color::RGB(0, 0, 0));
        canvas.clear();
        canvas.present();

        let event_pump = sdl_context
            .event_pump()
            .map_err(|e| anyhow::anyhow!("Failed to get event pump: {}", e))?;

        // Both live for the whole process; textures and fonts borrow them.
        let ttf: &'static Sdl2TtfContext = Box::leak(Box::new(
            sdl2::ttf::init().map_err(|e| anyhow::anyhow!("SDL ttf init failed: {}", e))?,
        ));
        let font = ttf
            .load_font(font_path, font_size)
            .map_err(|e| anyhow::anyhow!("Failed to load font {:?}: {}", font_path, e))?;
        let texture_creator: &'static TextureCreator<WindowContext> =
            Box::leak(Box::new(canvas.texture_creator()));

        Ok(Self {
            canvas,
            event_pump,
            texture_creator,
            font,
            screen_width,
            screen_height,
            started: Instant::now(),
            image_texture: None,
            text_cache: HashMap::new(),
        })
    }

    /// Drain pending SDL events into player input.
    pub fn poll_input(&mut self) -> Vec<InputEvent> {
        self.event_pump.poll_iter().filter_map(map_event).collect()
    }

    /// Render one frame.
    pub fn render(&mut self, scene: &Scene) -> Result<()> {
        self.canvas.set_draw_color(Color::RGB(0, 0, 0));
        self.canvas.clear();

        let screen = (self.screen_width, self.screen_height);
        let area = media_rect(screen, scene.layout);

        match &scene.media {
            MediaFrame::Blank => {}
            MediaFrame::Image { generation, image } => self.draw_image(*generation, image, area)?,
            MediaFrame::Video(frame) => self.draw_video(frame, area)?,
        }

        let row_height = screen.1 / 10;
        if let Some(text) = scene.bottom_ticker {
            let row = Rect::new(0, (screen.1 - row_height) as i32, screen.0, row_height);
            self.draw_ticker(text, row)?;
        }
        if let Some(text) = scene.upper_ticker {
            let bottom = screen.1 * scene.layout.upper_ticker_bottom_pct as u32 / 100;
            let row = Rect::new(0, (screen.1 - bottom - row_height) as i32, screen.0, row_height);
            self.draw_ticker(text, row)?;
        }

        if let Some(takeover) = &scene.takeover {
            self.draw_takeover(takeover)?;
        }
        if let Some(overlay) = &scene.overlay {
            self.draw_overlay(overlay)?;
        }
        if scene.cursor {
            self.canvas.set_draw_color(TEXT);
            let (cx, cy) = ((screen.0 / 2) as i32, (screen.1 / 2) as i32);
            self.canvas
                .fill_rect(Rect::new(cx - 8, cy - 8, 16, 16))
                .map_err(|e| anyhow::anyhow!("Failed to draw cursor: {}", e))?;
        }

        self.canvas.present();
        Ok(())
    }

    fn draw_image(&mut self, generation: u64, image: &RgbaImage, area: Rect) -> Result<()> {
        if self.image_texture.as_ref().map(|(g, _)| *g) != Some(generation) {
            let (width, height) = image.dimensions();
            let texture = self.create_texture_from_pixels(image.as_raw(), width, height)?;
            self.image_texture = Some((generation, texture));
        }

        let (width, height) = image.dimensions();
        let (src, dst) = object_fit(width, height, area);
        if let Some((_, texture)) = &self.image_texture {
            self.canvas
                .copy(texture, src, dst)
                .map_err(|e| anyhow::anyhow!("Failed to render image: {}", e))?;
        }
        Ok(())
    }

    fn draw_video(&mut self, frame: &VideoFrame, area: Rect) -> Result<()> {
        let texture = self.create_texture_from_pixels(&frame.pixels, frame.width, frame.height)?;
        let (src, dst) = object_fit(frame.width, frame.height, area);
        self.canvas
            .copy(&texture, src, dst)
            .map_err(|e| anyhow::anyhow!("Failed to render video frame: {}", e))
    }

    /// Create a texture from raw RGBA pixels.
    fn create_texture_from_pixels(&self, pixels: &[u8], width: u32, height: u32) -> Result<Texture<'static>> {
        let mut texture = self
            .texture_creator
            .create_texture_static(PixelFormatEnum::ABGR8888, width, height)
            .context("Failed to create texture")?;
        texture
            .update(None, pixels, width as usize * 4)
            .context("Failed to update texture")?;
        texture.set_blend_mode(BlendMode::Blend);
        Ok(texture)
    }

    fn draw_ticker(&mut self, text: &str, row: Rect) -> Result<()> {
        self.canvas.set_draw_color(TICKER_BG);
        self.canvas
            .fill_rect(row)
            .map_err(|e| anyhow::anyhow!("Failed to draw ticker: {}", e))?;

        let elapsed = self.started.elapsed();
        let screen_width = self.screen_width;
        let (texture, width, height) =
            text_texture(&mut self.text_cache, &self.font, self.texture_creator, text)?;
        let x = ticker_offset(*width, screen_width, elapsed);
        let y = row.y() + (row.height() as i32 - *height as i32) / 2;
        let dst = Rect::new(x, y, *width, *height);

        self.canvas.set_clip_rect(row);
        let result = self.canvas.copy(texture, None, dst);
        self.canvas.set_clip_rect(None);
        result.map_err(|e| anyhow::anyhow!("Failed to render ticker: {}", e))
    }

    fn draw_overlay(&mut self, overlay: &OverlayView) -> Result<()> {
        self.dim(overlay.alpha)?;

        let (sw, sh) = (self.screen_width, self.screen_height);
        let panel = Rect::from_center((sw as i32 / 2, sh as i32 / 2), sw / 2, sh / 3);
        self.canvas.set_draw_color(Color::RGBA(40, 40, 40, overlay.alpha));
        self.canvas
            .fill_rect(panel)
            .map_err(|e| anyhow::anyhow!("Failed to draw overlay: {}", e))?;

        self.draw_text_centered(
            "Do you want to exit the app?",
            panel.center().x(),
            panel.y() + panel.height() as i32 / 3,
            overlay.alpha,
        )?;

        let count = overlay.buttons.len().max(1) as i32;
        let slot = panel.width() as i32 / count;
        let button_y = panel.y() + panel.height() as i32 * 2 / 3;
        for (i, button) in overlay.buttons.iter().enumerate() {
            let cx = panel.x() + slot * i as i32 + slot / 2;
            let rect = Rect::from_center((cx, button_y), (slot as u32) * 2 / 3, sh / 14);
            let fill = if overlay.focused == Some(i) {
                HIGHLIGHT
            } else {
                Color::RGB(80, 80, 80)
            };
            self.canvas.set_draw_color(Color::RGBA(fill.r, fill.g, fill.b, overlay.alpha));
            self.canvas
                .fill_rect(rect)
                .map_err(|e| anyhow::anyhow!("Failed to draw button: {}", e))?;
            self.draw_text_centered(button.label(), cx, button_y, overlay.alpha)?;
        }
        Ok(())
    }

    fn draw_takeover(&mut self, takeover: &TakeoverView) -> Result<()> {
        self.canvas.set_draw_color(Color::RGBA(0, 0, 0, takeover.alpha));
        self.canvas
            .fill_rect(None)
            .map_err(|e| anyhow::anyhow!("Failed to draw page: {}", e))?;

        let (cx, sh) = (self.screen_width as i32 / 2, self.screen_height as i32);
        self.draw_text_centered(takeover.title, cx, sh / 3, takeover.alpha)?;
        self.draw_text_centered(takeover.message, cx, sh / 2, takeover.alpha)?;

        let retry = Rect::from_center((cx, sh * 2 / 3), self.screen_width / 6, self.screen_height / 14);
        self.canvas.set_draw_color(Color::RGBA(HIGHLIGHT.r, HIGHLIGHT.g, HIGHLIGHT.b, takeover.alpha));
        self.canvas
            .fill_rect(retry)
            .map_err(|e| anyhow::anyhow!("Failed to draw retry: {}", e))?;
        self.draw_text_centered("Retry", cx, sh * 2 / 3, takeover.alpha)?;

        if let Some(notice) = takeover.notice {
            self.draw_text_centered(notice, cx, sh * 5 / 6, takeover.alpha)?;
        }
        Ok(())
    }

    fn dim(&mut self, alpha: u8) -> Result<()> {
        self.canvas.set_draw_color(Color::RGBA(0, 0, 0, alpha / 2));
        self.canvas
            .fill_rect(None)
            .map_err(|e| anyhow::anyhow!("Failed to dim screen: {}", e))
    }

    fn draw_text_centered(&mut self, text: &str, cx: i32, cy: i32, alpha: u8) -> Result<()> {
        let (texture, width, height) =
            text_texture(&mut self.text_cache, &self.font, self.texture_creator, text)?;
        let dst = Rect::from_center((cx, cy), *width, *height);
        texture.set_alpha_mod(alpha);
        let texture: &Texture = texture;
        self.canvas
            .copy(texture, None, dst)
            .map_err(|e| anyhow::anyhow!("Failed to render text: {}", e))
    }
}

/// Rendered text, cached by content.
fn text_texture<'c>(
    cache: &'c mut HashMap<String, (Texture<'static>, u32, u32)>,
    font: &Font,
    texture_creator: &'static TextureCreator<WindowContext>,
    text: &str,
) -> Result<&'c mut (Texture<'static>, u32, u32)> {
    if !cache.contains_key(text) {
        if cache.len() >= TEXT_CACHE_LIMIT {
            cache.clear();
        }
        let surface = font
            .render(text)
            .blended(TEXT)
            .map_err(|e| anyhow::anyhow!("Failed to render text: {}", e))?;
        let texture = texture_creator
            .create_texture_from_surface(&surface)
            .context("Failed to create text texture")?;
        let query = texture.query();
        cache.insert(text.to_string(), (texture, query.width, query.height));
    }
    cache.get_mut(text).context("Text texture missing from cache")
}

/// Translate one SDL event.
fn map_event(event: Event) -> Option<InputEvent> {
    match event {
        // The window manager asked us to close: route it through the guard.
        Event::Quit { .. } => Some(InputEvent::Back(BackSignal::SystemClose)),
        Event::MouseButtonDown {
            mouse_btn: MouseButton::X1,
            ..
        } => Some(InputEvent::Back(BackSignal::HistoryPop)),
        Event::KeyDown {
            keycode: Some(keycode),
            ..
        } => map_keycode(keycode),
        _ => None,
    }
}

fn map_keycode(keycode: Keycode) -> Option<InputEvent> {
    if Keycode::from_i32(REMOTE_BACK_KEYCODE) == Some(keycode) {
        return Some(InputEvent::Key(RemoteKey::Back));
    }
    let key = match keycode {
        Keycode::AcBack => return Some(InputEvent::Back(BackSignal::NativeBack)),
        Keycode::Backspace => RemoteKey::Back,
        Keycode::Escape => RemoteKey::Escape,
        Keycode::Left => RemoteKey::Left,
        Keycode::Right => RemoteKey::Right,
        Keycode::Up => RemoteKey::Up,
        Keycode::Down => RemoteKey::Down,
        Keycode::Return | Keycode::KpEnter => RemoteKey::Enter,
        _ => return None,
    };
    Some(InputEvent::Key(key))
}

/// Media area for a layout, in screen coordinates.
pub fn media_rect(screen: (u32, u32), layout: MediaLayout) -> Rect {
    let (width, height) = screen;
    let media_height = height * layout.media_height_pct as u32 / 100;
    let bottom = height * layout.media_bottom_pct as u32 / 100;
    Rect::new(0, (height - bottom - media_height) as i32, width, media_height)
}

/// Source crop and destination for a frame in `area`: portrait frames are
/// letterboxed whole, landscape frames fill the area and are cropped.
pub fn object_fit(width: u32, height: u32, area: Rect) -> (Option<Rect>, Rect) {
    if width == 0 || height == 0 {
        return (None, area);
    }
    let frame_ratio = width as f32 / height as f32;
    let area_ratio = area.width() as f32 / area.height() as f32;

    if frame_ratio < 1.0 {
        // contain
        let (fit_width, fit_height) = if frame_ratio > area_ratio {
            (area.width(), (area.width() as f32 / frame_ratio) as u32)
        } else {
            ((area.height() as f32 * frame_ratio) as u32, area.height())
        };
        let x = area.x() + ((area.width() - fit_width) / 2) as i32;
        let y = area.y() + ((area.height() - fit_height) / 2) as i32;
        (None, Rect::new(x, y, fit_width, fit_height))
    } else {
        // cover
        let (crop_width, crop_height) = if frame_ratio > area_ratio {
            ((height as f32 * area_ratio) as u32, height)
        } else {
            (width, (width as f32 / area_ratio) as u32)
        };
        let x = ((width - crop_width) / 2) as i32;
        let y = ((height - crop_height) / 2) as i32;
        (Some(Rect::new(x, y, crop_width, crop_height)), area)
    }
}

/// Horizontal position of a ticker text. Text wider than the screen scrolls
/// right-to-left with a period of max(8 s, width / 100 s).
pub fn ticker_offset(text_width: u32, screen_width: u32, elapsed: Duration) -> i32 {
    if text_width <= screen_width {
        return 0;
    }
    let period = (text_width as f32 / 100.0).max(8.0);
    let progress = (elapsed.as_secs_f32() % period) / period;
    let travel = (screen_width + text_width) as f32;
    screen_width as i32 - (progress * travel) as i32
}
