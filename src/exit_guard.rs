//! Exit confirmation guard.
//!
//! Every way of leaving the player (history back, platform back, the raw
//! back key, a system close request) is adapted into one [`BackSignal`] and
//! routed through a confirmable overlay.

use anyhow::Result;
use std::time::Duration;

/// A request to leave the player, whatever its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackSignal {
    /// Back navigation on the page history.
    HistoryPop,
    /// The platform's own back event.
    NativeBack,
    /// Raw back key from the remote.
    BackKey,
    /// System-level close request. Always cancelled.
    SystemClose,
}

/// Remote-control keys the player understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKey {
    Left,
    Right,
    Up,
    Down,
    Enter,
    Back,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayButton {
    Stay,
    Exit,
}

impl OverlayButton {
    pub fn label(&self) -> &'static str {
        match self {
            OverlayButton::Stay => "No",
            OverlayButton::Exit => "Yes",
        }
    }
}

/// Whether a key was consumed and its default behavior must be suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
}

/// Playback the guard pauses while the overlay is up.
pub trait PlaybackControl {
    fn pause_playback(&mut self);
    fn resume_playback(&mut self);
}

/// Presentation side of the overlay and the platform exit hooks.
pub trait ExitShell {
    fn show_overlay(&mut self);
    fn hide_overlay(&mut self);
    fn set_cursor_visible(&mut self, visible: bool);
    /// Buttons currently rendered on the overlay, in focus order.
    fn overlay_buttons(&self) -> Vec<OverlayButton>;
    /// Call back `ExitGuard::activate_nav(epoch, ..)` after `delay`.
    fn schedule_nav_activation(&mut self, epoch: u64, delay: Duration);
    /// Hand the screen back to the platform. Ok(false) when no such hook exists.
    fn platform_back(&mut self) -> Result<bool>;
    fn close_window(&mut self);
}

/// Outcome of a key handled by [`OverlayNav`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Moved,
    Activate(OverlayButton),
    Ignored,
}

/// Focus ring over the overlay buttons. Inert until activated.
#[derive(Debug, Default)]
pub struct OverlayNav {
    buttons: Vec<OverlayButton>,
    focus: Option<usize>,
}

impl OverlayNav {
    /// Capture a fresh button set and focus the first one.
    pub fn activate(&mut self, buttons: Vec<OverlayButton>) {
        self.focus = if buttons.is_empty() { None } else { Some(0) };
        self.buttons = buttons;
    }

    pub fn deactivate(&mut self) {
        self.buttons.clear();
        self.focus = None;
    }

    pub fn is_active(&self) -> bool {
        self.focus.is_some()
    }

    pub fn focus_index(&self) -> Option<usize> {
        self.focus
    }

    pub fn focused(&self) -> Option<OverlayButton> {
        self.focus.map(|i| self.buttons[i])
    }

    pub fn on_key(&mut self, key: RemoteKey) -> NavAction {
        let Some(current) = self.focus else {
            return NavAction::Ignored;
        };
        let len = self.buttons.len();

        match key {
            RemoteKey::Left | RemoteKey::Up => {
                self.focus = Some((current + len - 1) % len);
                NavAction::Moved
            }
            RemoteKey::Right | RemoteKey::Down => {
                self.focus = Some((current + 1) % len);
                NavAction::Moved
            }
            RemoteKey::Enter => NavAction::Activate(self.buttons[current]),
            _ => NavAction::Ignored,
        }
    }
}

pub struct ExitGuard {
    visibility: Visibility,
    nav: OverlayNav,
    epoch: u64,
    nav_delay: Duration,
}

impl ExitGuard {
    pub fn new(nav_delay: Duration) -> Self {
        Self {
            visibility: Visibility::Hidden,
            nav: OverlayNav::default(),
            epoch: 0,
            nav_delay,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn nav(&self) -> &OverlayNav {
        &self.nav
    }

    pub fn on_back_signal(
        &mut self,
        signal: BackSignal,
        playback: &mut impl PlaybackControl,
        shell: &mut impl ExitShell,
    ) {
        match (self.visibility, signal) {
            (Visibility::Hidden, _) => {
                tracing::info!("Back signal {:?}, asking for exit confirmation", signal);
                self.show(playback, shell);
            }
            (Visibility::Visible, BackSignal::BackKey | BackSignal::NativeBack) => {
                self.cancel(playback, shell);
            }
            (Visibility::Visible, _) => {
                tracing::debug!("Exit overlay already visible, ignoring {:?}", signal);
            }
        }
    }

    pub fn on_key(
        &mut self,
        key: RemoteKey,
        playback: &mut impl PlaybackControl,
        shell: &mut impl ExitShell,
    ) -> KeyOutcome {
        if self.visibility == Visibility::Hidden {
            if key == RemoteKey::Back {
                self.on_back_signal(BackSignal::BackKey, playback, shell);
                return KeyOutcome::Handled;
            }
            return KeyOutcome::Ignored;
        }

        if matches!(key, RemoteKey::Back | RemoteKey::Escape) {
            self.cancel(playback, shell);
            return KeyOutcome::Handled;
        }

        match self.nav.on_key(key) {
            NavAction::Moved => KeyOutcome::Handled,
            NavAction::Activate(button) => {
                self.press(button, playback, shell);
                KeyOutcome::Handled
            }
            NavAction::Ignored => KeyOutcome::Ignored,
        }
    }

    /// Activate an overlay button directly.
    pub fn press(
        &mut self,
        button: OverlayButton,
        playback: &mut impl PlaybackControl,
        shell: &mut impl ExitShell,
    ) {
        if self.visibility == Visibility::Hidden {
            return;
        }
        match button {
            OverlayButton::Stay => self.cancel(playback, shell),
            OverlayButton::Exit => self.confirm(shell),
        }
    }

    /// Delayed focus-ring activation. Ignored if the overlay was closed or
    /// reopened since it was scheduled.
    pub fn activate_nav(&mut self, epoch: u64, shell: &impl ExitShell) {
        if self.visibility == Visibility::Visible && epoch == self.epoch {
            self.nav.activate(shell.overlay_buttons());
        }
    }

    fn show(&mut self, playback: &mut impl PlaybackControl, shell: &mut impl ExitShell) {
        self.visibility = Visibility::Visible;
        self.epoch += 1;
        playback.pause_playback();
        shell.show_overlay();
        shell.set_cursor_visible(true);
        shell.schedule_nav_activation(self.epoch, self.nav_delay);
    }

    fn cancel(&mut self, playback: &mut impl PlaybackControl, shell: &mut impl ExitShell) {
        tracing::info!("Exit cancelled, resuming playback");
        self.hide(shell);
        playback.resume_playback();
    }

    fn confirm(&mut self, shell: &mut impl ExitShell) {
        tracing::info!("Exiting app");
        self.hide(shell);
        match shell.platform_back() {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("No platform close hook, closing window");
                shell.close_window();
            }
            Err(e) => {
                tracing::error!("Platform close failed: {:#}", e);
                shell.close_window();
            }
        }
    }

    fn hide(&mut self, shell: &mut impl ExitShell) {
        self.visibility = Visibility::Hidden;
        self.nav.deactivate();
        shell.hide_overlay();
        shell.set_cursor_visible(false);
    }
}
