//! Page navigation with redirect-loop and back-stack guards.

use crate::exit_guard::BackSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Player,
    NoNetwork,
    ServerFailure,
}

#[derive(Debug)]
pub struct Navigator {
    current: Page,
    history: Vec<Page>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            current: Page::Player,
            history: vec![Page::Player],
        }
    }

    pub fn current(&self) -> Page {
        self.current
    }

    /// Go to `page` unless already there. Returns whether navigation happened.
    pub fn navigate(&mut self, page: Page) -> bool {
        if self.current == page {
            tracing::debug!("Already on {:?}, not redirecting", page);
            return false;
        }
        tracing::info!("Navigating {:?} -> {:?}", self.current, page);
        self.current = page;
        self.history.retain(|p| *p != page);
        self.history.push(page);
        true
    }

    /// The shell popped a history entry. Re-push the current page so the
    /// back stack is never actually consumed, and report the attempt.
    pub fn on_history_pop(&mut self) -> BackSignal {
        self.history.pop();
        self.history.push(self.current);
        BackSignal::HistoryPop
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
