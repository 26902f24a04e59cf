// Hard navigation
// A full reload that drops every identity-keyed in-memory cache

use std::sync::Mutex;

/// Performs full-document navigations
pub trait Navigator: Send + Sync {
    fn hard_navigate(&self, route: &str);
}

/// Navigator that records requests so the host (or a test) can perform the reload
#[derive(Default)]
pub struct RecordingNavigator {
    state: Mutex<NavigationState>,
}

#[derive(Default)]
struct NavigationState {
    pending: Option<String>,
    history: Vec<String>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the last requested route, if a reload is pending
    pub fn take_pending(&self) -> Option<String> {
        self.lock().pending.take()
    }

    /// Every route requested so far, oldest first
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Most recently requested route
    pub fn last(&self) -> Option<String> {
        self.lock().history.last().cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NavigationState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Navigator for RecordingNavigator {
    fn hard_navigate(&self, route: &str) {
        tracing::info!(route = %route, "Hard navigation requested");
        let mut state = self.lock();
        // A later navigation supersedes an earlier one that has not run yet
        state.pending = Some(route.to_string());
        state.history.push(route.to_string());
    }
}
