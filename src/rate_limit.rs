//! Fixed window request counting per route path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::WindowMode;

pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    count: u32,
    deadline: Instant,
}

#[derive(Debug)]
enum State {
    PerPath(HashMap<String, Window>),
    Shared {
        counts: HashMap<String, u32>,
        deadline: Instant,
    },
}

/// Caps the requests each path receives per [`WINDOW`].
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    state: Mutex<State>,
}

impl RateLimiter {
    /// `limit == 0` disables limiting.
    pub fn new(limit: u32, mode: WindowMode) -> Self {
        let state = match mode {
            WindowMode::PerPath => State::PerPath(HashMap::new()),
            WindowMode::Shared => State::Shared {
                counts: HashMap::new(),
                deadline: Instant::now() + WINDOW,
            },
        };
        Self {
            limit,
            state: Mutex::new(state),
        }
    }

    /// Counts a request to `path` and tells whether it may proceed.
    pub fn check(&self, path: &str) -> bool {
        self.check_at(path, Instant::now())
    }

    /// [`Self::check`] with an explicit clock reading.
    pub fn check_at(&self, path: &str, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }
        // A poisoned lock only means another request panicked mid-update;
        // the counters are still usable.
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let count = match &mut *state {
            State::PerPath(windows) => {
                let window = windows.entry(path.to_owned()).or_insert(Window {
                    count: 0,
                    deadline: now + WINDOW,
                });
                if now > window.deadline {
                    window.count = 0;
                    window.deadline = now + WINDOW;
                }
                window.count = window.count.saturating_add(1);
                window.count
            }
            State::Shared { counts, deadline } => {
                let count = counts.entry(path.to_owned()).or_insert(0);
                *count = count.saturating_add(1);
                if now > *deadline {
                    // Only this path's counter is cleared, the others stay
                    // stale until their own next access.
                    *count = 1;
                    *deadline = now + WINDOW;
                }
                *count
            }
        };
        count <= self.limit
    }
}
