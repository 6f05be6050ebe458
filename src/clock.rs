//! Logical playback clock

use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;

use crate::utils::events::{EventEmitter, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Start,
    Stop,
    SetTime,
}

#[derive(Debug)]
struct ClockState {
    /// Milliseconds elapsed before `started_at`
    accumulated: f64,
    /// Wall-time anchor, present while running
    started_at: Option<Instant>,
    rate: f64,
}

impl ClockState {
    fn elapsed(&self) -> f64 {
        match self.started_at {
            Some(anchor) => self.accumulated + anchor.elapsed().as_secs_f64() * 1000.0 * self.rate,
            None => self.accumulated,
        }
    }
}

/// Playback position proxy
///
/// Provides a smooth, locally computed playback position that the UI and the
/// control loops can poll at any granularity. The clock is kept in line with
/// the real media element by `set_time` calls driven from channel reports.
///
/// # Design
///
/// While running, elapsed time is `accumulated + wall_elapsed * rate`. A rate
/// change first folds the current elapsed time into `accumulated`, so it never
/// rewrites time that has already passed.
///
/// # Thread Safety
///
/// Clones share one state behind a mutex. Notifications fire after the lock
/// is released, so listeners may call back into the clock.
#[derive(Clone)]
pub struct Clock {
    state: Arc<Mutex<ClockState>>,
    events: EventEmitter<ClockEvent>,
}

impl Clock {
    /// Create a stopped clock at 0 with rate 1
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                accumulated: 0.0,
                started_at: None,
                rate: 1.0,
            })),
            events: EventEmitter::new(),
        }
    }

    pub fn running(&self) -> bool {
        self.lock().started_at.is_some()
    }

    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    /// Change the rate, committing time elapsed under the previous rate
    pub fn set_rate(&self, rate: f64) {
        let mut state = self.lock();
        if state.started_at.is_some() {
            state.accumulated = state.elapsed();
            state.started_at = Some(Instant::now());
        }
        state.rate = rate;
    }

    /// Elapsed milliseconds, capped at `max`
    pub fn time(&self, max: f64) -> f64 {
        self.lock().elapsed().min(max)
    }

    /// Fraction of `max` elapsed; 0 when `max` is 0
    pub fn progress(&self, max: f64) -> f64 {
        if max == 0.0 {
            return 0.0;
        }

        self.time(max) / max
    }

    /// Start running from the current position
    ///
    /// Calling it again re-anchors wall time without losing elapsed time.
    pub fn start(&self) {
        {
            let mut state = self.lock();
            state.accumulated = state.elapsed();
            state.started_at = Some(Instant::now());
        }
        self.events.emit(&ClockEvent::Start);
    }

    /// Stop running; notifies even if already stopped
    pub fn stop(&self) {
        {
            let mut state = self.lock();
            state.accumulated = state.elapsed();
            state.started_at = None;
        }
        self.events.emit(&ClockEvent::Stop);
    }

    /// Jump to `ms`, continuing from there if running
    pub fn set_time(&self, ms: f64) {
        {
            let mut state = self.lock();
            state.accumulated = ms;
            if state.started_at.is_some() {
                state.started_at = Some(Instant::now());
            }
        }
        self.events.emit(&ClockEvent::SetTime);
    }

    pub fn on_event<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ClockEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Clock")
            .field("elapsed", &state.elapsed())
            .field("running", &state.started_at.is_some())
            .field("rate", &state.rate)
            .finish()
    }
}
