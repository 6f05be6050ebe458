//! Fixed-interval play-mode control loop

use log::{debug, info};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::auto_pause::AutoPauseContext;
use super::mode::{ModeTransition, PlayModeManager};
use super::target::PlaybackTarget;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::subtitles::collection::{SubtitleCollection, SubtitleCollectionOptions};
use crate::subtitles::model::{AutoPausePreference, PlayMode, Subtitle};
use crate::subtitles::surrounding::track_length;
use crate::utils::sos::SignalOfStop;

/// Which automatic actions a loop is responsible for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlScope {
    #[default]
    Full,
    /// Media side of a split session: only pauses at boundaries
    AutoPauseOnly,
    /// Controller side of a split session: the Media side auto-pauses
    AllButAutoPause,
}

impl ControlScope {
    fn auto_pause(self) -> bool {
        self != ControlScope::AllButAutoPause
    }

    fn navigation(self) -> bool {
        self != ControlScope::AutoPauseOnly
    }
}

/// What one tick decided to do
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Pause,
    Seek(f64),
    SkipGap(f64),
    Rate(f64),
}

struct LoopState {
    modes: PlayModeManager,
    /// Loaded subtitles with the current offset applied
    subtitles: Vec<Subtitle>,
    /// Subtitles of enabled tracks, indexed for polling
    collection: Arc<SubtitleCollection>,
    disabled_tracks: HashSet<usize>,
    offset: i64,
    duration: f64,
    auto_pause: AutoPauseContext,
    auto_pause_preference: AutoPausePreference,
    fast_forward_rate: f64,
    expected_seek_latency: f64,
}

/// Polls the clock and the subtitle index, acting on the active play mode
///
/// One controller per execution context; it owns that side's [`Clock`] and
/// drives a [`PlaybackTarget`]. Ticks never hold the state lock across an
/// await, so commands from the channel can land while a seek is in flight.
pub struct PlaybackController {
    clock: Clock,
    target: Arc<dyn PlaybackTarget>,
    config: EngineConfig,
    scope: ControlScope,
    state: Mutex<LoopState>,
}

impl PlaybackController {
    pub fn new(
        clock: Clock,
        target: Arc<dyn PlaybackTarget>,
        config: EngineConfig,
        scope: ControlScope,
    ) -> Self {
        let state = LoopState {
            modes: PlayModeManager::new(),
            subtitles: Vec::new(),
            collection: SubtitleCollection::empty(),
            disabled_tracks: HashSet::new(),
            offset: 0,
            duration: 0.0,
            auto_pause: AutoPauseContext::new(),
            auto_pause_preference: config.auto_pause_preference,
            fast_forward_rate: config.fast_forward_playback_rate,
            expected_seek_latency: config.default_seek_latency_ms,
        };

        Self {
            clock,
            target,
            config,
            scope,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn scope(&self) -> ControlScope {
        self.scope
    }

    pub fn mode(&self) -> PlayMode {
        self.state().modes.mode()
    }

    pub fn subtitles(&self) -> Vec<Subtitle> {
        self.state().subtitles.clone()
    }

    pub fn offset(&self) -> i64 {
        self.state().offset
    }

    /// Duration of the previous gap-skipping seek, or the default before any
    pub fn expected_seek_latency(&self) -> f64 {
        self.state().expected_seek_latency
    }

    /// Playable length: the longer of the media and the latest subtitle end
    pub fn length(&self) -> f64 {
        let state = self.state();
        track_length(state.duration, &state.subtitles, true)
    }

    pub fn set_duration(&self, duration: f64) {
        self.state().duration = duration;
    }

    /// Current clock position, clamped to the playable length
    pub fn time(&self) -> f64 {
        self.clock.time(self.length())
    }

    /// Replace the subtitle list
    ///
    /// Times and indices are taken as given; the offset already applied is
    /// read back from the first entry.
    pub fn set_subtitles(&self, subtitles: Vec<Subtitle>) {
        let mut state = self.state();
        state.offset = subtitles.first().map(Subtitle::offset).unwrap_or(0);
        state.subtitles = subtitles;
        self.rebuild(&mut state);
    }

    /// Shift every subtitle to `offset` ms from its parse-time position
    ///
    /// The offset is clamped so no subtitle lands before the start of the
    /// track. Returns the offset actually applied.
    pub fn apply_offset(&self, offset: i64) -> i64 {
        let length = self.length() as i64;
        let offset = offset.max(-length);

        let mut state = self.state();
        state.subtitles = Subtitle::with_offset(&state.subtitles, offset);
        state.offset = offset;
        self.rebuild(&mut state);
        debug!("PlaybackController: offset {} ms", offset);
        offset
    }

    /// Flip a subtitle track in or out of boundary detection and mining
    ///
    /// Returns whether the track is now disabled.
    pub fn toggle_track(&self, track: usize) -> bool {
        let mut state = self.state();
        let disabled = if state.disabled_tracks.remove(&track) {
            false
        } else {
            state.disabled_tracks.insert(track);
            true
        };
        self.rebuild(&mut state);
        disabled
    }

    pub fn is_track_disabled(&self, track: usize) -> bool {
        self.state().disabled_tracks.contains(&track)
    }

    fn rebuild(&self, state: &mut LoopState) {
        let enabled: Vec<Subtitle> = state
            .subtitles
            .iter()
            .filter(|s| !state.disabled_tracks.contains(&s.track))
            .cloned()
            .collect();

        state.collection = Arc::new(SubtitleCollection::new(
            enabled,
            SubtitleCollectionOptions {
                return_last_shown: true,
                return_next_to_show: true,
                showing_check_radius_ms: Some(self.config.showing_check_radius_ms),
            },
        ));
        state.auto_pause.clear();
    }

    /// Subtitles of enabled tracks showing now, ordered by track
    pub fn showing(&self) -> Vec<Subtitle> {
        let now = self.time();
        let collection = Arc::clone(&self.state().collection);
        collection.subtitles_at(now.round() as i64).showing
    }

    pub fn set_auto_pause_preference(&self, preference: AutoPausePreference) {
        self.state().auto_pause_preference = preference;
    }

    pub fn set_fast_forward_rate(&self, rate: f64) {
        self.state().fast_forward_rate = rate;
    }

    /// Force a mode, e.g. one reported by the peer
    pub fn set_mode(&self, mode: PlayMode) -> ModeTransition {
        self.change_mode(|modes| modes.set(mode))
    }

    /// Toggle `mode` the way its key binding does
    pub fn toggle_mode(&self, mode: PlayMode) -> ModeTransition {
        self.change_mode(|modes| modes.toggle(mode))
    }

    fn change_mode<F>(&self, change: F) -> ModeTransition
    where
        F: FnOnce(&mut PlayModeManager) -> ModeTransition,
    {
        let transition = {
            let mut state = self.state();
            let transition = change(&mut state.modes);
            if transition.changed() {
                state.auto_pause.clear();
            }
            transition
        };

        if transition.resets_playback_rate() {
            self.update_playback_rate(1.0, true);
        }
        transition
    }

    pub fn play(&self) {
        self.clock.start();
        self.target.play();
    }

    pub fn pause(&self) {
        self.clock.stop();
        self.target.pause();
    }

    /// Seek the clock and the target together
    ///
    /// The clock is held while the target seeks so it cannot run ahead of
    /// media that is still buffering.
    pub async fn seek(&self, ms: f64) {
        let was_running = self.clock.running();
        if was_running {
            self.clock.stop();
        }

        self.clock.set_time(ms);
        self.target.seek(ms).await;
        self.state().auto_pause.clear();

        if was_running {
            self.clock.start();
        }
    }

    /// Change the rate if it differs from the clock's
    pub fn update_playback_rate(&self, rate: f64, forward: bool) {
        if self.clock.rate() == rate {
            return;
        }

        self.clock.set_rate(rate);
        if forward {
            self.target.set_playback_rate(rate);
        }
    }

    /// Adopt a position reported by the media without commanding a seek back
    pub fn sync_time(&self, ms: f64) {
        self.clock.set_time(ms);
        self.state().auto_pause.clear();
    }

    /// One poll of the control loop
    pub async fn tick(&self) {
        let length = self.length();

        if self.config.rewind_at_end
            && self.scope.navigation()
            && self.clock.running()
            && length > 0.0
            && self.clock.progress(length) >= 1.0
        {
            info!("PlaybackController: end reached, rewinding");
            self.pause();
            self.seek(0.0).await;
            return;
        }

        let now = self.clock.time(length);
        let action = self.decide(now);

        match action {
            Some(Action::Pause) => self.pause(),
            Some(Action::Seek(ms)) => {
                debug!("PlaybackController: repeating from {} ms", ms);
                self.seek(ms).await;
            }
            Some(Action::SkipGap(ms)) => {
                debug!("PlaybackController: skipping to {} ms", ms);
                let started = Instant::now();
                self.seek(ms).await;
                self.state().expected_seek_latency = started.elapsed().as_secs_f64() * 1000.0;
            }
            Some(Action::Rate(rate)) => self.update_playback_rate(rate, true),
            None => {}
        }
    }

    fn decide(&self, now: f64) -> Option<Action> {
        let mut guard = self.state();
        let state = &mut *guard;
        if state.collection.is_empty() {
            return None;
        }

        let slice = state.collection.subtitles_at(now.round() as i64);
        let mode = state.modes.mode();
        let preference = state.auto_pause_preference;

        match mode {
            PlayMode::Normal => None,
            PlayMode::Condensed if self.scope.navigation() => {
                let next = slice.next()?;
                let threshold = state.expected_seek_latency + self.config.condensed_safety_buffer_ms;
                (next.start as f64 - now >= threshold).then_some(Action::SkipGap(next.start as f64))
            }
            PlayMode::FastForward if self.scope.navigation() => {
                let idle = slice.showing.is_empty()
                    && slice
                        .next()
                        .is_none_or(|next| next.start as f64 - now > self.config.fast_forward_gap_ms);
                let rate = if idle { state.fast_forward_rate } else { 1.0 };
                (self.clock.rate() != rate).then_some(Action::Rate(rate))
            }
            PlayMode::AutoPause if self.scope.auto_pause() => {
                let boundary = match preference {
                    AutoPausePreference::AtStart => slice
                        .started_showing
                        .filter(|s| state.auto_pause.started_showing(s)),
                    AutoPausePreference::AtEnd => slice
                        .will_stop_showing
                        .filter(|s| state.auto_pause.will_stop_showing(s)),
                };
                boundary.map(|_| Action::Pause)
            }
            PlayMode::Repeat if self.scope.navigation() => slice
                .will_stop_showing
                .filter(|s| state.auto_pause.will_stop_showing(s))
                .map(|s| Action::Seek(s.start as f64)),
            _ => None,
        }
    }

    /// Poll every configured interval until `sos` is cancelled
    pub async fn run(self: Arc<Self>, sos: SignalOfStop) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if sos.race(interval.tick()).await.is_none() {
                break;
            }
            if sos.race(self.tick()).await.is_none() {
                break;
            }
        }

        debug!("PlaybackController: loop stopped");
    }

    pub fn spawn(self: &Arc<Self>, sos: &SignalOfStop) -> JoinHandle<()> {
        sos.spawn(Arc::clone(self).run(sos.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::target::testing::{RecordingTarget, TargetCall};
    use std::time::Duration;
    use tokio::time::advance;

    fn controller(target: &Arc<RecordingTarget>, config: EngineConfig) -> PlaybackController {
        let target: Arc<dyn PlaybackTarget> = target.clone();
        PlaybackController::new(Clock::new(), target, config, ControlScope::Full)
    }

    async fn poll(controller: &PlaybackController, ticks: usize) {
        for _ in 0..ticks {
            controller.tick().await;
            advance(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_condensed_skips_gap_once() {
        let target = RecordingTarget::new();
        let controller = controller(
            &target,
            EngineConfig {
                rewind_at_end: false,
                ..Default::default()
            },
        );
        controller.set_subtitles(vec![
            Subtitle::new("a", 0, 1000, 0),
            Subtitle::new("b", 5000, 6000, 0),
        ]);
        controller.set_duration(6000.0);
        controller.set_mode(PlayMode::Condensed);
        controller.clock().set_time(1000.0);
        controller.play();

        poll(&controller, 40).await;

        assert_eq!(target.seeks(), vec![5000.0]);
        assert!(controller.clock().running());
        assert!(controller.time() >= 5000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_condensed_waits_for_seek_latency_margin() {
        let target = RecordingTarget::new();
        let controller = controller(&target, EngineConfig::default());
        controller.set_subtitles(vec![
            Subtitle::new("a", 0, 1000, 0),
            Subtitle::new("b", 2200, 3000, 0),
        ]);
        controller.set_mode(PlayMode::Condensed);
        controller.clock().set_time(1000.0);

        // 1200 ms gap against 1000 ms latency + 500 ms buffer
        controller.tick().await;
        assert!(target.seeks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_pause_at_end_pauses_once() {
        let target = RecordingTarget::new();
        let controller = controller(&target, EngineConfig::default());
        controller.set_subtitles(vec![Subtitle::new("a", 0, 2000, 0)]);
        controller.set_duration(10_000.0);
        controller.set_mode(PlayMode::AutoPause);
        controller.clock().start();

        poll(&controller, 60).await;

        assert_eq!(target.count(&TargetCall::Pause), 1);
        assert_eq!(target.count(&TargetCall::Play), 0);
        assert!(!controller.clock().running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_pause_left_to_media_side() {
        let target = RecordingTarget::new();
        let target_dyn: Arc<dyn PlaybackTarget> = target.clone();
        let controller = PlaybackController::new(
            Clock::new(),
            target_dyn,
            EngineConfig::default(),
            ControlScope::AllButAutoPause,
        );
        controller.set_subtitles(vec![Subtitle::new("a", 0, 2000, 0)]);
        controller.set_duration(10_000.0);
        controller.set_mode(PlayMode::AutoPause);
        controller.clock().start();

        poll(&controller, 60).await;

        assert!(target.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_forward_between_subtitles() {
        let target = RecordingTarget::new();
        let controller = controller(&target, EngineConfig::default());
        controller.set_subtitles(vec![
            Subtitle::new("a", 0, 1000, 0),
            Subtitle::new("b", 5000, 6000, 0),
        ]);
        controller.set_mode(PlayMode::FastForward);
        controller.clock().set_time(1000.0);

        controller.tick().await;
        assert_eq!(controller.clock().rate(), 2.7);

        controller.clock().set_time(4500.0);
        controller.tick().await;
        assert_eq!(controller.clock().rate(), 1.0);

        controller.clock().set_time(2000.0);
        controller.tick().await;
        controller.set_mode(PlayMode::Normal);

        assert_eq!(
            target.calls(),
            vec![
                TargetCall::Rate(2.7),
                TargetCall::Rate(1.0),
                TargetCall::Rate(2.7),
                TargetCall::Rate(1.0)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_loops_current_line() {
        let target = RecordingTarget::new();
        let controller = controller(&target, EngineConfig::default());
        controller.set_subtitles(vec![Subtitle::new("a", 1000, 2000, 0)]);
        controller.set_duration(5000.0);
        controller.set_mode(PlayMode::Repeat);
        controller.clock().set_time(1950.0);
        controller.clock().start();

        controller.tick().await;

        assert_eq!(target.seeks(), vec![1000.0]);
        assert_eq!(controller.time(), 1000.0);
        assert!(controller.clock().running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewinds_at_end() {
        let target = RecordingTarget::new();
        let controller = controller(&target, EngineConfig::default());
        controller.set_duration(3000.0);
        controller.clock().set_time(2950.0);
        controller.clock().start();

        advance(Duration::from_millis(100)).await;
        controller.tick().await;

        assert_eq!(target.calls(), vec![TargetCall::Pause, TargetCall::Seek(0.0)]);
        assert_eq!(controller.time(), 0.0);
        assert!(!controller.clock().running());
    }

    #[test]
    fn test_offset_clamped_to_track_length() {
        let target = RecordingTarget::new();
        let controller = controller(&target, EngineConfig::default());
        controller.set_subtitles(vec![Subtitle::new("a", 1000, 2000, 0)]);
        controller.set_duration(3000.0);

        assert_eq!(controller.apply_offset(500), 500);
        assert_eq!(controller.subtitles()[0].start, 1500);
        assert_eq!(controller.apply_offset(-10_000), -3000);
        assert_eq!(controller.offset(), -3000);
    }

    #[test]
    fn test_disabled_track_hidden_from_showing() {
        let target = RecordingTarget::new();
        let controller = controller(&target, EngineConfig::default());
        controller.set_subtitles(vec![
            Subtitle::new("a", 0, 1000, 0),
            Subtitle::new("b", 0, 1000, 1),
        ]);

        assert_eq!(controller.showing().len(), 2);
        assert!(controller.toggle_track(0));
        assert_eq!(controller.showing()[0].track, 1);
        assert!(!controller.toggle_track(0));
        assert_eq!(controller.showing().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_on_cancel() {
        let target = RecordingTarget::new();
        let controller = Arc::new(controller(&target, EngineConfig::default()));
        let sos = SignalOfStop::new();

        let handle = controller.spawn(&sos);
        tokio::time::sleep(Duration::from_millis(250)).await;
        sos.cancel();

        handle.await.unwrap();
    }
}
