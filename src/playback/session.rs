//! Controller side of a playback session

use anyhow::{Result, bail};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

use super::controller::{ControlScope, PlaybackController};
use super::mode::ModeTransition;
use crate::channel::controller::VideoChannel;
use crate::channel::message::{CopyRequest, MiscSettings, Origin};
use crate::clock::Clock;
use crate::config::{EngineConfig, app_name, version};
use crate::media::adapter::MediaAdapter;
use crate::subtitles::model::{PlayMode, PostMineAction, Subtitle};
use crate::utils::events::Subscription;
use crate::utils::sos::SignalOfStop;

/// Drift tolerated between the local clock and an echoed media position
const RESYNC_THRESHOLD_MS: f64 = 500.0;

/// Settings pushed to the Media side on `ready` and on every change
#[derive(Debug, Clone, Default)]
struct PushedSettings {
    subtitle: Value,
    misc: MiscSettings,
    anki: Value,
}

/// Controller session: a [`VideoChannel`] wired to a [`PlaybackController`]
///
/// Media reports update the local clock and never trigger a command back, so
/// an echoed report cannot start a ping-pong between the two sides.
pub struct ControllerSession {
    channel: Arc<VideoChannel>,
    adapter: MediaAdapter,
    controller: Arc<PlaybackController>,
    config: EngineConfig,
    subtitle_file_names: Mutex<Vec<String>>,
    settings: Mutex<PushedSettings>,
    ready: watch::Sender<bool>,
    sos: SignalOfStop,
    /// Scope of the pending audio-track wait and whether to resume after it
    audio_wait: Mutex<Option<(SignalOfStop, bool)>>,
    subscriptions: Mutex<Vec<Subscription>>,
    looping: AtomicBool,
    closed: AtomicBool,
}

impl ControllerSession {
    pub fn new(channel: Arc<VideoChannel>, config: EngineConfig, scope: ControlScope) -> Arc<Self> {
        let adapter = MediaAdapter::new(Some(Arc::clone(&channel)));
        let controller = Arc::new(PlaybackController::new(
            Clock::new(),
            Arc::new(adapter.clone()),
            config.clone(),
            scope,
        ));

        let session = Arc::new(Self {
            channel,
            adapter,
            controller,
            config,
            subtitle_file_names: Mutex::new(Vec::new()),
            settings: Mutex::new(PushedSettings::default()),
            ready: watch::Sender::new(false),
            sos: SignalOfStop::new(),
            audio_wait: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            looping: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        info!("ControllerSession: {} {} opened ({:?})", app_name(), version(), scope);
        let subscriptions = Self::wire(&session);
        *session.subscriptions() = subscriptions;
        session
    }

    fn wire(session: &Arc<Self>) -> Vec<Subscription> {
        let events = session.channel.events();
        let weak = Arc::downgrade(session);
        let with = |f: fn(&Self)| {
            let weak: Weak<Self> = weak.clone();
            move || {
                if let Some(session) = weak.upgrade() {
                    f(&session);
                }
            }
        };

        let mut subscriptions = Vec::new();

        let w = weak.clone();
        subscriptions.push(session.channel.on_ready(move |paused| {
            if let Some(session) = w.upgrade() {
                session.on_media_ready(*paused);
            }
        }));

        let play = with(|s| s.controller.clock().start());
        subscriptions.push(events.play.subscribe(move |_| play()));

        let pause = with(|s| s.controller.clock().stop());
        subscriptions.push(events.pause.subscribe(move |_| pause()));

        let w = weak.clone();
        subscriptions.push(events.current_time.subscribe(move |(ms, origin)| {
            if let Some(session) = w.upgrade() {
                session.on_media_time(*ms, *origin);
            }
        }));

        let w = weak.clone();
        subscriptions.push(events.playback_rate.subscribe(move |(rate, _)| {
            if let Some(session) = w.upgrade() {
                session.controller.update_playback_rate(*rate, false);
            }
        }));

        let w = weak.clone();
        subscriptions.push(events.audio_track_selected.subscribe(move |id| {
            if let Some(session) = w.upgrade() {
                session.on_audio_track_selected(id);
            }
        }));

        let w = weak.clone();
        subscriptions.push(events.offset.subscribe(move |offset| {
            if let Some(session) = w.upgrade() {
                session.controller.apply_offset(*offset);
            }
        }));

        let w = weak.clone();
        subscriptions.push(events.play_mode.subscribe(move |mode| {
            if let Some(session) = w.upgrade() {
                session.controller.set_mode(*mode);
            }
        }));

        let w = weak.clone();
        subscriptions.push(events.toggle_subtitle_track_in_list.subscribe(move |track| {
            if let Some(session) = w.upgrade() {
                session.toggle_track(*track);
            }
        }));

        let exit = with(|s| {
            s.teardown();
        });
        subscriptions.push(events.exit.subscribe(move |_| exit()));

        subscriptions
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings(&self) -> MutexGuard<'_, PushedSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_media_ready(&self, paused: bool) {
        let clock = self.controller.clock();
        self.controller.set_duration(self.channel.duration());
        self.controller.sync_time(self.channel.current_time());
        if paused {
            clock.stop();
        } else {
            clock.start();
        }
        self.controller
            .update_playback_rate(self.channel.playback_rate(), false);

        self.channel.ready(self.controller.length(), None);
        self.push_subtitles();
        self.channel.play_mode(self.controller.mode());

        let settings = self.settings().clone();
        self.channel.subtitle_settings(settings.subtitle);
        self.channel.misc_settings(settings.misc);
        self.channel.anki_settings(settings.anki);

        self.ready.send_replace(true);
        info!("ControllerSession: media ready, track length {} ms", self.controller.length());
    }

    fn on_media_time(&self, ms: f64, origin: Origin) {
        match origin {
            Origin::Fresh => self.controller.sync_time(ms),
            Origin::Echo => {
                let drift = (ms - self.controller.time()).abs();
                if drift > RESYNC_THRESHOLD_MS {
                    debug!("ControllerSession: clock drifted {} ms, resyncing", drift);
                    self.controller.clock().set_time(ms);
                }
            }
        }
    }

    /// Hold the clock until the media can play the new track
    ///
    /// A newer selection replaces a pending wait and inherits its resume flag.
    fn on_audio_track_selected(&self, id: &str) {
        let clock = self.controller.clock().clone();
        let scope = self.sos.child();
        let resume = {
            let mut pending = self.audio_wait.lock().unwrap_or_else(PoisonError::into_inner);
            let resume = match pending.take() {
                Some((previous, resume)) if !previous.cancelled() => {
                    previous.cancel();
                    resume
                }
                _ => clock.running(),
            };
            *pending = Some((scope.clone(), resume));
            resume
        };
        clock.stop();
        debug!("ControllerSession: audio track {} selected", id);

        let adapter = self.adapter.clone();
        let done = scope.clone();
        scope.spawn(async move {
            if adapter.wait_ready().await && resume {
                clock.start();
            }
            done.cancel();
        });
    }

    pub fn channel(&self) -> &Arc<VideoChannel> {
        &self.channel
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the session is torn down, from either side
    pub async fn closed(&self) {
        self.sos.wait_cancellation().await
    }

    /// Clock position clamped to the track length
    pub fn time(&self) -> f64 {
        self.controller.time()
    }

    /// Run the ready handshake, then start the control loop
    ///
    /// Sends `init` and waits for `ready`, retrying up to the configured
    /// number of attempts. Fails when the media never answers or the session
    /// closes first.
    pub async fn connect(&self) -> Result<()> {
        let retries = self.config.ready_retries.max(1);
        let mut ready = self.ready.subscribe();

        for attempt in 1..=retries {
            if self.is_ready() {
                break;
            }
            if self.is_closed() {
                bail!("session closed during ready handshake");
            }

            info!("ControllerSession: ready handshake attempt {}/{}", attempt, retries);
            self.channel.init();

            match tokio::time::timeout(self.config.ready_timeout(), ready.wait_for(|r| *r)).await {
                Ok(Ok(_)) => break,
                Ok(Err(_)) => bail!("session dropped during ready handshake"),
                Err(_) => warn!("ControllerSession: no ready after attempt {}", attempt),
            }
        }

        if !self.is_ready() {
            bail!("media did not answer init after {} attempts", retries);
        }

        self.start_loop();
        Ok(())
    }

    fn start_loop(&self) {
        if self.looping.swap(true, Ordering::AcqRel) {
            return;
        }
        self.controller.spawn(&self.sos);
    }

    pub fn play(&self) {
        self.controller.play();
    }

    pub fn pause(&self) {
        self.controller.pause();
    }

    /// Seek the media and wait until it can play from `ms`
    pub async fn seek(&self, ms: f64) {
        self.controller.seek(ms.max(0.0)).await;
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.controller.update_playback_rate(rate, true);
    }

    /// Load subtitles and their file names
    ///
    /// Tracks may arrive concatenated; entries are ordered by start, then
    /// track, and indexed by that order.
    pub fn load_subtitles(&self, mut subtitles: Vec<Subtitle>, file_names: Vec<String>) {
        subtitles.sort_by_key(|s| (s.start, s.track));
        self.controller.set_subtitles(Subtitle::indexed(subtitles));
        *self.subtitle_file_names.lock().unwrap_or_else(PoisonError::into_inner) = file_names;
        self.push_subtitles();
    }

    /// Shift the loaded subtitles and push them to the media
    pub fn apply_offset(&self, offset: i64) -> i64 {
        let applied = self.controller.apply_offset(offset);
        self.push_subtitles();
        applied
    }

    /// Disable or re-enable a subtitle track; returns whether it is disabled
    pub fn toggle_track(&self, track: usize) -> bool {
        let disabled = self.controller.toggle_track(track);
        self.push_subtitles();
        disabled
    }

    fn push_subtitles(&self) {
        if !self.channel.is_ready() {
            return;
        }

        let enabled: Vec<Subtitle> = self
            .controller
            .subtitles()
            .into_iter()
            .filter(|s| !self.controller.is_track_disabled(s.track))
            .collect();
        let names = self
            .subtitle_file_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.channel.subtitles(&enabled, &names);
    }

    pub fn toggle_mode(&self, mode: PlayMode) -> ModeTransition {
        let transition = self.controller.toggle_mode(mode);
        self.channel.play_mode(transition.to);
        transition
    }

    pub fn update_subtitle_settings(&self, settings: Value) {
        self.settings().subtitle = settings.clone();
        self.channel.subtitle_settings(settings);
    }

    pub fn update_misc_settings(&self, settings: MiscSettings) {
        if let Some(preference) = settings.auto_pause_preference {
            self.controller.set_auto_pause_preference(preference);
        }
        if let Some(rate) = settings.fast_forward_mode_playback_rate {
            self.controller.set_fast_forward_rate(rate);
        }

        self.settings().misc = settings.clone();
        self.channel.misc_settings(settings);
    }

    pub fn update_anki_settings(&self, settings: Value) {
        self.settings().anki = settings.clone();
        self.channel.anki_settings(settings);
    }

    /// Ask the media to mine the subtitle it is showing
    pub fn mine(&self, post_mine_action: PostMineAction) {
        self.channel.copy(CopyRequest {
            post_mine_action,
            ..Default::default()
        });
    }

    /// Close the channel and stop the control loop; later calls are no-ops
    pub fn close(&self) {
        if self.teardown() {
            self.channel.close();
        }
    }

    fn teardown(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.sos.cancel();
        self.controller.clock().stop();
        let subscriptions: Vec<Subscription> = self.subscriptions().drain(..).collect();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        info!("ControllerSession: closed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::endpoint::testing::MemoryTransport;
    use serde_json::json;
    use std::time::Duration;

    fn session() -> (Arc<ControllerSession>, Arc<MemoryTransport>) {
        let transport = MemoryTransport::new();
        let session = ControllerSession::new(
            VideoChannel::new(transport.clone()),
            EngineConfig::default(),
            ControlScope::Full,
        );
        (session, transport)
    }

    fn from_media(message: Value) -> Value {
        json!({"sender": "media", "message": message})
    }

    fn ready(paused: bool) -> Value {
        from_media(json!({
            "command": "ready",
            "duration": 6000.0,
            "paused": paused,
            "currentTime": 1500.0,
            "playbackRate": 1.0
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_echoed_seek_is_not_answered() {
        let (session, transport) = session();

        let seek = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.seek(5000.0).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        transport.deliver(from_media(json!({"command": "currentTime", "value": 5000, "echo": true})));
        transport.deliver(from_media(json!({"command": "readyState", "value": 4})));
        seek.await.unwrap();

        assert_eq!(transport.commands(), vec!["currentTime"]);
        assert_eq!(session.controller().clock().time(f64::MAX), 5000.0);
    }

    #[test]
    fn test_media_reports_update_clock_only() {
        let (session, transport) = session();
        transport.deliver(ready(true));
        let sent = transport.commands().len();

        transport.deliver(from_media(json!({"command": "play", "echo": false})));
        assert!(session.controller().clock().running());
        transport.deliver(from_media(json!({"command": "pause", "echo": false})));
        assert!(!session.controller().clock().running());
        transport.deliver(from_media(json!({"command": "currentTime", "value": 3000, "echo": false})));
        assert_eq!(session.time(), 3000.0);
        transport.deliver(from_media(json!({"command": "playbackRate", "value": 1.5, "echo": false})));
        assert_eq!(session.controller().clock().rate(), 1.5);

        assert_eq!(transport.commands().len(), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_syncs_clock_and_pushes_state() {
        let (session, transport) = session();
        session.load_subtitles(vec![Subtitle::new("a", 0, 1000, 0)], vec!["show.srt".into()]);
        assert!(transport.commands().is_empty());

        transport.deliver(ready(false));

        assert!(session.is_ready());
        assert!(session.controller().clock().running());
        assert_eq!(session.time(), 1500.0);
        assert_eq!(
            transport.commands(),
            vec!["ready", "subtitles", "playMode", "subtitleSettings", "miscSettings", "ankiSettings"]
        );
    }

    #[test]
    fn test_session_on_already_ready_channel_keeps_media_paused() {
        let transport = MemoryTransport::new();
        let channel = VideoChannel::new(transport.clone());
        transport.deliver(ready(true));

        let session = ControllerSession::new(channel, EngineConfig::default(), ControlScope::Full);

        assert!(session.is_ready());
        assert!(!session.controller().clock().running());
        assert_eq!(session.time(), 1500.0);
    }

    #[test]
    fn test_concatenated_tracks_are_ordered_before_indexing() {
        let (session, transport) = session();
        session.load_subtitles(
            vec![
                Subtitle::new("a", 0, 1000, 0),
                Subtitle::new("b", 8000, 9000, 0),
                Subtitle::new("c", 0, 500, 1),
            ],
            vec!["ja.srt".into(), "en.srt".into()],
        );
        transport.deliver(ready(true));

        assert_eq!(session.controller().length(), 9000.0);
        let order: Vec<(String, usize)> = session
            .controller()
            .subtitles()
            .into_iter()
            .map(|s| (s.text, s.index))
            .collect();
        assert_eq!(
            order,
            vec![("a".to_string(), 0), ("c".to_string(), 1), ("b".to_string(), 2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_then_fails() {
        let (session, transport) = session();

        assert!(session.connect().await.is_err());
        assert_eq!(transport.commands(), vec!["init"; 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_succeeds_on_ready() {
        let (session, transport) = session();

        let connect = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.connect().await })
        };
        tokio::time::sleep(Duration::from_millis(1500)).await;
        transport.deliver(ready(true));

        assert!(connect.await.unwrap().is_ok());
        assert_eq!(transport.commands()[..2], ["init", "init"]);
        session.close();
    }

    #[test]
    fn test_close_twice_leaves_no_listeners() {
        let (session, transport) = session();
        assert!(session.channel().events().listener_count() > 0);

        session.close();
        session.close();

        assert_eq!(session.channel().events().listener_count(), 0);
        assert_eq!(transport.commands(), vec!["close"]);
        assert!(session.is_closed());
    }

    #[test]
    fn test_exit_from_media_closes_without_reply() {
        let (session, transport) = session();

        transport.deliver(from_media(json!({"command": "exit"})));

        assert!(session.is_closed());
        assert!(session.channel().is_closed());
        assert!(transport.commands().is_empty());
        session.close();
        assert!(transport.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_track_reselection_keeps_resume() {
        let (session, transport) = session();
        transport.deliver(ready(false));
        assert!(session.controller().clock().running());

        transport.deliver(from_media(json!({"command": "audioTrackSelected", "id": "a1"})));
        transport.deliver(from_media(json!({"command": "audioTrackSelected", "id": "a2"})));
        assert!(!session.controller().clock().running());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.controller().clock().running());
        assert_eq!(session.channel().selected_audio_track().as_deref(), Some("a2"));
        session.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_resolves_on_exit() {
        let (session, transport) = session();
        let closed = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.closed().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!closed.is_finished());

        transport.deliver(from_media(json!({"command": "exit"})));
        assert!(closed.await.is_ok());
    }

    #[test]
    fn test_toggle_mode_reported_to_media() {
        let (session, transport) = session();
        transport.deliver(ready(true));
        let before = transport.commands().len();

        let transition = session.toggle_mode(PlayMode::Condensed);

        assert_eq!(transition.to, PlayMode::Condensed);
        assert_eq!(transport.commands()[before..], ["playMode"]);
    }
}
