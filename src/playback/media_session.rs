//! Media side of a playback session

use async_trait::async_trait;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::controller::{ControlScope, PlaybackController};
use super::target::PlaybackTarget;
use crate::channel::media::{MediaReadyInfo, PlayerChannel};
use crate::channel::message::{CopyRequest, MinedCard, MiscSettings, Origin};
use crate::clock::Clock;
use crate::config::{EngineConfig, app_name, version};
use crate::media::element::{ElementEvent, MediaElement};
use crate::subtitles::model::Subtitle;
use crate::subtitles::surrounding::{mock_surrounding_subtitles, surrounding_subtitles};
use crate::utils::events::Subscription;
use crate::utils::sos::SignalOfStop;

/// Length of the placeholder interval mined when no subtitles are loaded
const MOCK_SUBTITLE_MS: i64 = 5000;

/// Drift tolerated between the element and the local clock
const RESYNC_THRESHOLD_MS: f64 = 500.0;

/// The local element seen by the auto-pause loop
struct ElementTarget {
    element: Arc<dyn MediaElement>,
}

#[async_trait]
impl PlaybackTarget for ElementTarget {
    async fn seek(&self, ms: f64) {
        self.element.set_current_time(ms);
    }

    fn play(&self) {
        self.element.play();
    }

    fn pause(&self) {
        self.element.pause();
    }

    fn set_playback_rate(&self, rate: f64) {
        self.element.set_playback_rate(rate);
    }
}

/// Element changes requested by the Controller and not yet observed
///
/// The element event that completes a pending command is reported as an
/// echo; any other element event originated here.
#[derive(Debug, Default)]
struct PendingCommands {
    play: u32,
    pause: u32,
    seek: u32,
    rate: u32,
}

impl PendingCommands {
    fn settle(count: &mut u32) -> Origin {
        if *count > 0 {
            *count -= 1;
            Origin::Echo
        } else {
            Origin::Fresh
        }
    }
}

#[derive(Debug, Default)]
struct MediaState {
    pending: PendingCommands,
    subtitle_file_name: String,
    video_file_name: Option<String>,
    misc: MiscSettings,
}

/// Media session: a [`PlayerChannel`] wired to the element it owns
///
/// Applies Controller commands to the element and reports element changes
/// back, tagged with their origin. A local loop handles auto-pause so pauses
/// land on the subtitle boundary without a channel round trip.
pub struct MediaSession {
    channel: Arc<PlayerChannel>,
    element: Arc<dyn MediaElement>,
    controller: Arc<PlaybackController>,
    config: EngineConfig,
    state: Mutex<MediaState>,
    sos: SignalOfStop,
    subscriptions: Mutex<Vec<Subscription>>,
    looping: AtomicBool,
    closed: AtomicBool,
}

impl MediaSession {
    pub fn new(channel: Arc<PlayerChannel>, element: Arc<dyn MediaElement>, config: EngineConfig) -> Arc<Self> {
        let target = ElementTarget {
            element: Arc::clone(&element),
        };
        let controller = Arc::new(PlaybackController::new(
            Clock::new(),
            Arc::new(target),
            config.clone(),
            ControlScope::AutoPauseOnly,
        ));

        let session = Arc::new(Self {
            channel,
            element,
            controller,
            config,
            state: Mutex::new(MediaState::default()),
            sos: SignalOfStop::new(),
            subscriptions: Mutex::new(Vec::new()),
            looping: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        info!("MediaSession: {} {} opened", app_name(), version());
        let subscriptions = Self::wire(&session);
        *session.subscriptions() = subscriptions;
        session
    }

    fn wire(session: &Arc<Self>) -> Vec<Subscription> {
        let events = session.channel.events();
        let weak = Arc::downgrade(session);
        let mut subscriptions = Vec::new();

        macro_rules! on {
            ($event:ident, |$session:ident, $value:pat_param| $body:expr) => {{
                let weak = weak.clone();
                subscriptions.push(events.$event.subscribe(move |$value| {
                    if let Some($session) = weak.upgrade() {
                        $body;
                    }
                }));
            }};
        }

        on!(init, |s, _| s.announce());
        on!(ready, |s, (duration, _)| s.controller.set_duration(*duration));
        on!(play, |s, _| s.apply_play());
        on!(pause, |s, _| s.apply_pause());
        on!(current_time, |s, ms| s.apply_seek(*ms));
        on!(playback_rate, |s, rate| s.apply_playback_rate(*rate));
        on!(audio_track_selected, |s, id| s.apply_audio_track(id));
        on!(offset, |s, offset| s.controller.apply_offset(*offset));
        on!(subtitles, |s, (subtitles, name)| s.load_subtitles(subtitles, name));
        on!(play_mode, |s, mode| s.controller.set_mode(*mode));
        on!(misc_settings, |s, settings| s.apply_misc_settings(settings));
        on!(copy, |s, request| s.copy(request));
        on!(close, |s, _| s.teardown());

        subscriptions
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, MediaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn channel(&self) -> &Arc<PlayerChannel> {
        &self.channel
    }

    pub fn controller(&self) -> &Arc<PlaybackController> {
        &self.controller
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Misc settings last pushed by the Controller
    pub fn misc_settings(&self) -> MiscSettings {
        self.state().misc.clone()
    }

    pub fn set_video_file_name(&self, name: Option<String>) {
        self.state().video_file_name = name;
    }

    /// Announce the element and start the local auto-pause loop
    pub fn start(&self) {
        self.announce();
        if !self.looping.swap(true, Ordering::AcqRel) {
            self.controller.spawn(&self.sos);
        }
    }

    /// Send `ready` describing the element as it is now
    pub fn announce(&self) {
        let element = &self.element;
        let paused = element.paused();
        let current_time = element.current_time();

        self.controller.set_duration(element.duration());
        let clock = self.controller.clock();
        clock.set_time(current_time);
        if paused {
            clock.stop();
        } else {
            clock.start();
        }
        self.controller.update_playback_rate(element.playback_rate(), false);

        let video_file_name = self.state().video_file_name.clone();
        self.channel.ready(MediaReadyInfo {
            duration: element.duration(),
            paused,
            current_time,
            playback_rate: element.playback_rate(),
            audio_tracks: element.audio_tracks(),
            selected_audio_track: element.selected_audio_track(),
            video_file_name,
        });
    }

    fn apply_play(&self) {
        if !self.element.paused() {
            return;
        }
        self.state().pending.play += 1;
        self.element.play();
    }

    fn apply_pause(&self) {
        if self.element.paused() {
            return;
        }
        self.state().pending.pause += 1;
        self.element.pause();
    }

    fn apply_seek(&self, ms: f64) {
        self.state().pending.seek += 1;
        self.controller.sync_time(ms);
        self.element.set_current_time(ms);
    }

    fn apply_playback_rate(&self, rate: f64) {
        if self.element.playback_rate() == rate {
            return;
        }
        self.state().pending.rate += 1;
        self.element.set_playback_rate(rate);
    }

    fn apply_audio_track(&self, id: &str) {
        debug!("MediaSession: selecting audio track {}", id);
        self.element.select_audio_track(id);
        self.channel.audio_track_selected(id);
    }

    fn apply_misc_settings(&self, settings: &MiscSettings) {
        if let Some(preference) = settings.auto_pause_preference {
            self.controller.set_auto_pause_preference(preference);
        }
        if let Some(rate) = settings.fast_forward_mode_playback_rate {
            self.controller.set_fast_forward_rate(rate);
        }
        self.state().misc = settings.clone();
    }

    fn load_subtitles(&self, subtitles: &[Subtitle], name: &str) {
        self.controller.set_subtitles(subtitles.to_vec());
        self.state().subtitle_file_name = name.to_string();
        info!("MediaSession: {} subtitles loaded from {}", subtitles.len(), name);
    }

    /// Report a native element notification to the Controller
    pub fn handle_element_event(&self, event: ElementEvent) {
        if self.is_closed() {
            return;
        }

        let element = &self.element;
        match event {
            ElementEvent::Play => {
                self.controller.clock().start();
                let origin = PendingCommands::settle(&mut self.state().pending.play);
                self.channel.play(origin);
            }
            ElementEvent::Pause => {
                self.controller.clock().stop();
                let origin = PendingCommands::settle(&mut self.state().pending.pause);
                self.channel.pause(origin);
            }
            ElementEvent::Seeked => {
                let time = element.current_time();
                self.controller.sync_time(time);
                let origin = PendingCommands::settle(&mut self.state().pending.seek);
                self.channel.current_time(time, origin);
                self.channel.ready_state(element.ready_state());
            }
            ElementEvent::RateChange => {
                let rate = element.playback_rate();
                self.controller.update_playback_rate(rate, false);
                let origin = PendingCommands::settle(&mut self.state().pending.rate);
                self.channel.playback_rate(rate, origin);
            }
            ElementEvent::CanPlay => self.channel.ready_state(element.ready_state()),
            ElementEvent::LoadedData => self.announce(),
            ElementEvent::TimeUpdate => {
                let time = element.current_time();
                let drift = (time - self.controller.clock().time(f64::MAX)).abs();
                if drift > RESYNC_THRESHOLD_MS {
                    self.controller.clock().set_time(time);
                }
            }
            ElementEvent::Ended => self.controller.clock().stop(),
        }
    }

    /// Mine the subtitle showing now and send the card to the Controller
    ///
    /// With no subtitles loaded a placeholder interval at the current position
    /// is mined instead. Returns `None` when subtitles are loaded but none of
    /// an enabled track is showing.
    pub fn mine(&self, request: &CopyRequest) -> Option<MinedCard> {
        let length = self.controller.length();
        let timestamp = self.controller.time();
        let subtitles = self.controller.subtitles();

        let (subtitle, surrounding) = match &request.subtitle {
            Some(subtitle) => {
                let surrounding = request
                    .surrounding_subtitles
                    .clone()
                    .unwrap_or_else(|| self.context(&subtitles, subtitle));
                (subtitle.clone(), surrounding)
            }
            None if subtitles.is_empty() => {
                let start = timestamp as i64;
                let end = (start + MOCK_SUBTITLE_MS).min(length as i64);
                let subtitle = Subtitle::new("", start, end, 0);
                let surrounding = mock_surrounding_subtitles(&subtitle, length as i64, MOCK_SUBTITLE_MS);
                (subtitle, surrounding)
            }
            None => {
                let subtitle = self.controller.showing().into_iter().next()?;
                let surrounding = self.context(&subtitles, &subtitle);
                (subtitle, surrounding)
            }
        };

        let card = MinedCard {
            subtitle,
            surrounding_subtitles: surrounding,
            fields: request.fields.clone(),
            post_mine_action: request.post_mine_action,
            media_timestamp: Some(timestamp),
            id: None,
            subtitle_file_name: Some(self.state().subtitle_file_name.clone()),
        };
        self.channel.copy(card.clone());
        Some(card)
    }

    fn copy(&self, request: &CopyRequest) {
        if self.mine(request).is_none() {
            debug!("MediaSession: nothing showing to mine");
        }
    }

    fn context(&self, subtitles: &[Subtitle], subtitle: &Subtitle) -> Vec<Subtitle> {
        let Some(position) = subtitles.iter().position(|s| s.index == subtitle.index) else {
            return vec![subtitle.clone()];
        };

        surrounding_subtitles(
            subtitles,
            position,
            self.config.surrounding_subtitles_count_radius,
            self.config.surrounding_subtitles_time_radius_ms,
        )
    }

    /// Ask the Controller to toggle a subtitle track in its list
    pub fn toggle_subtitle_track(&self, track: usize) {
        self.controller.toggle_track(track);
        self.channel.toggle_subtitle_track_in_list(track);
    }

    /// Send `exit` and stop the local loop; later calls are no-ops
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
        info!("MediaSession: closed");
        true
    }
}
