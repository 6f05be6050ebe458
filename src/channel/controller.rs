//! Controller side of a channel session

use log::{debug, info};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

use super::endpoint::Endpoint;
use super::health::ChannelHealth;
use super::message::{ControllerMessage, CopyRequest, MediaMessage, MinedCard, MiscSettings, Origin};
use super::state::SessionState;
use super::transport::{Role, Transport};
use crate::event_set;
use crate::media::element::ReadyState;
use crate::subtitles::model::{AudioTrack, PlayMode, Subtitle};
use crate::utils::events::Subscription;

event_set! {
    /// Notifications raised by messages from the Media side
    pub struct VideoChannelEvents {
        /// Carries whether the media is paused
        ready: bool,
        ready_state: ReadyState,
        play: Origin,
        pause: Origin,
        current_time: (f64, Origin),
        playback_rate: (f64, Origin),
        audio_track_selected: String,
        offset: i64,
        copy: MinedCard,
        play_mode: PlayMode,
        hide_subtitle_player_toggle: (),
        app_bar_toggle: (),
        toggle_subtitle_track_in_list: usize,
        load_files: (),
        exit: (),
    }
}

/// Media-side state as last reported
#[derive(Debug, Default)]
struct Mirror {
    ready: bool,
    paused: bool,
    time: f64,
    duration: f64,
    playback_rate: f64,
    audio_tracks: Vec<AudioTrack>,
    selected_audio_track: Option<String>,
}

/// Controller-side view of a media element living in another context
///
/// Mirrors the element's reported state and forwards commands. Commands are
/// fire-and-forget; only seeks can be awaited, through [`wait_can_play`].
///
/// [`wait_can_play`]: VideoChannel::wait_can_play
pub struct VideoChannel {
    endpoint: Arc<Endpoint<MediaMessage, ControllerMessage>>,
    mirror: Mutex<Mirror>,
    ready_state: watch::Sender<ReadyState>,
    events: VideoChannelEvents,
}

impl VideoChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let channel = Arc::new(Self {
            endpoint: Arc::new(Endpoint::new(Role::Controller, transport)),
            mirror: Mutex::new(Mirror {
                paused: true,
                playback_rate: 1.0,
                ..Default::default()
            }),
            ready_state: watch::Sender::new(ReadyState::HaveNothing),
            events: VideoChannelEvents::default(),
        });

        let weak = Arc::downgrade(&channel);
        channel.endpoint.listen(move |message| {
            if let Some(channel) = weak.upgrade() {
                channel.handle(message);
            }
        });

        channel
    }

    fn handle(&self, message: MediaMessage) {
        match message {
            MediaMessage::Ready {
                duration,
                paused,
                current_time,
                playback_rate,
                audio_tracks,
                selected_audio_track,
                ..
            } => {
                {
                    let mut mirror = self.mirror();
                    mirror.ready = true;
                    mirror.paused = paused;
                    mirror.duration = duration;
                    mirror.time = current_time;
                    mirror.playback_rate = playback_rate;
                    mirror.audio_tracks = audio_tracks.unwrap_or_default();
                    mirror.selected_audio_track = selected_audio_track;
                }
                self.ready_state.send_replace(ReadyState::HaveEnoughData);
                self.endpoint.transition(SessionState::Ready {
                    since: Instant::now(),
                });
                info!("VideoChannel: media ready ({} ms)", duration);
                self.events.ready.emit(&paused);
            }
            MediaMessage::ReadyState { value } => {
                self.ready_state.send_replace(value);
                self.events.ready_state.emit(&value);
            }
            MediaMessage::Play { echo } => {
                self.mirror().paused = false;
                self.events.play.emit(&echo);
            }
            MediaMessage::Pause { echo } => {
                self.mirror().paused = true;
                self.events.pause.emit(&echo);
            }
            MediaMessage::CurrentTime { value, echo } => {
                self.mirror().time = value;
                self.events.current_time.emit(&(value, echo));
            }
            MediaMessage::PlaybackRate { value, echo } => {
                self.mirror().playback_rate = value;
                self.events.playback_rate.emit(&(value, echo));
            }
            MediaMessage::AudioTrackSelected { id } => {
                self.mirror().selected_audio_track = Some(id.clone());
                self.events.audio_track_selected.emit(&id);
            }
            MediaMessage::Offset { value } => self.events.offset.emit(&value),
            MediaMessage::Copy(card) => self.events.copy.emit(&card),
            MediaMessage::PlayMode { play_mode } => self.events.play_mode.emit(&play_mode),
            MediaMessage::HideSubtitlePlayerToggle => self.events.hide_subtitle_player_toggle.emit(&()),
            MediaMessage::AppBarToggle => self.events.app_bar_toggle.emit(&()),
            MediaMessage::ToggleSubtitleTrackInList { track } => {
                self.events.toggle_subtitle_track_in_list.emit(&track)
            }
            MediaMessage::LoadFiles => self.events.load_files.emit(&()),
            MediaMessage::Exit => {
                self.events.exit.emit(&());
                self.teardown(false);
            }
        }
    }

    fn mirror(&self) -> std::sync::MutexGuard<'_, Mirror> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &VideoChannelEvents {
        &self.events
    }

    /// Register for `ready`; fires at once with the last reported paused
    /// flag if the media is already ready
    pub fn on_ready<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        let replay = {
            let mirror = self.mirror();
            mirror.ready.then_some(mirror.paused)
        };
        if let Some(paused) = replay {
            listener(&paused);
        }
        self.events.ready.subscribe(listener)
    }

    pub fn is_ready(&self) -> bool {
        self.mirror().ready
    }

    /// Whether the media was paused as of its last report
    pub fn paused(&self) -> bool {
        self.mirror().paused
    }

    /// Last known media position in ms
    pub fn current_time(&self) -> f64 {
        self.mirror().time
    }

    pub fn duration(&self) -> f64 {
        self.mirror().duration
    }

    pub fn playback_rate(&self) -> f64 {
        self.mirror().playback_rate
    }

    pub fn audio_tracks(&self) -> Vec<AudioTrack> {
        self.mirror().audio_tracks.clone()
    }

    pub fn selected_audio_track(&self) -> Option<String> {
        self.mirror().selected_audio_track.clone()
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.ready_state.borrow()
    }

    pub fn state(&self) -> SessionState {
        self.endpoint.state()
    }

    pub fn health(&self) -> &ChannelHealth {
        self.endpoint.health()
    }

    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    /// Wake up the Media side; it answers with `ready`
    pub fn init(&self) {
        self.endpoint.transition(SessionState::AwaitingReady {
            since: Instant::now(),
        });
        debug!("VideoChannel: init");
        self.endpoint.post(&ControllerMessage::Init);
    }

    /// Answer the Media side's `ready` with the playable length
    pub fn ready(&self, duration: f64, video_file_name: Option<String>) {
        self.endpoint.post(&ControllerMessage::Ready {
            duration,
            video_file_name,
        });
    }

    pub fn play(&self) {
        self.endpoint.post(&ControllerMessage::Play);
    }

    pub fn pause(&self) {
        self.endpoint.post(&ControllerMessage::Pause);
    }

    /// Seek the media; the ready state reads `HaveFutureData` until the Media
    /// side confirms with `readyState(4)`
    pub fn set_current_time(&self, ms: f64) {
        if self.is_closed() {
            return;
        }

        self.mirror().time = ms;
        self.ready_state.send_replace(ReadyState::HaveFutureData);
        self.endpoint.post(&ControllerMessage::CurrentTime { value: ms });
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.endpoint.post(&ControllerMessage::PlaybackRate { value: rate });
    }

    pub fn audio_track_selected(&self, id: &str) {
        self.endpoint.post(&ControllerMessage::AudioTrackSelected { id: id.to_string() });
    }

    pub fn offset(&self, offset: i64) {
        self.endpoint.post(&ControllerMessage::Offset { value: offset });
    }

    pub fn subtitles(&self, subtitles: &[Subtitle], names: &[String]) {
        self.endpoint.post(&ControllerMessage::Subtitles {
            value: subtitles.to_vec(),
            names: names.to_vec(),
        });
    }

    pub fn play_mode(&self, mode: PlayMode) {
        self.endpoint.post(&ControllerMessage::PlayMode { play_mode: mode });
    }

    pub fn hide_subtitle_player_toggle(&self, hidden: bool) {
        self.endpoint
            .post(&ControllerMessage::HideSubtitlePlayerToggle { value: hidden });
    }

    pub fn app_bar_toggle(&self, hidden: bool) {
        self.endpoint.post(&ControllerMessage::AppBarToggle { value: hidden });
    }

    pub fn fullscreen_toggle(&self, fullscreen: bool) {
        self.endpoint
            .post(&ControllerMessage::FullscreenToggle { value: fullscreen });
    }

    pub fn subtitle_settings(&self, settings: Value) {
        self.endpoint
            .post(&ControllerMessage::SubtitleSettings { value: settings });
    }

    pub fn misc_settings(&self, settings: MiscSettings) {
        self.endpoint.post(&ControllerMessage::MiscSettings { value: settings });
    }

    pub fn anki_settings(&self, settings: Value) {
        self.endpoint.post(&ControllerMessage::AnkiSettings { value: settings });
    }

    pub fn alert(&self, message: &str, severity: &str) {
        self.endpoint.post(&ControllerMessage::Alert {
            message: message.to_string(),
            severity: severity.to_string(),
        });
    }

    /// Ask the Media side to mine the subtitle it is showing
    pub fn copy(&self, request: CopyRequest) {
        self.endpoint.post(&ControllerMessage::Copy(request));
    }

    /// Wait until the media can play from its current position
    ///
    /// Returns `false` if the channel closed first.
    pub async fn wait_can_play(&self) -> bool {
        let mut rx = self.ready_state.subscribe();
        self.endpoint
            .stop_signal()
            .race(async move { rx.wait_for(|state| state.can_play()).await.is_ok() })
            .await
            .unwrap_or(false)
    }

    /// Send `close` and release every listener; later calls are no-ops
    pub fn close(&self) {
        self.teardown(true);
    }

    fn teardown(&self, notify_peer: bool) {
        let closed = if notify_peer {
            self.endpoint.close(Some(&ControllerMessage::Close))
        } else {
            self.endpoint.close(None)
        };

        if closed {
            self.events.clear();
        }
    }
}
