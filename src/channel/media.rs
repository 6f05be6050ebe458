//! Media side of a channel session

use log::{debug, info};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use super::endpoint::Endpoint;
use super::health::ChannelHealth;
use super::message::{ControllerMessage, CopyRequest, MediaMessage, MinedCard, MiscSettings, Origin};
use super::state::SessionState;
use super::transport::{Role, Transport};
use crate::event_set;
use crate::media::element::ReadyState;
use crate::subtitles::model::{AudioTrack, PlayMode, Subtitle};

event_set! {
    /// Notifications raised by commands from the Controller side
    pub struct PlayerChannelEvents {
        init: (),
        /// Playable length and file name
        ready: (f64, Option<String>),
        play: (),
        pause: (),
        current_time: f64,
        playback_rate: f64,
        audio_track_selected: String,
        offset: i64,
        /// Subtitles and the name of their first file
        subtitles: (Vec<Subtitle>, String),
        play_mode: PlayMode,
        hide_subtitle_player_toggle: bool,
        app_bar_toggle: bool,
        fullscreen_toggle: bool,
        subtitle_settings: Value,
        misc_settings: MiscSettings,
        anki_settings: Value,
        /// Message and severity
        alert: (String, String),
        copy: CopyRequest,
        close: (),
    }
}

/// What the Media side announces in `ready`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaReadyInfo {
    pub duration: f64,
    pub paused: bool,
    pub current_time: f64,
    pub playback_rate: f64,
    pub audio_tracks: Vec<AudioTrack>,
    pub selected_audio_track: Option<String>,
    pub video_file_name: Option<String>,
}

/// Media-side endpoint: applies Controller commands, reports element state
pub struct PlayerChannel {
    endpoint: Arc<Endpoint<ControllerMessage, MediaMessage>>,
    events: PlayerChannelEvents,
}

impl PlayerChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let channel = Arc::new(Self {
            endpoint: Arc::new(Endpoint::new(Role::Media, transport)),
            events: PlayerChannelEvents::default(),
        });

        let weak = Arc::downgrade(&channel);
        channel.endpoint.listen(move |message| {
            if let Some(channel) = weak.upgrade() {
                channel.handle(message);
            }
        });

        channel
    }

    fn handle(&self, message: ControllerMessage) {
        match message {
            ControllerMessage::Init => self.events.init.emit(&()),
            ControllerMessage::Ready {
                duration,
                video_file_name,
            } => self.events.ready.emit(&(duration, video_file_name)),
            ControllerMessage::Play => self.events.play.emit(&()),
            ControllerMessage::Pause => self.events.pause.emit(&()),
            ControllerMessage::CurrentTime { value } => self.events.current_time.emit(&value),
            ControllerMessage::PlaybackRate { value } => self.events.playback_rate.emit(&value),
            ControllerMessage::AudioTrackSelected { id } => self.events.audio_track_selected.emit(&id),
            ControllerMessage::Offset { value } => self.events.offset.emit(&value),
            ControllerMessage::Subtitles { value, names } => {
                let name = names.into_iter().next().unwrap_or_default();
                self.events.subtitles.emit(&(value, name));
            }
            ControllerMessage::PlayMode { play_mode } => self.events.play_mode.emit(&play_mode),
            ControllerMessage::HideSubtitlePlayerToggle { value } => {
                self.events.hide_subtitle_player_toggle.emit(&value)
            }
            ControllerMessage::AppBarToggle { value } => self.events.app_bar_toggle.emit(&value),
            ControllerMessage::FullscreenToggle { value } => self.events.fullscreen_toggle.emit(&value),
            ControllerMessage::SubtitleSettings { value } => self.events.subtitle_settings.emit(&value),
            ControllerMessage::MiscSettings { value } => self.events.misc_settings.emit(&value),
            ControllerMessage::AnkiSettings { value } => self.events.anki_settings.emit(&value),
            ControllerMessage::Alert { message, severity } => {
                self.events.alert.emit(&(message, severity))
            }
            ControllerMessage::Copy(request) => self.events.copy.emit(&request),
            ControllerMessage::Close => {
                self.events.close.emit(&());
                self.teardown(false);
            }
        }
    }

    pub fn events(&self) -> &PlayerChannelEvents {
        &self.events
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

    /// Announce the element; answers `init` and follows every source change
    pub fn ready(&self, info: MediaReadyInfo) {
        self.endpoint.transition(SessionState::Ready {
            since: Instant::now(),
        });
        info!("PlayerChannel: ready ({} ms)", info.duration);
        self.endpoint.post(&MediaMessage::Ready {
            duration: info.duration,
            paused: info.paused,
            current_time: info.current_time,
            playback_rate: info.playback_rate,
            audio_tracks: Some(info.audio_tracks),
            selected_audio_track: info.selected_audio_track,
            video_file_name: info.video_file_name,
        });
    }

    pub fn ready_state(&self, state: ReadyState) {
        self.endpoint.post(&MediaMessage::ReadyState { value: state });
    }

    pub fn play(&self, echo: Origin) {
        self.endpoint.post(&MediaMessage::Play { echo });
    }

    pub fn pause(&self, echo: Origin) {
        self.endpoint.post(&MediaMessage::Pause { echo });
    }

    pub fn current_time(&self, value: f64, echo: Origin) {
        self.endpoint.post(&MediaMessage::CurrentTime { value, echo });
    }

    pub fn playback_rate(&self, value: f64, echo: Origin) {
        self.endpoint.post(&MediaMessage::PlaybackRate { value, echo });
    }

    pub fn audio_track_selected(&self, id: &str) {
        self.endpoint
            .post(&MediaMessage::AudioTrackSelected { id: id.to_string() });
    }

    pub fn offset(&self, offset: i64) {
        self.endpoint.post(&MediaMessage::Offset { value: offset });
    }

    pub fn copy(&self, card: MinedCard) {
        debug!("PlayerChannel: mined subtitle {}", card.subtitle.index);
        self.endpoint.post(&MediaMessage::Copy(card));
    }

    pub fn play_mode(&self, mode: PlayMode) {
        self.endpoint.post(&MediaMessage::PlayMode { play_mode: mode });
    }

    pub fn hide_subtitle_player_toggle(&self) {
        self.endpoint.post(&MediaMessage::HideSubtitlePlayerToggle);
    }

    pub fn app_bar_toggle(&self) {
        self.endpoint.post(&MediaMessage::AppBarToggle);
    }

    pub fn toggle_subtitle_track_in_list(&self, track: usize) {
        self.endpoint
            .post(&MediaMessage::ToggleSubtitleTrackInList { track });
    }

    pub fn load_files(&self) {
        self.endpoint.post(&MediaMessage::LoadFiles);
    }

    /// Send `exit` and release every listener; later calls are no-ops
    pub fn close(&self) {
        self.teardown(true);
    }

    fn teardown(&self, notify_peer: bool) {
        let closed = if notify_peer {
            self.endpoint.close(Some(&MediaMessage::Exit))
        } else {
            self.endpoint.close(None)
        };

        if closed {
            self.events.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::endpoint::testing::MemoryTransport;
    use serde_json::json;
    use std::sync::Mutex;

    fn from_controller(message: serde_json::Value) -> serde_json::Value {
        json!({"sender": "controller", "message": message})
    }

    #[test]
    fn test_commands_reach_listeners() {
        let transport = MemoryTransport::new();
        let channel = PlayerChannel::new(transport.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        let _time = channel
            .events()
            .current_time
            .subscribe(move |t| s.lock().unwrap().push(format!("time {t}")));
        let s = Arc::clone(&seen);
        let _subs = channel
            .events()
            .subtitles
            .subscribe(move |(subs, name)| s.lock().unwrap().push(format!("{} from {name}", subs.len())));

        transport.deliver(from_controller(json!({"command": "currentTime", "value": 5000})));
        transport.deliver(from_controller(json!({
            "command": "subtitles",
            "value": [{"text": "a", "start": 0, "end": 10, "originalStart": 0, "originalEnd": 10}],
            "names": ["show.srt", "other.srt"]
        })));

        assert_eq!(*seen.lock().unwrap(), vec!["time 5000", "1 from show.srt"]);
    }

    #[test]
    fn test_reports_carry_origin() {
        let transport = MemoryTransport::new();
        let channel = PlayerChannel::new(transport.clone());

        channel.current_time(1200.0, Origin::Fresh);
        channel.pause(Origin::Echo);

        let frames = transport.posted.lock().unwrap().clone();
        let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        let second: serde_json::Value = serde_json::from_str(&frames[1]).unwrap();
        assert_eq!(first["sender"], "media");
        assert_eq!(first["message"]["echo"], false);
        assert_eq!(second["message"]["echo"], true);
    }

    #[test]
    fn test_close_twice_sends_one_exit() {
        let transport = MemoryTransport::new();
        let channel = PlayerChannel::new(transport.clone());
        let _sub = channel.events().play.subscribe(|_| {});

        channel.close();
        channel.close();

        assert_eq!(transport.commands(), vec!["exit"]);
        assert_eq!(channel.events().listener_count(), 0);
    }

    #[test]
    fn test_close_from_controller_releases_listeners() {
        let transport = MemoryTransport::new();
        let channel = PlayerChannel::new(transport.clone());
        let _sub = channel.events().close.subscribe(|_| {});

        transport.deliver(from_controller(json!({"command": "close"})));

        assert!(channel.is_closed());
        assert_eq!(channel.events().listener_count(), 0);
        assert!(transport.commands().is_empty());
    }
}
