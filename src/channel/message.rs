//! Wire vocabulary shared by both channel roles
//!
//! Every message is a JSON object discriminated by its `command` field.
//! Times are milliseconds from media start.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::media::element::ReadyState;
use crate::subtitles::model::{
    AudioTrack, AutoPausePreference, CardTextFieldValues, PlayMode, PostMineAction, Subtitle,
};

/// Who caused a state change reported by the Media side
///
/// Carried on the wire as the boolean `echo` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum Origin {
    /// Reflection of a command the Controller issued
    #[default]
    Echo,
    /// Change that started on the Media side (native controls, end of media)
    Fresh,
}

impl Origin {
    pub fn is_echo(self) -> bool {
        self == Origin::Echo
    }
}

impl From<bool> for Origin {
    fn from(echo: bool) -> Self {
        if echo { Origin::Echo } else { Origin::Fresh }
    }
}

impl From<Origin> for bool {
    fn from(origin: Origin) -> Self {
        origin.is_echo()
    }
}

/// Preferences the Media side acts on locally
///
/// Unknown keys are preserved so settings written by other components pass
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiscSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_pause_preference: Option<AutoPausePreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_forward_mode_playback_rate: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Mining request sent to the Media side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    #[serde(default)]
    pub post_mine_action: PostMineAction,
    /// Mine this subtitle instead of the one showing media-side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<Subtitle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surrounding_subtitles: Option<Vec<Subtitle>>,
    #[serde(flatten)]
    pub fields: CardTextFieldValues,
}

/// A mined subtitle with its context, sent back to the Controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedCard {
    pub subtitle: Subtitle,
    pub surrounding_subtitles: Vec<Subtitle>,
    #[serde(flatten)]
    pub fields: CardTextFieldValues,
    #[serde(default)]
    pub post_mine_action: PostMineAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_file_name: Option<String>,
}

/// Controller to Media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControllerMessage {
    /// Wake-up for transports whose peer only answers when asked
    Init,
    Ready {
        duration: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_file_name: Option<String>,
    },
    Play,
    Pause,
    CurrentTime {
        value: f64,
    },
    PlaybackRate {
        value: f64,
    },
    AudioTrackSelected {
        id: String,
    },
    Offset {
        value: i64,
    },
    Subtitles {
        value: Vec<Subtitle>,
        #[serde(default)]
        names: Vec<String>,
    },
    PlayMode {
        play_mode: PlayMode,
    },
    HideSubtitlePlayerToggle {
        value: bool,
    },
    AppBarToggle {
        value: bool,
    },
    FullscreenToggle {
        value: bool,
    },
    SubtitleSettings {
        value: Value,
    },
    MiscSettings {
        value: MiscSettings,
    },
    AnkiSettings {
        value: Value,
    },
    Alert {
        message: String,
        severity: String,
    },
    Copy(CopyRequest),
    Close,
}

/// Media to Controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MediaMessage {
    Ready {
        duration: f64,
        paused: bool,
        current_time: f64,
        playback_rate: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_tracks: Option<Vec<AudioTrack>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_audio_track: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_file_name: Option<String>,
    },
    ReadyState {
        value: ReadyState,
    },
    Play {
        #[serde(default)]
        echo: Origin,
    },
    Pause {
        #[serde(default)]
        echo: Origin,
    },
    CurrentTime {
        value: f64,
        #[serde(default)]
        echo: Origin,
    },
    PlaybackRate {
        value: f64,
        #[serde(default)]
        echo: Origin,
    },
    AudioTrackSelected {
        id: String,
    },
    Offset {
        value: i64,
    },
    Copy(MinedCard),
    PlayMode {
        play_mode: PlayMode,
    },
    HideSubtitlePlayerToggle,
    AppBarToggle,
    ToggleSubtitleTrackInList {
        track: usize,
    },
    LoadFiles,
    Exit,
}

/// Value of the `command` field, for logging
pub trait Command {
    fn command(&self) -> &'static str;
}

impl Command for ControllerMessage {
    fn command(&self) -> &'static str {
        match self {
            ControllerMessage::Init => "init",
            ControllerMessage::Ready { .. } => "ready",
            ControllerMessage::Play => "play",
            ControllerMessage::Pause => "pause",
            ControllerMessage::CurrentTime { .. } => "currentTime",
            ControllerMessage::PlaybackRate { .. } => "playbackRate",
            ControllerMessage::AudioTrackSelected { .. } => "audioTrackSelected",
            ControllerMessage::Offset { .. } => "offset",
            ControllerMessage::Subtitles { .. } => "subtitles",
            ControllerMessage::PlayMode { .. } => "playMode",
            ControllerMessage::HideSubtitlePlayerToggle { .. } => "hideSubtitlePlayerToggle",
            ControllerMessage::AppBarToggle { .. } => "appBarToggle",
            ControllerMessage::FullscreenToggle { .. } => "fullscreenToggle",
            ControllerMessage::SubtitleSettings { .. } => "subtitleSettings",
            ControllerMessage::MiscSettings { .. } => "miscSettings",
            ControllerMessage::AnkiSettings { .. } => "ankiSettings",
            ControllerMessage::Alert { .. } => "alert",
            ControllerMessage::Copy(_) => "copy",
            ControllerMessage::Close => "close",
        }
    }
}

impl Command for MediaMessage {
    fn command(&self) -> &'static str {
        match self {
            MediaMessage::Ready { .. } => "ready",
            MediaMessage::ReadyState { .. } => "readyState",
            MediaMessage::Play { .. } => "play",
            MediaMessage::Pause { .. } => "pause",
            MediaMessage::CurrentTime { .. } => "currentTime",
            MediaMessage::PlaybackRate { .. } => "playbackRate",
            MediaMessage::AudioTrackSelected { .. } => "audioTrackSelected",
            MediaMessage::Offset { .. } => "offset",
            MediaMessage::Copy(_) => "copy",
            MediaMessage::PlayMode { .. } => "playMode",
            MediaMessage::HideSubtitlePlayerToggle => "hideSubtitlePlayerToggle",
            MediaMessage::AppBarToggle => "appBarToggle",
            MediaMessage::ToggleSubtitleTrackInList { .. } => "toggleSubtitleTrackInList",
            MediaMessage::LoadFiles => "loadFiles",
            MediaMessage::Exit => "exit",
        }
    }
}
