//! The real media element, as seen by the Media side

use serde::{Deserialize, Serialize};

use crate::subtitles::model::AudioTrack;

/// Loading progress of a media element, HTML `readyState` numbering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    /// Also reported while a seek is in flight
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    /// Whether playback can proceed from the current position
    pub fn can_play(self) -> bool {
        self == ReadyState::HaveEnoughData
    }
}

impl TryFrom<u8> for ReadyState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReadyState::HaveNothing),
            1 => Ok(ReadyState::HaveMetadata),
            2 => Ok(ReadyState::HaveCurrentData),
            3 => Ok(ReadyState::HaveFutureData),
            4 => Ok(ReadyState::HaveEnoughData),
            other => Err(format!("unknown ready state {other}")),
        }
    }
}

impl From<ReadyState> for u8 {
    fn from(value: ReadyState) -> Self {
        value as u8
    }
}

/// Native notifications of the element, fed to the Media side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementEvent {
    Play,
    Pause,
    RateChange,
    Seeked,
    TimeUpdate,
    CanPlay,
    LoadedData,
    Ended,
}

/// Operations the Media side needs from a playable element
///
/// Times are milliseconds. Implementations wrap a browser element, a native
/// player or a test double.
pub trait MediaElement: Send + Sync {
    fn duration(&self) -> f64;

    fn current_time(&self) -> f64;

    /// Start a seek; completion is signalled by `ElementEvent::Seeked`
    fn set_current_time(&self, ms: f64);

    fn paused(&self) -> bool;

    fn play(&self);

    fn pause(&self);

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&self, rate: f64);

    fn ready_state(&self) -> ReadyState;

    fn audio_tracks(&self) -> Vec<AudioTrack> {
        Vec::new()
    }

    fn selected_audio_track(&self) -> Option<String> {
        None
    }

    fn select_audio_track(&self, _id: &str) {}
}
