//! Data types shared by the collection, the channel and the control loops

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One subtitle interval, in milliseconds from media start
///
/// `start`/`end` include the user offset, `original_start`/`original_end`
/// are the parse-time values. `index` is the position in the originally
/// ordered sequence and survives offset changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtitle {
    pub text: String,
    pub start: i64,
    pub end: i64,
    pub original_start: i64,
    pub original_end: i64,
    #[serde(default)]
    pub track: usize,
    #[serde(default)]
    pub index: usize,
}

impl Subtitle {
    /// A subtitle with no offset applied
    pub fn new(text: impl Into<String>, start: i64, end: i64, track: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            original_start: start,
            original_end: end,
            track,
            index: 0,
        }
    }

    /// Negative `start` and `end` mark an invalid entry
    pub fn is_sentinel(&self) -> bool {
        self.start < 0 && self.end < 0
    }

    /// Whether the subtitle is on screen at `timestamp`
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// Offset currently applied to this subtitle
    pub fn offset(&self) -> i64 {
        self.start - self.original_start
    }

    /// Assign `index` from sequence position
    pub fn indexed(subtitles: Vec<Subtitle>) -> Vec<Subtitle> {
        subtitles
            .into_iter()
            .enumerate()
            .map(|(index, s)| Subtitle { index, ..s })
            .collect()
    }

    /// Rebuild a sequence with `offset` applied to the original times
    pub fn with_offset(subtitles: &[Subtitle], offset: i64) -> Vec<Subtitle> {
        subtitles
            .iter()
            .map(|s| Subtitle {
                start: s.original_start + offset,
                end: s.original_end + offset,
                ..s.clone()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub id: String,
    pub label: String,
    pub language: String,
}

/// User-entered card fields carried alongside a mined subtitle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardTextFieldValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_field_values: Option<HashMap<String, String>>,
}

/// Downstream action requested together with a mined card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PostMineAction {
    #[default]
    None,
    ShowAnkiDialog,
    UpdateLastCard,
    ExportCard,
}

impl TryFrom<u8> for PostMineAction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PostMineAction::None),
            1 => Ok(PostMineAction::ShowAnkiDialog),
            2 => Ok(PostMineAction::UpdateLastCard),
            3 => Ok(PostMineAction::ExportCard),
            other => Err(format!("unknown post-mine action {other}")),
        }
    }
}

impl From<PostMineAction> for u8 {
    fn from(value: PostMineAction) -> Self {
        match value {
            PostMineAction::None => 0,
            PostMineAction::ShowAnkiDialog => 1,
            PostMineAction::UpdateLastCard => 2,
            PostMineAction::ExportCard => 3,
        }
    }
}

/// Which subtitle boundary auto-pause stops at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AutoPausePreference {
    AtStart,
    #[default]
    AtEnd,
}

impl TryFrom<u8> for AutoPausePreference {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AutoPausePreference::AtStart),
            2 => Ok(AutoPausePreference::AtEnd),
            other => Err(format!("unknown auto-pause preference {other}")),
        }
    }
}

impl From<AutoPausePreference> for u8 {
    fn from(value: AutoPausePreference) -> Self {
        match value {
            AutoPausePreference::AtStart => 1,
            AutoPausePreference::AtEnd => 2,
        }
    }
}

/// Automatic playback behavior; exactly one is active at a time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PlayMode {
    #[default]
    Normal,
    Condensed,
    AutoPause,
    FastForward,
    Repeat,
}

impl TryFrom<u8> for PlayMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PlayMode::Normal),
            2 => Ok(PlayMode::Condensed),
            3 => Ok(PlayMode::AutoPause),
            4 => Ok(PlayMode::FastForward),
            5 => Ok(PlayMode::Repeat),
            other => Err(format!("unknown play mode {other}")),
        }
    }
}

impl From<PlayMode> for u8 {
    fn from(value: PlayMode) -> Self {
        match value {
            PlayMode::Normal => 1,
            PlayMode::Condensed => 2,
            PlayMode::AutoPause => 3,
            PlayMode::FastForward => 4,
            PlayMode::Repeat => 5,
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayMode::Normal => "normal",
            PlayMode::Condensed => "condensed",
            PlayMode::AutoPause => "autoPause",
            PlayMode::FastForward => "fastForward",
            PlayMode::Repeat => "repeat",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_offset_preserves_identity() {
        let subs = Subtitle::indexed(vec![
            Subtitle::new("a", 1000, 2000, 0),
            Subtitle::new("b", 3000, 4000, 0),
        ]);

        let shifted = Subtitle::with_offset(&subs, 500);
        assert_eq!(shifted[1].start, 3500);
        assert_eq!(shifted[1].end, 4500);
        assert_eq!(shifted[1].original_start, 3000);
        assert_eq!(shifted[1].index, 1);
        assert_eq!(shifted[1].offset(), 500);

        let back = Subtitle::with_offset(&shifted, 0);
        assert_eq!(back, subs);
    }

    #[test]
    fn test_enums_use_numeric_wire_values() {
        assert_eq!(serde_json::to_string(&PlayMode::FastForward).unwrap(), "4");
        assert_eq!(serde_json::from_str::<PostMineAction>("3").unwrap(), PostMineAction::ExportCard);
        assert!(serde_json::from_str::<PlayMode>("9").is_err());
    }

    #[test]
    fn test_subtitle_wire_shape() {
        let json = r#"{"text":"hi","start":10,"end":20,"originalStart":10,"originalEnd":20,"track":1}"#;
        let s: Subtitle = serde_json::from_str(json).unwrap();
        assert_eq!(s.track, 1);
        assert_eq!(s.index, 0);
        assert!(s.contains(10));
        assert!(!s.contains(20));
    }
}
