pub mod collection;
pub mod model;
pub mod surrounding;

pub use collection::{SubtitleCollection, SubtitleCollectionOptions, SubtitleSlice};
pub use model::{AudioTrack, AutoPausePreference, CardTextFieldValues, PlayMode, PostMineAction, Subtitle};
pub use surrounding::{mock_surrounding_subtitles, surrounding_subtitles, track_length};
