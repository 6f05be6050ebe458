//! Media synchronization engine for subtitle-mining players
//!
//! A Controller side (subtitle list, key bindings, play modes) drives a
//! media element owned by a Media side, possibly in another window or tab.
//! The two sides talk only through [`channel`] messages. Each keeps its own
//! [`Clock`] in line with the element and polls a [`SubtitleCollection`] to
//! run the active play mode.

pub mod channel;
pub mod clock;
pub mod config;
pub mod media;
pub mod playback;
pub mod subtitles;
pub mod utils;

pub use channel::{BroadcastBus, PlayerChannel, TabTransport, Transport, VideoChannel};
pub use clock::{Clock, ClockEvent};
pub use config::EngineConfig;
pub use media::{MediaAdapter, MediaElement};
pub use playback::{ControlScope, ControllerSession, MediaSession, PlaybackController, PlaybackTarget};
pub use subtitles::{PlayMode, Subtitle, SubtitleCollection};
