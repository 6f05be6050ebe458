//! Play-mode control loops and the sessions that drive them

pub mod auto_pause;
pub mod controller;
pub mod media_session;
pub mod mode;
pub mod session;
pub mod target;

pub use auto_pause::AutoPauseContext;
pub use controller::{ControlScope, PlaybackController};
pub use media_session::MediaSession;
pub use mode::{ModeTransition, PlayModeManager};
pub use session::ControllerSession;
pub use target::PlaybackTarget;
