//! Message-passing protocol between the Controller and the Media side

pub mod broadcast;
pub mod controller;
pub mod endpoint;
pub mod health;
pub mod media;
pub mod message;
pub mod state;
pub mod tab;
pub mod transport;

pub use broadcast::{BroadcastBus, BroadcastTransport};
pub use controller::{VideoChannel, VideoChannelEvents};
pub use health::{ChannelHealth, HealthSummary};
pub use media::{MediaReadyInfo, PlayerChannel, PlayerChannelEvents};
pub use message::{ControllerMessage, CopyRequest, MediaMessage, MinedCard, MiscSettings, Origin};
pub use state::SessionState;
pub use tab::{TabFrame, TabTransport};
pub use transport::{FrameHandler, Role, Transport};
