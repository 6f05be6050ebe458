pub mod adapter;
pub mod element;

pub use adapter::MediaAdapter;
pub use element::{ElementEvent, MediaElement, ReadyState};
