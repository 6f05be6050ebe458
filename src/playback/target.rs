use async_trait::async_trait;

/// Whatever a control loop drives: the remote media through its channel, or
/// a local element
#[async_trait]
pub trait PlaybackTarget: Send + Sync {
    /// Move to `ms` and resolve once playback can continue from there
    async fn seek(&self, ms: f64);

    fn play(&self);

    fn pause(&self);

    fn set_playback_rate(&self, rate: f64);
}
