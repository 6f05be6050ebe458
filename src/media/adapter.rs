use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

use crate::channel::controller::VideoChannel;
use crate::playback::target::PlaybackTarget;

/// Drives the remote media through its channel
///
/// Without a channel every command is dropped, which lets the Controller run
/// its loop before any media is attached.
#[derive(Clone, Default)]
pub struct MediaAdapter {
    channel: Option<Arc<VideoChannel>>,
}

impl MediaAdapter {
    pub fn new(channel: Option<Arc<VideoChannel>>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> Option<&Arc<VideoChannel>> {
        self.channel.as_ref()
    }

    /// Resolve once the media can play from its current position
    ///
    /// Waits made before the media confirms a seek queue up behind that
    /// confirmation. Returns `false` if there is no media or the channel
    /// closed first.
    pub async fn wait_ready(&self) -> bool {
        match &self.channel {
            Some(channel) => channel.wait_can_play().await,
            None => false,
        }
    }
}

#[async_trait]
impl PlaybackTarget for MediaAdapter {
    async fn seek(&self, ms: f64) {
        let Some(channel) = &self.channel else {
            return;
        };

        channel.set_current_time(ms);
        if !channel.wait_can_play().await {
            debug!("MediaAdapter: seek to {} ms abandoned, channel closed", ms);
        }
    }

    fn play(&self) {
        if let Some(channel) = &self.channel {
            channel.play();
        }
    }

    fn pause(&self) {
        if let Some(channel) = &self.channel {
            channel.pause();
        }
    }

    fn set_playback_rate(&self, rate: f64) {
        if let Some(channel) = &self.channel {
            channel.set_playback_rate(rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::endpoint::testing::MemoryTransport;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_seek_resolves_after_media_confirms() {
        let transport = MemoryTransport::new();
        let adapter = MediaAdapter::new(Some(VideoChannel::new(transport.clone())));

        let seek = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.seek(5000.0).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!seek.is_finished());

        transport.deliver(json!({"sender": "media", "message": {"command": "readyState", "value": 4}}));
        seek.await.unwrap();

        assert_eq!(transport.commands(), vec!["currentTime"]);
    }

    #[tokio::test]
    async fn test_detached_adapter_is_inert() {
        let adapter = MediaAdapter::default();
        adapter.play();
        adapter.seek(100.0).await;

        assert!(!adapter.wait_ready().await);
    }
}
