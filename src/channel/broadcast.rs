//! Same-process broadcast bus keyed by channel id
//!
//! Every endpoint opened on one channel id receives the frames posted by all
//! other endpoints on that id, in posting order.

use anyhow::{Result, bail};
use chrono::Utc;
use log::{debug, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use super::transport::{FrameHandler, Transport};
use crate::utils::sos::SignalOfStop;

const BUS_CAPACITY: usize = 256;

static GLOBAL_BUS: Lazy<BroadcastBus> = Lazy::new(BroadcastBus::new);
static CHANNEL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// (posting endpoint, frame)
type BusFrame = (u64, Arc<str>);

struct BusChannel {
    tx: broadcast::Sender<BusFrame>,
    endpoints: usize,
}

#[derive(Clone, Default)]
pub struct BroadcastBus {
    channels: Arc<Mutex<HashMap<String, BusChannel>>>,
    next_endpoint: Arc<AtomicU64>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus shared by every session of the process
    pub fn global() -> &'static BroadcastBus {
        &GLOBAL_BUS
    }

    /// Fresh channel id, unique within the process
    pub fn generate_channel_id() -> String {
        format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            CHANNEL_COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    /// Attach a new endpoint to `channel_id`
    pub fn open(&self, channel_id: &str) -> BroadcastTransport {
        let tx = {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            let channel = channels.entry(channel_id.to_string()).or_insert_with(|| BusChannel {
                tx: broadcast::channel(BUS_CAPACITY).0,
                endpoints: 0,
            });
            channel.endpoints += 1;
            channel.tx.clone()
        };

        let endpoint = self.next_endpoint.fetch_add(1, Ordering::Relaxed);
        debug!("BroadcastBus: endpoint {} attached to {}", endpoint, channel_id);

        BroadcastTransport {
            bus: self.clone(),
            channel_id: channel_id.to_string(),
            endpoint,
            rx: Mutex::new(Some(tx.subscribe())),
            tx,
            handler: Arc::new(Mutex::new(None)),
            sos: SignalOfStop::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of channel ids with at least one open endpoint
    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, channel_id: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(channel) = channels.get_mut(channel_id) {
            channel.endpoints = channel.endpoints.saturating_sub(1);
            if channel.endpoints == 0 {
                channels.remove(channel_id);
            }
        }
    }
}

pub struct BroadcastTransport {
    bus: BroadcastBus,
    channel_id: String,
    endpoint: u64,
    tx: broadcast::Sender<BusFrame>,
    /// Taken by the reader task on the first `on_message`
    rx: Mutex<Option<broadcast::Receiver<BusFrame>>>,
    handler: Arc<Mutex<Option<FrameHandler>>>,
    sos: SignalOfStop,
    closed: AtomicBool,
}

impl BroadcastTransport {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn spawn_reader(&self, mut rx: broadcast::Receiver<BusFrame>) {
        let endpoint = self.endpoint;
        let handler = Arc::clone(&self.handler);
        let channel_id = self.channel_id.clone();

        self.sos.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok((from, _)) if from == endpoint => continue,
                    Ok((_, frame)) => {
                        let current = handler.lock().unwrap_or_else(PoisonError::into_inner).clone();
                        if let Some(deliver) = current {
                            deliver(frame.to_string());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("BroadcastTransport: {} lagged, {} frames skipped", channel_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl Transport for BroadcastTransport {
    fn post_message(&self, frame: String) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("broadcast channel {} is closed", self.channel_id);
        }

        // No receivers is not an error: the peer may not have attached yet
        let _ = self.tx.send((self.endpoint, Arc::from(frame)));
        Ok(())
    }

    fn on_message(&self, handler: FrameHandler) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);

        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(rx) = rx {
            self.spawn_reader(rx);
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.sos.cancel();
        self.handler.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.bus.release(&self.channel_id);
        debug!("BroadcastBus: endpoint {} detached from {}", self.endpoint, self.channel_id);
    }
}

impl Drop for BroadcastTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn collector() -> (FrameHandler, Arc<Mutex<Vec<String>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let handler: FrameHandler = Arc::new(move |frame| sink.lock().unwrap().push(frame));
        (handler, frames)
    }

    #[tokio::test]
    async fn test_frames_reach_other_endpoints_only() {
        let bus = BroadcastBus::new();
        let a = bus.open("session");
        let b = bus.open("session");
        let other = bus.open("elsewhere");

        let (handler_a, frames_a) = collector();
        let (handler_b, frames_b) = collector();
        let (handler_o, frames_o) = collector();
        a.on_message(handler_a);
        b.on_message(handler_b);
        other.on_message(handler_o);

        a.post_message("one".into()).unwrap();
        a.post_message("two".into()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*frames_b.lock().unwrap(), vec!["one".to_string(), "two".to_string()]);
        assert!(frames_a.lock().unwrap().is_empty());
        assert!(frames_o.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_releases_channel() {
        let bus = BroadcastBus::new();
        let a = bus.open("session");
        let b = bus.open("session");
        assert_eq!(bus.channel_count(), 1);

        a.close();
        a.close();
        assert!(a.post_message("late".into()).is_err());
        assert_eq!(bus.channel_count(), 1);

        drop(b);
        assert_eq!(bus.channel_count(), 0);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let first = BroadcastBus::generate_channel_id();
        let second = BroadcastBus::generate_channel_id();
        assert_ne!(first, second);
    }
}
