//! Directed transport to one browser tab
//!
//! Frames are addressed by tab id and frame source. A router may multiplex
//! many tabs over one outbound queue; each endpoint drops frames addressed to
//! another tab or source.

use anyhow::{Result, bail};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use super::transport::{FrameHandler, Transport};
use crate::utils::sos::SignalOfStop;

/// One addressed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabFrame {
    pub tab_id: u32,
    pub src: String,
    pub payload: String,
}

pub struct TabTransport {
    tab_id: u32,
    src: String,
    outbound: mpsc::UnboundedSender<TabFrame>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<TabFrame>>>,
    handler: Arc<Mutex<Option<FrameHandler>>>,
    sos: SignalOfStop,
    closed: AtomicBool,
}

impl TabTransport {
    pub fn new(
        tab_id: u32,
        src: impl Into<String>,
        outbound: mpsc::UnboundedSender<TabFrame>,
        inbound: mpsc::UnboundedReceiver<TabFrame>,
    ) -> Self {
        Self {
            tab_id,
            src: src.into(),
            outbound,
            inbound: Mutex::new(Some(inbound)),
            handler: Arc::new(Mutex::new(None)),
            sos: SignalOfStop::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Two endpoints wired to each other for one tab
    pub fn pair(tab_id: u32, src: &str) -> (TabTransport, TabTransport) {
        let (to_media, from_controller) = mpsc::unbounded_channel();
        let (to_controller, from_media) = mpsc::unbounded_channel();

        (
            TabTransport::new(tab_id, src, to_media, from_media),
            TabTransport::new(tab_id, src, to_controller, from_controller),
        )
    }

    pub fn tab_id(&self) -> u32 {
        self.tab_id
    }

    fn spawn_reader(&self, mut inbound: mpsc::UnboundedReceiver<TabFrame>) {
        let tab_id = self.tab_id;
        let src = self.src.clone();
        let handler = Arc::clone(&self.handler);

        self.sos.spawn(async move {
            while let Some(frame) = inbound.recv().await {
                if frame.tab_id != tab_id || frame.src != src {
                    debug!("TabTransport: dropping frame for tab {} ({})", frame.tab_id, frame.src);
                    continue;
                }

                let current = handler.lock().unwrap_or_else(PoisonError::into_inner).clone();
                if let Some(deliver) = current {
                    deliver(frame.payload);
                }
            }
        });
    }
}

impl Transport for TabTransport {
    fn post_message(&self, frame: String) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("tab {} transport is closed", self.tab_id);
        }

        let frame = TabFrame {
            tab_id: self.tab_id,
            src: self.src.clone(),
            payload: frame,
        };
        if self.outbound.send(frame).is_err() {
            bail!("tab {} is gone", self.tab_id);
        }

        Ok(())
    }

    fn on_message(&self, handler: FrameHandler) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);

        let inbound = self.inbound.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(inbound) = inbound {
            self.spawn_reader(inbound);
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.sos.cancel();
        self.handler.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl Drop for TabTransport {
    fn drop(&mut self) {
        self.close();
    }
}
