//! Send, receive and teardown shared by both channel roles

use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::health::ChannelHealth;
use super::message::Command;
use super::state::SessionState;
use super::transport::{Envelope, Role, Transport};
use crate::utils::sos::SignalOfStop;

/// One side of a session
///
/// `In` is what the peer sends, `Out` is what this side sends. Frames posted
/// by an endpoint of the same role are dropped before decoding, so a
/// transport that reflects frames cannot loop a side's own commands back.
pub struct Endpoint<In, Out> {
    role: Role,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
    health: ChannelHealth,
    sos: SignalOfStop,
    closed: AtomicBool,
    _messages: PhantomData<fn(In) -> Out>,
}

impl<In, Out> Endpoint<In, Out>
where
    In: DeserializeOwned + Command + 'static,
    Out: Serialize + Command,
{
    pub fn new(role: Role, transport: Arc<dyn Transport>) -> Self {
        Self {
            role,
            transport,
            state: Mutex::new(SessionState::Idle),
            health: ChannelHealth::new(),
            sos: SignalOfStop::new(),
            closed: AtomicBool::new(false),
            _messages: PhantomData,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn health(&self) -> &ChannelHealth {
        &self.health
    }

    /// Cancelled when the endpoint closes
    pub fn stop_signal(&self) -> &SignalOfStop {
        &self.sos
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `target` if the state machine allows it
    pub fn transition(&self, target: SessionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(&target) {
            debug!("{}: ignoring transition {} -> {}", self.role, *state, target);
            return false;
        }

        *state = target;
        true
    }

    /// Post `message`; a no-op once closed
    pub fn post(&self, message: &Out) {
        if self.is_closed() {
            return;
        }

        self.send(message);
    }

    fn send(&self, message: &Out) {
        let envelope = Envelope {
            sender: self.role,
            message,
        };
        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{}: failed to encode {}: {}", self.role, message.command(), e);
                self.health.record_send_failure();
                return;
            }
        };

        match self.transport.post_message(frame) {
            Ok(()) => self.health.record_sent(),
            Err(e) => {
                warn!("{}: failed to send {}: {:#}", self.role, message.command(), e);
                self.health.record_send_failure();
            }
        }
    }

    /// Route decoded peer messages to `dispatch`
    ///
    /// Undecodable frames and unknown commands are logged and counted, never
    /// propagated.
    pub fn listen<F>(self: &Arc<Self>, dispatch: F)
    where
        In: Send,
        F: Fn(In) + Send + Sync + 'static,
        Self: Send + Sync + 'static,
    {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.transport.on_message(Arc::new(move |frame| {
            let Some(endpoint) = weak.upgrade() else {
                return;
            };
            if let Some(message) = endpoint.decode(&frame) {
                dispatch(message);
            }
        }));
    }

    fn decode(&self, frame: &str) -> Option<In> {
        if self.is_closed() {
            return None;
        }

        let envelope: Envelope<Value> = match serde_json::from_str(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("{}: dropping malformed frame: {}", self.role, e);
                self.health.record_malformed();
                return None;
            }
        };

        if envelope.sender == self.role {
            self.health.record_own_role_dropped();
            return None;
        }

        match serde_json::from_value::<In>(envelope.message) {
            Ok(message) => {
                self.health.record_received();
                Some(message)
            }
            Err(e) => {
                warn!("{}: unrecognized message: {}", self.role, e);
                self.health.record_malformed();
                None
            }
        }
    }

    /// Close once, optionally posting `farewell` first
    ///
    /// Returns `false` if the endpoint was already closed.
    pub fn close(&self, farewell: Option<&Out>) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Some(message) = farewell {
            self.send(message);
        }

        self.transition(SessionState::Closed);
        self.sos.cancel();
        self.transport.close();
        info!("{}: channel closed ({})", self.role, self.health.summary());
        true
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::channel::transport::FrameHandler;

    /// Transport recording every posted frame, with manual delivery
    #[derive(Default)]
    pub struct MemoryTransport {
        pub posted: Mutex<Vec<String>>,
        handler: Mutex<Option<FrameHandler>>,
        pub closed: AtomicBool,
    }

    impl MemoryTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Deliver `frame` as if it came from the peer
        pub fn deliver(&self, frame: Value) {
            let handler = self.handler.lock().unwrap().clone();
            if let Some(handler) = handler {
                handler(frame.to_string());
            }
        }

        /// Commands of every posted frame, in order
        pub fn commands(&self) -> Vec<String> {
            self.posted
                .lock()
                .unwrap()
                .iter()
                .map(|frame| {
                    let value: Value = serde_json::from_str(frame).unwrap();
                    value["message"]["command"].as_str().unwrap_or_default().to_string()
                })
                .collect()
        }

        pub fn has_handler(&self) -> bool {
            self.handler.lock().unwrap().is_some()
        }
    }

    impl Transport for MemoryTransport {
        fn post_message(&self, frame: String) -> anyhow::Result<()> {
            if self.closed.load(Ordering::Acquire) {
                anyhow::bail!("closed");
            }
            self.posted.lock().unwrap().push(frame);
            Ok(())
        }

        fn on_message(&self, handler: FrameHandler) {
            *self.handler.lock().unwrap() = Some(handler);
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Release);
            self.handler.lock().unwrap().take();
        }
    }
}
