//! Scripted signaling channel for exercising the negotiation protocol
//! without a socket. Acknowledgements are queued per event; every sent
//! request and notify is logged so tests can assert ordering.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{NotifyEvent, RequestEvent, SignalingChannel};
use crate::error::SignalError;

/// What the scripted SFU does when a given request arrives.
pub enum ScriptedAck {
    /// Acknowledge with this payload. Script `{"error": ...}` here to
    /// exercise the SFU error convention.
    Ack(Value),
    /// Never acknowledge; the caller observes an expired deadline.
    Stall,
}

/// One outbound message, in the order it was sent.
#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    Request { event: RequestEvent, payload: Value },
    Notify { event: NotifyEvent, payload: Value },
}

#[derive(Default)]
pub struct MockSignaling {
    scripts: Mutex<HashMap<&'static str, VecDeque<ScriptedAck>>>,
    log: Mutex<Vec<SentMessage>>,
}

impl MockSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, event: RequestEvent, ack: ScriptedAck) {
        self.scripts
            .lock()
            .entry(event.as_str())
            .or_default()
            .push_back(ack);
    }

    pub fn script_ack(&self, event: RequestEvent, payload: Value) {
        self.script(event, ScriptedAck::Ack(payload));
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.log.lock().clone()
    }

    pub fn requests(&self) -> Vec<RequestEvent> {
        self.log
            .lock()
            .iter()
            .filter_map(|message| match message {
                SentMessage::Request { event, .. } => Some(*event),
                SentMessage::Notify { .. } => None,
            })
            .collect()
    }

    pub fn notifies(&self) -> Vec<NotifyEvent> {
        self.log
            .lock()
            .iter()
            .filter_map(|message| match message {
                SentMessage::Notify { event, .. } => Some(*event),
                SentMessage::Request { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl SignalingChannel for MockSignaling {
    async fn request(&self, event: RequestEvent, payload: Value) -> Result<Value, SignalError> {
        self.log.lock().push(SentMessage::Request {
            event,
            payload: payload.clone(),
        });
        let next = self
            .scripts
            .lock()
            .get_mut(event.as_str())
            .and_then(|queue| queue.pop_front());
        match next {
            Some(ScriptedAck::Ack(value)) => Ok(value),
            Some(ScriptedAck::Stall) => Err(SignalError::Timeout {
                event: event.as_str(),
            }),
            // An unscripted request means the test's SFU has nothing
            // left to say; treat it like a vanished peer.
            None => Err(SignalError::ChannelClosed),
        }
    }

    async fn notify(&self, event: NotifyEvent, payload: Value) -> Result<(), SignalError> {
        self.log.lock().push(SentMessage::Notify { event, payload });
        Ok(())
    }
}
