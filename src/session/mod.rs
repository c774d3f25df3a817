//! The session aggregate: one device load, one send transport, one
//! receive transport, one producer, one consumer. Each field is set
//! exactly once; re-assignment is rejected rather than silently
//! overwritten.

use parking_lot::Mutex;

use crate::engine::RouterRtpCapabilities;
use crate::error::SessionError;

/// A set-once field of the session aggregate.
pub(crate) struct Slot<T> {
    field: &'static str,
    value: Mutex<Option<T>>,
}

impl<T> Slot<T> {
    fn new(field: &'static str) -> Self {
        Self {
            field,
            value: Mutex::new(None),
        }
    }

    fn set(&self, value: T) -> Result<(), SessionError> {
        let mut guard = self.value.lock();
        if guard.is_some() {
            return Err(SessionError::AlreadySet { field: self.field });
        }
        *guard = Some(value);
        Ok(())
    }

    fn is_set(&self) -> bool {
        self.value.lock().is_some()
    }
}

impl<T: Clone> Slot<T> {
    fn get(&self) -> Option<T> {
        self.value.lock().clone()
    }
}

/// Per-session negotiation state shared by both branches.
pub struct Session {
    capabilities: Slot<RouterRtpCapabilities>,
    send_transport: Slot<String>,
    recv_transport: Slot<String>,
    producer: Slot<String>,
    consumer: Slot<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            capabilities: Slot::new("router capabilities"),
            send_transport: Slot::new("send transport"),
            recv_transport: Slot::new("receive transport"),
            producer: Slot::new("producer"),
            consumer: Slot::new("consumer"),
        }
    }

    /// Record the loaded router capabilities. A second load is a
    /// programming error and is rejected.
    pub fn record_capabilities(
        &self,
        capabilities: RouterRtpCapabilities,
    ) -> Result<(), SessionError> {
        self.capabilities.set(capabilities)
    }

    /// Gate for transport creation: capabilities must be loaded first.
    pub fn require_loaded(&self) -> Result<(), SessionError> {
        if !self.capabilities.is_set() {
            return Err(SessionError::CapabilitiesNotLoaded);
        }
        Ok(())
    }

    pub fn record_send_transport(&self, transport_id: String) -> Result<(), SessionError> {
        self.require_loaded()?;
        self.send_transport.set(transport_id)
    }

    pub fn record_recv_transport(&self, transport_id: String) -> Result<(), SessionError> {
        self.require_loaded()?;
        self.recv_transport.set(transport_id)
    }

    pub fn record_producer(&self, producer_id: String) -> Result<(), SessionError> {
        self.producer.set(producer_id)
    }

    pub fn record_consumer(&self, consumer_id: String) -> Result<(), SessionError> {
        self.consumer.set(consumer_id)
    }

    pub fn capabilities(&self) -> Option<RouterRtpCapabilities> {
        self.capabilities.get()
    }

    pub fn send_transport_id(&self) -> Option<String> {
        self.send_transport.get()
    }

    pub fn recv_transport_id(&self) -> Option<String> {
        self.recv_transport.get()
    }

    pub fn producer_id(&self) -> Option<String> {
        self.producer.get()
    }

    pub fn consumer_id(&self) -> Option<String> {
        self.consumer.get()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caps() -> RouterRtpCapabilities {
        RouterRtpCapabilities(json!({"codecs": []}))
    }

    #[test]
    fn transports_require_loaded_capabilities() {
        let session = Session::new();
        assert!(matches!(
            session.record_send_transport("send-1".into()),
            Err(SessionError::CapabilitiesNotLoaded)
        ));

        session.record_capabilities(caps()).expect("first load");
        session
            .record_send_transport("send-1".into())
            .expect("after load");
    }

    #[test]
    fn every_field_rejects_reassignment() {
        let session = Session::new();
        session.record_capabilities(caps()).expect("first load");
        assert!(matches!(
            session.record_capabilities(caps()),
            Err(SessionError::AlreadySet { field: "router capabilities" })
        ));

        session.record_send_transport("send-1".into()).expect("first");
        assert!(session.record_send_transport("send-2".into()).is_err());

        session.record_recv_transport("recv-1".into()).expect("first");
        assert!(session.record_recv_transport("recv-2".into()).is_err());

        session.record_producer("prod-1".into()).expect("first");
        assert!(session.record_producer("prod-2".into()).is_err());

        session.record_consumer("cons-1".into()).expect("first");
        assert!(session.record_consumer("cons-2".into()).is_err());

        assert_eq!(session.producer_id().as_deref(), Some("prod-1"));
        assert_eq!(session.consumer_id().as_deref(), Some("cons-1"));
    }
}
