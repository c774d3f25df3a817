//! In-process media engine for tests. Transports raise the same hook
//! events a real engine would; by default a successful connect hook is
//! followed by `connecting` then `connected` state changes, and tests
//! that need to drive failures can take manual control of the states.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use super::{
    ConnectCompleter, ConsumeOptions, Consumer, DtlsParameters, MediaEngine, MediaKind,
    MediaTrack, MediaTransport, ProduceCompleter, Producer, RouterRtpCapabilities,
    RtpCapabilities, RtpParameters, TransportDirection, TransportEvent, TransportEvents,
    TransportOptions,
};
use crate::error::EngineError;
use crate::transport::ConnectionState;

pub struct MockEngine {
    loaded: Mutex<Option<RouterRtpCapabilities>>,
    reject_load: bool,
    can_produce_video: bool,
    auto_connection_states: bool,
    transports: Mutex<Vec<MockTransportHandle>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            loaded: Mutex::new(None),
            reject_load: false,
            can_produce_video: true,
            auto_connection_states: true,
            transports: Mutex::new(Vec::new()),
        }
    }

    /// An engine whose `load` rejects the router's capabilities.
    pub fn rejecting_load() -> Self {
        Self {
            reject_load: true,
            ..Self::new()
        }
    }

    /// An engine that cannot send video.
    pub fn without_video() -> Self {
        Self {
            can_produce_video: false,
            ..Self::new()
        }
    }

    /// An engine whose transports never change connection state on
    /// their own; tests emit states through the transport handle.
    pub fn manual_connection_states() -> Self {
        Self {
            auto_connection_states: false,
            ..Self::new()
        }
    }

    pub fn loaded(&self) -> bool {
        self.loaded.lock().is_some()
    }

    /// Handle to the first transport created in `direction`, if any.
    pub fn transport(&self, direction: TransportDirection) -> Option<MockTransportHandle> {
        self.transports
            .lock()
            .iter()
            .find(|handle| handle.direction == direction)
            .cloned()
    }

    fn mint(
        &self,
        options: TransportOptions,
        direction: TransportDirection,
    ) -> Result<(Arc<dyn MediaTransport>, TransportEvents), EngineError> {
        if !self.loaded() {
            return Err(EngineError::NotLoaded);
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let close_count = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(MockTransport {
            id: options.id.clone(),
            direction,
            events: events_tx.clone(),
            auto_connection_states: self.auto_connection_states,
            connect_fired: AtomicBool::new(false),
            close_count: Arc::clone(&close_count),
        });
        self.transports.lock().push(MockTransportHandle {
            id: options.id,
            direction,
            events: events_tx,
            close_count,
        });
        Ok((transport, events_rx))
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn load(&self, capabilities: RouterRtpCapabilities) -> Result<(), EngineError> {
        if self.reject_load {
            return Err(EngineError::UnsupportedCapabilities(
                "no codec in common with router".into(),
            ));
        }
        let mut guard = self.loaded.lock();
        if guard.is_some() {
            return Err(EngineError::AlreadyLoaded);
        }
        *guard = Some(capabilities);
        Ok(())
    }

    fn rtp_capabilities(&self) -> Result<RtpCapabilities, EngineError> {
        if !self.loaded() {
            return Err(EngineError::NotLoaded);
        }
        Ok(RtpCapabilities(json!({
            "codecs": [{"mimeType": "video/VP8", "kind": "video", "clockRate": 90000}],
            "headerExtensions": []
        })))
    }

    fn can_produce(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => true,
            MediaKind::Video => self.can_produce_video,
        }
    }

    async fn create_send_transport(
        &self,
        options: TransportOptions,
    ) -> Result<(Arc<dyn MediaTransport>, TransportEvents), EngineError> {
        self.mint(options, TransportDirection::Send)
    }

    async fn create_recv_transport(
        &self,
        options: TransportOptions,
    ) -> Result<(Arc<dyn MediaTransport>, TransportEvents), EngineError> {
        self.mint(options, TransportDirection::Recv)
    }
}

struct MockTransport {
    id: String,
    direction: TransportDirection,
    events: mpsc::UnboundedSender<TransportEvent>,
    auto_connection_states: bool,
    connect_fired: AtomicBool,
    close_count: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Fire the connect hook once, then wait for signaling to complete
    /// it. On success the auto variant walks the states to `connected`.
    async fn drive_connect(&self) -> Result<(), EngineError> {
        if self.connect_fired.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (completer, acked) = ConnectCompleter::new();
        self.events
            .send(TransportEvent::Connect {
                dtls_parameters: DtlsParameters(json!({
                    "role": "client",
                    "fingerprints": [{"algorithm": "sha-256", "value": self.id}]
                })),
                completer,
            })
            .map_err(|_| EngineError::HookDropped)?;
        acked
            .await
            .map_err(|_| EngineError::HookDropped)?
            .map_err(EngineError::Transport)?;
        if self.auto_connection_states {
            for state in [ConnectionState::Connecting, ConnectionState::Connected] {
                let _ = self
                    .events
                    .send(TransportEvent::ConnectionStateChange { state });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn direction(&self) -> TransportDirection {
        self.direction
    }

    async fn produce(&self, track: MediaTrack) -> Result<Producer, EngineError> {
        self.drive_connect().await?;
        let (completer, assigned) = ProduceCompleter::new();
        self.events
            .send(TransportEvent::Produce {
                kind: track.kind(),
                rtp_parameters: RtpParameters(json!({"codecs": [], "encodings": []})),
                completer,
            })
            .map_err(|_| EngineError::HookDropped)?;
        let id = assigned
            .await
            .map_err(|_| EngineError::HookDropped)?
            .map_err(EngineError::Transport)?;
        Ok(Producer {
            id,
            kind: track.kind(),
            track,
        })
    }

    async fn consume(&self, options: ConsumeOptions) -> Result<Consumer, EngineError> {
        self.drive_connect().await?;
        let track = MediaTrack::new(format!("remote-{}", options.id), options.kind);
        Ok(Consumer {
            id: options.id,
            producer_id: options.producer_id,
            kind: options.kind,
            track,
            rtp_parameters: options.rtp_parameters,
        })
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test-side handle onto a minted transport: emit connection states and
/// observe close calls.
#[derive(Clone)]
pub struct MockTransportHandle {
    id: String,
    direction: TransportDirection,
    events: mpsc::UnboundedSender<TransportEvent>,
    close_count: Arc<AtomicUsize>,
}

impl MockTransportHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn emit_state(&self, state: ConnectionState) {
        let _ = self
            .events
            .send(TransportEvent::ConnectionStateChange { state });
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}
