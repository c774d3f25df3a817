//! The media engine seam.
//!
//! Negotiation drives an engine through these traits: load router
//! capabilities, mint send/receive transports, then produce and consume
//! tracks on them. The engine owns codec and DTLS details; they cross
//! this boundary as opaque JSON descriptors the signaling layer relays
//! verbatim.

pub mod mock;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::EngineError;
use crate::transport::ConnectionState;

/// Which way media flows on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDirection {
    Send,
    Recv,
}

impl TransportDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportDirection::Send => "send",
            TransportDirection::Recv => "recv",
        }
    }
}

impl fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        })
    }
}

/// Router-wide capabilities fetched from the SFU; fed to `load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterRtpCapabilities(pub Value);

/// The engine's own receive capabilities after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtpCapabilities(pub Value);

/// Per-producer/consumer RTP descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtpParameters(pub Value);

/// DTLS handshake descriptor produced by the engine's connect hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtlsParameters(pub Value);

/// Server-allocated transport description, decoded straight from the
/// create-transport acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub id: String,
    #[serde(default)]
    pub ice_parameters: Value,
    #[serde(default)]
    pub ice_candidates: Value,
    #[serde(default)]
    pub dtls_parameters: Value,
}

/// One media track, local (captured) or remote (consumed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    id: String,
    kind: MediaKind,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

/// A stream groups tracks for presentation. Each negotiated track gets
/// its own stream, created only once the track actually exists.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn from_track(track: MediaTrack) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks: vec![track],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }
}

/// Outbound media bound to a send transport.
#[derive(Debug, Clone)]
pub struct Producer {
    pub id: String,
    pub kind: MediaKind,
    pub track: MediaTrack,
}

/// Inbound media bound to a receive transport.
#[derive(Debug, Clone)]
pub struct Consumer {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub track: MediaTrack,
    pub rtp_parameters: RtpParameters,
}

/// Everything the engine needs to materialize a consumer from the SFU's
/// consume acknowledgement.
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    pub codec_options: Value,
}

/// Completes the engine's connect hook once signaling has relayed the
/// DTLS parameters and the SFU has acknowledged.
#[derive(Debug)]
pub struct ConnectCompleter(oneshot::Sender<Result<(), String>>);

impl ConnectCompleter {
    pub fn new() -> (Self, oneshot::Receiver<Result<(), String>>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn complete(self, result: Result<(), String>) {
        let _ = self.0.send(result);
    }
}

/// Completes the engine's produce hook with the server-assigned
/// producer id.
#[derive(Debug)]
pub struct ProduceCompleter(oneshot::Sender<Result<String, String>>);

impl ProduceCompleter {
    pub fn new() -> (Self, oneshot::Receiver<Result<String, String>>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn complete(self, result: Result<String, String>) {
        let _ = self.0.send(result);
    }
}

/// Hook events a transport raises while negotiating. The pump that
/// drains these owns the signaling exchange each one implies.
pub enum TransportEvent {
    /// The transport needs its DTLS parameters relayed to the SFU.
    /// Fired at most once per transport, on first produce or consume.
    Connect {
        dtls_parameters: DtlsParameters,
        completer: ConnectCompleter,
    },
    /// A send transport wants a server-side producer for this media.
    Produce {
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        completer: ProduceCompleter,
    },
    /// The underlying connection moved to a new state.
    ConnectionStateChange { state: ConnectionState },
}

pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// A loaded media engine: the device-level half of negotiation.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Load the router's capabilities. Must be called exactly once,
    /// before any transport is created.
    async fn load(&self, capabilities: RouterRtpCapabilities) -> Result<(), EngineError>;

    /// The engine's receive capabilities. Errors before `load`.
    fn rtp_capabilities(&self) -> Result<RtpCapabilities, EngineError>;

    /// Whether the loaded engine can send this kind of media.
    fn can_produce(&self, kind: MediaKind) -> bool;

    async fn create_send_transport(
        &self,
        options: TransportOptions,
    ) -> Result<(Arc<dyn MediaTransport>, TransportEvents), EngineError>;

    async fn create_recv_transport(
        &self,
        options: TransportOptions,
    ) -> Result<(Arc<dyn MediaTransport>, TransportEvents), EngineError>;
}

/// One directional transport minted by the engine.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    fn id(&self) -> &str;

    fn direction(&self) -> TransportDirection;

    /// Send a local track. Raises `Connect` first if the transport has
    /// not handshaken yet, then `Produce`.
    async fn produce(&self, track: MediaTrack) -> Result<Producer, EngineError>;

    /// Materialize a consumer from the SFU's answer. Raises `Connect`
    /// first if needed.
    async fn consume(&self, options: ConsumeOptions) -> Result<Consumer, EngineError>;

    /// Release the transport. Idempotent.
    async fn close(&self);
}
