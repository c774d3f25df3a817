use thiserror::Error;

use crate::engine::MediaKind;
use crate::transport::ConnectionState;

/// Failures on the signaling channel itself.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signaling channel closed")]
    ChannelClosed,
    #[error("request {event} timed out")]
    Timeout { event: &'static str },
    /// The SFU acknowledged with an `{error}` payload instead of a result.
    #[error("sfu rejected {event}: {message}")]
    Sfu {
        event: &'static str,
        message: String,
    },
    #[error("malformed acknowledgement for {event}: {reason}")]
    Malformed {
        event: &'static str,
        reason: String,
    },
    #[error("signaling setup failed: {0}")]
    Setup(String),
}

/// Failures reported by the media engine behind the trait seam.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The device rejected the router's capabilities. Fatal for the
    /// session: no transport may be created afterwards.
    #[error("router capabilities unsupported: {0}")]
    UnsupportedCapabilities(String),
    #[error("device already loaded")]
    AlreadyLoaded,
    #[error("device not loaded")]
    NotLoaded,
    #[error("device cannot produce {0}")]
    CannotProduce(MediaKind),
    /// Local camera/microphone capture failed. Raised by engine
    /// implementations that own media acquisition; never constructed
    /// by this crate.
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(String),
    #[error("transport error: {0}")]
    Transport(String),
    /// A negotiation hook was dropped before its completer fired.
    #[error("negotiation hook dropped before completion")]
    HookDropped,
}

/// Violations of the session aggregate's set-once fields.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{field} already set for this session")]
    AlreadySet { field: &'static str },
    #[error("router capabilities not loaded")]
    CapabilitiesNotLoaded,
}

/// A connection state change the transition table does not allow.
#[derive(Debug, Error)]
#[error("invalid transport state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Anything that can halt a negotiation branch.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("negotiation cancelled")]
    Cancelled,
    #[error("track kind {actual} does not match the configured produce kind {expected}")]
    KindMismatch {
        expected: MediaKind,
        actual: MediaKind,
    },
    #[error("transport entered {0} before negotiation completed")]
    TransportFailed(ConnectionState),
    #[error("{direction} transport did not reach connected before the deadline")]
    ConnectDeadline { direction: &'static str },
}
