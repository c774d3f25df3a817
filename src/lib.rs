//! reef — SFU signaling client.
//!
//! Negotiates one send and one receive media transport against a
//! Selective Forwarding Unit over a request/acknowledgement signaling
//! channel, then brings one local producer and one remote consumer to a
//! playable state. The media engine itself (codecs, ICE/DTLS packets)
//! sits behind the [`engine::MediaEngine`] trait; this crate owns the
//! negotiation protocol, its ordering guarantees, and the transport
//! connection state machine.

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod negotiation;
pub mod session;
pub mod signaling;
pub mod transport;

pub use cancel::CancelToken;
pub use config::{NegotiationConfig, NegotiationConfigBuilder};
pub use error::{EngineError, NegotiationError, SessionError, SignalError, TransitionError};
pub use negotiation::{LocalMedia, Negotiation, RemoteMedia, SessionEvent};
