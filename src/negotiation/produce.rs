use crate::engine::{MediaEngine, MediaKind, MediaStream, MediaTrack, Producer};
use crate::error::{EngineError, NegotiationError};
use crate::session::Session;

use super::establish::EstablishedTransport;

/// The local half of a finished negotiation: the published producer and
/// the stream wrapping its track.
#[derive(Debug, Clone)]
pub struct LocalMedia {
    pub producer: Producer,
    pub stream: MediaStream,
}

/// Publish a local track on the send transport. The engine's produce
/// hook carries the request to the SFU; the server-assigned producer id
/// comes back through the acknowledgement.
pub(crate) async fn produce(
    engine: &dyn MediaEngine,
    transport: &EstablishedTransport,
    session: &Session,
    expected_kind: MediaKind,
    track: MediaTrack,
) -> Result<Producer, NegotiationError> {
    if track.kind() != expected_kind {
        return Err(NegotiationError::KindMismatch {
            expected: expected_kind,
            actual: track.kind(),
        });
    }
    if !engine.can_produce(track.kind()) {
        return Err(EngineError::CannotProduce(track.kind()).into());
    }
    let producer = transport.media().produce(track).await?;
    session.record_producer(producer.id.clone())?;
    tracing::info!(
        target = "negotiation",
        producer_id = %producer.id,
        kind = %producer.kind,
        "producer created"
    );
    Ok(producer)
}
