use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::engine::{ConsumeOptions, Consumer, MediaEngine, MediaStream};
use crate::error::NegotiationError;
use crate::session::Session;
use crate::signaling::{
    ConsumeRequest, ConsumeResponse, NotifyEvent, RequestEvent, SignalingChannel, decode_ack,
    encode_payload, request_with_deadline,
};

use super::establish::EstablishedTransport;

/// The remote half of a finished negotiation: the subscribed consumer
/// and the stream wrapping its track.
#[derive(Debug, Clone)]
pub struct RemoteMedia {
    pub consumer: Consumer,
    pub stream: MediaStream,
}

/// Ask the SFU for a consumer matching our receive capabilities and
/// materialize it on the receive transport.
pub(crate) async fn consume(
    channel: &Arc<dyn SignalingChannel>,
    engine: &Arc<dyn MediaEngine>,
    transport: &EstablishedTransport,
    session: &Session,
    request_timeout: Duration,
) -> Result<Consumer, NegotiationError> {
    let request = ConsumeRequest {
        rtp_capabilities: engine.rtp_capabilities()?,
    };
    let payload = encode_payload(RequestEvent::Consume, &request)?;
    let ack = request_with_deadline(&**channel, RequestEvent::Consume, payload, request_timeout)
        .await?;
    let answer: ConsumeResponse = decode_ack(RequestEvent::Consume, ack)?;

    let consumer = transport
        .media()
        .consume(ConsumeOptions {
            id: answer.id,
            producer_id: answer.producer_id,
            kind: answer.kind,
            rtp_parameters: answer.rtp_parameters,
            codec_options: Value::Object(Default::default()),
        })
        .await?;
    session.record_consumer(consumer.id.clone())?;
    tracing::info!(
        target = "negotiation",
        consumer_id = %consumer.id,
        producer_id = %consumer.producer_id,
        kind = %consumer.kind,
        "consumer created"
    );
    Ok(consumer)
}

/// Consumers start paused server-side; tell the SFU to start forwarding
/// once the receive transport is connected. Sent exactly once.
pub(crate) async fn resume(channel: &Arc<dyn SignalingChannel>) -> Result<(), NegotiationError> {
    channel.notify(NotifyEvent::Resume, Value::Null).await?;
    tracing::debug!(target = "negotiation", "consumer resumed");
    Ok(())
}

/// Build the presentation stream for a negotiated consumer. The stream
/// is created only after the consumer's track exists, never before.
pub(crate) fn remote_stream(consumer: &Consumer) -> MediaStream {
    MediaStream::from_track(consumer.track.clone())
}
