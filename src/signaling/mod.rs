//! The signaling channel: a request/acknowledgement primitive plus a
//! fire-and-forget notify, both addressed by a wire event name. The
//! payload shapes here are the protocol the SFU speaks; descriptors the
//! engine owns (capabilities, RTP/DTLS parameters) stay opaque JSON.

pub mod mock;
pub mod socket;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{DtlsParameters, MediaKind, RtpCapabilities, RtpParameters};
use crate::error::SignalError;

/// Request events, named by their wire strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    GetRouterRtpCapabilities,
    CreateProducerTransport,
    ConnectProducerTransport,
    Produce,
    CreateConsumerTransport,
    ConnectConsumerTransport,
    Consume,
}

impl RequestEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestEvent::GetRouterRtpCapabilities => "getRouterRtpCapabilities",
            RequestEvent::CreateProducerTransport => "createProducerTransport",
            RequestEvent::ConnectProducerTransport => "connectProducerTransport",
            RequestEvent::Produce => "produce",
            RequestEvent::CreateConsumerTransport => "createConsumerTransport",
            RequestEvent::ConnectConsumerTransport => "connectConsumerTransport",
            RequestEvent::Consume => "consume",
        }
    }
}

impl fmt::Display for RequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification events: no acknowledgement is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Resume,
}

impl NotifyEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyEvent::Resume => "resume",
        }
    }
}

impl fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request/acknowledgement channel to the SFU.
///
/// Requests are independent and may be issued without waiting for prior
/// ones to resolve; the negotiation layer imposes ordering where data
/// dependencies require it. Every request yields exactly one
/// acknowledgement, surfaced here as a `Result`.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send `event` and await its single acknowledgement payload.
    async fn request(&self, event: RequestEvent, payload: Value) -> Result<Value, SignalError>;

    /// Fire-and-forget notification.
    async fn notify(&self, event: NotifyEvent, payload: Value) -> Result<(), SignalError>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProducerTransportRequest {
    pub force_tcp: bool,
    pub rtp_capabilities: RtpCapabilities,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConsumerTransportRequest {
    pub force_tcp: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectProducerTransportRequest {
    pub dtls_parameters: DtlsParameters,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectConsumerTransportRequest {
    pub transport_id: String,
    pub dtls_parameters: DtlsParameters,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    pub transport_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProduceResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub rtp_capabilities: RtpCapabilities,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    pub producer_id: String,
    pub id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Issue a request bounded by a deadline. Concrete channels may carry
/// their own transport-level timeout; this bounds the round trip at the
/// negotiation layer regardless of the channel implementation.
pub(crate) async fn request_with_deadline(
    channel: &dyn SignalingChannel,
    event: RequestEvent,
    payload: Value,
    deadline: Duration,
) -> Result<Value, SignalError> {
    match tokio::time::timeout(deadline, channel.request(event, payload)).await {
        Ok(result) => result,
        Err(_) => Err(SignalError::Timeout {
            event: event.as_str(),
        }),
    }
}

/// Check the SFU's `{error}` convention on an acknowledgement payload.
pub fn ensure_ok(event: RequestEvent, payload: &Value) -> Result<(), SignalError> {
    match payload.get("error") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(message)) => Err(SignalError::Sfu {
            event: event.as_str(),
            message: message.clone(),
        }),
        Some(other) => Err(SignalError::Sfu {
            event: event.as_str(),
            message: other.to_string(),
        }),
    }
}

/// Decode an acknowledgement payload, honoring the error convention.
pub fn decode_ack<T: DeserializeOwned>(event: RequestEvent, payload: Value) -> Result<T, SignalError> {
    ensure_ok(event, &payload)?;
    serde_json::from_value(payload).map_err(|err| SignalError::Malformed {
        event: event.as_str(),
        reason: err.to_string(),
    })
}

pub(crate) fn encode_payload<T: Serialize>(
    event: RequestEvent,
    payload: &T,
) -> Result<Value, SignalError> {
    serde_json::to_value(payload)
        .map_err(|err| SignalError::Setup(format!("encode {event} payload: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn produce_request_uses_wire_field_names() {
        let request = ProduceRequest {
            transport_id: "send-1".into(),
            kind: MediaKind::Video,
            rtp_parameters: RtpParameters(json!({"codecs": []})),
        };
        let value = encode_payload(RequestEvent::Produce, &request).expect("encodes");
        assert_eq!(value["transportId"], "send-1");
        assert_eq!(value["kind"], "video");
        assert!(value["rtpParameters"]["codecs"].is_array());
    }

    #[test]
    fn decode_ack_surfaces_sfu_errors() {
        let err = decode_ack::<ProduceResponse>(
            RequestEvent::Produce,
            json!({"error": "no memory for producer"}),
        )
        .expect_err("error ack");
        match err {
            SignalError::Sfu { event, message } => {
                assert_eq!(event, "produce");
                assert_eq!(message, "no memory for producer");
            }
            other => panic!("expected sfu error, got {other}"),
        }
    }

    #[test]
    fn decode_ack_rejects_wrong_shapes() {
        let err = decode_ack::<ProduceResponse>(RequestEvent::Produce, json!({"wrong": 1}))
            .expect_err("shape mismatch");
        assert!(matches!(err, SignalError::Malformed { event: "produce", .. }));
    }

    #[test]
    fn consume_response_round_trips_camel_case() {
        let answer: ConsumeResponse = decode_ack(
            RequestEvent::Consume,
            json!({
                "producerId": "prod-1",
                "id": "cons-1",
                "kind": "video",
                "rtpParameters": {"codecs": []}
            }),
        )
        .expect("decodes");
        assert_eq!(answer.producer_id, "prod-1");
        assert_eq!(answer.id, "cons-1");
        assert_eq!(answer.kind, MediaKind::Video);
    }
}
