//! Transport establishment: ask the SFU for a transport, mint the
//! engine-side half, and wire its hook events to the signaling channel.
//!
//! Each transport gets one pump task that drains hook events in order.
//! Because the pump is sequential, a produce request can only go out
//! after the connect hook it follows has been acknowledged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::config::NegotiationConfig;
use crate::engine::{
    DtlsParameters, MediaEngine, MediaKind, MediaTransport, RtpParameters, TransportDirection,
    TransportEvent, TransportEvents,
};
use crate::error::{NegotiationError, SignalError};
use crate::session::Session;
use crate::signaling::{
    ConnectConsumerTransportRequest, ConnectProducerTransportRequest,
    CreateConsumerTransportRequest, CreateProducerTransportRequest, ProduceRequest,
    ProduceResponse, RequestEvent, SignalingChannel, decode_ack, encode_payload, ensure_ok,
    request_with_deadline,
};
use crate::transport::{ConnectionState, StateMachine};

/// A transport with its hook pump running and its connection state
/// observable.
pub struct EstablishedTransport {
    inner: Arc<dyn MediaTransport>,
    direction: TransportDirection,
    state: watch::Receiver<ConnectionState>,
    pump: JoinHandle<()>,
}

impl EstablishedTransport {
    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn direction(&self) -> TransportDirection {
        self.direction
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn media(&self) -> &Arc<dyn MediaTransport> {
        &self.inner
    }

    /// Wait until the transport reaches `connected`. Resolves with an
    /// error if it lands in a terminal state first, the deadline
    /// expires, or the session is cancelled.
    pub(crate) async fn wait_connected(
        &self,
        deadline: Duration,
        cancel: &CancelToken,
    ) -> Result<(), NegotiationError> {
        let mut state = self.state.clone();
        let reached = async move {
            loop {
                let current = *state.borrow_and_update();
                match current {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Failed | ConnectionState::Closed => {
                        return Err(NegotiationError::TransportFailed(current));
                    }
                    ConnectionState::New | ConnectionState::Connecting => {}
                }
                if state.changed().await.is_err() {
                    return Err(NegotiationError::TransportFailed(ConnectionState::Closed));
                }
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NegotiationError::Cancelled),
            outcome = tokio::time::timeout(deadline, reached) => match outcome {
                Ok(result) => result,
                Err(_) => Err(NegotiationError::ConnectDeadline {
                    direction: self.direction.as_str(),
                }),
            },
        }
    }
}

impl Drop for EstablishedTransport {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

pub(crate) async fn create_send_transport(
    channel: &Arc<dyn SignalingChannel>,
    engine: &Arc<dyn MediaEngine>,
    session: &Session,
    config: &NegotiationConfig,
) -> Result<EstablishedTransport, NegotiationError> {
    session.require_loaded()?;
    let request = CreateProducerTransportRequest {
        force_tcp: config.force_tcp,
        rtp_capabilities: engine.rtp_capabilities()?,
    };
    let payload = encode_payload(RequestEvent::CreateProducerTransport, &request)?;
    let ack = request_with_deadline(
        &**channel,
        RequestEvent::CreateProducerTransport,
        payload,
        config.request_timeout,
    )
    .await?;
    let options = decode_ack(RequestEvent::CreateProducerTransport, ack)?;

    let (transport, events) = engine.create_send_transport(options).await?;
    session.record_send_transport(transport.id().to_string())?;
    tracing::info!(
        target = "negotiation",
        transport_id = %transport.id(),
        "send transport created"
    );
    Ok(wire(
        channel,
        transport,
        events,
        TransportDirection::Send,
        config.request_timeout,
    ))
}

pub(crate) async fn create_recv_transport(
    channel: &Arc<dyn SignalingChannel>,
    engine: &Arc<dyn MediaEngine>,
    session: &Session,
    config: &NegotiationConfig,
) -> Result<EstablishedTransport, NegotiationError> {
    session.require_loaded()?;
    let request = CreateConsumerTransportRequest {
        force_tcp: config.force_tcp,
    };
    let payload = encode_payload(RequestEvent::CreateConsumerTransport, &request)?;
    let ack = request_with_deadline(
        &**channel,
        RequestEvent::CreateConsumerTransport,
        payload,
        config.request_timeout,
    )
    .await?;
    let options = decode_ack(RequestEvent::CreateConsumerTransport, ack)?;

    let (transport, events) = engine.create_recv_transport(options).await?;
    session.record_recv_transport(transport.id().to_string())?;
    tracing::info!(
        target = "negotiation",
        transport_id = %transport.id(),
        "receive transport created"
    );
    Ok(wire(
        channel,
        transport,
        events,
        TransportDirection::Recv,
        config.request_timeout,
    ))
}

fn wire(
    channel: &Arc<dyn SignalingChannel>,
    transport: Arc<dyn MediaTransport>,
    events: TransportEvents,
    direction: TransportDirection,
    request_timeout: Duration,
) -> EstablishedTransport {
    let (machine, state) = StateMachine::new(transport.id().to_string());
    let pump = spawn_event_pump(
        Arc::clone(channel),
        Arc::clone(&transport),
        events,
        machine,
        direction,
        request_timeout,
    );
    EstablishedTransport {
        inner: transport,
        direction,
        state,
        pump,
    }
}

fn spawn_event_pump(
    channel: Arc<dyn SignalingChannel>,
    transport: Arc<dyn MediaTransport>,
    mut events: TransportEvents,
    machine: StateMachine,
    direction: TransportDirection,
    request_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut closed = false;
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connect {
                    dtls_parameters,
                    completer,
                } => {
                    let result = forward_connect(
                        &channel,
                        transport.id(),
                        direction,
                        dtls_parameters,
                        request_timeout,
                    )
                    .await;
                    completer.complete(result.map_err(|err| err.to_string()));
                }
                TransportEvent::Produce {
                    kind,
                    rtp_parameters,
                    completer,
                } => {
                    let result = forward_produce(
                        &channel,
                        transport.id(),
                        kind,
                        rtp_parameters,
                        request_timeout,
                    )
                    .await;
                    completer.complete(result.map_err(|err| err.to_string()));
                }
                TransportEvent::ConnectionStateChange { state } => match machine.apply(state) {
                    Ok(ConnectionState::Failed) if !closed => {
                        closed = true;
                        tracing::warn!(
                            target = "transport",
                            transport_id = %transport.id(),
                            direction = direction.as_str(),
                            "transport failed; closing"
                        );
                        transport.close().await;
                        let _ = machine.apply(ConnectionState::Closed);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(
                            target = "transport",
                            transport_id = %transport.id(),
                            "ignoring state change: {err}"
                        );
                    }
                },
            }
        }
    })
}

async fn forward_connect(
    channel: &Arc<dyn SignalingChannel>,
    transport_id: &str,
    direction: TransportDirection,
    dtls_parameters: DtlsParameters,
    request_timeout: Duration,
) -> Result<(), SignalError> {
    // The producer-side connect omits the transport id; the SFU keys it
    // off the socket. The consumer side carries it explicitly.
    match direction {
        TransportDirection::Send => {
            let request = ConnectProducerTransportRequest { dtls_parameters };
            let payload = encode_payload(RequestEvent::ConnectProducerTransport, &request)?;
            let ack = request_with_deadline(
                &**channel,
                RequestEvent::ConnectProducerTransport,
                payload,
                request_timeout,
            )
            .await?;
            ensure_ok(RequestEvent::ConnectProducerTransport, &ack)
        }
        TransportDirection::Recv => {
            let request = ConnectConsumerTransportRequest {
                transport_id: transport_id.to_string(),
                dtls_parameters,
            };
            let payload = encode_payload(RequestEvent::ConnectConsumerTransport, &request)?;
            let ack = request_with_deadline(
                &**channel,
                RequestEvent::ConnectConsumerTransport,
                payload,
                request_timeout,
            )
            .await?;
            ensure_ok(RequestEvent::ConnectConsumerTransport, &ack)
        }
    }
}

async fn forward_produce(
    channel: &Arc<dyn SignalingChannel>,
    transport_id: &str,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    request_timeout: Duration,
) -> Result<String, SignalError> {
    let request = ProduceRequest {
        transport_id: transport_id.to_string(),
        kind,
        rtp_parameters,
    };
    let payload = encode_payload(RequestEvent::Produce, &request)?;
    let ack = request_with_deadline(&**channel, RequestEvent::Produce, payload, request_timeout)
        .await?;
    let answer: ProduceResponse = decode_ack(RequestEvent::Produce, ack)?;
    Ok(answer.id)
}
