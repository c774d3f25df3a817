use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::engine::{MediaEngine, RouterRtpCapabilities};
use crate::error::NegotiationError;
use crate::session::Session;
use crate::signaling::{RequestEvent, SignalingChannel, ensure_ok, request_with_deadline};

/// First step of every session: fetch the router's capabilities, load
/// the engine with them, and record the load. Everything downstream is
/// gated on this having succeeded.
pub(crate) async fn negotiate(
    channel: &Arc<dyn SignalingChannel>,
    engine: &Arc<dyn MediaEngine>,
    session: &Session,
    request_timeout: Duration,
) -> Result<(), NegotiationError> {
    let ack = request_with_deadline(
        &**channel,
        RequestEvent::GetRouterRtpCapabilities,
        Value::Null,
        request_timeout,
    )
    .await?;
    ensure_ok(RequestEvent::GetRouterRtpCapabilities, &ack)?;
    let capabilities = RouterRtpCapabilities(ack);

    engine.load(capabilities.clone()).await?;
    session.record_capabilities(capabilities)?;
    tracing::debug!(target = "negotiation", "router capabilities loaded");
    Ok(())
}
