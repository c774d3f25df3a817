//! The negotiation driver.
//!
//! One `Negotiation` takes a session from nothing to a publishing
//! producer and a playing consumer: load router capabilities, then run
//! the send and receive branches concurrently. Within a branch the
//! protocol's data dependencies impose strict ordering; across branches
//! nothing is ordered.

mod capabilities;
mod consume;
mod establish;
mod produce;

pub use consume::RemoteMedia;
pub use establish::EstablishedTransport;
pub use produce::LocalMedia;

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::config::NegotiationConfig;
use crate::engine::{MediaEngine, MediaStream, MediaTrack, TransportDirection};
use crate::error::NegotiationError;
use crate::session::Session;
use crate::signaling::SignalingChannel;
use crate::transport::ConnectionState;

/// UI-facing notifications emitted while a negotiation runs. Failures
/// here are rendered; the typed errors travel through [`Negotiation::run`]'s
/// return value.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    LocalStreamReady(MediaStream),
    RemoteStreamReady(MediaStream),
    SendBranchFailed(String),
    RecvBranchFailed(String),
    SessionFailed(String),
}

pub struct Negotiation {
    channel: Arc<dyn SignalingChannel>,
    engine: Arc<dyn MediaEngine>,
    config: NegotiationConfig,
    session: Session,
    cancel: CancelToken,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    send_seat: Mutex<Option<EstablishedTransport>>,
    recv_seat: Mutex<Option<EstablishedTransport>>,
}

impl Negotiation {
    pub fn new(
        channel: Arc<dyn SignalingChannel>,
        engine: Arc<dyn MediaEngine>,
        config: NegotiationConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            channel,
            engine,
            config,
            session: Session::new(),
            cancel: CancelToken::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            send_seat: Mutex::new(None),
            recv_seat: Mutex::new(None),
        }
    }

    /// The event stream for this negotiation. Can be taken once.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.lock().take()
    }

    /// Token that halts both branches at their next suspension point.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn send_transport_state(&self) -> Option<ConnectionState> {
        self.send_seat
            .lock()
            .as_ref()
            .map(EstablishedTransport::current_state)
    }

    pub fn recv_transport_state(&self) -> Option<ConnectionState> {
        self.recv_seat
            .lock()
            .as_ref()
            .map(EstablishedTransport::current_state)
    }

    /// Run the full negotiation: capabilities first, then the send and
    /// receive branches concurrently.
    ///
    /// A capabilities failure is fatal and surfaces as the outer error.
    /// After that point each branch succeeds or fails on its own; a
    /// one-way session is a valid outcome.
    pub async fn run(
        &self,
        local_track: MediaTrack,
    ) -> Result<
        (
            Result<LocalMedia, NegotiationError>,
            Result<RemoteMedia, NegotiationError>,
        ),
        NegotiationError,
    > {
        if let Err(err) = self
            .guarded(capabilities::negotiate(
                &self.channel,
                &self.engine,
                &self.session,
                self.config.request_timeout,
            ))
            .await
        {
            tracing::error!(target = "negotiation", "capability negotiation failed: {err}");
            self.emit(SessionEvent::SessionFailed(err.to_string()));
            return Err(err);
        }

        let (local, remote) = tokio::join!(self.send_branch(local_track), self.recv_branch());
        if let Err(err) = &local {
            tracing::warn!(target = "negotiation", "send branch failed: {err}");
            self.emit(SessionEvent::SendBranchFailed(err.to_string()));
        }
        if let Err(err) = &remote {
            tracing::warn!(target = "negotiation", "receive branch failed: {err}");
            self.emit(SessionEvent::RecvBranchFailed(err.to_string()));
        }
        Ok((local, remote))
    }

    async fn send_branch(&self, track: MediaTrack) -> Result<LocalMedia, NegotiationError> {
        let transport = self
            .guarded(establish::create_send_transport(
                &self.channel,
                &self.engine,
                &self.session,
                &self.config,
            ))
            .await?;
        let producer = self
            .guarded(produce::produce(
                &*self.engine,
                &transport,
                &self.session,
                self.config.produce_kind,
                track,
            ))
            .await?;
        transport
            .wait_connected(self.config.connect_timeout, &self.cancel)
            .await?;

        let stream = MediaStream::from_track(producer.track.clone());
        let media = LocalMedia { producer, stream };
        self.emit(SessionEvent::LocalStreamReady(media.stream.clone()));
        self.seat(transport);
        Ok(media)
    }

    async fn recv_branch(&self) -> Result<RemoteMedia, NegotiationError> {
        let transport = self
            .guarded(establish::create_recv_transport(
                &self.channel,
                &self.engine,
                &self.session,
                &self.config,
            ))
            .await?;
        let consumer = self
            .guarded(consume::consume(
                &self.channel,
                &self.engine,
                &transport,
                &self.session,
                self.config.request_timeout,
            ))
            .await?;
        transport
            .wait_connected(self.config.connect_timeout, &self.cancel)
            .await?;
        self.guarded(consume::resume(&self.channel)).await?;

        let media = RemoteMedia {
            stream: consume::remote_stream(&consumer),
            consumer,
        };
        self.emit(SessionEvent::RemoteStreamReady(media.stream.clone()));
        self.seat(transport);
        Ok(media)
    }

    /// Race a negotiation step against cancellation. Cancellation wins
    /// ties so an already-cancelled session performs no further work.
    async fn guarded<T>(
        &self,
        step: impl Future<Output = Result<T, NegotiationError>>,
    ) -> Result<T, NegotiationError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(NegotiationError::Cancelled),
            outcome = step => outcome,
        }
    }

    fn seat(&self, transport: EstablishedTransport) {
        let seat = match transport.direction() {
            TransportDirection::Send => &self.send_seat,
            TransportDirection::Recv => &self.recv_seat,
        };
        *seat.lock() = Some(transport);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }
}
