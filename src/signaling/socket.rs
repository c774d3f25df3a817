//! Websocket-backed signaling channel.
//!
//! The socket gives us reliable ordered frames but no acknowledgement
//! primitive, so requests carry a correlation id and the reader pump
//! matches acknowledgements back to their pending oneshot waiters.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::{NotifyEvent, RequestEvent, SignalingChannel};
use crate::error::SignalError;

#[derive(Serialize)]
struct OutboundFrame<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    data: Value,
}

#[derive(Deserialize)]
struct AckFrame {
    id: u64,
    #[serde(default)]
    data: Value,
}

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Value>>>;

pub struct WsSignalingChannel {
    send_tx: mpsc::UnboundedSender<Message>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    request_timeout: Duration,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WsSignalingChannel {
    pub async fn connect(
        endpoint: &str,
        request_timeout: Duration,
    ) -> Result<Arc<Self>, SignalError> {
        let url = Url::parse(endpoint).map_err(|err| {
            SignalError::Setup(format!("invalid signaling endpoint {endpoint}: {err}"))
        })?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| SignalError::Setup(format!("websocket connect failed: {err}")))?;
        tracing::debug!(target = "signaling", url = %url, "signaling websocket connected");
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let (send_tx, mut send_rx) = mpsc::unbounded_channel::<Message>();
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(message) = send_rx.recv().await {
                if ws_write.send(message).await.is_err() {
                    break;
                }
            }
        });

        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                match msg {
                    Ok(Message::Text(text)) => dispatch_ack(&reader_pending, &text),
                    Ok(Message::Binary(data)) => {
                        if let Ok(text) = String::from_utf8(data) {
                            dispatch_ack(&reader_pending, &text);
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(target = "signaling", "signaling websocket error: {err}");
                        break;
                    }
                }
            }
            // Dropping the waiters wakes every in-flight request with a
            // channel-closed error.
            reader_pending.lock().clear();
        });

        Ok(Arc::new(Self {
            send_tx,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            tasks: Mutex::new(vec![writer, reader]),
        }))
    }

    fn send_frame(&self, frame: &OutboundFrame<'_>, event: &str) -> Result<(), SignalError> {
        let text = serde_json::to_string(frame)
            .map_err(|err| SignalError::Setup(format!("encode {event} frame: {err}")))?;
        self.send_tx
            .send(Message::Text(text))
            .map_err(|_| SignalError::ChannelClosed)
    }
}

fn dispatch_ack(pending: &PendingMap, text: &str) {
    match serde_json::from_str::<AckFrame>(text) {
        Ok(frame) => {
            let waiter = pending.lock().remove(&frame.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(frame.data);
                }
                None => tracing::debug!(
                    target = "signaling",
                    id = frame.id,
                    "acknowledgement with no pending request"
                ),
            }
        }
        Err(err) => {
            tracing::debug!(target = "signaling", "ignoring non-acknowledgement frame: {err}")
        }
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    async fn request(&self, event: RequestEvent, payload: Value) -> Result<Value, SignalError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = OutboundFrame {
            event: event.as_str(),
            id: Some(id),
            data: payload,
        };
        if let Err(err) = self.send_frame(&frame, event.as_str()) {
            self.pending.lock().remove(&id);
            return Err(err);
        }
        tracing::trace!(target = "signaling", %event, id, "request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(SignalError::ChannelClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(SignalError::Timeout {
                    event: event.as_str(),
                })
            }
        }
    }

    async fn notify(&self, event: NotifyEvent, payload: Value) -> Result<(), SignalError> {
        let frame = OutboundFrame {
            event: event.as_str(),
            id: None,
            data: payload,
        };
        self.send_frame(&frame, event.as_str())?;
        tracing::trace!(target = "signaling", %event, "notify sent");
        Ok(())
    }
}

impl Drop for WsSignalingChannel {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}
