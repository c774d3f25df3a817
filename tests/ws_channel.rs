//! Loopback exercises for the websocket signaling channel: a real
//! socket on 127.0.0.1 with a tiny scripted SFU on the other end.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use reef::error::SignalError;
use reef::signaling::socket::WsSignalingChannel;
use reef::signaling::{NotifyEvent, RequestEvent, SignalingChannel};

async fn bind_sfu() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let endpoint = format!("ws://{}", listener.local_addr().expect("local addr"));
    (listener, endpoint)
}

#[tokio::test]
async fn request_round_trips_and_notify_carries_no_id() {
    let (listener, endpoint) = bind_sfu().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");

        // First frame: a request. Echo its id back with a payload.
        let frame = ws.next().await.expect("request frame").expect("ok frame");
        let request: Value =
            serde_json::from_str(frame.to_text().expect("text")).expect("json frame");
        assert_eq!(request["event"], "getRouterRtpCapabilities");
        let id = request["id"].as_u64().expect("correlation id");
        let ack = json!({"id": id, "data": {"codecs": [{"mimeType": "video/VP8"}]}});
        ws.send(Message::Text(ack.to_string()))
            .await
            .expect("send ack");

        // Second frame: a notify. No id, no acknowledgement owed.
        let frame = ws.next().await.expect("notify frame").expect("ok frame");
        let notify: Value =
            serde_json::from_str(frame.to_text().expect("text")).expect("json frame");
        assert_eq!(notify["event"], "resume");
        assert!(notify.get("id").is_none());
    });

    let channel = WsSignalingChannel::connect(&endpoint, Duration::from_secs(5))
        .await
        .expect("connect");

    let ack = channel
        .request(RequestEvent::GetRouterRtpCapabilities, Value::Null)
        .await
        .expect("acknowledged");
    assert_eq!(ack["codecs"][0]["mimeType"], "video/VP8");

    channel
        .notify(NotifyEvent::Resume, Value::Null)
        .await
        .expect("notified");

    server.await.expect("server task");
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let (listener, endpoint) = bind_sfu().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        // Read the request and say nothing.
        let _ = ws.next().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let channel = WsSignalingChannel::connect(&endpoint, Duration::from_millis(200))
        .await
        .expect("connect");

    let err = channel
        .request(RequestEvent::CreateProducerTransport, json!({"forceTcp": false}))
        .await
        .expect_err("no ack coming");
    assert!(matches!(
        err,
        SignalError::Timeout {
            event: "createProducerTransport"
        }
    ));

    server.abort();
}
