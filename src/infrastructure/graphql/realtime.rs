/// Realtime GraphQL subscriptions over websocket
///
/// Speaks the `graphql-transport-ws` protocol: `connection_init` is answered
/// by `connection_ack`, then one `subscribe` is sent and `next` / `error` /
/// `complete` messages are forwarded as [`SubscriptionEvent`]s. Each
/// subscription owns its own socket.
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::{
    GraphQlError, GraphQlOperation, GraphQlResponse, GraphQlSubscription, SubscriptionEvent,
    SubscriptionHandle,
};
use crate::domain::shared::{Result, TelephonyError};

pub const SUBPROTOCOL: &str = "graphql-transport-ws";

const EVENT_BUFFER: usize = 64;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Messages the server may send
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    ConnectionAck {},
    Ping {},
    Pong {},
    Next {
        id: String,
        payload: GraphQlResponse,
    },
    Error {
        id: String,
        payload: Vec<GraphQlError>,
    },
    Complete {
        id: String,
    },
    #[serde(other)]
    Unknown,
}

fn parse(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str(text) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Ignoring malformed realtime message: {}", e);
            None
        }
    }
}

fn transport<E: std::fmt::Display>(e: E) -> TelephonyError {
    TelephonyError::Transport(e.to_string())
}

/// Open a socket, authenticate and start `operation`
pub async fn subscribe(
    url: &str,
    access_token: &str,
    operation: GraphQlOperation,
    timeout: Duration,
) -> Result<GraphQlSubscription> {
    let mut request = url.into_client_request().map_err(transport)?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

    let (socket, _) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| TelephonyError::Timeout("realtime connect".to_string()))?
        .map_err(transport)?;
    let (mut sink, mut stream) = socket.split();

    let init = json!({
        "type": "connection_init",
        "payload": { "Authorization": access_token },
    });
    sink.send(Message::Text(init.to_string()))
        .await
        .map_err(transport)?;

    tokio::time::timeout(timeout, await_ack(&mut sink, &mut stream))
        .await
        .map_err(|_| TelephonyError::Timeout("realtime connection_ack".to_string()))??;

    let id = Uuid::new_v4().to_string();
    let subscribe = json!({
        "id": id,
        "type": "subscribe",
        "payload": operation,
    });
    sink.send(Message::Text(subscribe.to_string()))
        .await
        .map_err(transport)?;
    info!("Realtime subscription {} started ({})", id, operation.name);

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(pump(sink, stream, id, events_tx, stop_rx));

    Ok(GraphQlSubscription {
        handle: Box::new(RealtimeHandle {
            stop: Mutex::new(Some(stop_tx)),
        }),
        events: events_rx,
    })
}

async fn await_ack(
    sink: &mut SplitSink<Socket, Message>,
    stream: &mut SplitStream<Socket>,
) -> Result<()> {
    while let Some(message) = stream.next().await {
        match message.map_err(transport)? {
            Message::Text(text) => match parse(&text) {
                Some(ServerMessage::ConnectionAck {}) => return Ok(()),
                Some(ServerMessage::Ping {}) => {
                    sink.send(Message::Text(json!({"type": "pong"}).to_string()))
                        .await
                        .map_err(transport)?;
                }
                Some(ServerMessage::Error { payload, .. }) => {
                    let reason = payload
                        .first()
                        .map(|e| e.message.clone())
                        .unwrap_or_else(|| "connection rejected".to_string());
                    return Err(TelephonyError::Transport(reason));
                }
                _ => {}
            },
            Message::Close(frame) => {
                return Err(TelephonyError::Transport(format!(
                    "connection closed before ack: {:?}",
                    frame
                )))
            }
            _ => {}
        }
    }
    Err(TelephonyError::Transport(
        "connection closed before ack".to_string(),
    ))
}

async fn pump(
    mut sink: SplitSink<Socket, Message>,
    mut stream: SplitStream<Socket>,
    id: String,
    events: mpsc::Sender<SubscriptionEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!("Stopping realtime subscription {}", id);
                let complete = json!({ "id": id, "type": "complete" });
                let _ = sink.send(Message::Text(complete.to_string())).await;
                let _ = sink.close().await;
                return;
            }
            message = stream.next() => {
                let event = match message {
                    Some(Ok(Message::Text(text))) => match parse(&text) {
                        Some(ServerMessage::Next { id: msg_id, payload }) if msg_id == id => {
                            if payload.has_errors() {
                                Some(SubscriptionEvent::Errors(payload.errors().to_vec()))
                            } else {
                                Some(SubscriptionEvent::Data(payload.data.unwrap_or(Value::Null)))
                            }
                        }
                        Some(ServerMessage::Error { id: msg_id, payload }) if msg_id == id => {
                            Some(SubscriptionEvent::Errors(payload))
                        }
                        Some(ServerMessage::Complete { id: msg_id }) if msg_id == id => {
                            let _ = events.send(SubscriptionEvent::Completed).await;
                            return;
                        }
                        Some(ServerMessage::Ping {}) => {
                            let _ = sink.send(Message::Text(json!({"type": "pong"}).to_string())).await;
                            None
                        }
                        _ => None,
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                        None
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events
                            .send(SubscriptionEvent::Failed("connection closed".to_string()))
                            .await;
                        return;
                    }
                    Some(Err(e)) => {
                        warn!("Realtime subscription {} failed: {}", id, e);
                        let _ = events.send(SubscriptionEvent::Failed(e.to_string())).await;
                        return;
                    }
                    Some(Ok(_)) => None,
                };

                if let Some(event) = event {
                    if events.send(event).await.is_err() {
                        debug!("Realtime subscription {} has no listener, closing", id);
                        let _ = sink.close().await;
                        return;
                    }
                }
            }
        }
    }
}

/// Stops the subscription task when cancelled or dropped
struct RealtimeHandle {
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl SubscriptionHandle for RealtimeHandle {
    fn cancel(&self) {
        let stop = self
            .stop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
    }
}
