//! iframe-phone RPC over a WebSocket.
//!
//! A relay page inside the CODAP iframe forwards every `data-interactive`
//! postMessage frame to this socket and posts our frames back to
//! `window.parent`. Calls are correlated by uuid.

use crate::transport::{HostCall, Transport};
use crate::ClientError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use gogodata_core::{PhoneFrame, RpcMessage, CHANNEL};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

/// Reply timeout used by iframe-phone.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub struct WsTransport {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_uuid: AtomicU64,
    timeout: Duration,
}

impl WsTransport {
    /// Connect to the relay.
    ///
    /// Returns the transport and the stream of host-initiated calls, which
    /// should be handed to [`Connection::serve`](crate::Connection::serve).
    pub async fn connect(
        url: &str,
        timeout: Duration,
    ) -> Result<(Self, mpsc::Receiver<HostCall>), ClientError> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut sink, mut stream) = ws.split();
        tracing::info!("Connected to CODAP relay at {}", url);

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (calls_tx, calls_rx) = mpsc::channel::<HostCall>(64);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!("Relay send failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_outgoing = outgoing.clone();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!("Relay connection error: {}", e);
                        break;
                    }
                };

                let frame: PhoneFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("Invalid frame from relay: {}", e);
                        continue;
                    }
                };
                if frame.channel != CHANNEL {
                    tracing::debug!("Ignoring frame on channel {}", frame.channel);
                    continue;
                }

                match frame.content {
                    RpcMessage::ReturnValue { uuid, value } => {
                        match reader_pending.lock().remove(&uuid) {
                            Some(tx) => {
                                let _ = tx.send(value);
                            }
                            None => tracing::debug!("Late or unknown reply {}", uuid),
                        }
                    }
                    RpcMessage::Call { uuid, value } => {
                        let (call, reply) = HostCall::new(value);
                        if calls_tx.send(call).await.is_err() {
                            tracing::debug!("No one is serving host calls");
                            continue;
                        }
                        let outgoing = reader_outgoing.clone();
                        tokio::spawn(async move {
                            let Ok(value) = reply.await else { return };
                            let frame = PhoneFrame::new(RpcMessage::ReturnValue { uuid, value });
                            match serde_json::to_string(&frame) {
                                Ok(text) => {
                                    let _ = outgoing.send(Message::Text(text.into()));
                                }
                                Err(e) => tracing::warn!("Could not encode reply: {}", e),
                            }
                        });
                    }
                }
            }

            // Dropping the senders resolves every pending call as a timeout.
            reader_pending.lock().clear();
            tracing::info!("CODAP relay disconnected");
        });

        Ok((
            Self {
                outgoing,
                pending,
                next_uuid: AtomicU64::new(1),
                timeout,
            },
            calls_rx,
        ))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn call(&self, message: Value) -> Option<Value> {
        let uuid = self.next_uuid.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(uuid, tx);

        let frame = PhoneFrame::new(RpcMessage::Call {
            uuid,
            value: message,
        });
        let sent = serde_json::to_string(&frame)
            .map_err(|e| tracing::warn!("Could not encode call: {}", e))
            .ok()
            .is_some_and(|text| self.outgoing.send(Message::Text(text.into())).is_ok());
        if !sent {
            self.pending.lock().remove(&uuid);
            return None;
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(value)) if !value.is_null() => Some(value),
            Ok(_) => None,
            Err(_) => {
                self.pending.lock().remove(&uuid);
                None
            }
        }
    }

    fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// A relay that answers every call with its resource and issues one
    /// host call of its own, forwarding the plugin's reply to `seen`.
    async fn spawn_relay(seen: mpsc::UnboundedSender<Value>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let host_call = PhoneFrame::new(RpcMessage::Call {
                uuid: 900,
                value: json!({ "action": "get", "resource": "interactiveState" }),
            });
            ws.send(Message::Text(serde_json::to_string(&host_call).unwrap().into()))
                .await
                .unwrap();

            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let frame: PhoneFrame = serde_json::from_str(&text).unwrap();
                match frame.content {
                    RpcMessage::Call { uuid, value } => {
                        if value["resource"] == "silence" {
                            continue;
                        }
                        let reply = PhoneFrame::new(RpcMessage::ReturnValue {
                            uuid,
                            value: json!({ "success": true, "values": value["resource"] }),
                        });
                        ws.send(Message::Text(serde_json::to_string(&reply).unwrap().into()))
                            .await
                            .unwrap();
                    }
                    RpcMessage::ReturnValue { uuid, value } => {
                        assert_eq!(uuid, 900);
                        let _ = seen.send(value);
                    }
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn calls_are_correlated_and_host_calls_answered() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let url = spawn_relay(seen_tx).await;
        let (transport, mut calls) = WsTransport::connect(&url, Duration::from_millis(500))
            .await
            .unwrap();

        let reply = transport
            .call(json!({ "action": "get", "resource": "interactiveFrame" }))
            .await;
        assert_eq!(
            reply,
            Some(json!({ "success": true, "values": "interactiveFrame" }))
        );

        let call = calls.recv().await.unwrap();
        assert_eq!(call.request().unwrap().resource, "interactiveState");
        call.respond(json!({ "success": true, "values": { "k": 1 } }));
        assert_eq!(
            seen_rx.recv().await.unwrap(),
            json!({ "success": true, "values": { "k": 1 } })
        );
    }

    #[tokio::test]
    async fn unanswered_call_times_out() {
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        let url = spawn_relay(seen_tx).await;
        let (transport, _calls) = WsTransport::connect(&url, Duration::from_millis(100))
            .await
            .unwrap();

        let reply = transport
            .call(json!({ "action": "get", "resource": "silence" }))
            .await;
        assert_eq!(reply, None);
        assert!(transport.pending.lock().is_empty());
    }
}
