//! Minimal Chrome DevTools Protocol client.
//!
//! One WebSocket connection per page target. Commands are JSON-RPC style:
//! an id-tagged request, answered by an id-tagged response; everything else
//! arriving on the socket is an event. A reader task routes responses to
//! per-command oneshot channels and fans events out on a broadcast channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, trace, warn};

use crate::error::{BrowserError, Result};

/// Per-command response timeout.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered events before slow subscribers start lagging.
const EVENT_BUFFER: usize = 256;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// A protocol event pushed by the browser (`method` + `params`).
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
}

/// A live DevTools connection to one target.
pub struct CdpConnection {
    next_id: AtomicU64,
    writer: Mutex<WsSink>,
    pending: PendingMap,
    events: broadcast::Sender<CdpEvent>,
    reader: JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to a target's WebSocket debugger URL.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (stream, _response) = connect_async(ws_url).await?;
        let (writer, mut read) = stream.split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let pending_reader = pending.clone();
        let events_reader = events.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };

                let value: Value = match serde_json::from_str(text.as_str()) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(error = %e, "discarding unparseable CDP message");
                        continue;
                    }
                };

                if let Some(id) = value.get("id").and_then(Value::as_u64) {
                    let completion = pending_reader.lock().await.remove(&id);
                    if let Some(tx) = completion {
                        let outcome = match value.get("error") {
                            Some(error) => Err(BrowserError::Protocol(
                                error
                                    .get("message")
                                    .and_then(Value::as_str)
                                    .unwrap_or("unknown CDP error")
                                    .to_string(),
                            )),
                            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                } else if let Some(method) = value.get("method").and_then(Value::as_str) {
                    trace!(method, "CDP event");
                    let _ = events_reader.send(CdpEvent {
                        method: method.to_string(),
                        params: value.get("params").cloned().unwrap_or(Value::Null),
                    });
                }
            }

            debug!("CDP reader finished; failing pending commands");
            for (_, tx) in pending_reader.lock().await.drain() {
                let _ = tx.send(Err(BrowserError::Closed));
            }
        });

        Ok(Self {
            next_id: AtomicU64::new(1),
            writer: Mutex::new(writer),
            pending,
            events,
            reader,
        })
    }

    /// Subscribe to protocol events.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Issue a command and await its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = json!({ "id": id, "method": method, "params": params }).to_string();
        trace!(id, method, "CDP call");

        if let Err(e) = self.writer.lock().await.send(Message::Text(request.into())).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BrowserError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(BrowserError::Timeout("CDP command response"))
            }
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
