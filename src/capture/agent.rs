//! Capture-stream negotiation with the in-page capture agent.
//!
//! The agent extension records the active tab and ships the encoded media
//! over a loopback WebSocket. Negotiation hands the page a one-shot id and
//! the bridge port, then waits for the extension to connect back with that
//! id; the connection's binary frames become the capture byte stream.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chromiumoxide::Page;
use futures::{SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::{PagecastError, Result};

/// Media parameters handed to the capture agent, mirroring the recorder
/// options it forwards to the tab-capture API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaConstraints {
    pub width: u32,
    pub height: u32,
    pub min_frame_rate: u32,
    pub video_bits_per_second: u32,
    pub audio_bits_per_second: u32,
    pub mime_type: String,
    /// Milliseconds of media per recorded chunk.
    pub frame_size: u32,
}

/// Continuous capture output. Ends when the agent closes its bridge
/// connection or the browser goes away.
pub struct ByteStream {
    rx: mpsc::Receiver<Bytes>,
}

impl ByteStream {
    /// Channel-backed stream; the sender side is fed by the bridge (or by
    /// tests).
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, ByteStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, ByteStream { rx })
    }
}

impl Stream for ByteStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

/// Capability to obtain a live media byte stream out of a browsing context.
#[async_trait]
pub trait CaptureAgent: Send + Sync {
    async fn negotiate(&self, page: &Page, constraints: &MediaConstraints) -> Result<ByteStream>;
}

type Waiters = Arc<Mutex<HashMap<u64, oneshot::Sender<ByteStream>>>>;

/// Production agent: loopback WebSocket bridge to the capture extension.
pub struct WsCaptureAgent {
    port: u16,
    waiters: Waiters,
    next_id: AtomicU64,
    negotiation_timeout: Duration,
    accept_task: JoinHandle<()>,
}

impl WsCaptureAgent {
    /// Bind the bridge on an ephemeral loopback port and start accepting
    /// extension connections.
    pub async fn bind(negotiation_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));
        let accept_task = tokio::spawn(accept_loop(listener, waiters.clone()));
        debug!(port, "capture bridge listening");
        Ok(Self {
            port,
            waiters,
            next_id: AtomicU64::new(1),
            negotiation_timeout,
            accept_task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn register(&self) -> (u64, oneshot::Receiver<ByteStream>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);
        (id, rx)
    }

    async fn unregister(&self, id: u64) {
        self.waiters.lock().await.remove(&id);
    }
}

impl Drop for WsCaptureAgent {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

#[async_trait]
impl CaptureAgent for WsCaptureAgent {
    async fn negotiate(&self, page: &Page, constraints: &MediaConstraints) -> Result<ByteStream> {
        let (id, offer) = self.register().await;

        // Tab capture records the active tab, so the context must be
        // focused before the agent starts.
        if let Err(e) = page.bring_to_front().await {
            self.unregister(id).await;
            return Err(PagecastError::negotiation(format!("activate context: {e}")));
        }

        let payload = serde_json::json!({
            "id": id,
            "port": self.port,
            "constraints": constraints,
        });
        let hook = format!(
            "window.__pagecastStart ? (window.__pagecastStart({payload}), true) : false"
        );
        let accepted: bool = match page.evaluate(hook).await {
            Ok(result) => result.into_value().unwrap_or(false),
            Err(e) => {
                self.unregister(id).await;
                return Err(PagecastError::negotiation(format!("agent call: {e}")));
            }
        };
        if !accepted {
            self.unregister(id).await;
            return Err(PagecastError::negotiation(
                "capture agent not present in context",
            ));
        }

        match timeout(self.negotiation_timeout, offer).await {
            Ok(Ok(stream)) => {
                debug!(id, "capture stream negotiated");
                Ok(stream)
            }
            Ok(Err(_)) => {
                self.unregister(id).await;
                Err(PagecastError::negotiation("capture bridge dropped"))
            }
            Err(_) => {
                self.unregister(id).await;
                Err(PagecastError::negotiation(format!(
                    "no capture offer within {:?}",
                    self.negotiation_timeout
                )))
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, waiters: Waiters) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "capture bridge accept error");
                continue;
            }
        };
        let waiters = waiters.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, waiters).await {
                debug!(peer = %peer, error = %e, "capture bridge connection ended");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, waiters: Waiters) -> Result<()> {
    let mut query: Option<String> = None;
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        query = req.uri().query().map(|q| q.to_string());
        Ok(resp)
    })
    .await
    .map_err(|e| PagecastError::negotiation(format!("bridge handshake: {e}")))?;

    let id = query
        .as_deref()
        .and_then(parse_negotiation_id)
        .ok_or_else(|| PagecastError::negotiation("bridge connection without id"))?;

    let Some(waiter) = waiters.lock().await.remove(&id) else {
        // Late or duplicate connection; nobody is waiting for this id.
        let _ = ws.send(Message::Close(None)).await;
        return Err(PagecastError::negotiation(format!(
            "no pending negotiation for id {id}"
        )));
    };

    let (bytes_tx, byte_stream) = ByteStream::channel(64);
    if waiter.send(byte_stream).is_err() {
        // Negotiation timed out while the extension was connecting.
        let _ = ws.send(Message::Close(None)).await;
        return Ok(());
    }

    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                if bytes_tx.send(Bytes::from(data)).await.is_err() {
                    // Consumer gone; closing the socket tells the agent to
                    // stop recording.
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    Ok(())
}

fn parse_negotiation_id(query: &str) -> Option<u64> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == "id" {
            value.parse().ok()
        } else {
            None
        }
    })
}
