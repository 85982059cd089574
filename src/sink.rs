//! Output sinks: where negotiated capture bytes go.
//!
//! Either straight into an HTTP response body (`HttpSink`) or through a
//! remux/transcode subprocess whose stdout feeds the response
//! (`TranscodeSink`). Both expose a disconnect token so the owning capture
//! session notices a dead consumer even while the source is quiet.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TranscodeSettings;
use crate::error::{PagecastError, Result};

/// Consumer of a capture byte stream.
#[async_trait]
pub trait OutputSink: Send {
    /// Forward one chunk. An error means the consumer is gone and the
    /// capture session should close.
    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;

    /// Clean end-of-stream. Idempotent.
    async fn end(&mut self);

    /// Token cancelled when the consumer disconnects.
    fn disconnected(&self) -> CancellationToken;
}

/// Bounded channel whose receiving half is an HTTP body stream. Chunks sent
/// before the body is first polled sit in the channel, so bytes produced
/// while navigation is still in flight are not dropped.
pub fn body_channel(capacity: usize) -> (mpsc::Sender<Bytes>, impl Stream<Item = io::Result<Bytes>>) {
    let (tx, rx) = mpsc::channel::<Bytes>(capacity);
    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok(chunk), rx))
    });
    (tx, body)
}

/// Channel-backed sink feeding an HTTP response body directly.
pub struct HttpSink {
    tx: Option<mpsc::Sender<Bytes>>,
    gone: CancellationToken,
    ended: CancellationToken,
    _watcher: JoinHandle<()>,
}

impl HttpSink {
    /// Sink plus the body stream the HTTP layer hands to the response.
    pub fn channel(capacity: usize) -> (HttpSink, impl Stream<Item = io::Result<Bytes>>) {
        let (tx, body) = body_channel(capacity);

        let gone = CancellationToken::new();
        let ended = CancellationToken::new();
        // The watcher's sender clone would keep the body open past end(),
        // so it also listens for the ended signal and drops out.
        let watcher = {
            let tx = tx.clone();
            let gone = gone.clone();
            let ended = ended.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tx.closed() => gone.cancel(),
                    _ = ended.cancelled() => {}
                }
            })
        };

        (
            HttpSink {
                tx: Some(tx),
                gone,
                ended,
                _watcher: watcher,
            },
            body,
        )
    }
}

impl Drop for HttpSink {
    fn drop(&mut self) {
        self.ended.cancel();
    }
}

#[async_trait]
impl OutputSink for HttpSink {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink ended"));
        };
        tx.send(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "consumer disconnected"))
    }

    async fn end(&mut self) {
        // Dropping the sender terminates the body stream once drained.
        self.tx.take();
        self.ended.cancel();
    }

    fn disconnected(&self) -> CancellationToken {
        self.gone.clone()
    }
}

/// Pipes capture bytes through a remux/transcode subprocess (ffmpeg by
/// default); the subprocess's stdout feeds the downstream channel.
pub struct TranscodeSink {
    stdin: Option<ChildStdin>,
    _child: Child,
    downstream_gone: CancellationToken,
    _pump: JoinHandle<()>,
}

impl TranscodeSink {
    pub fn spawn(settings: &TranscodeSettings, downstream: mpsc::Sender<Bytes>) -> Result<Self> {
        let mut child = Command::new(&settings.command)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PagecastError::Config(format!("spawn transcoder {}: {e}", settings.command))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PagecastError::Config("transcoder stdin unavailable".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| PagecastError::Config("transcoder stdout unavailable".to_string()))?;

        let downstream_gone = CancellationToken::new();
        let token = downstream_gone.clone();
        let pump = tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => {
                        debug!("transcoder output ended");
                        break;
                    }
                    Ok(n) => {
                        if downstream
                            .send(Bytes::copy_from_slice(&buf[..n]))
                            .await
                            .is_err()
                        {
                            token.cancel();
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "transcoder read failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            stdin: Some(stdin),
            _child: child,
            downstream_gone,
            _pump: pump,
        })
    }
}

#[async_trait]
impl OutputSink for TranscodeSink {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink ended"));
        };
        stdin.write_all(&chunk).await
    }

    async fn end(&mut self) {
        // Dropping stdin sends EOF so the transcoder can flush and exit.
        self.stdin.take();
    }

    fn disconnected(&self) -> CancellationToken {
        self.downstream_gone.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::pin::pin;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn http_sink_buffers_chunks_until_body_is_read() {
        let (mut sink, body) = HttpSink::channel(8);

        // Written before anyone polls the body.
        sink.write(Bytes::from_static(b"early-1")).await.unwrap();
        sink.write(Bytes::from_static(b"early-2")).await.unwrap();
        sink.end().await;

        let mut body = pin!(body);
        assert_eq!(body.next().await.unwrap().unwrap().as_ref(), b"early-1");
        assert_eq!(body.next().await.unwrap().unwrap().as_ref(), b"early-2");
        assert!(body.next().await.is_none(), "end() terminates the body");
    }

    #[tokio::test]
    async fn http_sink_write_fails_after_consumer_drops() {
        let (mut sink, body) = HttpSink::channel(1);
        drop(body);

        let err = sink.write(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn http_sink_disconnect_token_fires_when_consumer_drops() {
        let (sink, body) = HttpSink::channel(1);
        let gone = sink.disconnected();
        assert!(!gone.is_cancelled());

        drop(body);
        timeout(Duration::from_secs(2), gone.cancelled())
            .await
            .expect("disconnect observed");
    }

    #[tokio::test]
    async fn http_sink_write_after_end_errors() {
        let (mut sink, _body) = HttpSink::channel(1);
        sink.end().await;
        assert!(sink.write(Bytes::from_static(b"x")).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn transcode_sink_pipes_through_subprocess() {
        // `cat` stands in for the remuxer: stdin copied verbatim to stdout.
        let settings = TranscodeSettings {
            enabled: true,
            command: "cat".to_string(),
            args: vec![],
            content_type: "application/octet-stream".to_string(),
        };
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = TranscodeSink::spawn(&settings, tx).unwrap();

        sink.write(Bytes::from_static(b"payload")).await.unwrap();
        sink.end().await;

        let mut collected = Vec::new();
        while let Some(chunk) = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("transcoder output in time")
        {
            collected.extend_from_slice(&chunk);
            if collected.len() >= 7 {
                break;
            }
        }
        assert_eq!(&collected, b"payload");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn transcode_sink_spawn_fails_for_missing_command() {
        let settings = TranscodeSettings {
            enabled: true,
            command: "definitely-not-a-remuxer".to_string(),
            args: vec![],
            content_type: "video/x-matroska".to_string(),
        };
        let (tx, _rx) = mpsc::channel(1);
        assert!(TranscodeSink::spawn(&settings, tx).is_err());
    }
}
