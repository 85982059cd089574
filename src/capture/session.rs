//! The live unit of work bound to one capture request: an isolated browsing
//! context, the negotiated byte stream and the output sink, torn down
//! together exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::capture::agent::ByteStream;
use crate::sink::OutputSink;

/// Capture lifecycle. `Closed` and `Failed` are terminal and mutually
/// exclusive: `Failed` is only reachable before streaming begins
/// (`ContextOpen`/`StreamBound`); later failures are logged, not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    ContextOpen,
    StreamBound,
    Navigating,
    Automating,
    Live,
    Closed,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Closed | Phase::Failed)
    }
}

/// Phase tracking plus the once-only termination gate, kept separate from
/// the browsing context so the teardown rules stand on their own.
struct Lifecycle {
    phase: Mutex<Phase>,
    shutdown: CancellationToken,
    terminated: AtomicBool,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Created),
            shutdown: CancellationToken::new(),
            terminated: AtomicBool::new(false),
        }
    }

    fn phase(&self) -> Phase {
        *self.phase.lock().unwrap()
    }

    fn advance(&self, next: Phase) {
        let mut phase = self.phase.lock().unwrap();
        if !phase.is_terminal() {
            *phase = next;
        }
    }

    /// Returns true exactly once; the winning caller performs teardown.
    fn begin_termination(&self, terminal: Phase) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shutdown.cancel();
        *self.phase.lock().unwrap() = terminal;
        true
    }
}

pub struct CaptureSession {
    id: u64,
    destination: Option<String>,
    page: Page,
    lifecycle: Lifecycle,
}

impl CaptureSession {
    pub(crate) fn new(id: u64, destination: Option<String>, page: Page) -> Arc<Self> {
        Arc::new(Self {
            id,
            destination,
            page,
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.lifecycle.shutdown.clone()
    }

    /// Advance the lifecycle; ignored once a terminal phase is reached so a
    /// racing close cannot be overwritten.
    pub(crate) fn advance(&self, next: Phase) {
        debug!(session = self.id, to = ?next, "capture phase");
        self.lifecycle.advance(next);
    }

    /// Normal teardown: cancel the forwarder, close the browsing context.
    /// Idempotent; racing invocations (disconnect vs. stream end) tear down
    /// once.
    pub async fn close(&self) {
        self.terminate(Phase::Closed).await
    }

    /// Pre-stream failure teardown; same cleanup, terminal phase `Failed`.
    pub(crate) async fn fail(&self) {
        self.terminate(Phase::Failed).await
    }

    async fn terminate(&self, terminal: Phase) {
        if !self.lifecycle.begin_termination(terminal) {
            return;
        }
        info!(session = self.id, phase = ?terminal, "capture session ended");
        if let Err(e) = self.page.clone().close().await {
            debug!(session = self.id, error = %e, "context close failed");
        }
    }
}

/// Pump the negotiated byte stream into the sink until the stream ends, the
/// consumer disconnects or the session shuts down. Started before
/// navigation so early bytes are never lost.
pub(crate) fn spawn_forwarder(
    session: Arc<CaptureSession>,
    mut stream: ByteStream,
    mut sink: Box<dyn OutputSink>,
) -> JoinHandle<()> {
    let shutdown = session.shutdown_token();
    let gone = sink.disconnected();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    sink.end().await;
                    break;
                }
                _ = gone.cancelled() => {
                    debug!(session = session.id, "consumer disconnected");
                    session.close().await;
                    break;
                }
                chunk = stream.next() => match chunk {
                    Some(bytes) => {
                        if sink.write(bytes).await.is_err() {
                            debug!(session = session.id, "sink rejected write");
                            session.close().await;
                            break;
                        }
                    }
                    None => {
                        debug!(session = session.id, "capture stream ended");
                        sink.end().await;
                        session.close().await;
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        assert!(Phase::Closed.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Live.is_terminal());
        assert!(!Phase::Created.is_terminal());
    }

    #[test]
    fn termination_gate_fires_once() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.begin_termination(Phase::Closed));
        assert!(!lifecycle.begin_termination(Phase::Closed));
        assert!(!lifecycle.begin_termination(Phase::Failed));
        assert_eq!(lifecycle.phase(), Phase::Closed);
    }

    #[test]
    fn termination_cancels_shutdown_token() {
        let lifecycle = Lifecycle::new();
        let token = lifecycle.shutdown.clone();
        assert!(!token.is_cancelled());
        lifecycle.begin_termination(Phase::Closed);
        assert!(token.is_cancelled());
    }

    #[test]
    fn advance_is_ignored_after_terminal() {
        let lifecycle = Lifecycle::new();
        lifecycle.advance(Phase::ContextOpen);
        assert_eq!(lifecycle.phase(), Phase::ContextOpen);

        lifecycle.begin_termination(Phase::Failed);
        lifecycle.advance(Phase::Live);
        assert_eq!(lifecycle.phase(), Phase::Failed);
    }

    #[test]
    fn closed_and_failed_are_exclusive() {
        // Whichever terminal state wins the gate sticks.
        let lifecycle = Lifecycle::new();
        lifecycle.begin_termination(Phase::Failed);
        assert!(!lifecycle.begin_termination(Phase::Closed));
        assert_eq!(lifecycle.phase(), Phase::Failed);
    }
}
