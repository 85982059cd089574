//! Per-request capture orchestration.
//!
//! `open` walks one request through the full sequence: acquire the shared
//! browser, open an isolated context, negotiate the capture stream, bind it
//! to the output sink, then navigate, automate and fit geometry. Streaming
//! starts before navigation on purpose: bytes produced while the page is
//! still loading belong to the client, and a slow navigation must not starve
//! the connection. Failures before the stream is bound close the context and
//! surface to the caller; everything after is best-effort and log-only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chromiumoxide::cdp::browser_protocol::page::SetBypassCspParams;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::browser::geometry;
use crate::browser::session::BrowserSessionManager;
use crate::capture::agent::CaptureAgent;
use crate::capture::request::CaptureRequest;
use crate::capture::session::{spawn_forwarder, CaptureSession, Phase};
use crate::config::Config;
use crate::error::{PagecastError, Result};
use crate::recipes::RecipeBook;
use crate::sink::OutputSink;

pub struct CapturePipeline {
    browser: Arc<BrowserSessionManager>,
    agent: Arc<dyn CaptureAgent>,
    config: Config,
    next_session_id: AtomicU64,
    /// Most recently opened session, for the debug input endpoints. Weak on
    /// purpose: holding it must not delay teardown. Last-created is an
    /// inherently racy focus model under concurrent sessions; callers of the
    /// debug surface accept that.
    active: Mutex<Weak<CaptureSession>>,
}

impl CapturePipeline {
    pub fn new(
        browser: Arc<BrowserSessionManager>,
        agent: Arc<dyn CaptureAgent>,
        config: Config,
    ) -> Self {
        Self {
            browser,
            agent,
            config,
            next_session_id: AtomicU64::new(1),
            active: Mutex::new(Weak::new()),
        }
    }

    /// Open a capture session for the request and start forwarding bytes
    /// into the sink. On error nothing is left behind: any context created
    /// along the way is closed before returning.
    pub async fn open(
        &self,
        request: CaptureRequest,
        sink: Box<dyn OutputSink>,
    ) -> Result<Arc<CaptureSession>> {
        let browser = self.browser.acquire().await?;

        let page = browser.new_context().await?;
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = CaptureSession::new(id, request.destination.clone(), page.clone());
        info!(
            session = id,
            target = %request.target,
            destination = request.destination.as_deref().unwrap_or("-"),
            "opening capture session"
        );

        session.advance(Phase::ContextOpen);

        // Target pages may block the capture agent or injected styles
        // otherwise.
        if let Err(e) = page.execute(SetBypassCspParams::new(true)).await {
            session.fail().await;
            return Err(PagecastError::cdp(format!("csp bypass: {e}")));
        }
        // Give the fresh context a moment to finish initializing before the
        // capture handshake.
        tokio::time::sleep(self.config.timeouts.context_settle).await;

        let stream = match self.agent.negotiate(&page, &request.constraints()).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session = id, error = %e, "capture negotiation failed");
                session.fail().await;
                return Err(e);
            }
        };
        session.advance(Phase::StreamBound);

        // Bind the stream to the sink before navigating.
        spawn_forwarder(session.clone(), stream, sink);

        session.advance(Phase::Navigating);
        let nav = timeout(
            self.config.timeouts.navigation,
            page.goto(request.target.as_str()),
        )
        .await;
        match nav {
            Ok(Ok(_)) => debug!(session = id, "navigation complete"),
            // The stream is already flowing; a dead target yields blank
            // frames, which is still a usable signal for the caller.
            Ok(Err(e)) => warn!(session = id, error = %e, "navigation failed; streaming continues"),
            Err(_) => warn!(
                session = id,
                timeout = ?self.config.timeouts.navigation,
                "navigation timed out; streaming continues"
            ),
        }

        session.advance(Phase::Automating);
        let outcome = RecipeBook::run(&page, &request).await;
        if outcome.is_degraded() {
            debug!(session = id, outcome = ?outcome, "recipe degraded");
        }

        // After automation so the measured inset reflects the final layout.
        if let Err(e) = geometry::fit_window(
            &page,
            request.viewport,
            self.config.browser.minimize_after_fit,
        )
        .await
        {
            warn!(session = id, error = %e, "window fit failed; capture stays unsized");
        }

        session.advance(Phase::Live);
        info!(session = id, "capture session live");

        *self.active.lock().unwrap() = Arc::downgrade(&session);
        Ok(session)
    }

    /// Always-safe teardown; delegates to the session's idempotent close.
    pub async fn close(&self, session: &CaptureSession) {
        session.close().await;
    }

    /// The most recently opened session, if it is still alive. See the
    /// field note: not a stable reference under concurrent sessions.
    pub fn active_session(&self) -> Option<Arc<CaptureSession>> {
        self.active.lock().unwrap().upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::session::SessionOptions;
    use crate::capture::agent::{ByteStream, MediaConstraints};
    use async_trait::async_trait;
    use chromiumoxide::Page;

    struct RefusingAgent;

    #[async_trait]
    impl CaptureAgent for RefusingAgent {
        async fn negotiate(
            &self,
            _page: &Page,
            _constraints: &MediaConstraints,
        ) -> Result<ByteStream> {
            Err(PagecastError::negotiation("refused"))
        }
    }

    #[test]
    fn active_session_is_empty_before_any_open() {
        let pipeline = CapturePipeline::new(
            Arc::new(BrowserSessionManager::new(SessionOptions::default())),
            Arc::new(RefusingAgent),
            Config::default(),
        );
        assert!(pipeline.active_session().is_none());
    }
}
