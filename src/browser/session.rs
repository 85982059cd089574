//! Ownership of the single shared browser process.
//!
//! The manager holds at most one live browser at a time. `acquire()` returns
//! the current session or launches one; callers arriving during a launch all
//! resolve to the same session because creation happens under the manager's
//! mutex. A disconnect (crash, external kill) flips the session's `connected`
//! flag through the CDP handler task, and the next `acquire()` relaunches.
//! Nothing here retries: a failed launch is surfaced to the caller, and the
//! caller's next request simply acquires again.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PagecastError, Result};
use crate::Viewport;

/// Launch arguments matching what live-TV pages expect from a desktop
/// browser: no first-run chrome, no restore bubbles, autoplay allowed.
const LAUNCH_ARGS: &[&str] = &[
    "--disable-notifications",
    "--no-first-run",
    "--disable-infobars",
    "--hide-crash-restore-bubble",
    "--autoplay-policy=no-user-gesture-required",
];

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub executable: Option<PathBuf>,
    pub profile_dir: PathBuf,
    /// Unpacked capture-agent extension; the browser refuses tab capture
    /// without it, but launching bare is still allowed for dry runs.
    pub extension_dir: Option<PathBuf>,
    pub window: Viewport,
    pub extra_args: Vec<String>,
    pub launch_timeout: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            executable: config.browser.executable.clone(),
            profile_dir: config.profile_dir(),
            extension_dir: config.browser.extension_dir.clone(),
            window: config.viewport,
            extra_args: config.browser.extra_args.clone(),
            launch_timeout: config.timeouts.launch,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Cheap handle onto the live session. Holding one keeps the browser
/// connection alive; it does not keep the manager from relaunching a fresh
/// process once this one reports disconnected.
#[derive(Clone)]
pub struct BrowserHandle {
    browser: Arc<Browser>,
    connected: Arc<AtomicBool>,
    generation: u64,
}

impl BrowserHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Monotonic launch counter; two handles with equal generation point at
    /// the same underlying process.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Open a fresh isolated browsing context. Each capture session gets its
    /// own; contexts are never shared.
    pub async fn new_context(&self) -> Result<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| PagecastError::cdp(format!("create context: {e}")))
    }
}

struct LiveSession {
    browser: Arc<Browser>,
    connected: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
    generation: u64,
}

impl LiveSession {
    fn handle(&self) -> BrowserHandle {
        BrowserHandle {
            browser: self.browser.clone(),
            connected: self.connected.clone(),
            generation: self.generation,
        }
    }
}

/// Lazily-launched singleton owner of the shared browser process.
pub struct BrowserSessionManager {
    options: SessionOptions,
    inner: Mutex<Option<LiveSession>>,
    generation: AtomicU64,
}

impl BrowserSessionManager {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            inner: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Return the live session, launching one if none exists or the previous
    /// process dropped the connection. Concurrent callers during a launch
    /// serialize on the manager mutex and all observe the session the first
    /// caller created.
    pub async fn acquire(&self) -> Result<BrowserHandle> {
        let mut guard = self.inner.lock().await;

        if let Some(session) = guard.as_ref() {
            if session.connected.load(Ordering::SeqCst)
                && session.browser.version().await.is_ok()
            {
                return Ok(session.handle());
            }
            warn!(
                generation = session.generation,
                "browser session lost; relaunching"
            );
            if let Some(stale) = guard.take() {
                teardown(stale).await;
            }
        }

        let session = self.launch().await?;
        let handle = session.handle();
        *guard = Some(session);
        Ok(handle)
    }

    async fn launch(&self) -> Result<LiveSession> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let opts = &self.options;

        let mut builder = BrowserConfig::builder()
            .with_head()
            .user_data_dir(&opts.profile_dir)
            .window_size(opts.window.width, opts.window.height)
            .args(LAUNCH_ARGS.iter().map(|s| s.to_string()));
        if let Some(exec) = &opts.executable {
            builder = builder.chrome_executable(exec);
        }
        if let Some(ext) = &opts.extension_dir {
            builder = builder.extension(ext.to_string_lossy().to_string());
        }
        for arg in &opts.extra_args {
            builder = builder.arg(arg.clone());
        }
        let config = builder.build().map_err(PagecastError::Launch)?;

        info!(
            generation,
            profile = %opts.profile_dir.display(),
            extension = opts.extension_dir.is_some(),
            "launching browser"
        );

        let (browser, mut handler) = timeout(opts.launch_timeout, Browser::launch(config))
            .await
            .map_err(|_| {
                PagecastError::launch(format!(
                    "timed out after {:?}",
                    opts.launch_timeout
                ))
            })?
            .map_err(|e| PagecastError::launch(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let watcher = connected.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            watcher.store(false, Ordering::SeqCst);
            warn!(generation, "browser connection closed");
        });

        let browser = Arc::new(browser);

        // A persistent profile can resurrect contexts from the previous
        // process (session restore); capture sessions must start clean. The
        // first tab stays: a browser with zero tabs exits.
        match browser.pages().await {
            Ok(pages) => {
                for page in pages.into_iter().skip(1) {
                    let _ = page.close().await;
                }
            }
            Err(e) => warn!(generation, error = %e, "could not list inherited contexts"),
        }

        debug!(generation, "browser ready");

        Ok(LiveSession {
            browser,
            connected,
            handler_task,
            generation,
        })
    }

    /// Close the browser and await process exit. Safe to call with no live
    /// session.
    pub async fn shutdown(&self) {
        let session = self.inner.lock().await.take();
        if let Some(session) = session {
            info!(generation = session.generation, "shutting down browser");
            session.connected.store(false, Ordering::SeqCst);
            match Arc::try_unwrap(session.browser) {
                Ok(mut browser) => {
                    if let Err(e) = browser.close().await {
                        warn!(error = %e, "browser close failed; killing");
                        let _ = browser.kill().await;
                    } else {
                        let _ = browser.wait().await;
                    }
                }
                // Outstanding handles keep the process alive until they
                // drop; the child is reaped with the last reference.
                Err(_) => debug!("browser still referenced by live captures"),
            }
            session.handler_task.abort();
        }
    }
}

async fn teardown(session: LiveSession) {
    session.connected.store(false, Ordering::SeqCst);
    if let Ok(mut browser) = Arc::try_unwrap(session.browser) {
        let _ = browser.kill().await;
    }
    session.handler_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_options_mirror_config() {
        let mut config = Config::default();
        config.browser.executable = Some(PathBuf::from("/usr/bin/chromium"));
        config.browser.extra_args = vec!["--mute-audio".to_string()];

        let opts = SessionOptions::from_config(&config);
        assert_eq!(opts.executable, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(opts.profile_dir, PathBuf::from("chromedata"));
        assert_eq!(opts.window.width, 1920);
        assert_eq!(opts.extra_args, vec!["--mute-audio".to_string()]);
        assert_eq!(opts.launch_timeout, Duration::from_secs(30));
    }

    #[test]
    fn launch_args_allow_autoplay() {
        assert!(LAUNCH_ARGS
            .iter()
            .any(|a| a.contains("autoplay-policy=no-user-gesture-required")));
    }

    #[tokio::test]
    async fn acquire_fails_for_missing_executable() {
        let manager = BrowserSessionManager::new(SessionOptions {
            executable: Some(PathBuf::from("/definitely/not/a/browser")),
            profile_dir: std::env::temp_dir().join("pagecast-test-profile"),
            launch_timeout: Duration::from_secs(5),
            ..SessionOptions::default()
        });

        let result = manager.acquire().await;
        assert!(matches!(result, Err(PagecastError::Launch(_))));
    }

    #[tokio::test]
    async fn shutdown_without_session_is_noop() {
        let manager = BrowserSessionManager::new(SessionOptions::default());
        manager.shutdown().await;
    }
}
