//! Pagecast Library
//!
//! Drives a shared browser process to render live video pages and re-exposes
//! the rendered audio/video as continuous HTTP byte streams, so DVR-style
//! consumers can treat browser-only sources as ordinary network streams.
//!
//! # Module Overview
//!
//! - [`browser`] - Shared browser process ownership and window geometry
//! - [`capture`] - Per-request capture sessions, negotiation and pipeline
//! - [`recipes`] - Site automation recipes per destination
//! - [`destinations`] - Destination alias catalog
//! - [`sink`] - Output sinks (HTTP body, transcode subprocess)
//! - [`server`] - HTTP routes
//! - [`config`] - Configuration file support
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagecast_lib::{
//!     AppState, BrowserSessionManager, CapturePipeline, Config, SessionOptions, WsCaptureAgent,
//! };
//!
//! # async fn example() -> pagecast_lib::Result<()> {
//! let config = Config::default();
//! let manager = Arc::new(BrowserSessionManager::new(SessionOptions::from_config(&config)));
//! let agent = Arc::new(WsCaptureAgent::bind(config.timeouts.negotiation).await?);
//! let pipeline = CapturePipeline::new(manager, agent, config.clone());
//! let app = pagecast_lib::router(Arc::new(AppState { pipeline, config }));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod capture;
pub mod config;
pub mod destinations;
pub mod error;
pub mod recipes;
pub mod server;
pub mod sink;
pub mod viewport;

// Browser module re-exports
pub use browser::{
    fit_window, BrowserHandle, BrowserSessionManager, SessionOptions, WindowGeometry,
};
// Capture module re-exports
pub use capture::{
    ByteStream, CaptureAgent, CapturePipeline, CaptureRequest, CaptureSession, MediaConstraints,
    Phase, WsCaptureAgent,
};
pub use capture::request::StreamOverrides;
pub use config::Config;
pub use destinations::Destination;
pub use error::{PagecastError, Result};
pub use recipes::{InputAction, Recipe, RecipeBook, RecipeOutcome, Step};
pub use server::{router, AppState};
pub use sink::{HttpSink, OutputSink, TranscodeSink};
pub use viewport::Viewport;
