//! Per-request capture orchestration: stream negotiation, session lifecycle
//! and the pipeline tying browser, recipes, geometry and sink together.

pub mod agent;
pub mod pipeline;
pub mod request;
pub mod session;

pub use agent::{ByteStream, CaptureAgent, MediaConstraints, WsCaptureAgent};
pub use pipeline::CapturePipeline;
pub use request::CaptureRequest;
pub use session::{CaptureSession, Phase};
