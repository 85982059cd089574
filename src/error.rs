use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum PagecastError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser protocol error: {0}")]
    Cdp(String),

    #[error("Capture negotiation failed: {0}")]
    Negotiation(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Unknown destination: {0}")]
    UnknownDestination(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PagecastError {
    pub fn launch(message: impl Into<String>) -> Self {
        PagecastError::Launch(message.into())
    }

    pub fn cdp(message: impl Into<String>) -> Self {
        PagecastError::Cdp(message.into())
    }

    pub fn negotiation(message: impl Into<String>) -> Self {
        PagecastError::Negotiation(message.into())
    }

    /// True when the failure happens before any bytes have been written,
    /// i.e. the HTTP caller still has a channel for a textual error body.
    pub fn is_pre_stream(&self) -> bool {
        !matches!(self, PagecastError::Navigation(_))
    }
}

pub type Result<T> = std::result::Result<T, PagecastError>;
