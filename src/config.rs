use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PagecastError, Result};
use crate::Viewport;

/// File-backed configuration. Every field has a default so a missing or
/// partial config file is fine; CLI flags override on top (see the binary's
/// settings layer).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub port: u16,
    pub viewport: Viewport,
    pub stream: StreamSettings,
    pub browser: BrowserSettings,
    pub transcode: TranscodeSettings,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StreamSettings {
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    /// Floor, not a cap: the capture agent is asked for at least this rate.
    pub frame_rate: u32,
    pub mime_type: String,
    /// Milliseconds of media per recorded chunk.
    pub frame_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserSettings {
    /// Explicit browser executable; platform lookup applies when unset.
    pub executable: Option<PathBuf>,
    /// Persistent profile directory; defaults to ./chromedata.
    pub profile_dir: Option<PathBuf>,
    /// Directory containing the unpacked capture-agent extension.
    pub extension_dir: Option<PathBuf>,
    /// Minimize the window after geometry fit. Off by default: some
    /// platforms suspend rendering for minimized windows.
    pub minimize_after_fit: bool,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TranscodeSettings {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    pub content_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub launch: Duration,
    /// Settle delay after opening a context, before negotiating capture.
    #[serde(with = "humantime_serde")]
    pub context_settle: Duration,
    #[serde(with = "humantime_serde")]
    pub negotiation: Duration,
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    /// Default timeout for recipe wait steps that do not carry their own.
    #[serde(with = "humantime_serde")]
    pub recipe_wait: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            video_bitrate: 5_000_000,
            audio_bitrate: 128_000,
            frame_rate: 60,
            mime_type: "video/webm;codecs=H264".to_string(),
            frame_size: 1000,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            profile_dir: None,
            extension_dir: None,
            minimize_after_fit: false,
            extra_args: Vec::new(),
        }
    }
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "ffmpeg".to_string(),
            args: vec![
                "-hide_banner".to_string(),
                "-loglevel".to_string(),
                "error".to_string(),
                "-i".to_string(),
                "pipe:0".to_string(),
                "-c".to_string(),
                "copy".to_string(),
                "-f".to_string(),
                "matroska".to_string(),
                "pipe:1".to_string(),
            ],
            content_type: "video/x-matroska".to_string(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            launch: Duration::from_secs(30),
            context_settle: Duration::from_millis(500),
            negotiation: Duration::from_secs(15),
            navigation: Duration::from_secs(30),
            recipe_wait: Duration::from_secs(10),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5589,
            viewport: Viewport::default(),
            stream: StreamSettings::default(),
            browser: BrowserSettings::default(),
            transcode: TranscodeSettings::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    /// Load config from an explicit path, the central config file, or
    /// defaults. Priority: explicit path > ~/.config/pagecast/config.toml >
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::central_config_path().filter(|p| p.exists()),
        };

        let Some(file) = candidate else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(&file)?;
        toml::from_str(&raw).map_err(|e| {
            PagecastError::Config(format!("Failed to parse {}: {}", file.display(), e))
        })
    }

    pub fn central_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config/pagecast/config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(PagecastError::Config(
                "viewport dimensions must be positive".to_string(),
            ));
        }
        if self.stream.video_bitrate == 0 || self.stream.audio_bitrate == 0 {
            return Err(PagecastError::Config(
                "bitrates must be positive".to_string(),
            ));
        }
        if self.stream.frame_rate == 0 {
            return Err(PagecastError::Config(
                "frame-rate floor must be positive".to_string(),
            ));
        }
        if self.transcode.enabled && self.transcode.command.is_empty() {
            return Err(PagecastError::Config(
                "transcode enabled but no command configured".to_string(),
            ));
        }
        Ok(())
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.browser
            .profile_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("chromedata"))
    }
}
