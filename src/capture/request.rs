//! One client-initiated capture, resolved from config defaults plus
//! per-request overrides. Immutable once built.

use serde::Deserialize;
use url::Url;

use crate::capture::agent::MediaConstraints;
use crate::config::Config;
use crate::destinations;
use crate::error::Result;
use crate::Viewport;

/// Optional per-request parameters, deserialized straight from the HTTP
/// query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamOverrides {
    /// Literal target URL; ignored when a destination alias is present.
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(alias = "videoBitrate")]
    pub video_bitrate: Option<u32>,
    #[serde(alias = "audioBitrate")]
    pub audio_bitrate: Option<u32>,
    #[serde(alias = "frameRate")]
    pub frame_rate: Option<u32>,
    #[serde(alias = "waitForMedia")]
    pub wait_for_media: Option<bool>,
    /// Channel name typed into destination portals with a search flow.
    pub channel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub target: Url,
    /// Alias the recipe registry keys on; None for literal-URL requests.
    pub destination: Option<String>,
    pub viewport: Viewport,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub frame_rate: u32,
    pub mime_type: String,
    pub frame_size: u32,
    pub wait_for_media: bool,
    /// Channel name for destination portals with a search flow.
    pub channel: Option<String>,
}

impl CaptureRequest {
    /// Resolve a request from a destination alias and/or literal URL plus
    /// query overrides, on top of configured defaults.
    pub fn resolve(config: &Config, alias: Option<&str>, overrides: &StreamOverrides) -> Result<Self> {
        let target = destinations::resolve_target(alias, overrides.url.as_deref())?;
        let destination = alias.map(|a| a.to_ascii_lowercase());
        let default_wait = alias
            .and_then(destinations::find)
            .map(|d| d.wait_for_media)
            .unwrap_or(true);

        Ok(Self {
            target,
            destination,
            viewport: Viewport {
                width: overrides.width.unwrap_or(config.viewport.width),
                height: overrides.height.unwrap_or(config.viewport.height),
            },
            video_bitrate: overrides
                .video_bitrate
                .unwrap_or(config.stream.video_bitrate),
            audio_bitrate: overrides
                .audio_bitrate
                .unwrap_or(config.stream.audio_bitrate),
            frame_rate: overrides.frame_rate.unwrap_or(config.stream.frame_rate),
            mime_type: config.stream.mime_type.clone(),
            frame_size: config.stream.frame_size,
            wait_for_media: overrides.wait_for_media.unwrap_or(default_wait),
            channel: overrides.channel.clone(),
        })
    }

    pub fn constraints(&self) -> MediaConstraints {
        MediaConstraints {
            width: self.viewport.width,
            height: self.viewport.height,
            min_frame_rate: self.frame_rate,
            video_bits_per_second: self.video_bitrate,
            audio_bits_per_second: self.audio_bitrate,
            mime_type: self.mime_type.clone(),
            frame_size: self.frame_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_uses_config_defaults() {
        let config = Config::default();
        let overrides = StreamOverrides {
            url: Some("https://example.com/live".to_string()),
            ..StreamOverrides::default()
        };
        let request = CaptureRequest::resolve(&config, None, &overrides).unwrap();

        assert_eq!(request.viewport.width, 1920);
        assert_eq!(request.video_bitrate, 5_000_000);
        assert_eq!(request.audio_bitrate, 128_000);
        assert_eq!(request.frame_rate, 60);
        assert!(request.wait_for_media, "literal URLs default to waiting");
        assert!(request.destination.is_none());
    }

    #[test]
    fn resolve_applies_overrides() {
        let config = Config::default();
        let overrides = StreamOverrides {
            width: Some(1280),
            height: Some(720),
            video_bitrate: Some(2_000_000),
            frame_rate: Some(30),
            ..StreamOverrides::default()
        };
        let request = CaptureRequest::resolve(&config, Some("nbc"), &overrides).unwrap();

        assert_eq!(request.viewport.width, 1280);
        assert_eq!(request.viewport.height, 720);
        assert_eq!(request.video_bitrate, 2_000_000);
        assert_eq!(request.frame_rate, 30);
        assert_eq!(request.destination.as_deref(), Some("nbc"));
    }

    #[test]
    fn weatherscan_alias_disables_media_wait_by_default() {
        let config = Config::default();
        let request =
            CaptureRequest::resolve(&config, Some("weatherscan"), &StreamOverrides::default())
                .unwrap();
        assert!(!request.wait_for_media);

        // explicit override wins over the catalog default
        let overrides = StreamOverrides {
            wait_for_media: Some(true),
            ..StreamOverrides::default()
        };
        let request =
            CaptureRequest::resolve(&config, Some("weatherscan"), &overrides).unwrap();
        assert!(request.wait_for_media);
    }

    #[test]
    fn constraints_mirror_request() {
        let config = Config::default();
        let overrides = StreamOverrides {
            url: Some("https://example.com/".to_string()),
            ..StreamOverrides::default()
        };
        let request = CaptureRequest::resolve(&config, None, &overrides).unwrap();
        let constraints = request.constraints();
        assert_eq!(constraints.width, request.viewport.width);
        assert_eq!(constraints.min_frame_rate, request.frame_rate);
        assert_eq!(constraints.mime_type, request.mime_type);
    }

    #[test]
    fn resolve_rejects_unknown_alias() {
        let config = Config::default();
        assert!(
            CaptureRequest::resolve(&config, Some("nope"), &StreamOverrides::default()).is_err()
        );
    }
}
