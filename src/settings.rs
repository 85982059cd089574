use std::path::Path;

use pagecast_lib::{Config, PagecastError};

use crate::cli::Cli;

/// Merge CLI flags over the loaded config file; flags win when present.
pub fn resolve(cli: &Cli) -> Result<Config, PagecastError> {
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(viewport) = cli.resolution {
        config.viewport = viewport;
    }
    if let Some(bitrate) = cli.video_bitrate {
        config.stream.video_bitrate = bitrate;
    }
    if let Some(bitrate) = cli.audio_bitrate {
        config.stream.audio_bitrate = bitrate;
    }
    if let Some(rate) = cli.frame_rate {
        config.stream.frame_rate = rate;
    }
    if cli.executable.is_some() {
        config.browser.executable = cli.executable.clone();
    }
    if cli.profile_dir.is_some() {
        config.browser.profile_dir = cli.profile_dir.clone();
    }
    if cli.extension_dir.is_some() {
        config.browser.extension_dir = cli.extension_dir.clone();
    }
    if cli.minimize {
        config.browser.minimize_after_fit = true;
    }
    if cli.transcode {
        config.transcode.enabled = true;
    }

    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/pagecast/config.toml > defaults
fn load_config(path: Option<&Path>) -> Result<Config, PagecastError> {
    Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        PagecastError::Config(format!("Failed to read config {}: {}", loc, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["pagecast"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("valid args")
    }

    #[test]
    fn flags_override_defaults() {
        let cli = cli(&[
            "--port",
            "8080",
            "--resolution",
            "1280x720",
            "--video-bitrate",
            "2000000",
            "--transcode",
        ]);
        let config = resolve(&cli).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.stream.video_bitrate, 2_000_000);
        assert!(config.transcode.enabled);
        // untouched values stay at defaults
        assert_eq!(config.stream.audio_bitrate, 128_000);
        assert!(!config.browser.minimize_after_fit);
    }

    #[test]
    fn no_flags_keeps_defaults() {
        let config = resolve(&cli(&[])).unwrap();
        assert_eq!(config.port, 5589);
        assert_eq!(config.viewport.width, 1920);
    }

    #[test]
    fn invalid_resolution_is_rejected_by_clap() {
        let result = Cli::try_parse_from(["pagecast", "--resolution", "garbage"]);
        assert!(result.is_err());
    }

    #[test]
    fn zero_bitrate_flag_fails_validation() {
        let cli = cli(&["--video-bitrate", "0"]);
        assert!(resolve(&cli).is_err());
    }
}
