use clap::Parser;
use pagecast_lib::Viewport;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagecast")]
#[command(
    version,
    about = "Pagecast - Relay browser-rendered live video as HTTP byte streams",
    long_about = "Pagecast\n\nStarts an HTTP server that drives a shared browser to render live\nvideo pages (streaming TV, weather radar, IPTV portals) and exposes the\nrendered audio/video as continuous byte streams.\n\nEndpoints:\n- /stream/<name>: capture a catalog destination\n- /stream?url=...: capture an arbitrary page\n- /playlist.m3u: M3U playlist of the catalog\n\nFlags override values from the config file."
)]
pub struct Cli {
    #[arg(long, help = "Listen port")]
    pub port: Option<u16>,

    #[arg(
        long,
        value_name = "WIDTHxHEIGHT",
        help = "Capture resolution (e.g., 1920x1080)"
    )]
    pub resolution: Option<Viewport>,

    #[arg(long, help = "Video bitrate in bits per second")]
    pub video_bitrate: Option<u32>,

    #[arg(long, help = "Audio bitrate in bits per second")]
    pub audio_bitrate: Option<u32>,

    #[arg(long, help = "Minimum capture frame rate")]
    pub frame_rate: Option<u32>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Browser executable (auto-detected if omitted)"
    )]
    pub executable: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Persistent browser profile directory")]
    pub profile_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Directory of the unpacked capture-agent extension"
    )]
    pub extension_dir: Option<PathBuf>,

    #[arg(
        long,
        help = "Minimize the browser window after sizing (only where minimizing keeps rendering)"
    )]
    pub minimize: bool,

    #[arg(long, help = "Pipe capture output through the configured transcoder")]
    pub transcode: bool,

    #[arg(
        long,
        value_name = "PATH",
        help = "Optional config file (TOML) to set defaults; CLI flags override config"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}
