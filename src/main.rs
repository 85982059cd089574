mod cli;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pagecast_lib::{
    AppState, BrowserSessionManager, CapturePipeline, Config, SessionOptions, WsCaptureAgent,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    let config = match settings::resolve(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> pagecast_lib::Result<()> {
    let manager = Arc::new(BrowserSessionManager::new(SessionOptions::from_config(
        &config,
    )));
    let agent = Arc::new(WsCaptureAgent::bind(config.timeouts.negotiation).await?);
    let pipeline = CapturePipeline::new(manager.clone(), agent, config.clone());

    let state = Arc::new(AppState {
        pipeline,
        config: config.clone(),
    });
    let app = pagecast_lib::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "pagecast listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown().await;
    info!("pagecast stopped");
    Ok(())
}

/// Resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pagecast=debug,pagecast_lib=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
