use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use tokio::signal;
use tracing::{error, info, warn};

use iptv_proxy::api::{ApiServer, ApiServerConfig, AppState};
use iptv_proxy::cli::{Args, Command, ServeArgs};
use iptv_proxy::config::ProxyConfig;
use iptv_proxy::upstream::{HttpOrigin, build_client};
use iptv_proxy::{healthcheck, logging};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();
    let args = Args::parse();

    match args.command {
        Some(Command::Healthcheck(check)) => {
            let url = check
                .url
                .unwrap_or_else(|| healthcheck::default_url(args.serve.port));
            match healthcheck::run(&url).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Some(Command::CheckEndpoints(check)) => {
            let base_url = check
                .base_url
                .unwrap_or_else(|| healthcheck::default_base_url(args.serve.port));
            match healthcheck::check_endpoints(&base_url, &args.serve.tvg_id).await {
                Ok(()) => {
                    println!("OK");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Some(Command::Serve) | None => match serve(args.serve).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e:#}");
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let _log_guard = logging::init_logging(args.log_dir.as_deref())?;

    let config = ProxyConfig::from_args(&args).context("Invalid configuration")?;
    info!(
        m3u_url = %config.playlist_url,
        epg_url = %config.guide_url,
        channel = %config.target.id,
        epg_refresh_secs = config.guide_refresh.as_secs(),
        "Starting IPTV proxy"
    );

    let client = build_client(config.request_timeout)?;
    let state = AppState::from_config(&config, Arc::new(HttpOrigin::new(client)));

    let server = ApiServer::new(
        ApiServerConfig {
            bind_address: args.bind_address,
            port: args.port,
        },
        state,
    );

    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        cancel_token.cancel();
    });

    server.run().await?;
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
