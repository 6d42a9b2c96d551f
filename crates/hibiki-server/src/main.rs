mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use hibiki_api::memory::MemoryStatus;
use hibiki_api::slack::SlackClient;
use hibiki_api::traits::StatusService;
use hibiki_core::config::AppConfig;
use hibiki_core::error::HibikiError;
use hibiki_runtime::Relay;

const DEFAULT_LOG_FILTER: &str = "hibiki=info,tower_http=info";

#[derive(Debug, Parser)]
#[command(name = "hibiki", version, about = "Mirror the browser's now-playing track into Slack")]
struct Cli {
    /// Config file (defaults to the platform config dir).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long, short)]
    port: Option<u16>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// Log status changes instead of calling Slack.
    #[arg(long)]
    dry_run: bool,

    /// Also write daily-rotated logs to this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] HibikiError),
    #[error("invalid listen address {addr}: {source}")]
    Address {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hibiki.log");
            let (file, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stdout.and(file))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "hibiki failed to start");
            ExitCode::FAILURE
        }
    }
}

/// Config file and environment, then command-line overrides, validated.
fn load_config<F>(cli: &Cli, lookup: F) -> Result<AppConfig, StartupError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = AppConfig::load_with(cli.config.as_deref(), lookup)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    config.validate(!cli.dry_run)?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let config = load_config(&cli, |key| std::env::var(key).ok())?;

    let addr_str = format!("{}:{}", config.server.bind, config.server.port);
    let addr: SocketAddr = addr_str.parse().map_err(|source| StartupError::Address {
        addr: addr_str.clone(),
        source,
    })?;

    if cli.dry_run {
        warn!("Dry run: status changes are logged, not sent to Slack");
        serve(MemoryStatus::new(), config, addr).await
    } else {
        let token = config.slack.user_token.clone().unwrap_or_default();
        let client = SlackClient::with_base_url(token, config.slack.api_base.clone());
        info!(token_kind = client.token_kind(), "Using Slack user token");
        serve(client, config, addr).await
    }
}

async fn serve<S: StatusService + 'static>(
    service: S,
    config: AppConfig,
    addr: SocketAddr,
) -> Result<(), StartupError> {
    let relay = Arc::new(Relay::new(service, config));
    relay.refresh_identity().await;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    info!(%addr, "hibiki listening");

    axum::serve(listener, routes::router(relay))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve)?;

    info!("hibiki stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
