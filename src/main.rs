use clap::Parser;
use expecto::ServerBuilder;
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing_subscriber::EnvFilter;

/// Holds command line parameters provided by the user.
#[derive(Parser, Debug)]
#[command(version, about)]
struct ExpectoCLIConfig {
    /// Port for the primary HTTP surface, including the admin API under /mockserver/.
    #[arg(short, long, env = "EXPECTO_PORT", default_value_t = 1080)]
    port: u16,
    /// Optional dedicated port that serves only the admin API.
    #[arg(short, long, env = "EXPECTO_ADMIN_PORT")]
    admin_port: Option<u16>,
    /// Bind to all interfaces instead of 127.0.0.1.
    #[arg(short, long, env = "EXPECTO_EXPOSE")]
    expose: bool,
    /// Time in milliseconds open connections get to finish after Ctrl-C.
    #[arg(long, env = "EXPECTO_DRAIN_TIMEOUT_MS", default_value_t = 5000)]
    drain_timeout_ms: u64,
    /// JSON or YAML file with expectations to load at startup.
    #[arg(short, long, env = "EXPECTO_INIT_FILE")]
    init_file: Option<PathBuf>,
    /// Do not log one line per served request.
    #[arg(long, env = "EXPECTO_DISABLE_ACCESS_LOG")]
    disable_access_log: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("expecto=info")),
        )
        .init();

    let params = ExpectoCLIConfig::parse();

    tracing::info!(
        "Starting {} server V{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("{:?}", params);

    let server = match ServerBuilder::new()
        .port(params.port)
        .admin_port_option(params.admin_port)
        .expose(params.expose)
        .print_access_log(!params.disable_access_log)
        .drain_timeout(Duration::from_millis(params.drain_timeout_ms))
        .init_file_option(params.init_file)
        .build()
    {
        Ok(server) => server,
        Err(err) => {
            tracing::error!("cannot configure server: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut handle = match server.start().await {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!("cannot start server: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for the shutdown signal: {}", err);
    }

    tracing::info!("Shutting down");
    handle.shutdown().await;

    ExitCode::SUCCESS
}
