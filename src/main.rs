//! restgate binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use restgate::config::load_config;
use restgate::lifecycle::startup;
use restgate::observability::logging::init_logging;

#[derive(Debug, Parser)]
#[command(name = "restgate", version, about = "Rate-limited HTTP service")]
struct Cli {
    /// Path to a TOML config file. Defaults plus environment when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("restgate: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("restgate: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.http.bind_address,
        request_timeout_secs = config.http.request_timeout_secs,
        shutdown_timeout_secs = config.shutdown.timeout_secs,
        "restgate starting"
    );

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "restgate exited with an error");
            ExitCode::FAILURE
        }
    }
}
