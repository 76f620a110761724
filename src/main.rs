use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use calshare::storage::config::Config;

mod cli;
use cli::{parse_cli_mode, run, USAGE};

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("preparing log directory")?;

    let cli_mode = match parse_cli_mode() {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("Error: {}", err);
            println!("{USAGE}");
            return Ok(());
        }
    };

    if let Err(e) = run(cli_mode).await {
        tracing::error!("Command failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn setup_logging() -> std::io::Result<()> {
    let log_dir = Config::config_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "calshare.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .init();

    std::mem::forget(_guard);

    tracing::info!("calshare started");
    Ok(())
}
