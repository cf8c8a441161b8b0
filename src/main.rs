use anyhow::Context;
use clap::Parser;
use tracing::error;

use schoolhub::cli::{Cli, Commands};
use schoolhub::config::{get_config, init_config, init_config_from};
use schoolhub::interfaces::cli::run_cli_command;
use schoolhub::runtime::modes::run_server;
use schoolhub::system::init_logging;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.config.as_deref() {
        Some(path) => init_config_from(path),
        None => init_config(),
    }

    // CLI Mode
    if let Some(cmd) = cli.command.filter(|c| !matches!(c, Commands::Serve)) {
        if let Err(e) = run_cli_command(cmd).await {
            eprintln!("{}", e.format_colored());
            std::process::exit(1);
        }
        return Ok(());
    }

    // Server Mode
    let config = get_config();
    // guard 必须存活到进程结束，否则缓冲的日志会丢失
    let _guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    if let Err(e) = run_server().await {
        error!("Server exited with error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
