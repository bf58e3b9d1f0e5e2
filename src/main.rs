// ABOUTME: Entry point for the sagedeploy CLI application.
// ABOUTME: Parses arguments, sets up logging and Ctrl-C cancellation, and runs the deploy command.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use sagedeploy::output::{Output, OutputMode};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not errors
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let mut output = Output::new(mode);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping at the next step boundary");
            on_interrupt.cancel();
        }
    });

    match commands::deploy(cli, &mut output, &cancel).await {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            output.error(&e.to_string());
            std::process::exit(1);
        }
    }
}
