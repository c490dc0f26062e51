//! zlock CLI - drive lock contention scenarios against an in-memory
//! coordination tree
//!
//! Binary name: `zlock`

mod cli;
mod commands;

use std::process;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Contend(args) => commands::contend::run(&args, cli.config.as_deref()).await,
        Commands::ExpireDemo(args) => {
            commands::expire_demo::run(&args, cli.config.as_deref()).await
        }
    };

    if let Err(err) = result {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Error: {err:#}");
        }

        let code = err
            .downcast_ref::<zlock_core::Error>()
            .map_or(1, |e| if e.is_retryable() { 75 } else { 1 });

        #[allow(clippy::exit)]
        process::exit(code);
    }
}
