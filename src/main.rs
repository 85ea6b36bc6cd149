use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vidintro::{
    app,
    cli::{handle_record_command, Cli, CliCommand},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("vidintro {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Record(args)) => {
            handle_record_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Serve) | None => {}
    }

    app::run_service().await
}
