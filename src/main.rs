//! recap - turn recorded audio into text summaries
//!
//! Entry point for the recap CLI application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use recap::cli::{Cli, Commands};
use recap::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            recap::cli::completions::print(shell);
        }
        command => {
            // Load configuration only for runtime commands.
            let settings = Settings::load()?;

            match command {
                Commands::Serve => {
                    recap::cli::commands::serve(&settings).await?;
                }
                Commands::Proxy => {
                    recap::cli::commands::proxy(&settings).await?;
                }
                Commands::Submit { source } => {
                    recap::cli::commands::submit(&settings, &source).await?;
                }
                Commands::Status { id } => {
                    recap::cli::commands::status(&settings, &id).await?;
                }
                Commands::Result { id, format } => {
                    recap::cli::commands::result(&settings, &id, &format).await?;
                }
                Commands::Cancel { id } => {
                    recap::cli::commands::cancel(&settings, &id).await?;
                }
                Commands::Config(config_cmd) => {
                    recap::cli::commands::config_command(&settings, config_cmd)?;
                }
                Commands::Completions { .. } => unreachable!(),
            }
        }
    }

    Ok(())
}
