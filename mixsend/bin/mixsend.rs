//! Command-line entry point for mixsend
//!
//! - `send`: flush the outbound pool once
//! - `serve`: flush the pool on an interval until interrupted
//! - `check`: validate the anonymizing transport
//! - `print-config`: show the effective configuration

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use mixsend::{Mixsend, SHUTDOWN_BROADCAST, config_file, shutdown_on_signal};
use mixsend_common::logging;

/// Tor-aware outbound delivery for an anonymous remailer
#[derive(Parser, Debug)]
#[command(name = "mixsend")]
#[command(about = "Deliver a remailer's outbound pool", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (RON). Overrides `MIXSEND_CONFIG` and the default
    /// locations.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Flush the outbound pool once
    Send,
    /// Flush the outbound pool repeatedly until Ctrl+C or SIGTERM
    Serve {
        /// Seconds between flushes
        #[arg(short, long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },
    /// Validate the anonymizing transport and print its status
    Check,
    /// Print the effective configuration as RON
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = config_file::load(cli.config)?;

    match cli.command {
        Commands::PrintConfig => {
            println!("{}", config.to_ron()?);
        }
        Commands::Check => {
            let status = Mixsend::new(config).check().await?;
            println!("Anonymizing transport: {status:?}");
        }
        Commands::Send => {
            let report = Mixsend::new(config).send().await?;
            println!(
                "Sent {}, discarded {}, retained {}",
                report.sent, report.discarded, report.retained
            );
        }
        Commands::Serve { interval } => {
            let mixsend = Mixsend::new(config);
            let receiver = SHUTDOWN_BROADCAST.subscribe();

            tokio::spawn(async {
                if let Err(e) = shutdown_on_signal().await {
                    tracing::error!("Signal handling failed: {e:#}");
                }
            });

            mixsend
                .serve(Duration::from_secs(interval), receiver)
                .await?;
        }
    }

    Ok(())
}
