use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use memory_lane::{config::Config, server, telemetry};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memory-lane")]
#[command(about = "Memory journal server with media attachments and peer-to-peer call signaling", version)]
struct Cli {
    /// TOML config file; environment variables still take precedence
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and signaling server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for the database and locally stored media
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    let command = cli.command.unwrap_or(Commands::Serve {
        port: None,
        data_dir: None,
    });

    match command {
        Commands::Serve { port, data_dir } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = data_dir {
                config.storage.data_dir = dir;
            }

            let _guard = telemetry::init(&config.logging)?;
            println!(
                "{}",
                format!("🌐 Starting memory-lane on port {}...", config.server.port)
                    .cyan()
                    .bold()
            );
            server::start(config).await?;
        }

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}
