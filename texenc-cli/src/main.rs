//! texenc CLI
//!
//! Render GPU textures into a hardware video encoder and write a video file.
//!
//! # Usage
//!
//! ```bash
//! # Encode three seconds of a solid colour at 30 fps
//! texenc encode clip.mp4 --frames 90 --color ff8800
//!
//! # Check EGL and encoder support
//! texenc info
//!
//! # Write a starter config file
//! texenc config init
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// texenc - GPU texture to video file encoder
#[derive(Parser)]
#[command(name = "texenc")]
#[command(author = "GhostKellz")]
#[command(version)]
#[command(about = "Render GPU textures into a hardware video encoder", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a synthetic clip through the GPU and hardware encoder
    Encode(commands::EncodeArgs),

    /// Show EGL and encoder availability
    Info(commands::InfoArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("texenc={}", level).parse()?)
                .add_directive(format!("texenc_core={}", level).parse()?),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Encode(args) => commands::encode(args).await?,
        Commands::Info(args) => commands::info(args).await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
