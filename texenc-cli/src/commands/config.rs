//! Config command - inspect, validate and write encoder defaults

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use texenc_core::config::{sample_config, Codec, ConfigFile};
use texenc_core::EncoderConfig;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show where the config file lives and whether it is usable
    Path,

    /// Print the effective encoder defaults and the values derived from them
    Show {
        /// Read this file instead of the default location
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Write a validated config file
    Init {
        /// Force overwrite if file exists
        #[arg(short, long)]
        force: bool,

        #[command(flatten)]
        defaults: DefaultsArgs,
    },

    /// Print a commented sample configuration to stdout
    Sample,
}

/// Encoder defaults to store with `config init`
#[derive(Args, Default)]
pub struct DefaultsArgs {
    /// Output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Video codec (h264, hevc, av1)
    #[arg(short, long)]
    codec: Option<String>,

    /// Bit rate in bits per second
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Seconds between key frames
    #[arg(long)]
    key_interval: Option<u32>,

    /// Directory relative output paths are resolved against
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

/// Apply `defaults` on top of `file`, rejecting values a session would refuse
fn apply_defaults(file: &mut ConfigFile, defaults: &DefaultsArgs) -> Result<EncoderConfig> {
    let encoder = &mut file.encoder;
    if let Some(width) = defaults.width {
        encoder.width = width;
    }
    if let Some(height) = defaults.height {
        encoder.height = height;
    }
    if let Some(codec) = &defaults.codec {
        codec
            .parse::<Codec>()
            .map_err(|_| anyhow!("Invalid codec '{}'. Valid options: h264, hevc, av1", codec))?;
        encoder.codec = codec.to_lowercase();
    }
    if let Some(bitrate) = defaults.bitrate {
        encoder.bit_rate = bitrate;
    }
    if let Some(fps) = defaults.fps {
        encoder.frame_rate = fps;
    }
    if let Some(seconds) = defaults.key_interval {
        encoder.key_frame_interval = seconds;
    }
    if let Some(dir) = &defaults.output_dir {
        file.output.directory = Some(dir.clone());
    }

    Ok(file.validated()?)
}

fn print_derived(config: &EncoderConfig) {
    println!("Derived:");
    println!("  MIME type:       {}", config.mime_type);
    println!("  Frame interval:  {} us", config.frame_interval_us());
    println!("  Key frame every: {} frames", config.gop_frames());
}

fn path_status(path: &Path) {
    println!("{}", path.display());
    if !path.exists() {
        println!("(file does not exist; built-in defaults apply)");
        return;
    }
    match ConfigFile::load_from(path).and_then(|file| file.validated()) {
        Ok(_) => println!("(file is valid)"),
        Err(e) => println!("(file is invalid: {})", e),
    }
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Path => path_status(&ConfigFile::default_path()),
        ConfigCommand::Show { file } => {
            let path = file.unwrap_or_else(ConfigFile::default_path);
            let loaded = ConfigFile::load_from(&path)?;
            let source = if path.exists() {
                path.display().to_string()
            } else {
                "built-in defaults".to_string()
            };

            println!("# Effective configuration ({})\n", source);
            print!(
                "{}",
                toml::to_string_pretty(&loaded).context("Failed to serialize config")?
            );
            println!();

            match loaded.validated() {
                Ok(config) => print_derived(&config),
                Err(e) => {
                    if let Some(hint) = e.user_hint() {
                        eprintln!("Hint: {}", hint);
                    }
                    return Err(e).context("Configuration would be rejected by an encode session");
                }
            }
        }
        ConfigCommand::Init { force, defaults } => {
            let path = ConfigFile::default_path();

            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!();
                println!("Use --force to overwrite, or edit the existing file.");
                return Ok(());
            }

            let mut file = ConfigFile::default();
            let config = apply_defaults(&mut file, &defaults)?;
            file.save_to(&path)?;

            println!("Created configuration file: {}", path.display());
            println!();
            print_derived(&config);
            println!();
            println!("Run `texenc config sample` for a commented template.");
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
