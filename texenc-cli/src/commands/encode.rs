//! Encode command - render a synthetic clip into a video file

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use texenc_core::config::{Codec, ConfigFile};
use texenc_core::gpu::texture::{delete_textures, generate_2d_texture, gradient_rgba, solid_rgba};
use texenc_core::{EncodeError, EncodeSession};
use tokio::signal;
use tracing::{info, warn};

/// Arguments for the encode command
#[derive(Args)]
pub struct EncodeArgs {
    /// Output file (.mp4, .mkv or .webm)
    output: PathBuf,

    /// Output width in pixels (default from config)
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels (default from config)
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

    /// Number of frames to encode
    #[arg(short = 'n', long, default_value = "90")]
    frames: u32,

    /// Source texture size, e.g. 1280x720
    #[arg(long, default_value = "1280x720")]
    source: String,

    /// Solid fill colour as RRGGBB
    #[arg(long, default_value = "3366cc", conflicts_with = "gradient")]
    color: String,

    /// Fill with a horizontal gradient instead of a solid colour
    #[arg(long)]
    gradient: bool,
}

/// Parse `RRGGBB` (optionally prefixed with `#`) into opaque RGBA
fn parse_color(value: &str) -> Result<[u8; 4]> {
    let hex = value.trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Invalid colour '{}'. Expected RRGGBB", value);
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
    Ok([channel(0)?, channel(2)?, channel(4)?, 255])
}

/// Parse `WIDTHxHEIGHT`
fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("Invalid size '{}'. Expected WIDTHxHEIGHT", value))?;
    let width: u32 = w.trim().parse().context("Invalid width")?;
    let height: u32 = h.trim().parse().context("Invalid height")?;
    if width == 0 || height == 0 {
        bail!("Size must be positive, got {}", value);
    }
    Ok((width, height))
}

fn print_hint(err: &EncodeError) {
    if let Some(hint) = err.user_hint() {
        eprintln!("Hint: {}", hint);
    }
}

/// Encode a synthetic clip
pub async fn encode(args: EncodeArgs) -> Result<()> {
    println!("texenc - Encoding\n");

    let file = ConfigFile::load_or_default();
    let mut config = file.encoder_config(&args.output)?;

    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(codec) = &args.codec {
        let codec: Codec = codec.parse().map_err(|_| {
            anyhow!("Invalid codec '{}'. Valid options: h264, hevc, av1", codec)
        })?;
        config = config.with_codec(codec);
    }
    if let Some(bitrate) = args.bitrate {
        config.bit_rate = bitrate;
    }
    if let Some(fps) = args.fps {
        config.frame_rate = fps;
    }
    if let Some(seconds) = args.key_interval {
        config.key_frame_interval = seconds;
    }

    let (source_w, source_h) = parse_size(&args.source)?;
    let pixels = if args.gradient {
        gradient_rgba(source_w, source_h, [16, 16, 64, 255], [255, 200, 64, 255])
    } else {
        solid_rgba(source_w, source_h, parse_color(&args.color)?)
    };

    println!("Configuration:");
    println!("  Output:      {}", config.output_path.display());
    println!("  Container:   {}", config.container().format_name());
    println!("  Resolution:  {}x{}", config.width, config.height);
    println!("  Framerate:   {} fps", config.frame_rate);
    println!("  Codec:       {}", config.mime_type);
    println!("  Bitrate:     {} bps", config.bit_rate);
    println!("  Key frames:  every {} s", config.key_frame_interval);
    println!("  Source:      {}x{}", source_w, source_h);
    println!("  Frames:      {}", args.frames);
    println!();

    let session = EncodeSession::system();
    if let Err(e) = session.init(config).await {
        print_hint(&e);
        session.release().await;
        return Err(e).context("Failed to start encode session");
    }

    let texture = match session
        .with_rendering_context(move |gl| generate_2d_texture(gl, source_w, source_h, Some(&pixels)))
        .await
        .and_then(|created| created)
    {
        Ok(texture) => texture,
        Err(e) => {
            print_hint(&e);
            session.release().await;
            return Err(e).context("Failed to create source texture");
        }
    };

    println!("Encoding... (Ctrl+C to stop early)");
    let mut encoded = 0u32;
    let mut failures = 0u32;

    tokio::select! {
        _ = signal::ctrl_c() => {
            println!("\nReceived interrupt signal...");
        }
        _ = async {
            for _ in 0..args.frames {
                match session.encode_frame(texture, source_w, source_h).await {
                    Ok(()) => encoded += 1,
                    Err(e) if e.is_fatal() => {
                        warn!("Stopping after fatal error: {}", e);
                        print_hint(&e);
                        break;
                    }
                    Err(e) => {
                        warn!("Frame failed: {}", e);
                        failures += 1;
                    }
                }
            }
        } => {
            info!("Frame loop finished");
        }
    }

    if let Err(e) = session.stop_encoding().await {
        warn!("Failed to drain encoder: {}", e);
        print_hint(&e);
    }
    let deleted = session
        .with_rendering_context(move |gl| delete_textures(gl, &[texture]))
        .await;
    if let Err(e) = deleted {
        warn!("Failed to delete source texture: {}", e);
    }
    session.release().await;

    let stats = session.stats();
    println!("Encoding complete.");
    println!("  Frames submitted:  {}", encoded);
    println!("  Frames failed:     {}", failures);
    println!("  Samples written:   {}", stats.samples_written);
    println!("  Encoder stalls:    {}", stats.drain_stalls);
    println!("  Output:            {}", args.output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("ff8800").unwrap(), [255, 136, 0, 255]);
        assert_eq!(parse_color("#000000").unwrap(), [0, 0, 0, 255]);
        assert!(parse_color("fff").is_err());
        assert!(parse_color("zzzzzz").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_size("64X48").unwrap(), (64, 48));
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("1920").is_err());
    }
}
