//! Info command - show EGL and encoder availability

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use texenc_core::codec;
use texenc_core::config::{Codec, ConfigFile};
use texenc_core::gpu;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct CodecInfo {
    codec: &'static str,
    mime_type: &'static str,
    encoder: Option<&'static str>,
    candidates: &'static [&'static str],
}

#[derive(Serialize)]
struct SystemInfo {
    version: &'static str,
    egl_available: bool,
    ffmpeg_enabled: bool,
    config_path: String,
    codecs: Vec<CodecInfo>,
}

fn gather() -> SystemInfo {
    let codecs = [Codec::H264, Codec::Hevc, Codec::Av1]
        .into_iter()
        .map(|codec| CodecInfo {
            codec: codec.display_name(),
            mime_type: codec.mime_type(),
            encoder: codec::available_encoder(codec),
            candidates: codec.encoder_candidates(),
        })
        .collect();

    SystemInfo {
        version: env!("CARGO_PKG_VERSION"),
        egl_available: gpu::egl_available(),
        ffmpeg_enabled: cfg!(feature = "ffmpeg"),
        config_path: ConfigFile::default_path().display().to_string(),
        codecs,
    }
}

/// Show system information
pub async fn info(args: InfoArgs) -> Result<()> {
    let info = gather();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("texenc {} - System Information\n", info.version);

    println!("Rendering:");
    let egl_icon = if info.egl_available { "[OK]" } else { "[!!]" };
    println!("  {} libEGL", egl_icon);
    if !info.egl_available {
        println!("      Install your GPU driver's EGL/GLES libraries (libEGL.so.1)");
    }
    println!();

    println!("Encoding:");
    if !info.ffmpeg_enabled {
        println!("  Built without the `ffmpeg` feature; no encoders available.");
        println!("  Rebuild with: cargo build --features ffmpeg");
    }
    for codec in &info.codecs {
        match codec.encoder {
            Some(name) => println!("  [OK] {:<6} {:<11} via {}", codec.codec, codec.mime_type, name),
            None => println!(
                "  [--] {:<6} {:<11} (tried {})",
                codec.codec,
                codec.mime_type,
                codec.candidates.join(", ")
            ),
        }
    }
    println!();

    println!("Configuration:");
    println!("  {}", info.config_path);

    Ok(())
}
