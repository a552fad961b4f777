//! texenc Core Library
//!
//! Render GPU textures into a hardware video encoder and write the encoded
//! stream to a container file.
//!
//! This library provides:
//! - EGL rendering contexts bound to encoder input surfaces
//! - Aspect-preserving blit shaders for 2D and external textures
//! - Hardware encoding and MP4/Matroska muxing via FFmpeg (`ffmpeg` feature)
//! - Fixed-frame-rate timestamps and single-thread confinement per session
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │ Caller Texture  │───▶│ Encoder Surface  │───▶│ Container File  │
//! │ (GLES blit)     │    │ (HW encoder)     │    │ (muxer)         │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use texenc_core::{EncodeSession, EncoderConfig};
//! use texenc_core::gpu::texture::{generate_2d_texture, solid_rgba};
//!
//! # async fn run() -> texenc_core::Result<()> {
//! let session = EncodeSession::system();
//! session
//!     .init(EncoderConfig::new("/tmp/out.mp4").with_size(640, 480))
//!     .await?;
//!
//! let texture = session
//!     .with_rendering_context(|gl| generate_2d_texture(gl, 320, 240, Some(&solid_rgba(320, 240, [255, 0, 0, 255]))))
//!     .await??;
//! for _ in 0..30 {
//!     session.encode_frame(texture, 320, 240).await?;
//! }
//! session.stop_encoding().await?;
//! session.release().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod gpu;
pub mod session;
pub mod types;

pub use backend::{Backend, SystemBackend};
pub use config::{Codec, Container, EncoderConfig};
pub use error::{EncodeError, Result};
pub use session::{EncodeSession, SessionStats};
pub use types::{SessionState, Texture, TextureKind};
