//! Hardware encoder and container muxer seams
//!
//! This module provides:
//! - [`HardwareEncoder`]: a surface-fed video encoder with a bounded output queue
//! - [`ContainerMuxer`]: a single-track container writer
//! - [`InputSurface`] / [`FrameSink`]: how rendered frames reach the encoder
//! - FFmpeg implementations of both (behind the `ffmpeg` feature)

#[cfg(feature = "ffmpeg")]
mod ffmpeg_encoder;
#[cfg(feature = "ffmpeg")]
mod ffmpeg_muxer;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg_encoder::FfmpegEncoder;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_muxer::FfmpegMuxer;

use std::collections::VecDeque;
use std::ffi::c_void;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{Codec, EncoderConfig};
use crate::error::{EncodeError, Result};
use crate::types::{EncodedBufferInfo, MediaFormat};

/// Native window handle owned by an encoder
///
/// Only meaningful to the driver that produced it; never leaves the
/// confinement thread.
#[derive(Debug)]
pub struct NativeWindow {
    raw: *mut c_void,
}

impl NativeWindow {
    /// Wrap a platform window pointer
    ///
    /// # Safety
    /// `raw` must be a valid native window for the display driver in use and
    /// must outlive every surface created from it.
    pub unsafe fn from_raw(raw: *mut c_void) -> Self {
        Self { raw }
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.raw
    }
}

/// One rendered frame read back from a pixel buffer
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, rows bottom-up as GL returns them
    pub pixels: Vec<u8>,
    /// Presentation timestamp in microseconds
    pub presentation_time_us: i64,
}

/// Queue of read-back frames shared by a rendering context and an encoder
#[derive(Debug, Clone, Default)]
pub struct FrameSink {
    frames: Arc<Mutex<VecDeque<RawFrame>>>,
}

impl FrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: RawFrame) {
        self.frames.lock().push_back(frame);
    }

    pub fn pop(&self) -> Option<RawFrame> {
        self.frames.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

/// Encoder input the rendering context draws into
#[derive(Debug)]
pub enum InputSurface {
    /// Encoder-owned native window, bound as a window surface
    Window(NativeWindow),
    /// Off-screen pixel buffer whose contents are pushed on every swap
    Readback(FrameSink),
}

/// Pixel source the encoder is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    /// Frames arrive through the input surface
    Surface,
}

/// Encoder configuration derived from an [`EncoderConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderFormat {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
    pub bit_rate: u32,
    pub frame_rate: u32,
    /// Key-frame interval in seconds
    pub key_frame_interval: u32,
    pub color_format: ColorFormat,
}

impl EncoderFormat {
    pub fn from_config(config: &EncoderConfig) -> Result<Self> {
        let codec = config.codec().ok_or_else(|| {
            EncodeError::config(format!("Unsupported MIME type: {}", config.mime_type))
        })?;

        Ok(Self {
            codec,
            width: config.width,
            height: config.height,
            bit_rate: config.bit_rate,
            frame_rate: config.frame_rate,
            key_frame_interval: config.key_frame_interval,
            color_format: ColorFormat::Surface,
        })
    }

    /// Key-frame interval expressed in frames
    pub fn gop_size(&self) -> u32 {
        self.key_frame_interval.saturating_mul(self.frame_rate).max(1)
    }

    /// Output format before the encoder has reported codec-specific data
    pub fn media_format(&self) -> MediaFormat {
        MediaFormat {
            codec: self.codec,
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            bit_rate: self.bit_rate,
            extradata: Vec::new(),
        }
    }
}

/// Outcome of polling the encoder output queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueResult {
    /// A completed buffer; must be handed back with `release_output_buffer`
    Buffer {
        index: usize,
        info: EncodedBufferInfo,
    },
    /// Nothing ready within the timeout
    TryAgainLater,
    /// The reported output format changed
    OutputFormatChanged,
}

/// Surface-fed hardware video encoder
///
/// Lifecycle: configure → create_input_surface → start → (dequeue/release)* →
/// signal_end_of_input_stream → stop → release. Instances are created and used
/// on the confinement thread only.
pub trait HardwareEncoder {
    /// Codec implementation name, for logs
    fn name(&self) -> &str;

    fn configure(&mut self, format: &EncoderFormat) -> Result<()>;

    /// Surface to render frames into; valid after `configure`
    fn create_input_surface(&mut self) -> Result<InputSurface>;

    fn start(&mut self) -> Result<()>;

    /// Wait up to `timeout` for the next output event
    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<DequeueResult>;

    /// Format of the produced stream, including codec-specific data once known
    fn output_format(&self) -> Result<MediaFormat>;

    /// Payload of a dequeued buffer
    fn output_buffer(&self, index: usize) -> Option<&[u8]>;

    fn release_output_buffer(&mut self, index: usize) -> Result<()>;

    fn signal_end_of_input_stream(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Free codec resources; idempotent
    fn release(&mut self);
}

/// Single-track container writer
pub trait ContainerMuxer {
    /// Add the video track; returns its index
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize>;

    /// Write the container header; tracks are fixed afterwards
    fn start(&mut self) -> Result<()>;

    fn write_sample(&mut self, track: usize, data: &[u8], info: &EncodedBufferInfo)
        -> Result<()>;

    /// Finalize the container
    fn stop(&mut self) -> Result<()>;

    /// Close the file; idempotent
    fn release(&mut self);
}

/// Check if any encoder for a codec is available on this system
pub fn codec_available(codec: Codec) -> bool {
    available_encoder(codec).is_some()
}

/// First usable encoder implementation for a codec
#[cfg(feature = "ffmpeg")]
pub fn available_encoder(codec: Codec) -> Option<&'static str> {
    ffmpeg_encoder::find_encoder(codec).map(|(_, name)| name)
}

/// First usable encoder implementation for a codec
#[cfg(not(feature = "ffmpeg"))]
pub fn available_encoder(_codec: Codec) -> Option<&'static str> {
    None
}

/// Default timeout for the first poll of a frame drain
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timeout for every poll of the end-of-stream drain
pub const EOS_DRAIN_TIMEOUT: Duration = Duration::from_millis(5000);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_format_from_config() {
        let config = EncoderConfig::new("/tmp/out.mp4")
            .with_codec(Codec::Hevc)
            .with_frame_rate(10)
            .with_key_frame_interval(2);
        let format = EncoderFormat::from_config(&config).unwrap();
        assert_eq!(format.codec, Codec::Hevc);
        assert_eq!(format.gop_size(), 20);
        assert_eq!(format.color_format, ColorFormat::Surface);
        assert!(format.media_format().extradata.is_empty());
    }

    #[test]
    fn test_encoder_format_rejects_unknown_mime() {
        let config = EncoderConfig::new("/tmp/out.mp4").with_mime_type("video/mp4v-es");
        assert!(EncoderFormat::from_config(&config).is_err());
    }

    #[test]
    fn test_frame_sink_is_fifo_and_shared() {
        let sink = FrameSink::new();
        let producer = sink.clone();
        for ts in [1, 2, 3] {
            producer.push(RawFrame {
                width: 1,
                height: 1,
                pixels: vec![0; 4],
                presentation_time_us: ts,
            });
        }
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.pop().map(|f| f.presentation_time_us), Some(1));
        assert_eq!(sink.pop().map(|f| f.presentation_time_us), Some(2));
        assert_eq!(sink.pop().map(|f| f.presentation_time_us), Some(3));
        assert!(sink.is_empty());
    }
}
