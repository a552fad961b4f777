//! FFmpeg-backed hardware encoder
//!
//! Prefers NVENC and falls back to software encoders. Frames arrive through a
//! read-back [`FrameSink`]: every swap of the rendering context queues one RGBA
//! frame, which is converted and fed to the codec on the next dequeue.

use std::collections::VecDeque;
use std::time::Duration;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::{self, encoder};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{self, Flags};
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::{Dictionary, Rational};
use tracing::{debug, info, trace};

use super::{
    DequeueResult, EncoderFormat, FrameSink, HardwareEncoder, InputSurface, RawFrame,
};
use crate::config::Codec;
use crate::error::{EncodeError, Result};
use crate::types::{BufferFlags, EncodedBufferInfo, MediaFormat};

/// Encoder time base; packet timestamps are microseconds
pub(crate) const MICROSECONDS: Rational = Rational(1, 1_000_000);

/// First encoder available for a codec, hardware first
pub(crate) fn find_encoder(codec: Codec) -> Option<(ffmpeg::Codec, &'static str)> {
    ffmpeg::init().ok()?;
    codec
        .encoder_candidates()
        .iter()
        .find_map(|name| encoder::find_by_name(name).map(|c| (c, *name)))
}

fn is_nvenc(name: &str) -> bool {
    name.ends_with("_nvenc")
}

/// [`super::HardwareEncoder`] over an FFmpeg video encoder
pub struct FfmpegEncoder {
    codec: Codec,
    name: &'static str,
    ff_codec: ffmpeg::Codec,
    format: Option<EncoderFormat>,
    encoder: Option<encoder::Video>,
    pixel: Pixel,
    scaler: Option<scaling::Context>,
    sink: FrameSink,
    packet: ffmpeg::Packet,
    extradata: Vec<u8>,
    /// Dequeued payloads by buffer index; `None` once released
    slots: Vec<Option<Vec<u8>>>,
    ready: VecDeque<(usize, EncodedBufferInfo)>,
    format_change_pending: bool,
    started: bool,
    input_ended: bool,
    eos_delivered: bool,
}

impl FfmpegEncoder {
    /// Create an encoder for a MIME type
    pub fn create_by_type(mime: &str) -> Result<Self> {
        let codec = Codec::from_mime(mime)
            .ok_or_else(|| EncodeError::init(format!("No encoder for MIME type {}", mime)))?;
        Self::new(codec)
    }

    /// Create an encoder for a codec
    pub fn new(codec: Codec) -> Result<Self> {
        ffmpeg::init().map_err(|e| EncodeError::init(format!("FFmpeg init failed: {}", e)))?;

        let (ff_codec, name) = find_encoder(codec).ok_or_else(|| {
            EncodeError::init(format!(
                "No {} encoder available (tried {})",
                codec,
                codec.encoder_candidates().join(", ")
            ))
        })?;
        info!("Using encoder: {}", name);

        Ok(Self {
            codec,
            name,
            ff_codec,
            format: None,
            encoder: None,
            pixel: if is_nvenc(name) {
                Pixel::NV12
            } else {
                Pixel::YUV420P
            },
            scaler: None,
            sink: FrameSink::new(),
            packet: ffmpeg::Packet::empty(),
            extradata: Vec::new(),
            slots: Vec::new(),
            ready: VecDeque::new(),
            format_change_pending: false,
            started: false,
            input_ended: false,
            eos_delivered: false,
        })
    }

    fn options(&self) -> Dictionary<'static> {
        let mut opts = Dictionary::new();
        if is_nvenc(self.name) {
            opts.set("preset", "p4");
            opts.set("tune", "ll");
            opts.set("delay", "0");
            opts.set("rc", "cbr");
        } else {
            match self.name {
                "libx264" | "libx265" => {
                    opts.set("preset", "veryfast");
                    opts.set("tune", "zerolatency");
                }
                "libsvtav1" => {
                    opts.set("preset", "10");
                }
                "libaom-av1" => {
                    opts.set("cpu-used", "8");
                    opts.set("usage", "realtime");
                }
                _ => {}
            }
        }
        opts
    }

    fn push_buffer(&mut self, payload: Vec<u8>, presentation_time_us: i64, flags: BufferFlags) {
        let info = EncodedBufferInfo {
            offset: 0,
            size: payload.len(),
            presentation_time_us,
            flags,
        };
        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(payload);
                index
            }
            None => {
                self.slots.push(Some(payload));
                self.slots.len() - 1
            }
        };
        self.ready.push_back((index, info));
    }

    fn ensure_scaler(&mut self, width: u32, height: u32) -> Result<()> {
        let (out_w, out_h) = match &self.encoder {
            Some(encoder) => (encoder.width(), encoder.height()),
            None => return Err(EncodeError::encoder("Encoder is not configured")),
        };

        let matches = self
            .scaler
            .as_ref()
            .map(|s| s.input().width == width && s.input().height == height)
            .unwrap_or(false);
        if !matches {
            debug!(
                "Creating scaler: RGBA {}x{} -> {:?} {}x{}",
                width, height, self.pixel, out_w, out_h
            );
            let scaler = scaling::Context::get(
                Pixel::RGBA,
                width,
                height,
                self.pixel,
                out_w,
                out_h,
                Flags::BILINEAR,
            )
            .map_err(|e| EncodeError::encoder(format!("Failed to create scaler: {}", e)))?;
            self.scaler = Some(scaler);
        }
        Ok(())
    }

    /// Convert and submit one read-back frame
    fn encode_raw(&mut self, frame: RawFrame) -> Result<()> {
        self.ensure_scaler(frame.width, frame.height)?;

        let mut src = Video::new(Pixel::RGBA, frame.width, frame.height);
        let row_bytes = frame.width as usize * 4;
        let stride = src.stride(0);
        let rows = frame.height as usize;
        let plane = src.data_mut(0);
        // GL rows are bottom-up
        for (y, row) in frame.pixels.chunks_exact(row_bytes).take(rows).enumerate() {
            let dst_row = rows - 1 - y;
            plane[dst_row * stride..dst_row * stride + row_bytes].copy_from_slice(row);
        }

        let (Some(scaler), Some(encoder)) = (self.scaler.as_mut(), self.encoder.as_mut()) else {
            return Err(EncodeError::encoder("Encoder is not configured"));
        };
        let mut dst = Video::new(self.pixel, encoder.width(), encoder.height());
        scaler
            .run(&src, &mut dst)
            .map_err(|e| EncodeError::encoder(format!("Scaling failed: {}", e)))?;
        dst.set_pts(Some(frame.presentation_time_us));

        encoder
            .send_frame(&dst)
            .map_err(|e| EncodeError::encoder(format!("Failed to send frame: {}", e)))?;
        trace!("Submitted frame at {} us", frame.presentation_time_us);

        self.receive_packets()
    }

    fn receive_packets(&mut self) -> Result<()> {
        loop {
            let Some(encoder) = self.encoder.as_mut() else {
                return Ok(());
            };
            match encoder.receive_packet(&mut self.packet) {
                Ok(()) => {
                    let payload = self.packet.data().map(|d| d.to_vec()).unwrap_or_default();
                    let pts = self.packet.pts().unwrap_or(0);
                    let flags = if self.packet.is_key() {
                        BufferFlags::KEY_FRAME
                    } else {
                        BufferFlags::NONE
                    };
                    self.push_buffer(payload, pts, flags);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    return Ok(());
                }
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(e) => {
                    return Err(EncodeError::encoder(format!(
                        "Failed to receive packet: {}",
                        e
                    )));
                }
            }
        }
    }

    fn pump_sink(&mut self) -> Result<()> {
        while let Some(frame) = self.sink.pop() {
            self.encode_raw(frame)?;
        }
        Ok(())
    }
}

impl HardwareEncoder for FfmpegEncoder {
    fn name(&self) -> &str {
        self.name
    }

    fn configure(&mut self, format: &EncoderFormat) -> Result<()> {
        if format.codec != self.codec {
            return Err(EncodeError::encoder(format!(
                "{} cannot encode {}",
                self.name, format.codec
            )));
        }

        let mut video = codec::context::Context::new_with_codec(self.ff_codec)
            .encoder()
            .video()
            .map_err(|e| EncodeError::encoder(format!("Failed to create encoder context: {}", e)))?;

        video.set_width(format.width);
        video.set_height(format.height);
        video.set_format(self.pixel);
        video.set_time_base(MICROSECONDS);
        video.set_frame_rate(Some(Rational::new(format.frame_rate as i32, 1)));
        video.set_bit_rate(format.bit_rate as usize);
        video.set_max_bit_rate(format.bit_rate as usize);
        video.set_gop(format.gop_size());
        video.set_max_b_frames(0);
        // SAFETY: the context was just allocated and is exclusively owned here;
        // containers need codec-specific data out of band.
        unsafe {
            (*video.as_mut_ptr()).flags |= ffmpeg::ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
        }

        let encoder = video
            .open_with(self.options())
            .map_err(|e| EncodeError::encoder(format!("Failed to open {}: {}", self.name, e)))?;

        // SAFETY: extradata is owned by the opened context and valid for
        // `extradata_size` bytes until the context is freed; it is copied out.
        self.extradata = unsafe {
            let ctx = encoder.as_ptr();
            if (*ctx).extradata.is_null() || (*ctx).extradata_size <= 0 {
                Vec::new()
            } else {
                std::slice::from_raw_parts((*ctx).extradata, (*ctx).extradata_size as usize)
                    .to_vec()
            }
        };

        info!(
            "{} configured: {}x{} @ {}fps, {} bps, gop {}",
            self.name,
            format.width,
            format.height,
            format.frame_rate,
            format.bit_rate,
            format.gop_size()
        );
        self.encoder = Some(encoder);
        self.format = Some(format.clone());
        Ok(())
    }

    fn create_input_surface(&mut self) -> Result<InputSurface> {
        if self.encoder.is_none() {
            return Err(EncodeError::encoder("create_input_surface before configure"));
        }
        Ok(InputSurface::Readback(self.sink.clone()))
    }

    fn start(&mut self) -> Result<()> {
        if self.encoder.is_none() {
            return Err(EncodeError::encoder("start before configure"));
        }
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.format_change_pending = true;
        if !self.extradata.is_empty() {
            let extradata = self.extradata.clone();
            self.push_buffer(extradata, 0, BufferFlags::CODEC_CONFIG);
        }
        Ok(())
    }

    // Encoding is synchronous: once the sink is pumped there is nothing to
    // wait for, so the timeout is not used.
    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<DequeueResult> {
        if !self.started {
            return Err(EncodeError::encoder("dequeue before start"));
        }
        if self.format_change_pending {
            self.format_change_pending = false;
            return Ok(DequeueResult::OutputFormatChanged);
        }

        if self.ready.is_empty() && !self.input_ended {
            self.pump_sink()?;
        }

        if let Some((index, info)) = self.ready.pop_front() {
            return Ok(DequeueResult::Buffer { index, info });
        }

        if self.input_ended && !self.eos_delivered {
            self.eos_delivered = true;
            self.push_buffer(Vec::new(), 0, BufferFlags::END_OF_STREAM);
            if let Some((index, info)) = self.ready.pop_front() {
                return Ok(DequeueResult::Buffer { index, info });
            }
        }

        Ok(DequeueResult::TryAgainLater)
    }

    fn output_format(&self) -> Result<MediaFormat> {
        let format = self
            .format
            .as_ref()
            .ok_or_else(|| EncodeError::encoder("Encoder is not configured"))?;
        let mut media = format.media_format();
        media.extradata = self.extradata.clone();
        Ok(media)
    }

    fn output_buffer(&self, index: usize) -> Option<&[u8]> {
        self.slots.get(index)?.as_deref()
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(EncodeError::encoder(format!(
                "Output buffer {} is not dequeued",
                index
            ))),
        }
    }

    fn signal_end_of_input_stream(&mut self) -> Result<()> {
        if self.input_ended {
            return Ok(());
        }
        self.pump_sink()?;
        if let Some(encoder) = self.encoder.as_mut() {
            encoder
                .send_eof()
                .map_err(|e| EncodeError::encoder(format!("Failed to send EOF: {}", e)))?;
        }
        self.receive_packets()?;
        self.input_ended = true;
        debug!("{} end of input signalled", self.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        self.ready.clear();
        Ok(())
    }

    fn release(&mut self) {
        if self.encoder.take().is_some() {
            debug!("{} released", self.name);
        }
        self.scaler = None;
        self.slots.clear();
        self.ready.clear();
        while self.sink.pop().is_some() {}
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nvenc_detection() {
        assert!(is_nvenc("h264_nvenc"));
        assert!(is_nvenc("av1_nvenc"));
        assert!(!is_nvenc("libx264"));
    }

    #[test]
    #[ignore = "Requires FFmpeg with an H.264 encoder"]
    fn test_encoder_emits_config_then_frames() {
        let mut enc = FfmpegEncoder::new(Codec::H264).unwrap();
        let config = crate::config::EncoderConfig::new("/tmp/x.mp4").with_size(64, 64);
        enc.configure(&EncoderFormat::from_config(&config).unwrap())
            .unwrap();
        let InputSurface::Readback(sink) = enc.create_input_surface().unwrap() else {
            panic!("expected read-back surface");
        };
        enc.start().unwrap();
        assert_eq!(
            enc.dequeue_output_buffer(Duration::ZERO).unwrap(),
            DequeueResult::OutputFormatChanged
        );

        sink.push(RawFrame {
            width: 64,
            height: 64,
            pixels: vec![128; 64 * 64 * 4],
            presentation_time_us: 33_333,
        });

        let mut saw_frame = false;
        while let DequeueResult::Buffer { index, info } =
            enc.dequeue_output_buffer(Duration::ZERO).unwrap()
        {
            if !info.flags.is_codec_config() {
                assert_eq!(info.presentation_time_us, 33_333);
                saw_frame = true;
            }
            enc.release_output_buffer(index).unwrap();
        }
        assert!(saw_frame);
    }
}
