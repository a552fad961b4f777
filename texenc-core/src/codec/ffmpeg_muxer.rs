//! FFmpeg container muxer
//!
//! Writes one video track to MP4, Matroska or WebM.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::Id;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::Rational;
use tracing::{debug, error, info};

use super::ffmpeg_encoder::MICROSECONDS;
use super::ContainerMuxer;
use crate::config::{Codec, Container};
use crate::error::{EncodeError, Result};
use crate::types::{EncodedBufferInfo, MediaFormat};

/// Padding FFmpeg requires after extradata
const INPUT_BUFFER_PADDING: usize = ffmpeg::ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;

fn codec_id(codec: Codec) -> Id {
    match codec {
        Codec::H264 => Id::H264,
        Codec::Hevc => Id::HEVC,
        Codec::Av1 => Id::AV1,
    }
}

/// [`ContainerMuxer`] writing through libavformat
pub struct FfmpegMuxer {
    path: PathBuf,
    container: Container,
    output: Option<Output>,
    track: Option<usize>,
    header_written: bool,
    trailer_written: bool,
    samples_written: u64,
}

impl FfmpegMuxer {
    /// Open `path` for writing in `container` format
    pub fn new(path: impl AsRef<Path>, container: Container) -> Result<Self> {
        ffmpeg::init().map_err(|e| EncodeError::init(format!("FFmpeg init failed: {}", e)))?;
        let path = path.as_ref().to_path_buf();

        let output = ffmpeg::format::output_as(&path, container.format_name()).map_err(|e| {
            EncodeError::muxer(format!("Failed to create output {:?}: {}", path, e))
        })?;
        info!("Muxer opened: {:?} ({})", path, container.format_name());

        Ok(Self {
            path,
            container,
            output: Some(output),
            track: None,
            header_written: false,
            trailer_written: false,
            samples_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn output(&mut self) -> Result<&mut Output> {
        self.output
            .as_mut()
            .ok_or_else(|| EncodeError::muxer("Muxer is released"))
    }
}

impl ContainerMuxer for FfmpegMuxer {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        if self.header_written {
            return Err(EncodeError::muxer("Cannot add a track after start"));
        }
        if self.track.is_some() {
            return Err(EncodeError::muxer("Video track already added"));
        }

        let id = codec_id(format.codec);
        let output = self.output()?;
        let index = {
            let mut stream = output
                .add_stream(id)
                .map_err(|e| EncodeError::muxer(format!("Failed to add video stream: {}", e)))?;

            let params = stream.parameters();
            // SAFETY: rust-ffmpeg has no setters for stream codec parameters.
            // The pointer comes from the stream just created and stays valid
            // while `output` lives. Extradata is allocated with av_mallocz so
            // libavformat can free it with the stream.
            unsafe {
                let ptr = params.as_ptr() as *mut ffmpeg::ffi::AVCodecParameters;
                (*ptr).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
                (*ptr).codec_id = id.into();
                (*ptr).width = format.width as i32;
                (*ptr).height = format.height as i32;
                (*ptr).bit_rate = format.bit_rate as i64;

                if !format.extradata.is_empty() {
                    let len = format.extradata.len();
                    let buf = ffmpeg::ffi::av_mallocz(len + INPUT_BUFFER_PADDING) as *mut u8;
                    if !buf.is_null() {
                        std::ptr::copy_nonoverlapping(format.extradata.as_ptr(), buf, len);
                        (*ptr).extradata = buf;
                        (*ptr).extradata_size = len as i32;
                    }
                }
            }

            stream.set_time_base(MICROSECONDS);
            if format.frame_rate > 0 {
                stream.set_rate(Rational::new(format.frame_rate as i32, 1));
            }
            stream.index()
        };

        debug!(
            "Added {} track {}: {}x{}, {} bytes of codec data",
            format.codec,
            index,
            format.width,
            format.height,
            format.extradata.len()
        );
        self.track = Some(index);
        Ok(index)
    }

    fn start(&mut self) -> Result<()> {
        if self.header_written {
            return Err(EncodeError::muxer("Muxer already started"));
        }
        if self.track.is_none() {
            return Err(EncodeError::muxer("Muxer has no track"));
        }
        self.output()?
            .write_header()
            .map_err(|e| EncodeError::muxer(format!("Failed to write header: {}", e)))?;
        self.header_written = true;
        debug!("Container header written");
        Ok(())
    }

    fn write_sample(&mut self, track: usize, data: &[u8], info: &EncodedBufferInfo) -> Result<()> {
        if !self.header_written {
            return Err(EncodeError::muxer("write_sample before start"));
        }
        if self.track != Some(track) {
            return Err(EncodeError::muxer(format!("Unknown track {}", track)));
        }

        let output = self.output()?;
        let time_base = output
            .stream(track)
            .map(|s| s.time_base())
            .unwrap_or(MICROSECONDS);

        let mut pkt = ffmpeg::Packet::copy(data);
        pkt.set_stream(track);
        pkt.set_pts(Some(info.presentation_time_us));
        pkt.set_dts(Some(info.presentation_time_us));
        if info.flags.is_key_frame() {
            pkt.set_flags(ffmpeg::packet::Flags::KEY);
        }
        pkt.rescale_ts(MICROSECONDS, time_base);

        pkt.write_interleaved(output)
            .map_err(|e| EncodeError::muxer(format!("Failed to write sample: {}", e)))?;

        self.samples_written += 1;
        if self.samples_written % 1000 == 0 {
            debug!("Written {} samples to {:?}", self.samples_written, self.path);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.header_written || self.trailer_written {
            return Ok(());
        }
        self.output()?
            .write_trailer()
            .map_err(|e| EncodeError::muxer(format!("Failed to write trailer: {}", e)))?;
        self.trailer_written = true;
        info!(
            "Recording complete: {:?} ({} samples, {})",
            self.path,
            self.samples_written,
            self.container.format_name()
        );
        Ok(())
    }

    fn release(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to finalize {:?}: {}", self.path, e);
        }
        self.output = None;
    }
}

impl Drop for FfmpegMuxer {
    fn drop(&mut self) {
        if self.output.is_some() {
            self.release();
        }
    }
}
