//! Platform factory for drivers, encoders and muxers

use std::path::Path;

use crate::codec::{ContainerMuxer, HardwareEncoder};
use crate::config::Container;
use crate::error::Result;
use crate::gpu::DisplayDriver;

/// Creates the platform resources an encode session drives
///
/// A backend is moved onto the session's confinement thread; everything it
/// creates stays there.
pub trait Backend: Send + 'static {
    /// Display driver for a new rendering context
    fn display_driver(&mut self) -> Result<Box<dyn DisplayDriver>>;

    /// Hardware encoder for a MIME type such as `video/avc`
    fn create_encoder(&mut self, mime_type: &str) -> Result<Box<dyn HardwareEncoder>>;

    /// Container muxer writing to `path`
    fn create_muxer(&mut self, path: &Path, container: Container)
        -> Result<Box<dyn ContainerMuxer>>;
}

/// libEGL for rendering, FFmpeg for encoding and muxing
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SystemBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for SystemBackend {
    fn display_driver(&mut self) -> Result<Box<dyn DisplayDriver>> {
        Ok(Box::new(crate::gpu::EglDriver::load()?))
    }

    #[cfg(feature = "ffmpeg")]
    fn create_encoder(&mut self, mime_type: &str) -> Result<Box<dyn HardwareEncoder>> {
        Ok(Box::new(crate::codec::FfmpegEncoder::create_by_type(
            mime_type,
        )?))
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn create_encoder(&mut self, mime_type: &str) -> Result<Box<dyn HardwareEncoder>> {
        Err(crate::error::EncodeError::init(format!(
            "No encoder for {}: texenc was built without the `ffmpeg` feature",
            mime_type
        )))
    }

    #[cfg(feature = "ffmpeg")]
    fn create_muxer(
        &mut self,
        path: &Path,
        container: Container,
    ) -> Result<Box<dyn ContainerMuxer>> {
        Ok(Box::new(crate::codec::FfmpegMuxer::new(path, container)?))
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn create_muxer(
        &mut self,
        path: &Path,
        _container: Container,
    ) -> Result<Box<dyn ContainerMuxer>> {
        Err(crate::error::EncodeError::init(format!(
            "No muxer for {:?}: texenc was built without the `ffmpeg` feature",
            path
        )))
    }
}
