//! GPU rendering context
//!
//! Owns a display connection, one drawable surface and one GLES context.
//! The surface is either an off-screen pixel buffer or bound to an encoder
//! input surface. For read-back encoder surfaces every swap copies the frame
//! into the encoder's [`FrameSink`].

use std::ops::{Deref, DerefMut};

use tracing::{debug, trace, warn};

use super::driver::{
    ConfigAttributes, ConfigHandle, ContextHandle, DisplayDriver, DisplayHandle, SurfaceHandle,
    SurfaceKind,
};
use super::gl::GlApi;
use crate::codec::{FrameSink, InputSurface, RawFrame};
use crate::error::{EncodeError, Result};

/// Extension that allows a config to feed a video encoder
pub const RECORDABLE_EXTENSION: &str = "EGL_ANDROID_recordable";

/// Default GLES major version
pub const DEFAULT_API_VERSION: i32 = 3;

/// Drawable a rendering context is created for
#[derive(Debug)]
pub enum SurfaceTarget {
    /// Off-screen pixel buffer
    Offscreen { width: u32, height: u32 },
    /// Encoder input surface of the given size
    Encoder {
        surface: InputSurface,
        width: u32,
        height: u32,
    },
}

/// Display, surface and context triple
pub struct RenderingContext {
    driver: Box<dyn DisplayDriver>,
    display: Option<DisplayHandle>,
    config: Option<ConfigHandle>,
    context: Option<ContextHandle>,
    surface: Option<SurfaceHandle>,
    surface_kind: SurfaceKind,
    width: u32,
    height: u32,
    readback: Option<FrameSink>,
    gl: Option<Box<dyn GlApi>>,
    pending_timestamp_us: i64,
    presentation_time_supported: bool,
}

impl RenderingContext {
    /// Create a context for `target`, optionally sharing objects with `shared`
    ///
    /// On failure every object created so far is destroyed and the display is
    /// terminated before the error is returned.
    pub fn create(
        mut driver: Box<dyn DisplayDriver>,
        target: SurfaceTarget,
        shared: Option<ContextHandle>,
        api_version: i32,
    ) -> Result<Self> {
        let display = driver.open_display()?;

        let (width, height) = match &target {
            SurfaceTarget::Offscreen { width, height }
            | SurfaceTarget::Encoder { width, height, .. } => (*width, *height),
        };
        let surface_kind = match &target {
            SurfaceTarget::Encoder {
                surface: InputSurface::Window(_),
                ..
            } => SurfaceKind::Window,
            _ => SurfaceKind::Pbuffer,
        };

        let mut ctx = Self {
            driver,
            display: Some(display),
            config: None,
            context: None,
            surface: None,
            surface_kind,
            width,
            height,
            readback: None,
            gl: None,
            pending_timestamp_us: 0,
            presentation_time_supported: true,
        };

        if let Err(e) = ctx.create_objects(display, target, shared, api_version) {
            ctx.release();
            return Err(match e {
                EncodeError::Init(_) => e,
                other => EncodeError::init(format!("Rendering context: {}", other)),
            });
        }

        debug!(
            "Rendering context created: {}x{} {:?} (GLES {})",
            width, height, surface_kind, api_version
        );
        Ok(ctx)
    }

    fn create_objects(
        &mut self,
        display: DisplayHandle,
        target: SurfaceTarget,
        shared: Option<ContextHandle>,
        api_version: i32,
    ) -> Result<()> {
        let encoder_bound = matches!(target, SurfaceTarget::Encoder { .. });
        let recordable = encoder_bound && self.driver.has_extension(display, RECORDABLE_EXTENSION);

        let attrs = ConfigAttributes {
            surface: self.surface_kind,
            api_version,
            recordable,
        };
        let config = self.driver.choose_config(display, &attrs)?;
        self.config = Some(config);

        self.context = Some(
            self.driver
                .create_context(display, config, shared, api_version)?,
        );

        let surface = match target {
            SurfaceTarget::Offscreen { width, height } => {
                self.driver
                    .create_pbuffer_surface(display, config, width, height)?
            }
            SurfaceTarget::Encoder {
                surface: InputSurface::Window(window),
                ..
            } => self.driver.create_window_surface(display, config, &window)?,
            SurfaceTarget::Encoder {
                surface: InputSurface::Readback(sink),
                width,
                height,
            } => {
                self.readback = Some(sink);
                self.driver
                    .create_pbuffer_surface(display, config, width, height)?
            }
        };
        self.surface = Some(surface);
        Ok(())
    }

    fn handles(&self) -> Result<(DisplayHandle, SurfaceHandle, ContextHandle)> {
        match (self.display, self.surface, self.context) {
            (Some(d), Some(s), Some(c)) => Ok((d, s, c)),
            _ => Err(EncodeError::context_error("Rendering context is released")),
        }
    }

    /// Make the context current on the calling thread
    pub fn make_current(&mut self) -> Result<()> {
        let (display, surface, context) = self.handles()?;
        self.driver.make_current(display, Some((surface, context)))?;
        if self.gl.is_none() {
            self.gl = Some(self.driver.load_gl()?);
        }
        Ok(())
    }

    /// Unbind any context from the calling thread
    pub fn detach_current(&mut self) -> Result<()> {
        let display = self
            .display
            .ok_or_else(|| EncodeError::context_error("Rendering context is released"))?;
        self.driver.make_current(display, None)
    }

    /// Make current and return a guard that detaches when dropped
    pub fn current(&mut self) -> Result<CurrentGuard<'_>> {
        self.make_current()?;
        Ok(CurrentGuard { ctx: self })
    }

    /// Run `action` with the context current, detaching afterwards
    pub fn with_current<R>(&mut self, action: impl FnOnce(&mut Self) -> R) -> Result<R> {
        let mut guard = self.current()?;
        Ok(action(&mut *guard))
    }

    /// GL function table; loaded on the first `make_current`
    pub fn gl(&self) -> Result<&dyn GlApi> {
        self.gl
            .as_deref()
            .ok_or_else(|| EncodeError::context_error("GL is not loaded; make the context current"))
    }

    /// Tag the next swap with a presentation timestamp in microseconds
    pub fn set_presentation_timestamp(&mut self, timestamp_us: i64) -> Result<()> {
        let (display, surface, _) = self.handles()?;
        self.pending_timestamp_us = timestamp_us;

        if self.presentation_time_supported {
            let forwarded =
                self.driver
                    .set_presentation_time(display, surface, timestamp_us.saturating_mul(1000))?;
            if !forwarded {
                debug!("Driver has no presentation-time support; timestamps travel with read-back frames");
                self.presentation_time_supported = false;
            }
        }
        Ok(())
    }

    /// Present the rendered frame
    ///
    /// Read-back surfaces copy the pixels out before the swap and hand them
    /// to the frame sink only once the swap succeeded.
    pub fn swap_buffers(&mut self) -> Result<()> {
        let (display, surface, _) = self.handles()?;

        let frame = match &self.readback {
            Some(_) => {
                let gl = self
                    .gl
                    .as_deref()
                    .ok_or_else(|| EncodeError::context_error("Swap before make_current"))?;
                let mut pixels = vec![0u8; self.width as usize * self.height as usize * 4];
                gl.read_pixels_rgba(0, 0, self.width as i32, self.height as i32, &mut pixels);
                Some(RawFrame {
                    width: self.width,
                    height: self.height,
                    pixels,
                    presentation_time_us: self.pending_timestamp_us,
                })
            }
            None => None,
        };

        self.driver.swap_buffers(display, surface)?;

        if let (Some(sink), Some(frame)) = (&self.readback, frame) {
            trace!("Read back frame at {} us", frame.presentation_time_us);
            sink.push(frame);
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether swaps push frames into an encoder frame sink
    pub fn is_readback(&self) -> bool {
        self.readback.is_some()
    }

    /// Context handle, for creating shared contexts
    pub fn context_handle(&self) -> Option<ContextHandle> {
        self.context
    }

    pub fn is_released(&self) -> bool {
        self.display.is_none()
    }

    /// Destroy surface and context and terminate the display; idempotent
    pub fn release(&mut self) {
        let Some(display) = self.display.take() else {
            return;
        };

        self.gl = None;
        if let Some(surface) = self.surface.take() {
            self.driver.destroy_surface(display, surface);
        }
        if let Err(e) = self.driver.make_current(display, None) {
            warn!("Failed to unbind context during release: {}", e);
        }
        if let Some(context) = self.context.take() {
            self.driver.destroy_context(display, context);
        }
        self.driver.release_thread();
        self.driver.terminate(display);
        self.config = None;
        self.readback = None;
        debug!("Rendering context released");
    }
}

impl Drop for RenderingContext {
    fn drop(&mut self) {
        self.release();
    }
}

/// Keeps a [`RenderingContext`] current until dropped
pub struct CurrentGuard<'a> {
    ctx: &'a mut RenderingContext,
}

impl Deref for CurrentGuard<'_> {
    type Target = RenderingContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for CurrentGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for CurrentGuard<'_> {
    fn drop(&mut self) {
        if self.ctx.is_released() {
            return;
        }
        if let Err(e) = self.ctx.detach_current() {
            warn!("Failed to detach rendering context: {}", e);
        }
    }
}
