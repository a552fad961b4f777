//! Display driver seam
//!
//! [`DisplayDriver`] is the EGL surface the rendering context needs. The
//! system implementation, [`EglDriver`], loads libEGL at runtime; tests plug
//! in a fake that counts live handles.

use std::ffi::{c_void, CStr, CString};

use tracing::{debug, warn};

use super::egl_sys::{self, EglLib, EGLint};
use super::gl::{GlApi, GlowApi};
use crate::codec::NativeWindow;
use crate::error::{EncodeError, Result};

/// Opaque display connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayHandle(pub usize);

/// Opaque framebuffer configuration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigHandle(pub usize);

/// Opaque GPU context handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub usize);

/// Opaque drawable surface handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub usize);

/// Kind of drawable a config must support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Native window owned by the encoder
    Window,
    /// Off-screen pixel buffer
    Pbuffer,
}

/// Framebuffer config request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigAttributes {
    pub surface: SurfaceKind,
    /// GLES major version (2 or 3)
    pub api_version: i32,
    /// Request `EGL_RECORDABLE_ANDROID`
    pub recordable: bool,
}

impl ConfigAttributes {
    /// EGL attribute list: RGBA8888, no depth or stencil
    pub fn to_egl(&self) -> Vec<EGLint> {
        let renderable = if self.api_version >= 3 {
            egl_sys::EGL_OPENGL_ES2_BIT | egl_sys::EGL_OPENGL_ES3_BIT_KHR
        } else {
            egl_sys::EGL_OPENGL_ES2_BIT
        };
        let surface_bit = match self.surface {
            SurfaceKind::Window => egl_sys::EGL_WINDOW_BIT,
            SurfaceKind::Pbuffer => egl_sys::EGL_PBUFFER_BIT,
        };

        let mut attrs = vec![
            egl_sys::EGL_RED_SIZE,
            8,
            egl_sys::EGL_GREEN_SIZE,
            8,
            egl_sys::EGL_BLUE_SIZE,
            8,
            egl_sys::EGL_ALPHA_SIZE,
            8,
            egl_sys::EGL_DEPTH_SIZE,
            0,
            egl_sys::EGL_STENCIL_SIZE,
            0,
            egl_sys::EGL_RENDERABLE_TYPE,
            renderable,
            egl_sys::EGL_SURFACE_TYPE,
            surface_bit,
        ];
        if self.recordable {
            attrs.extend([egl_sys::EGL_RECORDABLE_ANDROID, 1]);
        }
        attrs.push(egl_sys::EGL_NONE);
        attrs
    }
}

/// EGL-shaped display driver
///
/// All methods are called from the confinement thread only.
pub trait DisplayDriver {
    /// Get and initialize the default display, binding the GLES API
    fn open_display(&mut self) -> Result<DisplayHandle>;

    /// Whether the display advertises an extension
    fn has_extension(&self, display: DisplayHandle, name: &str) -> bool;

    fn choose_config(
        &mut self,
        display: DisplayHandle,
        attrs: &ConfigAttributes,
    ) -> Result<ConfigHandle>;

    fn create_context(
        &mut self,
        display: DisplayHandle,
        config: ConfigHandle,
        shared: Option<ContextHandle>,
        api_version: i32,
    ) -> Result<ContextHandle>;

    fn create_window_surface(
        &mut self,
        display: DisplayHandle,
        config: ConfigHandle,
        window: &NativeWindow,
    ) -> Result<SurfaceHandle>;

    fn create_pbuffer_surface(
        &mut self,
        display: DisplayHandle,
        config: ConfigHandle,
        width: u32,
        height: u32,
    ) -> Result<SurfaceHandle>;

    /// Bind `surface` + `context` to the calling thread, or unbind with `None`
    fn make_current(
        &mut self,
        display: DisplayHandle,
        binding: Option<(SurfaceHandle, ContextHandle)>,
    ) -> Result<()>;

    fn swap_buffers(&mut self, display: DisplayHandle, surface: SurfaceHandle) -> Result<()>;

    /// Tag the next swap; returns `false` when the driver has no presentation-time support
    fn set_presentation_time(
        &mut self,
        display: DisplayHandle,
        surface: SurfaceHandle,
        time_ns: i64,
    ) -> Result<bool>;

    /// GL function table for the current context
    fn load_gl(&mut self) -> Result<Box<dyn GlApi>>;

    fn destroy_surface(&mut self, display: DisplayHandle, surface: SurfaceHandle);
    fn destroy_context(&mut self, display: DisplayHandle, context: ContextHandle);
    fn release_thread(&mut self);
    fn terminate(&mut self, display: DisplayHandle);
}

/// [`DisplayDriver`] over the system libEGL
pub struct EglDriver {
    lib: EglLib,
}

impl EglDriver {
    /// Load libEGL
    pub fn load() -> Result<Self> {
        let lib = EglLib::load().map_err(EncodeError::Init)?;
        Ok(Self { lib })
    }

    /// Check whether libEGL can be loaded on this system
    pub fn is_available() -> bool {
        EglLib::load().is_ok()
    }

    fn last_error(&self, call: &str) -> EncodeError {
        // SAFETY: eglGetError only reads thread-local driver state
        let code = unsafe { (self.lib.get_error)() };
        EncodeError::context_error(format!("{} failed: {}", call, egl_sys::error_name(code)))
    }
}

fn ptr<T>(handle: usize) -> *mut T {
    handle as *mut T
}

// SAFETY (whole impl): handles are the raw EGL pointers returned by the same
// library instance, round-tripped through `usize`. Attribute lists are
// EGL_NONE terminated and outlive the calls they are passed to.
impl DisplayDriver for EglDriver {
    fn open_display(&mut self) -> Result<DisplayHandle> {
        unsafe {
            let display = (self.lib.get_display)(egl_sys::EGL_DEFAULT_DISPLAY);
            if display == egl_sys::EGL_NO_DISPLAY {
                return Err(EncodeError::init("eglGetDisplay returned no display"));
            }

            let (mut major, mut minor) = (0, 0);
            if (self.lib.initialize)(display, &mut major, &mut minor) == egl_sys::EGL_FALSE {
                return Err(EncodeError::init(format!(
                    "eglInitialize failed: {}",
                    egl_sys::error_name((self.lib.get_error)())
                )));
            }
            debug!("EGL {}.{} initialized", major, minor);

            if (self.lib.bind_api)(egl_sys::EGL_OPENGL_ES_API) == egl_sys::EGL_FALSE {
                (self.lib.terminate)(display);
                return Err(EncodeError::init("eglBindAPI(EGL_OPENGL_ES_API) failed"));
            }

            Ok(DisplayHandle(display as usize))
        }
    }

    fn has_extension(&self, display: DisplayHandle, name: &str) -> bool {
        unsafe {
            let raw = (self.lib.query_string)(ptr(display.0), egl_sys::EGL_EXTENSIONS);
            if raw.is_null() {
                return false;
            }
            CStr::from_ptr(raw)
                .to_string_lossy()
                .split_ascii_whitespace()
                .any(|ext| ext == name)
        }
    }

    fn choose_config(
        &mut self,
        display: DisplayHandle,
        attrs: &ConfigAttributes,
    ) -> Result<ConfigHandle> {
        let list = attrs.to_egl();
        let mut config: egl_sys::EGLConfig = std::ptr::null_mut();
        let mut count: EGLint = 0;
        let ok = unsafe {
            (self.lib.choose_config)(ptr(display.0), list.as_ptr(), &mut config, 1, &mut count)
        };
        if ok == egl_sys::EGL_FALSE || count < 1 || config.is_null() {
            return Err(EncodeError::init(format!(
                "No EGL config matches {:?}",
                attrs
            )));
        }
        Ok(ConfigHandle(config as usize))
    }

    fn create_context(
        &mut self,
        display: DisplayHandle,
        config: ConfigHandle,
        shared: Option<ContextHandle>,
        api_version: i32,
    ) -> Result<ContextHandle> {
        let attrs = [egl_sys::EGL_CONTEXT_CLIENT_VERSION, api_version, egl_sys::EGL_NONE];
        let share = shared
            .map(|c| ptr::<c_void>(c.0))
            .unwrap_or(egl_sys::EGL_NO_CONTEXT);
        let context = unsafe {
            (self.lib.create_context)(ptr(display.0), ptr(config.0), share, attrs.as_ptr())
        };
        if context == egl_sys::EGL_NO_CONTEXT {
            return Err(self.last_error("eglCreateContext"));
        }
        Ok(ContextHandle(context as usize))
    }

    fn create_window_surface(
        &mut self,
        display: DisplayHandle,
        config: ConfigHandle,
        window: &NativeWindow,
    ) -> Result<SurfaceHandle> {
        let attrs = [egl_sys::EGL_NONE];
        let surface = unsafe {
            (self.lib.create_window_surface)(
                ptr(display.0),
                ptr(config.0),
                window.as_ptr(),
                attrs.as_ptr(),
            )
        };
        if surface == egl_sys::EGL_NO_SURFACE {
            return Err(self.last_error("eglCreateWindowSurface"));
        }
        Ok(SurfaceHandle(surface as usize))
    }

    fn create_pbuffer_surface(
        &mut self,
        display: DisplayHandle,
        config: ConfigHandle,
        width: u32,
        height: u32,
    ) -> Result<SurfaceHandle> {
        let attrs = [
            egl_sys::EGL_WIDTH,
            width as EGLint,
            egl_sys::EGL_HEIGHT,
            height as EGLint,
            egl_sys::EGL_NONE,
        ];
        let surface = unsafe {
            (self.lib.create_pbuffer_surface)(ptr(display.0), ptr(config.0), attrs.as_ptr())
        };
        if surface == egl_sys::EGL_NO_SURFACE {
            return Err(self.last_error("eglCreatePbufferSurface"));
        }
        Ok(SurfaceHandle(surface as usize))
    }

    fn make_current(
        &mut self,
        display: DisplayHandle,
        binding: Option<(SurfaceHandle, ContextHandle)>,
    ) -> Result<()> {
        let (surface, context) = match binding {
            Some((s, c)) => (ptr(s.0), ptr(c.0)),
            None => (egl_sys::EGL_NO_SURFACE, egl_sys::EGL_NO_CONTEXT),
        };
        let ok = unsafe { (self.lib.make_current)(ptr(display.0), surface, surface, context) };
        if ok == egl_sys::EGL_FALSE {
            return Err(self.last_error("eglMakeCurrent"));
        }
        Ok(())
    }

    fn swap_buffers(&mut self, display: DisplayHandle, surface: SurfaceHandle) -> Result<()> {
        let ok = unsafe { (self.lib.swap_buffers)(ptr(display.0), ptr(surface.0)) };
        if ok == egl_sys::EGL_FALSE {
            return Err(self.last_error("eglSwapBuffers"));
        }
        Ok(())
    }

    fn set_presentation_time(
        &mut self,
        display: DisplayHandle,
        surface: SurfaceHandle,
        time_ns: i64,
    ) -> Result<bool> {
        let Some(presentation_time) = self.lib.presentation_time else {
            return Ok(false);
        };
        let ok = unsafe { presentation_time(ptr(display.0), ptr(surface.0), time_ns) };
        if ok == egl_sys::EGL_FALSE {
            return Err(self.last_error("eglPresentationTimeANDROID"));
        }
        Ok(true)
    }

    fn load_gl(&mut self) -> Result<Box<dyn GlApi>> {
        let get_proc_address = self.lib.get_proc_address;
        let gl = unsafe {
            glow::Context::from_loader_function(|name| match CString::new(name) {
                Ok(name) => unsafe { get_proc_address(name.as_ptr()) },
                Err(_) => std::ptr::null(),
            })
        };
        Ok(Box::new(GlowApi::new(gl)))
    }

    fn destroy_surface(&mut self, display: DisplayHandle, surface: SurfaceHandle) {
        if unsafe { (self.lib.destroy_surface)(ptr(display.0), ptr(surface.0)) }
            == egl_sys::EGL_FALSE
        {
            warn!("{}", self.last_error("eglDestroySurface"));
        }
    }

    fn destroy_context(&mut self, display: DisplayHandle, context: ContextHandle) {
        if unsafe { (self.lib.destroy_context)(ptr(display.0), ptr(context.0)) }
            == egl_sys::EGL_FALSE
        {
            warn!("{}", self.last_error("eglDestroyContext"));
        }
    }

    fn release_thread(&mut self) {
        unsafe { (self.lib.release_thread)() };
    }

    fn terminate(&mut self, display: DisplayHandle) {
        unsafe { (self.lib.terminate)(ptr(display.0)) };
    }
}
