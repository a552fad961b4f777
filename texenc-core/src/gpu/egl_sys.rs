//! Raw FFI bindings for EGL 1.4
//!
//! The entry points are loaded dynamically at runtime from libEGL so the
//! crate builds and tests on machines without a GPU driver.

#![allow(non_camel_case_types)]
#![allow(dead_code)]

use std::ffi::{c_char, c_void};

pub type EGLDisplay = *mut c_void;
pub type EGLConfig = *mut c_void;
pub type EGLContext = *mut c_void;
pub type EGLSurface = *mut c_void;
pub type EGLNativeDisplayType = *mut c_void;
pub type EGLNativeWindowType = *mut c_void;
pub type EGLBoolean = u32;
pub type EGLint = i32;
pub type EGLenum = u32;

pub const EGL_FALSE: EGLBoolean = 0;
pub const EGL_TRUE: EGLBoolean = 1;

pub const EGL_DEFAULT_DISPLAY: EGLNativeDisplayType = std::ptr::null_mut();
pub const EGL_NO_DISPLAY: EGLDisplay = std::ptr::null_mut();
pub const EGL_NO_CONTEXT: EGLContext = std::ptr::null_mut();
pub const EGL_NO_SURFACE: EGLSurface = std::ptr::null_mut();

pub const EGL_SUCCESS: EGLint = 0x3000;
pub const EGL_NONE: EGLint = 0x3038;

pub const EGL_ALPHA_SIZE: EGLint = 0x3021;
pub const EGL_BLUE_SIZE: EGLint = 0x3022;
pub const EGL_GREEN_SIZE: EGLint = 0x3023;
pub const EGL_RED_SIZE: EGLint = 0x3024;
pub const EGL_DEPTH_SIZE: EGLint = 0x3025;
pub const EGL_STENCIL_SIZE: EGLint = 0x3026;
pub const EGL_SURFACE_TYPE: EGLint = 0x3033;
pub const EGL_RENDERABLE_TYPE: EGLint = 0x3040;
pub const EGL_HEIGHT: EGLint = 0x3056;
pub const EGL_WIDTH: EGLint = 0x3057;
pub const EGL_EXTENSIONS: EGLint = 0x3055;
pub const EGL_CONTEXT_CLIENT_VERSION: EGLint = 0x3098;

pub const EGL_PBUFFER_BIT: EGLint = 0x0001;
pub const EGL_WINDOW_BIT: EGLint = 0x0004;
pub const EGL_OPENGL_ES2_BIT: EGLint = 0x0004;
pub const EGL_OPENGL_ES3_BIT_KHR: EGLint = 0x0040;

pub const EGL_OPENGL_ES_API: EGLenum = 0x30A0;

/// `EGL_ANDROID_recordable`: config usable as an encoder input surface
pub const EGL_RECORDABLE_ANDROID: EGLint = 0x3142;

pub type FnGetDisplay = unsafe extern "C" fn(display_id: EGLNativeDisplayType) -> EGLDisplay;
pub type FnInitialize =
    unsafe extern "C" fn(dpy: EGLDisplay, major: *mut EGLint, minor: *mut EGLint) -> EGLBoolean;
pub type FnQueryString = unsafe extern "C" fn(dpy: EGLDisplay, name: EGLint) -> *const c_char;
pub type FnBindApi = unsafe extern "C" fn(api: EGLenum) -> EGLBoolean;
pub type FnChooseConfig = unsafe extern "C" fn(
    dpy: EGLDisplay,
    attrib_list: *const EGLint,
    configs: *mut EGLConfig,
    config_size: EGLint,
    num_config: *mut EGLint,
) -> EGLBoolean;
pub type FnCreateContext = unsafe extern "C" fn(
    dpy: EGLDisplay,
    config: EGLConfig,
    share_context: EGLContext,
    attrib_list: *const EGLint,
) -> EGLContext;
pub type FnCreateWindowSurface = unsafe extern "C" fn(
    dpy: EGLDisplay,
    config: EGLConfig,
    win: EGLNativeWindowType,
    attrib_list: *const EGLint,
) -> EGLSurface;
pub type FnCreatePbufferSurface = unsafe extern "C" fn(
    dpy: EGLDisplay,
    config: EGLConfig,
    attrib_list: *const EGLint,
) -> EGLSurface;
pub type FnMakeCurrent = unsafe extern "C" fn(
    dpy: EGLDisplay,
    draw: EGLSurface,
    read: EGLSurface,
    ctx: EGLContext,
) -> EGLBoolean;
pub type FnSwapBuffers = unsafe extern "C" fn(dpy: EGLDisplay, surface: EGLSurface) -> EGLBoolean;
pub type FnDestroySurface =
    unsafe extern "C" fn(dpy: EGLDisplay, surface: EGLSurface) -> EGLBoolean;
pub type FnDestroyContext = unsafe extern "C" fn(dpy: EGLDisplay, ctx: EGLContext) -> EGLBoolean;
pub type FnReleaseThread = unsafe extern "C" fn() -> EGLBoolean;
pub type FnTerminate = unsafe extern "C" fn(dpy: EGLDisplay) -> EGLBoolean;
pub type FnGetError = unsafe extern "C" fn() -> EGLint;
pub type FnGetProcAddress = unsafe extern "C" fn(procname: *const c_char) -> *const c_void;
pub type FnPresentationTimeAndroid =
    unsafe extern "C" fn(dpy: EGLDisplay, surface: EGLSurface, time_ns: i64) -> EGLBoolean;

/// Library paths to search for libEGL
pub const EGL_LIB_PATHS: &[&str] = &[
    "libEGL.so.1",
    "libEGL.so",
    "/usr/lib/x86_64-linux-gnu/libEGL.so.1",
    "/usr/lib/aarch64-linux-gnu/libEGL.so.1",
    "/usr/lib64/libEGL.so.1",
    "/usr/lib/libEGL.so.1",
];

/// Dynamically loaded EGL library
pub struct EglLib {
    _lib: libloading::Library,
    pub get_display: FnGetDisplay,
    pub initialize: FnInitialize,
    pub query_string: FnQueryString,
    pub bind_api: FnBindApi,
    pub choose_config: FnChooseConfig,
    pub create_context: FnCreateContext,
    pub create_window_surface: FnCreateWindowSurface,
    pub create_pbuffer_surface: FnCreatePbufferSurface,
    pub make_current: FnMakeCurrent,
    pub swap_buffers: FnSwapBuffers,
    pub destroy_surface: FnDestroySurface,
    pub destroy_context: FnDestroyContext,
    pub release_thread: FnReleaseThread,
    pub terminate: FnTerminate,
    pub get_error: FnGetError,
    pub get_proc_address: FnGetProcAddress,
    /// Only present on drivers exposing `EGL_ANDROID_presentation_time`
    pub presentation_time: Option<FnPresentationTimeAndroid>,
}

impl EglLib {
    /// Try to load libEGL from standard paths
    pub fn load() -> Result<Self, String> {
        let mut last_error = String::from("no candidate paths");
        for path in EGL_LIB_PATHS {
            match Self::load_from_path(path) {
                Ok(lib) => {
                    tracing::debug!("Loaded EGL library from: {}", path);
                    return Ok(lib);
                }
                Err(e) => last_error = e,
            }
        }
        Err(format!("Failed to load libEGL from any known path ({})", last_error))
    }

    /// Load the library from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, String> {
        // SAFETY: libEGL is a system library; the signatures above follow the
        // Khronos EGL 1.4 headers. Function pointers are copied out of the
        // symbols while `lib` is alive and `lib` is stored alongside them.
        unsafe {
            let lib = libloading::Library::new(path)
                .map_err(|e| format!("Failed to load {}: {}", path, e))?;

            macro_rules! sym {
                ($ty:ty, $name:literal) => {
                    *lib.get::<$ty>($name).map_err(|e| {
                        format!(
                            "Failed to get {}: {}",
                            String::from_utf8_lossy(&$name[..$name.len() - 1]),
                            e
                        )
                    })?
                };
            }

            let get_display: FnGetDisplay = sym!(FnGetDisplay, b"eglGetDisplay\0");
            let initialize: FnInitialize = sym!(FnInitialize, b"eglInitialize\0");
            let query_string: FnQueryString = sym!(FnQueryString, b"eglQueryString\0");
            let bind_api: FnBindApi = sym!(FnBindApi, b"eglBindAPI\0");
            let choose_config: FnChooseConfig = sym!(FnChooseConfig, b"eglChooseConfig\0");
            let create_context: FnCreateContext = sym!(FnCreateContext, b"eglCreateContext\0");
            let create_window_surface: FnCreateWindowSurface =
                sym!(FnCreateWindowSurface, b"eglCreateWindowSurface\0");
            let create_pbuffer_surface: FnCreatePbufferSurface =
                sym!(FnCreatePbufferSurface, b"eglCreatePbufferSurface\0");
            let make_current: FnMakeCurrent = sym!(FnMakeCurrent, b"eglMakeCurrent\0");
            let swap_buffers: FnSwapBuffers = sym!(FnSwapBuffers, b"eglSwapBuffers\0");
            let destroy_surface: FnDestroySurface = sym!(FnDestroySurface, b"eglDestroySurface\0");
            let destroy_context: FnDestroyContext = sym!(FnDestroyContext, b"eglDestroyContext\0");
            let release_thread: FnReleaseThread = sym!(FnReleaseThread, b"eglReleaseThread\0");
            let terminate: FnTerminate = sym!(FnTerminate, b"eglTerminate\0");
            let get_error: FnGetError = sym!(FnGetError, b"eglGetError\0");
            let get_proc_address: FnGetProcAddress =
                sym!(FnGetProcAddress, b"eglGetProcAddress\0");

            let presentation_time = {
                let ptr = get_proc_address(c"eglPresentationTimeANDROID".as_ptr());
                if ptr.is_null() {
                    None
                } else {
                    Some(std::mem::transmute::<*const c_void, FnPresentationTimeAndroid>(ptr))
                }
            };

            Ok(Self {
                _lib: lib,
                get_display,
                initialize,
                query_string,
                bind_api,
                choose_config,
                create_context,
                create_window_surface,
                create_pbuffer_surface,
                make_current,
                swap_buffers,
                destroy_surface,
                destroy_context,
                release_thread,
                terminate,
                get_error,
                get_proc_address,
                presentation_time,
            })
        }
    }
}

/// Human-readable name for an EGL error code
pub fn error_name(code: EGLint) -> &'static str {
    match code {
        0x3000 => "EGL_SUCCESS",
        0x3001 => "EGL_NOT_INITIALIZED",
        0x3002 => "EGL_BAD_ACCESS",
        0x3003 => "EGL_BAD_ALLOC",
        0x3004 => "EGL_BAD_ATTRIBUTE",
        0x3005 => "EGL_BAD_CONFIG",
        0x3006 => "EGL_BAD_CONTEXT",
        0x3007 => "EGL_BAD_CURRENT_SURFACE",
        0x3008 => "EGL_BAD_DISPLAY",
        0x3009 => "EGL_BAD_MATCH",
        0x300A => "EGL_BAD_NATIVE_PIXMAP",
        0x300B => "EGL_BAD_NATIVE_WINDOW",
        0x300C => "EGL_BAD_PARAMETER",
        0x300D => "EGL_BAD_SURFACE",
        0x300E => "EGL_CONTEXT_LOST",
        _ => "EGL_UNKNOWN_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names() {
        assert_eq!(error_name(EGL_SUCCESS), "EGL_SUCCESS");
        assert_eq!(error_name(0x3009), "EGL_BAD_MATCH");
        assert_eq!(error_name(0x1234), "EGL_UNKNOWN_ERROR");
    }
}
