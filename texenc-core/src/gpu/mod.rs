//! GPU side of the pipeline
//!
//! This module provides:
//! - EGL display driver seam and its libEGL implementation
//! - Rendering context bound to an off-screen buffer or an encoder surface
//! - Full-screen-quad blit shaders for 2D and external textures
//! - Texture/framebuffer helpers and aspect-fit viewport math

mod context;
mod driver;
pub mod egl_sys;
mod gl;
mod shader;
pub mod texture;
mod viewport;

pub use context::{
    CurrentGuard, RenderingContext, SurfaceTarget, DEFAULT_API_VERSION, RECORDABLE_EXTENSION,
};
pub use driver::{
    ConfigAttributes, ConfigHandle, ContextHandle, DisplayDriver, DisplayHandle, EglDriver,
    SurfaceHandle, SurfaceKind,
};
pub use gl::{texture_target, GlApi, GlShaderKind, GlowApi, TEXTURE_EXTERNAL_OES};
pub use shader::{
    fragment_source, ShaderKind, ShaderProgram, EXTERNAL_FRAGMENT_SHADER,
    TEXTURE_2D_FRAGMENT_SHADER, VERTEX_SHADER,
};
pub use viewport::{aspect_fit, Viewport};

/// Check whether libEGL can be loaded on this system
pub fn egl_available() -> bool {
    EglDriver::is_available()
}
