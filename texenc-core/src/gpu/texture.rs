//! Texture and framebuffer helpers
//!
//! Used by callers inside `EncodeSession::with_rendering_context` to create
//! source textures on the session's context.

use super::gl::{GlApi, TEXTURE_EXTERNAL_OES};
use crate::error::{EncodeError, Result};
use crate::types::Texture;

fn generate_texture(gl: &dyn GlApi, target: u32) -> Result<u32> {
    let texture = gl
        .create_texture()
        .map_err(|e| EncodeError::context_error(format!("Failed to create texture: {}", e)))?;
    gl.bind_texture(target, Some(texture));
    gl.tex_parameter(target, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
    gl.tex_parameter(target, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
    gl.tex_parameter(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
    gl.tex_parameter(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
    Ok(texture)
}

/// Create an RGBA8 2D texture, optionally uploading `pixels`
///
/// `pixels` must hold `width * height * 4` bytes, rows bottom-up.
pub fn generate_2d_texture(
    gl: &dyn GlApi,
    width: u32,
    height: u32,
    pixels: Option<&[u8]>,
) -> Result<Texture> {
    if let Some(pixels) = pixels {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(EncodeError::InvalidFrame(format!(
                "Expected {} bytes of RGBA for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
    }

    let texture = generate_texture(gl, glow::TEXTURE_2D)?;
    gl.tex_image_2d_rgba(width as i32, height as i32, pixels);
    gl.bind_texture(glow::TEXTURE_2D, None);
    Ok(Texture::two_d(texture))
}

/// Create a texture name for an external (streaming) image
pub fn generate_external_texture(gl: &dyn GlApi) -> Result<Texture> {
    let texture = generate_texture(gl, TEXTURE_EXTERNAL_OES)?;
    gl.bind_texture(TEXTURE_EXTERNAL_OES, None);
    Ok(Texture::external(texture))
}

/// Create a framebuffer rendering into a 2D texture
///
/// Returns `None` (and leaves nothing allocated) if the framebuffer is
/// incomplete. The framebuffer stays bound on success.
pub fn generate_framebuffer(gl: &dyn GlApi, texture: &Texture) -> Result<Option<u32>> {
    let framebuffer = gl
        .create_framebuffer()
        .map_err(|e| EncodeError::context_error(format!("Failed to create framebuffer: {}", e)))?;
    gl.bind_framebuffer(Some(framebuffer));
    gl.framebuffer_texture_2d(texture.id);

    if !gl.framebuffer_complete() {
        gl.bind_framebuffer(None);
        gl.delete_framebuffer(framebuffer);
        return Ok(None);
    }
    Ok(Some(framebuffer))
}

/// Bind a framebuffer, or the default one with `None`
pub fn bind_framebuffer(gl: &dyn GlApi, framebuffer: Option<u32>) {
    gl.bind_framebuffer(framebuffer);
}

pub fn delete_textures(gl: &dyn GlApi, textures: &[Texture]) {
    for texture in textures {
        gl.delete_texture(texture.id);
    }
}

pub fn delete_framebuffers(gl: &dyn GlApi, framebuffers: &[u32]) {
    for framebuffer in framebuffers {
        gl.delete_framebuffer(*framebuffer);
    }
}

/// Solid RGBA8 image
pub fn solid_rgba(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.repeat(width as usize * height as usize)
}

/// Horizontal RGBA8 gradient from `from` (left) to `to` (right)
pub fn gradient_rgba(width: u32, height: u32, from: [u8; 4], to: [u8; 4]) -> Vec<u8> {
    let mut row = Vec::with_capacity(width as usize * 4);
    let span = width.saturating_sub(1).max(1);
    for x in 0..width {
        for c in 0..4 {
            let a = from[c] as u32;
            let b = to[c] as u32;
            let v = (a * (span - x.min(span)) + b * x.min(span)) / span;
            row.push(v as u8);
        }
    }
    row.repeat(height as usize)
}
