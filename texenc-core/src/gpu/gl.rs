//! OpenGL ES function table
//!
//! [`GlApi`] is the narrow slice of GLES 3.0 the blit path needs, expressed
//! with plain `u32` object names so the rendering code can be driven by the
//! real driver (through `glow`) or by a recording fake in tests.

use std::num::NonZeroU32;

use glow::HasContext;

use crate::types::TextureKind;

/// `GL_TEXTURE_EXTERNAL_OES` from `OES_EGL_image_external`
pub const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

/// Shader stage to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlShaderKind {
    Vertex,
    Fragment,
}

/// GL bind target for a texture kind
pub fn texture_target(kind: TextureKind) -> u32 {
    match kind {
        TextureKind::Texture2D => glow::TEXTURE_2D,
        TextureKind::External => TEXTURE_EXTERNAL_OES,
    }
}

/// GLES entry points used by shaders, texture helpers and read-back
///
/// All calls require the owning context to be current on the calling thread.
pub trait GlApi {
    fn create_shader(&self, kind: GlShaderKind) -> Result<u32, String>;
    fn shader_source(&self, shader: u32, source: &str);
    fn compile_shader(&self, shader: u32);
    fn shader_compile_status(&self, shader: u32) -> bool;
    fn shader_info_log(&self, shader: u32) -> String;
    fn delete_shader(&self, shader: u32);

    fn create_program(&self) -> Result<u32, String>;
    fn attach_shader(&self, program: u32, shader: u32);
    fn detach_shader(&self, program: u32, shader: u32);
    fn link_program(&self, program: u32);
    fn program_link_status(&self, program: u32) -> bool;
    fn program_info_log(&self, program: u32) -> String;
    fn use_program(&self, program: Option<u32>);
    fn delete_program(&self, program: u32);

    fn uniform_location(&self, program: u32, name: &str) -> Option<u32>;
    fn uniform_1i(&self, location: u32, value: i32);
    fn uniform_matrix_4fv(&self, location: u32, matrix: &[f32; 16]);

    /// Create an `ARRAY_BUFFER` holding `data` (static draw)
    fn create_vertex_buffer(&self, data: &[f32]) -> Result<u32, String>;
    fn delete_buffer(&self, buffer: u32);
    /// Point attribute `location` at `buffer` (tightly packed floats) and enable it
    fn enable_vertex_attrib(&self, location: u32, buffer: u32, components: i32);
    fn disable_vertex_attrib(&self, location: u32);

    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<u32>);
    fn create_texture(&self) -> Result<u32, String>;
    fn tex_parameter(&self, target: u32, parameter: u32, value: i32);
    /// Allocate RGBA8 storage for the bound 2D texture, optionally uploading pixels
    fn tex_image_2d_rgba(&self, width: i32, height: i32, pixels: Option<&[u8]>);
    fn delete_texture(&self, texture: u32);

    fn create_framebuffer(&self) -> Result<u32, String>;
    fn bind_framebuffer(&self, framebuffer: Option<u32>);
    fn framebuffer_texture_2d(&self, texture: u32);
    fn framebuffer_complete(&self) -> bool;
    fn delete_framebuffer(&self, framebuffer: u32);

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color_buffer(&self);
    fn draw_triangle_strip(&self, first: i32, count: i32);
    /// Read RGBA8 pixels from the current read framebuffer into `out`
    fn read_pixels_rgba(&self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]);
    fn get_error(&self) -> u32;
}

/// [`GlApi`] backed by a `glow` context loaded from the EGL driver
pub struct GlowApi {
    gl: glow::Context,
}

impl GlowApi {
    /// Wrap an already loaded `glow` context
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }
}

fn shader_name(id: u32) -> Option<glow::NativeShader> {
    NonZeroU32::new(id).map(glow::NativeShader)
}

fn program_name(id: u32) -> Option<glow::NativeProgram> {
    NonZeroU32::new(id).map(glow::NativeProgram)
}

fn buffer_name(id: u32) -> Option<glow::NativeBuffer> {
    NonZeroU32::new(id).map(glow::NativeBuffer)
}

fn texture_name(id: u32) -> Option<glow::NativeTexture> {
    NonZeroU32::new(id).map(glow::NativeTexture)
}

fn framebuffer_name(id: u32) -> Option<glow::NativeFramebuffer> {
    NonZeroU32::new(id).map(glow::NativeFramebuffer)
}

// SAFETY (whole impl): every method forwards to the matching GL entry point
// loaded for the context this table was created from. Callers only use the
// table on the confinement thread while that context is current, and names
// passed in were produced by the same context.
impl GlApi for GlowApi {
    fn create_shader(&self, kind: GlShaderKind) -> Result<u32, String> {
        let stage = match kind {
            GlShaderKind::Vertex => glow::VERTEX_SHADER,
            GlShaderKind::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { self.gl.create_shader(stage) }.map(|s| s.0.get())
    }

    fn shader_source(&self, shader: u32, source: &str) {
        if let Some(shader) = shader_name(shader) {
            unsafe { self.gl.shader_source(shader, source) }
        }
    }

    fn compile_shader(&self, shader: u32) {
        if let Some(shader) = shader_name(shader) {
            unsafe { self.gl.compile_shader(shader) }
        }
    }

    fn shader_compile_status(&self, shader: u32) -> bool {
        shader_name(shader)
            .map(|s| unsafe { self.gl.get_shader_compile_status(s) })
            .unwrap_or(false)
    }

    fn shader_info_log(&self, shader: u32) -> String {
        shader_name(shader)
            .map(|s| unsafe { self.gl.get_shader_info_log(s) })
            .unwrap_or_default()
    }

    fn delete_shader(&self, shader: u32) {
        if let Some(shader) = shader_name(shader) {
            unsafe { self.gl.delete_shader(shader) }
        }
    }

    fn create_program(&self) -> Result<u32, String> {
        unsafe { self.gl.create_program() }.map(|p| p.0.get())
    }

    fn attach_shader(&self, program: u32, shader: u32) {
        if let (Some(program), Some(shader)) = (program_name(program), shader_name(shader)) {
            unsafe { self.gl.attach_shader(program, shader) }
        }
    }

    fn detach_shader(&self, program: u32, shader: u32) {
        if let (Some(program), Some(shader)) = (program_name(program), shader_name(shader)) {
            unsafe { self.gl.detach_shader(program, shader) }
        }
    }

    fn link_program(&self, program: u32) {
        if let Some(program) = program_name(program) {
            unsafe { self.gl.link_program(program) }
        }
    }

    fn program_link_status(&self, program: u32) -> bool {
        program_name(program)
            .map(|p| unsafe { self.gl.get_program_link_status(p) })
            .unwrap_or(false)
    }

    fn program_info_log(&self, program: u32) -> String {
        program_name(program)
            .map(|p| unsafe { self.gl.get_program_info_log(p) })
            .unwrap_or_default()
    }

    fn use_program(&self, program: Option<u32>) {
        unsafe { self.gl.use_program(program.and_then(program_name)) }
    }

    fn delete_program(&self, program: u32) {
        if let Some(program) = program_name(program) {
            unsafe { self.gl.delete_program(program) }
        }
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<u32> {
        let program = program_name(program)?;
        unsafe { self.gl.get_uniform_location(program, name) }.map(|l| l.0)
    }

    fn uniform_1i(&self, location: u32, value: i32) {
        let location = glow::NativeUniformLocation(location);
        unsafe { self.gl.uniform_1_i32(Some(&location), value) }
    }

    fn uniform_matrix_4fv(&self, location: u32, matrix: &[f32; 16]) {
        let location = glow::NativeUniformLocation(location);
        unsafe {
            self.gl
                .uniform_matrix_4_f32_slice(Some(&location), false, matrix)
        }
    }

    fn create_vertex_buffer(&self, data: &[f32]) -> Result<u32, String> {
        unsafe {
            let buffer = self.gl.create_buffer()?;
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(data),
                glow::STATIC_DRAW,
            );
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
            Ok(buffer.0.get())
        }
    }

    fn delete_buffer(&self, buffer: u32) {
        if let Some(buffer) = buffer_name(buffer) {
            unsafe { self.gl.delete_buffer(buffer) }
        }
    }

    fn enable_vertex_attrib(&self, location: u32, buffer: u32, components: i32) {
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, buffer_name(buffer));
            self.gl
                .vertex_attrib_pointer_f32(location, components, glow::FLOAT, false, 0, 0);
            self.gl.enable_vertex_attrib_array(location);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn disable_vertex_attrib(&self, location: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(location) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: u32, texture: Option<u32>) {
        unsafe { self.gl.bind_texture(target, texture.and_then(texture_name)) }
    }

    fn create_texture(&self) -> Result<u32, String> {
        unsafe { self.gl.create_texture() }.map(|t| t.0.get())
    }

    fn tex_parameter(&self, target: u32, parameter: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, parameter, value) }
    }

    fn tex_image_2d_rgba(&self, width: i32, height: i32, pixels: Option<&[u8]>) {
        unsafe {
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                pixels,
            )
        }
    }

    fn delete_texture(&self, texture: u32) {
        if let Some(texture) = texture_name(texture) {
            unsafe { self.gl.delete_texture(texture) }
        }
    }

    fn create_framebuffer(&self) -> Result<u32, String> {
        unsafe { self.gl.create_framebuffer() }.map(|f| f.0.get())
    }

    fn bind_framebuffer(&self, framebuffer: Option<u32>) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, framebuffer.and_then(framebuffer_name))
        }
    }

    fn framebuffer_texture_2d(&self, texture: u32) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                texture_name(texture),
                0,
            )
        }
    }

    fn framebuffer_complete(&self) -> bool {
        unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE }
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        if let Some(framebuffer) = framebuffer_name(framebuffer) {
            unsafe { self.gl.delete_framebuffer(framebuffer) }
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn clear_color_buffer(&self) {
        unsafe {
            self.gl.clear_color(0.0, 0.0, 0.0, 1.0);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn draw_triangle_strip(&self, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(glow::TRIANGLE_STRIP, first, count) }
    }

    fn read_pixels_rgba(&self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]) {
        unsafe {
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            self.gl.read_pixels(
                x,
                y,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(out),
            );
        }
    }

    fn get_error(&self) -> u32 {
        unsafe { self.gl.get_error() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_targets() {
        assert_eq!(texture_target(TextureKind::Texture2D), glow::TEXTURE_2D);
        assert_eq!(texture_target(TextureKind::External), 0x8D65);
    }
}
