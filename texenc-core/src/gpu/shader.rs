//! Full-screen-quad blit program

use tracing::debug;

use super::gl::{texture_target, GlApi, GlShaderKind};
use super::viewport::Viewport;
use crate::error::{EncodeError, Result, ShaderStage};
use crate::types::{Mat4, TextureKind};

/// Shader variant, selected by the source texture's bind target
pub type ShaderKind = TextureKind;

const POSITION_ATTRIB: u32 = 0;
const TEX_COORD_ATTRIB: u32 = 1;

/// Vertex shader shared by both variants
pub const VERTEX_SHADER: &str = r#"#version 300 es
precision mediump float;
layout(location = 0) in vec4 position;
layout(location = 1) in vec4 inputTextureCoordinate;
uniform mat4 textureTransform;
out vec2 textureCoordinate;
void main()
{
    gl_Position = position;
    textureCoordinate = (textureTransform * inputTextureCoordinate).xy;
}
"#;

/// Fragment shader sampling a `GL_TEXTURE_2D`
pub const TEXTURE_2D_FRAGMENT_SHADER: &str = r#"#version 300 es
precision mediump float;
in highp vec2 textureCoordinate;
uniform sampler2D inputImageTexture;
out vec4 fragColor;
void main()
{
    fragColor = texture(inputImageTexture, textureCoordinate);
}
"#;

/// Fragment shader sampling a `GL_TEXTURE_EXTERNAL_OES`
pub const EXTERNAL_FRAGMENT_SHADER: &str = r#"#version 300 es
#extension GL_OES_EGL_image_external_essl3 : require
precision mediump float;
in highp vec2 textureCoordinate;
uniform samplerExternalOES inputImageTexture;
out vec4 fragColor;
void main()
{
    fragColor = texture(inputImageTexture, textureCoordinate);
}
"#;

/// Triangle-strip quad covering clip space
const QUAD_POSITIONS: [f32; 8] = [
    -1.0, -1.0, // bottom left
    1.0, -1.0, // bottom right
    -1.0, 1.0, // top left
    1.0, 1.0, // top right
];

const QUAD_TEX_COORDS: [f32; 8] = [
    0.0, 0.0, //
    1.0, 0.0, //
    0.0, 1.0, //
    1.0, 1.0, //
];

/// Fragment source for a variant
pub fn fragment_source(kind: ShaderKind) -> &'static str {
    match kind {
        TextureKind::Texture2D => TEXTURE_2D_FRAGMENT_SHADER,
        TextureKind::External => EXTERNAL_FRAGMENT_SHADER,
    }
}

/// Linked blit program plus its quad vertex buffers
#[derive(Debug)]
pub struct ShaderProgram {
    kind: ShaderKind,
    program: Option<u32>,
    position_buffer: u32,
    tex_coord_buffer: u32,
    sampler_location: Option<u32>,
    transform_location: Option<u32>,
}

impl ShaderProgram {
    /// Compile the built-in program for `kind`
    pub fn compile(gl: &dyn GlApi, kind: ShaderKind) -> Result<Self> {
        Self::compile_with_source(gl, kind, fragment_source(kind))
    }

    /// Compile with a custom fragment shader
    ///
    /// The fragment shader must declare `inputImageTexture` and read
    /// `textureCoordinate`.
    pub fn compile_with_source(gl: &dyn GlApi, kind: ShaderKind, fragment: &str) -> Result<Self> {
        let program = link_program(gl, VERTEX_SHADER, fragment)?;

        let buffers = gl
            .create_vertex_buffer(&QUAD_POSITIONS)
            .and_then(|positions| match gl.create_vertex_buffer(&QUAD_TEX_COORDS) {
                Ok(tex_coords) => Ok((positions, tex_coords)),
                Err(e) => {
                    gl.delete_buffer(positions);
                    Err(e)
                }
            });
        let (position_buffer, tex_coord_buffer) = match buffers {
            Ok(buffers) => buffers,
            Err(e) => {
                gl.delete_program(program);
                return Err(EncodeError::context_error(format!(
                    "Failed to create quad buffers: {}",
                    e
                )));
            }
        };

        debug!("Compiled {:?} shader program {}", kind, program);

        Ok(Self {
            kind,
            program: Some(program),
            position_buffer,
            tex_coord_buffer,
            sampler_location: gl.uniform_location(program, "inputImageTexture"),
            transform_location: gl.uniform_location(program, "textureTransform"),
        })
    }

    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    pub fn is_released(&self) -> bool {
        self.program.is_none()
    }

    /// Blit `texture` into the current render target
    ///
    /// Requires a current context. Does not swap. No-op after release.
    pub fn draw_from(
        &self,
        gl: &dyn GlApi,
        texture: u32,
        viewport: Viewport,
        transform: &Mat4,
        clear: bool,
    ) {
        let Some(program) = self.program else {
            return;
        };
        let target = texture_target(self.kind);

        gl.use_program(Some(program));
        gl.enable_vertex_attrib(POSITION_ATTRIB, self.position_buffer, 2);
        gl.enable_vertex_attrib(TEX_COORD_ATTRIB, self.tex_coord_buffer, 2);

        gl.active_texture(0);
        gl.bind_texture(target, Some(texture));
        if let Some(location) = self.sampler_location {
            gl.uniform_1i(location, 0);
        }
        if let Some(location) = self.transform_location {
            gl.uniform_matrix_4fv(location, transform);
        }

        gl.viewport(viewport.x, viewport.y, viewport.width, viewport.height);
        if clear {
            gl.clear_color_buffer();
        }
        gl.draw_triangle_strip(0, 4);

        gl.bind_texture(target, None);
        gl.disable_vertex_attrib(POSITION_ATTRIB);
        gl.disable_vertex_attrib(TEX_COORD_ATTRIB);
    }

    /// Delete the program and quad buffers; idempotent
    pub fn release(&mut self, gl: &dyn GlApi) {
        if let Some(program) = self.program.take() {
            gl.delete_program(program);
            gl.delete_buffer(self.position_buffer);
            gl.delete_buffer(self.tex_coord_buffer);
            debug!("Released {:?} shader program {}", self.kind, program);
        }
    }
}

fn compile_stage(gl: &dyn GlApi, stage: ShaderStage, source: &str) -> Result<u32> {
    let kind = match stage {
        ShaderStage::Vertex => GlShaderKind::Vertex,
        ShaderStage::Fragment => GlShaderKind::Fragment,
    };
    let shader = gl.create_shader(kind).map_err(|e| EncodeError::Compile {
        stage,
        log: format!("create_shader failed: {}", e),
    })?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.shader_compile_status(shader) {
        let log = gl.shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(EncodeError::Compile { stage, log });
    }
    Ok(shader)
}

fn link_program(gl: &dyn GlApi, vertex: &str, fragment: &str) -> Result<u32> {
    let vs = compile_stage(gl, ShaderStage::Vertex, vertex)?;
    let fs = match compile_stage(gl, ShaderStage::Fragment, fragment) {
        Ok(fs) => fs,
        Err(e) => {
            gl.delete_shader(vs);
            return Err(e);
        }
    };

    let program = match gl.create_program() {
        Ok(program) => program,
        Err(e) => {
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(EncodeError::Link(format!("create_program failed: {}", e)));
        }
    };
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    if !gl.program_link_status(program) {
        let log = gl.program_info_log(program);
        gl.delete_program(program);
        return Err(EncodeError::Link(log));
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_variants() {
        assert!(fragment_source(TextureKind::Texture2D).contains("sampler2D"));
        assert!(fragment_source(TextureKind::External).contains("samplerExternalOES"));
        assert!(fragment_source(TextureKind::External).contains("GL_OES_EGL_image_external_essl3"));
    }

    #[test]
    fn test_quad_is_full_screen_strip() {
        assert_eq!(QUAD_POSITIONS.len(), 8);
        assert_eq!(&QUAD_POSITIONS[..2], &[-1.0, -1.0]);
        assert_eq!(&QUAD_POSITIONS[6..], &[1.0, 1.0]);
        assert_eq!(&QUAD_TEX_COORDS[6..], &[1.0, 1.0]);
    }
}
