//! OpenGL backend over `glow`.

use crate::program::{ActiveProgram, ProgramBackend, ProgramHandle, ShaderStage};
use glow::HasContext;

/// [`ProgramBackend`] for a current OpenGL context.
///
/// The context must stay current on the calling thread for as long as the
/// backend is used.
pub struct GlBackend<'gl> {
    gl: &'gl glow::Context,
}

impl<'gl> GlBackend<'gl> {
    pub fn new(gl: &'gl glow::Context) -> Self {
        Self { gl }
    }

    pub fn context(&self) -> &'gl glow::Context {
        self.gl
    }
}

fn native(program: ProgramHandle) -> glow::NativeProgram {
    glow::NativeProgram(program.as_non_zero())
}

impl ProgramBackend for GlBackend<'_> {
    type Shader = glow::NativeShader;

    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader, String> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { self.gl.create_shader(kind) }
    }

    fn compile_shader(&mut self, shader: Self::Shader, source: &str) -> Result<(), String> {
        unsafe {
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(())
            } else {
                Err(self.gl.get_shader_info_log(shader))
            }
        }
    }

    fn create_program(&mut self) -> Result<ProgramHandle, String> {
        let program = unsafe { self.gl.create_program()? };
        Ok(ProgramHandle::from_non_zero(program.0))
    }

    fn attach_shader(&mut self, program: ProgramHandle, shader: Self::Shader) {
        unsafe { self.gl.attach_shader(native(program), shader) }
    }

    fn detach_shader(&mut self, program: ProgramHandle, shader: Self::Shader) {
        unsafe { self.gl.detach_shader(native(program), shader) }
    }

    fn link_program(&mut self, program: ProgramHandle) -> Result<(), String> {
        let program = native(program);
        unsafe {
            self.gl.link_program(program);
            if self.gl.get_program_link_status(program) {
                Ok(())
            } else {
                Err(self.gl.get_program_info_log(program))
            }
        }
    }

    fn delete_shader(&mut self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        unsafe { self.gl.delete_program(native(program)) }
    }
}

/// Binds the active program for the next draw, or unbinds if there is none.
pub fn bind_active(gl: &glow::Context, active: &ActiveProgram) {
    unsafe { gl.use_program(active.current().map(native)) }
}

/// How a context parameter is queried and printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    Int,
    Pair,
    Flag,
}

// GL_MAX_VARYING_FLOATS is left out: it was removed from core profiles, where
// querying it only raises GL_INVALID_ENUM.
const CONTEXT_PARAMS: &[(u32, &str, Query)] = &[
    (
        glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS,
        "GL_MAX_COMBINED_TEXTURE_IMAGE_UNITS",
        Query::Int,
    ),
    (glow::MAX_CUBE_MAP_TEXTURE_SIZE, "GL_MAX_CUBE_MAP_TEXTURE_SIZE", Query::Int),
    (glow::MAX_DRAW_BUFFERS, "GL_MAX_DRAW_BUFFERS", Query::Int),
    (
        glow::MAX_FRAGMENT_UNIFORM_COMPONENTS,
        "GL_MAX_FRAGMENT_UNIFORM_COMPONENTS",
        Query::Int,
    ),
    (glow::MAX_TEXTURE_IMAGE_UNITS, "GL_MAX_TEXTURE_IMAGE_UNITS", Query::Int),
    (glow::MAX_TEXTURE_SIZE, "GL_MAX_TEXTURE_SIZE", Query::Int),
    (glow::MAX_VERTEX_ATTRIBS, "GL_MAX_VERTEX_ATTRIBS", Query::Int),
    (
        glow::MAX_VERTEX_TEXTURE_IMAGE_UNITS,
        "GL_MAX_VERTEX_TEXTURE_IMAGE_UNITS",
        Query::Int,
    ),
    (
        glow::MAX_VERTEX_UNIFORM_COMPONENTS,
        "GL_MAX_VERTEX_UNIFORM_COMPONENTS",
        Query::Int,
    ),
    (glow::MAX_VIEWPORT_DIMS, "GL_MAX_VIEWPORT_DIMS", Query::Pair),
    (glow::STEREO, "GL_STEREO", Query::Flag),
];

/// Logs driver identification and the implementation limits of the context.
pub fn log_context_params(gl: &glow::Context) {
    unsafe {
        log::info!("renderer: {}", gl.get_parameter_string(glow::RENDERER));
        log::info!("OpenGL version: {}", gl.get_parameter_string(glow::VERSION));
        log::info!(
            "GLSL version: {}",
            gl.get_parameter_string(glow::SHADING_LANGUAGE_VERSION)
        );
        for &(param, name, query) in CONTEXT_PARAMS {
            match query {
                Query::Int => log::info!("{name} {}", gl.get_parameter_i32(param)),
                Query::Pair => {
                    let mut dims = [0i32; 2];
                    gl.get_parameter_i32_slice(param, &mut dims);
                    log::info!("{name} {} {}", dims[0], dims[1]);
                }
                Query::Flag => log::info!("{name} {}", u8::from(gl.get_parameter_bool(param))),
            }
        }
    }
}
