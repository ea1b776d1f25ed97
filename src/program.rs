use bevy::prelude::Resource;
use std::fmt;
use std::num::NonZeroU32;

/// Opaque name of a linked GPU program.
///
/// Zero is never a valid program name, so a handle always refers to an object
/// the backend actually created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(NonZeroU32);

impl ProgramHandle {
    /// Wraps a raw program name. Returns `None` for zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn from_non_zero(raw: NonZeroU32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn as_non_zero(self) -> NonZeroU32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

/// GPU operations needed to build and retire shader programs.
///
/// [`GlBackend`](crate::GlBackend) implements this over a `glow` context.
/// Failing operations return the driver's info log as the error string.
///
/// # Example
///
/// ```rust,no_run
/// use glsl_hotreload::{ActiveProgram, GlBackend, ProgramSources};
///
/// # fn context() -> glow::Context { unimplemented!() }
/// let gl = context();
/// let mut backend = GlBackend::new(&gl);
/// let mut active = ActiveProgram::default();
///
/// let sources = ProgramSources::new("vertex_shader.glsl", "fragment_shader.glsl");
/// let program = sources.build(&mut backend).expect("initial shaders must build");
/// active.install(&mut backend, program);
/// ```
pub trait ProgramBackend {
    type Shader: Copy;

    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader, String>;

    /// Uploads `source` and compiles it.
    fn compile_shader(&mut self, shader: Self::Shader, source: &str) -> Result<(), String>;

    fn create_program(&mut self) -> Result<ProgramHandle, String>;

    fn attach_shader(&mut self, program: ProgramHandle, shader: Self::Shader);

    fn detach_shader(&mut self, program: ProgramHandle, shader: Self::Shader);

    fn link_program(&mut self, program: ProgramHandle) -> Result<(), String>;

    fn delete_shader(&mut self, shader: Self::Shader);

    fn delete_program(&mut self, program: ProgramHandle);
}

/// The program the render loop draws with.
///
/// The render loop reads [`ActiveProgram::current`] once per frame; the reloader
/// writes it through [`ActiveProgram::install`] after a successful rebuild.
#[derive(Resource, Debug, Default)]
pub struct ActiveProgram {
    current: Option<ProgramHandle>,
    generation: u64,
}

impl ActiveProgram {
    pub fn current(&self) -> Option<ProgramHandle> {
        self.current
    }

    /// Number of programs installed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Makes `program` current and deletes the program it replaces.
    ///
    /// Returns the superseded handle, which is no longer valid. Installing the
    /// handle that is already current is a no-op.
    pub fn install<B: ProgramBackend>(
        &mut self,
        backend: &mut B,
        program: ProgramHandle,
    ) -> Option<ProgramHandle> {
        if self.current == Some(program) {
            return None;
        }

        let superseded = self.current.replace(program);
        self.generation += 1;
        if let Some(old) = superseded {
            backend.delete_program(old);
        }
        superseded
    }

    /// Deletes the current program, leaving nothing active.
    pub fn release<B: ProgramBackend>(&mut self, backend: &mut B) {
        if let Some(program) = self.current.take() {
            backend.delete_program(program);
        }
    }
}
