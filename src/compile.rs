use crate::error::{ReloadError, Result};
use crate::paths::join_resource;
use crate::program::{ProgramBackend, ProgramHandle, ShaderStage};
use crate::source::ShaderText;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Vertex and fragment source files that make up one program.
///
/// # Example
///
/// ```rust,no_run
/// use glsl_hotreload::{BinaryDir, ProgramSources};
///
/// let dir = BinaryDir::resolve().expect("cannot locate executable");
/// let sources =
///     ProgramSources::in_dir(dir.as_path(), "vertex_shader.glsl", "fragment_shader.glsl");
/// assert!(sources.names_file(std::ffi::OsStr::new("fragment_shader.glsl")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSources {
    vertex: PathBuf,
    fragment: PathBuf,
}

impl ProgramSources {
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Sources named `vertex` and `fragment` inside `dir`.
    pub fn in_dir(dir: &Path, vertex: impl AsRef<OsStr>, fragment: impl AsRef<OsStr>) -> Self {
        Self::new(join_resource(dir, vertex), join_resource(dir, fragment))
    }

    pub fn vertex(&self) -> &Path {
        &self.vertex
    }

    pub fn fragment(&self) -> &Path {
        &self.fragment
    }

    /// True if `name` is the file name of either source.
    pub fn names_file(&self, name: &OsStr) -> bool {
        [&self.vertex, &self.fragment]
            .iter()
            .any(|p| p.file_name() == Some(name))
    }

    /// Loads both sources and links them into a new program.
    ///
    /// Nothing already on the GPU is touched; on error every object created
    /// along the way has been deleted again.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either source cannot be found or read
    /// - Either stage fails to compile
    /// - The program fails to link
    pub fn build<B: ProgramBackend>(&self, backend: &mut B) -> Result<ProgramHandle> {
        let vertex = ShaderText::load(&self.vertex)?;
        let fragment = ShaderText::load(&self.fragment)?;
        build_from_text(backend, &vertex.as_str(), &fragment.as_str())
    }
}

/// Compiles both stages and links them into a fresh program.
pub fn build_from_text<B: ProgramBackend>(
    backend: &mut B,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<ProgramHandle> {
    let vs = compile_stage(backend, ShaderStage::Vertex, vertex_src)?;
    let fs = match compile_stage(backend, ShaderStage::Fragment, fragment_src) {
        Ok(fs) => fs,
        Err(e) => {
            backend.delete_shader(vs);
            return Err(e);
        }
    };

    let program = match backend.create_program() {
        Ok(program) => program,
        Err(log) => {
            backend.delete_shader(vs);
            backend.delete_shader(fs);
            return Err(ReloadError::Link(log));
        }
    };

    backend.attach_shader(program, fs);
    backend.attach_shader(program, vs);
    let linked = backend.link_program(program);

    backend.detach_shader(program, fs);
    backend.detach_shader(program, vs);
    backend.delete_shader(vs);
    backend.delete_shader(fs);

    if let Err(log) = linked {
        backend.delete_program(program);
        return Err(ReloadError::Link(log));
    }

    Ok(program)
}

fn compile_stage<B: ProgramBackend>(
    backend: &mut B,
    stage: ShaderStage,
    source: &str,
) -> Result<B::Shader> {
    let shader = backend
        .create_shader(stage)
        .map_err(|log| ReloadError::Compile { stage, log })?;

    if let Err(log) = backend.compile_shader(shader, source) {
        backend.delete_shader(shader);
        return Err(ReloadError::Compile { stage, log });
    }

    Ok(shader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBackend;
    use std::fs;
    use tempfile::TempDir;

    const VERTEX: &str = concat!(
        "#version 400\n",
        "in vec3 vp;\n",
        "void main() {\n",
        "\tgl_Position = vec4(vp, 1.0);\n",
        "}\n",
    );
    const FRAGMENT: &str = concat!(
        "#version 400\n",
        "out vec4 frag_colour;\n",
        "void main() {\n",
        "\tfrag_colour = vec4(0.5, 0.0, 0.5, 1.0);\n",
        "}\n",
    );
    const BROKEN: &str = "#version 400\n#error deliberately broken\n";

    fn write_sources(dir: &Path, vertex: &str, fragment: &str) -> ProgramSources {
        fs::write(dir.join("vertex_shader.glsl"), vertex).unwrap();
        fs::write(dir.join("fragment_shader.glsl"), fragment).unwrap();
        ProgramSources::in_dir(dir, "vertex_shader.glsl", "fragment_shader.glsl")
    }

    #[test]
    fn builds_program_from_folded_sources() {
        let tmp = TempDir::new().unwrap();
        let sources = write_sources(tmp.path(), VERTEX, FRAGMENT);
        let mut backend = FakeBackend::default();

        let program = sources.build(&mut backend).unwrap();
        assert!(backend.is_live(program));
        assert_eq!(
            backend.fragment_source(program),
            Some(concat!(
                "#version 400\n",
                "out vec4 frag_colour; void main() { ",
                "\tfrag_colour = vec4(0.5, 0.0, 0.5, 1.0); } ",
            ))
        );
        assert_eq!(backend.live_shaders(), 0);
    }

    #[test]
    fn fragment_compile_failure_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let sources = write_sources(tmp.path(), VERTEX, BROKEN);
        let mut backend = FakeBackend::default();

        let err = sources.build(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            ReloadError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(backend.live_shaders(), 0);
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn vertex_compile_failure_reports_vertex_stage() {
        let mut backend = FakeBackend::default();
        let err = build_from_text(&mut backend, "void main() {}", FRAGMENT).unwrap_err();
        assert!(matches!(
            err,
            ReloadError::Compile {
                stage: ShaderStage::Vertex,
                ..
            }
        ));
        assert_eq!(backend.live_shaders(), 0);
    }

    #[test]
    fn link_failure_deletes_new_program() {
        let mut backend = FakeBackend::failing_link();
        let err = build_from_text(&mut backend, VERTEX, FRAGMENT).unwrap_err();
        assert!(matches!(err, ReloadError::Link(_)));
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_shaders(), 0);
    }

    #[test]
    fn missing_source_is_reported_before_gpu_work() {
        let tmp = TempDir::new().unwrap();
        let sources =
            ProgramSources::in_dir(tmp.path(), "vertex_shader.glsl", "fragment_shader.glsl");
        let mut backend = FakeBackend::default();

        let err = sources.build(&mut backend).unwrap_err();
        assert!(matches!(err, ReloadError::FileNotFound(_)));
        assert_eq!(backend.live_shaders(), 0);
    }

    #[test]
    fn recognises_source_file_names() {
        let sources = ProgramSources::in_dir(
            Path::new("/opt/demo"),
            "vertex_shader.glsl",
            "fragment_shader.glsl",
        );
        assert!(sources.names_file(OsStr::new("vertex_shader.glsl")));
        assert!(sources.names_file(OsStr::new("fragment_shader.glsl")));
        assert!(!sources.names_file(OsStr::new("fragment_shader.glsl.swp")));
    }
}
