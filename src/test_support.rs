//! In-memory GPU backend for tests.
//!
//! "Compiles" any source that starts with `#version` and contains no `#error`
//! directive, and remembers which sources each linked program was built from.

use crate::program::{ProgramBackend, ProgramHandle, ShaderStage};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct FakeShader {
    stage: ShaderStage,
    source: Option<String>,
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    next_name: u32,
    shaders: HashMap<u32, FakeShader>,
    attached: HashMap<u32, Vec<u32>>,
    programs: HashMap<u32, (String, String)>,
    deleted_programs: HashMap<u32, usize>,
    fail_link: bool,
}

impl FakeBackend {
    /// A backend whose link step always fails.
    pub fn failing_link() -> Self {
        Self {
            fail_link: true,
            ..Self::default()
        }
    }

    fn next(&mut self) -> u32 {
        self.next_name += 1;
        self.next_name
    }

    /// Builds a trivially valid program without going through source files.
    pub fn link_test_program(&mut self) -> ProgramHandle {
        let trivial = "#version 400\nvoid main() {}";
        crate::compile::build_from_text(self, trivial, trivial).expect("fake program must link")
    }

    pub fn deletions(&self, program: ProgramHandle) -> usize {
        self.deleted_programs.get(&program.get()).copied().unwrap_or(0)
    }

    pub fn is_live(&self, program: ProgramHandle) -> bool {
        self.programs.contains_key(&program.get())
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    /// Fragment source the program was linked from.
    pub fn fragment_source(&self, program: ProgramHandle) -> Option<&str> {
        self.programs.get(&program.get()).map(|(_, fs)| fs.as_str())
    }
}

impl ProgramBackend for FakeBackend {
    type Shader = u32;

    fn create_shader(&mut self, stage: ShaderStage) -> Result<u32, String> {
        let name = self.next();
        self.shaders.insert(name, FakeShader { stage, source: None });
        Ok(name)
    }

    fn compile_shader(&mut self, shader: u32, source: &str) -> Result<(), String> {
        let entry = self.shaders.get_mut(&shader).ok_or("unknown shader")?;
        if !source.starts_with("#version") || source.contains("#error") {
            return Err(format!("0:1: {} syntax error", entry.stage));
        }
        entry.source = Some(source.to_string());
        Ok(())
    }

    fn create_program(&mut self) -> Result<ProgramHandle, String> {
        let name = self.next();
        self.attached.insert(name, Vec::new());
        ProgramHandle::new(name).ok_or_else(|| "zero program".to_string())
    }

    fn attach_shader(&mut self, program: ProgramHandle, shader: u32) {
        self.attached.entry(program.get()).or_default().push(shader);
    }

    fn detach_shader(&mut self, program: ProgramHandle, shader: u32) {
        if let Some(list) = self.attached.get_mut(&program.get()) {
            list.retain(|s| *s != shader);
        }
    }

    fn link_program(&mut self, program: ProgramHandle) -> Result<(), String> {
        if self.fail_link {
            return Err("error: linking failed".into());
        }
        let attached = self.attached.get(&program.get()).cloned().unwrap_or_default();
        let source_of = |stage| {
            attached
                .iter()
                .filter_map(|s| self.shaders.get(s))
                .find(|s| s.stage == stage)
                .and_then(|s| s.source.clone())
        };
        match (source_of(ShaderStage::Vertex), source_of(ShaderStage::Fragment)) {
            (Some(vs), Some(fs)) => {
                self.programs.insert(program.get(), (vs, fs));
                Ok(())
            }
            _ => Err("error: missing stage".into()),
        }
    }

    fn delete_shader(&mut self, shader: u32) {
        assert!(self.shaders.remove(&shader).is_some(), "shader {shader} deleted twice");
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        let raw = program.get();
        let linked = self.programs.remove(&raw).is_some();
        let created = self.attached.remove(&raw).is_some();
        assert!(linked || created, "program {raw} deleted twice");
        *self.deleted_programs.entry(raw).or_default() += 1;
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
