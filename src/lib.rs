//! Hot-reloading for GLSL shader programs.
//!
//! This crate watches the directory holding a vertex and a fragment shader with
//! inotify and relinks the program when either file is written, without
//! restarting the application. A failed compile or link never disturbs the
//! program the renderer is currently using.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use glsl_hotreload::{ActiveProgram, GlBackend, ShaderHotReloader, gl};
//!
//! # fn context() -> glow::Context { unimplemented!() }
//! let context = context();
//! gl::log_context_params(&context);
//!
//! let mut backend = GlBackend::new(&context);
//! let mut active = ActiveProgram::default();
//!
//! // Shaders are looked up next to the executable by default.
//! let mut reloader = match ShaderHotReloader::builder().debounce_ms(50).build() {
//!     Ok(reloader) => reloader,
//!     Err(e) => {
//!         eprintln!("Failed to initialise shader hot reloader: {}", e);
//!         std::process::exit(1);
//!     }
//! };
//!
//! if let Err(e) = reloader.reload_now(&mut backend, &mut active) {
//!     eprintln!("Initial shader build failed: {}", e);
//! }
//!
//! loop {
//!     // Non-blocking; rebuilds when a source was saved.
//!     reloader.check_for_reload(&mut backend, &mut active);
//!     gl::bind_active(&context, &active);
//!     // draw...
//! }
//! ```

pub mod background;
pub mod builder;
pub mod compile;
pub mod error;
pub mod events;
pub mod gl;
pub mod paths;
pub mod program;
pub mod reloader;
pub mod source;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use background::BackgroundWatcher;
pub use builder::ShaderHotReloaderBuilder;
pub use compile::ProgramSources;
pub use error::{ReloadError, Result};
pub use events::{ChangeEvent, EventMask, decode};
pub use gl::GlBackend;
pub use paths::BinaryDir;
pub use program::{ActiveProgram, ProgramBackend, ProgramHandle, ShaderStage};
pub use reloader::{ReloadOutcome, ReloadState, ServiceReport, ShaderHotReloader};
pub use source::ShaderText;
pub use watcher::{DirectoryWatcher, Readiness, Timeout, WatchDescriptor};

const DEFAULT_VERTEX_SHADER: &str = "vertex_shader.glsl";
const DEFAULT_FRAGMENT_SHADER: &str = "fragment_shader.glsl";
const DEFAULT_DEBOUNCE_MS: u64 = 100;
const EVENT_BUFFER_SIZE: usize = 4096;
