use crate::compile::ProgramSources;
use crate::error::Result;
use crate::events::EventMask;
use crate::paths::BinaryDir;
use crate::{
    BackgroundWatcher, DEFAULT_DEBOUNCE_MS, DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER,
    EVENT_BUFFER_SIZE, ShaderHotReloader,
};
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest file name Linux allows.
const NAME_MAX: usize = 255;

/// Smallest buffer that always fits one record with a maximal file name.
const MIN_EVENT_BUFFER: usize = crate::events::EVENT_HEADER_LEN + NAME_MAX + 1;

/// Builder for configuring a ShaderHotReloader instance.
///
/// Provides an interface for choosing the watched directory, the shader file
/// names, which inotify events count as a change, and extra input sources to
/// multiplex with the watch channel.
///
/// # Example
///
/// ```rust,no_run
/// use glsl_hotreload::ShaderHotReloader;
///
/// let reloader = ShaderHotReloader::builder()
///     .vertex_shader("triangle.vert")
///     .fragment_shader("triangle.frag")
///     .console_input(true)
///     .debounce_ms(50)
///     .build()
///     .expect("Failed to initialise shader hot reloader");
/// ```
pub struct ShaderHotReloaderBuilder {
    directory: Option<PathBuf>,
    vertex_shader: String,
    fragment_shader: String,
    interest: EventMask,
    trigger: EventMask,
    auxiliary: Vec<RawFd>,
    debounce_ms: u64,
    buffer_size: usize,
}

impl Default for ShaderHotReloaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderHotReloaderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            directory: None,
            vertex_shader: DEFAULT_VERTEX_SHADER.to_string(),
            fragment_shader: DEFAULT_FRAGMENT_SHADER.to_string(),
            interest: EventMask::CLOSE | EventMask::MODIFY,
            trigger: EventMask::CLOSE_WRITE | EventMask::MODIFY,
            auxiliary: Vec::new(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            buffer_size: EVENT_BUFFER_SIZE,
        }
    }

    /// Sets the directory holding the shader sources.
    ///
    /// Defaults to the directory of the running executable.
    ///
    /// # Arguments
    ///
    /// * `directory` - Directory containing both shader sources
    pub fn directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.directory = Some(directory.as_ref().to_path_buf());
        self
    }

    /// Sets the vertex shader file name, relative to the directory.
    ///
    /// # Arguments
    ///
    /// * `filename` - Bare file name (e.g., "triangle.vert")
    pub fn vertex_shader(mut self, filename: impl Into<String>) -> Self {
        self.vertex_shader = filename.into();
        self
    }

    /// Sets the fragment shader file name, relative to the directory.
    ///
    /// # Arguments
    ///
    /// * `filename` - Bare file name (e.g., "triangle.frag")
    pub fn fragment_shader(mut self, filename: impl Into<String>) -> Self {
        self.fragment_shader = filename.into();
        self
    }

    /// Sets the events registered with the kernel.
    ///
    /// # Arguments
    ///
    /// * `mask` - inotify events to watch for on the directory
    pub fn interest(mut self, mask: EventMask) -> Self {
        self.interest = mask;
        self
    }

    /// Sets the events on a shader source that cause a rebuild.
    ///
    /// # Arguments
    ///
    /// * `mask` - Events that mark a source as changed
    pub fn trigger(mut self, mask: EventMask) -> Self {
        self.trigger = mask;
        self
    }

    /// Adds a descriptor to wait on alongside the watch channel.
    ///
    /// The reloader never reads from it; readiness is only reported back. The
    /// descriptor must stay open for the lifetime of the reloader.
    ///
    /// # Arguments
    ///
    /// * `fd` - Readable descriptor to multiplex with the watch channel
    pub fn auxiliary_source(mut self, fd: RawFd) -> Self {
        self.auxiliary.push(fd);
        self
    }

    /// Also wait on standard input.
    ///
    /// # Arguments
    ///
    /// * `enabled` - Whether to add stdin as an auxiliary source
    pub fn console_input(self, enabled: bool) -> Self {
        if enabled {
            self.auxiliary_source(libc::STDIN_FILENO)
        } else {
            self
        }
    }

    /// Sets the minimum interval between rebuilds in milliseconds.
    ///
    /// Changes inside the interval are folded into one rebuild at its end.
    ///
    /// # Arguments
    ///
    /// * `ms` - Debounce interval in milliseconds
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Sets the size of the raw event read buffer.
    ///
    /// Values below one maximal record are raised to that minimum.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Buffer size in bytes
    pub fn event_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes.max(MIN_EVENT_BUFFER);
        self
    }

    fn resolve_directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(directory) => Ok(directory.clone()),
            None => Ok(BinaryDir::resolve()?.into_path()),
        }
    }

    fn sources(&self, directory: &Path) -> ProgramSources {
        ProgramSources::in_dir(directory, &self.vertex_shader, &self.fragment_shader)
    }

    /// Builds the ShaderHotReloader with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The executable's directory cannot be resolved
    /// - The inotify instance or watch cannot be created
    pub fn build(self) -> Result<ShaderHotReloader> {
        let directory = self.resolve_directory()?;
        let sources = self.sources(&directory);
        ShaderHotReloader::new_with_config(
            directory,
            sources,
            self.interest,
            self.trigger,
            self.auxiliary,
            Duration::from_millis(self.debounce_ms),
            self.buffer_size,
        )
    }

    /// Builds a [`BackgroundWatcher`] that watches on its own thread.
    ///
    /// Auxiliary sources are not used by the background watcher.
    pub fn build_background(self) -> Result<BackgroundWatcher> {
        let directory = self.resolve_directory()?;
        let sources = self.sources(&directory);
        BackgroundWatcher::spawn(
            directory,
            sources,
            self.interest,
            self.trigger,
            Duration::from_millis(self.debounce_ms),
            self.buffer_size,
        )
    }
}
