use crate::ShaderHotReloaderBuilder;
use crate::compile::ProgramSources;
use crate::error::{ReloadError, Result};
use crate::events::{ChangeEvent, EventMask, decode};
use crate::program::{ActiveProgram, ProgramBackend, ProgramHandle};
use crate::watcher::{DirectoryWatcher, Timeout, WatchDescriptor};
use bevy::prelude::Resource;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Draining,
    Rebuilding,
}

/// What one [`ShaderHotReloader::service`] cycle did.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// No change events were pending.
    Quiet,
    /// Events were drained but none touched a shader source.
    Ignored { events: usize },
    /// A source changed inside the debounce window; the rebuild is deferred.
    Deferred,
    /// A new program was built and installed.
    Reloaded {
        program: ProgramHandle,
        superseded: Option<ProgramHandle>,
    },
    /// The rebuild failed and the previous program is still active.
    Failed(ReloadError),
}

#[derive(Debug)]
pub struct ServiceReport {
    pub outcome: ReloadOutcome,
    /// Indices of auxiliary sources that were readable.
    pub auxiliary_ready: Vec<usize>,
    /// States passed through, starting and ending with `Idle`.
    pub states: Vec<ReloadState>,
}

/// Resource for managing shader hot reloading.
///
/// Watches the shader directory with inotify and rebuilds the vertex/fragment
/// program when either source is written. All work happens on the calling
/// thread; the GPU backend and the [`ActiveProgram`] are passed in per call.
///
/// # Example
///
/// ```rust,no_run
/// use glsl_hotreload::{ActiveProgram, GlBackend, ShaderHotReloader, gl};
///
/// # fn context() -> glow::Context { unimplemented!() }
/// let context = context();
/// let mut backend = GlBackend::new(&context);
/// let mut active = ActiveProgram::default();
///
/// let mut reloader = ShaderHotReloader::builder()
///     .debounce_ms(50)
///     .build()
///     .unwrap_or_else(|e| {
///         eprintln!("Failed to initialise shader hot reloader: {e}");
///         std::process::exit(1);
///     });
/// reloader.reload_now(&mut backend, &mut active).expect("initial shaders must build");
///
/// loop {
///     reloader.check_for_reload(&mut backend, &mut active);
///     gl::bind_active(&context, &active);
///     // draw...
/// }
/// ```
#[derive(Resource)]
pub struct ShaderHotReloader {
    watcher: DirectoryWatcher,
    descriptor: WatchDescriptor,
    directory: PathBuf,
    sources: ProgramSources,
    trigger: EventMask,
    auxiliary: Vec<RawFd>,
    debounce: Duration,
    buffer: Vec<u8>,
    state: ReloadState,
    last_rebuild: Option<Instant>,
    pending: bool,
}

impl ShaderHotReloader {
    /// Creates a builder for customizing shader hot reloader configuration.
    pub fn builder() -> ShaderHotReloaderBuilder {
        ShaderHotReloaderBuilder::new()
    }

    pub(crate) fn new_with_config(
        directory: PathBuf,
        sources: ProgramSources,
        interest: EventMask,
        trigger: EventMask,
        auxiliary: Vec<RawFd>,
        debounce: Duration,
        buffer_size: usize,
    ) -> Result<Self> {
        let mut watcher = DirectoryWatcher::open()?;
        let descriptor = watcher.watch(&directory, interest)?;
        log::info!("shader hot reloading enabled, watching {}", directory.display());

        Ok(Self {
            watcher,
            descriptor,
            directory,
            sources,
            trigger,
            auxiliary,
            debounce,
            buffer: vec![0; buffer_size],
            state: ReloadState::Idle,
            last_rebuild: None,
            pending: false,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn sources(&self) -> &ProgramSources {
        &self.sources
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    /// Builds the program right away and installs it on success.
    ///
    /// Used for the initial program; on error the active program is untouched.
    pub fn reload_now<B: ProgramBackend>(
        &mut self,
        backend: &mut B,
        active: &mut ActiveProgram,
    ) -> Result<ProgramHandle> {
        self.pending = false;
        self.last_rebuild = Some(Instant::now());
        let program = self.sources.build(backend)?;
        active.install(backend, program);
        Ok(program)
    }

    /// Runs one wait, drain and rebuild cycle.
    ///
    /// Waits up to `timeout` for change events or auxiliary input (less while a
    /// deferred rebuild is due), drains every pending event and rebuilds at
    /// most once. Build failures are reported in the outcome, not as `Err`.
    ///
    /// # Errors
    ///
    /// Only fatal errors: the wait or the event read failed.
    pub fn service<B: ProgramBackend>(
        &mut self,
        backend: &mut B,
        active: &mut ActiveProgram,
        timeout: Timeout,
    ) -> Result<ServiceReport> {
        let mut states = vec![ReloadState::Idle];
        let timeout = match self.debounce_remaining() {
            Some(remaining) => timeout.min(remaining),
            None => timeout,
        };

        let readiness = self.watcher.wait_ready(&self.auxiliary, timeout)?;
        let auxiliary_ready = readiness.auxiliary().to_vec();

        let mut outcome = ReloadOutcome::Quiet;
        if readiness.watch_ready() {
            self.enter(ReloadState::Draining, &mut states);
            let (events, triggered) = self.drain()?;
            self.pending |= triggered;
            outcome = ReloadOutcome::Ignored { events };
        }

        if self.pending {
            if self.debounce_remaining().is_some() {
                outcome = ReloadOutcome::Deferred;
            } else {
                self.enter(ReloadState::Rebuilding, &mut states);
                outcome = self.rebuild(backend, active);
            }
        }

        self.enter(ReloadState::Idle, &mut states);
        Ok(ServiceReport {
            outcome,
            auxiliary_ready,
            states,
        })
    }

    /// Checks for source changes without blocking and rebuilds if needed.
    ///
    /// Returns true if a new program was installed. This method is
    /// non-blocking and meant to be called once per frame. A fatal watch
    /// error is logged and terminates the process.
    pub fn check_for_reload<B: ProgramBackend>(
        &mut self,
        backend: &mut B,
        active: &mut ActiveProgram,
    ) -> bool {
        match self.service(backend, active, Timeout::Immediate) {
            Ok(report) => matches!(report.outcome, ReloadOutcome::Reloaded { .. }),
            Err(e) => {
                log::error!("shader watch failed: {e}");
                std::process::exit(1);
            }
        }
    }

    fn enter(&mut self, next: ReloadState, states: &mut Vec<ReloadState>) {
        log::trace!("reloader {:?} -> {:?}", self.state, next);
        self.state = next;
        states.push(next);
    }

    fn debounce_remaining(&self) -> Option<Duration> {
        if !self.pending {
            return None;
        }
        let elapsed = self.last_rebuild?.elapsed();
        self.debounce.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    fn drain(&mut self) -> Result<(usize, bool)> {
        drain_events(
            &self.watcher,
            &mut self.buffer,
            self.descriptor,
            self.trigger,
            &self.sources,
        )
    }

    fn rebuild<B: ProgramBackend>(
        &mut self,
        backend: &mut B,
        active: &mut ActiveProgram,
    ) -> ReloadOutcome {
        self.pending = false;
        self.last_rebuild = Some(Instant::now());

        match self.sources.build(backend) {
            Ok(program) => {
                let superseded = active.install(backend, program);
                log::info!("shaders reloaded (program {})", program.get());
                ReloadOutcome::Reloaded {
                    program,
                    superseded,
                }
            }
            Err(e) => {
                log::error!("shader reload failed, keeping previous program: {e}");
                ReloadOutcome::Failed(e)
            }
        }
    }
}

/// Reads until the channel would block. Returns the number of events seen
/// and whether any of them should trigger a rebuild.
pub(crate) fn drain_events(
    watcher: &DirectoryWatcher,
    buffer: &mut [u8],
    descriptor: WatchDescriptor,
    trigger: EventMask,
    sources: &ProgramSources,
) -> Result<(usize, bool)> {
    let mut events = 0;
    let mut triggered = false;
    while let Some(n) = watcher.read_batch(buffer)? {
        for event in decode(&buffer[..n]) {
            events += 1;
            log::debug!("{event}");
            if event.mask.contains(EventMask::Q_OVERFLOW) {
                log::warn!("inotify queue overflowed, forcing a rebuild");
                triggered = true;
            } else if event.mask.contains(EventMask::IGNORED) {
                log::warn!(
                    "watch {} was removed, no further changes will be seen",
                    event.wd.as_raw()
                );
            } else if is_trigger(&event, descriptor, trigger, sources) {
                triggered = true;
            }
        }
    }
    Ok((events, triggered))
}

fn is_trigger(
    event: &ChangeEvent<'_>,
    descriptor: WatchDescriptor,
    trigger: EventMask,
    sources: &ProgramSources,
) -> bool {
    event.wd == descriptor
        && !event.is_dir()
        && event.mask.intersects(trigger)
        && event.name.is_some_and(|name| sources.names_file(name))
}
