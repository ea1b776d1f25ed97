use crate::compile::ProgramSources;
use crate::error::Result;
use crate::events::EventMask;
use crate::program::{ActiveProgram, ProgramBackend};
use crate::reloader::drain_events;
use crate::watcher::{DirectoryWatcher, Timeout};
use bevy::prelude::Resource;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How often the watch thread checks whether it should stop.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resource for watching shader sources on a background thread.
///
/// The thread only watches; it signals the render thread through a channel and
/// the render thread rebuilds the program with its own GPU context. Dropping
/// the watcher stops and joins the thread.
///
/// # Example
///
/// ```rust,no_run
/// use glsl_hotreload::{ActiveProgram, GlBackend, ShaderHotReloader};
///
/// # fn context() -> glow::Context { unimplemented!() }
/// let context = context();
/// let mut backend = GlBackend::new(&context);
/// let mut active = ActiveProgram::default();
///
/// let watcher = ShaderHotReloader::builder()
///     .build_background()
///     .expect("Failed to start shader watcher");
///
/// loop {
///     watcher.reload_if_changed(&mut backend, &mut active);
///     // draw...
/// }
/// ```
#[derive(Resource)]
pub struct BackgroundWatcher {
    sources: ProgramSources,
    reload_receiver: Arc<Mutex<Receiver<()>>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl BackgroundWatcher {
    pub(crate) fn spawn(
        directory: PathBuf,
        sources: ProgramSources,
        interest: EventMask,
        trigger: EventMask,
        debounce: Duration,
        buffer_size: usize,
    ) -> Result<Self> {
        let mut watcher = DirectoryWatcher::open()?;
        let descriptor = watcher.watch(&directory, interest)?;
        log::info!(
            "shader hot reloading enabled, watching {} in background",
            directory.display()
        );

        let (reload_tx, reload_rx): (Sender<()>, Receiver<()>) = channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread_sources = sources.clone();

        let thread = std::thread::Builder::new()
            .name("shader-watch".into())
            .spawn(move || {
                let mut buffer = vec![0u8; buffer_size];
                let mut last_signal: Option<Instant> = None;
                let mut pending = false;

                while !stop_flag.load(Ordering::Relaxed) {
                    let mut wait = STOP_POLL_INTERVAL;
                    if pending {
                        if let Some(last) = last_signal {
                            wait = wait.min(debounce.saturating_sub(last.elapsed()));
                        }
                    }

                    let ready = match watcher.wait_ready(&[], Timeout::After(wait)) {
                        Ok(ready) => ready,
                        Err(e) => fatal(&directory, e),
                    };
                    if ready.watch_ready() {
                        let drained = drain_events(
                            &watcher,
                            &mut buffer,
                            descriptor,
                            trigger,
                            &thread_sources,
                        );
                        match drained {
                            Ok((_, triggered)) => pending |= triggered,
                            Err(e) => fatal(&directory, e),
                        }
                    }

                    let settled = last_signal.is_none_or(|last| last.elapsed() >= debounce);
                    if pending && settled {
                        pending = false;
                        last_signal = Some(Instant::now());
                        log::debug!("shader source changed, signalling reload");
                        if reload_tx.send(()).is_err() {
                            break;
                        }
                    }
                }
            })
            .map_err(|e| crate::ReloadError::ResourceExhausted {
                what: "a watch thread",
                source: e,
            })?;

        Ok(Self {
            sources,
            reload_receiver: Arc::new(Mutex::new(reload_rx)),
            stop,
            thread: Some(thread),
        })
    }

    pub fn sources(&self) -> &ProgramSources {
        &self.sources
    }

    /// Checks if shader sources have changed since the last check.
    ///
    /// Returns true if a reload is due, false otherwise.
    /// This method is non-blocking and can be called frequently.
    #[inline]
    pub fn check_for_reload(&self) -> bool {
        let receiver = self.reload_receiver.lock();
        // Drain all pending reload signals and return true if any were present
        let mut has_reload = false;
        while receiver.try_recv().is_ok() {
            has_reload = true;
        }
        has_reload
    }

    /// Rebuilds and installs the program if a change was signalled.
    ///
    /// Returns true if a new program was installed. A failed build is logged
    /// and the previous program stays active.
    pub fn reload_if_changed<B: ProgramBackend>(
        &self,
        backend: &mut B,
        active: &mut ActiveProgram,
    ) -> bool {
        if !self.check_for_reload() {
            return false;
        }
        match self.sources.build(backend) {
            Ok(program) => {
                active.install(backend, program);
                log::info!("shaders reloaded (program {})", program.get());
                true
            }
            Err(e) => {
                log::error!("shader reload failed, keeping previous program: {e}");
                false
            }
        }
    }
}

impl Drop for BackgroundWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("shader watch thread panicked");
            }
        }
    }
}

fn fatal(directory: &Path, err: crate::ReloadError) -> ! {
    log::error!("shader watch on {} failed: {err}", directory.display());
    std::process::exit(1);
}
