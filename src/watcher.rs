use crate::error::{ReloadError, Result};
use crate::events::EventMask;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identifies a directory registered with a [`DirectoryWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchDescriptor(i32);

impl WatchDescriptor {
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> i32 {
        self.0
    }
}

/// How long [`DirectoryWatcher::wait_ready`] may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return at once; a readiness check suitable for every frame.
    Immediate,
    After(Duration),
    Infinite,
}

impl Timeout {
    /// The shorter of `self` and `other`.
    pub fn min(self, other: Duration) -> Self {
        match self {
            Self::Immediate => Self::Immediate,
            Self::After(d) => Self::After(d.min(other)),
            Self::Infinite => Self::After(other),
        }
    }

    fn as_poll_millis(self) -> libc::c_int {
        match self {
            Self::Immediate => 0,
            Self::Infinite => -1,
            Self::After(d) => {
                // Round up so a sub-millisecond wait does not become a busy poll.
                let ms = d.as_nanos().div_ceil(1_000_000);
                libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX)
            }
        }
    }
}

/// Result of a readiness wait.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readiness {
    watch: bool,
    auxiliary: Vec<usize>,
}

impl Readiness {
    /// The watch descriptor has events to read.
    pub fn watch_ready(&self) -> bool {
        self.watch
    }

    /// Indices into the auxiliary source list that are readable (or hung up).
    pub fn auxiliary(&self) -> &[usize] {
        &self.auxiliary
    }

    pub fn is_empty(&self) -> bool {
        !self.watch && self.auxiliary.is_empty()
    }
}

/// Non-blocking inotify channel on one or more flat directories.
///
/// The descriptor is closed (and every watch dropped by the kernel) when the
/// watcher is dropped.
#[derive(Debug)]
pub struct DirectoryWatcher {
    fd: OwnedFd,
    watches: Vec<(WatchDescriptor, PathBuf)>,
}

impl DirectoryWatcher {
    /// Opens a new non-blocking inotify instance.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::ResourceExhausted`] if the kernel refuses to
    /// create another instance.
    pub fn open() -> Result<Self> {
        // SAFETY: plain syscall, no pointers involved.
        let raw = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if raw < 0 {
            return Err(ReloadError::ResourceExhausted {
                what: "an inotify instance",
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(Self {
            fd,
            watches: Vec::new(),
        })
    }

    /// Registers `directory` for the events in `interest`.
    ///
    /// Watching is not recursive. Registering the same directory again
    /// replaces its mask and returns the same descriptor.
    pub fn watch(&mut self, directory: &Path, interest: EventMask) -> Result<WatchDescriptor> {
        let c_path = CString::new(directory.as_os_str().as_bytes()).map_err(|e| {
            ReloadError::InvalidPath(
                directory.to_path_buf(),
                io::Error::new(io::ErrorKind::InvalidInput, e),
            )
        })?;

        // SAFETY: `c_path` is NUL-terminated and outlives the call.
        let raw = unsafe {
            libc::inotify_add_watch(self.fd.as_raw_fd(), c_path.as_ptr(), interest.bits())
        };
        if raw < 0 {
            return Err(ReloadError::from_watch_errno(
                directory.to_path_buf(),
                io::Error::last_os_error(),
            ));
        }

        let wd = WatchDescriptor(raw);
        if !self.watches.iter().any(|(known, _)| *known == wd) {
            self.watches.push((wd, directory.to_path_buf()));
        }
        log::debug!("watching {} ({:?})", directory.display(), interest);
        Ok(wd)
    }

    /// Directory registered under `wd`.
    pub fn directory(&self, wd: WatchDescriptor) -> Option<&Path> {
        self.watches
            .iter()
            .find(|(known, _)| *known == wd)
            .map(|(_, path)| path.as_path())
    }

    /// Blocks until the watch channel or any of `auxiliary` is readable, or
    /// `timeout` elapses.
    ///
    /// All sources are polled together, so a busy auxiliary source cannot hide
    /// pending change events and vice versa. Interrupted waits are restarted.
    pub fn wait_ready(&self, auxiliary: &[RawFd], timeout: Timeout) -> Result<Readiness> {
        let mut fds = Vec::with_capacity(auxiliary.len() + 1);
        fds.push(libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        fds.extend(auxiliary.iter().map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        }));

        loop {
            // SAFETY: `fds` is a valid array of `fds.len()` pollfd entries.
            let n = unsafe {
                libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout.as_poll_millis())
            };
            if n >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(ReloadError::Fatal(err));
            }
        }

        Ok(Readiness {
            watch: fds[0].revents & libc::POLLIN != 0,
            auxiliary: fds[1..]
                .iter()
                .enumerate()
                .filter(|(_, p)| p.revents != 0)
                .map(|(i, _)| i)
                .collect(),
        })
    }

    /// Reads one batch of raw event records into `buf`.
    ///
    /// Returns `Ok(None)` once the channel would block or reports end of
    /// stream. Any other read failure is [`ReloadError::Fatal`].
    ///
    /// `buf` must hold at least one maximal record
    /// (`EVENT_HEADER_LEN + NAME_MAX + 1` bytes) or the kernel rejects the read.
    pub fn read_batch(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        loop {
            // SAFETY: `buf` is writable for `buf.len()` bytes.
            let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if n > 0 {
                return Ok(Some(n as usize));
            }
            if n == 0 {
                return Ok(None);
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => return Ok(None),
                io::ErrorKind::Interrupted => continue,
                _ => return Err(ReloadError::Fatal(err)),
            }
        }
    }
}

impl AsFd for DirectoryWatcher {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
