use crate::error::{ReloadError, Result};
use std::ffi::{CString, OsStr, OsString};
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

/// Link the kernel exposes for the running process image.
const SELF_EXE: &str = "/proc/self/exe";

/// First buffer handed to `readlink`; doubled until the target fits.
const INITIAL_LINK_CAPACITY: usize = 64;

/// Doublings allowed before giving up (64 << 10 is 64 KiB, far past PATH_MAX).
const MAX_LINK_DOUBLINGS: u32 = 10;

/// Directory containing the running executable.
///
/// Shader sources are expected to sit next to the binary, so this is the
/// default watch directory and the base for resource paths.
///
/// # Example
///
/// ```rust,no_run
/// use glsl_hotreload::BinaryDir;
///
/// let dir = BinaryDir::resolve().expect("cannot locate executable");
/// let vertex = dir.join("vertex_shader.glsl");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryDir {
    path: PathBuf,
}

impl BinaryDir {
    /// Resolves the directory of the running process image.
    ///
    /// Computed fresh on every call; nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::Io`] if `/proc/self/exe` cannot be read.
    pub fn resolve() -> Result<Self> {
        Self::from_link(SELF_EXE)
    }

    /// Resolves `link` and returns the directory part of its target.
    pub fn from_link(link: impl AsRef<Path>) -> Result<Self> {
        let target = read_link_bounded(link.as_ref(), INITIAL_LINK_CAPACITY, MAX_LINK_DOUBLINGS)?;
        Ok(Self {
            path: strip_file_name(target),
        })
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }

    /// Builds the absolute path of `filename` inside this directory.
    ///
    /// See [`join_resource`] for the exact joining rules.
    pub fn join(&self, filename: impl AsRef<OsStr>) -> PathBuf {
        join_resource(&self.path, filename)
    }
}

/// Concatenates `dir`, a separator and `filename`.
///
/// No normalisation happens. Callers pass bare filenames; a filename that
/// starts with `/` still lands inside `dir` (as `dir//name`) instead of
/// replacing it the way [`Path::join`] would.
pub fn join_resource(dir: &Path, filename: impl AsRef<OsStr>) -> PathBuf {
    let mut joined = OsString::from(dir.as_os_str());
    joined.push("/");
    joined.push(filename);
    PathBuf::from(joined)
}

/// Reads a symlink target with a growing buffer.
///
/// `readlink` neither reports the full length nor NUL-terminates, so a result
/// that fills the buffer exactly is treated as truncated and retried with twice
/// the capacity, at most `max_doublings` times.
pub fn read_link_bounded(link: &Path, initial: usize, max_doublings: u32) -> Result<Vec<u8>> {
    let c_link = CString::new(link.as_os_str().as_bytes()).map_err(|e| {
        ReloadError::Io(
            link.to_path_buf(),
            io::Error::new(io::ErrorKind::InvalidInput, e),
        )
    })?;

    let mut capacity = initial.max(1);
    for attempt in 0..=max_doublings {
        let mut buf = vec![0u8; capacity];
        // SAFETY: `c_link` is NUL-terminated and `buf` is writable for `capacity` bytes.
        let used = unsafe { libc::readlink(c_link.as_ptr(), buf.as_mut_ptr().cast(), capacity) };
        if used < 0 {
            return Err(ReloadError::Io(link.to_path_buf(), io::Error::last_os_error()));
        }

        let used = used as usize;
        if used < capacity {
            buf.truncate(used);
            return Ok(buf);
        }

        if attempt < max_doublings {
            log::trace!("link target of {} exceeds {} bytes, retrying", link.display(), capacity);
            capacity *= 2;
        }
    }

    Err(ReloadError::Io(
        link.to_path_buf(),
        io::Error::other(format!("link target longer than {capacity} bytes")),
    ))
}

fn strip_file_name(mut target: Vec<u8>) -> PathBuf {
    match target.iter().rposition(|b| *b == b'/') {
        Some(0) => PathBuf::from("/"),
        Some(end) => {
            target.truncate(end);
            PathBuf::from(OsString::from_vec(target))
        }
        None => PathBuf::from("."),
    }
}
