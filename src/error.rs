//! Error types for the reload pipeline.

use crate::program::ShaderStage;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while locating, loading, building or watching shaders.
///
/// Build-side errors (`Io`, `FileNotFound`, `Compile`, `Link`) are recovered by
/// the reloader, which keeps the last good program active. `ResourceExhausted`
/// and `Fatal` mean the watch machinery itself is gone; see [`ReloadError::is_fatal`].
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("IO error at `{0}`")]
    Io(PathBuf, #[source] io::Error),

    #[error("shader source `{0}` not found")]
    FileNotFound(PathBuf),

    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("shader program failed to link:\n{0}")]
    Link(String),

    #[error("cannot watch `{0}`")]
    InvalidPath(PathBuf, #[source] io::Error),

    #[error("could not allocate {what}")]
    ResourceExhausted {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("change notification stream failed")]
    Fatal(#[source] io::Error),
}

impl ReloadError {
    /// Returns true for errors the host process cannot continue after.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. } | Self::Fatal(_))
    }

    /// Maps an `inotify_add_watch`/`inotify_init1` failure onto the taxonomy.
    pub(crate) fn from_watch_errno(path: PathBuf, err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENOSPC | libc::ENOMEM | libc::EMFILE | libc::ENFILE) => {
                Self::ResourceExhausted {
                    what: "an inotify watch",
                    source: err,
                }
            }
            _ => Self::InvalidPath(path, err),
        }
    }
}

pub type Result<T, E = ReloadError> = std::result::Result<T, E>;
