//! Error types

use std::path::PathBuf;
use std::{fmt, io};

/// Type alias to use this library's `Error` type in a Result
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds
#[derive(Debug)]
pub enum ErrorKind {
    /// Generic error
    ///
    /// May be used in cases where a platform specific error is mapped to this type, or for opaque
    /// internal errors.
    Generic(String),

    /// I/O errors
    Io(io::Error),

    /// A path does not exist
    PathNotFound,

    /// Attempted to remove a watch that does not exist
    WatchNotFound,

    /// The watch mask selects no observable event
    InvalidMask,

    /// The target of an `ONLYDIR` watch is not a directory
    NotADirectory,

    /// The per-process or system-wide file descriptor limit was hit
    MaxFilesWatch,
}

/// The error type for all watch operations
#[derive(Debug)]
pub struct Error {
    /// Kind of the error
    pub kind: ErrorKind,
    /// Relevant paths to the error, if any
    pub paths: Vec<PathBuf>,
}

impl Error {
    /// Creates a new Error with empty paths
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, paths: Vec::new() }
    }

    /// Creates a new generic Error from a message
    pub fn generic(msg: &str) -> Self {
        Self::new(ErrorKind::Generic(msg.into()))
    }

    /// Creates a new i/o Error from a stdlib `io::Error`
    pub fn io(err: io::Error) -> Self {
        Self::new(ErrorKind::Io(err))
    }

    /// Creates a new i/o Error from a stdlib `io::Error` raised while opening a
    /// watch target, mapping the well-known errnos to their own kinds
    pub fn io_watch(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENOENT) => Self::path_not_found(),
            Some(libc::EMFILE) | Some(libc::ENFILE) => Self::new(ErrorKind::MaxFilesWatch),
            Some(libc::ENOTDIR) => Self::not_a_directory(),
            _ => Self::io(err),
        }
    }

    /// Creates a new Error kind for a nonexistent path
    pub fn path_not_found() -> Self {
        Self::new(ErrorKind::PathNotFound)
    }

    /// Creates a new Error kind for a nonexistent watch
    pub fn watch_not_found() -> Self {
        Self::new(ErrorKind::WatchNotFound)
    }

    /// Creates a new Error kind for a mask without observable events
    pub fn invalid_mask() -> Self {
        Self::new(ErrorKind::InvalidMask)
    }

    /// Creates a new Error kind for an `ONLYDIR` watch on a non-directory
    pub fn not_a_directory() -> Self {
        Self::new(ErrorKind::NotADirectory)
    }

    /// Adds a path to the error
    pub fn add_path(mut self, path: PathBuf) -> Self {
        self.paths.push(path);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let error = match &self.kind {
            ErrorKind::PathNotFound => "No path was found.".into(),
            ErrorKind::WatchNotFound => "No watch was found.".into(),
            ErrorKind::InvalidMask => "The event mask selects no event.".into(),
            ErrorKind::NotADirectory => "The watch target is not a directory.".into(),
            ErrorKind::MaxFilesWatch => "The file descriptor limit was reached.".into(),
            ErrorKind::Generic(err) => err.clone(),
            ErrorKind::Io(err) => err.to_string(),
        };

        if self.paths.is_empty() {
            write!(f, "{error}")
        } else {
            write!(f, "{error} about {:?}", self.paths)
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err)
    }
}

#[cfg(feature = "crossbeam-channel")]
impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(err: crossbeam_channel::SendError<T>) -> Self {
        Error::generic(&format!("internal channel disconnect: {err:?}"))
    }
}

impl<T> From<std::sync::mpsc::SendError<T>> for Error {
    fn from(err: std::sync::mpsc::SendError<T>) -> Self {
        Error::generic(&format!("internal channel disconnect: {err:?}"))
    }
}

impl From<std::sync::mpsc::RecvError> for Error {
    fn from(err: std::sync::mpsc::RecvError) -> Self {
        Error::generic(&format!("internal channel disconnect: {err:?}"))
    }
}
