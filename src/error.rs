use std::fmt;
use std::io;

use crate::router::RouteError;
use crate::zip_files::ArchiveError;

/// Errors surfaced by the embedding API.
///
/// Lifecycle misuse and registration mistakes are reported synchronously to
/// the caller; everything that happens on the wire is answered with an HTTP
/// error response instead and never reaches this type.
#[derive(Debug)]
pub enum Error {
    /// `start`/`stop` called while the server is in the wrong state.
    Lifecycle(&'static str),
    /// Invalid route registration (bad segment, duplicate parameter, ...).
    Route(RouteError),
    /// The zip archive handed to [`crate::Server::zip`] could not be decoded.
    Archive(ArchiveError),
    /// Socket-level failure while binding the listener.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lifecycle(msg) => f.write_str(msg),
            Error::Route(e) => write!(f, "route registration failed: {e}"),
            Error::Archive(e) => write!(f, "archive load failed: {e}"),
            Error::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Route(e) => Some(e),
            Error::Archive(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Lifecycle(_) => None,
        }
    }
}

impl From<RouteError> for Error {
    fn from(e: RouteError) -> Self {
        Error::Route(e)
    }
}

impl From<ArchiveError> for Error {
    fn from(e: ArchiveError) -> Self {
        Error::Archive(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
