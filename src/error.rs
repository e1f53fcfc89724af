//! Error taxonomy and the last-error slot
//!
//! Every fallible operation returns a [`Result`]. In addition, models and
//! iterator backends remember the most recent failure in an [`ErrorCache`]
//! so that callers polling an iterator (`while it.next() { .. }`) can tell a
//! clean end of data from a failed fetch by checking `last_error()`.

use parking_lot::Mutex;
use std::fmt;
use std::io;
use thiserror::Error;

/// Numeric error codes. The values are part of the transport wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None,
    InvalidArgument,
    NotSupported,
    ParsingFailed,
    PermissionDenied,
    Timeout,
    Unknown,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::None => 0,
            ErrorCode::InvalidArgument => 1,
            ErrorCode::NotSupported => 2,
            ErrorCode::ParsingFailed => 3,
            ErrorCode::PermissionDenied => 4,
            ErrorCode::Timeout => 5,
            ErrorCode::Unknown => 0x1000,
        }
    }

    /// Map a raw code onto the taxonomy. Engine codes fall into `Unknown`.
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => ErrorCode::None,
            1 => ErrorCode::InvalidArgument,
            2 => ErrorCode::NotSupported,
            3 => ErrorCode::ParsingFailed,
            4 => ErrorCode::PermissionDenied,
            5 => ErrorCode::Timeout,
            _ => ErrorCode::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::None => "no error",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::NotSupported => "not supported",
            ErrorCode::ParsingFailed => "parsing failed",
            ErrorCode::PermissionDenied => "permission denied",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}

/// Source position of a parse failure. Unknown components are `-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub line: i32,
    pub column: i32,
    pub byte: i32,
    pub file_name: String,
}

impl Locator {
    pub fn new(line: i32, column: i32) -> Self {
        Self {
            line,
            column,
            byte: -1,
            file_name: String::new(),
        }
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self {
            line: -1,
            column: -1,
            byte: -1,
            file_name: String::new(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.file_name.is_empty() {
            write!(f, "{}:", self.file_name)?;
        }
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors reported by models, iterators and their collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or missing argument, e.g. adding an invalid statement
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend does not implement the operation
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A read-only model rejected a write
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A blocking fetch stalled past its retry budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Parse failure with a source position
    #[error("Parse error at {locator}: {message}")]
    Parser { message: String, locator: Locator },

    /// Failure reported by the storage engine, carrying its native code
    #[error("{message} (code {code})")]
    Unknown { code: i32, message: String },
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Error::NotSupported(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Error::PermissionDenied(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Timeout(message.into())
    }

    pub fn parser(message: impl Into<String>, locator: Locator) -> Self {
        Error::Parser {
            message: message.into(),
            locator,
        }
    }

    /// Engine failure without a more specific native code
    pub fn unknown(message: impl Into<String>) -> Self {
        Error::Unknown {
            code: ErrorCode::Unknown.as_i32(),
            message: message.into(),
        }
    }

    pub fn engine(code: i32, message: impl Into<String>) -> Self {
        Error::Unknown {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Error::Timeout(_) => ErrorCode::Timeout,
            Error::Parser { .. } => ErrorCode::ParsingFailed,
            Error::Unknown { .. } => ErrorCode::Unknown,
        }
    }

    /// The code as sent over the wire. Engine errors keep their native code.
    pub fn raw_code(&self) -> i32 {
        match self {
            Error::Unknown { code, .. } => *code,
            other => other.code().as_i32(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::InvalidArgument(m)
            | Error::NotSupported(m)
            | Error::PermissionDenied(m)
            | Error::Timeout(m) => m,
            Error::Parser { message, .. } | Error::Unknown { message, .. } => message,
        }
    }

    pub fn locator(&self) -> Option<&Locator> {
        match self {
            Error::Parser { locator, .. } => Some(locator),
            _ => None,
        }
    }

    /// Rebuild an error from its code and message, as received from a peer.
    pub fn from_parts(code: i32, message: String, locator: Option<Locator>) -> Self {
        if let Some(locator) = locator {
            return Error::Parser { message, locator };
        }
        match ErrorCode::from_i32(code) {
            ErrorCode::InvalidArgument => Error::InvalidArgument(message),
            ErrorCode::NotSupported => Error::NotSupported(message),
            ErrorCode::PermissionDenied => Error::PermissionDenied(message),
            ErrorCode::Timeout => Error::Timeout(message),
            ErrorCode::ParsingFailed => Error::Parser {
                message,
                locator: Locator::default(),
            },
            ErrorCode::None | ErrorCode::Unknown => Error::Unknown { code, message },
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout(err.to_string()),
            io::ErrorKind::InvalidData => Error::parser(err.to_string(), Locator::default()),
            _ => Error::unknown(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(native, _) => Error::engine(
                ErrorCode::Unknown.as_i32() + native.extended_code,
                err.to_string(),
            ),
            _ => Error::unknown(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            Error::engine(
                ErrorCode::Unknown.as_i32() + i32::from(status.as_u16()),
                err.to_string(),
            )
        } else {
            Error::unknown(err.to_string())
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The "last error" slot shared by models and iterators.
///
/// Cleared by every successful operation and set by every failing one.
#[derive(Debug, Default)]
pub struct ErrorCache {
    last: Mutex<Option<Error>>,
}

impl ErrorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last.lock().clone()
    }

    pub fn set_error(&self, error: Error) {
        *self.last.lock() = Some(error);
    }

    pub fn clear_error(&self) {
        *self.last.lock() = None;
    }

    /// Record the outcome of an operation and hand it back unchanged.
    pub fn track<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.clear_error(),
            Err(e) => self.set_error(e.clone()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in [
            ErrorCode::None,
            ErrorCode::InvalidArgument,
            ErrorCode::NotSupported,
            ErrorCode::ParsingFailed,
            ErrorCode::PermissionDenied,
            ErrorCode::Timeout,
            ErrorCode::Unknown,
        ] {
            assert_eq!(ErrorCode::from_i32(code.as_i32()), code);
        }
        assert_eq!(ErrorCode::from_i32(0x1000 + 17), ErrorCode::Unknown);
    }

    #[test]
    fn test_engine_code_is_kept() {
        let err = Error::engine(0x1005, "disk full");
        assert_eq!(err.code(), ErrorCode::Unknown);
        assert_eq!(err.raw_code(), 0x1005);
        assert_eq!(Error::from_parts(0x1005, "disk full".into(), None), err);
    }

    #[test]
    fn test_parser_error_carries_locator() {
        let err = Error::parser("unexpected '.'", Locator::new(3, 14));
        assert_eq!(err.code(), ErrorCode::ParsingFailed);
        assert_eq!(err.locator().map(|l| l.line), Some(3));
        assert!(err.to_string().contains("3:14"));
    }

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let err: Error = io::Error::new(io::ErrorKind::TimedOut, "stalled").into();
        assert_eq!(err.code(), ErrorCode::Timeout);
    }

    #[test]
    fn test_error_cache_track() {
        let cache = ErrorCache::new();
        let failed: Result<()> = cache.track(Err(Error::not_supported("count")));
        assert!(failed.is_err());
        assert_eq!(cache.last_error().map(|e| e.code()), Some(ErrorCode::NotSupported));

        let ok = cache.track(Ok(5));
        assert_eq!(ok, Ok(5));
        assert!(cache.last_error().is_none());
    }
}
