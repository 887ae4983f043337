//! Error codes shared by every operation of the rendering layer.

/// The kind of an `Error`. This is what a `Session` keeps as its last error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidValue,
    InvalidEnum,
    InvalidObject,
    InvalidOperation,
    InvalidState,
    Incompatible,
    Unimplemented,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Eq, Fail)]
pub enum Error {
    /// Malformed descriptor or out-of-range argument.
    #[fail(display = "Invalid value: {}", _0)]
    InvalidValue(String),
    /// Unrecognized type or kind tag.
    #[fail(display = "Invalid enum: {}", _0)]
    InvalidEnum(String),
    /// Stale or wrong-kind handle, or an object that does not satisfy an ownership
    /// precondition.
    #[fail(display = "Invalid object: {}", _0)]
    InvalidObject(String),
    /// Call made against a slot or kind that does not support it.
    #[fail(display = "Invalid operation: {}", _0)]
    InvalidOperation(String),
    /// Call made while the required session stage or binding is absent.
    #[fail(display = "Invalid state: {}", _0)]
    InvalidState(String),
    /// Render-target and state formats mismatch, or a missing backend capability.
    #[fail(display = "Incompatible: {}", _0)]
    Incompatible(String),
    /// Recognized but unsupported operation.
    #[fail(display = "Unimplemented: {}", _0)]
    Unimplemented(String),
    /// The backend refused a request.
    #[fail(display = "Backend: {}", _0)]
    Backend(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::InvalidValue(_) => ErrorKind::InvalidValue,
            Error::InvalidEnum(_) => ErrorKind::InvalidEnum,
            Error::InvalidObject(_) => ErrorKind::InvalidObject,
            Error::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Incompatible(_) => ErrorKind::Incompatible,
            Error::Unimplemented(_) => ErrorKind::Unimplemented,
            Error::Backend(_) => ErrorKind::Backend,
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        let text = format!("{}", err);
        if text.starts_with("unknown variant") {
            Error::InvalidEnum(text)
        } else {
            Error::InvalidValue(text)
        }
    }
}

/// Builds an `Error` of the named kind from a format string.
macro_rules! err_format {
    ($kind:ident, $e:expr) => {
        $crate::errors::Error::$kind(String::from($e))
    };
    ($kind:ident, $fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::$kind(format!($fmt, $($arg)+))
    };
}

/// Returns early with an `Error` of the named kind.
macro_rules! bail_format {
    ($kind:ident, $($arg:tt)+) => {
        return Err(err_format!($kind, $($arg)+));
    };
}
