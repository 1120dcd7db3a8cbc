use std::fmt;
use std::io;

/// Result alias for non-blocking network operations.
pub type NetResult<T> = Result<T, NetError>;

/// Outcome of a single non-blocking I/O or protocol step.
///
/// `Wait` is not a failure: it means the operation would have blocked and the
/// caller should leave connection state untouched until the next readiness
/// notification. Everything else is fatal to the connection it occurred on.
#[derive(Debug, Eq, PartialEq)]
pub enum NetError {
    Wait,
    Fatal(ErrorKind),
}

#[derive(Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Frame length prefix exceeded `MAX_FRAME`.
    FrameTooLarge,
    /// `nstr` exceeded `MAX_ARGS`, or an argument length ran past the frame boundary.
    MalformedRequest,
    /// Bytes remained in the frame after the last argument was parsed.
    TrailingBytes,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetError {
    #[inline]
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => NetError::Wait,
            kind => NetError::Fatal(ErrorKind::Io(kind)),
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Wait => write!(f, "operation would block"),
            NetError::Fatal(kind) => write!(f, "fatal connection error: {:?}", kind),
        }
    }
}

impl std::error::Error for NetError {}

/// Whether a `NetResult` represents something the caller must close the connection over.
pub trait ErrorUtils {
    fn is_fatal(&self) -> bool;
}

impl<T> ErrorUtils for NetResult<T> {
    fn is_fatal(&self) -> bool {
        !matches!(self, Ok(_) | Err(NetError::Wait))
    }
}
