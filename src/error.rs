use std::fmt;
use std::io;

/// Failure to hand an outbound packet to the link.
///
/// Both variants are expected at runtime. [`Error::NoBufferSpace`] is
/// backpressure: the packet was dropped and the caller may carry on.
/// [`Error::ClosedForSend`] means the link is shutting down and the write
/// must not be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The outbound queue has been closed.
    ClosedForSend,
    /// The outbound queue is full; the packet was dropped.
    NoBufferSpace,
}

impl Error {
    /// Returns `true` for the recoverable backpressure condition.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Error::NoBufferSpace)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ClosedForSend => f.write_str("endpoint is closed for send"),
            Error::NoBufferSpace => f.write_str("no buffer space available"),
        }
    }
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::ClosedForSend => io::Error::new(io::ErrorKind::BrokenPipe, e),
            Error::NoBufferSpace => io::Error::new(io::ErrorKind::WouldBlock, e),
        }
    }
}
