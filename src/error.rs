//! The error type returned by this library.

use std::io;

use thiserror::Error;

/// Result type used throughout this crate.
pub type FtpResult<T> = Result<T, FtpError>;

/// A framing problem on the control channel. These are fatal to the session:
/// once the reply stream is out of sync there is no way to recover it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// The server closed the control connection mid-reply.
    #[error("control connection closed by server")]
    ConnectionClosed,
    /// A reply line did not start with three decimal digits.
    #[error("reply code is not numeric")]
    InvalidCode,
    /// A reply line was shorter than the minimal `DDD` form.
    #[error("reply line is truncated")]
    TruncatedLine,
    /// A reply line had a valid code but no separator after it.
    #[error("malformed reply line")]
    InvalidLine,
    /// A reply line exceeded the maximum accepted length.
    #[error("reply line is too long")]
    LineTooLong,
    /// A multiline reply ran over the maximum accepted number of lines.
    #[error("too many lines in multiline reply")]
    TooManyLines,
    /// A reply line was not valid UTF-8.
    #[error("reply line is not valid UTF-8")]
    NotUtf8,
}

/// A list specifying the categories of errors FTP operations can return.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FtpError {
    /// Dialing, reading, writing or the TLS handshake failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The reply stream could not be parsed. The session is torn down.
    #[error("control channel framing error: {0}")]
    Frame(#[from] FrameError),

    /// The server answered with a code other than the expected one. The
    /// session remains usable; callers may inspect the code, e.g. a `502`
    /// from REIN just means the server never implemented it.
    #[error("unexpected reply: {code} {text}")]
    UnexpectedReply {
        /// The reply code the server sent.
        code: u16,
        /// The server-supplied message text.
        text: String,
    },

    /// A reply had the right code but text this library could not interpret.
    #[error("malformed {what} reply: {text}")]
    MalformedReply {
        /// Which reply was being interpreted, e.g. `"PASV"`.
        what: &'static str,
        /// The offending text.
        text: String,
    },

    /// A glob pattern was syntactically invalid.
    #[error("bad glob pattern")]
    BadPattern,

    /// The session's cancel handle fired.
    #[error("operation cancelled")]
    Cancelled,

    /// An operation did not complete within the session timeout.
    #[error("operation timed out")]
    TimedOut,

    /// The session was quit or torn down by an earlier fatal error.
    #[error("session is closed")]
    Closed,

    /// A data-bearing command was issued while a retrieval handle from an
    /// earlier command was still open. Nothing was sent on the wire.
    #[error("a transfer is already in progress")]
    TransferInProgress,

    /// Two failures in one operation, typically an operation error merged
    /// with the error of the cleanup that followed it.
    #[error("{}", display_merged(.0))]
    Multiple(Vec<FtpError>),
}

impl FtpError {
    /// Returns the reply code if this error (or, for merged errors, any of
    /// its members) is an unexpected-reply error.
    pub fn status(&self) -> Option<u16> {
        match self {
            FtpError::UnexpectedReply { code, .. } => Some(*code),
            FtpError::Multiple(errs) => errs.iter().find_map(|e| e.status()),
            _ => None,
        }
    }

    /// Tells whether this error carries the given reply code.
    pub fn is_status(&self, code: u16) -> bool {
        self.status() == Some(code)
    }

    /// Merges an operation result with a cleanup error. `None` cleanup
    /// errors are discarded; when both are present the operation error
    /// comes first in the chain.
    pub(crate) fn merge(op: Option<FtpError>, cleanup: Option<FtpError>) -> Option<FtpError> {
        match (op, cleanup) {
            (None, None) => None,
            (Some(e), None) | (None, Some(e)) => Some(e),
            (Some(a), Some(b)) => {
                let mut errs = Vec::with_capacity(2);
                match a {
                    FtpError::Multiple(mut v) => errs.append(&mut v),
                    other => errs.push(other),
                }
                match b {
                    FtpError::Multiple(mut v) => errs.append(&mut v),
                    other => errs.push(other),
                }
                Some(FtpError::Multiple(errs))
            }
        }
    }
}

fn display_merged(errs: &[FtpError]) -> String {
    let mut s = String::new();
    for (i, err) in errs.iter().enumerate() {
        if i > 0 {
            s.push_str(": ");
        }
        s.push_str(&err.to_string());
    }
    s
}
