use std::fmt;
use std::io;

use crate::model::Model;

/// Unified error type for the Jensen protocol engine.
///
/// Mirrors the taxonomy in the specification: transport failures, protocol
/// framing failures, semantic (structured, non-exceptional) results, and
/// cancellation. Collaborators that only care about coarse transport health
/// can convert into [`io::Error`] via the `From` impl below.
#[derive(Debug)]
pub enum JensenError {
    // --- Transport ---
    NotFound,
    AccessDenied,
    Disconnected,
    Io(io::ErrorKind),

    // --- Protocol ---
    ProtocolDesync,
    OversizedPacket,
    UnexpectedCommand,
    Timeout,

    // --- Semantic ---
    FileNotFound(String),
    NotSupported {
        feature: &'static str,
        model: Model,
        firmware: u32,
    },
    Busy,
    SizeUnknown,
    SizeMismatch {
        expected: u64,
        actual: u64,
    },

    // --- Cancellation ---
    Cancelled,
}

impl fmt::Display for JensenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JensenError::NotFound => write!(f, "device not found"),
            JensenError::AccessDenied => write!(f, "access denied opening device"),
            JensenError::Disconnected => write!(f, "session is disconnected"),
            JensenError::Io(kind) => write!(f, "transport I/O error: {kind:?}"),
            JensenError::ProtocolDesync => write!(f, "protocol desync: bad sync bytes"),
            JensenError::OversizedPacket => write!(f, "packet body exceeds maximum size"),
            JensenError::UnexpectedCommand => write!(f, "response command id did not match active request"),
            JensenError::Timeout => write!(f, "command timed out"),
            JensenError::FileNotFound(name) => write!(f, "file not found: {name}"),
            JensenError::NotSupported { feature, model, firmware } => write!(
                f,
                "feature '{feature}' not supported on {model:?} firmware {firmware}"
            ),
            JensenError::Busy => write!(f, "session busy (streaming in progress)"),
            JensenError::SizeUnknown => write!(f, "declared file size is unknown"),
            JensenError::SizeMismatch { expected, actual } => write!(
                f,
                "downloaded size mismatch: expected {expected}, got {actual}"
            ),
            JensenError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for JensenError {}

impl From<JensenError> for io::Error {
    fn from(err: JensenError) -> Self {
        match err {
            JensenError::NotFound => io::Error::new(io::ErrorKind::NotFound, err.to_string()),
            JensenError::AccessDenied => {
                io::Error::new(io::ErrorKind::PermissionDenied, err.to_string())
            }
            JensenError::Disconnected => {
                io::Error::new(io::ErrorKind::NotConnected, err.to_string())
            }
            JensenError::Io(kind) => io::Error::new(kind, err.to_string()),
            JensenError::Timeout => io::Error::new(io::ErrorKind::TimedOut, err.to_string()),
            JensenError::Cancelled => {
                io::Error::new(io::ErrorKind::Interrupted, err.to_string())
            }
            other => io::Error::other(other.to_string()),
        }
    }
}

impl From<libusb_async::UsbAsyncError> for JensenError {
    fn from(err: libusb_async::UsbAsyncError) -> Self {
        let io_err: io::Error = err.into();
        match io_err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => JensenError::Timeout,
            io::ErrorKind::NotConnected => JensenError::Disconnected,
            io::ErrorKind::NotFound => JensenError::NotFound,
            io::ErrorKind::PermissionDenied => JensenError::AccessDenied,
            other => JensenError::Io(other),
        }
    }
}

pub type JensenResult<T> = Result<T, JensenError>;
