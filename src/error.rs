//! Error types
//!
//! A single [`Error`] covers the whole crate. Transport failures, protocol
//! violations and device failures are kept apart so the channel loops can
//! decide what is fatal and what is a normal end of session.

use std::fmt;
use std::io;

use crate::relay::RoutingError;
use crate::session::{PeerId, WorkerState};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Debug)]
pub enum Error {
    /// Transport-level failure
    Io(io::Error),
    /// Peer closed the connection (at a frame boundary or mid-frame)
    ConnectionClosed,
    /// Malformed or oversized frame
    Protocol(ProtocolError),
    /// Capture, codec or playback device failure
    Device(DeviceError),
    /// An I/O deadline was exhausted
    Timeout(TimeoutKind),
    /// Routing table misuse
    Routing(RoutingError),
    /// Writing a relayed frame to its destination failed
    Forward { to: PeerId, source: Box<Error> },
    /// Operation not allowed in the worker's current state
    InvalidState(WorkerState),
    /// A channel loop panicked
    LoopPanicked(String),
}

/// Framing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header declared a length above the configured maximum
    FrameTooLarge { len: usize, max: usize },
    /// Outbound payload exceeds the configured maximum
    PayloadTooLarge { len: usize, max: usize },
}

/// Media device errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No device with this index
    Unavailable { index: u32 },
    /// Camera or microphone read failed
    Capture(String),
    /// Image encode/decode failed
    Codec(String),
    /// Render or speaker write failed
    Playback(String),
}

/// Which deadline expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Connect,
    Read,
    Write,
}

impl Error {
    /// Peer went away; a normal end of session rather than a failure
    pub fn is_connection_closed(&self) -> bool {
        match self {
            Error::ConnectionClosed => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Whether this error is a framing violation
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::ConnectionClosed => write!(f, "Connection closed by peer"),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Device(e) => write!(f, "Device error: {}", e),
            Error::Timeout(kind) => write!(f, "{:?} timed out", kind),
            Error::Routing(e) => write!(f, "Routing error: {}", e),
            Error::Forward { to, source } => write!(f, "Forward to {} failed: {}", to, source),
            Error::InvalidState(state) => write!(f, "Invalid worker state: {:?}", state),
            Error::LoopPanicked(msg) => write!(f, "Channel loop panicked: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Device(e) => Some(e),
            Error::Routing(e) => Some(e),
            Error::Forward { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::FrameTooLarge { len, max } => {
                write!(f, "Frame length {} exceeds maximum {}", len, max)
            }
            ProtocolError::PayloadTooLarge { len, max } => {
                write!(f, "Payload length {} exceeds maximum {}", len, max)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Unavailable { index } => write!(f, "No device at index {}", index),
            DeviceError::Capture(msg) => write!(f, "Capture failed: {}", msg),
            DeviceError::Codec(msg) => write!(f, "Codec failed: {}", msg),
            DeviceError::Playback(msg) => write!(f, "Playback failed: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed
        } else {
            Error::Io(e)
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Error::Device(e)
    }
}

impl From<RoutingError> for Error {
    fn from(e: RoutingError) -> Self {
        Error::Routing(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_maps_to_closed() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(err.is_connection_closed());
    }

    #[test]
    fn test_reset_is_connection_closed() {
        let err: Error = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_connection_closed());

        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(!err.is_connection_closed());
    }

    #[test]
    fn test_protocol_display() {
        let err: Error = ProtocolError::FrameTooLarge { len: 20, max: 10 }.into();
        assert!(err.is_protocol());
        assert_eq!(
            err.to_string(),
            "Protocol error: Frame length 20 exceeds maximum 10"
        );
    }

    #[test]
    fn test_forward_source_chain() {
        let err = Error::Forward {
            to: PeerId(1),
            source: Box::new(Error::ConnectionClosed),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "Forward to peer-1 failed: Connection closed by peer");
    }
}
