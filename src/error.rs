//! Error types for the ping-sonar library.

use thiserror::Error;

/// The main error type for driver operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Protocol error (unexpected reply content).
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Command timed out waiting for its reply.
    #[error("command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Another command is still waiting for its reply.
    #[error("busy: still waiting for a reply to message {pending_id}")]
    Busy { pending_id: u16 },

    /// The device rejected the command.
    #[error("device rejected message {id}: {message}")]
    Nack { id: u16, message: String },

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Channel send error.
    #[error("channel send error")]
    ChannelSend,

    /// Channel receive error.
    #[error("channel closed")]
    ChannelClosed,
}

impl Error {
    /// Returns true for link-level failures that call for a reconnect.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Serial(_)
                | Self::Io(_)
                | Self::NotConnected
                | Self::ChannelSend
                | Self::ChannelClosed
        )
    }
}

/// Frame-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Frame too short to contain header and checksum.
    #[error("frame too short: need at least {min} bytes, got {got}")]
    TooShort { min: usize, got: usize },

    /// Frame does not start with the `BR` start marker.
    #[error("bad start marker: {0:02x?}")]
    BadStart([u8; 2]),

    /// Frame payload exceeds maximum size.
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Declared payload length disagrees with the frame length.
    #[error("incomplete frame: expected {expected} bytes, got {got}")]
    Incomplete { expected: usize, got: usize },

    /// Checksum mismatch.
    #[error("checksum mismatch: frame says 0x{expected:04x}, computed 0x{computed:04x}")]
    Checksum { expected: u16, computed: u16 },

    /// Payload does not match the catalog layout for this message id.
    #[error("message {id}: payload is {got} bytes, layout needs {expected}")]
    PayloadLength { id: u16, expected: usize, got: usize },

    /// Field values do not match the catalog layout for this message id.
    #[error("message {id}: {reason}")]
    Layout { id: u16, reason: String },
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;
