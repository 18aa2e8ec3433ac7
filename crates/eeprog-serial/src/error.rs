//! Error types for eeprog operations

use eeprog_core::Error as CoreError;
use thiserror::Error;

/// eeprog driver errors
#[derive(Debug, Error)]
pub enum EeprogError {
    /// The identify command returned something other than the signature
    #[error("Invalid response from programmer")]
    InvalidSignature(String),

    /// The programmer flagged the command as failed (`-` response)
    #[error("{0}")]
    Rejected(String),

    /// Response line did not start with `+` or `-`
    #[error("Invalid response '{0}'")]
    InvalidResponse(String),

    /// A data response carried no usable payload
    #[error("Insufficient data received")]
    MissingData,

    /// Payload failed checksum verification or hex decoding
    #[error("{0}")]
    Payload(#[from] CoreError),

    /// Read-back data differs from the expected image
    #[error("Verify failed at 0x{address:06X}: expected 0x{expected:02X}, found 0x{found:02X}")]
    VerifyMismatch {
        /// Address of the first differing byte
        address: u32,
        /// Byte from the expected image
        expected: u8,
        /// Byte read from the chip
        found: u8,
    },

    /// The operation was cancelled at a page boundary
    #[error("Operation cancelled")]
    Cancelled,

    /// Caller misuse (operation running, cancel while disconnected)
    #[error("{0}")]
    InvalidOperation(&'static str),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Timeout waiting for a response byte
    #[error("Communication timeout")]
    Timeout,

    /// Failed to open the transport
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),
}

/// Broad class of an error, for consumers that cannot hold the error itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or rejected response from the programmer
    Protocol,
    /// Cancellation requested by the caller
    Cancelled,
    /// Caller misuse
    Misuse,
    /// Transport fault (open failure, timeout, I/O)
    Transport,
}

impl EeprogError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        if self.is_protocol() {
            ErrorKind::Protocol
        } else if self.is_cancelled() {
            ErrorKind::Cancelled
        } else if self.is_misuse() {
            ErrorKind::Misuse
        } else {
            ErrorKind::Transport
        }
    }

    /// Malformed or rejected response from the programmer
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature(_)
                | Self::Rejected(_)
                | Self::InvalidResponse(_)
                | Self::MissingData
                | Self::Payload(_)
                | Self::VerifyMismatch { .. }
        )
    }

    /// Checksum failure or undecodable payload on an otherwise successful response
    pub fn is_payload(&self) -> bool {
        matches!(self, Self::Payload(_))
    }

    /// Cancellation requested by the caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Caller misuse, reported synchronously
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::InvalidOperation(_) | Self::InvalidParameter(_))
    }

    /// Fault in the underlying byte stream
    pub fn is_transport(&self) -> bool {
        !(self.is_protocol() || self.is_cancelled() || self.is_misuse())
    }
}

/// Result type for eeprog operations
pub type Result<T> = std::result::Result<T, EeprogError>;
