//! Error types for eeprog-core
//!
//! This module provides a no_std compatible error type shared by the
//! geometry descriptor and the payload codec.

use core::fmt;

/// Which geometry parameter was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryField {
    /// Page size exponent outside 1..=8
    PageBits(u8),
    /// Address space exponent outside 1..=32
    SizeBits(u8),
    /// Address byte count outside 1..=4
    AddressBytes(u8),
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Geometry errors
    /// A geometry parameter is out of range
    InvalidGeometry(GeometryField),

    // Payload errors
    /// Payload too short to carry a checksum
    InsufficientData {
        /// Number of bytes received
        len: usize,
    },
    /// Checksum over the payload does not match the trailing checksum
    ChecksumMismatch {
        /// Sum computed over the received bytes
        calculated: u16,
        /// Checksum carried by the payload
        expected: u16,
    },
    /// Hex payload has an odd number of digits
    OddLength {
        /// Length of the hex string
        len: usize,
    },
    /// Hex payload contains a character that is not a hex digit
    InvalidHexDigit {
        /// Position of the character in the hex string
        position: usize,
        /// The offending byte
        byte: u8,
    },
}

impl Error {
    /// Whether this error came from checksum verification
    pub fn is_checksum(&self) -> bool {
        matches!(self, Self::InsufficientData { .. } | Self::ChecksumMismatch { .. })
    }
}

impl fmt::Display for GeometryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageBits(v) => write!(f, "invalid page size exponent {} (expected 1-8)", v),
            Self::SizeBits(v) => write!(f, "invalid chip size exponent {} (expected 1-32)", v),
            Self::AddressBytes(v) => {
                write!(f, "invalid address size {} (expected 1-4 bytes)", v)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGeometry(field) => write!(f, "{}", field),
            Self::InsufficientData { len } => {
                write!(f, "Insufficient data received ({} bytes)", len)
            }
            Self::ChecksumMismatch {
                calculated,
                expected,
            } => write!(
                f,
                "Invalid checksum - calculated {:04X}, expected {:04X}",
                calculated, expected
            ),
            Self::OddLength { len } => {
                write!(f, "hex payload has an odd number of digits ({})", len)
            }
            Self::InvalidHexDigit { position, byte } => write!(
                f,
                "invalid hex digit 0x{:02X} at position {}",
                byte, position
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
