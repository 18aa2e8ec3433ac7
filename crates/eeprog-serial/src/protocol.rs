//! eeprog protocol constants and response parsing
//!
//! The programmer speaks newline-terminated ASCII lines. Every command is a
//! single character optionally followed by hex arguments; every response
//! except the identify reply starts with `+` (success) or `-` (failure).

use crate::error::{EeprogError, Result};
use eeprog_core::codec;

/// Identity string returned by the programmer for the identify command
pub const SIGNATURE: &str = "EEPROG V0.1";

/// Default baud rate of the programmer link
pub const BAUD_RATE: u32 = 57600;

/// Per-byte read timeout while waiting for a response
pub const READ_TIMEOUT_MS: u64 = 2500;

/// Read timeout used while draining stale input
pub const FLUSH_TIMEOUT_MS: u64 = 250;

/// Longest response line accepted (excess bytes start the next line)
pub const MAX_LINE_LEN: usize = 128;

/// Largest data chunk carried by one write command
pub const WRITE_CHUNK_SIZE: usize = 32;

/// Number of times a page read is retried after a corrupted payload
pub const MAX_RETRIES: u32 = 3;

/// Line terminator
pub const EOL: u8 = b'\n';

/// Success marker
pub const RESP_OK: u8 = b'+';
/// Failure marker
pub const RESP_FAIL: u8 = b'-';

// Command characters
/// Identify the programmer
pub const CMD_IDENTIFY: char = '!';
/// Set the chip geometry identifier
pub const CMD_CONFIGURE: char = 'i';
/// Read the page at an address
pub const CMD_READ: char = 'r';
/// Write a chunk at an address
pub const CMD_WRITE: char = 'w';
/// Finish a write session
pub const CMD_DONE: char = 'd';

/// A successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Text after the `+` marker
    pub message: String,
    /// Message decoded as hex, if it decodes
    pub data: Option<Vec<u8>>,
}

/// Interpret a response line
///
/// A `-` line becomes `Rejected` carrying the message (or "No message
/// provided"). A `+` line succeeds; its body is decoded as hex when
/// possible and left undecoded otherwise.
pub fn parse_response(line: &str) -> Result<Response> {
    let marker = line.bytes().next();
    let message = line.get(1..).unwrap_or("");

    match marker {
        Some(RESP_OK) => Ok(Response {
            message: message.to_string(),
            data: codec::hex_to_bytes(message).ok(),
        }),
        Some(RESP_FAIL) if message.is_empty() => {
            Err(EeprogError::Rejected("No message provided".into()))
        }
        Some(RESP_FAIL) => Err(EeprogError::Rejected(message.to_string())),
        _ => Err(EeprogError::InvalidResponse(line.to_string())),
    }
}

/// Format a command character followed by a 16-bit identifier
pub fn identified_command(cmd: char, ident: u16) -> String {
    format!("{}{:04x}", cmd, ident)
}

/// Format a command character followed by a 24-bit address
pub fn address_command(cmd: char, address: u32) -> String {
    format!("{}{:06x}", cmd, address & codec::MAX_ADDRESS)
}
