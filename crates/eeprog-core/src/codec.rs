//! Payload encoding and checksums
//!
//! Data-bearing protocol lines carry their payload as lowercase hex digit
//! pairs. Every data line starts with a 24-bit address and ends with a
//! 16-bit checksum: the wrapping sum of the three address bytes and every
//! data byte, transmitted big-endian.
//!
//! ```text
//! aaaaaa dd dd dd ... cccc
//! ^addr  ^data        ^checksum
//! ```

#[cfg(feature = "alloc")]
use alloc::{string::String, vec::Vec};
#[cfg(feature = "alloc")]
use core::fmt::Write;

use crate::error::{Error, Result};

/// Number of address bytes at the start of a data payload
pub const ADDRESS_LEN: usize = 3;

/// Number of checksum bytes at the end of a data payload
pub const CHECKSUM_LEN: usize = 2;

/// Highest address that fits in the 24-bit wire address
pub const MAX_ADDRESS: u32 = 0x00FF_FFFF;

/// Wrapping 16-bit sum of `bytes`
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
}

/// Checksum contribution of a 24-bit address (high, mid, low byte)
pub fn address_checksum(address: u32) -> u16 {
    checksum(&address_bytes(address))
}

/// The three wire bytes of `address`, most significant first
pub fn address_bytes(address: u32) -> [u8; ADDRESS_LEN] {
    [
        ((address >> 16) & 0xFF) as u8,
        ((address >> 8) & 0xFF) as u8,
        (address & 0xFF) as u8,
    ]
}

/// Verify the trailing checksum of `bytes` and return everything before it
///
/// The checksum is the big-endian value of the last two bytes and must
/// equal the sum of all preceding bytes.
pub fn verify_checksum(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < CHECKSUM_LEN {
        return Err(Error::InsufficientData { len: bytes.len() });
    }

    let (body, tail) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let calculated = checksum(body);
    let expected = u16::from_be_bytes([tail[0], tail[1]]);
    if calculated != expected {
        return Err(Error::ChecksumMismatch {
            calculated,
            expected,
        });
    }

    Ok(body)
}

/// A verified page returned by a read request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page<'a> {
    /// Address echoed by the programmer
    pub address: u32,
    /// Data bytes, possibly empty
    pub data: &'a [u8],
}

/// Verify a read payload and split it into address and data
pub fn parse_page(payload: &[u8]) -> Result<Page<'_>> {
    if payload.len() < ADDRESS_LEN + CHECKSUM_LEN {
        return Err(Error::InsufficientData { len: payload.len() });
    }

    let body = verify_checksum(payload)?;
    let address = ((body[0] as u32) << 16) | ((body[1] as u32) << 8) | body[2] as u32;

    Ok(Page {
        address,
        data: &body[ADDRESS_LEN..],
    })
}

/// Value of a single ASCII hex digit (either case)
pub fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Decode a string of hex digit pairs
///
/// Fails on an odd number of digits and on any character outside
/// `[0-9A-Fa-f]`.
#[cfg(feature = "alloc")]
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    let digits = hex.as_bytes();
    if digits.len() % 2 != 0 {
        return Err(Error::OddLength { len: digits.len() });
    }

    let nibble = |position: usize| {
        let byte = digits[position];
        hex_value(byte).ok_or(Error::InvalidHexDigit { position, byte })
    };

    (0..digits.len())
        .step_by(2)
        .map(|i| Ok((nibble(i)? << 4) | nibble(i + 1)?))
        .collect()
}

/// Encode bytes as lowercase hex digit pairs
#[cfg(feature = "alloc")]
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Append the big-endian checksum of `bytes`
#[cfg(feature = "alloc")]
pub fn append_checksum(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + CHECKSUM_LEN);
    out.extend_from_slice(bytes);
    out.extend_from_slice(&checksum(bytes).to_be_bytes());
    out
}

/// Build the hex body of a write command
///
/// Emits `address` as six hex digits, then up to `length` bytes of `data`
/// starting at `offset` (fewer if the buffer ends first), then the
/// checksum over the address bytes and the emitted data.
#[cfg(feature = "alloc")]
pub fn encode_data_line(data: &[u8], address: u32, offset: usize, length: usize) -> String {
    let start = offset.min(data.len());
    let end = offset.saturating_add(length).min(data.len());
    let chunk = &data[start..end];

    let mut line = String::with_capacity(6 + chunk.len() * 2 + 4);
    let _ = write!(line, "{:06x}", address & MAX_ADDRESS);
    line.push_str(&bytes_to_hex(chunk));

    let sum = address_checksum(address).wrapping_add(checksum(chunk));
    let _ = write!(line, "{:04x}", sum);
    line
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_checksum_wraps() {
        let bytes = [0xFFu8; 300];
        assert_eq!(checksum(&bytes), (300u32 * 0xFF % 0x10000) as u16);
    }

    #[test]
    fn test_address_checksum_masks_bytes() {
        assert_eq!(address_checksum(0x123456), 0x12 + 0x34 + 0x56);
        // Only the low 24 bits take part
        assert_eq!(address_checksum(0xAB123456), 0x12 + 0x34 + 0x56);
    }

    #[test]
    fn test_verify_round_trip() {
        for payload in [vec![0u8, 0], vec![1, 2, 3], vec![0xFF; 64]] {
            let framed = append_checksum(&payload);
            assert_eq!(verify_checksum(&framed), Ok(payload.as_slice()));
        }
    }

    #[test]
    fn test_verify_detects_single_byte_flip() {
        let framed = append_checksum(&[0x00, 0x10, 0x20, 0xDE, 0xAD, 0xBE, 0xEF]);
        for i in 0..framed.len() {
            let mut corrupted = framed.clone();
            corrupted[i] ^= 0x01;
            assert!(
                matches!(
                    verify_checksum(&corrupted),
                    Err(Error::ChecksumMismatch { .. })
                ),
                "flip at {} not detected",
                i
            );
        }
    }

    #[test]
    fn test_verify_too_short() {
        assert_eq!(
            verify_checksum(&[0x01]),
            Err(Error::InsufficientData { len: 1 })
        );
        assert_eq!(verify_checksum(&[]), Err(Error::InsufficientData { len: 0 }));
    }

    #[test]
    fn test_checksum_mismatch_reports_values() {
        let err = verify_checksum(&[0x01, 0x02, 0x00, 0x04]).unwrap_err();
        assert_eq!(
            err,
            Error::ChecksumMismatch {
                calculated: 0x0003,
                expected: 0x0004
            }
        );
    }

    #[test]
    fn test_hex_round_trip_lowercases() {
        let hex = "00aBcDeF10Ff";
        let bytes = hex_to_bytes(hex).unwrap();
        assert_eq!(bytes, vec![0x00, 0xAB, 0xCD, 0xEF, 0x10, 0xFF]);
        assert_eq!(bytes_to_hex(&bytes), "00abcdef10ff");
    }

    #[test]
    fn test_hex_odd_length() {
        assert_eq!(hex_to_bytes("abc"), Err(Error::OddLength { len: 3 }));
    }

    #[test]
    fn test_hex_invalid_digit() {
        assert_eq!(
            hex_to_bytes("0g"),
            Err(Error::InvalidHexDigit {
                position: 1,
                byte: b'g'
            })
        );
        assert!(hex_to_bytes("OK").is_err());
    }

    #[test]
    fn test_encode_data_line() {
        let data = [0x01, 0x02, 0x03];
        // 0x000010: checksum = 0x10 + 1 + 2 + 3
        assert_eq!(encode_data_line(&data, 0x10, 0, 3), "0000100102030016");
    }

    #[test]
    fn test_encode_data_line_bounded_by_buffer() {
        let data = [0xAA, 0xBB, 0xCC];
        // Only two bytes remain after offset 1
        let line = encode_data_line(&data, 0x010203, 1, 32);
        assert_eq!(line, format_expected(0x010203, &[0xBB, 0xCC]));
        assert_eq!(line, "010203bbcc018d");
    }

    fn format_expected(address: u32, chunk: &[u8]) -> alloc::string::String {
        let sum = address_checksum(address).wrapping_add(checksum(chunk));
        let mut s = alloc::format!("{:06x}", address);
        s.push_str(&bytes_to_hex(chunk));
        s.push_str(&alloc::format!("{:04x}", sum));
        s
    }

    #[test]
    fn test_encoded_line_verifies() {
        let data: alloc::vec::Vec<u8> = (0..32u8).map(|b| b.wrapping_mul(37)).collect();
        let line = encode_data_line(&data, 0x00ABCD, 0, data.len());
        let raw = hex_to_bytes(&line).unwrap();
        let page = parse_page(&raw).unwrap();
        assert_eq!(page.address, 0x00ABCD);
        assert_eq!(page.data, data.as_slice());
    }

    #[test]
    fn test_parse_page_too_short() {
        assert_eq!(
            parse_page(&[0, 0, 0, 0]),
            Err(Error::InsufficientData { len: 4 })
        );
        let raw = append_checksum(&[0, 0, 0x20]);
        let empty = parse_page(&raw).unwrap();
        assert_eq!(empty.address, 0x20);
        assert!(empty.data.is_empty());
    }
}
