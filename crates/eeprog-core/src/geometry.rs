//! Chip geometry descriptor
//!
//! A geometry describes how the programmer must address a particular
//! EEPROM: which bus it sits on, how large a page is, how large the chip
//! is and how many address bytes go on the wire. The programmer receives
//! all of this packed into a single 16-bit identifier word.

use crate::error::{Error, GeometryField, Result};

/// Bus the chip is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionType {
    /// SPI bus
    #[cfg_attr(feature = "serde", serde(alias = "SPI"))]
    Spi,
    /// I2C bus
    #[cfg_attr(feature = "serde", serde(alias = "I2C"))]
    I2c,
}

impl ConnectionType {
    /// Short display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Spi => "SPI",
            Self::I2c => "I2C",
        }
    }
}

impl core::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Page size exponent bounds
pub const PAGE_BITS_RANGE: core::ops::RangeInclusive<u8> = 1..=8;
/// Chip size exponent bounds
pub const SIZE_BITS_RANGE: core::ops::RangeInclusive<u8> = 1..=32;
/// Address byte count bounds
pub const ADDRESS_BYTES_RANGE: core::ops::RangeInclusive<u8> = 1..=4;

/// Addressing and page parameters of a target chip
///
/// Instances are validated at construction and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChipGeometry {
    connection: ConnectionType,
    page_bits: u8,
    size_bits: u8,
    address_bytes: u8,
}

impl ChipGeometry {
    /// Create a geometry, validating every parameter
    ///
    /// * `page_bits` - page size is `2^page_bits` bytes (1-8)
    /// * `size_bits` - chip size is `2^size_bits` bytes (1-32)
    /// * `address_bytes` - address bytes sent to the chip (1-4)
    pub fn new(
        connection: ConnectionType,
        page_bits: u8,
        size_bits: u8,
        address_bytes: u8,
    ) -> Result<Self> {
        if !PAGE_BITS_RANGE.contains(&page_bits) {
            return Err(Error::InvalidGeometry(GeometryField::PageBits(page_bits)));
        }
        if !SIZE_BITS_RANGE.contains(&size_bits) {
            return Err(Error::InvalidGeometry(GeometryField::SizeBits(size_bits)));
        }
        if !ADDRESS_BYTES_RANGE.contains(&address_bytes) {
            return Err(Error::InvalidGeometry(GeometryField::AddressBytes(
                address_bytes,
            )));
        }

        Ok(Self {
            connection,
            page_bits,
            size_bits,
            address_bytes,
        })
    }

    /// Decode a geometry from its protocol identifier word
    ///
    /// Bits 0-3 are ignored. Fails if the packed address byte count is 0
    /// or greater than 4.
    pub fn from_protocol_id(id: u16) -> Result<Self> {
        let connection = if id & 0x8000 != 0 {
            ConnectionType::I2c
        } else {
            ConnectionType::Spi
        };
        let page_bits = ((id >> 12) & 0x07) as u8 + 1;
        let size_bits = ((id >> 7) & 0x1F) as u8 + 1;
        let address_bytes = ((id >> 4) & 0x07) as u8;
        Self::new(connection, page_bits, size_bits, address_bytes)
    }

    /// Bus the chip is attached to
    pub fn connection(&self) -> ConnectionType {
        self.connection
    }

    /// Page size exponent
    pub fn page_bits(&self) -> u8 {
        self.page_bits
    }

    /// Chip size exponent
    pub fn size_bits(&self) -> u8 {
        self.size_bits
    }

    /// Number of address bytes on the chip bus
    pub fn address_bytes(&self) -> u8 {
        self.address_bytes
    }

    /// Page size in bytes
    pub fn page_size(&self) -> u32 {
        1 << self.page_bits
    }

    /// Total chip size in bytes
    pub fn size(&self) -> u64 {
        1u64 << self.size_bits
    }

    /// Identifier word sent with the configure command
    ///
    /// Layout: bit 15 bus (1 = I2C), bits 12-14 `page_bits - 1`,
    /// bits 7-11 `size_bits - 1`, bits 4-6 address byte count.
    pub fn protocol_id(&self) -> u16 {
        let mut id: u16 = match self.connection {
            ConnectionType::I2c => 0x8000,
            ConnectionType::Spi => 0x0000,
        };
        id |= ((self.page_bits - 1) as u16) << 12;
        id |= ((self.size_bits - 1) as u16) << 7;
        id |= (self.address_bytes as u16) << 4;
        id
    }
}
