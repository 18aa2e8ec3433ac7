//! eeprog-core - Core types for serial EEPROM programming
//!
//! This crate holds the pieces of the eeprog protocol that do not need a
//! transport: the chip geometry descriptor and the identifier word derived
//! from it, the hexadecimal payload encoding and the additive checksum used
//! on data lines. It is `no_std` compatible; the hex codec needs `alloc`.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc` and `serde`)
//! - `alloc` - Enable the hex codec and data line encoding
//! - `serde` - Derive `Deserialize`/`Serialize` for geometry types
//!
//! # Example
//!
//! ```
//! use eeprog_core::geometry::{ChipGeometry, ConnectionType};
//!
//! let chip = ChipGeometry::new(ConnectionType::I2c, 6, 13, 1).unwrap();
//! assert_eq!(chip.page_size(), 64);
//! assert_eq!(chip.protocol_id(), 0xD610);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod codec;
pub mod error;
pub mod geometry;

pub use error::{Error, Result};
pub use geometry::{ChipGeometry, ConnectionType};
