//! eeprog-serial - host side of the eeprog programmer protocol
//!
//! This crate talks to a microcontroller-based EEPROM programmer over a
//! serial link and moves chip images to and from it.
//!
//! # Protocol Overview
//!
//! The protocol is line based ASCII at 57600 baud. The host identifies the
//! programmer (`!`), sends the chip geometry (`i`), then reads pages (`r`)
//! or writes chunks (`w`) followed by a finalize (`d`). Binary payloads
//! are hex encoded and end with a 16-bit additive checksum.
//!
//! # Layers
//!
//! - [`transport`]: byte stream with a read timeout, serial port or anything
//!   else implementing [`Transport`]
//! - [`framer`]: command and response lines
//! - [`session`]: handshake, configuration and paged transfers
//! - [`controller`]: one operation at a time with cancellation and events
//!
//! # Example
//!
//! ```no_run
//! use eeprog_core::{ChipGeometry, ConnectionType};
//! use eeprog_serial::{NoEvents, SerialConnector, TransferController};
//!
//! let chip = ChipGeometry::new(ConnectionType::I2c, 6, 13, 1)?;
//! let controller = TransferController::new(SerialConnector::default(), NoEvents);
//!
//! let mut image = Vec::new();
//! controller.read("/dev/ttyUSB0", &chip, 0, 8192, &mut image)?;
//! println!("Read {} bytes", image.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cancel;
pub mod controller;
pub mod error;
pub mod events;
pub mod framer;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports
pub use cancel::CancelToken;
pub use controller::{FileSink, ImageSink, Operation, TransferController};
pub use error::{EeprogError, ErrorKind, Result};
pub use events::{
    ChannelObserver, ConnectionState, Direction, Event, NoEvents, Observer, ProgressState,
};
pub use protocol::{Response, SIGNATURE};
pub use session::{check_range, Session, SessionOptions};
pub use transport::{Connector, Transport};

#[cfg(feature = "serial")]
pub use transport::serial::{SerialConnector, SerialTransport};
