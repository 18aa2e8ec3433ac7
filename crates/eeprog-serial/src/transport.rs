//! Transport layer abstraction for programmer communication
//!
//! A transport is an open duplex byte stream with a blocking, timeout
//! bounded read. A connector opens transports by port name, so the
//! controller can open and close the link within a single operation.

use crate::error::Result;
use std::time::Duration;

/// Transport trait for reading and writing bytes
pub trait Transport {
    /// Write all bytes to the transport
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read exactly `buf.len()` bytes
    ///
    /// Blocks for at most the current timeout per read and fails with
    /// `EeprogError::Timeout` if no data arrives in time.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Current read timeout
    fn timeout(&self) -> Duration;

    /// Change the read timeout
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Flush any buffered output
    fn flush(&mut self) -> Result<()>;

    /// Release the underlying device
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Opens transports by port name
pub trait Connector {
    /// Transport produced by this connector
    type Transport: Transport;

    /// Open the named port
    fn connect(&self, port: &str) -> Result<Self::Transport>;
}

#[cfg(feature = "serial")]
pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use crate::error::EeprogError;
    use crate::protocol::{BAUD_RATE, READ_TIMEOUT_MS};
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{Read, Write};

    /// Serial port transport
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
    }

    impl SerialTransport {
        /// Open a serial port at `baud`, 8N1, no flow control
        pub fn open(device: &str, baud: u32, timeout: Duration) -> Result<Self> {
            let port = serialport::new(device, baud)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(timeout)
                .open()?;

            log::info!("Opened serial port {} at {} baud", device, baud);

            Ok(Self { port })
        }
    }

    fn map_io(e: std::io::Error) -> EeprogError {
        if e.kind() == std::io::ErrorKind::TimedOut {
            EeprogError::Timeout
        } else {
            EeprogError::from(e)
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.port.write_all(data).map_err(map_io)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            self.port.read_exact(buf).map_err(map_io)
        }

        fn timeout(&self) -> Duration {
            self.port.timeout()
        }

        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.port.set_timeout(timeout)?;
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.port.flush().map_err(map_io)
        }
    }

    /// Opens serial ports with fixed link settings
    #[derive(Debug, Clone)]
    pub struct SerialConnector {
        /// Baud rate
        pub baud: u32,
        /// Per-byte read timeout
        pub timeout: Duration,
    }

    impl Default for SerialConnector {
        fn default() -> Self {
            Self {
                baud: BAUD_RATE,
                timeout: Duration::from_millis(READ_TIMEOUT_MS),
            }
        }
    }

    impl Connector for SerialConnector {
        type Transport = SerialTransport;

        fn connect(&self, port: &str) -> Result<SerialTransport> {
            SerialTransport::open(port, self.baud, self.timeout)
        }
    }
}
