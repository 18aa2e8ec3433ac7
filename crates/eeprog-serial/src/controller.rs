//! Transfer controller
//!
//! The controller owns the lifecycle of one operation at a time:
//!
//! 1. Refuse to start if another operation is running
//! 2. Open the transport and drain stale input
//! 3. Check the programmer signature
//! 4. Configure the chip geometry
//! 5. Run the paged transfer
//! 6. Close the transport, whatever happened
//!
//! Each operation is a single blocking call meant to run on a worker
//! thread. [`TransferController::cancel`] may be called from any other
//! thread; the transfer stops at the next page boundary.

use crate::cancel::CancelToken;
use crate::error::{EeprogError, ErrorKind, Result};
use crate::events::{ConnectionState, Observer, ProgressState};
use crate::session::{check_range, Session, SessionOptions};
use crate::transport::{Connector, Transport};

use eeprog_core::ChipGeometry;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Operation currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// No operation is being performed
    Idle,
    /// Reading (or verifying) chip contents
    Reading,
    /// Writing chip contents
    Writing,
}

/// Destination for a completed read
pub trait ImageSink {
    /// Take the full image; only called after every page was received
    fn store(&mut self, image: &[u8]) -> std::io::Result<()>;
}

impl ImageSink for Vec<u8> {
    fn store(&mut self, image: &[u8]) -> std::io::Result<()> {
        self.clear();
        self.extend_from_slice(image);
        Ok(())
    }
}

/// Writes the image to a file, creating it only once the read succeeded
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Sink that saves to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageSink for FileSink {
    fn store(&mut self, image: &[u8]) -> std::io::Result<()> {
        std::fs::write(&self.path, image)?;
        log::info!("Saved {} bytes to {}", image.len(), self.path.display());
        Ok(())
    }
}

#[derive(Debug)]
struct State {
    connection: ConnectionState,
    operation: Operation,
}

/// Sequences connect, configure, transfer and disconnect
pub struct TransferController<C: Connector, O: Observer> {
    connector: C,
    observer: O,
    options: SessionOptions,
    state: Mutex<State>,
    cancel: CancelToken,
}

impl<C: Connector, O: Observer> TransferController<C, O> {
    /// Create an idle controller
    pub fn new(connector: C, observer: O) -> Self {
        Self {
            connector,
            observer,
            options: SessionOptions::default(),
            state: Mutex::new(State {
                connection: ConnectionState::Disconnected,
                operation: Operation::Idle,
            }),
            cancel: CancelToken::new(),
        }
    }

    /// Replace the session tunables
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.lock().connection
    }

    /// Current operation
    pub fn operation(&self) -> Operation {
        self.lock().operation
    }

    /// Read `size` bytes starting at `offset` and hand them to `sink`
    ///
    /// Fails synchronously, without events, if an operation is already
    /// running or the range does not fit the chip. Any later failure is
    /// reported to the observer and returned.
    pub fn read<S: ImageSink + ?Sized>(
        &self,
        port: &str,
        geometry: &ChipGeometry,
        offset: u32,
        size: usize,
        sink: &mut S,
    ) -> Result<()> {
        check_range(geometry, offset, size)?;

        self.run(Operation::Reading, port, geometry, |session| {
            let mut data = vec![0u8; size];
            session.read_pages(offset, &mut data)?;

            let target = size as u64 + 1;
            self.observer.on_progress(
                ProgressState::Read,
                target,
                target,
                Some(&format!("Saving {} bytes.", size)),
            );
            sink.store(&data)?;
            Ok(())
        })
    }

    /// Write `source` starting at `offset`
    pub fn write(
        &self,
        port: &str,
        geometry: &ChipGeometry,
        offset: u32,
        source: &[u8],
    ) -> Result<()> {
        check_range(geometry, offset, source.len())?;

        self.run(Operation::Writing, port, geometry, |session| {
            session.write_pages(offset, source)
        })
    }

    /// Compare chip contents starting at `offset` with `expected`
    pub fn verify(
        &self,
        port: &str,
        geometry: &ChipGeometry,
        offset: u32,
        expected: &[u8],
    ) -> Result<()> {
        check_range(geometry, offset, expected.len())?;

        self.run(Operation::Reading, port, geometry, |session| {
            session.verify_pages(offset, expected)
        })
    }

    /// Ask the running operation to stop at the next page boundary
    ///
    /// Fails if no programmer is connected.
    pub fn cancel(&self) -> Result<()> {
        let state = self.lock();
        if state.connection != ConnectionState::Connected {
            return Err(EeprogError::InvalidOperation("Device is not connected"));
        }
        if state.operation != Operation::Idle {
            log::info!("Cancellation requested");
            self.cancel.cancel();
        }
        Ok(())
    }

    fn run<F>(
        &self,
        operation: Operation,
        port: &str,
        geometry: &ChipGeometry,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Session<'_, C::Transport, O>) -> Result<()>,
    {
        self.begin(operation)?;

        let mut active = ActiveOperation {
            controller: self,
            transport: None,
        };
        let result = self.execute(&mut active.transport, port, geometry, body);
        if let Err(e) = &result {
            self.report(e);
        }
        drop(active);

        result
    }

    fn execute<F>(
        &self,
        slot: &mut Option<C::Transport>,
        port: &str,
        geometry: &ChipGeometry,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Session<'_, C::Transport, O>) -> Result<()>,
    {
        self.set_connection(ConnectionState::Connecting);
        log::debug!("Opening {}", port);
        let transport = slot.insert(self.connector.connect(port)?);

        let mut session = Session::new(
            transport,
            &self.observer,
            &self.cancel,
            self.options.clone(),
        );
        session.flush_input()?;
        session.handshake()?;
        self.set_connection(ConnectionState::Connected);

        session.configure(geometry)?;
        body(&mut session)
    }

    fn begin(&self, operation: Operation) -> Result<()> {
        let mut state = self.lock();
        if state.operation != Operation::Idle {
            return Err(EeprogError::InvalidOperation("Operation already in progress"));
        }
        state.operation = operation;
        self.cancel.reset();
        log::debug!("Starting {:?}", operation);
        Ok(())
    }

    fn report(&self, err: &EeprogError) {
        match err.kind() {
            ErrorKind::Protocol => {
                log::error!("{}", err);
                self.observer.on_error(&err.to_string(), None);
            }
            ErrorKind::Cancelled => {
                log::warn!("Operation cancelled");
                self.observer.on_error("Operation cancelled", Some(err));
            }
            ErrorKind::Misuse | ErrorKind::Transport => {
                log::error!("Unexpected error during operation: {}", err);
                self.observer.on_error("Unexpected error during operation", Some(err));
            }
        }
    }

    fn set_connection(&self, connection: ConnectionState) {
        self.lock().connection = connection;
        self.observer.on_connection_state_changed(connection);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cleanup for a running operation, executed exactly once on drop
struct ActiveOperation<'a, C: Connector, O: Observer> {
    controller: &'a TransferController<C, O>,
    transport: Option<C::Transport>,
}

impl<C: Connector, O: Observer> Drop for ActiveOperation<'_, C, O> {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                log::debug!("Ignoring error while closing transport: {}", e);
            }
        }
        self.controller.set_connection(ConnectionState::Disconnected);
        self.controller.lock().operation = Operation::Idle;
        log::debug!("Operation finished");
    }
}
