//! Operation events
//!
//! The controller reports what it is doing through an [`Observer`]. Events
//! fire on the thread running the operation, in protocol order; observers
//! that feed a user interface on another thread should forward them, for
//! example with [`ChannelObserver`].

use crate::error::{EeprogError, ErrorKind};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Kind of progress being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// Read a page
    Read,
    /// Wrote a page
    Write,
    /// Verified a page
    Verify,
    /// Intermediate (non-fatal) error, the operation continues
    Error,
}

/// Direction of a protocol line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the programmer
    Input,
    /// Sent to the programmer
    Output,
}

impl Direction {
    /// Marker used when printing a line log
    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Input => "<",
            Self::Output => ">",
        }
    }
}

/// Link state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening the transport and checking the signature
    Connecting,
    /// Programmer identified
    Connected,
    /// Transport closed
    Disconnected,
}

/// Receives operation events
///
/// Every method has an empty default, so implementors only override what
/// they care about.
pub trait Observer {
    /// Progress through a transfer
    ///
    /// `target` is one more than the number of bytes transferred so that
    /// the final step (handing the data over) has its own tick.
    fn on_progress(&self, state: ProgressState, position: u64, target: u64, message: Option<&str>) {
        let _ = (state, position, target, message);
    }

    /// A protocol line was sent or received
    fn on_communication(&self, direction: Direction, line: &str) {
        let _ = (direction, line);
    }

    /// The connection state changed
    fn on_connection_state_changed(&self, state: ConnectionState) {
        let _ = state;
    }

    /// The operation failed
    ///
    /// Protocol errors carry no cause: the message is the programmer's
    /// complaint. Transport faults and cancellation attach the error.
    fn on_error(&self, message: &str, cause: Option<&EeprogError>) {
        let _ = (message, cause);
    }
}

/// An observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl Observer for NoEvents {}

impl<O: Observer + ?Sized> Observer for &O {
    fn on_progress(&self, state: ProgressState, position: u64, target: u64, message: Option<&str>) {
        (**self).on_progress(state, position, target, message)
    }

    fn on_communication(&self, direction: Direction, line: &str) {
        (**self).on_communication(direction, line)
    }

    fn on_connection_state_changed(&self, state: ConnectionState) {
        (**self).on_connection_state_changed(state)
    }

    fn on_error(&self, message: &str, cause: Option<&EeprogError>) {
        (**self).on_error(message, cause)
    }
}

impl<O: Observer + ?Sized> Observer for Arc<O> {
    fn on_progress(&self, state: ProgressState, position: u64, target: u64, message: Option<&str>) {
        (**self).on_progress(state, position, target, message)
    }

    fn on_communication(&self, direction: Direction, line: &str) {
        (**self).on_communication(direction, line)
    }

    fn on_connection_state_changed(&self, state: ConnectionState) {
        (**self).on_connection_state_changed(state)
    }

    fn on_error(&self, message: &str, cause: Option<&EeprogError>) {
        (**self).on_error(message, cause)
    }
}

/// Owned copy of an event, for sending across threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// See [`Observer::on_progress`]
    Progress {
        /// What is progressing
        state: ProgressState,
        /// Current position
        position: u64,
        /// Final position
        target: u64,
        /// Optional human readable note
        message: Option<String>,
    },
    /// See [`Observer::on_communication`]
    Communication {
        /// Line direction
        direction: Direction,
        /// Line content without terminator
        line: String,
    },
    /// See [`Observer::on_connection_state_changed`]
    ConnectionState(ConnectionState),
    /// See [`Observer::on_error`]
    Error {
        /// Description of the failure
        message: String,
        /// Class of the failure
        kind: ErrorKind,
        /// Rendered cause, if one was attached
        cause: Option<String>,
    },
}

/// Forwards events over an mpsc channel
///
/// Send failures (receiver dropped) are ignored: losing the audience does
/// not abort the transfer.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<Event>,
}

impl ChannelObserver {
    /// Wrap a channel sender
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx }
    }
}

impl Observer for ChannelObserver {
    fn on_progress(&self, state: ProgressState, position: u64, target: u64, message: Option<&str>) {
        let _ = self.tx.send(Event::Progress {
            state,
            position,
            target,
            message: message.map(str::to_string),
        });
    }

    fn on_communication(&self, direction: Direction, line: &str) {
        let _ = self.tx.send(Event::Communication {
            direction,
            line: line.to_string(),
        });
    }

    fn on_connection_state_changed(&self, state: ConnectionState) {
        let _ = self.tx.send(Event::ConnectionState(state));
    }

    fn on_error(&self, message: &str, cause: Option<&EeprogError>) {
        let kind = match cause {
            Some(e) => e.kind(),
            None => ErrorKind::Protocol,
        };
        let _ = self.tx.send(Event::Error {
            message: message.to_string(),
            kind,
            cause: cause.map(|e| e.to_string()),
        });
    }
}
