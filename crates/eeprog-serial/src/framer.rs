//! Line framing over a transport
//!
//! Commands go out as a line of text followed by `\n`. Responses come back
//! one byte at a time until `\n` arrives or [`MAX_LINE_LEN`] bytes have
//! accumulated, so a garbled stream without terminators still returns.

use crate::error::{EeprogError, Result};
use crate::events::{Direction, Observer};
use crate::protocol::{identified_command, EOL, MAX_LINE_LEN};
use crate::transport::Transport;
use std::time::Duration;

/// Upper bound on bytes discarded by a single flush
const MAX_FLUSH_BYTES: usize = 64 * 1024;

/// Sends command lines and reads response lines
pub struct Framer<'a, T: Transport + ?Sized, O: Observer + ?Sized> {
    transport: &'a mut T,
    observer: &'a O,
}

impl<'a, T: Transport + ?Sized, O: Observer + ?Sized> Framer<'a, T, O> {
    /// Frame lines over `transport`, reporting traffic to `observer`
    pub fn new(transport: &'a mut T, observer: &'a O) -> Self {
        Self {
            transport,
            observer,
        }
    }

    /// Send a command and return the response line
    ///
    /// Trailing whitespace is stripped from the response.
    pub fn send_command(&mut self, cmd: &str) -> Result<String> {
        let mut line = Vec::with_capacity(cmd.len() + 1);
        line.extend_from_slice(cmd.as_bytes());
        line.push(EOL);

        self.transport.write(&line)?;
        self.transport.flush()?;
        log::trace!("{} {}", Direction::Output.arrow(), cmd);
        self.observer.on_communication(Direction::Output, cmd);

        let response = self.read_line()?;
        log::trace!("{} {}", Direction::Input.arrow(), response);
        self.observer.on_communication(Direction::Input, &response);

        Ok(response)
    }

    /// Send a command character followed by a 4 digit hex identifier
    pub fn send_identified_command(&mut self, cmd: char, ident: u16) -> Result<String> {
        self.send_command(&identified_command(cmd, ident))
    }

    /// Discard pending input until the line goes quiet for `timeout`
    ///
    /// The previous read timeout is restored whether or not draining
    /// succeeds. Returns the number of discarded bytes.
    pub fn flush_input(&mut self, timeout: Duration) -> Result<usize> {
        let saved = self.transport.timeout();
        self.transport.set_timeout(timeout)?;

        let drained = self.drain();
        let restored = self.transport.set_timeout(saved);

        let count = drained?;
        restored?;

        if count > 0 {
            log::debug!("Discarded {} stale bytes", count);
        }
        Ok(count)
    }

    fn drain(&mut self) -> Result<usize> {
        let mut byte = [0u8];
        let mut count = 0;
        while count < MAX_FLUSH_BYTES {
            match self.transport.read(&mut byte) {
                Ok(()) => count += 1,
                Err(EeprogError::Timeout) => return Ok(count),
                Err(e) => return Err(e),
            }
        }
        log::warn!("Input still busy after discarding {} bytes", count);
        Ok(count)
    }

    fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::with_capacity(MAX_LINE_LEN);
        let mut byte = [0u8];

        while buf.len() < MAX_LINE_LEN {
            self.transport.read(&mut byte)?;
            if byte[0] == EOL {
                break;
            }
            buf.push(byte[0]);
        }

        if buf.len() == MAX_LINE_LEN {
            log::debug!("Response truncated at {} bytes", MAX_LINE_LEN);
        }

        let text = String::from_utf8_lossy(&buf);
        Ok(text.trim_end().to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::{ChannelObserver, Event};
    use std::collections::VecDeque;
    use std::sync::mpsc;

    /// Scripted in-memory transport: replays queued input, records output
    ///
    /// `replies` are held back and queued one per command line written,
    /// like a device that only answers once asked.
    pub(crate) struct ScriptTransport {
        pub input: VecDeque<u8>,
        pub replies: VecDeque<Vec<u8>>,
        pub output: Vec<u8>,
        pub timeout: Duration,
        pub timeouts_set: Vec<Duration>,
        pub fail_reads: bool,
    }

    impl ScriptTransport {
        pub fn new(input: &[u8]) -> Self {
            Self {
                input: input.iter().copied().collect(),
                replies: VecDeque::new(),
                output: Vec::new(),
                timeout: Duration::from_millis(2500),
                timeouts_set: Vec::new(),
                fail_reads: false,
            }
        }

        pub fn with_replies(replies: &[&[u8]]) -> Self {
            let mut transport = Self::new(b"");
            transport.replies = replies.iter().map(|r| r.to_vec()).collect();
            transport
        }

        pub fn written(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    impl Transport for ScriptTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.output.extend_from_slice(data);
            for _ in data.iter().filter(|&&b| b == EOL) {
                if let Some(reply) = self.replies.pop_front() {
                    self.input.extend(reply);
                }
            }
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            if self.fail_reads {
                let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
                return Err(err.into());
            }
            for b in buf.iter_mut() {
                *b = self.input.pop_front().ok_or(EeprogError::Timeout)?;
            }
            Ok(())
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.timeout = timeout;
            self.timeouts_set.push(timeout);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_command_round_trip() {
        let mut transport = ScriptTransport::new(b"EEPROG V0.1\r\n");
        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::new(tx);
        let mut framer = Framer::new(&mut transport, &observer);

        let response = framer.send_command("!").unwrap();
        assert_eq!(response, "EEPROG V0.1");
        assert_eq!(transport.written(), "!\n");

        let events: Vec<Event> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                Event::Communication {
                    direction: Direction::Output,
                    line: "!".into()
                },
                Event::Communication {
                    direction: Direction::Input,
                    line: "EEPROG V0.1".into()
                },
            ]
        );
    }

    #[test]
    fn test_send_identified_command() {
        let mut transport = ScriptTransport::new(b"+\n");
        let observer = crate::events::NoEvents;
        let mut framer = Framer::new(&mut transport, &observer);

        assert_eq!(framer.send_identified_command('i', 0xD610).unwrap(), "+");
        assert_eq!(transport.written(), "id610\n");
    }

    #[test]
    fn test_unterminated_line_is_truncated() {
        let input = vec![b'A'; 200];
        let mut transport = ScriptTransport::new(&input);
        let observer = crate::events::NoEvents;
        let mut framer = Framer::new(&mut transport, &observer);

        let response = framer.send_command("r000000").unwrap();
        assert_eq!(response.len(), MAX_LINE_LEN);
        // The rest stays queued for the next read
        assert_eq!(transport.input.len(), 200 - MAX_LINE_LEN);
    }

    #[test]
    fn test_exactly_max_len_without_terminator_returns() {
        let input = vec![b'B'; MAX_LINE_LEN];
        let mut transport = ScriptTransport::new(&input);
        let observer = crate::events::NoEvents;
        let mut framer = Framer::new(&mut transport, &observer);

        // No terminator and nothing after it: must not wait for more input
        assert_eq!(framer.send_command("!").unwrap().len(), MAX_LINE_LEN);
    }

    #[test]
    fn test_missing_response_times_out() {
        let mut transport = ScriptTransport::new(b"+partial");
        let observer = crate::events::NoEvents;
        let mut framer = Framer::new(&mut transport, &observer);

        assert!(matches!(framer.send_command("d"), Err(EeprogError::Timeout)));
    }

    #[test]
    fn test_flush_input_discards_and_restores_timeout() {
        let mut transport = ScriptTransport::new(b"EEPROG V0.1\nboot\n");
        let observer = crate::events::NoEvents;
        let mut framer = Framer::new(&mut transport, &observer);

        let discarded = framer.flush_input(Duration::from_millis(250)).unwrap();
        assert_eq!(discarded, 17);
        assert!(transport.input.is_empty());
        assert_eq!(
            transport.timeouts_set,
            vec![Duration::from_millis(250), Duration::from_millis(2500)]
        );
        assert_eq!(transport.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_flush_input_restores_timeout_on_error() {
        let mut transport = ScriptTransport::new(b"");
        transport.fail_reads = true;
        let observer = crate::events::NoEvents;
        let mut framer = Framer::new(&mut transport, &observer);

        assert!(matches!(
            framer.flush_input(Duration::from_millis(250)),
            Err(EeprogError::Io(_))
        ));
        assert_eq!(transport.timeout, Duration::from_millis(2500));
    }
}
