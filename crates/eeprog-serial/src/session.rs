//! Protocol session: handshake and paged transfers
//!
//! A session runs over an already open transport. The expected order is
//! [`Session::flush_input`], [`Session::handshake`], [`Session::configure`]
//! and then one transfer. Transfers check the cancellation token before
//! every page and never interrupt a page in flight.

use crate::cancel::CancelToken;
use crate::error::{EeprogError, Result};
use crate::events::{Observer, ProgressState};
use crate::framer::Framer;
use crate::protocol::*;
use crate::transport::Transport;

use eeprog_core::codec;
use eeprog_core::ChipGeometry;
use std::time::Duration;

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Read timeout while draining stale input
    pub flush_timeout: Duration,
    /// Extra attempts for a page whose payload is corrupted
    pub read_retries: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            flush_timeout: Duration::from_millis(FLUSH_TIMEOUT_MS),
            read_retries: MAX_RETRIES,
        }
    }
}

/// Check that `len` bytes starting at `offset` fit the wire address space
/// and the chip
pub fn check_range(geometry: &ChipGeometry, offset: u32, len: usize) -> Result<()> {
    let end = offset as u64 + len as u64;
    if end > codec::MAX_ADDRESS as u64 + 1 {
        return Err(EeprogError::InvalidParameter(format!(
            "range 0x{:X}+{} exceeds the 24-bit address space",
            offset, len
        )));
    }
    if end > geometry.size() {
        return Err(EeprogError::InvalidParameter(format!(
            "range 0x{:X}+{} exceeds chip size {}",
            offset,
            len,
            geometry.size()
        )));
    }
    Ok(())
}

/// An open conversation with the programmer
pub struct Session<'a, T: Transport + ?Sized, O: Observer + ?Sized> {
    framer: Framer<'a, T, O>,
    observer: &'a O,
    cancel: &'a CancelToken,
    options: SessionOptions,
}

impl<'a, T: Transport + ?Sized, O: Observer + ?Sized> Session<'a, T, O> {
    /// Start a session over an open transport
    pub fn new(
        transport: &'a mut T,
        observer: &'a O,
        cancel: &'a CancelToken,
        options: SessionOptions,
    ) -> Self {
        Self {
            framer: Framer::new(transport, observer),
            observer,
            cancel,
            options,
        }
    }

    /// Drain anything the programmer sent before we started talking
    pub fn flush_input(&mut self) -> Result<usize> {
        self.framer.flush_input(self.options.flush_timeout)
    }

    /// Check that the other end is an eeprog programmer
    pub fn handshake(&mut self) -> Result<()> {
        let response = self.framer.send_command(&CMD_IDENTIFY.to_string())?;
        if response != SIGNATURE {
            log::debug!("Unexpected identify response: {:?}", response);
            return Err(EeprogError::InvalidSignature(response));
        }

        log::info!("Programmer identified: {}", response);
        Ok(())
    }

    /// Tell the programmer which chip is attached
    pub fn configure(&mut self, geometry: &ChipGeometry) -> Result<Response> {
        let id = geometry.protocol_id();
        log::debug!(
            "Configuring {} chip: {} byte pages, {} bytes, {} address bytes (id {:04x})",
            geometry.connection(),
            geometry.page_size(),
            geometry.size(),
            geometry.address_bytes(),
            id
        );

        let line = self.framer.send_identified_command(CMD_CONFIGURE, id)?;
        parse_response(&line)
    }

    /// Read `buf.len()` bytes starting at `offset`
    ///
    /// The programmer decides how many bytes each page holds; only what
    /// is still needed is copied.
    pub fn read_pages(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        let target = len as u64 + 1;
        self.observer
            .on_progress(ProgressState::Read, 0, target, Some("Reading data."));

        self.fetch_pages(offset, len, ProgressState::Read, |at, chunk| {
            buf[at..at + chunk.len()].copy_from_slice(chunk);
            Ok(())
        })
    }

    /// Read back `expected.len()` bytes starting at `offset` and compare
    pub fn verify_pages(&mut self, offset: u32, expected: &[u8]) -> Result<()> {
        let target = expected.len() as u64 + 1;
        self.observer
            .on_progress(ProgressState::Verify, 0, target, Some("Verifying data."));

        self.fetch_pages(offset, expected.len(), ProgressState::Verify, |at, chunk| {
            let wanted = &expected[at..at + chunk.len()];
            match wanted.iter().zip(chunk).position(|(a, b)| a != b) {
                None => Ok(()),
                Some(i) => Err(EeprogError::VerifyMismatch {
                    address: offset + (at + i) as u32,
                    expected: wanted[i],
                    found: chunk[i],
                }),
            }
        })?;

        self.observer
            .on_progress(ProgressState::Verify, target, target, Some("Verify complete."));
        Ok(())
    }

    /// Write `data` starting at `offset`, then finalize
    ///
    /// Data goes out in chunks of at most [`WRITE_CHUNK_SIZE`] bytes. A
    /// rejected chunk aborts the transfer without sending the finalize
    /// command.
    pub fn write_pages(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let target = data.len() as u64 + 1;
        self.observer
            .on_progress(ProgressState::Write, 0, target, Some("Writing data."));

        let mut written = 0usize;
        let mut address = offset;
        while written < data.len() {
            self.cancel.check()?;

            let chunk = WRITE_CHUNK_SIZE.min(data.len() - written);
            let line = format!(
                "{}{}",
                CMD_WRITE,
                codec::encode_data_line(data, address, written, chunk)
            );
            self.command(&line)?;

            written += chunk;
            address += chunk as u32;
            self.observer
                .on_progress(ProgressState::Write, written as u64, target, None);
        }

        self.command(&CMD_DONE.to_string())?;
        log::debug!("Wrote {} bytes at 0x{:06x}", data.len(), offset);

        self.observer
            .on_progress(ProgressState::Write, target, target, Some("Write complete."));
        Ok(())
    }

    /// Request pages until `len` bytes were handed to `consume`
    ///
    /// `consume` gets the offset into the transfer and the newly received
    /// bytes, already trimmed to what is still needed.
    fn fetch_pages<F>(
        &mut self,
        offset: u32,
        len: usize,
        state: ProgressState,
        mut consume: F,
    ) -> Result<()>
    where
        F: FnMut(usize, &[u8]) -> Result<()>,
    {
        let target = len as u64 + 1;
        let mut received = 0usize;
        let mut address = offset;

        while received < len {
            self.cancel.check()?;

            let page = self.read_page(address, received as u64, target)?;
            if page.is_empty() {
                return Err(EeprogError::MissingData);
            }

            let take = page.len().min(len - received);
            consume(received, &page[..take])?;

            received += take;
            address += take as u32;
            self.observer
                .on_progress(state, received as u64, target, None);
        }

        Ok(())
    }

    /// Read one page, retrying corrupted payloads
    fn read_page(&mut self, address: u32, position: u64, target: u64) -> Result<Vec<u8>> {
        let cmd = address_command(CMD_READ, address);
        let mut attempt = 0;

        loop {
            match self.fetch_page(&cmd, address) {
                Err(e) if e.is_payload() && attempt < self.options.read_retries => {
                    attempt += 1;
                    let msg = format!(
                        "Page 0x{:06x}: {} (retry {}/{})",
                        address, e, attempt, self.options.read_retries
                    );
                    log::warn!("{}", msg);
                    self.observer
                        .on_progress(ProgressState::Error, position, target, Some(&msg));
                    // A truncated line leaves its tail queued behind it
                    self.framer.flush_input(self.options.flush_timeout)?;
                }
                result => return result,
            }
        }
    }

    fn fetch_page(&mut self, cmd: &str, address: u32) -> Result<Vec<u8>> {
        let response = self.command(cmd)?;
        let raw = codec::hex_to_bytes(&response.message)?;
        let page = codec::parse_page(&raw)?;

        if page.address != address & codec::MAX_ADDRESS {
            log::warn!(
                "Requested page 0x{:06x}, programmer answered 0x{:06x}",
                address,
                page.address
            );
        }

        Ok(page.data.to_vec())
    }

    fn command(&mut self, cmd: &str) -> Result<Response> {
        let line = self.framer.send_command(cmd)?;
        parse_response(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelObserver, Event, NoEvents};
    use crate::framer::tests::ScriptTransport;
    use eeprog_core::ConnectionType;
    use std::sync::mpsc;

    fn chip() -> ChipGeometry {
        ChipGeometry::new(ConnectionType::I2c, 6, 13, 1).unwrap()
    }

    /// Build a `+` read response for `data` at `address`
    fn page_line(address: u32, data: &[u8]) -> String {
        let mut raw = codec::address_bytes(address).to_vec();
        raw.extend_from_slice(data);
        format!("+{}\n", codec::bytes_to_hex(&codec::append_checksum(&raw)))
    }

    fn session<'a, O: Observer>(
        transport: &'a mut ScriptTransport,
        observer: &'a O,
        cancel: &'a CancelToken,
    ) -> Session<'a, ScriptTransport, O> {
        Session::new(transport, observer, cancel, SessionOptions::default())
    }

    fn commands(transport: &ScriptTransport) -> Vec<String> {
        transport.written().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_handshake_accepts_signature() {
        let mut transport = ScriptTransport::new(b"EEPROG V0.1\n");
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);
        session.handshake().unwrap();
        assert_eq!(transport.written(), "!\n");
    }

    #[test]
    fn test_handshake_rejects_other_response() {
        let mut transport = ScriptTransport::new(b"EEPROG V0.2\n");
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);
        let err = session.handshake().unwrap_err();
        assert!(matches!(err, EeprogError::InvalidSignature(ref s) if s == "EEPROG V0.2"));
        assert_eq!(err.to_string(), "Invalid response from programmer");
    }

    #[test]
    fn test_configure_sends_identifier() {
        let mut transport = ScriptTransport::new(b"+\n");
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);
        session.configure(&chip()).unwrap();
        assert_eq!(transport.written(), "id610\n");
    }

    #[test]
    fn test_configure_rejected() {
        let mut transport = ScriptTransport::new(b"-Unsupported chip\n");
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);
        assert!(matches!(
            session.configure(&chip()),
            Err(EeprogError::Rejected(ref m)) if m == "Unsupported chip"
        ));
    }

    #[test]
    fn test_read_pages_assembles_in_order() {
        let image: Vec<u8> = (0..20u8).collect();
        let mut input = String::new();
        // 8 byte pages, last one longer than needed
        input.push_str(&page_line(0, &image[0..8]));
        input.push_str(&page_line(8, &image[8..16]));
        input.push_str(&page_line(16, &[16, 17, 18, 19, 0xEE, 0xEE, 0xEE, 0xEE]));

        let mut transport = ScriptTransport::new(input.as_bytes());
        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::new(tx);
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &observer, &cancel);

        let mut buf = vec![0u8; 20];
        session.read_pages(0, &mut buf).unwrap();
        assert_eq!(buf, image);
        assert_eq!(commands(&transport), vec!["r000000", "r000008", "r000010"]);

        let positions: Vec<(u64, u64)> = rx
            .try_iter()
            .filter_map(|e| match e {
                Event::Progress {
                    state: ProgressState::Read,
                    position,
                    target,
                    ..
                } => Some((position, target)),
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![(0, 21), (8, 21), (16, 21), (20, 21)]);
    }

    #[test]
    fn test_read_pages_adapts_to_page_size() {
        let mut input = String::new();
        input.push_str(&page_line(0x100, &[0xAA]));
        input.push_str(&page_line(0x101, &[0xBB, 0xCC]));

        let mut transport = ScriptTransport::new(input.as_bytes());
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);

        let mut buf = vec![0u8; 3];
        session.read_pages(0x100, &mut buf).unwrap();
        assert_eq!(buf, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(commands(&transport), vec!["r000100", "r000101"]);
    }

    #[test]
    fn test_read_pages_empty_page_fails() {
        let input = page_line(0, &[]);
        let mut transport = ScriptTransport::new(input.as_bytes());
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);

        let mut buf = vec![0u8; 4];
        assert!(matches!(
            session.read_pages(0, &mut buf),
            Err(EeprogError::MissingData)
        ));
    }

    #[test]
    fn test_read_retries_corrupted_page() {
        let good = page_line(0, &[1, 2, 3, 4]);
        // Same line with the last checksum digit changed
        let mut bad = good.trim_end().to_string();
        let last = bad.pop().unwrap();
        bad.push(if last == '0' { '1' } else { '0' });
        bad.push('\n');

        let mut transport = ScriptTransport::with_replies(&[bad.as_bytes(), good.as_bytes()]);
        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::new(tx);
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &observer, &cancel);

        let mut buf = vec![0u8; 4];
        session.read_pages(0, &mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4]);
        assert_eq!(commands(&transport), vec!["r000000", "r000000"]);

        let errors = rx
            .try_iter()
            .filter(|e| matches!(e, Event::Progress { state: ProgressState::Error, .. }))
            .count();
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_read_retry_discards_overlong_line() {
        // 64 data bytes do not fit a 128 byte line; the tail stays queued
        let long = page_line(0, &[0x11; 64]);
        assert!(long.len() > MAX_LINE_LEN);
        let good = page_line(0, &[0x22; 4]);
        let mut transport = ScriptTransport::with_replies(&[long.as_bytes(), good.as_bytes()]);
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);

        let mut buf = vec![0u8; 4];
        session.read_pages(0, &mut buf).unwrap();
        assert_eq!(buf, vec![0x22; 4]);
        assert_eq!(commands(&transport), vec!["r000000", "r000000"]);
        assert!(transport.input.is_empty());
    }

    #[test]
    fn test_read_gives_up_after_retries() {
        let mut transport = ScriptTransport::with_replies(&[&b"+0000\n"[..]; 3]);
        let cancel = CancelToken::new();
        let options = SessionOptions {
            read_retries: 2,
            ..SessionOptions::default()
        };
        let mut session = Session::new(&mut transport, &NoEvents, &cancel, options);

        let mut buf = vec![0u8; 4];
        let err = session.read_pages(0, &mut buf).unwrap_err();
        assert!(err.is_payload());
        assert_eq!(commands(&transport).len(), 3);
    }

    #[test]
    fn test_read_rejection_is_not_retried() {
        let mut transport = ScriptTransport::new(b"-Bus error\n");
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);

        let mut buf = vec![0u8; 4];
        assert!(matches!(
            session.read_pages(0, &mut buf),
            Err(EeprogError::Rejected(ref m)) if m == "Bus error"
        ));
        assert_eq!(commands(&transport).len(), 1);
    }

    #[test]
    fn test_read_checks_cancel_before_each_page() {
        let input = page_line(0, &[1, 2]);
        let mut transport = ScriptTransport::new(input.as_bytes());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut session = session(&mut transport, &NoEvents, &cancel);

        let mut buf = vec![0u8; 2];
        assert!(matches!(
            session.read_pages(0, &mut buf),
            Err(EeprogError::Cancelled)
        ));
        assert!(transport.output.is_empty());
    }

    #[test]
    fn test_write_pages_chunks_and_finalizes() {
        let data: Vec<u8> = (0..40u8).collect();
        let mut transport = ScriptTransport::new(b"+\n+\n+\n");
        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::new(tx);
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &observer, &cancel);

        session.write_pages(0, &data).unwrap();

        let sent = commands(&transport);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], format!("w{}", codec::encode_data_line(&data, 0, 0, 32)));
        assert_eq!(sent[1], format!("w{}", codec::encode_data_line(&data, 32, 32, 8)));
        assert!(sent[1].starts_with("w000020"));
        // address + 8 data bytes + checksum
        assert_eq!(sent[1].len(), 1 + 6 + 16 + 4);
        assert_eq!(sent[2], "d");

        let positions: Vec<u64> = rx
            .try_iter()
            .filter_map(|e| match e {
                Event::Progress { position, .. } => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![0, 32, 40, 41]);
    }

    #[test]
    fn test_write_failure_skips_finalize() {
        let data = vec![0x55u8; 40];
        let mut transport = ScriptTransport::new(b"+\n-Write failed\n");
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);

        let err = session.write_pages(0, &data).unwrap_err();
        assert!(matches!(err, EeprogError::Rejected(ref m) if m == "Write failed"));

        let sent = commands(&transport);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|c| c.starts_with('w')));
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let input = page_line(0x10, &[1, 2, 3, 9]);
        let mut transport = ScriptTransport::new(input.as_bytes());
        let cancel = CancelToken::new();
        let mut session = session(&mut transport, &NoEvents, &cancel);

        let err = session.verify_pages(0x10, &[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(
            err,
            EeprogError::VerifyMismatch {
                address: 0x13,
                expected: 4,
                found: 9
            }
        ));
    }

    #[test]
    fn test_check_range() {
        let chip = chip();
        assert!(check_range(&chip, 0, 8192).is_ok());
        assert!(check_range(&chip, 1, 8192).is_err());

        let big = ChipGeometry::new(ConnectionType::Spi, 8, 32, 4).unwrap();
        assert!(check_range(&big, 0xFF_FF00, 0x100).is_ok());
        assert!(check_range(&big, 0xFF_FF00, 0x101).is_err());
    }
}
