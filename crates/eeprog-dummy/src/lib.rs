//! eeprog-dummy - In-memory eeprog programmer emulator
//!
//! This crate emulates the programmer firmware behind the [`Transport`]
//! trait. It's useful for testing and development without real hardware.
//!
//! The emulated chip memory outlives individual links, so a write followed
//! by a read through a fresh connection sees the written data. Faults can
//! be injected to exercise the host's error paths.

use eeprog_core::{codec, ChipGeometry};
use eeprog_serial::protocol::{
    CMD_CONFIGURE, CMD_DONE, CMD_IDENTIFY, CMD_READ, CMD_WRITE, EOL, RESP_FAIL, RESP_OK,
    SIGNATURE, WRITE_CHUNK_SIZE,
};
use eeprog_serial::{Connector, EeprogError, Result, Transport};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Port name that selects the emulator in front ends
pub const DUMMY_PORT: &str = "dummy";

/// Largest data block returned for one read request
///
/// A full response line must fit the host's 128 byte line limit.
pub const READ_BLOCK_SIZE: usize = 32;

/// Configuration for the emulated programmer
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Response to the identify command
    pub signature: String,
    /// Text printed on reset, pending when a link opens
    pub banner: Option<String>,
    /// Value of cells that were never written
    pub erased: u8,
    /// Delay before each response is available
    pub response_delay: Duration,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            signature: SIGNATURE.to_string(),
            banner: Some(SIGNATURE.to_string()),
            erased: 0xFF,
            response_delay: Duration::ZERO,
        }
    }
}

/// Faults to inject
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Refuse to open a link
    pub refuse_open: bool,
    /// Reject the configure command
    pub reject_configure: bool,
    /// Number of upcoming read responses sent with a broken checksum
    pub corrupt_reads: u32,
    /// Reject the write chunk with this index (counted per link, from 0)
    pub fail_write_chunk: Option<usize>,
}

/// Emulated programmer with an attached chip
#[derive(Debug)]
pub struct DummyProgrammer {
    config: DummyConfig,
    faults: Faults,
    memory: Vec<u8>,
    geometry: Option<ChipGeometry>,
    chunks_written: usize,
    commands: Vec<String>,
    links_opened: usize,
    links_closed: usize,
}

impl DummyProgrammer {
    /// Create an emulator with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            faults: Faults::default(),
            memory: Vec::new(),
            geometry: None,
            chunks_written: 0,
            commands: Vec::new(),
            links_opened: 0,
            links_closed: 0,
        }
    }

    /// Create an emulator with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create an emulator whose chip starts with `initial_data` at address 0
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut programmer = Self::new(config);
        programmer.memory = initial_data.to_vec();
        programmer
    }

    /// Change the configuration
    pub fn config_mut(&mut self) -> &mut DummyConfig {
        &mut self.config
    }

    /// Change the injected faults
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Geometry set by the last configure command
    pub fn geometry(&self) -> Option<ChipGeometry> {
        self.geometry
    }

    /// `len` bytes of chip memory starting at `address`
    pub fn contents(&self, address: usize, len: usize) -> Vec<u8> {
        (address..address + len).map(|a| self.cell(a)).collect()
    }

    /// Every command line received so far
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Forget the received commands
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of links opened
    pub fn links_opened(&self) -> usize {
        self.links_opened
    }

    /// Number of links closed
    pub fn links_closed(&self) -> usize {
        self.links_closed
    }

    /// Execute one command line and return the response line
    pub fn handle(&mut self, line: &str) -> String {
        self.commands.push(line.to_string());

        let mut chars = line.chars();
        let cmd = chars.next();
        let args = chars.as_str();

        let result = match cmd {
            Some(CMD_IDENTIFY) => return self.config.signature.clone(),
            Some(CMD_CONFIGURE) => self.configure(args),
            Some(CMD_READ) => self.read(args),
            Some(CMD_WRITE) => self.write(args),
            Some(CMD_DONE) => self.finish(),
            _ => Err("Unknown command".to_string()),
        };

        match result {
            Ok(body) => format!("{}{}", RESP_OK as char, body),
            Err(msg) => {
                log::debug!("dummy: rejecting {:?}: {}", line, msg);
                format!("{}{}", RESP_FAIL as char, msg)
            }
        }
    }

    fn configure(&mut self, args: &str) -> std::result::Result<String, String> {
        if args.len() != 4 {
            return Err("Invalid identifier".into());
        }
        let id = u16::from_str_radix(args, 16).map_err(|_| "Invalid identifier".to_string())?;
        let geometry = ChipGeometry::from_protocol_id(id).map_err(|e| e.to_string())?;

        if self.faults.reject_configure {
            return Err("Unsupported chip".into());
        }

        log::debug!(
            "dummy: configured {} chip, {} bytes, {} byte pages",
            geometry.connection(),
            geometry.size(),
            geometry.page_size()
        );
        self.geometry = Some(geometry);
        Ok(String::new())
    }

    fn read(&mut self, args: &str) -> std::result::Result<String, String> {
        let geometry = self.geometry.ok_or("Chip not configured")?;
        let capacity = capacity(&geometry);
        let address = parse_address(args)? as u64 % capacity;

        let page = geometry.page_size() as u64;
        let page_end = ((address / page + 1) * page).min(capacity);
        let len = (page_end - address).min(READ_BLOCK_SIZE as u64) as usize;

        let mut raw = codec::address_bytes(address as u32).to_vec();
        raw.extend(self.contents(address as usize, len));
        let mut payload = codec::append_checksum(&raw);

        if self.faults.corrupt_reads > 0 {
            self.faults.corrupt_reads -= 1;
            if let Some(last) = payload.last_mut() {
                *last ^= 0x01;
            }
        }

        Ok(codec::bytes_to_hex(&payload))
    }

    fn write(&mut self, args: &str) -> std::result::Result<String, String> {
        let geometry = self.geometry.ok_or("Chip not configured")?;
        let raw = codec::hex_to_bytes(args).map_err(|_| "Invalid data".to_string())?;
        let chunk = codec::parse_page(&raw).map_err(|e| {
            if e.is_checksum() {
                "Bad checksum".to_string()
            } else {
                "Invalid data".to_string()
            }
        })?;

        if chunk.data.len() > WRITE_CHUNK_SIZE {
            return Err("Chunk too long".into());
        }

        let index = self.chunks_written;
        self.chunks_written += 1;
        if self.faults.fail_write_chunk == Some(index) {
            return Err("Write failed".into());
        }

        let capacity = capacity(&geometry);
        for (i, &byte) in chunk.data.iter().enumerate() {
            let address = (chunk.address as u64 + i as u64) % capacity;
            self.set_cell(address as usize, byte);
        }
        Ok(String::new())
    }

    fn finish(&mut self) -> std::result::Result<String, String> {
        log::debug!("dummy: write finished after {} chunks", self.chunks_written);
        Ok(String::new())
    }

    fn cell(&self, address: usize) -> u8 {
        self.memory
            .get(address)
            .copied()
            .unwrap_or(self.config.erased)
    }

    fn set_cell(&mut self, address: usize, value: u8) {
        if address >= self.memory.len() {
            self.memory.resize(address + 1, self.config.erased);
        }
        self.memory[address] = value;
    }

    /// Reset per-link state and return the bytes waiting on a new link
    fn open_link(&mut self) -> Vec<u8> {
        self.links_opened += 1;
        self.chunks_written = 0;
        self.geometry = None;

        match &self.config.banner {
            Some(banner) => {
                let mut bytes = banner.as_bytes().to_vec();
                bytes.extend_from_slice(b"\r\n");
                bytes
            }
            None => Vec::new(),
        }
    }
}

fn capacity(geometry: &ChipGeometry) -> u64 {
    geometry.size().min(codec::MAX_ADDRESS as u64 + 1)
}

fn parse_address(args: &str) -> std::result::Result<u32, String> {
    if args.len() != 6 {
        return Err("Invalid address".into());
    }
    u32::from_str_radix(args, 16).map_err(|_| "Invalid address".to_string())
}

fn lock(device: &Mutex<DummyProgrammer>) -> MutexGuard<'_, DummyProgrammer> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An open link to the emulated programmer
pub struct DummyLink {
    device: Arc<Mutex<DummyProgrammer>>,
    pending: VecDeque<u8>,
    line: Vec<u8>,
    timeout: Duration,
    open: bool,
}

impl Transport for DummyLink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(std::io::Error::from(std::io::ErrorKind::NotConnected).into());
        }

        for &byte in data {
            if byte != EOL {
                self.line.push(byte);
                continue;
            }

            let line = std::mem::take(&mut self.line);
            let text = String::from_utf8_lossy(&line);
            let (response, delay) = {
                let mut device = lock(&self.device);
                let response = device.handle(text.trim_end_matches('\r'));
                (response, device.config.response_delay)
            };

            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            self.pending.extend(response.bytes());
            self.pending.push_back(EOL);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        for b in buf.iter_mut() {
            *b = self.pending.pop_front().ok_or(EeprogError::Timeout)?;
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            lock(&self.device).links_closed += 1;
        }
        Ok(())
    }
}

/// Opens links to a shared emulated programmer
#[derive(Clone)]
pub struct DummyConnector {
    device: Arc<Mutex<DummyProgrammer>>,
}

impl DummyConnector {
    /// Connector for `programmer`
    pub fn new(programmer: DummyProgrammer) -> Self {
        Self {
            device: Arc::new(Mutex::new(programmer)),
        }
    }

    /// Access the emulated programmer
    pub fn programmer(&self) -> MutexGuard<'_, DummyProgrammer> {
        lock(&self.device)
    }
}

impl Default for DummyConnector {
    fn default() -> Self {
        Self::new(DummyProgrammer::new_default())
    }
}

impl Connector for DummyConnector {
    type Transport = DummyLink;

    fn connect(&self, port: &str) -> Result<DummyLink> {
        let mut device = lock(&self.device);
        if device.faults.refuse_open {
            return Err(EeprogError::ConnectionFailed(format!(
                "{}: device refused to open",
                port
            )));
        }

        log::debug!("dummy: link opened on {}", port);
        let banner = device.open_link();
        Ok(DummyLink {
            device: self.device.clone(),
            pending: banner.into(),
            line: Vec::new(),
            timeout: Duration::from_millis(eeprog_serial::protocol::READ_TIMEOUT_MS),
            open: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> DummyProgrammer {
        let mut programmer = DummyProgrammer::new_default();
        assert_eq!(programmer.handle("id610"), "+");
        programmer
    }

    fn decode(response: &str) -> (u32, Vec<u8>) {
        assert!(response.starts_with('+'), "unexpected {}", response);
        let raw = codec::hex_to_bytes(&response[1..]).unwrap();
        let page = codec::parse_page(&raw).unwrap();
        (page.address, page.data.to_vec())
    }

    #[test]
    fn test_identify() {
        let mut programmer = DummyProgrammer::new_default();
        assert_eq!(programmer.handle("!"), "EEPROG V0.1");
    }

    #[test]
    fn test_configure_decodes_identifier() {
        let programmer = configured();
        let geometry = programmer.geometry().unwrap();
        assert_eq!(geometry.page_size(), 64);
        assert_eq!(geometry.size(), 8192);
        assert_eq!(geometry.address_bytes(), 1);
    }

    #[test]
    fn test_configure_rejects_garbage() {
        let mut programmer = DummyProgrammer::new_default();
        assert!(programmer.handle("i12").starts_with('-'));
        assert!(programmer.handle("izzzz").starts_with('-'));
        assert!(programmer.geometry().is_none());
    }

    #[test]
    fn test_read_requires_configure() {
        let mut programmer = DummyProgrammer::new_default();
        assert_eq!(programmer.handle("r000000"), "-Chip not configured");
    }

    #[test]
    fn test_read_stops_at_page_end() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut programmer = DummyProgrammer::with_data(DummyConfig::default(), &data);
        programmer.handle("id610");

        let (address, block) = decode(&programmer.handle("r00003c"));
        assert_eq!(address, 0x3c);
        assert_eq!(block, vec![0x3c, 0x3d, 0x3e, 0x3f]);

        let (address, block) = decode(&programmer.handle("r000040"));
        assert_eq!(address, 0x40);
        assert_eq!(block.len(), READ_BLOCK_SIZE);
        assert_eq!(block[0], 0x40);
    }

    #[test]
    fn test_read_wraps_within_capacity() {
        let mut programmer = configured();
        let (address, block) = decode(&programmer.handle("r002000"));
        assert_eq!(address, 0);
        assert_eq!(block, vec![0xFF; READ_BLOCK_SIZE]);
    }

    #[test]
    fn test_write_stores_chunk() {
        let mut programmer = configured();
        let line = format!("w{}", codec::encode_data_line(&[1, 2, 3], 0x100, 0, 3));
        assert_eq!(programmer.handle(&line), "+");
        assert_eq!(programmer.handle("d"), "+");
        assert_eq!(programmer.contents(0xFF, 5), vec![0xFF, 1, 2, 3, 0xFF]);
    }

    #[test]
    fn test_write_checks_checksum() {
        let mut programmer = configured();
        assert_eq!(programmer.handle("w0001000102030000"), "-Bad checksum");
        assert_eq!(programmer.handle("w00010001020"), "-Invalid data");
        assert_eq!(programmer.contents(0x100, 3), vec![0xFF; 3]);
    }

    #[test]
    fn test_corrupt_reads_fault() {
        let mut programmer = configured();
        programmer.faults_mut().corrupt_reads = 1;

        let response = programmer.handle("r000000");
        let raw = codec::hex_to_bytes(&response[1..]).unwrap();
        assert!(codec::parse_page(&raw).unwrap_err().is_checksum());

        decode(&programmer.handle("r000000"));
    }

    #[test]
    fn test_fail_write_chunk_fault() {
        let mut programmer = configured();
        programmer.faults_mut().fail_write_chunk = Some(1);

        let first = format!("w{}", codec::encode_data_line(&[1], 0, 0, 1));
        let second = format!("w{}", codec::encode_data_line(&[2], 1, 0, 1));
        assert_eq!(programmer.handle(&first), "+");
        assert_eq!(programmer.handle(&second), "-Write failed");
        assert_eq!(programmer.contents(0, 2), vec![1, 0xFF]);
    }

    #[test]
    fn test_link_round_trip() {
        let connector = DummyConnector::default();
        let mut link = connector.connect(DUMMY_PORT).unwrap();

        // Banner is waiting before anything was sent
        let mut banner = [0u8; 13];
        link.read(&mut banner).unwrap();
        assert_eq!(&banner, b"EEPROG V0.1\r\n");

        link.write(b"!\n").unwrap();
        let mut reply = [0u8; 12];
        link.read(&mut reply).unwrap();
        assert_eq!(&reply, b"EEPROG V0.1\n");
        assert!(matches!(link.read(&mut reply), Err(EeprogError::Timeout)));

        link.close().unwrap();
        link.close().unwrap();
        assert!(link.write(b"!\n").is_err());

        let programmer = connector.programmer();
        assert_eq!(programmer.links_opened(), 1);
        assert_eq!(programmer.links_closed(), 1);
        assert_eq!(programmer.commands(), &["!".to_string()]);
    }

    #[test]
    fn test_refuse_open() {
        let connector = DummyConnector::default();
        connector.programmer().faults_mut().refuse_open = true;
        assert!(matches!(
            connector.connect(DUMMY_PORT),
            Err(EeprogError::ConnectionFailed(_))
        ));
    }
}
