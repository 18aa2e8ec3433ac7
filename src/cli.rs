//! CLI argument parsing

use clap::{Args, Parser, Subcommand, ValueEnum};
use eeprog_core::ConnectionType;
use eeprog_serial::protocol::{BAUD_RATE, MAX_RETRIES, READ_TIMEOUT_MS};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "eeprog")]
#[command(author, version, about = "Serial EEPROM programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Extra chip definitions (RON file, or a directory of them)
    #[arg(long, global = true)]
    pub chip_db: Option<PathBuf>,

    #[command(flatten)]
    pub link: LinkArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Serial link tunables shared by every transfer
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial baud rate
    #[arg(long, global = true, default_value_t = BAUD_RATE)]
    pub baud: u32,

    /// Read timeout per byte, in milliseconds
    #[arg(long, global = true, default_value_t = READ_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Extra attempts for a page read with a corrupted payload
    #[arg(long, global = true, default_value_t = MAX_RETRIES)]
    pub retries: u32,
}

/// Bus the chip is attached to
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bus {
    /// SPI bus
    Spi,
    /// I2C bus
    I2c,
}

impl From<Bus> for ConnectionType {
    fn from(bus: Bus) -> Self {
        match bus {
            Bus::Spi => ConnectionType::Spi,
            Bus::I2c => ConnectionType::I2c,
        }
    }
}

/// Chip selection: a catalog name, explicit geometry, or a name with overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ChipArgs {
    /// Chip name (see list-chips)
    #[arg(short, long)]
    pub chip: Option<String>,

    /// Bus the chip is attached to
    #[arg(long, value_enum)]
    pub connection: Option<Bus>,

    /// Page size as a power of two (6 = 64 byte pages)
    #[arg(long)]
    pub page_bits: Option<u8>,

    /// Chip size as a power of two (13 = 8 KiB)
    #[arg(long)]
    pub size_bits: Option<u8>,

    /// Number of address bytes sent to the chip
    #[arg(long)]
    pub address_bytes: Option<u8>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read chip contents to a file
    Read {
        /// Serial port (e.g. /dev/ttyUSB0, COM3), or "dummy" for the emulator
        #[arg(short, long)]
        port: String,

        #[command(flatten)]
        chip: ChipArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// First address to read (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Number of bytes to read (default: up to the end of the chip)
        #[arg(long, value_parser = parse_hex_u32)]
        size: Option<u32>,
    },

    /// Write a file to the chip
    Write {
        /// Serial port (e.g. /dev/ttyUSB0, COM3), or "dummy" for the emulator
        #[arg(short, long)]
        port: String,

        #[command(flatten)]
        chip: ChipArgs,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// First address to write (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Bytes to skip at the start of the file (default: 0x98 for .e2p, else 0)
        #[arg(long, value_parser = parse_hex_u32)]
        skip: Option<u32>,

        /// Verify after writing
        #[arg(long)]
        verify: bool,
    },

    /// Verify chip contents against a file
    Verify {
        /// Serial port (e.g. /dev/ttyUSB0, COM3), or "dummy" for the emulator
        #[arg(short, long)]
        port: String,

        #[command(flatten)]
        chip: ChipArgs,

        /// Input file path to verify against
        #[arg(short, long)]
        input: PathBuf,

        /// First address to compare (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Bytes to skip at the start of the file (default: 0x98 for .e2p, else 0)
        #[arg(long, value_parser = parse_hex_u32)]
        skip: Option<u32>,
    },

    /// List supported chips
    ListChips,

    /// Show chip geometry and its protocol identifier
    Info {
        #[command(flatten)]
        chip: ChipArgs,
    },
}
