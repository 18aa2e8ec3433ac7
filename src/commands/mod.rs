//! CLI command implementations
//!
//! Transfer commands (read, write, verify) resolve the chip geometry and
//! load their input on the main thread, then run the transfer on a worker
//! thread while the main thread draws progress.

mod list;
mod progress;
mod read;
mod runner;
mod verify;
mod write;

pub use list::{list_chips, print_chip_info};
pub use read::run_read;
pub use verify::run_verify;
pub use write::run_write;

use crate::chips::ChipCatalog;
use crate::cli::ChipArgs;
use eeprog_core::{ChipGeometry, ConnectionType};
use std::fs;
use std::path::Path;

/// Header length of `.e2p` image files
pub const E2P_HEADER_LEN: u32 = 0x98;

/// Work out the geometry from `--chip` and the explicit geometry flags
///
/// Explicit flags override the catalog entry. Without `--chip` all four
/// flags are required.
pub fn resolve_chip(
    catalog: &ChipCatalog,
    args: &ChipArgs,
) -> Result<(String, ChipGeometry), Box<dyn std::error::Error>> {
    let (name, base) = match &args.chip {
        Some(name) => {
            let entry = catalog
                .find(name)
                .ok_or_else(|| format!("Unknown chip: {} (see list-chips)", name))?;
            (entry.name.clone(), Some(entry.geometry))
        }
        None => ("custom chip".to_string(), None),
    };

    let connection = args
        .connection
        .map(ConnectionType::from)
        .or(base.map(|g| g.connection()));
    let page_bits = args.page_bits.or(base.map(|g| g.page_bits()));
    let size_bits = args.size_bits.or(base.map(|g| g.size_bits()));
    let address_bytes = args.address_bytes.or(base.map(|g| g.address_bytes()));

    match (connection, page_bits, size_bits, address_bytes) {
        (Some(connection), Some(page_bits), Some(size_bits), Some(address_bytes)) => {
            let geometry = ChipGeometry::new(connection, page_bits, size_bits, address_bytes)?;
            Ok((name, geometry))
        }
        _ => Err(
            "Specify --chip, or all of --connection, --page-bits, --size-bits and --address-bytes"
                .into(),
        ),
    }
}

/// Bytes to skip when the user gave no `--skip`
fn default_skip(path: &Path) -> u32 {
    let is_e2p = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("e2p"));
    if is_e2p {
        E2P_HEADER_LEN
    } else {
        0
    }
}

/// Read an image file without its header
fn load_image(path: &Path, skip: Option<u32>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut data = fs::read(path)?;
    println!("Read {} bytes from {:?}", data.len(), path);

    let skip = skip.unwrap_or_else(|| default_skip(path)) as usize;
    if skip > data.len() {
        return Err(format!(
            "Cannot skip {} bytes of a {} byte file",
            skip,
            data.len()
        )
        .into());
    }
    if skip > 0 {
        log::info!("Skipping {} header bytes", skip);
        data.drain(..skip);
    }

    Ok(data)
}
