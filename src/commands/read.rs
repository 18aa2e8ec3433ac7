//! Read command implementation

use super::resolve_chip;
use super::runner::{self, Transfer};
use crate::chips::ChipCatalog;
use crate::cli::{ChipArgs, LinkArgs};
use std::path::Path;

/// Run the read command
///
/// Without `size` the read runs from `offset` to the end of the chip.
pub fn run_read(
    link: &LinkArgs,
    catalog: &ChipCatalog,
    port: &str,
    chip: &ChipArgs,
    output: &Path,
    offset: u32,
    size: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (name, geometry) = resolve_chip(catalog, chip)?;
    let size = match size {
        Some(size) => size as usize,
        None => geometry.size().saturating_sub(offset as u64) as usize,
    };

    println!(
        "Reading {} bytes from {} at 0x{:06X} via {}",
        size, name, offset, port
    );

    let transfer = Transfer::Read {
        offset,
        size,
        output: output.to_path_buf(),
    };
    runner::execute(link, port, &geometry, &transfer)?;

    println!("Wrote {} bytes to {:?}", size, output);
    Ok(())
}
