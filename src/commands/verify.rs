//! Verify command implementation

use super::runner::{self, Transfer};
use super::{load_image, resolve_chip};
use crate::chips::ChipCatalog;
use crate::cli::{ChipArgs, LinkArgs};
use std::path::Path;

/// Run the verify command
pub fn run_verify(
    link: &LinkArgs,
    catalog: &ChipCatalog,
    port: &str,
    chip: &ChipArgs,
    input: &Path,
    offset: u32,
    skip: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (name, geometry) = resolve_chip(catalog, chip)?;
    let expected = load_image(input, skip)?;

    let remaining = geometry.size().saturating_sub(offset as u64 + expected.len() as u64);
    println!(
        "Verifying {} bytes of {} at 0x{:06X} via {}",
        expected.len(),
        name,
        offset,
        port
    );

    runner::execute(
        link,
        port,
        &geometry,
        &Transfer::Verify {
            offset,
            data: expected,
        },
    )?;

    if remaining > 0 {
        println!("Note: Remaining {} bytes of the chip not verified.", remaining);
    }
    println!("Verification passed!");
    Ok(())
}
