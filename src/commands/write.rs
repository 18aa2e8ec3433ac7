//! Write command implementation

use super::runner::{self, Transfer};
use super::{load_image, resolve_chip};
use crate::chips::ChipCatalog;
use crate::cli::{ChipArgs, LinkArgs};
use std::path::Path;

/// Run the write command
#[allow(clippy::too_many_arguments)]
pub fn run_write(
    link: &LinkArgs,
    catalog: &ChipCatalog,
    port: &str,
    chip: &ChipArgs,
    input: &Path,
    offset: u32,
    skip: Option<u32>,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (name, geometry) = resolve_chip(catalog, chip)?;
    let data = load_image(input, skip)?;
    if data.is_empty() {
        return Err("Nothing to write".into());
    }

    println!(
        "Writing {} bytes to {} at 0x{:06X} via {}",
        data.len(),
        name,
        offset,
        port
    );

    let len = data.len();
    runner::execute(
        link,
        port,
        &geometry,
        &Transfer::Write {
            offset,
            data,
            verify,
        },
    )?;

    if verify {
        println!("Wrote and verified {} bytes", len);
    } else {
        println!("Wrote {} bytes", len);
    }
    Ok(())
}
