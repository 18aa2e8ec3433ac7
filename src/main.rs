//! eeprog - Serial EEPROM programmer host tool
//!
//! Reads, writes and verifies I2C and SPI EEPROMs through a small
//! microcontroller programmer attached to a serial port.
//!
//! # Architecture
//!
//! - `eeprog-core` holds the chip geometry and the payload codec
//! - `eeprog-serial` speaks the line protocol and sequences operations
//! - `eeprog-dummy` emulates the programmer (`--port dummy`)
//!
//! Transfers run on a worker thread; this binary turns the event stream
//! into progress bars.

mod chips;
mod cli;
mod commands;

use chips::ChipCatalog;
use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    // Load chip catalog
    let catalog = match load_catalog(&cli) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Failed to load chip catalog: {}", e);
            std::process::exit(1);
        }
    };

    log::debug!("Loaded {} chip definitions", catalog.len());

    if let Err(e) = run(cli, &catalog) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_catalog(cli: &Cli) -> Result<ChipCatalog, chips::CatalogError> {
    let mut catalog = ChipCatalog::builtin()?;
    if let Some(path) = &cli.chip_db {
        let count = catalog.load_path(path)?;
        log::info!("Loaded {} chips from {}", count, path.display());
    }
    Ok(catalog)
}

fn run(cli: Cli, catalog: &ChipCatalog) -> Result<(), Box<dyn std::error::Error>> {
    let link = &cli.link;

    match cli.command {
        Commands::Read {
            port,
            chip,
            output,
            offset,
            size,
        } => commands::run_read(link, catalog, &port, &chip, &output, offset, size),
        Commands::Write {
            port,
            chip,
            input,
            offset,
            skip,
            verify,
        } => commands::run_write(link, catalog, &port, &chip, &input, offset, skip, verify),
        Commands::Verify {
            port,
            chip,
            input,
            offset,
            skip,
        } => commands::run_verify(link, catalog, &port, &chip, &input, offset, skip),
        Commands::ListChips => {
            commands::list_chips(catalog);
            Ok(())
        }
        Commands::Info { chip } => {
            let (name, geometry) = commands::resolve_chip(catalog, &chip)?;
            commands::print_chip_info(&name, &geometry);
            Ok(())
        }
    }
}
