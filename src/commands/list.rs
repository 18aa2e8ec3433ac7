//! List and info commands implementation

use crate::chips::ChipCatalog;
use eeprog_core::ChipGeometry;

/// List all known chips
pub fn list_chips(catalog: &ChipCatalog) {
    println!("Supported chips:");
    println!();
    println!(
        "{:<12} {:<4} {:>10} {:>6} {:>5} {:>6}",
        "Name", "Bus", "Size", "Page", "Addr", "Id"
    );
    println!("{}", "-".repeat(48));

    for chip in catalog.iter() {
        let g = &chip.geometry;
        println!(
            "{:<12} {:<4} {:>10} {:>6} {:>5} {:>6}",
            chip.name,
            g.connection().name(),
            format_size(g.size()),
            g.page_size(),
            g.address_bytes(),
            format!("{:04X}", g.protocol_id())
        );
    }
}

/// Print a chip's geometry and identifier
pub fn print_chip_info(name: &str, geometry: &ChipGeometry) {
    println!("Chip Information");
    println!("================");
    println!();
    println!("Name:            {}", name);
    println!("Bus:             {}", geometry.connection());
    println!(
        "Size:            {} bytes ({})",
        geometry.size(),
        format_size(geometry.size())
    );
    println!("Page size:       {} bytes", geometry.page_size());
    println!("Address bytes:   {}", geometry.address_bytes());
    println!("Identifier:      0x{:04X}", geometry.protocol_id());
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
