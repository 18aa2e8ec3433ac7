//! Chip catalog
//!
//! Chips are described in RON files. The built-in catalog is compiled in
//! from `chips/eeprom.ron`; `--chip-db` adds entries from further files,
//! replacing built-in chips of the same name.

use eeprog_core::{ChipGeometry, ConnectionType};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;

const BUILTIN_RON: &str = include_str!("../chips/eeprom.ron");

/// Error type for catalog loading
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Entry with an impossible geometry
    #[error("Invalid chip {name}: {source}")]
    Invalid {
        name: String,
        source: eeprog_core::Error,
    },
}

#[derive(Debug, Deserialize)]
struct CatalogDef {
    chips: Vec<ChipDef>,
}

#[derive(Debug, Deserialize)]
struct ChipDef {
    name: String,
    connection: ConnectionType,
    page_bits: u8,
    size_bits: u8,
    address_bytes: u8,
}

/// A named chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipEntry {
    pub name: String,
    pub geometry: ChipGeometry,
}

/// Known chips, looked up by case-insensitive name
#[derive(Debug, Clone, Default)]
pub struct ChipCatalog {
    chips: Vec<ChipEntry>,
}

impl ChipCatalog {
    /// Catalog with the built-in chips
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        catalog.load_ron(BUILTIN_RON)?;
        Ok(catalog)
    }

    /// Load chip definitions from a RON string
    ///
    /// The whole string is validated before anything is added.
    pub fn load_ron(&mut self, content: &str) -> Result<usize, CatalogError> {
        let def: CatalogDef = ron::from_str(content)?;

        let entries = def
            .chips
            .into_iter()
            .map(|chip| {
                ChipGeometry::new(
                    chip.connection,
                    chip.page_bits,
                    chip.size_bits,
                    chip.address_bytes,
                )
                .map(|geometry| ChipEntry {
                    name: chip.name.clone(),
                    geometry,
                })
                .map_err(|source| CatalogError::Invalid {
                    name: chip.name,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let count = entries.len();
        for entry in entries {
            self.insert(entry);
        }
        Ok(count)
    }

    /// Load chip definitions from a single RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, CatalogError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load every `.ron` file in a directory
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, CatalogError> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "ron"))
            .collect();
        paths.sort();

        let mut total = 0;
        for path in paths {
            let count = self.load_file(&path)?;
            log::debug!("Loaded {} chips from {}", count, path.display());
            total += count;
        }
        Ok(total)
    }

    /// Load a file or a directory of files
    pub fn load_path(&mut self, path: &Path) -> Result<usize, CatalogError> {
        if path.is_dir() {
            self.load_dir(path)
        } else {
            self.load_file(path)
        }
    }

    /// Find a chip by name, ignoring case
    pub fn find(&self, name: &str) -> Option<&ChipEntry> {
        self.chips
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// All chips in load order
    pub fn iter(&self) -> impl Iterator<Item = &ChipEntry> {
        self.chips.iter()
    }

    /// Number of chips
    pub fn len(&self) -> usize {
        self.chips.len()
    }

    fn insert(&mut self, entry: ChipEntry) {
        match self
            .chips
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&entry.name))
        {
            Some(existing) => {
                log::debug!("Replacing chip definition {}", existing.name);
                *existing = entry;
            }
            None => self.chips.push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = ChipCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 5);

        let chip = catalog.find("24c64").unwrap();
        assert_eq!(chip.name, "24C64");
        assert_eq!(chip.geometry.protocol_id(), 0xD610);

        let spi = catalog.find("25AA1024").unwrap();
        assert_eq!(spi.geometry.connection(), ConnectionType::Spi);
        assert_eq!(spi.geometry.page_size(), 256);
        assert_eq!(spi.geometry.size(), 128 * 1024);
        assert_eq!(spi.geometry.address_bytes(), 3);

        assert!(catalog.find("24C65").is_none());
    }

    #[test]
    fn test_load_extra_and_replace() {
        let mut catalog = ChipCatalog::builtin().unwrap();
        let count = catalog
            .load_ron(
                r#"(chips: [
                    (name: "24C256", connection: I2C, page_bits: 6, size_bits: 15, address_bytes: 2),
                    (name: "24c16", connection: I2C, page_bits: 4, size_bits: 11, address_bytes: 2),
                ])"#,
            )
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(catalog.len(), 6);
        assert_eq!(catalog.find("24C256").unwrap().geometry.size(), 32768);
        assert_eq!(catalog.find("24C16").unwrap().geometry.address_bytes(), 2);
    }

    #[test]
    fn test_invalid_entry_rejects_whole_file() {
        let mut catalog = ChipCatalog::default();
        let err = catalog
            .load_ron(
                r#"(chips: [
                    (name: "OK", connection: SPI, page_bits: 5, size_bits: 13, address_bytes: 2),
                    (name: "BAD", connection: SPI, page_bits: 9, size_bits: 13, address_bytes: 2),
                ])"#,
            )
            .unwrap_err();

        assert!(matches!(err, CatalogError::Invalid { ref name, .. } if name == "BAD"));
        assert_eq!(catalog.len(), 0);
    }

    #[test]
    fn test_parse_error() {
        let mut catalog = ChipCatalog::default();
        assert!(matches!(
            catalog.load_ron("(chips: [(name: \"X\")])"),
            Err(CatalogError::Parse(_))
        ));
    }
}
