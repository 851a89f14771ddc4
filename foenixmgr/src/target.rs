//! Supported CPUs and machines
//!
//! The Foenix family spans both the 65xx and the 680x0 lines. The [Cpu] decides
//! how memory is written (32-bit parts need aligned bus transactions) and how
//! reset vectors are set up, while the [Machine] decides whether flash can be
//! programmed one sector at a time.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::Error;

/// Default size of a single write-block during uploads
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
/// Default size of the whole flash image
pub const DEFAULT_FLASH_SIZE: usize = 512 * 1024;

/// All supported CPUs
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    VariantNames,
    Serialize,
)]
#[non_exhaustive]
#[strum(ascii_case_insensitive)]
pub enum Cpu {
    /// WDC 65C02 (F256jr, F256k)
    #[default]
    #[strum(serialize = "65c02")]
    #[serde(rename = "65c02")]
    #[cfg_attr(feature = "cli", value(name = "65c02"))]
    W65c02,
    /// WDC 65816 (C256 family)
    #[strum(serialize = "65816")]
    #[serde(rename = "65816")]
    #[cfg_attr(feature = "cli", value(name = "65816"))]
    W65816,
    /// Motorola 68000 (A2560U, A2560K)
    #[strum(to_string = "68000", serialize = "m68k")]
    #[serde(rename = "68000")]
    #[cfg_attr(feature = "cli", value(name = "68000", alias = "m68k"))]
    M68000,
    /// Motorola 68040 (A2560X/GenX)
    #[strum(serialize = "68040")]
    #[serde(rename = "68040")]
    #[cfg_attr(feature = "cli", value(name = "68040"))]
    M68040,
    /// Motorola 68060
    #[strum(serialize = "68060")]
    #[serde(rename = "68060")]
    #[cfg_attr(feature = "cli", value(name = "68060"))]
    M68060,
}

impl Cpu {
    /// The family this CPU belongs to
    pub const fn family(self) -> CpuFamily {
        match self {
            Cpu::W65c02 => CpuFamily::W65c02,
            Cpu::W65816 => CpuFamily::W65816,
            Cpu::M68000 | Cpu::M68040 | Cpu::M68060 => CpuFamily::M680x0,
        }
    }

    /// Whether every bus transaction must be 4-byte aligned
    pub const fn requires_alignment(self) -> bool {
        matches!(self, Cpu::M68040 | Cpu::M68060)
    }

    /// Parse a CPU name as written in configuration files
    pub fn parse(name: &str) -> Result<Self, Error> {
        Cpu::from_str(name.trim()).map_err(|_| Error::UnsupportedCpu(name.to_string()))
    }
}

impl<'de> Deserialize<'de> for Cpu {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Cpu::parse(&name).map_err(serde::de::Error::custom)
    }
}

/// CPU families, as identified in PGX headers and used to select a reset
/// vector strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[non_exhaustive]
pub enum CpuFamily {
    #[strum(serialize = "65816")]
    W65816,
    #[strum(serialize = "680x0")]
    M680x0,
    #[strum(serialize = "65C02")]
    W65c02,
}

impl CpuFamily {
    /// Decode the CPU nibble of a PGX header
    pub fn from_pgx_id(id: u8) -> Result<Self, Error> {
        match id {
            0x01 => Ok(CpuFamily::W65816),
            0x02 => Ok(CpuFamily::M680x0),
            0x03 => Ok(CpuFamily::W65c02),
            _ => Err(Error::UnknownPgxCpu(id)),
        }
    }

    /// The CPU nibble written in PGX headers for this family
    pub const fn pgx_id(self) -> u8 {
        match self {
            CpuFamily::W65816 => 0x01,
            CpuFamily::M680x0 => 0x02,
            CpuFamily::W65c02 => 0x03,
        }
    }
}

/// Known target machines
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, VariantNames, Serialize,
)]
#[non_exhaustive]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Machine {
    /// F256 Jr.
    F256jr,
    /// F256K
    F256k,
    /// FNX1591 flash cartridge
    Fnx1591,
    /// C256 Foenix (FMX, U, U+)
    C256,
    /// A2560 (U, K, X, GenX)
    A2560,
}

impl Machine {
    /// Flash geometry of sector-capable machines
    pub fn flash_geometry(self) -> Option<FlashGeometry> {
        match self {
            Machine::F256jr | Machine::F256k => Some(FlashGeometry {
                page_size: 8,
                sector_size: 8,
                ram_size: 8,
            }),
            Machine::Fnx1591 => Some(FlashGeometry {
                page_size: 8,
                sector_size: 32,
                ram_size: 8,
            }),
            Machine::C256 | Machine::A2560 => None,
        }
    }

    /// Parse a machine name as written in configuration files
    pub fn parse(name: &str) -> Result<Self, Error> {
        Machine::from_str(name.trim()).map_err(|_| Error::UnknownMachine(name.to_string()))
    }
}

impl<'de> Deserialize<'de> for Machine {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Machine::parse(&name).map_err(serde::de::Error::custom)
    }
}

/// Flash layout of a sector-capable machine, all sizes in KB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FlashGeometryFields")]
pub struct FlashGeometry {
    page_size: u32,
    sector_size: u32,
    ram_size: u32,
}

#[derive(Deserialize)]
struct FlashGeometryFields {
    page_size: u32,
    sector_size: u32,
    ram_size: u32,
}

impl TryFrom<FlashGeometryFields> for FlashGeometry {
    type Error = Error;

    fn try_from(fields: FlashGeometryFields) -> Result<Self, Self::Error> {
        FlashGeometry::new(fields.page_size, fields.sector_size, fields.ram_size)
    }
}

impl FlashGeometry {
    /// Create a new geometry, checking that a sector holds a whole number of
    /// pages
    pub fn new(page_size: u32, sector_size: u32, ram_size: u32) -> Result<Self, Error> {
        if page_size == 0 || sector_size == 0 || ram_size == 0 || sector_size % page_size != 0 {
            return Err(Error::InvalidFlashGeometry {
                page_size,
                sector_size,
            });
        }

        Ok(Self {
            page_size,
            sector_size,
            ram_size,
        })
    }

    /// Page size in KB
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Sector size in KB
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Size of the RAM staging buffer in KB
    pub fn ram_size(&self) -> u32 {
        self.ram_size
    }

    /// Size of a sector in bytes
    pub fn sector_bytes(&self) -> usize {
        self.sector_size as usize * 1024
    }

    /// Size of the RAM staging buffer in bytes
    pub fn ram_bytes(&self) -> usize {
        self.ram_size as usize * 1024
    }

    pub fn pages_per_sector(&self) -> u32 {
        self.sector_size / self.page_size
    }

    /// Index of the first page belonging to `sector`
    pub fn start_page(&self, sector: u32) -> u32 {
        sector.saturating_mul(self.pages_per_sector())
    }
}

/// Immutable description of the connected hardware, handed to every component
/// that needs to know about the CPU or the flash layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfig {
    pub cpu: Cpu,
    chunk_size: usize,
    pub flash_size: usize,
    pub geometry: Option<FlashGeometry>,
}

impl TargetConfig {
    pub fn new(cpu: Cpu) -> Self {
        Self {
            cpu,
            ..Self::default()
        }
    }

    pub fn with_machine(mut self, machine: Option<Machine>) -> Self {
        self.geometry = machine.and_then(Machine::flash_geometry);
        self
    }

    /// Size of a single write-block, never zero
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_flash_size(mut self, flash_size: usize) -> Self {
        self.flash_size = flash_size;
        self
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            cpu: Cpu::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            flash_size: DEFAULT_FLASH_SIZE,
            geometry: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_names() {
        assert_eq!(Cpu::parse("65c02").unwrap(), Cpu::W65c02);
        assert_eq!(Cpu::parse("65C02").unwrap(), Cpu::W65c02);
        assert_eq!(Cpu::parse("65816").unwrap(), Cpu::W65816);
        assert_eq!(Cpu::parse("m68k").unwrap(), Cpu::M68000);
        assert_eq!(Cpu::parse("68060").unwrap(), Cpu::M68060);
        assert!(matches!(Cpu::parse("z80"), Err(Error::UnsupportedCpu(_))));

        assert_eq!(Cpu::M68040.to_string(), "68040");
    }

    #[test]
    fn test_alignment_and_family() {
        assert!(!Cpu::W65c02.requires_alignment());
        assert!(!Cpu::M68000.requires_alignment());
        assert!(Cpu::M68040.requires_alignment());
        assert!(Cpu::M68060.requires_alignment());

        assert_eq!(Cpu::M68060.family(), CpuFamily::M680x0);
        assert_eq!(Cpu::W65816.family().pgx_id(), 0x01);
        assert_eq!(CpuFamily::from_pgx_id(0x03).unwrap(), CpuFamily::W65c02);
        assert!(CpuFamily::from_pgx_id(0x07).is_err());
    }

    #[test]
    fn test_geometry() {
        let geometry = Machine::Fnx1591.flash_geometry().unwrap();
        assert_eq!(geometry.pages_per_sector(), 4);
        assert_eq!(geometry.start_page(3), 12);
        assert_eq!(geometry.sector_bytes(), 32 * 1024);

        assert!(Machine::A2560.flash_geometry().is_none());
        assert!(FlashGeometry::new(3, 8, 8).is_err());
        assert!(FlashGeometry::new(0, 8, 8).is_err());
        assert!(FlashGeometry::new(8, 8, 0).is_err());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_deserialize_geometry() {
        let geometry: FlashGeometry =
            toml::from_str("page_size = 8\nsector_size = 32\nram_size = 8").unwrap();
        assert_eq!(geometry, Machine::Fnx1591.flash_geometry().unwrap());

        for invalid in [
            "page_size = 0\nsector_size = 8\nram_size = 8",
            "page_size = 8\nsector_size = 12\nram_size = 8",
            "page_size = 8\nsector_size = 8\nram_size = 0",
        ] {
            assert!(toml::from_str::<FlashGeometry>(invalid).is_err(), "{invalid}");
        }
    }

    #[test]
    fn test_chunk_size_is_never_zero() {
        assert_eq!(TargetConfig::default().chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(TargetConfig::default().with_chunk_size(0).chunk_size(), 1);
        assert_eq!(TargetConfig::default().with_chunk_size(512).chunk_size(), 512);
    }

    #[test]
    fn test_deserialize_names() {
        use serde::de::{
            value::{Error as ValueError, StrDeserializer},
            IntoDeserializer,
        };

        let de: StrDeserializer<'_, ValueError> = "68040".into_deserializer();
        assert_eq!(Cpu::deserialize(de).unwrap(), Cpu::M68040);

        let de: StrDeserializer<'_, ValueError> = "F256K".into_deserializer();
        assert_eq!(Machine::deserialize(de).unwrap(), Machine::F256k);

        let de: StrDeserializer<'_, ValueError> = "6502".into_deserializer();
        assert!(Cpu::deserialize(de).is_err());
    }
}
