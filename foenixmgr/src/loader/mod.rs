//! Executable and data file loaders
//!
//! Every supported container format is decoded into an ordered stream of
//! `(address, bytes)` writes which are handed to a [WriteSink]. Formats which
//! carry an entry address (PGX and PGZ) also set up the CPU reset vectors.
//!
//! A [Loader] is single-use: open a file, set a sink, process, close.

use std::{fmt, fs, path::Path};

use log::debug;
use strum::{Display, EnumIter, VariantNames};

use crate::{error::Error, target::Cpu};

mod intel_hex;
mod pgx;
mod pgz;
mod srec;
mod wdc;

/// Destination of decoded writes
pub trait WriteSink {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error>;
}

impl<F> WriteSink for F
where
    F: FnMut(u32, &[u8]) -> Result<(), Error>,
{
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self(address, data)
    }
}

/// Supported file formats
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, VariantNames)]
#[non_exhaustive]
#[strum(serialize_all = "kebab-case")]
pub enum LoaderKind {
    /// Intel HEX records
    IntelHex,
    /// Motorola S-records
    Srec,
    /// WDC tools binary
    Wdc,
    /// Foenix single-segment executable
    Pgx,
    /// Foenix multi-segment executable
    Pgz,
}

impl LoaderKind {
    /// Guess the format from a file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();

        match extension.as_str() {
            "hex" | "ihex" => Some(LoaderKind::IntelHex),
            "srec" | "s19" | "s28" | "s37" | "mot" => Some(LoaderKind::Srec),
            "wdc" => Some(LoaderKind::Wdc),
            "pgx" => Some(LoaderKind::Pgx),
            "pgz" => Some(LoaderKind::Pgz),
            _ => None,
        }
    }
}

/// A file decoder bound to a write sink
pub struct Loader<'a> {
    kind: LoaderKind,
    cpu: Cpu,
    data: Option<Vec<u8>>,
    sink: Option<Box<dyn WriteSink + 'a>>,
}

impl fmt::Debug for Loader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("kind", &self.kind)
            .field("cpu", &self.cpu)
            .field("len", &self.data.as_ref().map(Vec::len))
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl<'a> Loader<'a> {
    /// Create a loader for `kind`; `cpu` is the configured CPU, used for PGX
    /// compatibility checks and reset vectors
    pub fn new(kind: LoaderKind, cpu: Cpu) -> Self {
        Self {
            kind,
            cpu,
            data: None,
            sink: None,
        }
    }

    pub fn kind(&self) -> LoaderKind {
        self.kind
    }

    /// Read the whole file into memory and check its signature
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let data =
            fs::read(path).map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;

        debug!("Opened {} ({} bytes) as {}", path.display(), data.len(), self.kind);
        self.open_bytes(data)
    }

    /// Use an in-memory file
    pub fn open_bytes(&mut self, data: Vec<u8>) -> Result<(), Error> {
        match self.kind {
            LoaderKind::Wdc => wdc::check_signature(&data)?,
            LoaderKind::Pgz => {
                pgz::FieldWidth::from_header(&data)?;
            }
            _ => {}
        }

        self.data = Some(data);
        Ok(())
    }

    pub fn set_write_sink(&mut self, sink: impl WriteSink + 'a) {
        self.sink = Some(Box::new(sink));
    }

    /// Decode the file, sending every block to the sink in file order
    pub fn process(&mut self) -> Result<(), Error> {
        let data = self
            .data
            .as_deref()
            .ok_or(Error::LoaderNotOpen(self.kind))?;
        let sink = self
            .sink
            .as_deref_mut()
            .ok_or(Error::MissingWriteSink(self.kind))?;

        match self.kind {
            LoaderKind::IntelHex => intel_hex::process(data, sink),
            LoaderKind::Srec => srec::process(data, sink),
            LoaderKind::Wdc => wdc::process(data, sink),
            LoaderKind::Pgx => pgx::process(data, self.cpu, sink),
            LoaderKind::Pgz => pgz::process(data, self.cpu, sink),
        }
    }

    /// Release the file contents and the sink
    pub fn close(&mut self) {
        self.data = None;
        self.sink = None;
    }
}

/// Split a text file into numbered, non-empty lines
fn text_lines(data: &[u8]) -> impl Iterator<Item = (usize, &str)> {
    data.split(|b| *b == b'\n')
        .enumerate()
        .map(|(index, line)| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            (index + 1, std::str::from_utf8(line).unwrap_or("\u{FFFD}"))
        })
        .filter(|(_, line)| !line.trim().is_empty())
}

/// Decode a string of hex digit pairs
fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Read a little-endian integer spanning all of `bytes`
fn read_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0, |value, byte| (value << 8) | u32::from(*byte))
}
