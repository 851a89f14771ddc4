//! Library and application errors

use std::{
    fmt::{Display, Formatter},
    io,
};

use miette::Diagnostic;
use strum::VariantNames;
use thiserror::Error;

use crate::{
    connection::command::CommandType,
    loader::LoaderKind,
    target::{Cpu, CpuFamily, Machine},
};

/// All possible errors returned by foenixmgr
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Operation was cancelled by the user")]
    #[diagnostic(code(foenixmgr::cancelled))]
    Cancelled,

    #[error("Error while communicating with the debug port")]
    #[diagnostic(transparent)]
    Connection(#[source] ConnectionError),

    #[error("Communication error while programming flash")]
    #[diagnostic(transparent)]
    Flashing(#[source] ConnectionError),

    #[error("The debug port is not in debug mode")]
    #[diagnostic(
        code(foenixmgr::not_in_debug_mode),
        help("Enter debug mode first, or stop the CPU with the `stop` command")
    )]
    NotInDebugMode,

    #[error("Address {0:#x} does not fit in the 24-bit debug port address space")]
    #[diagnostic(code(foenixmgr::address_out_of_range))]
    AddressOutOfRange(u32),

    #[error("Block of {0} bytes exceeds the 65535 byte transfer limit")]
    #[diagnostic(
        code(foenixmgr::block_too_large),
        help("Lower `chunk_size` in foenixmgr.toml")
    )]
    BlockTooLarge(usize),

    #[error("Aligned read returned {got} bytes, expected {expected}")]
    #[diagnostic(code(foenixmgr::alignment_read))]
    AlignmentRead { expected: usize, got: usize },

    #[error("Unsupported CPU type: {0}")]
    #[diagnostic(
        code(foenixmgr::unsupported_cpu),
        help("Supported CPUs are: {}", Cpu::VARIANTS.join(", "))
    )]
    UnsupportedCpu(String),

    #[error("Unknown target machine: {0}")]
    #[diagnostic(
        code(foenixmgr::unknown_machine),
        help("Known machines are: {}", Machine::VARIANTS.join(", "))
    )]
    UnknownMachine(String),

    #[error("The target machine does not support flash sector programming")]
    #[diagnostic(
        code(foenixmgr::sector_programming_unsupported),
        help("Use the `--target` option to select a sector-capable machine (f256jr, f256k, fnx1591)")
    )]
    SectorProgrammingUnsupported,

    #[error("File size ({actual} bytes) does not match the flash sector size ({expected} bytes)")]
    #[diagnostic(code(foenixmgr::sector_size_mismatch))]
    SectorSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid flash geometry: sizes must be non-zero and a sector ({sector_size}KB) must hold whole pages ({page_size}KB)")]
    #[diagnostic(code(foenixmgr::invalid_flash_geometry))]
    InvalidFlashGeometry { page_size: u32, sector_size: u32 },

    #[error("Invalid bulk programming entry on line {line}: {reason}")]
    #[diagnostic(
        code(foenixmgr::invalid_bulk_entry),
        help("Each line must have the form `sector_hex,filename`")
    )]
    InvalidBulkEntry { line: usize, reason: String },

    #[error("No write handler was set on the {0} loader")]
    #[diagnostic(code(foenixmgr::loader::missing_write_sink))]
    MissingWriteSink(LoaderKind),

    #[error("The {0} loader has no file open")]
    #[diagnostic(code(foenixmgr::loader::not_open))]
    LoaderNotOpen(LoaderKind),

    #[error("Invalid {format} record at line {line}: {reason}")]
    #[diagnostic(code(foenixmgr::loader::invalid_record))]
    InvalidRecord {
        format: LoaderKind,
        line: usize,
        reason: String,
    },

    #[error("Truncated {format} block at offset {offset:#x}")]
    #[diagnostic(
        code(foenixmgr::loader::truncated_block),
        help("The file ends before the block it declares; it may be corrupt")
    )]
    TruncatedBlock { format: LoaderKind, offset: usize },

    #[error("Invalid WDC binary: missing 'Z' signature")]
    #[diagnostic(code(foenixmgr::loader::wdc_signature))]
    InvalidWdcSignature,

    #[error("Bad PGX signature: {0:02x?}")]
    #[diagnostic(code(foenixmgr::loader::pgx_signature))]
    InvalidPgxSignature(Vec<u8>),

    #[error("Unsupported PGX version: {0}")]
    #[diagnostic(
        code(foenixmgr::loader::pgx_version),
        help("Only PGX version 0 is supported")
    )]
    UnsupportedPgxVersion(u8),

    #[error("Unsupported PGX CPU type: {0:#04x}")]
    #[diagnostic(code(foenixmgr::loader::pgx_cpu))]
    UnknownPgxCpu(u8),

    #[error("Executable is built for the {expected} family, but the CPU is configured as {configured}")]
    #[diagnostic(
        code(foenixmgr::loader::cpu_mismatch),
        help("Set `cpu` in foenixmgr.toml to match the connected machine")
    )]
    CpuMismatch { expected: CpuFamily, configured: Cpu },

    #[error("Invalid PGZ header: {0:#04x} (expected 0x5a or 0x7a)")]
    #[diagnostic(code(foenixmgr::loader::pgz_header))]
    InvalidPgzHeader(u8),

    #[error("Binary of {0} bytes is too small to hold the initial stack pointer and program counter")]
    #[diagnostic(
        code(foenixmgr::binary_too_small),
        help("A 680x0 binary must start with its 8 byte reset vector table")
    )]
    BinaryTooSmall(usize),

    #[error("Failed to open file: {0}")]
    #[diagnostic(code(foenixmgr::file_open))]
    FileOpenError(String, #[source] io::Error),

    #[error("Failed to parse configuration file {0}")]
    #[diagnostic(
        code(foenixmgr::config),
        help("Check foenixmgr.toml for typos and invalid values")
    )]
    InvalidConfig(String, #[source] Box<dyn std::error::Error + Send + Sync>),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    #[diagnostic(code(foenixmgr::dialoguer_error))]
    DialoguerError(#[from] dialoguer::Error),

    #[error("No serial port or TCP address specified")]
    #[diagnostic(
        code(foenixmgr::no_port),
        help("Use the `--port` option or set `port` in foenixmgr.toml")
    )]
    NoPort,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Connection(err.into())
    }
}

#[cfg(feature = "serialport")]
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Self::Connection(err.into())
    }
}

/// Connection-related errors
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error("Failed to connect to the device")]
    #[diagnostic(
        code(foenixmgr::connection_failed),
        help("Ensure that the device is powered on and the debug port cable is connected")
    )]
    ConnectionFailed,

    #[error("Serial port not found")]
    #[diagnostic(
        code(foenixmgr::device_not_found),
        help("Ensure that the device is connected and your host recognizes the serial adapter")
    )]
    DeviceNotFound,

    #[error("The connection was closed by the remote end")]
    #[diagnostic(code(foenixmgr::connection_closed))]
    Closed,

    #[error("Incomplete write: the transport did not accept the whole packet")]
    #[diagnostic(code(foenixmgr::incomplete_write))]
    IncompleteWrite,

    #[error("Timeout while running {0}command")]
    #[diagnostic(
        code(foenixmgr::timeout),
        help("Increase `timeout` in foenixmgr.toml or check the debug port connection")
    )]
    Timeout(TimedOutCommand),

    #[error("IO error while using the connection: {0}")]
    #[diagnostic(code(foenixmgr::io_error))]
    Io(#[source] io::Error),

    #[cfg(feature = "serialport")]
    #[error("IO error while using serial port: {0}")]
    #[diagnostic(code(foenixmgr::serial_error))]
    Serial(#[source] serialport::Error),
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind;

        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                ConnectionError::Timeout(TimedOutCommand::default())
            }
            ErrorKind::NotFound => ConnectionError::DeviceNotFound,
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                ConnectionError::Closed
            }
            ErrorKind::WriteZero => ConnectionError::IncompleteWrite,
            ErrorKind::ConnectionRefused => ConnectionError::ConnectionFailed,
            _ => ConnectionError::Io(err),
        }
    }
}

#[cfg(feature = "serialport")]
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
impl From<serialport::Error> for ConnectionError {
    fn from(err: serialport::Error) -> Self {
        use serialport::ErrorKind;

        match err.kind() {
            ErrorKind::Io(kind) => io::Error::new(kind, err.description).into(),
            ErrorKind::NoDevice => ConnectionError::DeviceNotFound,
            _ => ConnectionError::Serial(err),
        }
    }
}

/// An executed command which has timed out
#[derive(Clone, Debug, Default)]
pub struct TimedOutCommand {
    command: Option<CommandType>,
}

impl Display for TimedOutCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.command {
            Some(command) => write!(f, "{} ", command),
            None => Ok(()),
        }
    }
}

impl From<CommandType> for TimedOutCommand {
    fn from(ct: CommandType) -> Self {
        TimedOutCommand { command: Some(ct) }
    }
}

pub(crate) trait ResultExt {
    /// Mark an error as having occurred during a flash workflow
    fn flashing(self) -> Self;
    /// Mark the command from which this error originates
    fn for_command(self, command: CommandType) -> Self;
}

impl<T> ResultExt for Result<T, Error> {
    fn flashing(self) -> Self {
        match self {
            Err(Error::Connection(err)) => Err(Error::Flashing(err)),
            res => res,
        }
    }

    fn for_command(self, command: CommandType) -> Self {
        match self {
            Err(Error::Connection(ConnectionError::Timeout(_))) => {
                Err(Error::Connection(ConnectionError::Timeout(command.into())))
            }
            Err(Error::Flashing(ConnectionError::Timeout(_))) => {
                Err(Error::Flashing(ConnectionError::Timeout(command.into())))
            }
            res => res,
        }
    }
}
