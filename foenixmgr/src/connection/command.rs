//! Commands understood by the Foenix debug port
//!
//! Every request is a single frame:
//!
//! ```text
//! [0x55][CMD][ADDR hi mid lo][LEN hi lo][DATA ...][LRC]
//! ```
//!
//! and every response is:
//!
//! ```text
//! [0xAA][STATUS0][STATUS1][DATA ...][LRC]
//! ```

use std::io::Write;

use bytemuck::{bytes_of, Pod, Zeroable};
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::error::Error;

/// First byte of every request frame
pub const REQUEST_SYNC: u8 = 0x55;
/// First byte of every response frame
pub const RESPONSE_SYNC: u8 = 0xAA;
/// Size of a request header, sync byte included
pub const HEADER_LEN: usize = 7;
/// Largest address reachable through the 24-bit address field
pub const MAX_ADDRESS: u32 = 0xFF_FFFF;

/// Types of commands that can be sent to the debug port
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter)]
#[non_exhaustive]
#[repr(u8)]
pub enum CommandType {
    ReadMem = 0x00,
    WriteMem = 0x01,
    ProgramFlash = 0x10,
    EraseFlash = 0x11,
    EraseSector = 0x12,
    ProgramSector = 0x13,
    StopCpu = 0x20,
    StartCpu = 0x21,
    EnterDebug = 0x80,
    ExitDebug = 0x81,
    BootRam = 0x90,
    BootFlash = 0x91,
    Revision = 0xFE,
}

impl CommandType {
    /// Look up a command by its wire code
    pub fn from_code(code: u8) -> Option<Self> {
        CommandType::iter().find(|ty| *ty as u8 == code)
    }

    /// Whether the request frame carries `LEN` bytes of payload
    pub fn has_request_data(self) -> bool {
        self == CommandType::WriteMem
    }

    /// Whether the response frame carries `LEN` bytes of payload
    pub fn has_response_data(self) -> bool {
        self == CommandType::ReadMem
    }
}

/// Available commands
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub enum Command<'a> {
    ReadMem { address: u32, length: u16 },
    WriteMem { address: u32, data: &'a [u8] },
    ProgramFlash { address: u32 },
    EraseFlash,
    EraseSector { address: u32 },
    ProgramSector { address: u32 },
    StopCpu,
    StartCpu,
    EnterDebug,
    ExitDebug,
    BootRam,
    BootFlash,
    Revision,
}

impl Command<'_> {
    /// Return the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::ReadMem { .. } => CommandType::ReadMem,
            Command::WriteMem { .. } => CommandType::WriteMem,
            Command::ProgramFlash { .. } => CommandType::ProgramFlash,
            Command::EraseFlash => CommandType::EraseFlash,
            Command::EraseSector { .. } => CommandType::EraseSector,
            Command::ProgramSector { .. } => CommandType::ProgramSector,
            Command::StopCpu => CommandType::StopCpu,
            Command::StartCpu => CommandType::StartCpu,
            Command::EnterDebug => CommandType::EnterDebug,
            Command::ExitDebug => CommandType::ExitDebug,
            Command::BootRam => CommandType::BootRam,
            Command::BootFlash => CommandType::BootFlash,
            Command::Revision => CommandType::Revision,
        }
    }

    /// Number of payload bytes the device sends back
    pub fn response_len(&self) -> usize {
        match self {
            Command::ReadMem { length, .. } => *length as usize,
            _ => 0,
        }
    }

    fn address(&self) -> u32 {
        match *self {
            Command::ReadMem { address, .. }
            | Command::WriteMem { address, .. }
            | Command::ProgramFlash { address }
            | Command::EraseSector { address }
            | Command::ProgramSector { address } => address,
            _ => 0,
        }
    }

    fn data(&self) -> &[u8] {
        match self {
            Command::WriteMem { data, .. } => data,
            _ => &[],
        }
    }

    fn length(&self) -> Result<u16, Error> {
        match self {
            Command::ReadMem { length, .. } => Ok(*length),
            Command::WriteMem { data, .. } => {
                u16::try_from(data.len()).map_err(|_| Error::BlockTooLarge(data.len()))
            }
            _ => Ok(0),
        }
    }

    /// Build the request header for this command
    pub fn header(&self) -> Result<RequestHeader, Error> {
        let address = self.address();
        if address > MAX_ADDRESS {
            return Err(Error::AddressOutOfRange(address));
        }

        let address = address.to_be_bytes();

        Ok(RequestHeader {
            sync: REQUEST_SYNC,
            command: self.command_type() as u8,
            address: [address[1], address[2], address[3]],
            length: self.length()?.to_be_bytes(),
        })
    }

    /// Write a complete request frame
    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), Error> {
        let header = self.header()?;
        let data = self.data();

        writer.write_all(bytes_of(&header))?;
        writer.write_all(data)?;
        writer.write_all(&[lrc(&header, data)])?;

        Ok(())
    }

    /// Encode the request frame into a buffer
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut frame = Vec::with_capacity(HEADER_LEN + self.data().len() + 1);
        self.write(&mut frame)?;
        Ok(frame)
    }
}

/// The fixed seven-byte part of a request frame
#[derive(Zeroable, Pod, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct RequestHeader {
    pub sync: u8,
    pub command: u8,
    pub address: [u8; 3],
    pub length: [u8; 2],
}

impl RequestHeader {
    /// Reinterpret raw bytes as a header
    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        bytemuck::cast(bytes)
    }

    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::from_code(self.command)
    }

    pub fn address(&self) -> u32 {
        u32::from_be_bytes([0, self.address[0], self.address[1], self.address[2]])
    }

    pub fn length(&self) -> u16 {
        u16::from_be_bytes(self.length)
    }
}

/// Longitudinal redundancy check of a request
///
/// The debug port firmware folds in header bytes 0 through 5 only, so the low
/// byte of the length field never takes part in the checksum.
pub fn lrc(header: &RequestHeader, data: &[u8]) -> u8 {
    let header = bytes_of(header);

    header[..HEADER_LEN - 1]
        .iter()
        .chain(data)
        .fold(0, |lrc, byte| lrc ^ byte)
}
