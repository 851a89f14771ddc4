//! Establish a connection with the debug port
//!
//! The [Connection] struct abstracts over the byte transport and the
//! encoding/decoding of frames. Every call to [Connection::transfer] performs
//! one complete request/response transaction.

use std::{
    fmt,
    io::{Read, Write},
};

use log::{debug, trace};

use self::{
    command::{Command, RESPONSE_SYNC},
    transport::Transport,
};
use crate::error::{Error, ResultExt};

pub mod command;
#[cfg(test)]
pub(crate) mod mock;
pub mod transport;

/// A response from the debug port following a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status0: u8,
    pub status1: u8,
    pub data: Vec<u8>,
    /// Trailing checksum; sent by the firmware but not verified
    pub lrc: u8,
}

/// An established connection with the debug port
pub struct Connection {
    transport: Box<dyn Transport>,
    status0: u8,
    status1: u8,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("status0", &self.status0)
            .field("status1", &self.status1)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Connection {
            transport,
            status0: 0,
            status1: 0,
        }
    }

    /// Write a command and read its response
    pub fn transfer(&mut self, command: Command<'_>) -> Result<Response, Error> {
        let ty = command.command_type();
        self.status0 = 0;
        self.status1 = 0;

        self.write_command(command).for_command(ty)?;
        let response = self
            .read_response(command.response_len())
            .for_command(ty)?;

        self.status0 = response.status0;
        self.status1 = response.status1;

        Ok(response)
    }

    /// Write a command to the transport
    pub fn write_command(&mut self, command: Command<'_>) -> Result<(), Error> {
        debug!("Writing command: {:?}", command.command_type());

        let frame = command.encode()?;
        trace!("Request frame: {:02x?}", frame);

        self.transport.write_all(&frame)?;
        self.transport.flush()?;

        Ok(())
    }

    /// Read a response frame carrying `len` bytes of payload
    pub fn read_response(&mut self, len: usize) -> Result<Response, Error> {
        let mut skipped = 0usize;
        loop {
            if self.read_byte()? == RESPONSE_SYNC {
                break;
            }
            skipped += 1;
        }
        if skipped > 0 {
            debug!("Skipped {skipped} bytes before response sync");
        }

        let mut status = [0u8; 2];
        self.transport.read_exact(&mut status)?;

        let mut data = vec![0u8; len];
        self.transport.read_exact(&mut data)?;

        let lrc = self.read_byte()?;

        let response = Response {
            status0: status[0],
            status1: status[1],
            data,
            lrc,
        };
        trace!("Response: {:02x?}", response);

        Ok(response)
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8; 1];
        self.transport.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Read `length` bytes starting at `address`
    pub fn read_mem(&mut self, address: u32, length: u16) -> Result<Vec<u8>, Error> {
        Ok(self.transfer(Command::ReadMem { address, length })?.data)
    }

    /// Write `data` starting at `address`
    pub fn write_mem(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.transfer(Command::WriteMem { address, data })?;
        Ok(())
    }

    /// First status byte of the most recent response
    pub fn status0(&self) -> u8 {
        self.status0
    }

    /// Second status byte of the most recent response
    pub fn status1(&self) -> u8 {
        self.status1
    }

    /// Give back the underlying transport
    pub fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }
}
