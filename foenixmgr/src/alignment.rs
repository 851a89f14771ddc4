//! 4-byte aligned writes for 32-bit buses
//!
//! The 68040 and 68060 fault on partial-word bus cycles. Writes which do not
//! start and end on a long-word boundary are widened to the enclosing aligned
//! range with a read-modify-write, which leaves neighbouring bytes intact.

use log::debug;

use crate::{connection::Connection, error::Error};

/// Bus width in bytes
pub const BUS_WIDTH: u32 = 4;

/// Raw block access to target memory
pub trait BlockIo {
    fn read_block(&mut self, address: u32, length: u16) -> Result<Vec<u8>, Error>;

    fn write_block(&mut self, address: u32, data: &[u8]) -> Result<(), Error>;
}

impl BlockIo for Connection {
    fn read_block(&mut self, address: u32, length: u16) -> Result<Vec<u8>, Error> {
        self.read_mem(address, length)
    }

    fn write_block(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.write_mem(address, data)
    }
}

/// Write `data` at `address` using only long-word aligned transactions
pub fn write_aligned<B>(io: &mut B, address: u32, data: &[u8]) -> Result<(), Error>
where
    B: BlockIo + ?Sized,
{
    let misalignment = address % BUS_WIDTH;

    if misalignment == 0 && data.len() % BUS_WIDTH as usize == 0 {
        return io.write_block(address, data);
    }

    let aligned_address = address - misalignment;
    let aligned_len = (data.len() + misalignment as usize).next_multiple_of(BUS_WIDTH as usize);
    let length = u16::try_from(aligned_len).map_err(|_| Error::BlockTooLarge(aligned_len))?;

    debug!(
        "Widening write of {} bytes at {address:#08x} to {aligned_len} bytes at {aligned_address:#08x}",
        data.len()
    );

    let mut block = io.read_block(aligned_address, length)?;
    if block.len() != aligned_len {
        return Err(Error::AlignmentRead {
            expected: aligned_len,
            got: block.len(),
        });
    }

    let offset = misalignment as usize;
    block[offset..offset + data.len()].copy_from_slice(data);

    io.write_block(aligned_address, &block)
}
