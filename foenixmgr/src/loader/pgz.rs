//! PGZ multi-segment executables
//!
//! A tag byte selects the width of every address and size field: `'Z'` for 24
//! bits and `'z'` for 32 bits. It is followed by `[address][size][data]`
//! blocks. A block with address 0 ends the file, and a block with size 0 names
//! the entry address.

use log::info;

use super::{read_le, LoaderKind, WriteSink};
use crate::{error::Error, target::Cpu, vectors::apply_reset_vectors};

/// Largest single write handed to the sink
const MAX_WRITE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FieldWidth {
    Bits24,
    Bits32,
}

impl FieldWidth {
    pub(super) fn from_header(data: &[u8]) -> Result<Self, Error> {
        match data.first() {
            Some(b'Z') => Ok(FieldWidth::Bits24),
            Some(b'z') => Ok(FieldWidth::Bits32),
            Some(&other) => Err(Error::InvalidPgzHeader(other)),
            None => Err(Error::TruncatedBlock {
                format: LoaderKind::Pgz,
                offset: 0,
            }),
        }
    }

    fn bytes(self) -> usize {
        match self {
            FieldWidth::Bits24 => 3,
            FieldWidth::Bits32 => 4,
        }
    }
}

pub(super) fn process<S>(data: &[u8], cpu: Cpu, sink: &mut S) -> Result<(), Error>
where
    S: WriteSink + ?Sized,
{
    let width = FieldWidth::from_header(data)?.bytes();
    let truncated = |offset| Error::TruncatedBlock {
        format: LoaderKind::Pgz,
        offset,
    };

    let mut offset = 1;
    while offset < data.len() {
        let fields = data
            .get(offset..offset + 2 * width)
            .ok_or_else(|| truncated(offset))?;
        let address = read_le(&fields[..width]);
        let size = read_le(&fields[width..]) as usize;

        if address == 0 {
            break;
        }

        let start = offset + 2 * width;
        if size == 0 {
            info!("Entry address {address:#08x}");
            apply_reset_vectors(cpu.family(), address, sink)?;
            offset = start;
            continue;
        }

        let block = data
            .get(start..start + size)
            .ok_or_else(|| truncated(offset))?;

        info!("Loading {size} bytes at {address:#08x}");
        let mut chunk_address = address;
        for chunk in block.chunks(MAX_WRITE) {
            sink.write(chunk_address, chunk)?;
            chunk_address = chunk_address.wrapping_add(chunk.len() as u32);
        }

        offset = start + size;
    }

    Ok(())
}
