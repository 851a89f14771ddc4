//! WDC tools binary output
//!
//! A `'Z'` tag followed by blocks of `[address:3 LE][length:3 LE][data]`. A
//! block with address 0 ends the file.

use super::{read_le, LoaderKind, WriteSink};
use crate::error::Error;

const SIGNATURE: u8 = b'Z';
const BLOCK_HEADER_LEN: usize = 6;

pub(super) fn check_signature(data: &[u8]) -> Result<(), Error> {
    match data.first() {
        Some(&SIGNATURE) => Ok(()),
        _ => Err(Error::InvalidWdcSignature),
    }
}

pub(super) fn process<S>(data: &[u8], sink: &mut S) -> Result<(), Error>
where
    S: WriteSink + ?Sized,
{
    check_signature(data)?;

    let truncated = |offset| Error::TruncatedBlock {
        format: LoaderKind::Wdc,
        offset,
    };

    let mut offset = 1;
    while offset < data.len() {
        let header = data
            .get(offset..offset + BLOCK_HEADER_LEN)
            .ok_or_else(|| truncated(offset))?;
        let address = read_le(&header[..3]);
        let length = read_le(&header[3..]) as usize;

        if address == 0 {
            break;
        }

        let start = offset + BLOCK_HEADER_LEN;
        let block = data
            .get(start..start + length)
            .ok_or_else(|| truncated(offset))?;

        sink.write(address, block)?;
        offset = start + length;
    }

    Ok(())
}
