//! PGX single-segment executables
//!
//! ```text
//! "PGX" [version << 4 | cpu] [address:4 LE] [data ...]
//! ```
//!
//! The data is loaded at the address, which is also the entry point.

use std::mem::size_of;

use bytemuck::{pod_read_unaligned, Pod, Zeroable};
use log::info;

use super::{LoaderKind, WriteSink};
use crate::{
    error::Error,
    target::{Cpu, CpuFamily},
    vectors::apply_reset_vectors,
};

const SIGNATURE: &[u8; 3] = b"PGX";
const SUPPORTED_VERSION: u8 = 0;

#[derive(Copy, Clone, Zeroable, Pod, Debug)]
#[repr(C, packed)]
struct PgxHeader {
    signature: [u8; 3],
    version_cpu: u8,
    address: u32,
}

impl PgxHeader {
    fn version(&self) -> u8 {
        self.version_cpu >> 4
    }

    fn cpu(&self) -> u8 {
        self.version_cpu & 0x0F
    }

    fn address(&self) -> u32 {
        u32::from_le(self.address)
    }
}

pub(super) fn process<S>(data: &[u8], cpu: Cpu, sink: &mut S) -> Result<(), Error>
where
    S: WriteSink + ?Sized,
{
    let header_len = size_of::<PgxHeader>();
    if data.len() < header_len {
        return Err(Error::TruncatedBlock {
            format: LoaderKind::Pgx,
            offset: 0,
        });
    }

    let header: PgxHeader = pod_read_unaligned(&data[..header_len]);

    if &header.signature != SIGNATURE {
        return Err(Error::InvalidPgxSignature(header.signature.to_vec()));
    }
    if header.version() != SUPPORTED_VERSION {
        return Err(Error::UnsupportedPgxVersion(header.version()));
    }

    let family = CpuFamily::from_pgx_id(header.cpu())?;
    if family != cpu.family() {
        return Err(Error::CpuMismatch {
            expected: family,
            configured: cpu,
        });
    }

    let address = header.address();
    let body = &data[header_len..];
    info!("Loading {} bytes at {address:#08x}", body.len());

    sink.write(address, body)?;
    apply_reset_vectors(cpu.family(), address, sink)
}
