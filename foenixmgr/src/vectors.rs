//! Reset vector setup
//!
//! After an executable has been placed in memory, the CPU must be pointed at
//! its entry address so that the reset issued when leaving debug mode starts
//! it. Where that pointer lives, and how it is encoded, depends on the CPU
//! family.

use log::debug;

use crate::{error::Error, loader::WriteSink, target::CpuFamily};

/// 65xx hardware reset vector
const RESET_VECTOR_65XX: u32 = 0xFFFC;
/// Native-mode trampoline for 65816 programs outside bank 0
const STUB_65816: u32 = 0xFF80;
/// Microkernel program signature and start address
const CROSSDEV_65C02: u32 = 0x0080;
const CROSSDEV_START_65C02: u32 = 0x0088;
/// Microkernel argument length, cleared for programs started by reset
const KERNEL_ARGS_65C02: u32 = 0x00FA;
/// 680x0 initial program counter
const RESET_VECTOR_680X0: u32 = 0x0000_0004;

const CLC: u8 = 0x18;
const XCE: u8 = 0xFB;
const JML: u8 = 0x5C;

/// A block of bytes destined for target memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    pub address: u32,
    pub data: Vec<u8>,
}

impl WriteOp {
    pub fn new(address: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            data: data.into(),
        }
    }
}

impl CpuFamily {
    /// The writes which make the CPU start at `entry` on its next reset
    pub fn compute_vectors(self, entry: u32) -> Vec<WriteOp> {
        let [lo, mid, hi, top] = entry.to_le_bytes();

        match self {
            CpuFamily::W65816 if entry & 0xFF_0000 != 0 => vec![
                WriteOp::new(STUB_65816, [CLC, XCE, JML, lo, mid, hi]),
                WriteOp::new(RESET_VECTOR_65XX, (STUB_65816 as u16).to_le_bytes()),
            ],
            CpuFamily::W65816 => vec![WriteOp::new(RESET_VECTOR_65XX, [lo, mid])],
            CpuFamily::W65c02 => vec![
                WriteOp::new(RESET_VECTOR_65XX, [lo, mid]),
                WriteOp::new(CROSSDEV_65C02, *b"CROSSDEV"),
                WriteOp::new(CROSSDEV_START_65C02, [lo, mid]),
                WriteOp::new(KERNEL_ARGS_65C02, [0, 0]),
            ],
            CpuFamily::M680x0 => vec![WriteOp::new(RESET_VECTOR_680X0, [top, hi, mid, lo])],
        }
    }
}

/// Compute and write the reset vectors for `entry`
pub fn apply_reset_vectors<S>(family: CpuFamily, entry: u32, sink: &mut S) -> Result<(), Error>
where
    S: WriteSink + ?Sized,
{
    debug!("Setting {family} reset vectors for entry {entry:#08x}");

    for op in family.compute_vectors(entry) {
        sink.write(op.address, &op.data)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_65816_outside_bank_zero() {
        assert_eq!(
            CpuFamily::W65816.compute_vectors(0x01_8000),
            vec![
                WriteOp::new(0xFF80, [0x18, 0xFB, 0x5C, 0x00, 0x80, 0x01]),
                WriteOp::new(0xFFFC, [0x80, 0xFF]),
            ]
        );
    }

    #[test]
    fn test_65816_bank_zero() {
        assert_eq!(
            CpuFamily::W65816.compute_vectors(0x00_8000),
            vec![WriteOp::new(0xFFFC, [0x00, 0x80])]
        );
    }

    #[test]
    fn test_65c02() {
        assert_eq!(
            CpuFamily::W65c02.compute_vectors(0x2000),
            vec![
                WriteOp::new(0xFFFC, [0x00, 0x20]),
                WriteOp::new(0x0080, *b"CROSSDEV"),
                WriteOp::new(0x0088, [0x00, 0x20]),
                WriteOp::new(0x00FA, [0x00, 0x00]),
            ]
        );
    }

    #[test]
    fn test_680x0() {
        assert_eq!(
            CpuFamily::M680x0.compute_vectors(0x0038_0000),
            vec![WriteOp::new(0x0000_0004, [0x00, 0x38, 0x00, 0x00])]
        );
    }

    #[test]
    fn test_apply_in_order() {
        let mut writes = Vec::new();
        let mut sink = |address: u32, data: &[u8]| -> Result<(), Error> {
            writes.push(WriteOp::new(address, data));
            Ok(())
        };

        apply_reset_vectors(CpuFamily::W65c02, 0x1234, &mut sink).unwrap();

        let addresses: Vec<u32> = writes.iter().map(|op| op.address).collect();
        assert_eq!(addresses, vec![0xFFFC, 0x0080, 0x0088, 0x00FA]);
    }
}
