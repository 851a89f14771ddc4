//! Intel HEX records
//!
//! Each line is `:LLAAAATT<data>CC`. Record checksums are not verified.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use super::{decode_hex, text_lines, LoaderKind, WriteSink};
use crate::error::Error;

static RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:([0-9a-fA-F]{2})([0-9a-fA-F]{4})([0-9a-fA-F]{2})([0-9a-fA-F]*)([0-9a-fA-F]{2})")
        .expect("Intel HEX record pattern is valid")
});

const DATA: u8 = 0x00;
const END_OF_FILE: u8 = 0x01;
const EXTENDED_SEGMENT_ADDRESS: u8 = 0x02;
const START_SEGMENT_ADDRESS: u8 = 0x03;
const EXTENDED_LINEAR_ADDRESS: u8 = 0x04;
const START_LINEAR_ADDRESS: u8 = 0x05;

fn invalid(line: usize, reason: impl Into<String>) -> Error {
    Error::InvalidRecord {
        format: LoaderKind::IntelHex,
        line,
        reason: reason.into(),
    }
}

pub(super) fn process<S>(data: &[u8], sink: &mut S) -> Result<(), Error>
where
    S: WriteSink + ?Sized,
{
    let mut base: u32 = 0;

    for (line_number, line) in text_lines(data) {
        let captures = RECORD
            .captures(line)
            .ok_or_else(|| invalid(line_number, format!("malformed record `{line}`")))?;

        // The pattern guarantees hex digits of the right width
        let byte_count = u8::from_str_radix(&captures[1], 16).unwrap_or_default();
        let offset = u32::from_str_radix(&captures[2], 16).unwrap_or_default();
        let record_type = u8::from_str_radix(&captures[3], 16).unwrap_or_default();
        let payload = &captures[4];

        match record_type {
            DATA => {
                let bytes = decode_hex(payload)
                    .ok_or_else(|| invalid(line_number, "odd number of data digits"))?;
                if bytes.len() != byte_count as usize {
                    return Err(invalid(
                        line_number,
                        format!(
                            "byte count mismatch: expected {byte_count}, got {}",
                            bytes.len()
                        ),
                    ));
                }

                sink.write(base.wrapping_add(offset), &bytes)?;
            }
            END_OF_FILE => return Ok(()),
            EXTENDED_SEGMENT_ADDRESS => {
                base = parse_base(payload, line_number)? << 4;
                debug!("Segment base set to {base:#x}");
            }
            EXTENDED_LINEAR_ADDRESS => {
                base = parse_base(payload, line_number)? << 16;
                debug!("Linear base set to {base:#x}");
            }
            START_SEGMENT_ADDRESS | START_LINEAR_ADDRESS => {}
            other => {
                return Err(invalid(
                    line_number,
                    format!("unsupported record type {other:#04x}"),
                ))
            }
        }
    }

    Ok(())
}

fn parse_base(payload: &str, line: usize) -> Result<u32, Error> {
    u32::from_str_radix(payload, 16).map_err(|_| invalid(line, "invalid address record"))
}
