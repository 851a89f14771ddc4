//! Motorola S-records
//!
//! Only the data records S1, S2 and S3 produce writes. Header, count and start
//! address records are accepted and skipped.

use std::sync::LazyLock;

use regex::Regex;

use super::{decode_hex, text_lines, LoaderKind, WriteSink};
use crate::error::Error;

static RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^S([0-9a-fA-F])([0-9a-fA-F]+)").expect("S-record pattern is valid")
});

fn invalid(line: usize, reason: impl Into<String>) -> Error {
    Error::InvalidRecord {
        format: LoaderKind::Srec,
        line,
        reason: reason.into(),
    }
}

pub(super) fn process<S>(data: &[u8], sink: &mut S) -> Result<(), Error>
where
    S: WriteSink + ?Sized,
{
    for (line_number, line) in text_lines(data) {
        let captures = RECORD
            .captures(line)
            .ok_or_else(|| invalid(line_number, format!("malformed record `{line}`")))?;

        let address_len = match &captures[1] {
            "1" => 2,
            "2" => 3,
            "3" => 4,
            "0" | "4" | "5" | "6" | "7" | "8" | "9" => continue,
            other => {
                return Err(invalid(
                    line_number,
                    format!("unsupported record type S{other}"),
                ))
            }
        };

        let (address, bytes) = data_record(&captures[2], address_len)
            .ok_or_else(|| invalid(line_number, "record too short or not hex"))?;
        sink.write(address, &bytes)?;
    }

    Ok(())
}

/// Split `<count><address><data><checksum>` into address and data
fn data_record(digits: &str, address_len: usize) -> Option<(u32, Vec<u8>)> {
    let data_start = 2 + address_len * 2;
    if digits.len() < data_start + 2 {
        return None;
    }

    let address = u32::from_str_radix(&digits[2..data_start], 16).ok()?;
    let bytes = decode_hex(&digits[data_start..digits.len() - 2])?;

    Some((address, bytes))
}
