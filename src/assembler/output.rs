// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Image and symbol-file writers.
//!
//! The assembler core hands over a coalesced image (one padded run plus the
//! unpadded runs); everything here is presentation: flat binaries, the
//! DragonDOS and CoCo RS-DOS container headers, Intel HEX records, and the
//! exported-symbol file.

use std::io::{self, Write};

use serde_json::json;

use super::AsmOutput;

/// Raw binary: the padded image as-is.
pub fn write_bin<W: Write>(mut out: W, output: &AsmOutput) -> io::Result<()> {
    out.write_all(&output.image)
}

/// DragonDOS header: flag byte, filetype 2 (binary), load address, length,
/// exec address, trailing flag byte.
pub fn write_dragondos<W: Write>(mut out: W, output: &AsmOutput, exec: u16) -> io::Result<()> {
    let load = output.origin;
    let len = output.image.len() as u16;
    let header = [
        0x55,
        0x02,
        (load >> 8) as u8,
        load as u8,
        (len >> 8) as u8,
        len as u8,
        (exec >> 8) as u8,
        exec as u8,
        0xaa,
    ];
    out.write_all(&header)?;
    out.write_all(&output.image)
}

/// CoCo RS-DOS segmented binary: one preamble block per run, then the
/// postamble carrying the exec address.
pub fn write_coco<W: Write>(mut out: W, output: &AsmOutput, exec: u16) -> io::Result<()> {
    for (addr, data) in &output.runs {
        let len = data.len() as u16;
        out.write_all(&[
            0x00,
            (len >> 8) as u8,
            len as u8,
            (addr >> 8) as u8,
            *addr as u8,
        ])?;
        out.write_all(data)?;
    }
    out.write_all(&[0xff, 0x00, 0x00, (exec >> 8) as u8, exec as u8])
}

/// Intel HEX data records (16 bytes per record) plus the EOF record.
pub fn write_hex<W: Write>(mut out: W, output: &AsmOutput) -> io::Result<()> {
    const RECORD_LEN: usize = 16;
    for (addr, data) in &output.runs {
        for (ix, chunk) in data.chunks(RECORD_LEN).enumerate() {
            let record_addr = addr.wrapping_add((ix * RECORD_LEN) as u16);
            let mut checksum: u8 = chunk.len() as u8;
            checksum = checksum.wrapping_add((record_addr >> 8) as u8);
            checksum = checksum.wrapping_add(record_addr as u8);
            write!(out, ":{:02X}{:04X}00", chunk.len(), record_addr)?;
            for byte in chunk {
                checksum = checksum.wrapping_add(*byte);
                write!(out, "{byte:02X}")?;
            }
            checksum = (!checksum).wrapping_add(1);
            writeln!(out, "{checksum:02X}")?;
        }
    }
    writeln!(out, ":00000001FF")
}

/// `NAME EQU $XXXX` lines for each exported symbol.
pub fn write_symbols<W: Write>(mut out: W, output: &AsmOutput) -> io::Result<()> {
    for (name, value) in &output.exports {
        writeln!(out, "{name}\tEQU\t${:04X}", value & 0xffff)?;
    }
    Ok(())
}

/// Exported symbols as a JSON object.
pub fn write_symbols_json<W: Write>(mut out: W, output: &AsmOutput) -> io::Result<()> {
    let symbols: Vec<serde_json::Value> = output
        .exports
        .iter()
        .map(|(name, value)| {
            json!({
                "name": name,
                "value": value,
                "address": format!("{:04X}", value & 0xffff),
            })
        })
        .collect();
    writeln!(out, "{}", json!({ "symbols": symbols }))
}
