// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Listing file generation.

use std::io::Write;

use super::ListingEntry;

/// Writer for listing file output.
pub struct ListingWriter<W: Write> {
    out: W,
}

impl<W: Write> ListingWriter<W> {
    pub fn new(out: W) -> ListingWriter<W> {
        ListingWriter { out }
    }

    pub fn write_line(&mut self, entry: &ListingEntry) -> std::io::Result<()> {
        let addr = if entry.addr < 0 {
            "    ".to_string()
        } else {
            format!("{:04X}", entry.addr & 0xffff)
        };
        let bytes = format_bytes(&entry.bytes);
        writeln!(self.out, "{addr}  {bytes:<21} {}", entry.text)
    }

    pub fn write_all(&mut self, entries: &[ListingEntry]) -> std::io::Result<()> {
        for entry in entries {
            self.write_line(entry)?;
        }
        Ok(())
    }
}

fn format_bytes(bytes: &[u8]) -> String {
    const MAX_SHOWN: usize = 7;
    let mut out = String::new();
    for (ix, byte) in bytes.iter().take(MAX_SHOWN).enumerate() {
        if ix > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    if bytes.len() > MAX_SHOWN {
        out.push('+');
    }
    out
}
