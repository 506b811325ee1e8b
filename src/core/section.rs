// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Sections and spans: where assembled bytes live.
//!
//! A span is one region of consecutive data.  `org` is the address the
//! instructions inside were assembled for; `put` is where the bytes land in
//! the output image.  The two normally advance together and only diverge
//! after a PUT directive.  `sequence` resolves overlaps when spans are
//! coalesced for output: the higher sequence wins.

use std::collections::{BTreeMap, HashMap};

use crate::core::symbols::LocalLabels;

#[derive(Debug, Clone)]
pub struct Span {
    pub sequence: u32,
    pub org: i32,
    pub put: i32,
    pub data: Vec<u8>,
}

impl Span {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A named section: ordered spans plus the assembly cursor state.
///
/// `line_number` is a dummy line count used by local-label searches.  It is
/// incremented once per source line and must be identical across passes or
/// the nearest-line searches will not be stable.
pub struct Section {
    pub name: String,
    pub spans: Vec<Span>,
    pub local_labels: LocalLabels,
    pub pass: u32,
    pub line_number: u32,
    pub pc: i32,
    pub put: i32,
    /// Direct page, 0..=255, or -1 when no page is valid.
    pub dp: i32,
    pub last_pc: i32,
}

impl Section {
    fn new(name: &str, pass: u32, pc: i32) -> Section {
        Section {
            name: name.to_string(),
            spans: Vec::new(),
            local_labels: LocalLabels::default(),
            pass,
            line_number: 0,
            pc,
            put: pc,
            dp: -1,
            last_pc: pc,
        }
    }

    /// New pass: span data is destroyed, local labels survive so forward
    /// references can resolve from the previous pass.
    fn reset(&mut self, pass: u32, pc: i32) {
        self.spans.clear();
        self.pass = pass;
        self.line_number = 0;
        self.pc = pc;
        self.put = pc;
        self.dp = -1;
        self.last_pc = pc;
    }

    /// Join adjacent spans whose `put` ranges abut.  With `sort`, spans are
    /// ordered by placement first; with `pad`, gaps fill with zero so a
    /// single span remains.  Overlapping bytes go to the higher sequence.
    pub fn coalesce(&mut self, sort: bool, pad: bool) {
        if sort {
            self.spans.sort_by_key(|span| (span.put, span.sequence));
        }
        let mut merged: Vec<Span> = Vec::new();
        for span in self.spans.drain(..) {
            let Some(last) = merged.last_mut() else {
                merged.push(span);
                continue;
            };
            let end = last.put + last.size() as i32;
            let gap = span.put - end;
            if gap == 0 || (pad && gap > 0) {
                last.data.extend(std::iter::repeat(0).take(gap.max(0) as usize));
                last.data.extend_from_slice(&span.data);
                last.sequence = last.sequence.max(span.sequence);
            } else if gap < 0 && span.put >= last.put {
                let offset = (span.put - last.put) as usize;
                for (ix, byte) in span.data.iter().enumerate() {
                    let pos = offset + ix;
                    if pos < last.data.len() {
                        if span.sequence > last.sequence {
                            last.data[pos] = *byte;
                        }
                    } else {
                        last.data.push(*byte);
                    }
                }
                last.sequence = last.sequence.max(span.sequence);
            } else {
                merged.push(span);
            }
        }
        self.spans = merged;
    }
}

/// All named sections plus the current-section cursor and the global span
/// sequence counter.
pub struct Sections {
    sections: HashMap<String, Section>,
    current: Option<String>,
    next_sequence: u32,
    /// Bytes emitted since the last `clear_trace`, for the listing.
    trace: Vec<u8>,
}

impl Sections {
    pub fn new() -> Sections {
        Sections {
            sections: HashMap::new(),
            current: None,
            next_sequence: 0,
            trace: Vec::new(),
        }
    }

    /// Start a pass: no section is current until the driver selects one.
    pub fn begin_pass(&mut self) {
        self.current = None;
    }

    /// Select a named section, creating it if needed.  A freshly created or
    /// pass-reset section starts where the previously current section left
    /// off (address 0 when there is none).
    pub fn set(&mut self, name: &str, pass: u32) {
        let mut handoff = 0;
        if let Some(cur) = self.current.clone() {
            if let Some(prev) = self.sections.get_mut(&cur) {
                prev.last_pc = prev.pc;
                handoff = prev.last_pc;
            }
        }
        match self.sections.get_mut(name) {
            Some(sect) if sect.pass != pass => sect.reset(pass, handoff),
            Some(_) => {}
            None => {
                self.sections
                    .insert(name.to_string(), Section::new(name, pass, handoff));
            }
        }
        self.current = Some(name.to_string());
    }

    pub fn current(&self) -> &Section {
        let name = self.current.as_ref().expect("no current section");
        &self.sections[name]
    }

    pub fn current_mut(&mut self) -> &mut Section {
        let name = self.current.as_ref().expect("no current section");
        self.sections.get_mut(name).expect("no current section")
    }

    /// Set the PC.  The physical placement follows the new address, so ORG
    /// re-synchronizes `put` with `org`.
    pub fn set_pc(&mut self, pc: i32) {
        let sect = self.current_mut();
        sect.pc = pc;
        sect.put = pc;
    }

    /// Set the physical placement address only; logical addresses keep
    /// advancing from the current PC.
    pub fn set_put(&mut self, put: i32) {
        self.current_mut().put = put;
    }

    /// Advance the PC without emitting (RMB).
    pub fn advance_pc(&mut self, n: i32) {
        let sect = self.current_mut();
        sect.pc += n;
        sect.put += n;
    }

    fn push_byte(&mut self, byte: u8) {
        let continues = {
            let sect = self.current();
            sect.spans.last().map_or(false, |span| {
                sect.pc == span.org + span.size() as i32
                    && sect.put == span.put + span.size() as i32
            })
        };
        if !continues {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            let sect = self.current_mut();
            let (pc, put) = (sect.pc, sect.put);
            sect.spans.push(Span {
                sequence,
                org: pc,
                put,
                data: Vec::new(),
            });
        }
        let sect = self.current_mut();
        sect.spans.last_mut().expect("span exists").data.push(byte);
        sect.pc += 1;
        sect.put += 1;
        self.trace.push(byte);
    }

    /// N bytes counting toward the span size with defined content zero.
    pub fn emit_pad(&mut self, n: usize) {
        for _ in 0..n {
            self.push_byte(0);
        }
    }

    pub fn emit_imm8(&mut self, value: i64) {
        self.push_byte(value as u8);
    }

    /// Big-endian 16-bit value.
    pub fn emit_imm16(&mut self, value: i64) {
        self.push_byte((value >> 8) as u8);
        self.push_byte(value as u8);
    }

    /// Opcode byte, or page prefix plus opcode when the value is wider than
    /// a byte.
    pub fn emit_op(&mut self, op: u16) {
        if op > 0xff {
            self.push_byte((op >> 8) as u8);
        }
        self.push_byte(op as u8);
    }

    /// PC-relative 8-bit operand, computed against the address following it.
    pub fn emit_rel8(&mut self, target: i64) {
        let offset = target - (self.current().pc as i64 + 1);
        self.push_byte(offset as u8);
    }

    /// PC-relative 16-bit operand, computed against the address following it.
    pub fn emit_rel16(&mut self, target: i64) {
        let offset = target - (self.current().pc as i64 + 2);
        self.push_byte((offset >> 8) as u8);
        self.push_byte(offset as u8);
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    pub fn take_trace(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.trace)
    }

    /// Merge all spans from all sections into a fresh unnamed section,
    /// sorted by `put`.  Overlaps resolve in favor of the span with the
    /// higher sequence; with `pad`, gaps fill with zero and a single span
    /// results.
    pub fn coalesce_all(&self, pad: bool) -> Section {
        let mut spans: Vec<&Span> = self
            .sections
            .values()
            .flat_map(|sect| sect.spans.iter())
            .collect();
        spans.sort_by_key(|span| span.sequence);

        let mut bytes: BTreeMap<i32, u8> = BTreeMap::new();
        for span in spans {
            for (ix, byte) in span.data.iter().enumerate() {
                bytes.insert(span.put + ix as i32, *byte);
            }
        }

        let mut out = Section::new("", 0, 0);
        if bytes.is_empty() {
            return out;
        }
        if pad {
            let first = *bytes.keys().next().expect("non-empty");
            let last = *bytes.keys().next_back().expect("non-empty");
            let mut data = vec![0u8; (last - first + 1) as usize];
            for (addr, byte) in &bytes {
                data[(addr - first) as usize] = *byte;
            }
            out.spans.push(Span {
                sequence: 0,
                org: first,
                put: first,
                data,
            });
        } else {
            let mut sequence = 0;
            for (addr, byte) in &bytes {
                let continues = out
                    .spans
                    .last()
                    .map_or(false, |span| *addr == span.put + span.size() as i32);
                if !continues {
                    out.spans.push(Span {
                        sequence,
                        org: *addr,
                        put: *addr,
                        data: Vec::new(),
                    });
                    sequence += 1;
                }
                out.spans.last_mut().expect("span exists").data.push(*byte);
            }
        }
        out
    }
}

impl Default for Sections {
    fn default() -> Sections {
        Sections::new()
    }
}
