// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction encoders, one per addressing family.
//!
//! Encoders receive fully evaluated argument arrays.  Unresolved operands
//! assemble as the maximum-size form so the size estimate can only shrink
//! on later passes; range violations are reported once `report` is set
//! (the assembler is past its first pass).

use std::rc::Rc;

use crate::core::error::{AsmError, ErrorKind};
use crate::core::node::{Attr, Node, Op, Value};
use crate::core::section::Sections;
use crate::m6809::opcodes::{OpClass, OpEntry};
use crate::m6809::registers::RegId;

pub struct Encoder<'a> {
    pub sections: &'a mut Sections,
    /// Report range and resolution errors (pass > 1).
    pub report: bool,
}

fn fits_i8(v: i64) -> bool {
    (-128..=127).contains(&v)
}

fn fits_byte(v: i64) -> bool {
    (-128..=0xff).contains(&v)
}

fn fits_word(v: i64) -> bool {
    (-32768..=0xffff).contains(&v)
}

/// Integer value of an evaluated leaf, or None when unresolved.
fn int_value(node: &Node) -> Option<i64> {
    match node.value {
        Value::Int(v) => Some(v),
        Value::Float(v) => Some(v as i64),
        _ => None,
    }
}

impl Encoder<'_> {
    /// Encode one instruction from its table entry and evaluated arguments.
    pub fn encode(&mut self, entry: &OpEntry, args: Option<&Rc<Node>>) -> Result<(), AsmError> {
        let items: &[Rc<Node>] = args.map(|a| a.array_items()).unwrap_or(&[]);
        match entry.class {
            OpClass::Inherent(op) => {
                if !items.is_empty() {
                    return Err(AsmError::syntax("unexpected argument"));
                }
                self.sections.emit_op(op);
                Ok(())
            }
            OpClass::Immediate8(op) => {
                let [arg] = items else {
                    return Err(AsmError::syntax("invalid number of arguments"));
                };
                if arg.attr != Attr::Immediate {
                    return Err(AsmError::syntax("invalid addressing mode"));
                }
                self.immediate(op, false, arg)
            }
            OpClass::Memory {
                imm,
                wide,
                direct,
                indexed,
                extended,
            } => {
                if items.len() == 1 && items[0].attr == Attr::Immediate {
                    let Some(op) = imm else {
                        return Err(AsmError::syntax("invalid addressing mode"));
                    };
                    return self.immediate(op, wide, &items[0]);
                }
                self.address(direct, indexed, extended, items)
            }
            OpClass::Relative8(op) => self.relative(op, false, items),
            OpClass::Relative16(op) => self.relative(op, true, items),
            OpClass::Stack { op, other } => self.stack(op, other, items),
            OpClass::Pair(op) => self.pair(op, items),
        }
    }

    fn immediate(&mut self, op: u16, wide: bool, arg: &Rc<Node>) -> Result<(), AsmError> {
        self.sections.emit_op(op);
        let Some(value) = int_value(arg) else {
            self.sections.emit_pad(if wide { 2 } else { 1 });
            return self.unresolved(arg);
        };
        // Emit before any range check so sizes stay stable on error passes.
        if wide {
            self.sections.emit_imm16(value);
            if !fits_word(value) && self.report {
                return Err(AsmError::out_of_range(format!(
                    "immediate value {value} out of 16-bit range"
                )));
            }
        } else {
            self.sections.emit_imm8(value);
            if !fits_byte(value) && self.report {
                return Err(AsmError::out_of_range(format!(
                    "immediate value {value} out of 8-bit range"
                )));
            }
        }
        Ok(())
    }

    /// Memory operand: indexed, direct, or extended.
    fn address(
        &mut self,
        direct: Option<u16>,
        indexed: Option<u16>,
        extended: Option<u16>,
        items: &[Rc<Node>],
    ) -> Result<(), AsmError> {
        match items {
            [offset, reg] => {
                let op = indexed.ok_or_else(|| AsmError::syntax("invalid addressing mode"))?;
                self.indexed(op, offset, reg, false)
            }
            [arg] => match &arg.value {
                Value::Array(inner) => {
                    let op = indexed.ok_or_else(|| AsmError::syntax("invalid addressing mode"))?;
                    match inner.as_slice() {
                        [offset, reg] => self.indexed(op, offset, reg, true),
                        [single] if matches!(single.value, Value::Reg(_)) => {
                            let empty = Rc::new(Node::empty());
                            self.indexed(op, &empty, single, true)
                        }
                        [single] => {
                            // [n]: extended indirect.
                            self.sections.emit_op(op);
                            self.sections.emit_imm8(0x9f);
                            match int_value(single) {
                                Some(value) => {
                                    self.sections.emit_imm16(value);
                                    if !fits_word(value) && self.report {
                                        return Err(AsmError::out_of_range(format!(
                                            "indirect address {value} out of 16-bit range"
                                        )));
                                    }
                                    Ok(())
                                }
                                None => {
                                    self.sections.emit_pad(2);
                                    self.unresolved(single)
                                }
                            }
                        }
                        _ => Err(AsmError::syntax("invalid indirect operand")),
                    }
                }
                Value::Reg(_) => Err(AsmError::syntax("invalid addressing mode")),
                _ => self.direct_or_extended(direct, extended, arg),
            },
            _ => Err(AsmError::syntax("invalid number of arguments")),
        }
    }

    /// Pick direct addressing when the target sits in the current direct
    /// page (or an 8-bit hint forces it), extended otherwise.
    fn direct_or_extended(
        &mut self,
        direct: Option<u16>,
        extended: Option<u16>,
        arg: &Rc<Node>,
    ) -> Result<(), AsmError> {
        let dp = self.sections.current().dp;
        let value = int_value(arg);
        let force_direct = arg.attr == Attr::EightBit;
        let in_page = match value {
            Some(v) => dp >= 0 && ((v as u16) >> 8) as i32 == dp,
            None => false,
        };
        if (force_direct || in_page) && direct.is_some() {
            let op = direct.expect("checked");
            self.sections.emit_op(op);
            match value {
                Some(v) => self.sections.emit_imm8(v),
                None => {
                    self.sections.emit_pad(1);
                    return self.unresolved(arg);
                }
            }
            return Ok(());
        }
        let Some(op) = extended else {
            return Err(AsmError::syntax("invalid addressing mode"));
        };
        self.sections.emit_op(op);
        match value {
            Some(v) => {
                self.sections.emit_imm16(v);
                if !fits_word(v) && self.report {
                    return Err(AsmError::out_of_range(format!(
                        "address {v} out of 16-bit range"
                    )));
                }
                Ok(())
            }
            None => {
                self.sections.emit_pad(2);
                self.unresolved(arg)
            }
        }
    }

    /// Indexed addressing: the 6809 post-byte matrix.
    fn indexed(
        &mut self,
        op: u16,
        offset: &Rc<Node>,
        reg: &Rc<Node>,
        indirect: bool,
    ) -> Result<(), AsmError> {
        let Value::Reg(base) = reg.value else {
            return Err(AsmError::syntax("invalid index register"));
        };
        let ind = if indirect { 0x10 } else { 0x00 };

        // Auto increment/decrement forms take no offset.
        if reg.attr.is_index_modifier() {
            if !matches!(offset.value, Value::Empty) {
                return Err(AsmError::syntax("offset not allowed with auto inc/dec"));
            }
            let rr = base
                .index_code()
                .ok_or_else(|| AsmError::syntax("invalid index register"))?;
            let mode = match reg.attr {
                Attr::PostInc => 0x80,
                Attr::PostInc2 => 0x81,
                Attr::PreDec => 0x82,
                Attr::PreDec2 => 0x83,
                _ => return Err(AsmError::syntax("invalid index modifier")),
            };
            if indirect && matches!(reg.attr, Attr::PostInc | Attr::PreDec) {
                return Err(AsmError::syntax("single auto inc/dec has no indirect form"));
            }
            self.sections.emit_op(op);
            self.sections.emit_imm8((mode | (rr << 5) | ind) as i64);
            return Ok(());
        }

        // Accumulator offset.
        if let Value::Reg(acc) = offset.value {
            let rr = base
                .index_code()
                .ok_or_else(|| AsmError::syntax("invalid index register"))?;
            let mode = match acc {
                RegId::B => 0x85,
                RegId::A => 0x86,
                RegId::D => 0x8b,
                _ => return Err(AsmError::syntax("invalid accumulator offset")),
            };
            self.sections.emit_op(op);
            self.sections.emit_imm8((mode | (rr << 5) | ind) as i64);
            return Ok(());
        }

        // PC-relative.
        if matches!(base, RegId::Pc | RegId::Pcr) {
            return self.indexed_pc(op, offset, base, ind);
        }

        let rr = base
            .index_code()
            .ok_or_else(|| AsmError::syntax("invalid index register"))?;
        let value = match offset.value {
            Value::Empty => {
                self.sections.emit_op(op);
                self.sections.emit_imm8((0x84 | (rr << 5) | ind) as i64);
                return Ok(());
            }
            _ => int_value(offset),
        };

        let hint = offset.attr;
        match (value, hint) {
            (Some(v), Attr::FiveBit) if !indirect => {
                self.sections.emit_op(op);
                self.sections.emit_imm8(((rr << 5) as i64) | (v & 0x1f));
                if !(-16..=15).contains(&v) && self.report {
                    return Err(AsmError::out_of_range(format!(
                        "indexed offset {v} out of 5-bit range"
                    )));
                }
            }
            (Some(v), Attr::EightBit) | (Some(v), Attr::FiveBit) => {
                // 5-bit has no indirect form; promote to 8-bit.
                self.sections.emit_op(op);
                self.sections.emit_imm8((0x88 | (rr << 5) | ind) as i64);
                self.sections.emit_imm8(v);
                if !fits_i8(v) && self.report {
                    return Err(AsmError::out_of_range(format!(
                        "indexed offset {v} out of 8-bit range"
                    )));
                }
            }
            (Some(v), Attr::SixteenBit) => {
                self.emit_indexed_16(op, rr, ind, v)?;
            }
            (Some(0), Attr::None) => {
                let mode = if indirect { 0x94 } else { 0x84 };
                self.sections.emit_op(op);
                self.sections.emit_imm8((mode | (rr << 5)) as i64);
            }
            (Some(v), _) if (-16..=15).contains(&v) && !indirect => {
                self.sections.emit_op(op);
                self.sections.emit_imm8(((rr << 5) as i64) | (v & 0x1f));
            }
            (Some(v), _) if fits_i8(v) => {
                self.sections.emit_op(op);
                self.sections.emit_imm8((0x88 | (rr << 5) | ind) as i64);
                self.sections.emit_imm8(v);
            }
            (Some(v), _) => {
                self.emit_indexed_16(op, rr, ind, v)?;
            }
            (None, _) => {
                // Unresolved: assemble the widest form.
                self.sections.emit_op(op);
                self.sections.emit_imm8((0x89 | (rr << 5) | ind) as i64);
                self.sections.emit_pad(2);
                return self.unresolved(offset);
            }
        }
        Ok(())
    }

    fn emit_indexed_16(&mut self, op: u16, rr: u8, ind: u8, v: i64) -> Result<(), AsmError> {
        self.sections.emit_op(op);
        self.sections.emit_imm8((0x89 | (rr << 5) | ind) as i64);
        self.sections.emit_imm16(v);
        if !fits_word(v) && self.report {
            return Err(AsmError::out_of_range(format!(
                "indexed offset {v} out of 16-bit range"
            )));
        }
        Ok(())
    }

    /// `n,PC` uses the literal offset; `n,PCR` computes the displacement
    /// from the address following the operand.
    fn indexed_pc(
        &mut self,
        op: u16,
        offset: &Rc<Node>,
        base: RegId,
        ind: u8,
    ) -> Result<(), AsmError> {
        self.sections.emit_op(op);
        let value = int_value(offset);
        let Some(v) = value else {
            self.sections.emit_imm8((0x8d | ind) as i64);
            self.sections.emit_pad(2);
            return self.unresolved(offset);
        };
        let postbyte_pc = self.sections.current().pc as i64;
        let (short, disp8, disp16) = if base == RegId::Pcr {
            // Operand ends at postbyte+2 for the 8-bit form, +3 for 16-bit.
            (fits_i8(v - (postbyte_pc + 2)), v - (postbyte_pc + 2), v - (postbyte_pc + 3))
        } else {
            (fits_i8(v), v, v)
        };
        let short = match offset.attr {
            Attr::EightBit | Attr::FiveBit => true,
            Attr::SixteenBit => false,
            _ => short,
        };
        if short {
            self.sections.emit_imm8((0x8c | ind) as i64);
            self.sections.emit_imm8(disp8);
            if !fits_i8(disp8) && self.report {
                return Err(AsmError::out_of_range(format!(
                    "PC-relative displacement {disp8} out of 8-bit range"
                )));
            }
        } else {
            self.sections.emit_imm8((0x8d | ind) as i64);
            self.sections.emit_imm16(disp16);
        }
        Ok(())
    }

    fn relative(&mut self, op: u16, wide: bool, items: &[Rc<Node>]) -> Result<(), AsmError> {
        let [arg] = items else {
            return Err(AsmError::syntax("invalid number of arguments"));
        };
        self.sections.emit_op(op);
        let Some(target) = int_value(arg) else {
            self.sections.emit_pad(if wide { 2 } else { 1 });
            return self.unresolved(arg);
        };
        let pc = self.sections.current().pc as i64;
        if wide {
            self.sections.emit_rel16(target);
        } else {
            let offset = target - (pc + 1);
            self.sections.emit_rel8(target);
            if !fits_i8(offset) && self.report {
                return Err(AsmError::out_of_range(format!(
                    "branch target out of range: offset {offset}"
                )));
            }
        }
        Ok(())
    }

    /// PSH/PUL register list: fold the argument registers into the
    /// post-byte bitmask.
    fn stack(&mut self, op: u16, other: RegId, items: &[Rc<Node>]) -> Result<(), AsmError> {
        if items.is_empty() {
            return Err(AsmError::syntax("register list required"));
        }
        let mut mask = 0u8;
        for item in items {
            mask |= stack_mask(item, other)?;
        }
        self.sections.emit_op(op);
        self.sections.emit_imm8(mask as i64);
        Ok(())
    }

    fn pair(&mut self, op: u16, items: &[Rc<Node>]) -> Result<(), AsmError> {
        let [a, b] = items else {
            return Err(AsmError::syntax("register pair required"));
        };
        let nibble = |node: &Rc<Node>| -> Result<u8, AsmError> {
            let Value::Reg(reg) = node.value else {
                return Err(AsmError::syntax("invalid register in pair"));
            };
            reg.pair_nibble()
                .ok_or_else(|| AsmError::syntax("invalid register in pair"))
        };
        let postbyte = (nibble(a)? << 4) | nibble(b)?;
        self.sections.emit_op(op);
        self.sections.emit_imm8(postbyte as i64);
        Ok(())
    }

    /// An unresolved operand: silent on early passes, an error once the
    /// assembler should have everything.
    fn unresolved(&mut self, node: &Rc<Node>) -> Result<(), AsmError> {
        if self.report {
            return Err(AsmError::new(
                ErrorKind::UndefinedSymbol,
                format!("unresolved operand {node}"),
            ));
        }
        Ok(())
    }
}

/// Stack bit for a register argument, accepting `|`-joined register
/// expressions as well as plain registers.
fn stack_mask(node: &Rc<Node>, other: RegId) -> Result<u8, AsmError> {
    match &node.value {
        Value::Reg(reg) => reg.stack_bit(other).ok_or_else(|| {
            AsmError::syntax(format!("invalid register {} in list", reg.name()))
        }),
        Value::Oper(Op::BitOr, args) => {
            let mut mask = 0;
            for arg in args {
                mask |= stack_mask(arg, other)?;
            }
            Ok(mask)
        }
        _ => Err(AsmError::syntax("invalid register list")),
    }
}
