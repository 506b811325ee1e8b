// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pseudo-operation handlers.

use std::io::Read;
use std::rc::Rc;

use crate::core::error::{AsmError, ErrorKind};
use crate::core::eval::args_float_to_int;
use crate::core::node::{Node, Value};
use crate::core::parser::parse_source;
use crate::core::program::{ProgLine, Program};

use super::{Assembler, LabelKind};

type Handler = fn(&mut Assembler, Option<&Rc<Node>>) -> Result<(), AsmError>;

fn args_slice(args: Option<&Rc<Node>>) -> &[Rc<Node>] {
    args.map(|node| node.array_items()).unwrap_or(&[])
}

impl Assembler {
    pub(super) fn data_op(op: &str) -> Option<Handler> {
        match op.to_ascii_uppercase().as_str() {
            // FCB is an alias of FCC.
            "FCC" | "FCB" => Some(Assembler::pseudo_fcc),
            "FDB" => Some(Assembler::pseudo_fdb),
            "RZB" => Some(Assembler::pseudo_rzb),
            "RMB" => Some(Assembler::pseudo_rmb),
            _ => None,
        }
    }

    pub(super) fn other_op(op: &str) -> Option<Handler> {
        match op.to_ascii_uppercase().as_str() {
            "PUT" => Some(Assembler::pseudo_put),
            "SETDP" => Some(Assembler::pseudo_setdp),
            "INCLUDE" => Some(Assembler::pseudo_include),
            "INCLUDEBIN" => Some(Assembler::pseudo_includebin),
            _ => None,
        }
    }

    /// EQU: bind the line's label to the argument value, resolved or not.
    pub(super) fn pseudo_equ(
        &mut self,
        line: &ProgLine,
        label: Option<&LabelKind>,
        args: Option<&Rc<Node>>,
    ) -> Result<(), AsmError> {
        let [arg] = args_slice(args) else {
            self.listing_add(-1, Vec::new(), &line.text);
            return Err(AsmError::syntax("EQU requires exactly one argument"));
        };
        self.set_label(label, Rc::clone(arg));
        let addr = match self.eval().int(arg) {
            Ok(reduced) => match reduced.value {
                Value::Int(v) => (v & 0xffff) as i32,
                _ => -1,
            },
            Err(_) => -1,
        };
        self.listing_add(addr, Vec::new(), &line.text);
        Ok(())
    }

    /// ORG: following instructions assemble to this address.
    pub(super) fn pseudo_org(
        &mut self,
        line: &ProgLine,
        label: Option<&LabelKind>,
        args: Option<&Rc<Node>>,
    ) -> Result<(), AsmError> {
        let converted = args.map(args_float_to_int);
        let [arg] = args_slice(converted.as_ref()) else {
            self.listing_add(-1, Vec::new(), &line.text);
            return Err(AsmError::syntax("ORG requires exactly one argument"));
        };
        match arg.value {
            Value::Undef => {
                self.listing_add(-1, Vec::new(), &line.text);
                Ok(())
            }
            Value::Int(v) => {
                self.sections.set_pc(v as i32);
                self.set_label(label, Rc::clone(arg));
                let addr = self.sections.current().pc & 0xffff;
                self.listing_add(addr, Vec::new(), &line.text);
                Ok(())
            }
            _ => {
                self.listing_add(-1, Vec::new(), &line.text);
                Err(AsmError::syntax("invalid argument to ORG"))
            }
        }
    }

    /// SECTION: switch sections.  The argument is a name, never a symbol
    /// value, so it comes from the raw argument tree.
    pub(super) fn pseudo_section(&mut self, line: &ProgLine) -> Result<(), AsmError> {
        let raw = line.args.as_ref();
        let [arg] = args_slice(raw) else {
            return Err(AsmError::syntax("SECTION requires exactly one argument"));
        };
        let Some(name) = self.eval().string(arg)? else {
            return Err(AsmError::syntax("invalid argument to SECTION"));
        };
        let pass = self.pass;
        self.sections.set(&name, pass);
        Ok(())
    }

    /// PUT: place following code at a different physical address while
    /// assembling for the same logical one.
    fn pseudo_put(&mut self, args: Option<&Rc<Node>>) -> Result<(), AsmError> {
        let converted = args.map(args_float_to_int);
        let [arg] = args_slice(converted.as_ref()) else {
            return Err(AsmError::syntax("PUT requires exactly one argument"));
        };
        match arg.value {
            Value::Undef => Ok(()),
            Value::Int(v) => {
                self.sections.set_put(v as i32);
                Ok(())
            }
            _ => Err(AsmError::syntax("invalid argument to PUT")),
        }
    }

    /// SETDP: set the assumed direct page.  Negative means no valid page.
    fn pseudo_setdp(&mut self, args: Option<&Rc<Node>>) -> Result<(), AsmError> {
        let converted = args.map(args_float_to_int);
        let [arg] = args_slice(converted.as_ref()) else {
            return Err(AsmError::syntax("SETDP requires exactly one argument"));
        };
        match arg.value {
            Value::Undef => {
                self.sections.current_mut().dp = -1;
                Ok(())
            }
            Value::Int(v) => {
                self.sections.current_mut().dp = if v >= 0 { (v & 0xff) as i32 } else { -1 };
                Ok(())
            }
            _ => Err(AsmError::syntax("invalid argument to SETDP")),
        }
    }

    /// EXPORT: flag symbols for the symbol file.  Names are taken from the
    /// raw argument tree, not evaluated as values.
    pub(super) fn pseudo_export(&mut self, line: &ProgLine) -> Result<(), AsmError> {
        let raw = line.args.as_ref();
        let items = args_slice(raw);
        if items.is_empty() {
            return Err(AsmError::syntax("EXPORT requires one or more arguments"));
        }
        let mut names = Vec::new();
        for item in items {
            if let Some(name) = self.eval().string(item)? {
                names.push(name);
            }
        }
        for name in names {
            self.symbols.export(&name);
        }
        Ok(())
    }

    /// FCC/FCB: embed byte and string constants.
    fn pseudo_fcc(&mut self, args: Option<&Rc<Node>>) -> Result<(), AsmError> {
        let converted = args.map(args_float_to_int);
        let items = args_slice(converted.as_ref());
        if items.is_empty() {
            return Ok(());
        }
        for item in items {
            match &item.value {
                Value::Undef => self.sections.emit_pad(1),
                Value::Empty => self.sections.emit_imm8(0),
                Value::Int(v) => self.sections.emit_imm8(*v),
                Value::Str(s) => {
                    for byte in s.bytes() {
                        self.sections.emit_imm8(byte as i64);
                    }
                }
                _ => return Err(AsmError::syntax("invalid argument to FCB/FCC")),
            }
        }
        Ok(())
    }

    /// FDB: embed 16-bit constants, big-endian.
    fn pseudo_fdb(&mut self, args: Option<&Rc<Node>>) -> Result<(), AsmError> {
        let converted = args.map(args_float_to_int);
        let items = args_slice(converted.as_ref());
        if items.is_empty() {
            return Ok(());
        }
        for item in items {
            match item.value {
                Value::Undef => self.sections.emit_pad(2),
                Value::Empty => self.sections.emit_imm16(0),
                Value::Int(v) => self.sections.emit_imm16(v),
                _ => return Err(AsmError::syntax("invalid argument to FDB")),
            }
        }
        Ok(())
    }

    /// RZB: emit N zero bytes.
    fn pseudo_rzb(&mut self, args: Option<&Rc<Node>>) -> Result<(), AsmError> {
        let converted = args.map(args_float_to_int);
        let [arg] = args_slice(converted.as_ref()) else {
            return Err(AsmError::syntax("RZB requires exactly one argument"));
        };
        match arg.value {
            Value::Undef => Ok(()),
            Value::Int(v) if v < 0 => Err(AsmError::out_of_range("negative argument to RZB")),
            Value::Int(v) => {
                self.sections.emit_pad(v as usize);
                Ok(())
            }
            _ => Err(AsmError::syntax("invalid argument to RZB")),
        }
    }

    /// RMB: advance the PC without emitting.
    fn pseudo_rmb(&mut self, args: Option<&Rc<Node>>) -> Result<(), AsmError> {
        let converted = args.map(args_float_to_int);
        let [arg] = args_slice(converted.as_ref()) else {
            return Err(AsmError::syntax("RMB requires exactly one argument"));
        };
        match arg.value {
            Value::Undef => Ok(()),
            Value::Int(v) if v < 0 => Err(AsmError::out_of_range("negative argument to RMB")),
            Value::Int(v) => {
                self.sections.advance_pc(v as i32);
                Ok(())
            }
            _ => Err(AsmError::syntax("invalid argument to RMB")),
        }
    }

    /// INCLUDE: assemble another file in place at the current pass.  Files
    /// parse once and are cached so line numbering stays identical across
    /// passes.
    fn pseudo_include(&mut self, args: Option<&Rc<Node>>) -> Result<(), AsmError> {
        let [arg] = args_slice(args) else {
            return Err(AsmError::syntax("INCLUDE requires a filename"));
        };
        let Value::Str(name) = &arg.value else {
            return Err(AsmError::syntax("invalid argument to INCLUDE"));
        };
        let path = self.source_dir.join(name);
        if !self.files.contains_key(&path) {
            let text = std::fs::read_to_string(&path).map_err(|_| {
                AsmError::new(
                    ErrorKind::FileNotFound,
                    format!("file not found: {}", path.display()),
                )
            })?;
            let (prog, parse_diags) = parse_source(name, &text);
            self.parse_diagnostics.extend(parse_diags);
            self.files.insert(path.clone(), Rc::new(prog));
        }
        let prog = Rc::clone(self.files.get(&path).expect("just cached"));
        self.assemble_prog(&prog)
    }

    /// INCLUDEBIN: emit the bytes of a binary file in place.
    fn pseudo_includebin(&mut self, args: Option<&Rc<Node>>) -> Result<(), AsmError> {
        let [arg] = args_slice(args) else {
            return Err(AsmError::syntax("INCLUDEBIN requires a filename"));
        };
        let Value::Str(name) = &arg.value else {
            return Err(AsmError::syntax("invalid argument to INCLUDEBIN"));
        };
        let path = self.source_dir.join(name);
        let mut file = std::fs::File::open(&path).map_err(|_| {
            AsmError::new(
                ErrorKind::FileNotFound,
                format!("file not found: {}", path.display()),
            )
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|err| AsmError::fatal(format!("read error: {err}")))?;
        for byte in bytes {
            self.sections.emit_imm8(byte as i64);
        }
        Ok(())
    }

    /// MACRO: start capturing a named body.  The name comes from the label
    /// or from a single argument, never both.
    pub(super) fn pseudo_macro(&mut self, line: &ProgLine) -> Result<(), AsmError> {
        let raw = line.args.as_ref();
        let items = args_slice(raw);
        let name = if items.len() == 1 && line.label.is_none() {
            self.eval().string(&items[0])?
        } else if items.is_empty() {
            match &line.label {
                Some(node) => self.eval().string(node)?,
                None => None,
            }
        } else {
            None
        };
        let Some(name) = name else {
            return Err(AsmError::syntax(
                "macro name must either be label OR argument",
            ));
        };
        let pass = self.pass;
        if let Some(existing) = self.macros.get_mut(&name.to_ascii_uppercase()) {
            if existing.pass == pass {
                return Err(AsmError::syntax(format!("macro '{name}' redefined")));
            }
            // Known from an earlier pass: keep the first definition
            // encountered this pass, skip the body.
            existing.pass = pass;
            return Ok(());
        }
        self.macro_body = Some((name, Vec::new()));
        Ok(())
    }

    /// ENDM: finish the capture.  An argument, when present, must at least
    /// be a name.
    pub(super) fn pseudo_endm(&mut self, line: &ProgLine) -> Result<(), AsmError> {
        let raw = line.args.as_ref();
        let items = args_slice(raw);
        if items.len() > 1 {
            return Err(AsmError::syntax("invalid number of arguments to ENDM"));
        }
        if let [arg] = items {
            if self.eval().string(arg)?.is_none() {
                return Err(AsmError::syntax("invalid argument to ENDM"));
            }
        }
        let Some((name, body)) = self.macro_body.take() else {
            return Ok(());
        };
        let mut prog = Program::new(&name);
        prog.lines = body;
        self.macros.insert(
            name.to_ascii_uppercase(),
            super::MacroDef {
                pass: self.pass,
                prog: Rc::new(prog),
            },
        );
        Ok(())
    }
}
