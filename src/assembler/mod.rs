// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The assembly driver: line dispatch, macro capture, and the pass loop.

pub mod cli;
mod directives;
pub mod listing;
pub mod output;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::core::error::{AsmError, AsmRunError, Diagnostic, ErrorKind};
use crate::core::eval::{args_float_to_int, Eval};
use crate::core::interp::InterpStack;
use crate::core::node::{Node, Value};
use crate::core::parser::parse_source;
use crate::core::program::{ProgLine, Program};
use crate::core::section::Sections;
use crate::core::symbols::SymbolTable;
use crate::m6809::instr::Encoder;
use crate::m6809::opcodes;

/// Passes stop once sizes repeat; oscillation past this bound is fatal.
const MAX_PASSES: u32 = 4;

#[derive(Debug, Clone)]
pub struct Config {
    pub max_program_depth: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_program_depth: 128,
        }
    }
}

/// One line of the final-pass listing.  `addr` is -1 when the line has no
/// address.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub addr: i32,
    pub bytes: Vec<u8>,
    pub text: String,
}

/// Result of a successful assembly.
pub struct AsmOutput {
    /// Placement address of the first byte of the padded image.
    pub origin: u16,
    /// Zero-padded flat image.
    pub image: Vec<u8>,
    /// Disjoint output runs, for segmented formats.
    pub runs: Vec<(u16, Vec<u8>)>,
    /// Exported `(name, value)` pairs, sorted by name.
    pub exports: Vec<(String, i64)>,
    pub listing: Vec<ListingEntry>,
}

enum LabelKind {
    Num(i64),
    Name(String),
}

/// A defined macro: its body and the pass it was (re-)encountered in, for
/// the per-pass redefinition rules.
struct MacroDef {
    pass: u32,
    prog: Rc<Program>,
}

pub struct Assembler {
    config: Config,
    sections: Sections,
    symbols: SymbolTable,
    interp: InterpStack,
    /// Macro name (uppercased) to captured body.
    macros: HashMap<String, MacroDef>,
    /// Parsed include files, keyed by resolved path.
    files: HashMap<PathBuf, Rc<Program>>,
    pass: u32,
    /// Report range/resolution errors (past the first pass).
    report: bool,
    prog_depth: u32,
    /// MACRO/ENDM nesting depth; only the outermost pair opens and closes a
    /// definition.
    macro_depth: u32,
    macro_body: Option<(String, Vec<Rc<ProgLine>>)>,
    diagnostics: Vec<Diagnostic>,
    /// Parse-time diagnostics, reported once regardless of pass count.
    parse_diagnostics: Vec<Diagnostic>,
    listing: Vec<ListingEntry>,
    /// Per-line emitted sizes, compared across passes for convergence.
    sizes: Vec<i32>,
    source_dir: PathBuf,
    cur_file: String,
}

impl Assembler {
    pub fn new(config: Config) -> Assembler {
        Assembler {
            config,
            sections: Sections::new(),
            symbols: SymbolTable::new(),
            interp: InterpStack::new(),
            macros: HashMap::new(),
            files: HashMap::new(),
            pass: 0,
            report: false,
            prog_depth: 0,
            macro_depth: 0,
            macro_body: None,
            diagnostics: Vec::new(),
            parse_diagnostics: Vec::new(),
            listing: Vec::new(),
            sizes: Vec::new(),
            source_dir: PathBuf::new(),
            cur_file: String::new(),
        }
    }

    pub fn assemble_file(&mut self, path: &Path) -> Result<AsmOutput, AsmRunError> {
        let text = std::fs::read_to_string(path).map_err(|_| {
            AsmRunError::new(
                AsmError::new(
                    ErrorKind::FileNotFound,
                    format!("file not found: {}", path.display()),
                ),
                Vec::new(),
            )
        })?;
        self.source_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.assemble_source(&path.display().to_string(), &text)
    }

    pub fn assemble_source(&mut self, name: &str, text: &str) -> Result<AsmOutput, AsmRunError> {
        let (prog, parse_diags) = parse_source(name, text);
        self.parse_diagnostics.extend(parse_diags);
        let prog = Rc::new(prog);

        let mut prev_sizes: Vec<i32> = Vec::new();
        let mut pass = 1;
        loop {
            self.begin_pass(pass);
            if let Err(err) = self.assemble_prog(&prog) {
                return Err(self.run_error(err));
            }
            let sizes = std::mem::take(&mut self.sizes);
            if pass >= 2 && sizes == prev_sizes {
                break;
            }
            if pass >= MAX_PASSES {
                return Err(
                    self.run_error(AsmError::fatal("instruction sizes failed to converge"))
                );
            }
            prev_sizes = sizes;
            pass += 1;
        }

        let exports = self.collect_exports(name);
        if !self.diagnostics.is_empty() || !self.parse_diagnostics.is_empty() {
            return Err(self.run_error(AsmError::syntax(
                "errors detected in source; output suppressed",
            )));
        }

        let padded = self.sections.coalesce_all(true);
        let (origin, image) = match padded.spans.first() {
            Some(span) => (span.put as u16, span.data.clone()),
            None => (0, Vec::new()),
        };
        let runs = self
            .sections
            .coalesce_all(false)
            .spans
            .into_iter()
            .map(|span| (span.put as u16, span.data))
            .collect();
        Ok(AsmOutput {
            origin,
            image,
            runs,
            exports,
            listing: std::mem::take(&mut self.listing),
        })
    }

    fn run_error(&mut self, error: AsmError) -> AsmRunError {
        let mut diagnostics = std::mem::take(&mut self.parse_diagnostics);
        diagnostics.append(&mut self.diagnostics);
        diagnostics.sort_by(|a, b| (a.file.as_str(), a.line).cmp(&(b.file.as_str(), b.line)));
        AsmRunError::new(error, diagnostics)
    }

    fn begin_pass(&mut self, pass: u32) {
        self.pass = pass;
        self.report = pass > 1;
        // Symbols persist across passes so forward references resolve from
        // the previous pass's values; only section data is rebuilt.
        self.sections.begin_pass();
        self.sections.set("", pass);
        self.interp.clear();
        self.macro_depth = 0;
        self.macro_body = None;
        self.prog_depth = 0;
        self.diagnostics.clear();
        self.listing.clear();
        self.sizes.clear();
    }

    fn assemble_prog(&mut self, prog: &Program) -> Result<(), AsmError> {
        if self.prog_depth >= self.config.max_program_depth {
            return Err(AsmError::fatal("maximum program depth exceeded"));
        }
        self.prog_depth += 1;
        let saved_file = std::mem::replace(&mut self.cur_file, prog.name.clone());
        for line in &prog.lines {
            self.assemble_line(line)?;
        }
        self.cur_file = saved_file;
        self.prog_depth -= 1;
        Ok(())
    }

    fn eval(&self) -> Eval<'_> {
        Eval {
            section: self.sections.current(),
            symbols: &self.symbols,
            interp: &self.interp,
        }
    }

    fn error(&mut self, line: &ProgLine, err: AsmError) {
        self.diagnostics.push(Diagnostic::new(
            self.cur_file.clone(),
            line.line,
            line.text.clone(),
            err,
        ));
    }

    fn listing_add(&mut self, addr: i32, bytes: Vec<u8>, text: &str) {
        self.listing.push(ListingEntry {
            addr,
            bytes,
            text: text.to_string(),
        });
    }

    fn assemble_line(&mut self, line: &Rc<ProgLine>) -> Result<(), AsmError> {
        self.sections.current_mut().line_number += 1;

        if line.is_blank() {
            self.listing_add(-1, Vec::new(), &line.text);
            return Ok(());
        }

        let opcode_str = match &line.opcode {
            Some(node) => match self.eval().string(node) {
                Ok(name) => name,
                Err(err) => {
                    self.error(line, err);
                    self.listing_add(-1, Vec::new(), &line.text);
                    return Ok(());
                }
            },
            None => None,
        };
        let opcode_is = |name: &str| {
            opcode_str
                .as_deref()
                .map_or(false, |op| op.eq_ignore_ascii_case(name))
        };

        // Macro definition state machine: only the outermost MACRO/ENDM
        // pair opens and closes the capture.
        if opcode_is("macro") {
            self.macro_depth += 1;
            if self.macro_depth == 1 {
                if let Err(err) = self.pseudo_macro(line) {
                    self.error(line, err);
                }
                self.listing_add(-1, Vec::new(), &line.text);
                return Ok(());
            }
        } else if opcode_is("endm") {
            if self.macro_depth == 0 {
                self.error(line, AsmError::syntax("ENDM without beginning MACRO"));
                self.listing_add(-1, Vec::new(), &line.text);
                return Ok(());
            }
            self.macro_depth -= 1;
            if self.macro_depth == 0 {
                if let Err(err) = self.pseudo_endm(line) {
                    self.error(line, err);
                }
                self.listing_add(-1, Vec::new(), &line.text);
                return Ok(());
            }
        }
        if self.macro_depth > 0 {
            if let Some((_, body)) = &mut self.macro_body {
                body.push(Rc::clone(line));
            }
            self.listing_add(-1, Vec::new(), &line.text);
            return Ok(());
        }

        // EXPORT and SECTION want symbol names, not their values.
        if opcode_is("export") {
            if let Err(err) = self.pseudo_export(line) {
                self.error(line, err);
            }
            self.listing_add(-1, Vec::new(), &line.text);
            return Ok(());
        }

        let label = match self.eval_label(line) {
            Ok(label) => label,
            Err(err) => {
                self.error(line, err);
                None
            }
        };

        // Anything else needs a fully evaluated argument list.
        let args = match &line.args {
            Some(node) => match self.eval().node(node) {
                Ok(args) => Some(args),
                Err(err) => {
                    self.error(line, err);
                    self.listing_add(-1, Vec::new(), &line.text);
                    return Ok(());
                }
            },
            None => None,
        };

        // Pseudo-ops which determine the label's value themselves.
        if opcode_is("equ") {
            if let Err(err) = self.pseudo_equ(line, label.as_ref(), args.as_ref()) {
                self.error(line, err);
            }
            return Ok(());
        }
        if opcode_is("org") {
            if let Err(err) = self.pseudo_org(line, label.as_ref(), args.as_ref()) {
                self.error(line, err);
            }
            return Ok(());
        }
        if opcode_is("section") {
            if let Err(err) = self.pseudo_section(line) {
                self.error(line, err);
            }
            self.listing_add(-1, Vec::new(), &line.text);
            return Ok(());
        }

        // Otherwise any label on the line gets the current PC.
        if label.is_some() {
            let pc = self.sections.current().pc;
            self.set_label(label.as_ref(), Rc::new(Node::int(pc as i64)));
        }

        let Some(op) = opcode_str.as_deref() else {
            let addr = if label.is_some() {
                self.sections.current().pc & 0xffff
            } else {
                -1
            };
            self.listing_add(addr, Vec::new(), &line.text);
            return Ok(());
        };

        // Data-emitting pseudo-ops.
        if let Some(handler) = Self::data_op(op) {
            let old_pc = self.sections.current().pc;
            self.sections.clear_trace();
            if let Err(err) = handler(self, args.as_ref()) {
                self.error(line, err);
            }
            let nbytes = self.sections.current().pc - old_pc;
            self.sizes.push(nbytes);
            let bytes = self.sections.take_trace();
            self.listing_add(old_pc & 0xffff, bytes, &line.text);
            return Ok(());
        }

        // Other pseudo-ops.
        if let Some(handler) = Self::other_op(op) {
            self.listing_add(-1, Vec::new(), &line.text);
            if let Err(err) = handler(self, args.as_ref()) {
                if err.kind().is_fatal() {
                    return Err(err);
                }
                self.error(line, err);
            }
            return Ok(());
        }

        // Macro expansion.  A macro takes precedence over an instruction of
        // the same name.
        if let Some(macro_prog) = self
            .macros
            .get(&op.to_ascii_uppercase())
            .map(|def| Rc::clone(&def.prog))
        {
            let addr = self.sections.current().pc & 0xffff;
            self.listing_add(addr, Vec::new(), &line.text);
            let frame = args.unwrap_or_else(|| Rc::new(Node::undef()));
            self.interp.push(frame);
            let result = self.assemble_prog(&macro_prog);
            self.interp.pop();
            return result;
        }

        // Real instructions.
        if let Some(entry) = opcodes::lookup(op) {
            let old_pc = self.sections.current().pc;
            self.sections.clear_trace();
            let args = args.as_ref().map(args_float_to_int);
            let mut encoder = Encoder {
                sections: &mut self.sections,
                report: self.report,
            };
            if let Err(err) = encoder.encode(entry, args.as_ref()) {
                self.error(line, err);
            }
            let nbytes = self.sections.current().pc - old_pc;
            self.sizes.push(nbytes);
            let bytes = self.sections.take_trace();
            self.listing_add(old_pc & 0xffff, bytes, &line.text);
            return Ok(());
        }

        self.error(line, AsmError::syntax(format!("unknown instruction '{op}'")));
        self.listing_add(-1, Vec::new(), &line.text);
        Ok(())
    }

    /// A label is an integer local label when its text is all digits, a
    /// named symbol otherwise.
    fn eval_label(&self, line: &ProgLine) -> Result<Option<LabelKind>, AsmError> {
        let Some(node) = &line.label else {
            return Ok(None);
        };
        if let Value::Int(v) = node.value {
            return Ok(Some(LabelKind::Num(v)));
        }
        match self.eval().string(node)? {
            Some(text) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
                let value = text
                    .parse()
                    .map_err(|_| AsmError::syntax("invalid local label"))?;
                Ok(Some(LabelKind::Num(value)))
            }
            Some(text) => Ok(Some(LabelKind::Name(text))),
            None => Err(AsmError::syntax("invalid label type")),
        }
    }

    fn set_label(&mut self, label: Option<&LabelKind>, value: Rc<Node>) {
        match label {
            None => {}
            Some(LabelKind::Num(name)) => {
                let line_number = self.sections.current().line_number;
                self.sections
                    .current_mut()
                    .local_labels
                    .set(*name, line_number, value);
            }
            Some(LabelKind::Name(name)) => {
                self.symbols.set(name, value, self.pass);
            }
        }
    }

    fn collect_exports(&mut self, source: &str) -> Vec<(String, i64)> {
        let mut exports = Vec::new();
        let mut missing = Vec::new();
        for name in self.symbols.exports() {
            let stored = self.symbols.get(name);
            let value = stored.and_then(|node| match self.eval().int(&node) {
                Ok(reduced) => match reduced.value {
                    Value::Int(v) => Some(v),
                    _ => None,
                },
                Err(_) => None,
            });
            match value {
                Some(v) => exports.push((name.to_string(), v)),
                None => missing.push(name.to_string()),
            }
        }
        for name in missing {
            self.diagnostics.push(Diagnostic::new(
                source,
                0,
                "",
                AsmError::new(
                    ErrorKind::UndefinedSymbol,
                    format!("exported symbol '{name}' is undefined"),
                ),
            ));
        }
        exports
    }
}

impl Default for Assembler {
    fn default() -> Assembler {
        Assembler::new(Config::default())
    }
}
