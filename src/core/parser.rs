// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Line parser: splits a source line into label, opcode and argument
//! fields and builds the argument AST.
//!
//! A label starts in column one and may end with `:`.  The opcode is the
//! next word; everything after it up to a `;` comment is the argument
//! list.  Lines whose first column holds `*` or `;` are comments.

use std::rc::Rc;

use crate::core::error::{AsmError, Diagnostic};
use crate::core::node::{Attr, Node, Op, Value};
use crate::core::program::{ProgLine, Program};
use crate::core::scanner::{scan_name, IdPart, Lexer, Token};
use crate::m6809::registers::RegId;

/// Parse a whole source text.  Lines that fail to parse become blank lines
/// (keeping line positions stable) and are reported as diagnostics.
pub fn parse_source(name: &str, text: &str) -> (Program, Vec<Diagnostic>) {
    let mut prog = Program::new(name);
    let mut diagnostics = Vec::new();
    for (ix, line_text) in text.lines().enumerate() {
        let line = ix as u32 + 1;
        match parse_line(line_text, line) {
            Ok(parsed) => prog.lines.push(Rc::new(parsed)),
            Err(err) => {
                diagnostics.push(Diagnostic::new(name, line, line_text, err));
                prog.lines.push(Rc::new(ProgLine {
                    label: None,
                    opcode: None,
                    args: None,
                    text: line_text.to_string(),
                    line,
                }));
            }
        }
    }
    (prog, diagnostics)
}

pub fn parse_line(text: &str, line: u32) -> Result<ProgLine, AsmError> {
    let bytes = text.as_bytes();
    let blank = ProgLine {
        label: None,
        opcode: None,
        args: None,
        text: text.to_string(),
        line,
    };
    let first = bytes.first().copied().unwrap_or(0);
    if first == b'*' || first == b';' {
        return Ok(blank);
    }
    if !text.is_ascii() {
        return Err(AsmError::syntax("non-ASCII source line"));
    }

    let mut cursor = 0;
    let mut label = None;
    if first != 0 && first != b' ' && first != b'\t' {
        let start = cursor;
        while cursor < bytes.len() && !matches!(bytes[cursor], b' ' | b'\t' | b':' | b';') {
            cursor += 1;
        }
        let field = &text[start..cursor];
        if cursor < bytes.len() && bytes[cursor] == b':' {
            cursor += 1;
        }
        label = Some(Rc::new(name_node(field)?));
    }

    while cursor < bytes.len() && matches!(bytes[cursor], b' ' | b'\t') {
        cursor += 1;
    }
    let mut opcode = None;
    if cursor < bytes.len() && bytes[cursor] != b';' {
        let start = cursor;
        while cursor < bytes.len() && !matches!(bytes[cursor], b' ' | b'\t' | b';') {
            cursor += 1;
        }
        opcode = Some(Rc::new(name_node(&text[start..cursor])?));
    }

    while cursor < bytes.len() && matches!(bytes[cursor], b' ' | b'\t') {
        cursor += 1;
    }
    let mut args = None;
    if cursor < bytes.len() && bytes[cursor] != b';' {
        let tokens = Lexer::new(&text[cursor..]).tokens()?;
        if !tokens.is_empty() {
            let mut stream = TokenStream { tokens, pos: 0 };
            let parsed = stream.parse_args(false)?;
            if stream.pos < stream.tokens.len() {
                return Err(AsmError::syntax("trailing junk after arguments"));
            }
            args = Some(Rc::new(parsed));
        }
    }

    if label.is_none() && opcode.is_none() && args.is_none() {
        return Ok(blank);
    }
    Ok(ProgLine {
        label,
        opcode,
        args,
        text: text.to_string(),
        line,
    })
}

/// Build a node for a label or opcode field: a numeric local label, a plain
/// name, or an interpolated identifier.
fn name_node(field: &str) -> Result<Node, AsmError> {
    if field.is_empty() {
        return Err(AsmError::syntax("empty name"));
    }
    if field.bytes().all(|c| c.is_ascii_digit()) {
        let value: i64 = field
            .parse()
            .map_err(|_| AsmError::syntax("invalid local label"))?;
        return Ok(Node::int(value));
    }
    let mut lexer = Lexer::new(field);
    let token = scan_name(&mut lexer)?;
    if !lexer.at_end() {
        return Err(AsmError::syntax(format!("invalid name '{field}'")));
    }
    Ok(token_name_node(token))
}

fn token_name_node(token: Token) -> Node {
    match token {
        Token::Ident(name) => Node::string(name),
        Token::Interp(index) => Node::new(Value::Interp(index)),
        Token::IdParts(parts) => Node::new(Value::Id(id_part_nodes(parts))),
        _ => Node::undef(),
    }
}

fn id_part_nodes(parts: Vec<IdPart>) -> Vec<Rc<Node>> {
    parts
        .into_iter()
        .map(|part| {
            Rc::new(match part {
                IdPart::Text(text) => Node::string(text),
                IdPart::Interp(index) => Node::new(Value::Interp(index)),
            })
        })
        .collect()
}

/// Split a string literal into text fragments and `&N` interpolations.
fn text_node(content: &str) -> Node {
    let bytes = content.as_bytes();
    let mut parts = Vec::new();
    let mut fragment = String::new();
    let mut ix = 0;
    while ix < bytes.len() {
        if bytes[ix] == b'&' && ix + 1 < bytes.len() && bytes[ix + 1].is_ascii_digit() {
            if !fragment.is_empty() {
                parts.push(Rc::new(Node::string(std::mem::take(&mut fragment))));
            }
            ix += 1;
            let start = ix;
            while ix < bytes.len() && bytes[ix].is_ascii_digit() {
                ix += 1;
            }
            let index: i64 = content[start..ix].parse().unwrap_or(0);
            parts.push(Rc::new(Node::new(Value::Interp(index))));
        } else {
            fragment.push(bytes[ix] as char);
            ix += 1;
        }
    }
    if !fragment.is_empty() {
        parts.push(Rc::new(Node::string(fragment)));
    }
    Node::new(Value::Text(parts))
}

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// True at a point where an argument ends: a comma, the closing bracket
    /// of an indirect form, or the end of the line.
    fn at_arg_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Comma) | Some(Token::RBracket))
    }

    fn at_arg_end_from(&self, offset: usize) -> bool {
        matches!(
            self.peek_at(offset),
            None | Some(Token::Comma) | Some(Token::RBracket)
        )
    }

    fn parse_args(&mut self, indirect: bool) -> Result<Node, AsmError> {
        let mut items = Vec::new();
        loop {
            items.push(Rc::new(self.parse_arg()?));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        if indirect {
            if !self.eat(&Token::RBracket) {
                return Err(AsmError::syntax("missing ']'"));
            }
        }
        Ok(Node::array(items))
    }

    fn parse_arg(&mut self) -> Result<Node, AsmError> {
        if self.at_arg_end() {
            return Ok(Node::empty());
        }
        if self.eat(&Token::Hash) {
            let expr = self.parse_hinted_expr()?;
            return Ok(expr.with_attr(Attr::Immediate));
        }
        if self.eat(&Token::LBracket) {
            return self.parse_args(true);
        }
        if let Some(reg) = self.try_parse_reg_operand()? {
            return Ok(reg);
        }
        self.parse_hinted_expr()
    }

    /// Index-register operand forms: `R`, `R+`, `R++`, `-R`, `--R`.  Only
    /// recognized when the register fills the whole argument, so `-x` in an
    /// expression stays arithmetic negation.
    fn try_parse_reg_operand(&mut self) -> Result<Option<Node>, AsmError> {
        let (decrement, offset) = match self.peek() {
            Some(Token::Minus) => (Some(Attr::PreDec), 1),
            Some(Token::MinusMinus) => (Some(Attr::PreDec2), 1),
            _ => (None, 0),
        };
        let Some(Token::Ident(name)) = self.peek_at(offset) else {
            return Ok(None);
        };
        let Some(reg) = RegId::from_name(name) else {
            return Ok(None);
        };
        if let Some(attr) = decrement {
            if !self.at_arg_end_from(offset + 1) {
                return Ok(None);
            }
            self.pos += offset + 1;
            return Ok(Some(Node::reg(reg).with_attr(attr)));
        }
        match self.peek_at(1) {
            Some(Token::Plus) if self.at_arg_end_from(2) => {
                self.pos += 2;
                Ok(Some(Node::reg(reg).with_attr(Attr::PostInc)))
            }
            Some(Token::PlusPlus) if self.at_arg_end_from(2) => {
                self.pos += 2;
                Ok(Some(Node::reg(reg).with_attr(Attr::PostInc2)))
            }
            _ if self.at_arg_end_from(1) => {
                self.pos += 1;
                Ok(Some(Node::reg(reg)))
            }
            _ => Ok(None),
        }
    }

    fn parse_hinted_expr(&mut self) -> Result<Node, AsmError> {
        let hint = match self.peek() {
            Some(Token::LtLt) => Some(Attr::FiveBit),
            Some(Token::Lt) => Some(Attr::EightBit),
            Some(Token::Gt) => Some(Attr::SixteenBit),
            _ => None,
        };
        if let Some(attr) = hint {
            self.pos += 1;
            if let Some(reg) = self.try_parse_reg_operand()? {
                return Ok(reg.with_attr(attr));
            }
            return Ok(self.parse_expr()?.with_attr(attr));
        }
        self.parse_expr()
    }

    fn parse_expr(&mut self) -> Result<Node, AsmError> {
        self.parse_binary(0)
    }

    /// Precedence climbing over the binary operator tiers.
    fn parse_binary(&mut self, level: usize) -> Result<Node, AsmError> {
        const TIERS: &[&[(Token, Op)]] = &[
            &[(Token::Pipe, Op::BitOr)],
            &[(Token::Caret, Op::BitXor)],
            &[(Token::Amp, Op::BitAnd)],
            &[(Token::LtLt, Op::Shl), (Token::GtGt, Op::Shr)],
            &[(Token::Plus, Op::Add), (Token::Minus, Op::Sub)],
            &[(Token::Star, Op::Mul), (Token::Slash, Op::Div)],
        ];
        if level >= TIERS.len() {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(level + 1)?;
        'outer: loop {
            for (token, op) in TIERS[level] {
                if self.peek() == Some(token) {
                    self.pos += 1;
                    let rhs = self.parse_binary(level + 1)?;
                    lhs = Node::oper2(*op, Rc::new(lhs), Rc::new(rhs));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Node, AsmError> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(Op::Neg),
            Some(Token::Plus) => Some(Op::Pos),
            Some(Token::Tilde) => Some(Op::Com),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Node::oper1(op, Rc::new(operand)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Node, AsmError> {
        let Some(token) = self.next() else {
            return Err(AsmError::syntax("missing expression"));
        };
        match token {
            Token::Int(v) => Ok(Node::int(v)),
            Token::Float(v) => Ok(Node::float(v)),
            Token::Str(s) => Ok(text_node(&s)),
            Token::Interp(index) => Ok(Node::new(Value::Interp(index))),
            Token::BackRef(name) => Ok(Node::new(Value::BackRef(name))),
            Token::FwdRef(name) => Ok(Node::new(Value::FwdRef(name))),
            Token::Star => Ok(Node::new(Value::Pc)),
            Token::Ident(name) => match RegId::from_name(&name) {
                Some(reg) => Ok(Node::reg(reg)),
                None => Ok(Node::string(name)),
            },
            Token::IdParts(parts) => Ok(Node::new(Value::Id(id_part_nodes(parts)))),
            Token::LParen => {
                let inner = self.parse_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(AsmError::syntax("missing ')'"));
                }
                Ok(inner)
            }
            other => Err(AsmError::syntax(format!(
                "unexpected token {other:?} in expression"
            ))),
        }
    }
}
