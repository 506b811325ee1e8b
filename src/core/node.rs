// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Tagged expression AST shared by the parser, evaluator, and encoders.
//!
//! A node pairs a value variant with an orthogonal attribute.  Children of
//! compound variants are shared immutable handles; the tree is a DAG at
//! worst, so drop-on-last-owner replaces the manual reference counting of
//! the ancestry this model comes from.

use std::fmt;
use std::rc::Rc;

use crate::m6809::registers::RegId;

/// Node attribute: at most one per node, orthogonal to the value.
///
/// Size hints come from the `<<`, `<` and `>` operand prefixes, `Immediate`
/// from `#`, and the remaining variants from indexed-mode auto inc/dec
/// modifiers on an index register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    None,
    FiveBit,
    EightBit,
    SixteenBit,
    Immediate,
    PostInc,
    PostInc2,
    PreDec,
    PreDec2,
    PostDec,
}

impl Attr {
    /// True for the index-register modifier attributes, which survive
    /// attribute overwrites with `None`.
    pub fn is_index_modifier(self) -> bool {
        matches!(
            self,
            Attr::PostInc | Attr::PostInc2 | Attr::PreDec | Attr::PreDec2 | Attr::PostDec
        )
    }
}

/// Operator carried by `Value::Oper`.  Arity is the child count: `Neg`,
/// `Com` and `Pos` are unary, the rest binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Neg,
    Com,
    Pos,
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Add | Op::Pos => "+",
            Op::Sub | Op::Neg => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::BitAnd => "&",
            Op::BitOr => "|",
            Op::BitXor => "^",
            Op::Shl => "<<",
            Op::Shr => ">>",
            Op::Com => "~",
        }
    }
}

/// The value variants of a node.
#[derive(Debug, Clone)]
pub enum Value {
    /// Unresolved: missing input or a symbol unknown on this pass.
    Undef,
    /// Explicit empty argument slot.
    Empty,
    Int(i64),
    Float(f64),
    Reg(RegId),
    /// Identifier name or evaluated string.
    Str(String),
    /// `&N` macro-argument interpolation, resolved at expansion time.
    Interp(i64),
    /// `*`: the current program counter.
    Pc,
    /// `NB`: nearest preceding local label N.
    BackRef(i64),
    /// `NF`: nearest following local label N.
    FwdRef(i64),
    /// Identifier concatenated from fragments and interpolations.
    Id(Vec<Rc<Node>>),
    /// Delimited string built by the same mechanism.
    Text(Vec<Rc<Node>>),
    Oper(Op, Vec<Rc<Node>>),
    /// Argument list for a line.
    Array(Vec<Rc<Node>>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub attr: Attr,
    pub value: Value,
}

impl Node {
    pub fn new(value: Value) -> Node {
        Node {
            attr: Attr::None,
            value,
        }
    }

    pub fn undef() -> Node {
        Node::new(Value::Undef)
    }

    pub fn empty() -> Node {
        Node::new(Value::Empty)
    }

    pub fn int(v: i64) -> Node {
        Node::new(Value::Int(v))
    }

    pub fn float(v: f64) -> Node {
        Node::new(Value::Float(v))
    }

    pub fn reg(r: RegId) -> Node {
        Node::new(Value::Reg(r))
    }

    pub fn string(s: impl Into<String>) -> Node {
        Node::new(Value::Str(s.into()))
    }

    pub fn oper1(op: Op, a: Rc<Node>) -> Node {
        Node::new(Value::Oper(op, vec![a]))
    }

    pub fn oper2(op: Op, a: Rc<Node>, b: Rc<Node>) -> Node {
        Node::new(Value::Oper(op, vec![a, b]))
    }

    pub fn array(items: Vec<Rc<Node>>) -> Node {
        Node::new(Value::Array(items))
    }

    pub fn with_attr(mut self, attr: Attr) -> Node {
        self.attr = attr;
        self
    }

    /// Overwrite the attribute, except that index-register modifiers are
    /// not clobbered by `Attr::None`.
    pub fn set_attr_if(mut self, attr: Attr) -> Node {
        if attr != Attr::None || !self.attr.is_index_modifier() {
            self.attr = attr;
        }
        self
    }

    pub fn is_undef(&self) -> bool {
        matches!(self.value, Value::Undef)
    }

    /// Number of arguments when this node is an argument array.
    pub fn array_len(&self) -> usize {
        match &self.value {
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    pub fn array_items(&self) -> &[Rc<Node>] {
        match &self.value {
            Value::Array(items) => items,
            _ => &[],
        }
    }
}

/// Renders the node in source-like form: attribute prefixes, the value,
/// then auto-increment suffixes.  Used for unresolved placeholder text.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.attr {
            Attr::FiveBit => write!(f, "<<")?,
            Attr::EightBit => write!(f, "<")?,
            Attr::SixteenBit => write!(f, ">")?,
            Attr::Immediate => write!(f, "#")?,
            Attr::PreDec => write!(f, "-")?,
            Attr::PreDec2 => write!(f, "--")?,
            _ => {}
        }
        match &self.value {
            Value::Undef => write!(f, "?")?,
            Value::Empty => {}
            Value::Int(v) => write!(f, "{v}")?,
            Value::Float(v) => write!(f, "{v}")?,
            Value::Reg(r) => write!(f, "{}", r.name())?,
            Value::Str(s) => write!(f, "{s}")?,
            Value::Interp(n) => write!(f, "&{n}")?,
            Value::Pc => write!(f, "*")?,
            Value::BackRef(n) => write!(f, "{n}B")?,
            Value::FwdRef(n) => write!(f, "{n}F")?,
            Value::Id(items) => {
                for item in items {
                    write!(f, "{item}")?;
                }
            }
            Value::Text(items) => {
                write!(f, "/")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                write!(f, "/")?;
            }
            Value::Oper(op, args) => {
                write!(f, "(")?;
                match args.len() {
                    1 => write!(f, "{}{}", op.symbol(), args[0])?,
                    2 => write!(f, "{}{}{}", args[0], op.symbol(), args[1])?,
                    _ => {}
                }
                write!(f, ")")?;
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (ix, item) in items.iter().enumerate() {
                    if ix > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")?;
            }
        }
        match self.attr {
            Attr::PostInc => write!(f, "+"),
            Attr::PostInc2 => write!(f, "++"),
            Attr::PostDec => write!(f, "-"),
            _ => Ok(()),
        }
    }
}
