// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression evaluation.
//!
//! `Eval` reduces argument trees to concrete leaves or to Undef when a
//! dependency is unresolved on this pass.  Undef is silent; it only becomes
//! an error once the final pass still cannot resolve a value.  Attributes
//! on the input root survive to the result so size hints reach the encoder.

use std::rc::Rc;

use crate::core::error::{AsmError, ErrorKind};
use crate::core::interp::InterpStack;
use crate::core::node::{Attr, Node, Op, Value};
use crate::core::section::Section;
use crate::core::symbols::SymbolTable;

/// Evaluation context: the current section (PC, local labels, line number),
/// the global symbols, and the macro argument stack.
pub struct Eval<'a> {
    pub section: &'a Section,
    pub symbols: &'a SymbolTable,
    pub interp: &'a InterpStack,
}

impl Eval<'_> {
    /// Evaluate an arbitrary argument subtree.  Arrays evaluate each
    /// element; operator nodes reduce to a numeric leaf or stay as-is when
    /// their operands are registers.
    pub fn node(&self, node: &Rc<Node>) -> Result<Rc<Node>, AsmError> {
        let result = match &node.value {
            Value::Undef
            | Value::Empty
            | Value::Int(_)
            | Value::Float(_)
            | Value::Reg(_) => return Ok(Rc::clone(node)),
            Value::Pc => Node::int(self.section.pc as i64),
            Value::BackRef(name) => match self
                .section
                .local_labels
                .back_ref(*name, self.section.line_number)
            {
                Some(value) if node.attr == Attr::None => return Ok(value),
                Some(value) => (*value).clone(),
                None => Node::undef(),
            },
            Value::FwdRef(name) => match self
                .section
                .local_labels
                .fwd_ref(*name, self.section.line_number)
            {
                Some(value) if node.attr == Attr::None => return Ok(value),
                Some(value) => (*value).clone(),
                None => Node::undef(),
            },
            Value::Str(name) => match self.symbols.get(name) {
                Some(value) => {
                    if node.attr == Attr::None {
                        return Ok(value);
                    }
                    (*value).clone()
                }
                None => Node::undef(),
            },
            Value::Interp(index) => {
                let arg = self.interp.get(*index)?;
                let resolved = self.node(&arg)?;
                if node.attr == Attr::None {
                    return Ok(resolved);
                }
                (*resolved).clone()
            }
            Value::Id(items) => match self.flatten(items)? {
                Some(name) => match self.symbols.get(&name) {
                    Some(value) => (*value).clone(),
                    None => Node::undef(),
                },
                None => Node::undef(),
            },
            Value::Text(items) => Node::string(self.flatten_text(items)?),
            Value::Oper(op, args) => self.oper(node, *op, args)?,
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.node(item)?);
                }
                Node::array(out)
            }
        };
        Ok(Rc::new(result.set_attr_if(node.attr)))
    }

    /// Evaluate to an integer leaf, truncating floats.  Anything that does
    /// not reduce to a number is Undef.
    pub fn int(&self, node: &Rc<Node>) -> Result<Rc<Node>, AsmError> {
        let reduced = self.node(node)?;
        let result = match &reduced.value {
            Value::Int(_) => return Ok(reduced),
            Value::Float(v) => Node::int(*v as i64),
            _ => Node::undef(),
        };
        Ok(Rc::new(result.set_attr_if(reduced.attr)))
    }

    /// Evaluate to a string leaf without resolving symbol names: contexts
    /// like EXPORT, SECTION and the macro-name position want the text
    /// itself.
    pub fn string(&self, node: &Rc<Node>) -> Result<Option<String>, AsmError> {
        match &node.value {
            Value::Str(s) => Ok(Some(s.clone())),
            Value::Int(v) => Ok(Some(v.to_string())),
            Value::Float(v) => Ok(Some(v.to_string())),
            Value::Reg(r) => Ok(Some(r.name().to_string())),
            Value::Interp(index) => {
                let arg = self.interp.get(*index)?;
                self.string(&arg)
            }
            Value::Id(items) | Value::Text(items) => self.flatten(items),
            _ => Ok(None),
        }
    }

    /// Concatenate evaluated elements into one string; None if any element
    /// is unresolved.
    fn flatten(&self, items: &[Rc<Node>]) -> Result<Option<String>, AsmError> {
        let mut out = String::new();
        for item in items {
            match self.string(item)? {
                Some(s) => out.push_str(&s),
                None => return Ok(None),
            }
        }
        Ok(Some(out))
    }

    /// Text keeps a placeholder rendering for unresolved elements instead
    /// of collapsing to Undef.
    fn flatten_text(&self, items: &[Rc<Node>]) -> Result<String, AsmError> {
        let mut out = String::new();
        for item in items {
            match self.string(item)? {
                Some(s) => out.push_str(&s),
                None => out.push_str(&item.to_string()),
            }
        }
        Ok(out)
    }

    fn oper(&self, node: &Rc<Node>, op: Op, args: &[Rc<Node>]) -> Result<Node, AsmError> {
        let mut reduced = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.node(arg)?;
            if value.is_undef() {
                return Ok(Node::undef());
            }
            // Register operands keep the subtree intact; register-list
            // expressions like A|B reach the encoder unevaluated.
            if matches!(value.value, Value::Reg(_)) {
                return Ok((**node).clone());
            }
            reduced.push(value);
        }
        match reduced.len() {
            1 => apply_unary(op, &reduced[0]),
            2 => apply_binary(op, &reduced[0], &reduced[1]),
            n => Err(AsmError::syntax(format!("operator with {n} operands"))),
        }
    }
}

/// Convert float elements of an argument array to integers, for emission
/// contexts that forbid floats.
pub fn args_float_to_int(args: &Rc<Node>) -> Rc<Node> {
    let Value::Array(items) = &args.value else {
        return Rc::clone(args);
    };
    if !items
        .iter()
        .any(|item| matches!(item.value, Value::Float(_)))
    {
        return Rc::clone(args);
    }
    let converted = items
        .iter()
        .map(|item| match item.value {
            Value::Float(v) => Rc::new(Node::int(v as i64).set_attr_if(item.attr)),
            _ => Rc::clone(item),
        })
        .collect();
    Rc::new(Node::array(converted).set_attr_if(args.attr))
}

enum Num {
    Int(i64),
    Float(f64),
}

fn numeric(node: &Node) -> Option<Num> {
    match node.value {
        Value::Int(v) => Some(Num::Int(v)),
        Value::Float(v) => Some(Num::Float(v)),
        _ => None,
    }
}

fn apply_unary(op: Op, arg: &Node) -> Result<Node, AsmError> {
    let Some(value) = numeric(arg) else {
        return Ok(Node::undef());
    };
    let out = match (op, value) {
        (Op::Pos, Num::Int(v)) => Node::int(v),
        (Op::Pos, Num::Float(v)) => Node::float(v),
        (Op::Neg, Num::Int(v)) => Node::int(v.wrapping_neg()),
        (Op::Neg, Num::Float(v)) => Node::float(-v),
        (Op::Com, Num::Int(v)) => Node::int(!v),
        (Op::Com, Num::Float(v)) => Node::int(!(v as i64)),
        _ => return Err(AsmError::syntax("invalid unary operator")),
    };
    Ok(out)
}

fn apply_binary(op: Op, lhs: &Node, rhs: &Node) -> Result<Node, AsmError> {
    let (Some(l), Some(r)) = (numeric(lhs), numeric(rhs)) else {
        return Ok(Node::undef());
    };
    // Promote to float when either side is float; bitwise and shift
    // operators work on the integer domain only.
    if let (Num::Float(_), _) | (_, Num::Float(_)) = (&l, &r) {
        let lf = match l {
            Num::Int(v) => v as f64,
            Num::Float(v) => v,
        };
        let rf = match r {
            Num::Int(v) => v as f64,
            Num::Float(v) => v,
        };
        return apply_binary_float(op, lf, rf);
    }
    let (Num::Int(l), Num::Int(r)) = (l, r) else {
        unreachable!()
    };
    let out = match op {
        Op::Add => l.wrapping_add(r),
        Op::Sub => l.wrapping_sub(r),
        Op::Mul => l.wrapping_mul(r),
        Op::Div => {
            if r == 0 {
                return Err(AsmError::new(ErrorKind::NumericDomain, "division by zero"));
            }
            l / r
        }
        Op::BitAnd => l & r,
        Op::BitOr => l | r,
        Op::BitXor => l ^ r,
        Op::Shl | Op::Shr if r < 0 => {
            return Err(AsmError::new(
                ErrorKind::NumericDomain,
                "negative shift count",
            ));
        }
        Op::Shl => l.wrapping_shl(r as u32),
        Op::Shr => ((l as u64).wrapping_shr(r as u32)) as i64,
        _ => return Err(AsmError::syntax("invalid binary operator")),
    };
    Ok(Node::int(out))
}

fn apply_binary_float(op: Op, l: f64, r: f64) -> Result<Node, AsmError> {
    let out = match op {
        Op::Add => l + r,
        Op::Sub => l - r,
        Op::Mul => l * r,
        Op::Div => {
            if r == 0.0 {
                return Err(AsmError::new(ErrorKind::NumericDomain, "division by zero"));
            }
            l / r
        }
        // Bitwise and shift operators truncate to the integer domain.
        _ => {
            let node = apply_binary(op, &Node::int(l as i64), &Node::int(r as i64))?;
            return Ok(node);
        }
    };
    Ok(Node::float(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx<'a>(
        section: &'a Section,
        symbols: &'a SymbolTable,
        interp: &'a InterpStack,
    ) -> Eval<'a> {
        Eval {
            section,
            symbols,
            interp,
        }
    }

    fn fixture() -> (crate::core::section::Sections, SymbolTable, InterpStack) {
        let mut sections = crate::core::section::Sections::new();
        sections.set("", 1);
        (sections, SymbolTable::new(), InterpStack::new())
    }

    fn int_of(node: &Rc<Node>) -> Option<i64> {
        match node.value {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    #[test]
    fn arithmetic_reduces_to_int() {
        let (sections, symbols, interp) = fixture();
        let eval = ctx(sections.current(), &symbols, &interp);
        let expr = Rc::new(Node::oper2(
            Op::Add,
            Rc::new(Node::int(2)),
            Rc::new(Node::oper2(
                Op::Mul,
                Rc::new(Node::int(3)),
                Rc::new(Node::int(4)),
            )),
        ));
        assert_eq!(int_of(&eval.node(&expr).unwrap()), Some(14));
    }

    #[test]
    fn float_promotes_and_int_truncates() {
        let (sections, symbols, interp) = fixture();
        let eval = ctx(sections.current(), &symbols, &interp);
        let expr = Rc::new(Node::oper2(
            Op::Div,
            Rc::new(Node::int(7)),
            Rc::new(Node::float(2.0)),
        ));
        let reduced = eval.node(&expr).unwrap();
        assert!(matches!(reduced.value, Value::Float(v) if v == 3.5));
        assert_eq!(int_of(&eval.int(&expr).unwrap()), Some(3));
    }

    #[test]
    fn undef_propagates_through_operators() {
        let (sections, symbols, interp) = fixture();
        let eval = ctx(sections.current(), &symbols, &interp);
        let expr = Rc::new(Node::oper2(
            Op::Add,
            Rc::new(Node::string("later")),
            Rc::new(Node::int(1)),
        ));
        assert!(eval.node(&expr).unwrap().is_undef());
    }

    #[test]
    fn symbols_resolve_to_stored_values() {
        let (sections, mut symbols, interp) = fixture();
        symbols.set("base", Rc::new(Node::int(0x1000)), 1);
        let eval = ctx(sections.current(), &symbols, &interp);
        let expr = Rc::new(Node::oper2(
            Op::Add,
            Rc::new(Node::string("base")),
            Rc::new(Node::int(5)),
        ));
        assert_eq!(int_of(&eval.node(&expr).unwrap()), Some(0x1005));
    }

    #[test]
    fn pc_evaluates_to_section_pc() {
        let (mut sections, symbols, interp) = fixture();
        sections.set_pc(0x2000);
        let eval = ctx(sections.current(), &symbols, &interp);
        let expr = Rc::new(Node::new(Value::Pc));
        assert_eq!(int_of(&eval.node(&expr).unwrap()), Some(0x2000));
    }

    #[test]
    fn division_by_zero_is_a_numeric_error() {
        let (sections, symbols, interp) = fixture();
        let eval = ctx(sections.current(), &symbols, &interp);
        let expr = Rc::new(Node::oper2(
            Op::Div,
            Rc::new(Node::int(1)),
            Rc::new(Node::int(0)),
        ));
        let err = eval.node(&expr).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumericDomain);
    }

    #[test]
    fn size_hint_survives_evaluation() {
        let (sections, symbols, interp) = fixture();
        let eval = ctx(sections.current(), &symbols, &interp);
        let expr = Rc::new(
            Node::oper2(Op::Add, Rc::new(Node::int(0x10)), Rc::new(Node::int(0x45)))
                .with_attr(Attr::EightBit),
        );
        let reduced = eval.node(&expr).unwrap();
        assert_eq!(reduced.attr, Attr::EightBit);
        assert_eq!(int_of(&reduced), Some(0x55));
    }

    #[test]
    fn register_operands_keep_the_subtree() {
        use crate::m6809::registers::RegId;
        let (sections, symbols, interp) = fixture();
        let eval = ctx(sections.current(), &symbols, &interp);
        let expr = Rc::new(Node::oper2(
            Op::BitOr,
            Rc::new(Node::reg(RegId::A)),
            Rc::new(Node::reg(RegId::B)),
        ));
        let reduced = eval.node(&expr).unwrap();
        assert!(matches!(reduced.value, Value::Oper(Op::BitOr, _)));
    }

    #[test]
    fn interp_resolves_against_stack() {
        let (sections, symbols, mut interp) = fixture();
        interp.push(Rc::new(Node::array(vec![Rc::new(Node::int(42))])));
        let eval = ctx(sections.current(), &symbols, &interp);
        let expr = Rc::new(Node::new(Value::Interp(1)));
        assert_eq!(int_of(&eval.node(&expr).unwrap()), Some(42));
        let bad = Rc::new(Node::new(Value::Interp(2)));
        assert!(eval.node(&bad).is_err());
    }

    #[test]
    fn text_keeps_placeholder_for_unresolved() {
        let (sections, symbols, interp) = fixture();
        let eval = ctx(sections.current(), &symbols, &interp);
        let text = Rc::new(Node::new(Value::Text(vec![
            Rc::new(Node::string("lbl")),
            Rc::new(Node::new(Value::Undef)),
        ])));
        let reduced = eval.node(&text).unwrap();
        assert!(matches!(&reduced.value, Value::Str(s) if s.starts_with("lbl")));
    }

    #[test]
    fn args_float_to_int_converts_in_place() {
        let args = Rc::new(Node::array(vec![
            Rc::new(Node::float(3.7)),
            Rc::new(Node::int(1)),
        ]));
        let converted = args_float_to_int(&args);
        assert!(matches!(converted.array_items()[0].value, Value::Int(3)));
        assert!(matches!(converted.array_items()[1].value, Value::Int(1)));
    }

    proptest! {
        #[test]
        fn add_matches_wrapping(a in any::<i64>(), b in any::<i64>()) {
            let out = apply_binary(Op::Add, &Node::int(a), &Node::int(b)).unwrap();
            prop_assert!(matches!(out.value, Value::Int(v) if v == a.wrapping_add(b)));
        }

        #[test]
        fn shift_right_is_logical(a in any::<i64>(), s in 0i64..63) {
            let out = apply_binary(Op::Shr, &Node::int(a), &Node::int(s)).unwrap();
            prop_assert!(matches!(out.value, Value::Int(v) if v == ((a as u64) >> s) as i64));
        }
    }
}
