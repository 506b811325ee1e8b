// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Positional-variable stack for macro expansion.
//!
//! Each frame is the evaluated argument array of one macro invocation.
//! `&N` interpolations resolve against the top frame, 1-indexed.

use std::rc::Rc;

use crate::core::error::AsmError;
use crate::core::node::{Node, Value};

#[derive(Default)]
pub struct InterpStack {
    frames: Vec<Rc<Node>>,
}

impl InterpStack {
    pub fn new() -> InterpStack {
        InterpStack::default()
    }

    /// Push an argument frame.  Only arrays and undef (a call with no
    /// arguments) are meaningful here.
    pub fn push(&mut self, args: Rc<Node>) {
        self.frames.push(args);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn get(&self, index: i64) -> Result<Rc<Node>, AsmError> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| AsmError::syntax("no positional variables on stack"))?;
        let items = match &frame.value {
            Value::Array(items) => items.as_slice(),
            _ => &[],
        };
        if index < 1 || index as usize > items.len() {
            return Err(AsmError::syntax(format!(
                "invalid positional variable: {index}"
            )));
        }
        Ok(Rc::clone(&items[index as usize - 1]))
    }
}
