// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instruction sequences.
//!
//! An [`InstructionSequence`] is an immutable, fully resolved unit of code: its instructions, a
//! flat label table, the names of its locals, its parameter shape and its exception-handler
//! table. Nested method and block bodies are owned by the instructions that reference them
//! ([`Instr::child_iseq`]).
//!
//! Sequences are produced by [`Asm::build`](crate::asm::Asm::build), which guarantees that every
//! referenced label is bound to an instruction of the same sequence.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::instr::{Instr, Label, ThrowKind};

/// What a sequence was compiled from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IseqKind {
    /// Top-level program.
    Top,
    /// Method body.
    Method,
    /// Block body.
    Block,
}

/// Declared parameter shape of a sequence.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Params {
    /// Leading required positional parameters.
    pub lead_num: u32,
    /// Optional positional parameters.
    pub opt_num: u32,
    /// `*rest` parameter.
    pub rest: bool,
    /// Trailing required positional parameters.
    pub post_num: u32,
    /// Keyword parameters.
    pub kw_num: u32,
    /// `**kwrest` parameter.
    pub kwrest: bool,
    /// `&block` parameter.
    pub block: bool,
}

impl Params {
    /// Only `lead_num` leading positional parameters.
    #[must_use]
    pub const fn lead(lead_num: u32) -> Self {
        Self {
            lead_num,
            opt_num: 0,
            rest: false,
            post_num: 0,
            kw_num: 0,
            kwrest: false,
            block: false,
        }
    }

    /// Returns `true` if no parameter of any kind is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns `true` if only leading positional parameters are declared.
    #[must_use]
    pub fn is_lead_only(&self) -> bool {
        *self == Self::lead(self.lead_num)
    }
}

/// An exception-handler table entry.
///
/// Handler regions are recorded so that analyses can refuse sequences that declare them.
#[derive(Clone, Debug, PartialEq)]
pub struct ThrowHandler {
    /// Handler kind.
    pub kind: ThrowKind,
    /// Handler body, if any.
    pub iseq: Option<Rc<InstructionSequence>>,
    /// First covered instruction.
    pub begin: Label,
    /// End of the covered region.
    pub end: Label,
    /// Continuation after the handler.
    pub exit: Label,
}

/// A compiled, immutable instruction sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct InstructionSequence {
    pub(crate) name: String,
    pub(crate) kind: IseqKind,
    pub(crate) insns: Vec<Instr>,
    /// `labels[label.id()]` is the instruction index the label is bound to.
    pub(crate) labels: Vec<usize>,
    pub(crate) locals: Vec<String>,
    pub(crate) params: Params,
    pub(crate) throw_handlers: Vec<ThrowHandler>,
}

impl InstructionSequence {
    /// Display name (`<compiled>` for top-level code, the method name for methods).
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the sequence was compiled from.
    #[must_use]
    #[inline]
    pub fn kind(&self) -> IseqKind {
        self.kind
    }

    /// The instructions.
    #[must_use]
    #[inline]
    pub fn insns(&self) -> &[Instr] {
        &self.insns
    }

    /// Number of instructions.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    /// Returns `true` if the sequence has no instructions.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Names of the local-variable slots.
    #[must_use]
    #[inline]
    pub fn locals(&self) -> &[String] {
        &self.locals
    }

    /// Declared parameter shape.
    #[must_use]
    #[inline]
    pub fn params(&self) -> Params {
        self.params
    }

    /// Exception-handler table.
    #[must_use]
    #[inline]
    pub fn throw_handlers(&self) -> &[ThrowHandler] {
        &self.throw_handlers
    }

    /// Returns the instruction index `label` is bound to.
    ///
    /// Every label reachable from this sequence's instructions is bound; a foreign label yields
    /// `None`.
    #[must_use]
    #[inline]
    pub fn label_target(&self, label: Label) -> Option<usize> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .filter(|&target| target != usize::MAX)
    }

    /// Visits the resolved branch targets of the instruction at `pc`.
    pub fn for_each_branch_target(&self, pc: usize, mut f: impl FnMut(usize)) {
        if let Some(instr) = self.insns.get(pc) {
            instr.for_each_branch_target(|label| {
                if let Some(target) = self.label_target(label) {
                    f(target);
                }
            });
        }
    }

    /// Directly nested sequences, in instruction order.
    pub fn child_iseqs(&self) -> impl Iterator<Item = &Rc<Self>> {
        self.insns.iter().filter_map(Instr::child_iseq).chain(
            self.throw_handlers
                .iter()
                .filter_map(|handler| handler.iseq.as_ref()),
        )
    }

    /// This sequence followed by every nested sequence, depth first.
    #[must_use]
    pub fn all_iseqs(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        let mut stack: Vec<&Self> = Vec::from([self]);
        while let Some(iseq) = stack.pop() {
            out.push(iseq);
            let children: Vec<&Self> = iseq.child_iseqs().map(|c| &**c).collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }
}
