// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A small assembler for building [`InstructionSequence`]s programmatically.
//!
//! This is the stand-in for a front-end compiler: it records instructions, labels and locals,
//! then resolves everything into an immutable sequence in [`Asm::build`].
//!
//! ```
//! use yarv_tape::asm::Asm;
//! use yarv_tape::value::Value;
//!
//! let mut a = Asm::top();
//! a.putobject(Value::Integer(2));
//! a.putobject(Value::Integer(3));
//! a.opt_plus();
//! a.leave();
//! let iseq = a.build()?;
//! assert_eq!(iseq.len(), 4);
//! # Ok::<(), yarv_tape::asm::BuildError>(())
//! ```

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::call_data::{CallData, CallFlags};
use crate::instr::{DefinedKind, Instr, Label, OptOp, ThrowKind};
use crate::iseq::{InstructionSequence, IseqKind, Params, ThrowHandler};
use crate::value::{SpecialObject, Value};

/// A sequence assembly error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildError {
    /// A label was referenced but never bound.
    UnboundLabel {
        /// The label id.
        label: u32,
    },
    /// A label was bound more than once.
    LabelBoundTwice {
        /// The label id.
        label: u32,
    },
    /// A label was bound past the last instruction but is used as a jump target.
    LabelOutOfRange {
        /// The label id.
        label: u32,
        /// The bound index.
        target: usize,
    },
    /// A local of the current scope was referenced with an out-of-range slot.
    LocalOutOfRange {
        /// Instruction index.
        pc: usize,
        /// Slot index.
        index: u32,
        /// Number of locals declared.
        locals: usize,
    },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundLabel { label } => write!(f, "label_{label} is never bound"),
            Self::LabelBoundTwice { label } => write!(f, "label_{label} is bound twice"),
            Self::LabelOutOfRange { label, target } => {
                write!(f, "label_{label} is bound past the end ({target})")
            }
            Self::LocalOutOfRange { pc, index, locals } => write!(
                f,
                "local slot {index} out of range at {pc:04} ({locals} locals)"
            ),
        }
    }
}

impl core::error::Error for BuildError {}

/// A local-variable slot of the sequence being assembled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalIndex(pub u32);

/// Instruction sequence assembler.
#[derive(Debug)]
pub struct Asm {
    name: String,
    kind: IseqKind,
    insns: Vec<Instr>,
    labels: Vec<Option<usize>>,
    locals: Vec<String>,
    params: Params,
    throw_handlers: Vec<ThrowHandler>,
}

impl Asm {
    /// Creates an assembler for a sequence of `kind` named `name`.
    #[must_use]
    pub fn new(name: &str, kind: IseqKind) -> Self {
        Self {
            name: String::from(name),
            kind,
            insns: Vec::new(),
            labels: Vec::new(),
            locals: Vec::new(),
            params: Params::default(),
            throw_handlers: Vec::new(),
        }
    }

    /// Top-level program, named `<compiled>`.
    #[must_use]
    pub fn top() -> Self {
        Self::new("<compiled>", IseqKind::Top)
    }

    /// Method body taking `params` as leading positional parameters, in order.
    ///
    /// Each parameter becomes a local, so `params[i]` lives in slot `i`.
    #[must_use]
    pub fn method(name: &str, params: &[&str]) -> Self {
        let mut a = Self::new(name, IseqKind::Method);
        a.lead_params(params);
        a
    }

    /// Block body taking `params` as leading positional parameters, in order.
    #[must_use]
    pub fn block(name: &str, params: &[&str]) -> Self {
        let mut a = Self::new(name, IseqKind::Block);
        a.lead_params(params);
        a
    }

    fn lead_params(&mut self, params: &[&str]) {
        for p in params {
            self.local(p);
        }
        self.params = Params::lead(u32::try_from(params.len()).unwrap_or(u32::MAX));
    }

    /// Overrides the declared parameter shape.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Returns the slot of local `name`, declaring it if needed.
    pub fn local(&mut self, name: &str) -> LocalIndex {
        let slot = match self.locals.iter().position(|l| l == name) {
            Some(slot) => slot,
            None => {
                self.locals.push(String::from(name));
                self.locals.len() - 1
            }
        };
        LocalIndex(u32::try_from(slot).unwrap_or(u32::MAX))
    }

    /// Allocates a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(u32::try_from(self.labels.len() - 1).unwrap_or(u32::MAX))
    }

    /// Binds `label` to the next emitted instruction.
    pub fn bind(&mut self, label: Label) -> Result<(), BuildError> {
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or(BuildError::UnboundLabel { label: label.0 })?;
        if slot.is_some() {
            return Err(BuildError::LabelBoundTwice { label: label.0 });
        }
        *slot = Some(self.insns.len());
        Ok(())
    }

    /// Index of the next emitted instruction.
    #[must_use]
    #[inline]
    pub fn pc(&self) -> usize {
        self.insns.len()
    }

    /// Emits an arbitrary instruction.
    pub fn emit(&mut self, instr: Instr) {
        self.insns.push(instr);
    }

    /// Declares an exception handler covering `begin..end`.
    pub fn throw_handler(
        &mut self,
        kind: ThrowKind,
        iseq: Option<InstructionSequence>,
        begin: Label,
        end: Label,
        exit: Label,
    ) {
        self.throw_handlers.push(ThrowHandler {
            kind,
            iseq: iseq.map(Rc::new),
            begin,
            end,
            exit,
        });
    }

    /// Resolves labels and locals into an immutable sequence.
    pub fn build(self) -> Result<InstructionSequence, BuildError> {
        // Unreferenced unbound labels are harmless; they resolve past the end.
        let labels: Vec<usize> = self
            .labels
            .iter()
            .map(|target| target.unwrap_or(usize::MAX))
            .collect();

        let check = |label: Label| -> Result<usize, BuildError> {
            match self.labels.get(label.0 as usize).copied().flatten() {
                Some(target) => Ok(target),
                None => Err(BuildError::UnboundLabel { label: label.0 }),
            }
        };

        for (pc, instr) in self.insns.iter().enumerate() {
            let mut result = Ok(());
            instr.for_each_label(|label| {
                if result.is_err() {
                    return;
                }
                result = check(label).and_then(|target| {
                    if target >= self.insns.len() && instr.branches() {
                        Err(BuildError::LabelOutOfRange {
                            label: label.0,
                            target,
                        })
                    } else {
                        Ok(())
                    }
                });
            });
            result?;

            if let Some((index, 0)) = instr.local_slot()
                && index as usize >= self.locals.len()
            {
                return Err(BuildError::LocalOutOfRange {
                    pc,
                    index,
                    locals: self.locals.len(),
                });
            }
        }

        for handler in &self.throw_handlers {
            for label in [handler.begin, handler.end, handler.exit] {
                check(label)?;
            }
        }

        Ok(InstructionSequence {
            name: self.name,
            kind: self.kind,
            insns: self.insns,
            labels,
            locals: self.locals,
            params: self.params,
            throw_handlers: self.throw_handlers,
        })
    }

    fn local_name(&self, index: LocalIndex) -> String {
        self.locals
            .get(index.0 as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn opt(&mut self, op: OptOp) {
        self.emit(Instr::Opt {
            op,
            call_data: op.call_data(),
        });
    }
}

/// One method per catalog instruction.
impl Asm {
    /// `nop`.
    pub fn nop(&mut self) {
        self.emit(Instr::Nop);
    }

    /// `pop`.
    pub fn pop(&mut self) {
        self.emit(Instr::Pop);
    }

    /// `dup`.
    pub fn dup(&mut self) {
        self.emit(Instr::Dup);
    }

    /// `dupn n`.
    pub fn dupn(&mut self, n: u32) {
        self.emit(Instr::DupN(n));
    }

    /// `swap`.
    pub fn swap(&mut self) {
        self.emit(Instr::Swap);
    }

    /// `topn n`.
    pub fn topn(&mut self, n: u32) {
        self.emit(Instr::TopN(n));
    }

    /// `setn n`.
    pub fn setn(&mut self, n: u32) {
        self.emit(Instr::SetN(n));
    }

    /// `adjuststack n`.
    pub fn adjuststack(&mut self, n: u32) {
        self.emit(Instr::AdjustStack(n));
    }

    /// `putnil`.
    pub fn putnil(&mut self) {
        self.emit(Instr::PutNil);
    }

    /// `putself`.
    pub fn putself(&mut self) {
        self.emit(Instr::PutSelf);
    }

    /// `putobject value`, using the `INT2FIX` forms for `0` and `1`.
    pub fn putobject(&mut self, value: Value) {
        let instr = match value {
            Value::Integer(0) => Instr::PutObjectInt2Fix0,
            Value::Integer(1) => Instr::PutObjectInt2Fix1,
            other => Instr::PutObject(other),
        };
        self.emit(instr);
    }

    /// `putstring s`.
    pub fn putstring(&mut self, s: &str) {
        self.emit(Instr::PutString(String::from(s)));
    }

    /// `putspecialobject`.
    pub fn putspecialobject(&mut self, object: SpecialObject) {
        self.emit(Instr::PutSpecialObject(object));
    }

    /// `newarray n`.
    pub fn newarray(&mut self, n: u32) {
        self.emit(Instr::NewArray(n));
    }

    /// `duparray`.
    pub fn duparray(&mut self, items: Vec<Value>) {
        self.emit(Instr::DupArray(Value::Array(items)));
    }

    /// `newhash` over `pairs` key/value pairs.
    pub fn newhash(&mut self, pairs: u32) {
        self.emit(Instr::NewHash(pairs));
    }

    /// `duphash`.
    pub fn duphash(&mut self, pairs: Vec<(Value, Value)>) {
        self.emit(Instr::DupHash(Value::Hash(pairs)));
    }

    /// `newrange`.
    pub fn newrange(&mut self, exclude_end: bool) {
        self.emit(Instr::NewRange { exclude_end });
    }

    /// `concatarray`.
    pub fn concatarray(&mut self) {
        self.emit(Instr::ConcatArray);
    }

    /// `splatarray`.
    pub fn splatarray(&mut self, copy: bool) {
        self.emit(Instr::SplatArray { copy });
    }

    /// `concatstrings n`.
    pub fn concatstrings(&mut self, n: u32) {
        self.emit(Instr::ConcatStrings(n));
    }

    /// `toregexp`.
    pub fn toregexp(&mut self, options: u32, count: u32) {
        self.emit(Instr::ToRegexp { options, count });
    }

    /// `intern`.
    pub fn intern(&mut self) {
        self.emit(Instr::Intern);
    }

    /// `objtostring`.
    pub fn objtostring(&mut self) {
        self.emit(Instr::ObjToString(CallData::new(
            Some("to_s"),
            0,
            CallFlags::FCALL | CallFlags::ARGS_SIMPLE,
        )));
    }

    /// `anytostring`.
    pub fn anytostring(&mut self) {
        self.emit(Instr::AnyToString);
    }

    /// `expandarray`.
    pub fn expandarray(&mut self, size: u32, flag: u32) {
        self.emit(Instr::ExpandArray { size, flag });
    }

    /// `opt_newarray_min n`.
    pub fn opt_newarray_min(&mut self, n: u32) {
        self.emit(Instr::OptNewArrayMin(n));
    }

    /// `opt_newarray_max n`.
    pub fn opt_newarray_max(&mut self, n: u32) {
        self.emit(Instr::OptNewArrayMax(n));
    }

    /// `opt_str_freeze`.
    pub fn opt_str_freeze(&mut self, value: &str) {
        self.emit(Instr::OptStrFreeze {
            value: String::from(value),
            call_data: CallData::simple("freeze", 0),
        });
    }

    /// `opt_str_uminus`.
    pub fn opt_str_uminus(&mut self, value: &str) {
        self.emit(Instr::OptStrUminus {
            value: String::from(value),
            call_data: CallData::simple("-@", 0),
        });
    }

    /// `getlocal name@index, level`.
    pub fn getlocal(&mut self, name: &str, index: u32, level: u32) {
        self.emit(Instr::GetLocal {
            name: String::from(name),
            index,
            level,
        });
    }

    /// `setlocal name@index, level`.
    pub fn setlocal(&mut self, name: &str, index: u32, level: u32) {
        self.emit(Instr::SetLocal {
            name: String::from(name),
            index,
            level,
        });
    }

    /// `getlocal_WC_0` for a local of this sequence.
    pub fn getlocal_wc_0(&mut self, local: LocalIndex) {
        let name = self.local_name(local);
        self.emit(Instr::GetLocalWC0 {
            name,
            index: local.0,
        });
    }

    /// `setlocal_WC_0` for a local of this sequence.
    pub fn setlocal_wc_0(&mut self, local: LocalIndex) {
        let name = self.local_name(local);
        self.emit(Instr::SetLocalWC0 {
            name,
            index: local.0,
        });
    }

    /// `getlocal_WC_1` for a local of the enclosing sequence.
    pub fn getlocal_wc_1(&mut self, name: &str, index: u32) {
        self.emit(Instr::GetLocalWC1 {
            name: String::from(name),
            index,
        });
    }

    /// `setlocal_WC_1` for a local of the enclosing sequence.
    pub fn setlocal_wc_1(&mut self, name: &str, index: u32) {
        self.emit(Instr::SetLocalWC1 {
            name: String::from(name),
            index,
        });
    }

    /// `getglobal`.
    pub fn getglobal(&mut self, name: &str) {
        self.emit(Instr::GetGlobal(String::from(name)));
    }

    /// `setglobal`.
    pub fn setglobal(&mut self, name: &str) {
        self.emit(Instr::SetGlobal(String::from(name)));
    }

    /// `getconstant`.
    pub fn getconstant(&mut self, name: &str) {
        self.emit(Instr::GetConstant(String::from(name)));
    }

    /// `jump`.
    pub fn jump(&mut self, label: Label) {
        self.emit(Instr::Jump(label));
    }

    /// `branchif`.
    pub fn branchif(&mut self, label: Label) {
        self.emit(Instr::BranchIf(label));
    }

    /// `branchunless`.
    pub fn branchunless(&mut self, label: Label) {
        self.emit(Instr::BranchUnless(label));
    }

    /// `branchnil`.
    pub fn branchnil(&mut self, label: Label) {
        self.emit(Instr::BranchNil(label));
    }

    /// `opt_case_dispatch`.
    pub fn opt_case_dispatch(&mut self, cases: Vec<(Value, Label)>, else_label: Label) {
        self.emit(Instr::OptCaseDispatch { cases, else_label });
    }

    /// `leave`.
    pub fn leave(&mut self) {
        self.emit(Instr::Leave);
    }

    /// `send` with an optional block body.
    pub fn send(&mut self, call_data: CallData, block: Option<InstructionSequence>) {
        self.emit(Instr::Send {
            call_data,
            block: block.map(Rc::new),
        });
    }

    /// `opt_send_without_block`.
    pub fn opt_send_without_block(&mut self, call_data: CallData) {
        self.emit(Instr::OptSendWithoutBlock(call_data));
    }

    /// `invokeblock` with `argc` arguments.
    pub fn invokeblock(&mut self, argc: u32) {
        self.emit(Instr::InvokeBlock(CallData::new(
            None,
            argc,
            CallFlags::ARGS_SIMPLE,
        )));
    }

    /// `definemethod`.
    pub fn definemethod(&mut self, name: &str, iseq: InstructionSequence) {
        self.emit(Instr::DefineMethod {
            name: String::from(name),
            iseq: Rc::new(iseq),
        });
    }

    /// `opt_plus`.
    pub fn opt_plus(&mut self) {
        self.opt(OptOp::Plus);
    }

    /// `opt_minus`.
    pub fn opt_minus(&mut self) {
        self.opt(OptOp::Minus);
    }

    /// `opt_mult`.
    pub fn opt_mult(&mut self) {
        self.opt(OptOp::Mult);
    }

    /// `opt_div`.
    pub fn opt_div(&mut self) {
        self.opt(OptOp::Div);
    }

    /// `opt_mod`.
    pub fn opt_mod(&mut self) {
        self.opt(OptOp::Mod);
    }

    /// `opt_eq`.
    pub fn opt_eq(&mut self) {
        self.opt(OptOp::Eq);
    }

    /// `opt_neq`.
    pub fn opt_neq(&mut self) {
        self.emit(Instr::OptNeq {
            eq: CallData::simple("==", 1),
            neq: CallData::simple("!=", 1),
        });
    }

    /// `opt_lt`.
    pub fn opt_lt(&mut self) {
        self.opt(OptOp::Lt);
    }

    /// `opt_le`.
    pub fn opt_le(&mut self) {
        self.opt(OptOp::Le);
    }

    /// `opt_gt`.
    pub fn opt_gt(&mut self) {
        self.opt(OptOp::Gt);
    }

    /// `opt_ge`.
    pub fn opt_ge(&mut self) {
        self.opt(OptOp::Ge);
    }

    /// `opt_ltlt`.
    pub fn opt_ltlt(&mut self) {
        self.opt(OptOp::Ltlt);
    }

    /// `opt_and`.
    pub fn opt_and(&mut self) {
        self.opt(OptOp::And);
    }

    /// `opt_or`.
    pub fn opt_or(&mut self) {
        self.opt(OptOp::Or);
    }

    /// `opt_aref`.
    pub fn opt_aref(&mut self) {
        self.opt(OptOp::Aref);
    }

    /// `opt_aset`.
    pub fn opt_aset(&mut self) {
        self.opt(OptOp::Aset);
    }

    /// `opt_aref_with`.
    pub fn opt_aref_with(&mut self, key: &str) {
        self.emit(Instr::OptArefWith {
            key: String::from(key),
            call_data: CallData::simple("[]", 1),
        });
    }

    /// `opt_aset_with`.
    pub fn opt_aset_with(&mut self, key: &str) {
        self.emit(Instr::OptAsetWith {
            key: String::from(key),
            call_data: CallData::simple("[]=", 2),
        });
    }

    /// `opt_length`.
    pub fn opt_length(&mut self) {
        self.opt(OptOp::Length);
    }

    /// `opt_size`.
    pub fn opt_size(&mut self) {
        self.opt(OptOp::Size);
    }

    /// `opt_empty_p`.
    pub fn opt_empty_p(&mut self) {
        self.opt(OptOp::EmptyP);
    }

    /// `opt_nil_p`.
    pub fn opt_nil_p(&mut self) {
        self.opt(OptOp::NilP);
    }

    /// `opt_not`.
    pub fn opt_not(&mut self) {
        self.opt(OptOp::Not);
    }

    /// `opt_succ`.
    pub fn opt_succ(&mut self) {
        self.opt(OptOp::Succ);
    }

    /// `opt_regexpmatch2`.
    pub fn opt_regexpmatch2(&mut self) {
        self.opt(OptOp::RegexpMatch2);
    }

    /// `defined`.
    pub fn defined(&mut self, kind: DefinedKind, object: Value, value: Value) {
        self.emit(Instr::Defined {
            kind,
            object,
            value,
        });
    }

    /// `opt_getinlinecache`.
    pub fn opt_getinlinecache(&mut self, label: Label, cache: u32) {
        self.emit(Instr::OptGetInlineCache { label, cache });
    }

    /// `opt_setinlinecache`.
    pub fn opt_setinlinecache(&mut self, cache: u32) {
        self.emit(Instr::OptSetInlineCache { cache });
    }
}
