// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The instruction catalog.
//!
//! [`Instr`] is a closed set of tagged operations. Each variant has a fixed operand-stack effect
//! ([`Instr::reads`] / [`Instr::writes`]), a control-flow classification ([`Instr::branches`],
//! [`Instr::falls_through`], [`Instr::leaves`]) and a side-effect flag
//! ([`Instr::side_effects`]). The interpreter and the graph analyses both consume these
//! attributes; neither needs to know anything else about an instruction to stay balanced.
//!
//! Notes:
//!
//! - Jump targets are [`Label`]s. Labels are resolved to instruction indices once, when an
//!   [`InstructionSequence`] is built, and looked up through its flat label table afterwards.
//! - Call-like instructions whose only job is to forward to the object model (`opt_plus`,
//!   `opt_length`, ...) share one [`Instr::Opt`] variant keyed by [`OptOp`].

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::call_data::CallData;
use crate::iseq::InstructionSequence;
use crate::value::{SpecialObject, Value};

/// A jump target, resolved through [`InstructionSequence::label_target`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

impl Label {
    /// Returns the label id.
    #[must_use]
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// Object-model operations with a dedicated `opt_*` instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OptOp {
    /// `a + b`.
    Plus,
    /// `a - b`.
    Minus,
    /// `a * b`.
    Mult,
    /// `a / b`.
    Div,
    /// `a % b`.
    Mod,
    /// `a == b`.
    Eq,
    /// `a < b`.
    Lt,
    /// `a <= b`.
    Le,
    /// `a > b`.
    Gt,
    /// `a >= b`.
    Ge,
    /// `a << b`.
    Ltlt,
    /// `a & b`.
    And,
    /// `a | b`.
    Or,
    /// `a[b]`.
    Aref,
    /// `a[b] = c`.
    Aset,
    /// `a.length`.
    Length,
    /// `a.size`.
    Size,
    /// `a.empty?`.
    EmptyP,
    /// `a.nil?`.
    NilP,
    /// `!a`.
    Not,
    /// `a.succ`.
    Succ,
    /// `a =~ b`.
    RegexpMatch2,
}

impl OptOp {
    /// Returns the method name the operation dispatches to.
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Mult => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Ltlt => "<<",
            Self::And => "&",
            Self::Or => "|",
            Self::Aref => "[]",
            Self::Aset => "[]=",
            Self::Length => "length",
            Self::Size => "size",
            Self::EmptyP => "empty?",
            Self::NilP => "nil?",
            Self::Not => "!",
            Self::Succ => "succ",
            Self::RegexpMatch2 => "=~",
        }
    }

    /// Returns the number of arguments besides the receiver.
    #[must_use]
    pub const fn argc(self) -> u32 {
        match self {
            Self::Length | Self::Size | Self::EmptyP | Self::NilP | Self::Not | Self::Succ => 0,
            Self::Aset => 2,
            _ => 1,
        }
    }

    /// Returns the instruction mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Plus => "opt_plus",
            Self::Minus => "opt_minus",
            Self::Mult => "opt_mult",
            Self::Div => "opt_div",
            Self::Mod => "opt_mod",
            Self::Eq => "opt_eq",
            Self::Lt => "opt_lt",
            Self::Le => "opt_le",
            Self::Gt => "opt_gt",
            Self::Ge => "opt_ge",
            Self::Ltlt => "opt_ltlt",
            Self::And => "opt_and",
            Self::Or => "opt_or",
            Self::Aref => "opt_aref",
            Self::Aset => "opt_aset",
            Self::Length => "opt_length",
            Self::Size => "opt_size",
            Self::EmptyP => "opt_empty_p",
            Self::NilP => "opt_nil_p",
            Self::Not => "opt_not",
            Self::Succ => "opt_succ",
            Self::RegexpMatch2 => "opt_regexpmatch2",
        }
    }

    const fn class_name(self) -> &'static str {
        match self {
            Self::Plus => "OptPlus",
            Self::Minus => "OptMinus",
            Self::Mult => "OptMult",
            Self::Div => "OptDiv",
            Self::Mod => "OptMod",
            Self::Eq => "OptEq",
            Self::Lt => "OptLt",
            Self::Le => "OptLe",
            Self::Gt => "OptGt",
            Self::Ge => "OptGe",
            Self::Ltlt => "OptLtLt",
            Self::And => "OptAnd",
            Self::Or => "OptOr",
            Self::Aref => "OptAref",
            Self::Aset => "OptAset",
            Self::Length => "OptLength",
            Self::Size => "OptSize",
            Self::EmptyP => "OptEmptyP",
            Self::NilP => "OptNilP",
            Self::Not => "OptNot",
            Self::Succ => "OptSucc",
            Self::RegexpMatch2 => "OptRegexpMatch2",
        }
    }

    /// Returns the default call descriptor for this operation.
    #[must_use]
    pub fn call_data(self) -> CallData {
        CallData::simple(self.method(), self.argc())
    }
}

/// The kind of expression tested by `defined`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DefinedKind {
    /// `defined?(nil)`.
    Nil,
    /// `defined?(@ivar)`.
    InstanceVar,
    /// `defined?(local)`.
    LocalVar,
    /// `defined?($gvar)`.
    GlobalVar,
    /// `defined?(@@cvar)`.
    ClassVar,
    /// `defined?(Const)`.
    Constant,
    /// `defined?(recv.method)`.
    Method,
    /// `defined?(yield)`.
    Yield,
    /// `defined?(super)`.
    ZSuper,
    /// `defined?(self)`.
    SelfValue,
    /// `defined?(true)`.
    True,
    /// `defined?(false)`.
    False,
    /// `defined?(a = 1)`.
    Asgn,
    /// Any other expression.
    Expr,
}

impl DefinedKind {
    /// Returns the `DEFINED_*` code used in disassembly.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Nil => 1,
            Self::InstanceVar => 2,
            Self::LocalVar => 3,
            Self::GlobalVar => 4,
            Self::ClassVar => 5,
            Self::Constant => 6,
            Self::Method => 7,
            Self::Yield => 8,
            Self::ZSuper => 9,
            Self::SelfValue => 10,
            Self::True => 11,
            Self::False => 12,
            Self::Asgn => 13,
            Self::Expr => 14,
        }
    }
}

/// The exception-handler kinds a sequence may declare.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ThrowKind {
    /// `rescue`.
    Rescue,
    /// `ensure`.
    Ensure,
    /// `retry`.
    Retry,
    /// `break`.
    Break,
    /// `next`.
    Next,
    /// `redo`.
    Redo,
}

/// A single instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    /// No-op.
    Nop,
    /// Discard the top value.
    Pop,
    /// Duplicate the top value.
    Dup,
    /// Duplicate the top `n` values.
    DupN(u32),
    /// Swap the top two values.
    Swap,
    /// Push a copy of the value `n` slots below the top.
    TopN(u32),
    /// Overwrite the value `n` slots below the top with the top.
    SetN(u32),
    /// Discard the top `n` values.
    AdjustStack(u32),

    /// Push `nil`.
    PutNil,
    /// Push the current `self`.
    PutSelf,
    /// Push a literal.
    PutObject(Value),
    /// Push `0`.
    PutObjectInt2Fix0,
    /// Push `1`.
    PutObjectInt2Fix1,
    /// Push a fresh string.
    PutString(String),
    /// Push a special VM object.
    PutSpecialObject(SpecialObject),

    /// Pop `n` values into an array.
    NewArray(u32),
    /// Push a copy of a literal array.
    DupArray(Value),
    /// Pop `2n` values into a hash.
    NewHash(u32),
    /// Push a copy of a literal hash.
    DupHash(Value),
    /// Pop `start, end` into a range.
    NewRange {
        /// `true` for `a...b`.
        exclude_end: bool,
    },
    /// Pop two arrays and push their concatenation.
    ConcatArray,
    /// Coerce the top value to an array.
    SplatArray {
        /// Copy the array rather than sharing it.
        copy: bool,
    },
    /// Pop `n` strings and push their concatenation.
    ConcatStrings(u32),
    /// Pop `count` strings and push a regexp built from them.
    ToRegexp {
        /// Regexp option bits.
        options: u32,
        /// Number of source fragments.
        count: u32,
    },
    /// Convert the top string to a symbol.
    Intern,
    /// Call `to_s` on the top value.
    ObjToString(CallData),
    /// Pop `(obj, str)` and keep `str` if it is a string, else a generic rendering of `obj`.
    AnyToString,
    /// Pop an array and push `size` of its elements.
    ExpandArray {
        /// Number of elements to push.
        size: u32,
        /// Expansion flags.
        flag: u32,
    },
    /// Pop `n` values and push their minimum via the object model.
    OptNewArrayMin(u32),
    /// Pop `n` values and push their maximum via the object model.
    OptNewArrayMax(u32),
    /// Push a frozen string literal (`"lit".freeze`).
    OptStrFreeze {
        /// The literal.
        value: String,
        /// Call descriptor of `freeze`.
        call_data: CallData,
    },
    /// Push a deduplicated string literal (`-"lit"`).
    OptStrUminus {
        /// The literal.
        value: String,
        /// Call descriptor of `-@`.
        call_data: CallData,
    },

    /// Read a local `level` scopes up.
    GetLocal {
        /// Local name, for diagnostics.
        name: String,
        /// Slot index.
        index: u32,
        /// Lexical depth.
        level: u32,
    },
    /// Write a local `level` scopes up.
    SetLocal {
        /// Local name, for diagnostics.
        name: String,
        /// Slot index.
        index: u32,
        /// Lexical depth.
        level: u32,
    },
    /// Read a local of the current scope.
    GetLocalWC0 {
        /// Local name, for diagnostics.
        name: String,
        /// Slot index.
        index: u32,
    },
    /// Read a local of the enclosing scope.
    GetLocalWC1 {
        /// Local name, for diagnostics.
        name: String,
        /// Slot index.
        index: u32,
    },
    /// Write a local of the current scope.
    SetLocalWC0 {
        /// Local name, for diagnostics.
        name: String,
        /// Slot index.
        index: u32,
    },
    /// Write a local of the enclosing scope.
    SetLocalWC1 {
        /// Local name, for diagnostics.
        name: String,
        /// Slot index.
        index: u32,
    },

    /// Push a global variable.
    GetGlobal(String),
    /// Pop into a global variable.
    SetGlobal(String),
    /// Pop `(scope, allow_nil)` and push a constant.
    GetConstant(String),

    /// Unconditional jump.
    Jump(Label),
    /// Pop a condition and jump if truthy.
    BranchIf(Label),
    /// Pop a condition and jump if falsy.
    BranchUnless(Label),
    /// Pop a condition and jump if `nil`.
    BranchNil(Label),
    /// Pop a key and jump through a literal table.
    OptCaseDispatch {
        /// `(key, target)` pairs.
        cases: Vec<(Value, Label)>,
        /// Target when no key matches.
        else_label: Label,
    },
    /// Return the top value from the current sequence.
    Leave,

    /// General method call, optionally with a block body.
    Send {
        /// Call descriptor.
        call_data: CallData,
        /// Block body passed to the callee.
        block: Option<Rc<InstructionSequence>>,
    },
    /// Method call without a block.
    OptSendWithoutBlock(CallData),
    /// Call the current frame's block.
    InvokeBlock(CallData),
    /// Register a method body on the class of `self`.
    DefineMethod {
        /// Method name.
        name: String,
        /// Method body.
        iseq: Rc<InstructionSequence>,
    },
    /// Specialised object-model call.
    Opt {
        /// The operation.
        op: OptOp,
        /// Call descriptor.
        call_data: CallData,
    },
    /// `a != b`, carrying the descriptors for both `==` and `!=`.
    OptNeq {
        /// Descriptor of `==`.
        eq: CallData,
        /// Descriptor of `!=`.
        neq: CallData,
    },
    /// `recv["key"]` with a literal string key.
    OptArefWith {
        /// The key.
        key: String,
        /// Call descriptor.
        call_data: CallData,
    },
    /// `recv["key"] = value` with a literal string key.
    OptAsetWith {
        /// The key.
        key: String,
        /// Call descriptor.
        call_data: CallData,
    },

    /// Pop a value and push `value` if the tested expression is defined, else `nil`.
    Defined {
        /// What is tested.
        kind: DefinedKind,
        /// Operand of the test (a name for variables and constants).
        object: Value,
        /// Value pushed on success.
        value: Value,
    },
    /// Push the inline cache value (always `nil`).
    OptGetInlineCache {
        /// Label past the cached computation.
        label: Label,
        /// Cache slot.
        cache: u32,
    },
    /// Store into an inline cache; leaves the value in place.
    OptSetInlineCache {
        /// Cache slot.
        cache: u32,
    },
}

impl Instr {
    /// Number of operand-stack values consumed.
    #[must_use]
    pub fn reads(&self) -> usize {
        let n = match self {
            Self::Nop
            | Self::PutNil
            | Self::PutSelf
            | Self::PutObject(_)
            | Self::PutObjectInt2Fix0
            | Self::PutObjectInt2Fix1
            | Self::PutString(_)
            | Self::PutSpecialObject(_)
            | Self::DupArray(_)
            | Self::DupHash(_)
            | Self::OptStrFreeze { .. }
            | Self::OptStrUminus { .. }
            | Self::GetLocal { .. }
            | Self::GetLocalWC0 { .. }
            | Self::GetLocalWC1 { .. }
            | Self::GetGlobal(_)
            | Self::Jump(_)
            | Self::DefineMethod { .. }
            | Self::OptGetInlineCache { .. } => 0,
            Self::Pop
            | Self::Dup
            | Self::SplatArray { .. }
            | Self::Intern
            | Self::ObjToString(_)
            | Self::ExpandArray { .. }
            | Self::SetLocal { .. }
            | Self::SetLocalWC0 { .. }
            | Self::SetLocalWC1 { .. }
            | Self::SetGlobal(_)
            | Self::BranchIf(_)
            | Self::BranchUnless(_)
            | Self::BranchNil(_)
            | Self::OptCaseDispatch { .. }
            | Self::Leave
            | Self::OptArefWith { .. }
            | Self::Defined { .. }
            | Self::OptSetInlineCache { .. } => 1,
            Self::Swap
            | Self::NewRange { .. }
            | Self::ConcatArray
            | Self::AnyToString
            | Self::GetConstant(_)
            | Self::OptNeq { .. }
            | Self::OptAsetWith { .. } => 2,
            Self::DupN(n)
            | Self::AdjustStack(n)
            | Self::NewArray(n)
            | Self::ConcatStrings(n)
            | Self::OptNewArrayMin(n)
            | Self::OptNewArrayMax(n) => *n,
            Self::TopN(n) | Self::SetN(n) => *n + 1,
            Self::NewHash(n) => *n * 2,
            Self::ToRegexp { count, .. } => *count,
            Self::Send { call_data, .. } | Self::OptSendWithoutBlock(call_data) => {
                call_data.argc() + 1
            }
            Self::InvokeBlock(call_data) => call_data.argc(),
            Self::Opt { op, .. } => op.argc() + 1,
        };
        n as usize
    }

    /// Number of operand-stack values produced.
    #[must_use]
    pub fn writes(&self) -> usize {
        let n = match self {
            Self::Nop
            | Self::Pop
            | Self::AdjustStack(_)
            | Self::SetLocal { .. }
            | Self::SetLocalWC0 { .. }
            | Self::SetLocalWC1 { .. }
            | Self::SetGlobal(_)
            | Self::Jump(_)
            | Self::BranchIf(_)
            | Self::BranchUnless(_)
            | Self::BranchNil(_)
            | Self::OptCaseDispatch { .. }
            | Self::Leave
            | Self::DefineMethod { .. } => 0,
            Self::Dup | Self::Swap => 2,
            Self::DupN(n) => *n * 2,
            Self::TopN(n) => *n + 2,
            Self::SetN(n) => *n + 1,
            Self::ExpandArray { size, .. } => *size,
            _ => 1,
        };
        n as usize
    }

    /// Returns `true` if the instruction may transfer control to a label.
    #[must_use]
    pub fn branches(&self) -> bool {
        matches!(
            self,
            Self::Jump(_)
                | Self::BranchIf(_)
                | Self::BranchUnless(_)
                | Self::BranchNil(_)
                | Self::OptCaseDispatch { .. }
        )
    }

    /// Returns `true` for conditional branches that may continue with the next instruction.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            Self::BranchIf(_) | Self::BranchUnless(_) | Self::BranchNil(_)
        )
    }

    /// Returns `true` if the instruction returns from the sequence.
    #[must_use]
    pub fn leaves(&self) -> bool {
        matches!(self, Self::Leave)
    }

    /// Returns `true` unless the instruction is a pure operand-stack transformation.
    ///
    /// Side-effect-free instructions are only ordered by the values they consume, so graph
    /// analyses may float them freely.
    #[must_use]
    pub fn side_effects(&self) -> bool {
        !matches!(
            self,
            Self::Nop
                | Self::Pop
                | Self::Dup
                | Self::DupN(_)
                | Self::Swap
                | Self::TopN(_)
                | Self::SetN(_)
                | Self::AdjustStack(_)
                | Self::PutNil
                | Self::PutSelf
                | Self::PutObject(_)
                | Self::PutObjectInt2Fix0
                | Self::PutObjectInt2Fix1
                | Self::PutString(_)
                | Self::PutSpecialObject(_)
                | Self::NewArray(_)
                | Self::DupArray(_)
                | Self::NewHash(_)
                | Self::DupHash(_)
                | Self::NewRange { .. }
                | Self::ConcatArray
                | Self::SplatArray { .. }
                | Self::ConcatStrings(_)
                | Self::ToRegexp { .. }
                | Self::Intern
                | Self::AnyToString
                | Self::ExpandArray { .. }
                | Self::OptStrFreeze { .. }
                | Self::OptStrUminus { .. }
                | Self::Defined { .. }
                | Self::OptGetInlineCache { .. }
                | Self::OptSetInlineCache { .. }
        )
    }

    /// Visits every branch target, in the order control may take them.
    ///
    /// Duplicate targets (e.g. two `opt_case_dispatch` keys sharing a body) are visited once.
    pub fn for_each_branch_target(&self, mut f: impl FnMut(Label)) {
        match self {
            Self::Jump(l) | Self::BranchIf(l) | Self::BranchUnless(l) | Self::BranchNil(l) => {
                f(*l);
            }
            Self::OptCaseDispatch { cases, else_label } => {
                let mut seen: Vec<Label> = Vec::with_capacity(cases.len() + 1);
                for label in cases.iter().map(|(_, l)| *l).chain([*else_label]) {
                    if !seen.contains(&label) {
                        seen.push(label);
                        f(label);
                    }
                }
            }
            _ => {}
        }
    }

    /// Visits every label operand, including non-branching ones.
    pub fn for_each_label(&self, mut f: impl FnMut(Label)) {
        match self {
            Self::OptGetInlineCache { label, .. } => f(*label),
            _ => self.for_each_branch_target(f),
        }
    }

    /// Returns the call descriptor of call-like instructions.
    #[must_use]
    pub fn call_data(&self) -> Option<&CallData> {
        match self {
            Self::Send { call_data, .. }
            | Self::OptSendWithoutBlock(call_data)
            | Self::InvokeBlock(call_data)
            | Self::ObjToString(call_data)
            | Self::Opt { call_data, .. }
            | Self::OptArefWith { call_data, .. }
            | Self::OptAsetWith { call_data, .. }
            | Self::OptStrFreeze { call_data, .. }
            | Self::OptStrUminus { call_data, .. } => Some(call_data),
            Self::OptNeq { neq, .. } => Some(neq),
            _ => None,
        }
    }

    /// Returns the nested sequence owned by this instruction, if any.
    #[must_use]
    pub fn child_iseq(&self) -> Option<&Rc<InstructionSequence>> {
        match self {
            Self::Send { block, .. } => block.as_ref(),
            Self::DefineMethod { iseq, .. } => Some(iseq),
            _ => None,
        }
    }

    /// Returns the YARV mnemonic.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Pop => "pop",
            Self::Dup => "dup",
            Self::DupN(_) => "dupn",
            Self::Swap => "swap",
            Self::TopN(_) => "topn",
            Self::SetN(_) => "setn",
            Self::AdjustStack(_) => "adjuststack",
            Self::PutNil => "putnil",
            Self::PutSelf => "putself",
            Self::PutObject(_) => "putobject",
            Self::PutObjectInt2Fix0 => "putobject_INT2FIX_0_",
            Self::PutObjectInt2Fix1 => "putobject_INT2FIX_1_",
            Self::PutString(_) => "putstring",
            Self::PutSpecialObject(_) => "putspecialobject",
            Self::NewArray(_) => "newarray",
            Self::DupArray(_) => "duparray",
            Self::NewHash(_) => "newhash",
            Self::DupHash(_) => "duphash",
            Self::NewRange { .. } => "newrange",
            Self::ConcatArray => "concatarray",
            Self::SplatArray { .. } => "splatarray",
            Self::ConcatStrings(_) => "concatstrings",
            Self::ToRegexp { .. } => "toregexp",
            Self::Intern => "intern",
            Self::ObjToString(_) => "objtostring",
            Self::AnyToString => "anytostring",
            Self::ExpandArray { .. } => "expandarray",
            Self::OptNewArrayMin(_) => "opt_newarray_min",
            Self::OptNewArrayMax(_) => "opt_newarray_max",
            Self::OptStrFreeze { .. } => "opt_str_freeze",
            Self::OptStrUminus { .. } => "opt_str_uminus",
            Self::GetLocal { .. } => "getlocal",
            Self::SetLocal { .. } => "setlocal",
            Self::GetLocalWC0 { .. } => "getlocal_WC_0",
            Self::GetLocalWC1 { .. } => "getlocal_WC_1",
            Self::SetLocalWC0 { .. } => "setlocal_WC_0",
            Self::SetLocalWC1 { .. } => "setlocal_WC_1",
            Self::GetGlobal(_) => "getglobal",
            Self::SetGlobal(_) => "setglobal",
            Self::GetConstant(_) => "getconstant",
            Self::Jump(_) => "jump",
            Self::BranchIf(_) => "branchif",
            Self::BranchUnless(_) => "branchunless",
            Self::BranchNil(_) => "branchnil",
            Self::OptCaseDispatch { .. } => "opt_case_dispatch",
            Self::Leave => "leave",
            Self::Send { .. } => "send",
            Self::OptSendWithoutBlock(_) => "opt_send_without_block",
            Self::InvokeBlock(_) => "invokeblock",
            Self::DefineMethod { .. } => "definemethod",
            Self::Opt { op, .. } => op.mnemonic(),
            Self::OptNeq { .. } => "opt_neq",
            Self::OptArefWith { .. } => "opt_aref_with",
            Self::OptAsetWith { .. } => "opt_aset_with",
            Self::Defined { .. } => "defined",
            Self::OptGetInlineCache { .. } => "opt_getinlinecache",
            Self::OptSetInlineCache { .. } => "opt_setinlinecache",
        }
    }

    /// Returns the CamelCase instruction class name used in graph labels.
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Nop => "Nop",
            Self::Pop => "Pop",
            Self::Dup => "Dup",
            Self::DupN(_) => "DupN",
            Self::Swap => "Swap",
            Self::TopN(_) => "TopN",
            Self::SetN(_) => "SetN",
            Self::AdjustStack(_) => "AdjustStack",
            Self::PutNil => "PutNil",
            Self::PutSelf => "PutSelf",
            Self::PutObject(_) => "PutObject",
            Self::PutObjectInt2Fix0 => "PutObjectInt2Fix0",
            Self::PutObjectInt2Fix1 => "PutObjectInt2Fix1",
            Self::PutString(_) => "PutString",
            Self::PutSpecialObject(_) => "PutSpecialObject",
            Self::NewArray(_) => "NewArray",
            Self::DupArray(_) => "DupArray",
            Self::NewHash(_) => "NewHash",
            Self::DupHash(_) => "DupHash",
            Self::NewRange { .. } => "NewRange",
            Self::ConcatArray => "ConcatArray",
            Self::SplatArray { .. } => "SplatArray",
            Self::ConcatStrings(_) => "ConcatStrings",
            Self::ToRegexp { .. } => "ToRegexp",
            Self::Intern => "Intern",
            Self::ObjToString(_) => "ObjToString",
            Self::AnyToString => "AnyToString",
            Self::ExpandArray { .. } => "ExpandArray",
            Self::OptNewArrayMin(_) => "OptNewArrayMin",
            Self::OptNewArrayMax(_) => "OptNewArrayMax",
            Self::OptStrFreeze { .. } => "OptStrFreeze",
            Self::OptStrUminus { .. } => "OptStrUminus",
            Self::GetLocal { .. } => "GetLocal",
            Self::SetLocal { .. } => "SetLocal",
            Self::GetLocalWC0 { .. } => "GetLocalWC0",
            Self::GetLocalWC1 { .. } => "GetLocalWC1",
            Self::SetLocalWC0 { .. } => "SetLocalWC0",
            Self::SetLocalWC1 { .. } => "SetLocalWC1",
            Self::GetGlobal(_) => "GetGlobal",
            Self::SetGlobal(_) => "SetGlobal",
            Self::GetConstant(_) => "GetConstant",
            Self::Jump(_) => "Jump",
            Self::BranchIf(_) => "BranchIf",
            Self::BranchUnless(_) => "BranchUnless",
            Self::BranchNil(_) => "BranchNil",
            Self::OptCaseDispatch { .. } => "OptCaseDispatch",
            Self::Leave => "Leave",
            Self::Send { .. } => "Send",
            Self::OptSendWithoutBlock(_) => "OptSendWithoutBlock",
            Self::InvokeBlock(_) => "InvokeBlock",
            Self::DefineMethod { .. } => "DefineMethod",
            Self::Opt { op, .. } => op.class_name(),
            Self::OptNeq { .. } => "OptNeq",
            Self::OptArefWith { .. } => "OptArefWith",
            Self::OptAsetWith { .. } => "OptAsetWith",
            Self::Defined { .. } => "Defined",
            Self::OptGetInlineCache { .. } => "OptGetInlineCache",
            Self::OptSetInlineCache { .. } => "OptSetInlineCache",
        }
    }

    /// Returns `(index, level)` for local-variable instructions.
    #[must_use]
    pub fn local_slot(&self) -> Option<(u32, u32)> {
        match self {
            Self::GetLocal { index, level, .. } | Self::SetLocal { index, level, .. } => {
                Some((*index, *level))
            }
            Self::GetLocalWC0 { index, .. } | Self::SetLocalWC0 { index, .. } => Some((*index, 0)),
            Self::GetLocalWC1 { index, .. } | Self::SetLocalWC1 { index, .. } => Some((*index, 1)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::call_data::CallFlags;
    use alloc::vec;

    fn label(n: u32) -> Label {
        Label(n)
    }

    #[test]
    fn stack_effects_of_stack_shuffles() {
        assert_eq!((Instr::Dup.reads(), Instr::Dup.writes()), (1, 2));
        assert_eq!((Instr::Swap.reads(), Instr::Swap.writes()), (2, 2));
        assert_eq!((Instr::TopN(2).reads(), Instr::TopN(2).writes()), (3, 4));
        assert_eq!((Instr::SetN(1).reads(), Instr::SetN(1).writes()), (2, 2));
        assert_eq!((Instr::DupN(3).reads(), Instr::DupN(3).writes()), (3, 6));
        assert_eq!(
            (Instr::AdjustStack(2).reads(), Instr::AdjustStack(2).writes()),
            (2, 0)
        );
        assert_eq!((Instr::NewHash(2).reads(), Instr::NewHash(2).writes()), (4, 1));
    }

    #[test]
    fn calls_consume_receiver_and_arguments() {
        let send = Instr::OptSendWithoutBlock(CallData::fcall("fib", 1));
        assert_eq!((send.reads(), send.writes()), (2, 1));
        let aset = Instr::Opt {
            op: OptOp::Aset,
            call_data: OptOp::Aset.call_data(),
        };
        assert_eq!((aset.reads(), aset.writes()), (3, 1));
        let not = Instr::Opt {
            op: OptOp::Not,
            call_data: OptOp::Not.call_data(),
        };
        assert_eq!((not.reads(), not.writes()), (1, 1));
        let yield_two = Instr::InvokeBlock(CallData::new(None, 2, CallFlags::NONE));
        assert_eq!((yield_two.reads(), yield_two.writes()), (2, 1));
    }

    #[test]
    fn control_flow_classification() {
        assert!(Instr::Jump(label(0)).branches(), "jump branches");
        assert!(!Instr::Jump(label(0)).falls_through(), "jump never falls through");
        assert!(Instr::BranchNil(label(0)).falls_through(), "branchnil falls through");
        assert!(Instr::Leave.leaves(), "leave leaves");
        assert!(!Instr::Leave.branches(), "leave does not branch");
        let getic = Instr::OptGetInlineCache {
            label: label(0),
            cache: 0,
        };
        assert!(!getic.branches(), "inline cache fetch does not branch");
    }

    #[test]
    fn side_effect_flags() {
        assert!(!Instr::PutObject(Value::Integer(1)).side_effects(), "literal is pure");
        assert!(!Instr::Pop.side_effects(), "pop is pure");
        assert!(
            Instr::Opt {
                op: OptOp::Plus,
                call_data: OptOp::Plus.call_data()
            }
            .side_effects(),
            "calls are effects"
        );
        assert!(
            Instr::GetLocalWC0 {
                name: "n".into(),
                index: 0
            }
            .side_effects(),
            "local reads are ordered"
        );
        assert!(Instr::Leave.side_effects(), "leave is an effect");
    }

    #[test]
    fn case_dispatch_targets_are_deduplicated_in_order() {
        let instr = Instr::OptCaseDispatch {
            cases: vec![
                (Value::Integer(1), label(3)),
                (Value::Integer(2), label(1)),
                (Value::Integer(3), label(3)),
            ],
            else_label: label(1),
        };
        let mut seen = vec![];
        instr.for_each_branch_target(|l| seen.push(l.id()));
        assert_eq!(seen, [3, 1]);
    }

    #[test]
    fn names_and_class_names() {
        assert_eq!(Instr::PutObjectInt2Fix0.name(), "putobject_INT2FIX_0_");
        assert_eq!(Instr::PutObjectInt2Fix0.class_name(), "PutObjectInt2Fix0");
        let set = Instr::SetLocalWC0 {
            name: "n".into(),
            index: 0,
        };
        assert_eq!(set.name(), "setlocal_WC_0");
        assert_eq!(set.class_name(), "SetLocalWC0");
        assert_eq!(set.local_slot(), Some((0, 0)));
    }
}
