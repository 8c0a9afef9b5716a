// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Textual disassembly.
//!
//! The layout follows `RubyVM::InstructionSequence#disasm`: one `%04d` program counter, the
//! mnemonic padded to 38 columns and the rendered operands. Instructions without operands print
//! the mnemonic alone. Graph listings reuse [`instr_line`] and add their own annotations.

use alloc::string::String;
use core::fmt::{self, Write as _};

use crate::instr::{Instr, Label};
use crate::iseq::InstructionSequence;

/// Renders the operands of the instruction at `pc`, or nothing for operand-less instructions.
#[derive(Copy, Clone, Debug)]
pub struct Operands<'a> {
    iseq: &'a InstructionSequence,
    instr: &'a Instr,
}

impl<'a> Operands<'a> {
    /// Operands of `instr`, resolving labels through `iseq`.
    #[must_use]
    pub fn new(iseq: &'a InstructionSequence, instr: &'a Instr) -> Self {
        Self { iseq, instr }
    }

    fn label(&self, f: &mut fmt::Formatter<'_>, label: Label) -> fmt::Result {
        match self.iseq.label_target(label) {
            Some(target) => write!(f, "label_{} ({target})", label.id()),
            None => write!(f, "label_{}", label.id()),
        }
    }
}

impl fmt::Display for Operands<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instr {
            Instr::DupN(n)
            | Instr::TopN(n)
            | Instr::SetN(n)
            | Instr::AdjustStack(n)
            | Instr::NewArray(n)
            | Instr::ConcatStrings(n)
            | Instr::OptNewArrayMin(n)
            | Instr::OptNewArrayMax(n) => write!(f, "{n}"),
            Instr::NewHash(pairs) => write!(f, "{}", pairs * 2),
            Instr::PutObject(v) | Instr::DupArray(v) | Instr::DupHash(v) => {
                write!(f, "{}", v.inspect())
            }
            Instr::PutString(s) => write!(f, "{s:?}"),
            Instr::PutSpecialObject(o) => write!(f, "{}", o.code()),
            Instr::NewRange { exclude_end } => write!(f, "{}", u8::from(*exclude_end)),
            Instr::SplatArray { copy } => write!(f, "{copy}"),
            Instr::ToRegexp { options, count } => write!(f, "{options}, {count}"),
            Instr::ExpandArray { size, flag } => write!(f, "{size}, {flag}"),
            Instr::ObjToString(cd)
            | Instr::OptSendWithoutBlock(cd)
            | Instr::InvokeBlock(cd)
            | Instr::Opt { call_data: cd, .. } => write!(f, "{cd}"),
            Instr::OptStrFreeze { value, call_data }
            | Instr::OptStrUminus { value, call_data }
            | Instr::OptArefWith {
                key: value,
                call_data,
            }
            | Instr::OptAsetWith {
                key: value,
                call_data,
            } => write!(f, "{value:?}, {call_data}"),
            Instr::GetLocalWC0 { name, index }
            | Instr::GetLocalWC1 { name, index }
            | Instr::SetLocalWC0 { name, index }
            | Instr::SetLocalWC1 { name, index } => write!(f, "{name}@{index}"),
            Instr::GetLocal { name, index, level } | Instr::SetLocal { name, index, level } => {
                write!(f, "{name}@{index}, {level}")
            }
            Instr::GetGlobal(name) | Instr::SetGlobal(name) | Instr::GetConstant(name) => {
                write!(f, ":{name}")
            }
            Instr::Jump(l) | Instr::BranchIf(l) | Instr::BranchUnless(l) | Instr::BranchNil(l) => {
                self.label(f, *l)
            }
            Instr::OptCaseDispatch { cases, else_label } => {
                f.write_str("{")?;
                for (i, (value, label)) in cases.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}=>", value.inspect())?;
                    self.label(f, *label)?;
                }
                f.write_str("}, ")?;
                self.label(f, *else_label)
            }
            Instr::Send { call_data, block } => {
                write!(f, "{call_data}, ")?;
                match block {
                    Some(body) => f.write_str(body.name()),
                    None => f.write_str("nil"),
                }
            }
            Instr::DefineMethod { name, iseq } => write!(f, ":{name}, {}", iseq.name()),
            Instr::OptNeq { eq, neq } => write!(f, "{eq}, {neq}"),
            Instr::Defined {
                kind,
                object,
                value,
            } => write!(f, "{}, {}, {}", kind.code(), object.inspect(), value.inspect()),
            Instr::OptGetInlineCache { label, cache } => {
                self.label(f, *label)?;
                write!(f, ", <is:{cache}>")
            }
            Instr::OptSetInlineCache { cache } => write!(f, "<is:{cache}>"),
            Instr::Nop
            | Instr::Pop
            | Instr::Dup
            | Instr::Swap
            | Instr::PutNil
            | Instr::PutSelf
            | Instr::PutObjectInt2Fix0
            | Instr::PutObjectInt2Fix1
            | Instr::ConcatArray
            | Instr::Intern
            | Instr::AnyToString
            | Instr::Leave => Ok(()),
        }
    }
}

/// Renders the instruction at `pc` as `%04d mnemonic operands`, without a trailing newline.
///
/// Returns an empty string when `pc` is out of range.
#[must_use]
pub fn instr_line(iseq: &InstructionSequence, pc: usize) -> String {
    let mut out = String::new();
    if let Some(instr) = iseq.insns().get(pc) {
        let _ = write_instr(&mut out, iseq, pc, instr);
    }
    out
}

fn write_instr(
    out: &mut String,
    iseq: &InstructionSequence,
    pc: usize,
    instr: &Instr,
) -> fmt::Result {
    let operands = Operands::new(iseq, instr);
    let start = out.len();
    write!(out, "{pc:04} {:<38} {operands}", instr.name())?;
    let trimmed = out[start..].trim_end().len();
    out.truncate(start + trimmed);
    Ok(())
}

impl InstructionSequence {
    /// Disassembles this sequence (not its children).
    ///
    /// ```
    /// use yarv_tape::asm::Asm;
    /// use yarv_tape::value::Value;
    ///
    /// let mut a = Asm::top();
    /// a.putobject(Value::Integer(2));
    /// a.leave();
    /// let iseq = a.build()?;
    /// assert_eq!(
    ///     iseq.disasm(),
    ///     "== disasm #<ISeq:<compiled>> (catch: FALSE)\n\
    ///      0000 putobject                              2\n\
    ///      0001 leave\n"
    /// );
    /// # Ok::<(), yarv_tape::asm::BuildError>(())
    /// ```
    #[must_use]
    pub fn disasm(&self) -> String {
        let mut out = String::new();
        let catch = if self.throw_handlers().is_empty() {
            "FALSE"
        } else {
            "TRUE"
        };
        let _ = writeln!(out, "== disasm #<ISeq:{}> (catch: {catch})", self.name());
        for (pc, instr) in self.insns().iter().enumerate() {
            let _ = write_instr(&mut out, self, pc, instr);
            out.push('\n');
        }
        out
    }
}
