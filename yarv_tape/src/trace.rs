// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Execution trace hooks.
//!
//! A [`TraceSink`] observes a run. The sink's [`TraceSink::mask`] selects which callbacks the VM
//! delivers; a run without a sink, or with [`TraceMask::NONE`], pays only a branch per hook.

use core::ops::{BitOr, BitOrAssign};

use crate::instr::Instr;
use crate::iseq::InstructionSequence;
use crate::vm::VmFault;

/// A set of trace event classes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceMask(u8);

impl TraceMask {
    /// No events.
    pub const NONE: Self = Self(0);
    /// [`TraceSink::run_start`] and [`TraceSink::run_end`].
    pub const RUN: Self = Self(1 << 0);
    /// [`TraceSink::instr`] before every instruction.
    pub const INSTR: Self = Self(1 << 1);
    /// Scope events for VM frames.
    pub const CALL: Self = Self(1 << 2);
    /// Scope events for host calls.
    pub const HOST: Self = Self(1 << 3);

    /// Returns `true` if every bit in `other` is set.
    #[must_use]
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if no bits are set.
    #[must_use]
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TraceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// What kind of scope was entered or exited.
#[derive(Copy, Clone, Debug)]
pub enum ScopeKind<'a> {
    /// A VM frame running `iseq` (method, block or top-level body).
    Frame {
        /// The sequence running in the frame.
        iseq: &'a InstructionSequence,
    },
    /// A call delegated to the host.
    HostCall {
        /// Method name.
        method: &'a str,
    },
}

impl ScopeKind<'_> {
    /// Returns `true` for [`ScopeKind::HostCall`].
    #[must_use]
    #[inline]
    pub fn is_host_call(&self) -> bool {
        matches!(self, Self::HostCall { .. })
    }
}

/// How a run ended.
#[derive(Copy, Clone, Debug)]
pub enum TraceOutcome<'a> {
    /// The run returned normally.
    Ok,
    /// The run failed.
    Fault(&'a VmFault),
}

/// Receives execution events.
///
/// Every method has a no-op default, so sinks only implement what they need.
pub trait TraceSink {
    /// Events this sink wants.
    fn mask(&self) -> TraceMask {
        TraceMask::NONE
    }

    /// A top-level run is about to start.
    fn run_start(&mut self, _iseq: &InstructionSequence) {}

    /// A top-level run ended.
    fn run_end(&mut self, _iseq: &InstructionSequence, _outcome: TraceOutcome<'_>) {}

    /// `instr` at `pc` is about to execute with `stack_depth` operands on the stack.
    fn instr(
        &mut self,
        _iseq: &InstructionSequence,
        _pc: usize,
        _instr: &Instr,
        _stack_depth: usize,
    ) {
    }

    /// A scope was entered at frame `depth`; `pc` is the caller's call site.
    fn scope_enter(&mut self, _kind: ScopeKind<'_>, _depth: usize, _pc: usize) {}

    /// A scope was exited, normally or not.
    fn scope_exit(&mut self, _kind: ScopeKind<'_>, _depth: usize, _pc: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_contains_and_union() {
        let mask = TraceMask::CALL | TraceMask::HOST;
        assert!(mask.contains(TraceMask::CALL), "CALL set");
        assert!(mask.contains(TraceMask::HOST), "HOST set");
        assert!(!mask.contains(TraceMask::INSTR), "INSTR unset");
        assert!(TraceMask::NONE.is_empty(), "NONE is empty");
        assert!(mask.contains(TraceMask::NONE), "every mask contains NONE");
    }
}
