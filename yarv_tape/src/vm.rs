// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The interpreter.
//!
//! [`Vm`] runs an [`InstructionSequence`] against an [`ExecutionContext`] (operand stack, frame
//! stack, globals and the method table) and a [`Host`] object model.
//!
//! Notes:
//!
//! - Every call into a sequence snapshots the program counter and operand-stack depth, pushes a
//!   [`Frame`], and restores both on the way out, whether the body returned or failed. A failing
//!   run therefore leaves the stack exactly as deep as it was before the call.
//! - Calls resolve against the VM method table first (keyed by receiver class name and method
//!   name) and are delegated to the host otherwise.
//! - Nested VM calls recurse on the native stack; [`Limits::max_call_depth`] bounds them.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::host::{Block, Host, HostError};
use crate::instr::{DefinedKind, Instr, Label};
use crate::iseq::InstructionSequence;
use crate::trace::{ScopeKind, TraceMask, TraceOutcome, TraceSink};
use crate::value::Value;

/// Resource limits for a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of instructions executed per run.
    pub fuel: u64,
    /// Maximum number of live frames.
    pub max_call_depth: usize,
    /// Maximum number of calls delegated to the host per run.
    pub max_host_calls: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            fuel: 1_000_000,
            max_call_depth: 256,
            max_host_calls: 1_000_000,
        }
    }
}

/// A runtime failure kind.
#[derive(Clone, Debug, PartialEq)]
pub enum VmError {
    /// An instruction read more operands than its frame owns.
    StackUnderflow,
    /// A local was read before being assigned, or does not exist.
    UndefinedLocal {
        /// Local name.
        name: String,
        /// Slot index.
        index: u32,
        /// Lexical depth.
        level: u32,
    },
    /// A constant could not be resolved.
    UndefinedConstant {
        /// Constant name.
        name: String,
    },
    /// A VM-defined method was called with a parameter shape the VM does not bind.
    UnsupportedCallShape {
        /// Method name.
        method: String,
        /// Supplied argument count.
        argc: usize,
    },
    /// `invokeblock` in a frame without a block.
    NoBlockGiven,
    /// A branch named a label the sequence does not bind.
    BadLabel {
        /// Label id.
        label: u32,
    },
    /// Execution ran past the last instruction.
    PcOutOfRange {
        /// The offending program counter.
        pc: usize,
    },
    /// An operand had the wrong type for a VM-implemented instruction.
    TypeMismatch {
        /// Expected class name.
        expected: &'static str,
        /// Actual class name.
        actual: String,
    },
    /// The instruction form is not implemented.
    Unsupported {
        /// Instruction mnemonic.
        instr: &'static str,
        /// What is missing.
        reason: &'static str,
    },
    /// The host object model failed.
    Host(HostError),
    /// [`Limits::fuel`] was exhausted.
    FuelExceeded,
    /// [`Limits::max_call_depth`] was exceeded.
    CallDepthExceeded,
    /// [`Limits::max_host_calls`] was exceeded.
    HostCallLimitExceeded,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow => f.write_str("operand stack underflow"),
            Self::UndefinedLocal { name, index, level } => write!(
                f,
                "local variable `{name}' ({index}@{level}) used before assignment"
            ),
            Self::UndefinedConstant { name } => write!(f, "uninitialized constant {name}"),
            Self::UnsupportedCallShape { method, argc } => write!(
                f,
                "unsupported parameter shape for `{method}' called with {argc} arguments"
            ),
            Self::NoBlockGiven => f.write_str("no block given (yield)"),
            Self::BadLabel { label } => write!(f, "label_{label} is not bound"),
            Self::PcOutOfRange { pc } => write!(f, "pc {pc} is past the end of the sequence"),
            Self::TypeMismatch { expected, actual } => {
                write!(f, "expected {expected}, got {actual}")
            }
            Self::Unsupported { instr, reason } => write!(f, "{instr}: unsupported {reason}"),
            Self::Host(e) => write!(f, "host error: {e}"),
            Self::FuelExceeded => f.write_str("fuel exhausted"),
            Self::CallDepthExceeded => f.write_str("call depth exceeded"),
            Self::HostCallLimitExceeded => f.write_str("host call limit exceeded"),
        }
    }
}

impl core::error::Error for VmError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Host(e) => Some(e),
            _ => None,
        }
    }
}

/// A runtime failure with its location.
#[derive(Clone, Debug, PartialEq)]
pub struct VmFault {
    /// Name of the sequence that failed.
    pub iseq: String,
    /// Index of the failing instruction.
    pub pc: usize,
    /// What went wrong.
    pub error: VmError,
}

impl fmt::Display for VmFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {}:{:04})", self.error, self.iseq, self.pc)
    }
}

impl core::error::Error for VmFault {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// State of a local-variable slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Local {
    /// Never assigned. Distinct from holding `nil`.
    #[default]
    Uninit,
    /// Holds a value.
    Set(Value),
}

/// A block closure: its body, the `self` it captured and the frame that created it.
#[derive(Clone, Debug)]
struct BlockHandle {
    iseq: Rc<InstructionSequence>,
    self_value: Value,
    parent: usize,
}

/// An activation record.
#[derive(Clone, Debug)]
pub struct Frame {
    iseq: Rc<InstructionSequence>,
    self_value: Value,
    locals: Vec<Local>,
    /// Lexically enclosing frame, for blocks.
    parent: Option<usize>,
    block: Option<BlockHandle>,
    saved_pc: usize,
    saved_depth: usize,
}

impl Frame {
    /// The sequence running in this frame.
    #[must_use]
    #[inline]
    pub fn iseq(&self) -> &InstructionSequence {
        &self.iseq
    }

    /// The frame's `self`.
    #[must_use]
    #[inline]
    pub fn self_value(&self) -> &Value {
        &self.self_value
    }

    /// The frame's locals.
    #[must_use]
    #[inline]
    pub fn locals(&self) -> &[Local] {
        &self.locals
    }

    /// Index of the lexically enclosing frame.
    #[must_use]
    #[inline]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Returns `true` if the frame was called with a block.
    #[must_use]
    #[inline]
    pub fn has_block(&self) -> bool {
        self.block.is_some()
    }
}

/// Per-evaluation interpreter state, owned by the caller.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    globals: HashMap<String, Value>,
    methods: HashMap<String, HashMap<String, Rc<InstructionSequence>>>,
    pc: usize,
}

impl ExecutionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the operand stack and frames, keeping globals and defined methods.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.pc = 0;
    }

    /// Clears everything, including globals and defined methods.
    pub fn clear(&mut self) {
        self.reset();
        self.globals.clear();
        self.methods.clear();
    }

    /// The operand stack, bottom first.
    #[must_use]
    #[inline]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// The live frames, outermost first.
    #[must_use]
    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The current program counter.
    #[must_use]
    #[inline]
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Value of global `name`, if the VM tracks it.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Sets global `name`.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(String::from(name), value);
    }

    /// The VM-defined method `name` of `class`, if any.
    #[must_use]
    pub fn method(&self, class: &str, name: &str) -> Option<&Rc<InstructionSequence>> {
        self.methods.get(class).and_then(|m| m.get(name))
    }

    /// Registers `body` as method `name` of `class`, replacing any previous definition.
    pub fn define_method(&mut self, class: &str, name: &str, body: Rc<InstructionSequence>) {
        self.methods
            .entry(String::from(class))
            .or_default()
            .insert(String::from(name), body);
    }

    fn base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.saved_depth)
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        if self.stack.len() <= self.base() {
            return Err(VmError::StackUnderflow);
        }
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, VmError> {
        let len = self.stack.len();
        if len < self.base() + n {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.stack.split_off(len - n))
    }

    /// `n` slots below the top.
    fn peek_mut(&mut self, n: usize) -> Result<&mut Value, VmError> {
        let len = self.stack.len();
        if len < self.base() + n + 1 {
            return Err(VmError::StackUnderflow);
        }
        self.stack
            .get_mut(len - n - 1)
            .ok_or(VmError::StackUnderflow)
    }

    fn peek(&mut self, n: usize) -> Result<Value, VmError> {
        self.peek_mut(n).map(|v| v.clone())
    }

    /// Walks `level` lexical parents up from `frame`.
    fn scope_frame(&self, frame: usize, level: u32) -> Option<usize> {
        let mut idx = frame;
        for _ in 0..level {
            idx = self.frames.get(idx)?.parent?;
        }
        Some(idx)
    }

    fn local_slot(&mut self, frame: usize, index: u32, level: u32) -> Option<&mut Local> {
        let idx = self.scope_frame(frame, level)?;
        self.frames.get_mut(idx)?.locals.get_mut(index as usize)
    }

    fn self_value(&self, frame: usize) -> Value {
        self.frames
            .get(frame)
            .map_or(Value::Main, |f| f.self_value.clone())
    }
}

/// Non-local exit from an instruction: an unlocated error, or a fault already located deeper.
enum Exit {
    Error(VmError),
    Fault(VmFault),
}

impl From<VmError> for Exit {
    fn from(e: VmError) -> Self {
        Self::Error(e)
    }
}

impl Exit {
    fn from_host(e: HostError) -> Self {
        match e {
            HostError::Vm(fault) => Self::Fault(*fault),
            other => Self::Error(VmError::Host(other)),
        }
    }

    fn locate(self, iseq: &InstructionSequence, pc: usize) -> VmFault {
        match self {
            Self::Error(error) => VmFault {
                iseq: String::from(iseq.name()),
                pc,
                error,
            },
            Self::Fault(fault) => fault,
        }
    }
}

enum Flow {
    Next,
    Jump(usize),
    Return(Value),
}

/// Stack-only trace wrapper; every hook is a branch when tracing is off.
struct TraceCtx<'s> {
    mask: TraceMask,
    sink: Option<&'s mut dyn TraceSink>,
}

impl<'s> TraceCtx<'s> {
    fn new(mask: TraceMask, sink: Option<&'s mut dyn TraceSink>) -> Self {
        Self { mask, sink }
    }

    #[inline]
    fn sink(&mut self, bit: TraceMask) -> Option<&mut (dyn TraceSink + 's)> {
        if self.mask.contains(bit) {
            self.sink.as_deref_mut()
        } else {
            None
        }
    }

    #[inline]
    fn instr(&mut self, iseq: &InstructionSequence, pc: usize, instr: &Instr, depth: usize) {
        if let Some(sink) = self.sink(TraceMask::INSTR) {
            sink.instr(iseq, pc, instr, depth);
        }
    }

    #[inline]
    fn scope_enter(&mut self, kind: ScopeKind<'_>, depth: usize, pc: usize) {
        let bit = if kind.is_host_call() {
            TraceMask::HOST
        } else {
            TraceMask::CALL
        };
        if let Some(sink) = self.sink(bit) {
            sink.scope_enter(kind, depth, pc);
        }
    }

    #[inline]
    fn scope_exit(&mut self, kind: ScopeKind<'_>, depth: usize, pc: usize) {
        let bit = if kind.is_host_call() {
            TraceMask::HOST
        } else {
            TraceMask::CALL
        };
        if let Some(sink) = self.sink(bit) {
            sink.scope_exit(kind, depth, pc);
        }
    }
}

/// State shared by every frame of one run.
struct Run<'c, 's> {
    ctx: &'c mut ExecutionContext,
    limits: Limits,
    fuel: u64,
    host_calls: u64,
    trace: TraceCtx<'s>,
}

/// The interpreter.
pub struct Vm<H: Host> {
    host: H,
    limits: Limits,
}

impl<H: Host> fmt::Debug for Vm<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl<H: Host> Vm<H> {
    /// Creates a VM delegating to `host`.
    #[must_use]
    pub fn new(host: H, limits: Limits) -> Self {
        Self { host, limits }
    }

    /// The host object model.
    #[must_use]
    #[inline]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host object model, mutably.
    #[inline]
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The configured limits.
    #[must_use]
    #[inline]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Runs top-level `iseq` in a fresh context and returns the value it leaves with.
    pub fn run(&mut self, iseq: &Rc<InstructionSequence>) -> Result<Value, VmFault> {
        let mut ctx = ExecutionContext::new();
        self.run_with_ctx(&mut ctx, iseq, TraceMask::NONE, None)
    }

    /// Runs top-level `iseq` in `ctx`.
    ///
    /// The context's stack and frames are reset first; globals and defined methods carry over.
    /// On success the result is also left on `ctx`'s operand stack.
    pub fn run_with_ctx(
        &mut self,
        ctx: &mut ExecutionContext,
        iseq: &Rc<InstructionSequence>,
        trace_mask: TraceMask,
        trace_sink: Option<&mut dyn TraceSink>,
    ) -> Result<Value, VmFault> {
        ctx.reset();
        let mut run = Run {
            ctx,
            limits: self.limits,
            fuel: self.limits.fuel,
            host_calls: 0,
            trace: TraceCtx::new(trace_mask, trace_sink),
        };
        debug!(iseq = iseq.name(), len = iseq.len(), "run start");
        if let Some(sink) = run.trace.sink(TraceMask::RUN) {
            sink.run_start(iseq);
        }

        let result = eval(&mut run, &mut self.host, iseq, Value::Main, None, None, &[])
            .map_err(|exit| exit.locate(iseq, 0));
        if let Ok(value) = &result {
            run.ctx.push(value.clone());
        }

        let fuel_used = self.limits.fuel - run.fuel;
        match &result {
            Ok(_) => debug!(fuel_used, host_calls = run.host_calls, "run end"),
            Err(fault) => debug!(fuel_used, %fault, "run failed"),
        }
        if let Some(sink) = run.trace.sink(TraceMask::RUN) {
            let outcome = match &result {
                Ok(_) => TraceOutcome::Ok,
                Err(fault) => TraceOutcome::Fault(fault),
            };
            sink.run_end(iseq, outcome);
        }
        result
    }
}

/// Runs `iseq` in a new frame.
fn eval<H: Host>(
    run: &mut Run<'_, '_>,
    host: &mut H,
    iseq: &Rc<InstructionSequence>,
    self_value: Value,
    parent: Option<usize>,
    block: Option<BlockHandle>,
    args: &[Value],
) -> Result<Value, Exit> {
    if run.ctx.frames.len() >= run.limits.max_call_depth {
        return Err(VmError::CallDepthExceeded.into());
    }

    let mut locals = vec![Local::Uninit; iseq.locals().len()];
    for (slot, arg) in locals.iter_mut().zip(args) {
        *slot = Local::Set(arg.clone());
    }
    let saved_pc = run.ctx.pc;
    let saved_depth = run.ctx.stack.len();
    let frame = run.ctx.frames.len();
    run.ctx.frames.push(Frame {
        iseq: Rc::clone(iseq),
        self_value,
        locals,
        parent,
        block,
        saved_pc,
        saved_depth,
    });
    run.trace
        .scope_enter(ScopeKind::Frame { iseq }, frame + 1, saved_pc);
    run.ctx.pc = 0;

    let result = dispatch(run, host, iseq, frame);

    run.trace
        .scope_exit(ScopeKind::Frame { iseq }, frame + 1, saved_pc);
    let (pc, depth) = run
        .ctx
        .frames
        .get(frame)
        .map_or((saved_pc, saved_depth), |f| (f.saved_pc, f.saved_depth));
    run.ctx.frames.truncate(frame);
    run.ctx.pc = pc;
    run.ctx.stack.truncate(depth);
    result.map_err(Exit::Fault)
}

fn dispatch<H: Host>(
    run: &mut Run<'_, '_>,
    host: &mut H,
    iseq: &InstructionSequence,
    frame: usize,
) -> Result<Value, VmFault> {
    loop {
        let pc = run.ctx.pc;
        let Some(instr) = iseq.insns().get(pc) else {
            return Err(Exit::from(VmError::PcOutOfRange { pc }).locate(iseq, pc));
        };
        if run.fuel == 0 {
            return Err(Exit::from(VmError::FuelExceeded).locate(iseq, pc));
        }
        run.fuel -= 1;
        run.trace.instr(iseq, pc, instr, run.ctx.stack.len());
        run.ctx.pc = pc + 1;

        match step(run, host, iseq, frame, instr) {
            Ok(Flow::Next) => {}
            Ok(Flow::Jump(target)) => run.ctx.pc = target,
            Ok(Flow::Return(value)) => return Ok(value),
            Err(exit) => return Err(exit.locate(iseq, pc)),
        }
    }
}

fn jump(iseq: &InstructionSequence, label: Label) -> Result<Flow, Exit> {
    iseq.label_target(label)
        .map(Flow::Jump)
        .ok_or_else(|| VmError::BadLabel { label: label.id() }.into())
}

fn into_array(v: Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items,
        Value::Nil => Vec::new(),
        other => vec![other],
    }
}

fn to_s(v: &Value) -> String {
    match v {
        Value::Str(s) | Value::Symbol(s) => s.clone(),
        Value::Nil => String::new(),
        other => other.inspect().to_string(),
    }
}

fn name_operand(v: &Value) -> &str {
    match v {
        Value::Symbol(s) | Value::Str(s) => s,
        _ => "",
    }
}

#[allow(
    clippy::too_many_lines,
    reason = "one arm per catalog instruction reads best as a single match"
)]
fn step<H: Host>(
    run: &mut Run<'_, '_>,
    host: &mut H,
    iseq: &InstructionSequence,
    frame: usize,
    instr: &Instr,
) -> Result<Flow, Exit> {
    match instr {
        Instr::Nop => {}
        Instr::Pop => {
            run.ctx.pop()?;
        }
        Instr::Dup => {
            let v = run.ctx.peek(0)?;
            run.ctx.push(v);
        }
        Instr::DupN(n) => {
            let top = run.ctx.pop_n(*n as usize)?;
            run.ctx.stack.extend(top.iter().cloned());
            run.ctx.stack.extend(top);
        }
        Instr::Swap => {
            let b = run.ctx.pop()?;
            let a = run.ctx.pop()?;
            run.ctx.push(b);
            run.ctx.push(a);
        }
        Instr::TopN(n) => {
            let v = run.ctx.peek(*n as usize)?;
            run.ctx.push(v);
        }
        Instr::SetN(n) => {
            let v = run.ctx.peek(0)?;
            *run.ctx.peek_mut(*n as usize)? = v;
        }
        Instr::AdjustStack(n) => {
            run.ctx.pop_n(*n as usize)?;
        }

        Instr::PutNil => run.ctx.push(Value::Nil),
        Instr::PutSelf => {
            let v = run.ctx.self_value(frame);
            run.ctx.push(v);
        }
        Instr::PutObject(v) => run.ctx.push(v.clone()),
        Instr::PutObjectInt2Fix0 => run.ctx.push(Value::Integer(0)),
        Instr::PutObjectInt2Fix1 => run.ctx.push(Value::Integer(1)),
        Instr::PutString(s) => run.ctx.push(Value::Str(s.clone())),
        Instr::PutSpecialObject(o) => run.ctx.push(Value::Special(*o)),

        Instr::NewArray(n) => {
            let items = run.ctx.pop_n(*n as usize)?;
            run.ctx.push(Value::Array(items));
        }
        Instr::DupArray(v) | Instr::DupHash(v) => run.ctx.push(v.clone()),
        Instr::NewHash(n) => {
            let mut items = run.ctx.pop_n(*n as usize * 2)?.into_iter();
            let mut pairs = Vec::with_capacity(*n as usize);
            while let (Some(k), Some(v)) = (items.next(), items.next()) {
                pairs.push((k, v));
            }
            run.ctx.push(Value::Hash(pairs));
        }
        Instr::NewRange { exclude_end } => {
            let end = run.ctx.pop()?;
            let start = run.ctx.pop()?;
            run.ctx.push(Value::Range {
                start: Box::new(start),
                end: Box::new(end),
                exclude_end: *exclude_end,
            });
        }
        Instr::ConcatArray => {
            let b = run.ctx.pop()?;
            let a = run.ctx.pop()?;
            let mut out = into_array(a);
            out.extend(into_array(b));
            run.ctx.push(Value::Array(out));
        }
        Instr::SplatArray { .. } => {
            let v = run.ctx.pop()?;
            run.ctx.push(Value::Array(into_array(v)));
        }
        Instr::ConcatStrings(n) => {
            let parts = run.ctx.pop_n(*n as usize)?;
            let s: String = parts.iter().map(to_s).collect();
            run.ctx.push(Value::Str(s));
        }
        Instr::ToRegexp { options, count } => {
            let parts = run.ctx.pop_n(*count as usize)?;
            let source: String = parts.iter().map(to_s).collect();
            run.ctx.push(Value::Regexp {
                source,
                options: *options,
            });
        }
        Instr::Intern => {
            let v = match run.ctx.pop()? {
                Value::Str(s) | Value::Symbol(s) => Value::Symbol(s),
                other => {
                    return Err(VmError::TypeMismatch {
                        expected: "String",
                        actual: other.class_name().to_string(),
                    }
                    .into());
                }
            };
            run.ctx.push(v);
        }
        Instr::ObjToString(call_data) => {
            let v = run.ctx.pop()?;
            let s = if matches!(v, Value::Str(_)) {
                v
            } else {
                let mid = call_data.mid().unwrap_or("to_s");
                call_method(run, host, v, mid, &[], None)?
            };
            run.ctx.push(s);
        }
        Instr::AnyToString => {
            let s = run.ctx.pop()?;
            let obj = run.ctx.pop()?;
            let v = if matches!(s, Value::Str(_)) {
                s
            } else {
                Value::Str(format!("{}", obj.inspect()))
            };
            run.ctx.push(v);
        }
        Instr::ExpandArray { size, flag } => {
            if *flag != 0 {
                return Err(VmError::Unsupported {
                    instr: "expandarray",
                    reason: "splat or post flags",
                }
                .into());
            }
            let items = into_array(run.ctx.pop()?);
            // First element ends up on top.
            for i in (0..*size as usize).rev() {
                run.ctx.push(items.get(i).cloned().unwrap_or(Value::Nil));
            }
        }
        Instr::OptNewArrayMin(n) | Instr::OptNewArrayMax(n) => {
            let items = run.ctx.pop_n(*n as usize)?;
            let mid = if matches!(instr, Instr::OptNewArrayMin(_)) {
                "min"
            } else {
                "max"
            };
            let v = call_method(run, host, Value::Array(items), mid, &[], None)?;
            run.ctx.push(v);
        }
        Instr::OptStrFreeze { value, .. } | Instr::OptStrUminus { value, .. } => {
            run.ctx.push(Value::Str(value.clone()));
        }

        Instr::GetLocal { name, .. }
        | Instr::GetLocalWC0 { name, .. }
        | Instr::GetLocalWC1 { name, .. } => {
            let (index, level) = instr.local_slot().unwrap_or_default();
            let v = match run.ctx.local_slot(frame, index, level) {
                Some(Local::Set(v)) => v.clone(),
                _ => {
                    return Err(VmError::UndefinedLocal {
                        name: name.clone(),
                        index,
                        level,
                    }
                    .into());
                }
            };
            run.ctx.push(v);
        }
        Instr::SetLocal { name, .. }
        | Instr::SetLocalWC0 { name, .. }
        | Instr::SetLocalWC1 { name, .. } => {
            let (index, level) = instr.local_slot().unwrap_or_default();
            let v = run.ctx.pop()?;
            let slot = run
                .ctx
                .local_slot(frame, index, level)
                .ok_or_else(|| VmError::UndefinedLocal {
                    name: name.clone(),
                    index,
                    level,
                })?;
            *slot = Local::Set(v);
        }

        Instr::GetGlobal(name) => {
            let v = match run.ctx.globals.get(name) {
                Some(v) => v.clone(),
                None => match host.global(name) {
                    Some(v) => {
                        trace!(global = %name, value = %v.inspect(), "imported host global");
                        run.ctx.globals.insert(name.clone(), v.clone());
                        v
                    }
                    None => Value::Nil,
                },
            };
            run.ctx.push(v);
        }
        Instr::SetGlobal(name) => {
            let v = run.ctx.pop()?;
            run.ctx.globals.insert(name.clone(), v);
        }
        Instr::GetConstant(name) => {
            let allow_nil = run.ctx.pop()?;
            let scope = run.ctx.pop()?;
            let found = if scope.is_nil() {
                if allow_nil.is_truthy() {
                    host.constant(None, name)
                } else {
                    None
                }
            } else {
                host.constant(Some(&scope), name)
            };
            let v = found.ok_or_else(|| VmError::UndefinedConstant { name: name.clone() })?;
            run.ctx.push(v);
        }

        Instr::Jump(label) => return jump(iseq, *label),
        Instr::BranchIf(label) => {
            if run.ctx.pop()?.is_truthy() {
                return jump(iseq, *label);
            }
        }
        Instr::BranchUnless(label) => {
            if !run.ctx.pop()?.is_truthy() {
                return jump(iseq, *label);
            }
        }
        Instr::BranchNil(label) => {
            if run.ctx.pop()?.is_nil() {
                return jump(iseq, *label);
            }
        }
        Instr::OptCaseDispatch { cases, else_label } => {
            let key = run.ctx.pop()?;
            let label = cases
                .iter()
                .find(|(value, _)| *value == key)
                .map_or(*else_label, |(_, label)| *label);
            return jump(iseq, label);
        }
        Instr::Leave => return Ok(Flow::Return(run.ctx.pop()?)),

        Instr::Send { call_data, block } => {
            let args = run.ctx.pop_n(call_data.argc() as usize)?;
            let receiver = run.ctx.pop()?;
            let handle = block.as_ref().map(|body| BlockHandle {
                iseq: Rc::clone(body),
                self_value: run.ctx.self_value(frame),
                parent: frame,
            });
            let mid = call_data.mid().unwrap_or_default();
            let v = call_method(run, host, receiver, mid, &args, handle)?;
            run.ctx.push(v);
        }
        Instr::OptSendWithoutBlock(call_data)
        | Instr::Opt { call_data, .. }
        | Instr::OptNeq {
            neq: call_data, ..
        } => {
            let args = run.ctx.pop_n(call_data.argc() as usize)?;
            let receiver = run.ctx.pop()?;
            let mid = call_data.mid().unwrap_or_default();
            let v = call_method(run, host, receiver, mid, &args, None)?;
            run.ctx.push(v);
        }
        Instr::OptArefWith { key, call_data } => {
            let receiver = run.ctx.pop()?;
            let mid = call_data.mid().unwrap_or("[]");
            let v = call_method(run, host, receiver, mid, &[Value::Str(key.clone())], None)?;
            run.ctx.push(v);
        }
        Instr::OptAsetWith { key, call_data } => {
            let value = run.ctx.pop()?;
            let receiver = run.ctx.pop()?;
            let mid = call_data.mid().unwrap_or("[]=");
            let args = [Value::Str(key.clone()), value];
            let v = call_method(run, host, receiver, mid, &args, None)?;
            run.ctx.push(v);
        }
        Instr::InvokeBlock(call_data) => {
            let args = run.ctx.pop_n(call_data.argc() as usize)?;
            let handle = run
                .ctx
                .frames
                .get(frame)
                .and_then(|f| f.block.clone())
                .ok_or(VmError::NoBlockGiven)?;
            let v = invoke_block(run, host, &handle, &args)?;
            run.ctx.push(v);
        }
        Instr::DefineMethod { name, iseq: body } => {
            let self_value = run.ctx.self_value(frame);
            let class = self_value.class_name();
            trace!(class, method = %name, "define method");
            run.ctx.define_method(class, name, Rc::clone(body));
        }

        Instr::Defined {
            kind,
            object,
            value,
        } => {
            let operand = run.ctx.pop()?;
            let defined = is_defined(run, host, *kind, object, &operand)?;
            run.ctx
                .push(if defined { value.clone() } else { Value::Nil });
        }
        Instr::OptGetInlineCache { .. } => run.ctx.push(Value::Nil),
        Instr::OptSetInlineCache { .. } => {
            run.ctx.peek(0)?;
        }
    }
    Ok(Flow::Next)
}

fn is_defined<H: Host>(
    run: &mut Run<'_, '_>,
    host: &mut H,
    kind: DefinedKind,
    object: &Value,
    operand: &Value,
) -> Result<bool, VmError> {
    let name = name_operand(object);
    let defined = match kind {
        DefinedKind::Nil
        | DefinedKind::SelfValue
        | DefinedKind::True
        | DefinedKind::False
        | DefinedKind::Asgn
        | DefinedKind::Expr
        | DefinedKind::LocalVar => true,
        DefinedKind::GlobalVar => {
            if run.ctx.globals.contains_key(name) {
                true
            } else if let Some(v) = host.global(name) {
                run.ctx.globals.insert(String::from(name), v);
                true
            } else {
                false
            }
        }
        DefinedKind::Constant => {
            let scope = (!operand.is_nil()).then_some(operand);
            host.constant(scope, name).is_some()
        }
        DefinedKind::Method => {
            run.ctx.method(operand.class_name(), name).is_some()
                || host.responds_to(operand, name)
        }
        DefinedKind::InstanceVar
        | DefinedKind::ClassVar
        | DefinedKind::Yield
        | DefinedKind::ZSuper => {
            return Err(VmError::Unsupported {
                instr: "defined",
                reason: "expression kind",
            });
        }
    };
    Ok(defined)
}

/// Calls `mid` on `receiver`: VM-defined methods first, the host otherwise.
fn call_method<H: Host>(
    run: &mut Run<'_, '_>,
    host: &mut H,
    receiver: Value,
    mid: &str,
    args: &[Value],
    block: Option<BlockHandle>,
) -> Result<Value, Exit> {
    if let Some(callee) = run.ctx.method(receiver.class_name(), mid).cloned() {
        let params = callee.params();
        let binds = (params.is_empty() && args.is_empty())
            || (params.is_lead_only() && params.lead_num as usize == args.len());
        if !binds {
            return Err(VmError::UnsupportedCallShape {
                method: String::from(mid),
                argc: args.len(),
            }
            .into());
        }
        return eval(run, host, &callee, receiver, None, block, args);
    }

    if run.host_calls >= run.limits.max_host_calls {
        return Err(VmError::HostCallLimitExceeded.into());
    }
    run.host_calls += 1;
    debug!(
        class = receiver.class_name(),
        method = mid,
        argc = args.len(),
        block = block.is_some(),
        "host send"
    );

    let depth = run.ctx.frames.len();
    let pc = run.ctx.pc.saturating_sub(1);
    run.trace
        .scope_enter(ScopeKind::HostCall { method: mid }, depth, pc);
    let result = match block {
        Some(handle) => {
            let mut vm_block = VmBlock {
                run: &mut *run,
                handle,
            };
            let block: &mut dyn Block<H> = &mut vm_block;
            host.send(&receiver, mid, args, Some(block))
        }
        None => host.send(&receiver, mid, args, None),
    };
    run.trace
        .scope_exit(ScopeKind::HostCall { method: mid }, depth, pc);
    result.map_err(Exit::from_host)
}

/// Runs a block body in a frame whose lexical parent is the block's creator.
fn invoke_block<H: Host>(
    run: &mut Run<'_, '_>,
    host: &mut H,
    handle: &BlockHandle,
    args: &[Value],
) -> Result<Value, Exit> {
    // `yield` inside a block reaches the enclosing method's block.
    let outer = run
        .ctx
        .frames
        .get(handle.parent)
        .and_then(|f| f.block.clone());
    eval(
        run,
        host,
        &handle.iseq,
        handle.self_value.clone(),
        Some(handle.parent),
        outer,
        args,
    )
}

/// A VM block handed to the host.
struct VmBlock<'r, 'c, 's> {
    run: &'r mut Run<'c, 's>,
    handle: BlockHandle,
}

impl<H: Host> Block<H> for VmBlock<'_, '_, '_> {
    fn yield_values(&mut self, host: &mut H, args: &[Value]) -> Result<Value, HostError> {
        invoke_block(self.run, host, &self.handle, args)
            .map_err(|exit| HostError::Vm(Box::new(exit.locate(&self.handle.iseq, 0))))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::asm::Asm;
    use crate::call_data::{CallData, CallFlags};

    #[derive(Default)]
    struct TestHost {
        global_lookups: usize,
    }

    impl Host for TestHost {
        fn send(
            &mut self,
            receiver: &Value,
            method: &str,
            args: &[Value],
            block: Option<&mut dyn Block<Self>>,
        ) -> Result<Value, HostError> {
            match (receiver, method, args) {
                (Value::Integer(a), "+", [Value::Integer(b)]) => Ok(Value::Integer(a + b)),
                (Value::Integer(a), "-", [Value::Integer(b)]) => Ok(Value::Integer(a - b)),
                (Value::Integer(a), "<", [Value::Integer(b)]) => Ok(Value::Bool(a < b)),
                (Value::Array(items), "each", []) => {
                    let Some(block) = block else {
                        return Err(HostError::Raised("no block given (yield)".into()));
                    };
                    for item in items {
                        block.yield_values(self, core::slice::from_ref(item))?;
                    }
                    Ok(receiver.clone())
                }
                _ => Err(HostError::UnknownMethod {
                    class: receiver.class_name().into(),
                    method: method.into(),
                }),
            }
        }

        fn global(&mut self, name: &str) -> Option<Value> {
            self.global_lookups += 1;
            (name == "$answer").then_some(Value::Integer(42))
        }
    }

    fn vm() -> Vm<TestHost> {
        Vm::new(TestHost::default(), Limits::default())
    }

    fn fib_method() -> InstructionSequence {
        let mut a = Asm::method("fib", &["n"]);
        let n = a.local("n");
        let recurse = a.new_label();
        a.getlocal_wc_0(n);
        a.putobject(Value::Integer(2));
        a.opt_lt();
        a.branchunless(recurse);
        a.getlocal_wc_0(n);
        a.leave();
        a.bind(recurse).unwrap();
        a.putself();
        a.getlocal_wc_0(n);
        a.putobject(Value::Integer(1));
        a.opt_minus();
        a.opt_send_without_block(CallData::fcall("fib", 1));
        a.putself();
        a.getlocal_wc_0(n);
        a.putobject(Value::Integer(2));
        a.opt_minus();
        a.opt_send_without_block(CallData::fcall("fib", 1));
        a.opt_plus();
        a.leave();
        a.build().unwrap()
    }

    #[test]
    fn adds_two_literals() {
        let mut a = Asm::top();
        a.putobject(Value::Integer(2));
        a.putobject(Value::Integer(3));
        a.opt_plus();
        a.leave();
        let iseq = Rc::new(a.build().unwrap());

        let mut vm = vm();
        let mut ctx = ExecutionContext::new();
        let v = vm
            .run_with_ctx(&mut ctx, &iseq, TraceMask::NONE, None)
            .unwrap();
        assert_eq!(v, Value::Integer(5));
        assert_eq!(ctx.stack(), [Value::Integer(5)]);
        assert!(ctx.frames().is_empty(), "frames are popped after leave");
    }

    #[test]
    fn recursive_vm_method() {
        let mut a = Asm::top();
        a.definemethod("fib", fib_method());
        a.putself();
        a.putobject(Value::Integer(10));
        a.opt_send_without_block(CallData::fcall("fib", 1));
        a.leave();
        let iseq = Rc::new(a.build().unwrap());
        assert_eq!(vm().run(&iseq), Ok(Value::Integer(55)));
    }

    #[test]
    fn methods_survive_context_reset() {
        let mut define = Asm::top();
        define.definemethod("fib", fib_method());
        define.putnil();
        define.leave();
        let define = Rc::new(define.build().unwrap());

        let mut call = Asm::top();
        call.putself();
        call.putobject(Value::Integer(7));
        call.opt_send_without_block(CallData::fcall("fib", 1));
        call.leave();
        let call = Rc::new(call.build().unwrap());

        let mut vm = vm();
        let mut ctx = ExecutionContext::new();
        vm.run_with_ctx(&mut ctx, &define, TraceMask::NONE, None)
            .unwrap();
        assert!(ctx.method("Object", "fib").is_some(), "fib is defined on Object");
        let v = vm
            .run_with_ctx(&mut ctx, &call, TraceMask::NONE, None)
            .unwrap();
        assert_eq!(v, Value::Integer(13));
    }

    #[test]
    fn reading_unassigned_local_fails_and_unwinds() {
        let mut a = Asm::top();
        let x = a.local("x");
        a.putobject(Value::Integer(1));
        a.putobject(Value::Integer(2));
        a.getlocal_wc_0(x);
        a.leave();
        let iseq = Rc::new(a.build().unwrap());

        let mut vm = vm();
        let mut ctx = ExecutionContext::new();
        let fault = vm
            .run_with_ctx(&mut ctx, &iseq, TraceMask::NONE, None)
            .unwrap_err();
        assert_eq!(
            fault,
            VmFault {
                iseq: "<compiled>".into(),
                pc: 2,
                error: VmError::UndefinedLocal {
                    name: "x".into(),
                    index: 0,
                    level: 0
                },
            }
        );
        assert!(ctx.stack().is_empty(), "stack is truncated on failure");
        assert!(ctx.frames().is_empty(), "frames are popped on failure");
    }

    #[test]
    fn failed_callee_restores_the_callers_record() {
        let mut boom = Asm::method("boom", &[]);
        let y = boom.local("y");
        boom.getlocal_wc_0(y);
        boom.leave();

        let mut a = Asm::top();
        a.definemethod("boom", boom.build().unwrap());
        a.putobject(Value::Integer(7));
        a.putself();
        a.opt_send_without_block(CallData::vcall("boom"));
        a.leave();
        let iseq = Rc::new(a.build().unwrap());

        let mut vm = vm();
        let mut ctx = ExecutionContext::new();
        let fault = vm
            .run_with_ctx(&mut ctx, &iseq, TraceMask::NONE, None)
            .unwrap_err();
        assert_eq!(fault.iseq, "boom");
        assert_eq!(ctx.pc(), 0, "pc is restored from the outermost frame");
        assert!(ctx.stack().is_empty(), "operands below the callee are dropped too");
        assert!(ctx.frames().is_empty(), "frames are popped on failure");
    }

    #[test]
    fn unsupported_call_shape() {
        let mut id = Asm::method("id", &["x"]);
        let x = id.local("x");
        id.getlocal_wc_0(x);
        id.leave();

        let mut a = Asm::top();
        a.definemethod("id", id.build().unwrap());
        a.putself();
        a.opt_send_without_block(CallData::vcall("id"));
        a.leave();
        let iseq = Rc::new(a.build().unwrap());

        let fault = vm().run(&iseq).unwrap_err();
        assert_eq!(fault.pc, 2);
        assert_eq!(
            fault.error,
            VmError::UnsupportedCallShape {
                method: "id".into(),
                argc: 0
            }
        );
    }

    #[test]
    fn host_block_writes_enclosing_local() {
        let mut body = Asm::block("block in <compiled>", &["x"]);
        let x = body.local("x");
        body.getlocal_wc_1("sum", 0);
        body.getlocal_wc_0(x);
        body.opt_plus();
        body.dup();
        body.setlocal_wc_1("sum", 0);
        body.leave();

        let mut a = Asm::top();
        let sum = a.local("sum");
        a.putobject(Value::Integer(0));
        a.setlocal_wc_0(sum);
        a.duparray(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        a.send(
            CallData::new(Some("each"), 0, CallFlags::BLOCKISEQ),
            Some(body.build().unwrap()),
        );
        a.pop();
        a.getlocal_wc_0(sum);
        a.leave();
        let iseq = Rc::new(a.build().unwrap());

        assert_eq!(vm().run(&iseq), Ok(Value::Integer(6)));
    }

    fn yielder() -> InstructionSequence {
        let mut twice = Asm::method("twice", &[]);
        twice.putobject(Value::Integer(20));
        twice.invokeblock(1);
        twice.leave();
        twice.build().unwrap()
    }

    #[test]
    fn invokeblock_calls_the_frames_block() {
        let mut body = Asm::block("block in <compiled>", &["x"]);
        let x = body.local("x");
        body.getlocal_wc_0(x);
        body.putobject(Value::Integer(1));
        body.opt_plus();
        body.leave();

        let mut a = Asm::top();
        a.definemethod("twice", yielder());
        a.putself();
        a.send(
            CallData::new(
                Some("twice"),
                0,
                CallFlags::FCALL | CallFlags::BLOCKISEQ,
            ),
            Some(body.build().unwrap()),
        );
        a.leave();
        let iseq = Rc::new(a.build().unwrap());

        assert_eq!(vm().run(&iseq), Ok(Value::Integer(21)));
    }

    #[test]
    fn invokeblock_without_block_fails_in_callee() {
        let mut a = Asm::top();
        a.definemethod("twice", yielder());
        a.putself();
        a.opt_send_without_block(CallData::vcall("twice"));
        a.leave();
        let iseq = Rc::new(a.build().unwrap());

        let fault = vm().run(&iseq).unwrap_err();
        assert_eq!(
            fault,
            VmFault {
                iseq: "twice".into(),
                pc: 1,
                error: VmError::NoBlockGiven
            }
        );
    }

    #[test]
    fn host_globals_are_imported_once() {
        let mut a = Asm::top();
        a.getglobal("$answer");
        a.getglobal("$answer");
        a.opt_plus();
        a.leave();
        let iseq = Rc::new(a.build().unwrap());

        let mut vm = vm();
        let mut ctx = ExecutionContext::new();
        let v = vm
            .run_with_ctx(&mut ctx, &iseq, TraceMask::NONE, None)
            .unwrap();
        assert_eq!(v, Value::Integer(84));
        assert_eq!(vm.host().global_lookups, 1);
        assert_eq!(ctx.global("$answer"), Some(&Value::Integer(42)));
    }

    #[test]
    fn undefined_global_reads_nil() {
        let mut a = Asm::top();
        a.getglobal("$nothing");
        a.leave();
        let iseq = Rc::new(a.build().unwrap());
        assert_eq!(vm().run(&iseq), Ok(Value::Nil));
    }

    #[test]
    fn undefined_constant() {
        let mut a = Asm::top();
        a.putnil();
        a.putobject(Value::Bool(true));
        a.getconstant("Foo");
        a.leave();
        let iseq = Rc::new(a.build().unwrap());
        let fault = vm().run(&iseq).unwrap_err();
        assert_eq!(
            fault.error,
            VmError::UndefinedConstant { name: "Foo".into() }
        );
    }

    #[test]
    fn case_dispatch_jumps_to_matching_key() {
        let mut a = Asm::top();
        let one = a.new_label();
        let two = a.new_label();
        let other = a.new_label();
        a.putobject(Value::Integer(2));
        a.opt_case_dispatch(
            vec![(Value::Integer(1), one), (Value::Integer(2), two)],
            other,
        );
        a.bind(one).unwrap();
        a.putobject(Value::symbol("one"));
        a.leave();
        a.bind(two).unwrap();
        a.putobject(Value::symbol("two"));
        a.leave();
        a.bind(other).unwrap();
        a.putobject(Value::symbol("other"));
        a.leave();
        let iseq = Rc::new(a.build().unwrap());
        assert_eq!(vm().run(&iseq), Ok(Value::symbol("two")));
    }

    #[test]
    fn defined_global_consults_host() {
        let mut a = Asm::top();
        a.putnil();
        a.defined(
            DefinedKind::GlobalVar,
            Value::symbol("$answer"),
            Value::str("global-variable"),
        );
        a.putnil();
        a.defined(
            DefinedKind::GlobalVar,
            Value::symbol("$nothing"),
            Value::str("global-variable"),
        );
        a.newarray(2);
        a.leave();
        let iseq = Rc::new(a.build().unwrap());
        assert_eq!(
            vm().run(&iseq),
            Ok(Value::Array(vec![Value::str("global-variable"), Value::Nil]))
        );
    }

    #[test]
    fn stack_shuffles() {
        let mut a = Asm::top();
        a.putobject(Value::Integer(1));
        a.putobject(Value::Integer(2));
        a.swap();
        a.topn(1);
        a.newarray(3);
        a.leave();
        let iseq = Rc::new(a.build().unwrap());
        assert_eq!(
            vm().run(&iseq),
            Ok(Value::Array(vec![
                Value::Integer(2),
                Value::Integer(1),
                Value::Integer(2)
            ]))
        );
    }

    #[test]
    fn fuel_bounds_infinite_loops() {
        let mut a = Asm::top();
        let top = a.new_label();
        a.bind(top).unwrap();
        a.jump(top);
        let iseq = Rc::new(a.build().unwrap());
        let mut vm = Vm::new(
            TestHost::default(),
            Limits {
                fuel: 100,
                ..Limits::default()
            },
        );
        assert_eq!(vm.run(&iseq).unwrap_err().error, VmError::FuelExceeded);
    }

    #[test]
    fn call_depth_bounds_recursion() {
        let mut down = Asm::method("down", &[]);
        down.putself();
        down.opt_send_without_block(CallData::vcall("down"));
        down.leave();

        let mut a = Asm::top();
        a.definemethod("down", down.build().unwrap());
        a.putself();
        a.opt_send_without_block(CallData::vcall("down"));
        a.leave();
        let iseq = Rc::new(a.build().unwrap());
        let mut vm = Vm::new(
            TestHost::default(),
            Limits {
                max_call_depth: 8,
                ..Limits::default()
            },
        );
        let fault = vm.run(&iseq).unwrap_err();
        assert_eq!(fault.error, VmError::CallDepthExceeded);
        assert_eq!(fault.iseq, "down");
    }

    #[derive(Default)]
    struct CountingSink {
        runs: usize,
        instrs: usize,
        enters: usize,
        exits: usize,
        host_calls: usize,
    }

    impl TraceSink for CountingSink {
        fn mask(&self) -> TraceMask {
            TraceMask::RUN | TraceMask::INSTR | TraceMask::CALL | TraceMask::HOST
        }

        fn run_start(&mut self, _iseq: &InstructionSequence) {
            self.runs += 1;
        }

        fn instr(
            &mut self,
            _iseq: &InstructionSequence,
            _pc: usize,
            _instr: &Instr,
            _depth: usize,
        ) {
            self.instrs += 1;
        }

        fn scope_enter(&mut self, kind: ScopeKind<'_>, _depth: usize, _pc: usize) {
            self.enters += 1;
            if kind.is_host_call() {
                self.host_calls += 1;
            }
        }

        fn scope_exit(&mut self, _kind: ScopeKind<'_>, _depth: usize, _pc: usize) {
            self.exits += 1;
        }
    }

    #[test]
    fn trace_sink_sees_every_event() {
        let mut a = Asm::top();
        a.putobject(Value::Integer(2));
        a.putobject(Value::Integer(3));
        a.opt_plus();
        a.leave();
        let iseq = Rc::new(a.build().unwrap());

        let mut sink = CountingSink::default();
        let mask = sink.mask();
        let mut ctx = ExecutionContext::new();
        vm().run_with_ctx(&mut ctx, &iseq, mask, Some(&mut sink))
            .unwrap();
        assert_eq!(sink.runs, 1);
        assert_eq!(sink.instrs, 4);
        assert_eq!(sink.enters, 2);
        assert_eq!(sink.exits, 2);
        assert_eq!(sink.host_calls, 1);
    }
}
