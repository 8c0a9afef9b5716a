// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end runs of the sample programs against [`StdHost`].

use std::rc::Rc;

use yarv_tape::asm::Asm;
use yarv_tape::call_data::CallData;
use yarv_tape::instr::Instr;
use yarv_tape::iseq::InstructionSequence;
use yarv_tape::trace::{ScopeKind, TraceMask, TraceSink};
use yarv_tape::value::Value;
use yarv_tape::vm::{ExecutionContext, Limits, Vm, VmError};
use yarv_tape_conformance::{StdHost, programs};

fn run(iseq: InstructionSequence) -> Result<Value, VmError> {
    let mut vm = Vm::new(StdHost::new(), Limits::default());
    vm.run(&Rc::new(iseq)).map_err(|fault| fault.error)
}

fn run_limited(iseq: InstructionSequence, limits: Limits) -> Result<Value, VmError> {
    let mut vm = Vm::new(StdHost::new(), limits);
    vm.run(&Rc::new(iseq)).map_err(|fault| fault.error)
}

#[test]
fn push_push_add_leave() {
    assert_eq!(run(programs::add(2, 3).unwrap()), Ok(Value::Integer(5)));
}

#[test]
fn ternaries_take_the_else_arm() {
    assert_eq!(run(programs::ternary_plus().unwrap()), Ok(Value::Integer(101)));
    assert_eq!(
        run(programs::indirect_ternary().unwrap()),
        Ok(Value::Integer(101))
    );
}

#[test]
fn while_loop_sums() {
    assert_eq!(run(programs::while_sum(10).unwrap()), Ok(Value::Integer(55)));
    assert_eq!(run(programs::while_sum(0).unwrap()), Ok(Value::Integer(0)));
}

#[test]
fn recursive_fib() {
    assert_eq!(run(programs::fib(10).unwrap()), Ok(Value::Integer(55)));
}

#[test]
fn block_writes_enclosing_local() {
    assert_eq!(
        run(programs::each_sum(&[1, 2, 3]).unwrap()),
        Ok(Value::Integer(6))
    );
    assert_eq!(run(programs::each_sum(&[]).unwrap()), Ok(Value::Integer(0)));
}

#[test]
fn method_yields_to_its_block() {
    assert_eq!(run(programs::yield_twice().unwrap()), Ok(Value::Integer(23)));
}

#[test]
fn case_dispatch_falls_back_to_else() {
    assert_eq!(
        run(programs::case_dispatch(1).unwrap()),
        Ok(Value::symbol("one"))
    );
    assert_eq!(
        run(programs::case_dispatch(7).unwrap()),
        Ok(Value::symbol("other"))
    );
}

#[test]
fn interpolation_calls_to_s() {
    assert_eq!(
        run(programs::interpolation().unwrap()),
        Ok(Value::str("sum: 3"))
    );
}

#[test]
fn unassigned_local_is_an_error() {
    let err = run(programs::unassigned_local().unwrap()).unwrap_err();
    assert!(
        matches!(&err, VmError::UndefinedLocal { name, level: 0, .. } if name == "x"),
        "unexpected error: {err}"
    );
}

#[test]
fn puts_goes_to_the_host() {
    let mut a = Asm::top();
    a.putself();
    a.putobject(Value::str("hello"));
    a.opt_send_without_block(CallData::fcall("puts", 1));
    a.leave();
    let iseq = Rc::new(a.build().unwrap());

    let mut vm = Vm::new(StdHost::new(), Limits::default());
    assert_eq!(vm.run(&iseq), Ok(Value::Nil));
    assert_eq!(vm.host().output, ["hello"]);
}

#[test]
fn host_errors_surface_with_their_location() {
    let mut a = Asm::top();
    a.putobject(Value::Integer(1));
    a.putobject(Value::Integer(0));
    a.opt_div();
    a.leave();
    let iseq = Rc::new(a.build().unwrap());

    let mut vm = Vm::new(StdHost::new(), Limits::default());
    let fault = vm.run(&iseq).unwrap_err();
    assert_eq!(fault.pc, 2);
    assert!(
        matches!(fault.error, VmError::Host(_)),
        "unexpected error: {}",
        fault.error
    );
}

#[test]
fn every_sample_leaves_exactly_its_result() {
    for (name, iseq) in programs::samples().unwrap() {
        let iseq = Rc::new(iseq);
        let mut vm = Vm::new(StdHost::new(), Limits::default());
        let mut ctx = ExecutionContext::new();
        let v = vm
            .run_with_ctx(&mut ctx, &iseq, TraceMask::NONE, None)
            .unwrap_or_else(|fault| panic!("{name}: {fault}"));
        assert_eq!(ctx.stack(), [v], "{name}: stack holds only the result");
        assert!(ctx.frames().is_empty(), "{name}: frames are popped");
    }
}

#[test]
fn failed_runs_unwind_and_the_context_is_reusable() {
    let mut vm = Vm::new(StdHost::new(), Limits::default());
    let mut ctx = ExecutionContext::new();

    let bad = Rc::new(programs::unassigned_local().unwrap());
    assert!(
        vm.run_with_ctx(&mut ctx, &bad, TraceMask::NONE, None)
            .is_err(),
        "unassigned local fails"
    );
    assert!(ctx.stack().is_empty(), "stack is truncated on failure");
    assert!(ctx.frames().is_empty(), "frames are popped on failure");

    ctx.reset();
    let good = Rc::new(programs::fib(6).unwrap());
    let v = vm.run_with_ctx(&mut ctx, &good, TraceMask::NONE, None);
    assert_eq!(v, Ok(Value::Integer(8)));
}

#[test]
fn methods_outlive_reset_but_not_clear() {
    let mut vm = Vm::new(StdHost::new(), Limits::default());
    let mut ctx = ExecutionContext::new();
    let iseq = Rc::new(programs::fib(3).unwrap());
    vm.run_with_ctx(&mut ctx, &iseq, TraceMask::NONE, None)
        .unwrap();
    assert!(ctx.method("Object", "fib").is_some(), "fib is defined");

    ctx.reset();
    assert!(ctx.method("Object", "fib").is_some(), "reset keeps methods");

    ctx.clear();
    assert!(ctx.method("Object", "fib").is_none(), "clear drops methods");
}

#[test]
fn limits_bound_each_run() {
    let fuel = Limits {
        fuel: 1_000,
        ..Limits::default()
    };
    assert_eq!(
        run_limited(programs::while_sum(1_000_000).unwrap(), fuel),
        Err(VmError::FuelExceeded)
    );

    let depth = Limits {
        max_call_depth: 4,
        ..Limits::default()
    };
    assert_eq!(
        run_limited(programs::fib(10).unwrap(), depth),
        Err(VmError::CallDepthExceeded)
    );

    let host_calls = Limits {
        max_host_calls: 5,
        ..Limits::default()
    };
    assert_eq!(
        run_limited(programs::while_sum(10).unwrap(), host_calls),
        Err(VmError::HostCallLimitExceeded)
    );
}

/// Checks each instruction's net stack effect against the depth seen by the next one in its frame.
#[derive(Default)]
struct StackEffects {
    // Expected depth before the next instruction, one entry per live frame.
    frames: Vec<Option<(usize, String)>>,
    mismatches: Vec<String>,
    checked: usize,
}

impl TraceSink for StackEffects {
    fn mask(&self) -> TraceMask {
        TraceMask::INSTR | TraceMask::CALL
    }

    fn instr(&mut self, iseq: &InstructionSequence, pc: usize, instr: &Instr, stack_depth: usize) {
        let Some(slot) = self.frames.last_mut() else {
            return;
        };
        if let Some((expected, prev)) = slot.take() {
            self.checked += 1;
            if expected != stack_depth {
                self.mismatches.push(format!(
                    "{prev}: expected depth {expected}, found {stack_depth}"
                ));
            }
        }
        // `reads` never exceeds the live depth, or the VM would have underflowed.
        let after = stack_depth + instr.writes() - instr.reads();
        *slot = Some((after, format!("{}:{pc:04} {}", iseq.name(), instr.class_name())));
    }

    fn scope_enter(&mut self, kind: ScopeKind<'_>, _depth: usize, _pc: usize) {
        if !kind.is_host_call() {
            self.frames.push(None);
        }
    }

    fn scope_exit(&mut self, kind: ScopeKind<'_>, _depth: usize, _pc: usize) {
        if !kind.is_host_call() {
            self.frames.pop();
        }
    }
}

#[test]
fn every_instruction_moves_the_stack_by_its_declared_effect() {
    for (name, iseq) in programs::samples().unwrap() {
        let iseq = Rc::new(iseq);
        let mut sink = StackEffects::default();
        let mask = sink.mask();
        let mut vm = Vm::new(StdHost::new(), Limits::default());
        let mut ctx = ExecutionContext::new();
        vm.run_with_ctx(&mut ctx, &iseq, mask, Some(&mut sink))
            .unwrap_or_else(|fault| panic!("{name}: {fault}"));
        assert!(sink.mismatches.is_empty(), "{name}: {:?}", sink.mismatches);
        assert!(sink.checked > 0, "{name}: no instruction pairs were checked");
        assert!(sink.frames.is_empty(), "{name}: every frame was exited");
    }
}
