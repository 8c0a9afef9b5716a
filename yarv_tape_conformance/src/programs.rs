// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sample programs, assembled the way the reference compiler lays them out.
//!
//! Each builder documents the source it stands for.

use yarv_tape::asm::{Asm, BuildError};
use yarv_tape::call_data::{CallData, CallFlags};
use yarv_tape::instr::ThrowKind;
use yarv_tape::iseq::{InstructionSequence, IseqKind};
use yarv_tape::value::Value;

/// `a + b`
pub fn add(a: i64, b: i64) -> Result<InstructionSequence, BuildError> {
    let mut asm = Asm::top();
    asm.putobject(Value::Integer(a));
    asm.putobject(Value::Integer(b));
    asm.opt_plus();
    asm.leave();
    asm.build()
}

/// `(14 < 0 ? -1 : 1) + 100`
///
/// The join block takes the arm's value as a block argument.
pub fn ternary_plus() -> Result<InstructionSequence, BuildError> {
    let mut a = Asm::top();
    let other = a.new_label();
    let join = a.new_label();
    a.putobject(Value::Integer(14));
    a.putobject(Value::Integer(0));
    a.opt_lt();
    a.branchunless(other);
    a.putobject(Value::Integer(-1));
    a.jump(join);
    a.bind(other)?;
    a.putobject(Value::Integer(1));
    a.bind(join)?;
    a.putobject(Value::Integer(100));
    a.opt_plus();
    a.leave();
    a.build()
}

/// `100 + (14 < 0 ? -1 : 1)`
///
/// `100` is pushed before the branch and consumed after the join, so both arms carry it through.
pub fn indirect_ternary() -> Result<InstructionSequence, BuildError> {
    let mut a = Asm::top();
    let other = a.new_label();
    let join = a.new_label();
    a.putobject(Value::Integer(100));
    a.putobject(Value::Integer(14));
    a.putobject(Value::Integer(0));
    a.opt_lt();
    a.branchunless(other);
    a.putobject(Value::Integer(-1));
    a.jump(join);
    a.bind(other)?;
    a.putobject(Value::Integer(1));
    a.bind(join)?;
    a.opt_plus();
    a.leave();
    a.build()
}

/// ```text
/// n = <n>
/// sum = 0
/// while n > 0
///   sum += n
///   n -= 1
/// end
/// sum
/// ```
pub fn while_sum(n: i64) -> Result<InstructionSequence, BuildError> {
    let mut a = Asm::top();
    let n_slot = a.local("n");
    let sum = a.local("sum");
    let head = a.new_label();
    let body = a.new_label();
    a.putobject(Value::Integer(n));
    a.setlocal_wc_0(n_slot);
    a.putobject(Value::Integer(0));
    a.setlocal_wc_0(sum);
    a.jump(head);
    a.bind(body)?;
    a.getlocal_wc_0(sum);
    a.getlocal_wc_0(n_slot);
    a.opt_plus();
    a.setlocal_wc_0(sum);
    a.getlocal_wc_0(n_slot);
    a.putobject(Value::Integer(1));
    a.opt_minus();
    a.setlocal_wc_0(n_slot);
    a.bind(head)?;
    a.getlocal_wc_0(n_slot);
    a.putobject(Value::Integer(0));
    a.opt_gt();
    a.branchif(body);
    a.getlocal_wc_0(sum);
    a.leave();
    a.build()
}

/// ```text
/// def fib(n)
///   if n < 2
///     n
///   else
///     fib(n - 1) + fib(n - 2)
///   end
/// end
/// ```
pub fn fib_method() -> Result<InstructionSequence, BuildError> {
    let mut a = Asm::method("fib", &["n"]);
    let n = a.local("n");
    let recurse = a.new_label();
    a.getlocal_wc_0(n);
    a.putobject(Value::Integer(2));
    a.opt_lt();
    a.branchunless(recurse);
    a.getlocal_wc_0(n);
    a.leave();
    a.bind(recurse)?;
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
    a.build()
}

/// Defines [`fib_method`] and calls `fib(n)`.
pub fn fib(n: i64) -> Result<InstructionSequence, BuildError> {
    let mut a = Asm::top();
    a.definemethod("fib", fib_method()?);
    a.putself();
    a.putobject(Value::Integer(n));
    a.opt_send_without_block(CallData::fcall("fib", 1));
    a.leave();
    a.build()
}

/// ```text
/// sum = 0
/// <items>.each { |x| sum += x }
/// sum
/// ```
pub fn each_sum(items: &[i64]) -> Result<InstructionSequence, BuildError> {
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
    a.duparray(items.iter().copied().map(Value::Integer).collect());
    a.send(
        CallData::new(Some("each"), 0, CallFlags::BLOCKISEQ),
        Some(body.build()?),
    );
    a.pop();
    a.getlocal_wc_0(sum);
    a.leave();
    a.build()
}

/// ```text
/// def twice
///   yield(20) + yield(1)
/// end
/// twice { |x| x + 1 }
/// ```
pub fn yield_twice() -> Result<InstructionSequence, BuildError> {
    let mut twice = Asm::method("twice", &[]);
    twice.putobject(Value::Integer(20));
    twice.invokeblock(1);
    twice.putobject(Value::Integer(1));
    twice.invokeblock(1);
    twice.opt_plus();
    twice.leave();

    let mut body = Asm::block("block in <compiled>", &["x"]);
    let x = body.local("x");
    body.getlocal_wc_0(x);
    body.putobject(Value::Integer(1));
    body.opt_plus();
    body.leave();

    let mut a = Asm::top();
    a.definemethod("twice", twice.build()?);
    a.putself();
    a.send(
        CallData::new(
            Some("twice"),
            0,
            CallFlags::FCALL | CallFlags::BLOCKISEQ,
        ),
        Some(body.build()?),
    );
    a.leave();
    a.build()
}

/// ```text
/// case <key>
/// when 1 then :one
/// when 2 then :two
/// else :other
/// end
/// ```
pub fn case_dispatch(key: i64) -> Result<InstructionSequence, BuildError> {
    let mut a = Asm::top();
    let one = a.new_label();
    let two = a.new_label();
    let other = a.new_label();
    a.putobject(Value::Integer(key));
    a.opt_case_dispatch(
        Vec::from([(Value::Integer(1), one), (Value::Integer(2), two)]),
        other,
    );
    a.bind(one)?;
    a.putobject(Value::symbol("one"));
    a.leave();
    a.bind(two)?;
    a.putobject(Value::symbol("two"));
    a.leave();
    a.bind(other)?;
    a.putobject(Value::symbol("other"));
    a.leave();
    a.build()
}

/// `"sum: #{1 + 2}"`
pub fn interpolation() -> Result<InstructionSequence, BuildError> {
    let mut a = Asm::top();
    a.putobject(Value::str("sum: "));
    a.putobject(Value::Integer(1));
    a.putobject(Value::Integer(2));
    a.opt_plus();
    a.dup();
    a.objtostring();
    a.anytostring();
    a.concatstrings(2);
    a.leave();
    a.build()
}

/// `x = x` style read of a local that was never assigned.
pub fn unassigned_local() -> Result<InstructionSequence, BuildError> {
    let mut a = Asm::top();
    let x = a.local("x");
    a.getlocal_wc_0(x);
    a.leave();
    a.build()
}

/// ```text
/// begin
///   nil
/// rescue
///   nil
/// end
/// ```
///
/// Carries a non-empty exception-handler table.
pub fn guarded() -> Result<InstructionSequence, BuildError> {
    let mut rescue = Asm::new("rescue in <compiled>", IseqKind::Block);
    rescue.putnil();
    rescue.leave();

    let mut a = Asm::top();
    let begin = a.new_label();
    let end = a.new_label();
    a.bind(begin)?;
    a.putnil();
    a.bind(end)?;
    a.nop();
    a.leave();
    a.throw_handler(ThrowKind::Rescue, Some(rescue.build()?), begin, end, end);
    a.build()
}

/// Every sample that the graph builders accept, by name.
pub fn samples() -> Result<Vec<(&'static str, InstructionSequence)>, BuildError> {
    Ok(Vec::from([
        ("add", add(2, 3)?),
        ("ternary_plus", ternary_plus()?),
        ("indirect_ternary", indirect_ternary()?),
        ("while_sum", while_sum(10)?),
        ("fib", fib(10)?),
        ("each_sum", each_sum(&[1, 2, 3])?),
        ("yield_twice", yield_twice()?),
        ("case_dispatch", case_dispatch(2)?),
        ("interpolation", interpolation()?),
    ]))
}
