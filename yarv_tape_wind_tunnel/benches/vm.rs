// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use std::rc::Rc;
use yarv_tape::instr::Instr;
use yarv_tape::iseq::InstructionSequence;
use yarv_tape::trace::{ScopeKind, TraceMask, TraceSink};
use yarv_tape::value::Value;
use yarv_tape::vm::{ExecutionContext, Limits, Vm};
use yarv_tape_conformance::{StdHost, programs};

/// Entry point for `yarv_tape` wind-tunnel benchmarks.
///
/// Scenarios cover the interpreter's three hot paths: dispatch in a tight loop, VM-to-VM calls,
/// and host calls that re-enter the VM through a block.
fn bench_vm(c: &mut Criterion) {
    bench_while_loop(c);
    bench_fib(c);
    bench_each_block(c);
    bench_trace_overhead(c);
}

fn vm() -> Vm<StdHost> {
    Vm::new(
        StdHost::new(),
        Limits {
            fuel: u64::MAX,
            max_host_calls: u64::MAX,
            ..Limits::default()
        },
    )
}

/// `while n > 0; sum += n; n -= 1; end` for `n` iterations.
///
/// Every iteration delegates three operators to the host.
fn bench_while_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("while_sum");
    for &n in &[10_i64, 1_000, 100_000] {
        let iseq = Rc::new(programs::while_sum(n).unwrap());
        let mut vm = vm();
        let mut ctx = ExecutionContext::new();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                ctx.reset();
                black_box(
                    vm.run_with_ctx(&mut ctx, black_box(&iseq), TraceMask::NONE, None)
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

/// Recursive `fib(n)`: frame push/pop and argument binding.
fn bench_fib(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib");
    for &n in &[10_i64, 15, 20] {
        let iseq = Rc::new(programs::fib(n).unwrap());
        let mut vm = vm();
        let mut ctx = ExecutionContext::new();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                ctx.reset();
                black_box(
                    vm.run_with_ctx(&mut ctx, black_box(&iseq), TraceMask::NONE, None)
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

/// `items.each { |x| sum += x }`: the host calls back into a block frame per element.
fn bench_each_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("each_sum");
    for &len in &[10_usize, 1_000] {
        let items: Vec<i64> = (0..i64::try_from(len).unwrap_or(i64::MAX)).collect();
        let iseq = Rc::new(programs::each_sum(&items).unwrap());
        let mut vm = vm();
        let mut ctx = ExecutionContext::new();
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                ctx.reset();
                black_box(
                    vm.run_with_ctx(&mut ctx, black_box(&iseq), TraceMask::NONE, None)
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

#[derive(Debug, Default)]
struct CountingSink {
    instrs: u64,
    scopes: u64,
}

impl TraceSink for CountingSink {
    fn mask(&self) -> TraceMask {
        TraceMask::INSTR | TraceMask::CALL | TraceMask::HOST
    }

    fn instr(&mut self, _iseq: &InstructionSequence, _pc: usize, _instr: &Instr, _depth: usize) {
        self.instrs += 1;
    }

    fn scope_enter(&mut self, _kind: ScopeKind<'_>, _depth: usize, _pc: usize) {
        self.scopes += 1;
    }
}

/// `fib(15)` with no sink, with a sink whose mask is empty, and with every event enabled.
///
/// The first two should match; the gap to the third is the per-event cost.
fn bench_trace_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_overhead_fib15");
    let iseq = Rc::new(programs::fib(15).unwrap());
    let mut vm = vm();
    let mut ctx = ExecutionContext::new();

    group.bench_function("no_sink", |b| {
        b.iter(|| {
            ctx.reset();
            black_box(
                vm.run_with_ctx(&mut ctx, &iseq, TraceMask::NONE, None)
                    .unwrap(),
            )
        });
    });
    group.bench_function("masked_sink", |b| {
        let mut sink = CountingSink::default();
        b.iter(|| {
            ctx.reset();
            black_box(
                vm.run_with_ctx(&mut ctx, &iseq, TraceMask::NONE, Some(&mut sink))
                    .unwrap(),
            )
        });
    });
    group.bench_function("all_events", |b| {
        let mut sink = CountingSink::default();
        let mask = sink.mask();
        b.iter(|| {
            ctx.reset();
            let v: Value = vm
                .run_with_ctx(&mut ctx, &iseq, mask, Some(&mut sink))
                .unwrap();
            black_box(v)
        });
        black_box((sink.instrs, sink.scopes));
    });
    group.finish();
}

criterion_group!(benches, bench_vm);
criterion_main!(benches);
