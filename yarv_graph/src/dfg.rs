// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data-flow graph.
//!
//! Every instruction and every block gets an ordered `in` and `out` list of [`FlowRef`]s:
//!
//! - The local pass runs an abstract operand stack through each block. Operands that come from
//!   the stack below the block become block arguments (`in_k`), and values still on the stack at
//!   the end become block outputs (`out_k` on the producer).
//! - The global pass makes predecessors expose as many outputs as their successors take, adding
//!   `pass_k` entries that carry a value through a block untouched.
//! - Verification checks the result balances.
//!
//! Lists are ordered deepest operand first.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write as _};

use tracing::{debug, trace};

use crate::cfg::{Annotate, BlockId, Cfg};
use crate::error::GraphError;

/// One end of a data-flow edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FlowRef {
    /// The instruction at this index.
    Insn(usize),
    /// The `k`-th block argument, counted from the deepest.
    In(u32),
    /// The `k`-th block output, counted from the deepest.
    Out(u32),
    /// A value carried through the block for a successor.
    Pass(u32),
}

impl fmt::Display for FlowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insn(pc) => write!(f, "{pc:04}"),
            Self::In(k) => write!(f, "in_{k}"),
            Self::Out(k) => write!(f, "out_{k}"),
            Self::Pass(k) => write!(f, "pass_{k}"),
        }
    }
}

/// Ordered inputs and outputs of an instruction or a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataFlow {
    ins: Vec<FlowRef>,
    outs: Vec<FlowRef>,
}

impl DataFlow {
    /// Where the operands come from, deepest first.
    #[must_use]
    #[inline]
    pub fn ins(&self) -> &[FlowRef] {
        &self.ins
    }

    /// Where the results go.
    #[must_use]
    #[inline]
    pub fn outs(&self) -> &[FlowRef] {
        &self.outs
    }
}

/// Data-flow graph over a [`Cfg`].
#[derive(Clone, Debug)]
pub struct Dfg<'a> {
    cfg: Cfg<'a>,
    insn_flows: Vec<DataFlow>,
    block_flows: Vec<DataFlow>,
}

#[derive(Copy, Clone)]
enum Slot {
    Insn(usize),
    Arg(u32),
}

impl<'a> Dfg<'a> {
    /// Computes local and global flow and verifies it.
    ///
    /// Fails with [`GraphError::FlowImbalance`] if the operand stack does not balance across an
    /// edge, the entry block takes inputs, or an exit block leaves values behind.
    pub fn build(cfg: Cfg<'a>) -> Result<Self, GraphError> {
        let mut dfg = Self {
            insn_flows: alloc::vec![DataFlow::default(); cfg.iseq().len()],
            block_flows: alloc::vec![DataFlow::default(); cfg.blocks().len()],
            cfg,
        };
        dfg.local_flow();
        dfg.global_flow()?;
        dfg.verify()?;
        debug!(iseq = dfg.cfg.iseq().name(), "dfg built");
        Ok(dfg)
    }

    /// The underlying control-flow graph.
    #[must_use]
    #[inline]
    pub fn cfg(&self) -> &Cfg<'a> {
        &self.cfg
    }

    /// Flow of the instruction at `pc`.
    #[must_use]
    pub fn insn_flow(&self, pc: usize) -> Option<&DataFlow> {
        self.insn_flows.get(pc)
    }

    /// Flow across the boundaries of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` does not belong to this graph.
    #[must_use]
    pub fn block_flow(&self, block: BlockId) -> &DataFlow {
        &self.block_flows[block.index()]
    }

    fn local_flow(&mut self) {
        let insns = self.cfg.iseq().insns();
        for (id, block) in self.cfg.iter() {
            let mut stack: Vec<usize> = Vec::new();
            let mut consumed = 0_u32;
            let mut pending: Vec<(usize, Vec<Slot>)> = Vec::with_capacity(block.len());

            for pc in block.range() {
                let instr = &insns[pc];
                let mut slots: Vec<Slot> = Vec::with_capacity(instr.reads());
                for _ in 0..instr.reads() {
                    slots.push(match stack.pop() {
                        Some(producer) => Slot::Insn(producer),
                        None => {
                            consumed += 1;
                            Slot::Arg(consumed - 1)
                        }
                    });
                }
                slots.reverse();
                pending.push((pc, slots));
                for _ in 0..instr.writes() {
                    stack.push(pc);
                }
            }

            // The first read from below the block is the shallowest argument.
            for (pc, slots) in pending {
                self.insn_flows[pc].ins = slots
                    .into_iter()
                    .map(|slot| match slot {
                        Slot::Insn(producer) => FlowRef::Insn(producer),
                        Slot::Arg(c) => FlowRef::In(consumed - 1 - c),
                    })
                    .collect();
            }

            let flow = &mut self.block_flows[id.index()];
            flow.ins = (0..consumed).map(FlowRef::In).collect();
            for (k, &producer) in stack.iter().enumerate() {
                let k = u32::try_from(k).unwrap_or(u32::MAX);
                self.insn_flows[producer].outs.push(FlowRef::Out(k));
                flow.outs.push(FlowRef::Insn(producer));
            }
            trace!(
                block = block.start(),
                ins = flow.ins.len(),
                outs = flow.outs.len(),
                "local flow"
            );
        }

        for pc in 0..self.insn_flows.len() {
            for i in 0..self.insn_flows[pc].ins.len() {
                if let FlowRef::Insn(producer) = self.insn_flows[pc].ins[i] {
                    self.insn_flows[producer].outs.push(FlowRef::Insn(pc));
                }
            }
        }
    }

    /// Pads predecessors with pass-through values until every edge balances.
    ///
    /// Notes:
    ///
    /// - The worklist is last-in first-out and seeded with every block; a padded predecessor is
    ///   requeued so its own predecessors get padded in turn.
    /// - A loop that pops more than it pushes would be padded forever. No block can take more
    ///   values than the sequence ever pushes, so exceeding that is reported as an imbalance.
    fn global_flow(&mut self) -> Result<(), GraphError> {
        let limit: usize = self.cfg.iseq().insns().iter().map(|i| i.writes()).sum();
        let mut next_pass: Vec<u32> = alloc::vec![0; self.block_flows.len()];
        let mut work: VecDeque<BlockId> = self.cfg.iter().map(|(id, _)| id).collect();
        let mut iterations = 0_usize;

        while let Some(succ) = work.pop_back() {
            iterations += 1;
            let need = self.block_flows[succ.index()].ins.len();
            for &pred in self.cfg.block(succ).preds() {
                let have = self.block_flows[pred.index()].outs.len();
                if have >= need {
                    continue;
                }
                let start = next_pass[pred.index()];
                let added = u32::try_from(need - have).unwrap_or(u32::MAX);
                next_pass[pred.index()] = start + added;
                let flow = &mut self.block_flows[pred.index()];
                let names = (start..start + added).map(FlowRef::Pass);
                flow.ins.splice(0..0, names.clone());
                flow.outs.splice(0..0, names);
                trace!(
                    block = self.cfg.block(pred).start(),
                    added, "pass-through values added"
                );
                if flow.ins.len() > limit {
                    return Err(GraphError::FlowImbalance {
                        block: self.cfg.block(pred).start(),
                        succ: None,
                        expected: limit,
                        actual: flow.ins.len(),
                    });
                }
                work.push_back(pred);
            }
        }
        debug!(iterations, "global flow converged");
        Ok(())
    }

    fn verify(&self) -> Result<(), GraphError> {
        for (id, block) in self.cfg.iter() {
            let flow = &self.block_flows[id.index()];
            if id.index() == 0 && !flow.ins.is_empty() {
                return Err(GraphError::FlowImbalance {
                    block: block.start(),
                    succ: None,
                    expected: 0,
                    actual: flow.ins.len(),
                });
            }
            if block.succs().is_empty() && !flow.outs.is_empty() {
                return Err(GraphError::FlowImbalance {
                    block: block.start(),
                    succ: None,
                    expected: 0,
                    actual: flow.outs.len(),
                });
            }
            for &succ in block.succs() {
                let takes = self.block_flows[succ.index()].ins.len();
                if takes != flow.outs.len() {
                    return Err(GraphError::FlowImbalance {
                        block: block.start(),
                        succ: Some(self.cfg.block(succ).start()),
                        expected: takes,
                        actual: flow.outs.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Renders the control-flow listing annotated with flow lists.
    #[must_use]
    pub fn disasm(&self) -> String {
        let mut out = String::new();
        let _ = self.cfg.write_listing(&mut out, "dfg", &mut FlowNotes(self));
        out
    }
}

struct FlowNotes<'d, 'a>(&'d Dfg<'a>);

fn write_refs(out: &mut String, refs: &[FlowRef]) -> fmt::Result {
    for (i, r) in refs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "{r}")?;
    }
    Ok(())
}

impl Annotate for FlowNotes<'_, '_> {
    fn block_head(&mut self, out: &mut String, block: BlockId) -> fmt::Result {
        let ins = &self.0.block_flow(block).ins;
        if !ins.is_empty() {
            out.push_str("        # in: ");
            write_refs(out, ins)?;
            out.push('\n');
        }
        Ok(())
    }

    fn instr(&mut self, out: &mut String, pc: usize) -> fmt::Result {
        let Some(flow) = self.0.insn_flow(pc) else {
            return Ok(());
        };
        match (flow.ins.is_empty(), flow.outs.is_empty()) {
            (true, true) => {}
            (false, true) => {
                out.push_str(" # in: ");
                write_refs(out, &flow.ins)?;
            }
            (true, false) => {
                out.push_str(" # out: ");
                write_refs(out, &flow.outs)?;
            }
            (false, false) => {
                out.push_str(" # in: ");
                write_refs(out, &flow.ins)?;
                out.push_str("; out: ");
                write_refs(out, &flow.outs)?;
            }
        }
        Ok(())
    }

    fn block_tail(&mut self, out: &mut String, block: BlockId) -> fmt::Result {
        let outs = &self.0.block_flow(block).outs;
        if !outs.is_empty() {
            out.push_str("        # out: ");
            write_refs(out, outs)?;
            out.push('\n');
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use yarv_tape::asm::Asm;
    use yarv_tape::iseq::InstructionSequence;
    use yarv_tape::value::Value;

    fn indirect() -> InstructionSequence {
        // 100 + (14 < 0 ? -1 : 1)
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
        a.bind(other).unwrap();
        a.putobject(Value::Integer(1));
        a.bind(join).unwrap();
        a.opt_plus();
        a.leave();
        a.build().unwrap()
    }

    #[test]
    fn local_flow_only() {
        let mut a = Asm::top();
        a.putobject(Value::Integer(14));
        a.putobject(Value::Integer(2));
        a.opt_plus();
        a.leave();
        let iseq = a.build().unwrap();
        let dfg = Dfg::build(Cfg::build(&iseq).unwrap()).unwrap();
        let plus = dfg.insn_flow(2).unwrap();
        assert_eq!(plus.ins(), [FlowRef::Insn(0), FlowRef::Insn(1)], "operands");
        assert_eq!(plus.outs(), [FlowRef::Insn(3)], "consumer");
        assert!(dfg.block_flow(BlockId(0)).ins().is_empty(), "entry takes nothing");
    }

    #[test]
    fn indirect_argument_is_passed_through() {
        let iseq = indirect();
        let dfg = Dfg::build(Cfg::build(&iseq).unwrap()).unwrap();
        let expected = "\
== dfg #<ISeq:<compiled>>
block_0:
    0000 putobject                              100 # out: out_0
    0001 putobject                              14 # out: 0003
    0002 putobject_INT2FIX_0_ # out: 0003
    0003 opt_lt                                 <calldata!mid:<, argc:1, ARGS_SIMPLE> # in: 0001, 0002; out: 0004
    0004 branchunless                           label_0 (7) # in: 0003
        # to: block_7, block_5
        # out: 0000
block_5: # from: block_0
        # in: pass_0
    0005 putobject                              -1 # out: out_0
    0006 jump                                   label_1 (8)
        # to: block_8
        # out: pass_0, 0005
block_7: # from: block_0
        # in: pass_0
    0007 putobject_INT2FIX_1_ # out: out_0
        # to: block_8
        # out: pass_0, 0007
block_8: # from: block_5, block_7
        # in: in_0, in_1
    0008 opt_plus                               <calldata!mid:+, argc:1, ARGS_SIMPLE> # in: in_0, in_1; out: 0009
    0009 leave # in: 0008
        # to: leaves
";
        assert_eq!(dfg.disasm(), expected);
    }

    #[test]
    fn every_edge_balances() {
        let iseq = indirect();
        let dfg = Dfg::build(Cfg::build(&iseq).unwrap()).unwrap();
        for (id, block) in dfg.cfg().iter() {
            for &succ in block.succs() {
                assert_eq!(
                    dfg.block_flow(id).outs().len(),
                    dfg.block_flow(succ).ins().len(),
                    "edge block_{} -> block_{}",
                    block.start(),
                    dfg.cfg().block(succ).start()
                );
            }
        }
    }

    #[test]
    fn loop_consuming_from_below_is_rejected() {
        // Every trip round the loop pops a value it never pushed.
        let mut a = Asm::top();
        let head = a.new_label();
        a.putnil();
        a.bind(head).unwrap();
        a.pop();
        a.putself();
        a.branchif(head);
        a.putnil();
        a.leave();
        let iseq = a.build().unwrap();
        let err = Dfg::build(Cfg::build(&iseq).unwrap()).unwrap_err();
        assert!(
            matches!(err, GraphError::FlowImbalance { block: 1, .. }),
            "got {err:?}"
        );
    }
}
