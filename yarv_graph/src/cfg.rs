// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Control-flow graph.
//!
//! Blocks start at index 0, at every resolved branch target and after every conditional branch.
//! A block runs to the next start or the end of the sequence; unconditional jumps and `leave`
//! do not start a block on their own, so unreachable code after them stays in the same block.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::{self, Write as _};
use core::ops::Range;

use tracing::{debug, trace};
use yarv_tape::disasm::instr_line;
use yarv_tape::iseq::InstructionSequence;

use crate::error::GraphError;

/// Index of a block in [`Cfg::blocks`]. Blocks are ordered by start index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

/// A maximal straight-line run of instructions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    start: usize,
    len: usize,
    preds: Vec<BlockId>,
    succs: Vec<BlockId>,
    leaves: bool,
}

impl BasicBlock {
    /// Index of the first instruction.
    #[must_use]
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Number of instructions.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; blocks hold at least one instruction.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the last instruction.
    #[must_use]
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len - 1
    }

    /// Instruction indices covered by the block.
    #[must_use]
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    /// Blocks that may transfer control here.
    #[must_use]
    #[inline]
    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    /// Blocks control may continue with, in the order the last instruction takes them.
    #[must_use]
    #[inline]
    pub fn succs(&self) -> &[BlockId] {
        &self.succs
    }

    /// Returns `true` if the last instruction returns from the sequence.
    #[must_use]
    #[inline]
    pub fn leaves(&self) -> bool {
        self.leaves
    }

    /// `block_<start>`, as used in listings.
    #[must_use]
    pub fn name(&self) -> String {
        format!("block_{}", self.start)
    }
}

/// Control-flow graph of one instruction sequence.
#[derive(Clone, Debug)]
pub struct Cfg<'a> {
    iseq: &'a InstructionSequence,
    blocks: Vec<BasicBlock>,
    block_of: Vec<BlockId>,
}

impl<'a> Cfg<'a> {
    /// Splits `iseq` into basic blocks and links them.
    ///
    /// Fails with [`GraphError::Unsupported`] if `iseq` has exception handlers.
    pub fn build(iseq: &'a InstructionSequence) -> Result<Self, GraphError> {
        if !iseq.throw_handlers().is_empty() {
            return Err(GraphError::Unsupported {
                iseq: iseq.name().to_string(),
                reason: "exception handler table is not empty",
            });
        }
        let n = iseq.len();
        let insns = iseq.insns();

        let mut is_start = vec![false; n];
        if n > 0 {
            is_start[0] = true;
        }
        for (pc, instr) in insns.iter().enumerate() {
            iseq.for_each_branch_target(pc, |target| {
                if let Some(slot) = is_start.get_mut(target) {
                    *slot = true;
                }
            });
            if instr.falls_through() {
                if let Some(slot) = is_start.get_mut(pc + 1) {
                    *slot = true;
                }
            }
        }

        let starts: Vec<usize> = (0..n).filter(|&pc| is_start[pc]).collect();
        let mut block_of = Vec::with_capacity(n);
        let mut blocks = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let next = starts.get(i + 1).copied().unwrap_or(n);
            let id = BlockId::from_index(i);
            block_of.resize(next, id);
            blocks.push(BasicBlock {
                start,
                len: next - start,
                preds: Vec::new(),
                succs: Vec::new(),
                leaves: false,
            });
        }

        for i in 0..blocks.len() {
            let end = blocks[i].end();
            let last = &insns[end];
            let mut succs: Vec<BlockId> = Vec::new();
            iseq.for_each_branch_target(end, |target| {
                let id = block_of[target];
                if !succs.contains(&id) {
                    succs.push(id);
                }
            });
            let continues = (!last.branches() && !last.leaves()) || last.falls_through();
            if continues {
                if let Some(&next) = block_of.get(end + 1) {
                    if !succs.contains(&next) {
                        succs.push(next);
                    }
                }
            }
            trace!(block = blocks[i].start, ?succs, "block successors");
            blocks[i].leaves = last.leaves();
            blocks[i].succs = succs;
        }

        for i in 0..blocks.len() {
            let id = BlockId::from_index(i);
            for s in blocks[i].succs.clone() {
                blocks[s.index()].preds.push(id);
            }
        }

        debug!(iseq = iseq.name(), blocks = blocks.len(), "cfg built");
        Ok(Self {
            iseq,
            blocks,
            block_of,
        })
    }

    /// The analysed sequence.
    #[must_use]
    #[inline]
    pub fn iseq(&self) -> &'a InstructionSequence {
        self.iseq
    }

    /// All blocks, ordered by start index. The entry block is first.
    #[must_use]
    #[inline]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// The block with id `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    #[must_use]
    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Iterates `(id, block)` pairs in start order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId::from_index(i), b))
    }

    /// The block containing instruction `pc`.
    #[must_use]
    pub fn block_containing(&self, pc: usize) -> Option<BlockId> {
        self.block_of.get(pc).copied()
    }

    /// The block that starts exactly at `pc`.
    #[must_use]
    pub fn block_starting_at(&self, pc: usize) -> Option<BlockId> {
        self.block_containing(pc)
            .filter(|id| self.blocks[id.index()].start == pc)
    }

    /// Renders the graph as an annotated listing.
    ///
    /// ```
    /// use yarv_graph::cfg::Cfg;
    /// use yarv_tape::asm::Asm;
    /// use yarv_tape::value::Value;
    ///
    /// let mut a = Asm::top();
    /// a.putobject(Value::Integer(1));
    /// a.leave();
    /// let iseq = a.build()?;
    /// let cfg = Cfg::build(&iseq)?;
    /// assert_eq!(
    ///     cfg.disasm(),
    ///     "== cfg #<ISeq:<compiled>>\n\
    ///      block_0:\n    \
    ///      0000 putobject_INT2FIX_1_\n    \
    ///      0001 leave\n        # to: leaves\n"
    /// );
    /// # Ok::<(), Box<dyn core::error::Error>>(())
    /// ```
    #[must_use]
    pub fn disasm(&self) -> String {
        let mut out = String::new();
        let _ = self.write_listing(&mut out, "cfg", &mut NoAnnotations);
        out
    }

    pub(crate) fn write_listing(
        &self,
        out: &mut String,
        kind: &str,
        notes: &mut dyn Annotate,
    ) -> fmt::Result {
        writeln!(out, "== {kind} #<ISeq:{}>", self.iseq.name())?;
        for (id, block) in self.iter() {
            write!(out, "block_{}:", block.start)?;
            if !block.preds.is_empty() {
                out.push_str(" # from: ");
                self.write_block_names(out, &block.preds)?;
            }
            out.push('\n');
            notes.block_head(out, id)?;
            for pc in block.range() {
                out.push_str("    ");
                out.push_str(&instr_line(self.iseq, pc));
                notes.instr(out, pc)?;
                out.push('\n');
            }
            if !block.succs.is_empty() || block.leaves {
                out.push_str("        # to: ");
                self.write_block_names(out, &block.succs)?;
                if block.leaves {
                    if !block.succs.is_empty() {
                        out.push_str(", ");
                    }
                    out.push_str("leaves");
                }
                out.push('\n');
            }
            notes.block_tail(out, id)?;
        }
        Ok(())
    }

    fn write_block_names(&self, out: &mut String, ids: &[BlockId]) -> fmt::Result {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write!(out, "block_{}", self.blocks[id.index()].start)?;
        }
        Ok(())
    }
}

/// Extra lines and suffixes for [`Cfg::write_listing`].
pub(crate) trait Annotate {
    fn block_head(&mut self, _out: &mut String, _block: BlockId) -> fmt::Result {
        Ok(())
    }

    fn instr(&mut self, _out: &mut String, _pc: usize) -> fmt::Result {
        Ok(())
    }

    fn block_tail(&mut self, _out: &mut String, _block: BlockId) -> fmt::Result {
        Ok(())
    }
}

struct NoAnnotations;

impl Annotate for NoAnnotations {}
