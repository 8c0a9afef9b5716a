// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sea-of-nodes graph ("SOY").
//!
//! Control and data dependencies live in one graph:
//!
//! - Every instruction is an [`NodeKind::Insn`] node whose id is its instruction index.
//! - Side-effecting instructions are chained by control edges, block by block; pure instructions
//!   only hang off the data edges that feed them.
//! - A block argument becomes a [`NodeKind::Phi`]. Phis of a block with several predecessors are
//!   attached by info edges to a [`NodeKind::Merge`] at the head of its control chain.
//!
//! Construction over-approximates (a phi per argument, even with one predecessor) and
//! [`Soy::cleanup`] then removes the phis and merges that select nothing.
//!
//! Nodes live in an arena with stable ids. Removing a node delists its edges from both ends.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::{self, Write as _};

use hashbrown::HashMap;
use tracing::{debug, trace};
use yarv_tape::iseq::InstructionSequence;

use crate::cfg::{BlockId, Cfg};
use crate::dfg::{Dfg, FlowRef};
use crate::error::GraphError;

/// Stable node id. Instruction nodes use their instruction index; synthetic nodes are numbered
/// from the first multiple of 1000 past the instruction count.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a node stands for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// The instruction at `pc`.
    Insn {
        /// Instruction index.
        pc: usize,
        /// CamelCase instruction name.
        class_name: &'static str,
    },
    /// Selects one incoming value depending on the predecessor control came from.
    Phi,
    /// Joins control from several predecessors; its phis hang off it.
    Merge,
}

/// Label of a data edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataLabel {
    /// Operand position at the consumer, deepest first.
    Arg(u32),
    /// Into a phi: the last control node of the predecessor the value comes from.
    Pred(NodeId),
}

/// Edge kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Control order between fixed nodes.
    Control,
    /// A value flowing to a consumer.
    Data(DataLabel),
    /// Phi-to-merge association; carries no value.
    Info,
}

/// A directed edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Producer or predecessor.
    pub from: NodeId,
    /// Consumer or successor.
    pub to: NodeId,
    /// Kind and label.
    pub kind: EdgeKind,
}

/// A graph node with its adjacency lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    ins: Vec<Edge>,
    outs: Vec<Edge>,
}

impl Node {
    /// The node id.
    #[must_use]
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node kind.
    #[must_use]
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Incoming edges, in insertion order.
    #[must_use]
    #[inline]
    pub fn ins(&self) -> &[Edge] {
        &self.ins
    }

    /// Outgoing edges, in insertion order.
    #[must_use]
    #[inline]
    pub fn outs(&self) -> &[Edge] {
        &self.outs
    }

    /// Returns `true` for phi nodes.
    #[must_use]
    #[inline]
    pub fn is_phi(&self) -> bool {
        matches!(self.kind, NodeKind::Phi)
    }

    /// Returns `true` for merge nodes.
    #[must_use]
    #[inline]
    pub fn is_merge(&self) -> bool {
        matches!(self.kind, NodeKind::Merge)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::Insn { pc, class_name } => write!(f, "{pc:04} {class_name}"),
            NodeKind::Phi => write!(f, "{} φ", self.id),
            NodeKind::Merge => write!(f, "{} ψ", self.id),
        }
    }
}

/// A block's piece of the graph, before blocks are stitched together.
struct SubGraph {
    head: NodeId,
    tail: NodeId,
    /// One phi per block input, in block-input order.
    inputs: Vec<NodeId>,
    /// The node producing each block output, in block-output order.
    outputs: Vec<NodeId>,
}

/// Sea-of-nodes graph over a [`Dfg`].
#[derive(Clone, Debug)]
pub struct Soy<'a> {
    dfg: Dfg<'a>,
    nodes: Vec<Option<Node>>,
    index: HashMap<NodeId, usize>,
    start: NodeId,
    next_synthetic: u32,
}

impl<'a> Soy<'a> {
    /// Runs the CFG, DFG and SOY builders over `iseq`.
    pub fn from_iseq(iseq: &'a InstructionSequence) -> Result<Self, GraphError> {
        Self::build(Dfg::build(Cfg::build(iseq)?)?)
    }

    /// Builds, cleans up and verifies the graph.
    pub fn build(dfg: Dfg<'a>) -> Result<Self, GraphError> {
        let iseq = dfg.cfg().iseq();
        if !iseq.throw_handlers().is_empty() {
            return Err(GraphError::Unsupported {
                iseq: iseq.name().to_string(),
                reason: "exception handler table is not empty",
            });
        }
        let base = iseq.len().div_ceil(1000).max(1) * 1000;
        let mut soy = Self {
            nodes: Vec::with_capacity(iseq.len()),
            index: HashMap::new(),
            start: NodeId(0),
            next_synthetic: u32::try_from(base).unwrap_or(u32::MAX),
            dfg,
        };

        let blocks: Vec<BlockId> = soy.dfg.cfg().iter().map(|(id, _)| id).collect();
        let mut graphs: Vec<SubGraph> = Vec::with_capacity(blocks.len());
        for &block in &blocks {
            graphs.push(soy.local_graph(block)?);
        }
        if let Some(entry) = graphs.first() {
            soy.start = entry.head;
        }

        for &pred in &blocks {
            let tail = graphs[pred.index()].tail;
            let succs = soy.dfg.cfg().block(pred).succs().to_vec();
            for &succ in &succs {
                soy.connect(tail, graphs[succ.index()].head, EdgeKind::Control);
            }
        }

        for &pred in &blocks {
            let tail = graphs[pred.index()].tail;
            let succs = soy.dfg.cfg().block(pred).succs().to_vec();
            for n in 0..graphs[pred.index()].outputs.len() {
                let value = graphs[pred.index()].outputs[n];
                for &succ in &succs {
                    let Some(&phi) = graphs[succ.index()].inputs.get(n) else {
                        return Err(GraphError::FlowImbalance {
                            block: soy.dfg.cfg().block(pred).start(),
                            succ: Some(soy.dfg.cfg().block(succ).start()),
                            expected: graphs[succ.index()].inputs.len(),
                            actual: graphs[pred.index()].outputs.len(),
                        });
                    };
                    soy.connect(value, phi, EdgeKind::Data(DataLabel::Pred(tail)));
                }
            }
        }

        let removed = soy.cleanup();
        soy.verify()?;
        debug!(
            iseq = soy.dfg.cfg().iseq().name(),
            nodes = soy.nodes().count(),
            removed,
            "soy built"
        );
        Ok(soy)
    }

    fn local_graph(&mut self, block: BlockId) -> Result<SubGraph, GraphError> {
        let cfg = self.dfg.cfg();
        let iseq = cfg.iseq();
        let bb = cfg.block(block);
        let range = bb.range();
        let start = bb.start();
        let has_merge = bb.preds().len() > 1 && !self.dfg.block_flow(block).ins().is_empty();
        let block_ins = self.dfg.block_flow(block).ins().to_vec();
        let block_outs = self.dfg.block_flow(block).outs().to_vec();

        for pc in range.clone() {
            let class_name = iseq.insns()[pc].class_name();
            self.add_node(node_id(pc), NodeKind::Insn { pc, class_name });
        }

        let merge = has_merge.then(|| self.add_synthetic(NodeKind::Merge));
        let mut head = merge;
        let mut tail = merge;
        for pc in range.clone() {
            if !iseq.insns()[pc].side_effects() {
                continue;
            }
            let node = node_id(pc);
            if let Some(prev) = tail {
                self.connect(prev, node, EdgeKind::Control);
            }
            head.get_or_insert(node);
            tail = Some(node);
        }
        // A block of pure instructions has no control chain; its first instruction stands in.
        let head = head.unwrap_or(node_id(start));
        let tail = tail.unwrap_or(node_id(start));

        let mut inputs = Vec::with_capacity(block_ins.len());
        for &arg in &block_ins {
            let phi = self.add_synthetic(NodeKind::Phi);
            if let Some(merge) = merge {
                self.connect(phi, merge, EdgeKind::Info);
            }
            for pc in range.clone() {
                let uses = self.consumer_positions(pc, arg);
                for n in uses {
                    self.connect(phi, node_id(pc), EdgeKind::Data(DataLabel::Arg(n)));
                }
            }
            inputs.push(phi);
        }

        for pc in range {
            let ins = self
                .dfg
                .insn_flow(pc)
                .map(|flow| flow.ins().to_vec())
                .unwrap_or_default();
            for (n, r) in ins.into_iter().enumerate() {
                if let FlowRef::Insn(producer) = r {
                    let label = DataLabel::Arg(u32::try_from(n).unwrap_or(u32::MAX));
                    self.connect(node_id(producer), node_id(pc), EdgeKind::Data(label));
                }
            }
        }

        let mut outputs = Vec::with_capacity(block_outs.len());
        for r in &block_outs {
            let node = match *r {
                FlowRef::Insn(producer) => Some(node_id(producer)),
                _ => block_ins
                    .iter()
                    .position(|arg| arg == r)
                    .map(|i| inputs[i]),
            };
            let Some(node) = node else {
                return Err(GraphError::FlowImbalance {
                    block: start,
                    succ: None,
                    expected: block_ins.len(),
                    actual: block_outs.len(),
                });
            };
            outputs.push(node);
        }

        trace!(
            block = start,
            %head,
            %tail,
            inputs = inputs.len(),
            outputs = outputs.len(),
            "local subgraph"
        );
        Ok(SubGraph {
            head,
            tail,
            inputs,
            outputs,
        })
    }

    fn consumer_positions(&self, pc: usize, arg: FlowRef) -> Vec<u32> {
        self.dfg
            .insn_flow(pc)
            .map(|flow| {
                flow.ins()
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| **r == arg)
                    .map(|(n, _)| u32::try_from(n).unwrap_or(u32::MAX))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn add_node(&mut self, id: NodeId, kind: NodeKind) -> NodeId {
        self.index.insert(id, self.nodes.len());
        self.nodes.push(Some(Node {
            id,
            kind,
            ins: Vec::new(),
            outs: Vec::new(),
        }));
        id
    }

    fn add_synthetic(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_synthetic);
        self.next_synthetic += 1;
        self.add_node(id, kind)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = *self.index.get(&id)?;
        self.nodes[slot].as_mut()
    }

    /// Adds an edge. Self edges are dropped: a value or control path that loops straight back
    /// into the node adds no dependency.
    fn connect(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        if from == to {
            return;
        }
        let edge = Edge { from, to, kind };
        if let Some(node) = self.node_mut(from) {
            node.outs.push(edge);
        }
        if let Some(node) = self.node_mut(to) {
            node.ins.push(edge);
        }
    }

    fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.index.remove(&id)?;
        let node = self.nodes[slot].take()?;
        for edge in &node.ins {
            if let Some(producer) = self.node_mut(edge.from) {
                producer.outs.retain(|e| e.to != id);
            }
        }
        for edge in &node.outs {
            if let Some(consumer) = self.node_mut(edge.to) {
                consumer.ins.retain(|e| e.from != id);
            }
        }
        Some(node)
    }

    /// Removes phis that select nothing and merges left without phis, until nothing changes.
    ///
    /// - A phi whose inputs all come from one producer (including a phi with a single input) is
    ///   replaced by edges from that producer straight to the phi's consumers, keeping each
    ///   consumer edge's label.
    /// - A merge with no phis attached is replaced by control edges from its predecessors to its
    ///   successors.
    ///
    /// Returns the number of removed nodes. Running it again on its own output removes nothing.
    pub fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let before = removed;
            for slot in 0..self.nodes.len() {
                let Some(node) = &self.nodes[slot] else {
                    continue;
                };
                let id = node.id;
                let kind = node.kind;
                match kind {
                    NodeKind::Phi => {
                        let Some(first) = node.ins.first() else {
                            continue;
                        };
                        let producer = first.from;
                        if node.ins.iter().any(|e| e.from != producer) {
                            continue;
                        }
                        let consumers: Vec<Edge> = node
                            .outs
                            .iter()
                            .filter(|e| e.kind != EdgeKind::Info)
                            .copied()
                            .collect();
                        trace!(phi = %id, %producer, "phi selects a single producer");
                        for edge in consumers {
                            self.connect(producer, edge.to, edge.kind);
                        }
                        self.remove(id);
                        removed += 1;
                    }
                    NodeKind::Merge => {
                        if node.ins.iter().any(|e| e.kind == EdgeKind::Info) {
                            continue;
                        }
                        let preds: Vec<NodeId> = node.ins.iter().map(|e| e.from).collect();
                        let succs: Vec<NodeId> = node
                            .outs
                            .iter()
                            .filter(|e| e.kind == EdgeKind::Control)
                            .map(|e| e.to)
                            .collect();
                        trace!(merge = %id, "merge has no phis");
                        for &p in &preds {
                            for &s in &succs {
                                self.connect(p, s, EdgeKind::Control);
                            }
                        }
                        if self.start == id {
                            if let Some(&s) = succs.first() {
                                self.start = s;
                            }
                        }
                        self.remove(id);
                        removed += 1;
                    }
                    NodeKind::Insn { .. } => {}
                }
            }
            if removed == before {
                break;
            }
        }
        debug!(removed, "soy cleanup");
        removed
    }

    /// Checks that every non-phi node's incoming data ordinals are `0..n`.
    pub fn verify(&self) -> Result<(), GraphError> {
        for node in self.nodes() {
            if node.is_phi() {
                continue;
            }
            let mut labels: Vec<u32> = node
                .ins
                .iter()
                .filter_map(|e| match e.kind {
                    EdgeKind::Data(DataLabel::Arg(n)) => Some(n),
                    EdgeKind::Data(DataLabel::Pred(_)) => Some(u32::MAX),
                    EdgeKind::Control | EdgeKind::Info => None,
                })
                .collect();
            labels.sort_unstable();
            for (expected, &label) in (0_u32..).zip(&labels) {
                if label != expected {
                    return Err(GraphError::LabelGap {
                        node: node.id,
                        missing: expected,
                    });
                }
            }
        }
        Ok(())
    }

    /// The underlying data-flow graph.
    #[must_use]
    #[inline]
    pub fn dfg(&self) -> &Dfg<'a> {
        &self.dfg
    }

    /// Head of the entry block's control chain.
    #[must_use]
    #[inline]
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Live nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    /// The live node `id`.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        let slot = *self.index.get(&id)?;
        self.nodes[slot].as_ref()
    }

    /// All live edges, grouped by producer in node order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.nodes().flat_map(|node| node.outs.iter())
    }

    /// Number of live phi nodes.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.nodes().filter(|n| n.is_phi()).count()
    }

    /// Renders the graph as a Mermaid flowchart.
    #[must_use]
    pub fn mermaid(&self) -> String {
        let mut out = String::new();
        let _ = self.write_mermaid(&mut out);
        out
    }

    fn write_mermaid(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "flowchart TD")?;
        for node in self.nodes() {
            writeln!(out, "  node_{}({node})", node.id)?;
        }
        for (link, edge) in self.edges().enumerate() {
            let (arrow, style) = match edge.kind {
                EdgeKind::Data(_) => ("-->", Some("stroke:green;")),
                EdgeKind::Control => ("-->", Some("stroke:red;")),
                EdgeKind::Info => ("-.->", None),
            };
            write!(out, "  node_{} {arrow} ", edge.from)?;
            match edge.kind {
                EdgeKind::Data(DataLabel::Arg(n)) => write!(out, "|{n}| ")?,
                EdgeKind::Data(DataLabel::Pred(p)) => write!(out, "|{:04}| ", p.0)?,
                EdgeKind::Control | EdgeKind::Info => {}
            }
            writeln!(out, "node_{}", edge.to)?;
            if let Some(style) = style {
                writeln!(out, "  linkStyle {link} {style}")?;
            }
        }
        Ok(())
    }
}

#[inline]
fn node_id(pc: usize) -> NodeId {
    NodeId(u32::try_from(pc).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use yarv_tape::asm::Asm;
    use yarv_tape::value::Value;

    fn ternary(indirect: bool) -> InstructionSequence {
        // indirect: 100 + (14 < 0 ? -1 : 1)
        // direct:   (14 < 0 ? -1 : 1) + 100
        let mut a = Asm::top();
        let other = a.new_label();
        let join = a.new_label();
        if indirect {
            a.putobject(Value::Integer(100));
        }
        a.putobject(Value::Integer(14));
        a.putobject(Value::Integer(0));
        a.opt_lt();
        a.branchunless(other);
        a.putobject(Value::Integer(-1));
        a.jump(join);
        a.bind(other).unwrap();
        a.putobject(Value::Integer(1));
        a.bind(join).unwrap();
        if !indirect {
            a.putobject(Value::Integer(100));
        }
        a.opt_plus();
        a.leave();
        a.build().unwrap()
    }

    fn data_producers(soy: &Soy<'_>, id: NodeId) -> Vec<NodeId> {
        soy.node(id)
            .unwrap()
            .ins()
            .iter()
            .filter(|e| matches!(e.kind, EdgeKind::Data(_)))
            .map(|e| e.from)
            .collect()
    }

    #[test]
    fn local_graph_mermaid() {
        let mut a = Asm::top();
        a.putobject(Value::Integer(14));
        a.putobject(Value::Integer(2));
        a.opt_plus();
        a.leave();
        let iseq = a.build().unwrap();
        let soy = Soy::from_iseq(&iseq).unwrap();
        assert_eq!(soy.start(), NodeId(2), "first side effect heads the chain");
        assert_eq!(
            soy.mermaid(),
            "flowchart TD\n\
             \x20 node_0(0000 PutObject)\n\
             \x20 node_1(0001 PutObject)\n\
             \x20 node_2(0002 OptPlus)\n\
             \x20 node_3(0003 Leave)\n\
             \x20 node_0 --> |0| node_2\n\
             \x20 linkStyle 0 stroke:green;\n\
             \x20 node_1 --> |1| node_2\n\
             \x20 linkStyle 1 stroke:green;\n\
             \x20 node_2 --> node_3\n\
             \x20 linkStyle 2 stroke:red;\n\
             \x20 node_2 --> |0| node_3\n\
             \x20 linkStyle 3 stroke:green;\n"
        );
    }

    #[test]
    fn ternary_keeps_one_phi_with_two_inputs() {
        let iseq = ternary(false);
        let soy = Soy::from_iseq(&iseq).unwrap();
        assert_eq!(soy.phi_count(), 1, "one join value");
        let phi = soy.nodes().find(|n| n.is_phi()).unwrap();
        assert_eq!(phi.id(), NodeId(1001), "merge is 1000");
        assert_eq!(
            data_producers(&soy, phi.id()),
            [NodeId(4), NodeId(6)],
            "one value per arm"
        );
        assert!(
            phi.outs().iter().any(|e| e.kind == EdgeKind::Info && e.to == NodeId(1000)),
            "phi hangs off the merge"
        );
        assert!(
            phi.outs()
                .iter()
                .any(|e| e.to == NodeId(8) && e.kind == EdgeKind::Data(DataLabel::Arg(0))),
            "phi feeds the add"
        );
    }

    #[test]
    fn phis_of_one_producer_collapse_into_a_direct_edge() {
        let iseq = ternary(true);
        let soy = Soy::from_iseq(&iseq).unwrap();
        assert_eq!(soy.phi_count(), 1, "only the arm value needs a phi");
        let direct: Vec<&Edge> = soy
            .edges()
            .filter(|e| e.from == NodeId(0) && e.to == NodeId(8))
            .collect();
        assert_eq!(direct.len(), 1, "one direct edge");
        assert_eq!(direct[0].kind, EdgeKind::Data(DataLabel::Arg(0)), "deepest operand");
        for phi in soy.nodes().filter(|n| n.is_phi()) {
            let producers = data_producers(&soy, phi.id());
            assert_ne!(producers, [NodeId(0), NodeId(0)], "no phi of a single producer");
        }
    }

    #[test]
    fn cleanup_is_idempotent() {
        let iseq = ternary(true);
        let mut soy = Soy::from_iseq(&iseq).unwrap();
        let before = soy.mermaid();
        assert_eq!(soy.cleanup(), 0, "nothing left to remove");
        assert_eq!(soy.mermaid(), before, "graph unchanged");
    }

    #[test]
    fn phi_edges_are_labelled_with_the_predecessor_tail() {
        let iseq = ternary(false);
        let soy = Soy::from_iseq(&iseq).unwrap();
        let mermaid = soy.mermaid();
        // block_4 ends in a jump (side effect at 5); block_6 is pure, so its head 6 stands in.
        assert!(mermaid.contains("  node_4 --> |0005| node_1001\n"), "{mermaid}");
        assert!(mermaid.contains("  node_6 --> |0006| node_1001\n"), "{mermaid}");
        assert!(mermaid.contains("  node_1001 -.-> node_1000\n"), "{mermaid}");
    }

    #[test]
    fn pure_block_uses_its_first_instruction_as_head_and_tail() {
        let iseq = ternary(false);
        let soy = Soy::from_iseq(&iseq).unwrap();
        let control = |from: u32, to: u32| {
            soy.edges().any(|e| {
                e.from == NodeId(from) && e.to == NodeId(to) && e.kind == EdgeKind::Control
            })
        };
        assert!(control(3, 6), "branch reaches the pure arm's only node");
        assert!(control(6, 1000), "the same node leaves the pure arm");
        assert!(control(3, 5), "the other arm is headed by its jump");
    }

    #[test]
    fn synthetic_ids_clear_the_instruction_range() {
        let mut a = Asm::top();
        for _ in 0..1200 {
            a.putnil();
            a.pop();
        }
        a.putnil();
        a.leave();
        let iseq = a.build().unwrap();
        let soy = Soy::from_iseq(&iseq).unwrap();
        assert_eq!(soy.next_synthetic, 3000, "2402 instructions");
    }
}
