// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Graph construction errors.

use alloc::string::String;
use core::fmt;

use crate::soy::NodeId;

/// A graph builder failure.
///
/// `Unsupported` rejects input before any block is produced. The other variants report a broken
/// builder invariant; there is no partial result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphError {
    /// The sequence uses a feature the analyses do not model (exception handlers).
    Unsupported {
        /// Name of the rejected sequence.
        iseq: String,
        /// What was rejected.
        reason: &'static str,
    },
    /// Value counts do not balance at a block boundary.
    FlowImbalance {
        /// Start index of the offending block.
        block: usize,
        /// Start index of the successor on the unbalanced edge, if the check was per edge.
        succ: Option<usize>,
        /// Count the check expected.
        expected: usize,
        /// Count found.
        actual: usize,
    },
    /// A node's incoming data ordinals are not contiguous from zero.
    LabelGap {
        /// The offending node.
        node: NodeId,
        /// First ordinal missing from the incoming edges.
        missing: u32,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { iseq, reason } => {
                write!(f, "unsupported instruction sequence {iseq}: {reason}")
            }
            Self::FlowImbalance {
                block,
                succ: Some(succ),
                expected,
                actual,
            } => write!(
                f,
                "flow imbalance on edge block_{block} -> block_{succ}: successor takes {expected}, block gives {actual}"
            ),
            Self::FlowImbalance {
                block,
                succ: None,
                expected,
                actual,
            } => write!(
                f,
                "flow imbalance in block_{block}: expected {expected} values, found {actual}"
            ),
            Self::LabelGap { node, missing } => {
                write!(f, "node {node} has no incoming data edge for argument {missing}")
            }
        }
    }
}

impl core::error::Error for GraphError {}
