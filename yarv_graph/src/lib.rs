// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `yarv_graph`: static graphs over `yarv_tape` instruction sequences.
//!
//! The analyses never run the program. Each stage consumes the previous one:
//!
//! - [`cfg::Cfg`] splits a sequence into basic blocks and links predecessors and successors.
//! - [`dfg::Dfg`] tracks which instruction produces each operand, inside and across blocks.
//! - [`soy::Soy`] fuses both into a sea-of-nodes graph with phi and merge nodes.
//!
//! Sequences with exception handlers are rejected with [`GraphError::Unsupported`].
//!
//! ```
//! use yarv_graph::soy::Soy;
//! use yarv_tape::asm::Asm;
//! use yarv_tape::value::Value;
//!
//! let mut a = Asm::top();
//! a.putobject(Value::Integer(2));
//! a.putobject(Value::Integer(3));
//! a.opt_plus();
//! a.leave();
//! let iseq = a.build()?;
//!
//! let soy = Soy::from_iseq(&iseq)?;
//! assert_eq!(soy.dfg().cfg().blocks().len(), 1);
//! assert_eq!(soy.phi_count(), 0);
//! assert!(soy.mermaid().starts_with("flowchart TD\n"));
//! # Ok::<(), Box<dyn core::error::Error>>(())
//! ```

#![no_std]

extern crate alloc;

pub mod cfg;
pub mod dfg;
mod error;
pub mod soy;

pub use error::GraphError;
