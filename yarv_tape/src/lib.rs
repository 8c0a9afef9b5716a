// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `yarv_tape`: a YARV-style stack bytecode and its interpreter.
//!
//! The crate is `no_std + alloc`. It provides:
//!
//! - the instruction catalog ([`instr`]) with per-instruction stack effects and control-flow
//!   attributes,
//! - call-site descriptors ([`call_data`]) and runtime values ([`value`]),
//! - immutable instruction sequences ([`iseq`]) built with the [`asm`] assembler,
//! - the interpreter ([`vm`]), which delegates the object model to a [`host::Host`],
//! - trace hooks ([`trace`]) and textual disassembly ([`disasm`]).
//!
//! ```
//! use std::rc::Rc;
//! use yarv_tape::asm::Asm;
//! use yarv_tape::host::{Block, Host, HostError};
//! use yarv_tape::value::Value;
//! use yarv_tape::vm::{Limits, Vm};
//!
//! struct Ints;
//!
//! impl Host for Ints {
//!     fn send(
//!         &mut self,
//!         receiver: &Value,
//!         method: &str,
//!         args: &[Value],
//!         _block: Option<&mut dyn Block<Self>>,
//!     ) -> Result<Value, HostError> {
//!         match (receiver, method, args) {
//!             (Value::Integer(a), "+", [Value::Integer(b)]) => Ok(Value::Integer(a + b)),
//!             _ => Err(HostError::Raised("unsupported".into())),
//!         }
//!     }
//! }
//!
//! let mut a = Asm::top();
//! a.putobject(Value::Integer(2));
//! a.putobject(Value::Integer(3));
//! a.opt_plus();
//! a.leave();
//! let iseq = Rc::new(a.build()?);
//!
//! let mut vm = Vm::new(Ints, Limits::default());
//! assert_eq!(vm.run(&iseq)?, Value::Integer(5));
//! # Ok::<(), Box<dyn core::error::Error>>(())
//! ```

#![no_std]

extern crate alloc;

pub mod asm;
pub mod call_data;
pub mod disasm;
pub mod host;
pub mod instr;
pub mod iseq;
pub mod trace;
pub mod value;
pub mod vm;
