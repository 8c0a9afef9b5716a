// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Profiling adapters for `yarv_tape` (currently Tracy).
//!
//! This crate is `std`-only and keeps `yarv_tape` itself free of profiling dependencies.
//! It listens for frame and host-call scope callbacks and emits matching profiling scopes.
//!
//! ## Backend
//! This crate currently supports the Tracy backend via `tracy-client`.
//!
//! ## Example
//! ```ignore
//! use yarv_tape::trace::TraceSink;
//! use yarv_tape_profiling::{IseqNameResolver, ProfilingTraceSink};
//!
//! let mut sink = ProfilingTraceSink::with_resolver(IseqNameResolver::default());
//! let mask = sink.mask();
//! vm.run_with_ctx(&mut ctx, &iseq, mask, Some(&mut sink))?;
//! # Ok::<(), yarv_tape::vm::VmFault>(())
//! ```

mod resolver;
mod sink;

pub use resolver::{DefaultLabelResolver, IseqNameResolver, LabelResolver};
pub use sink::ProfilingTraceSink;
