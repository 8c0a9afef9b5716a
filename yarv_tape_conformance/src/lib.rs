// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conformance fixtures for `yarv_tape` and `yarv_graph`.
//!
//! - [`host::StdHost`] is a small reference object model.
//! - [`programs`] assembles the sample programs the scenario tests, benches and examples share.
//!
//! The scenarios themselves live in this crate's `tests/` directory.

pub mod host;
pub mod programs;

pub use host::StdHost;
