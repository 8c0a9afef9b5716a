// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Criterion benchmarks for the `yarv_tape` interpreter. See `benches/vm.rs`.
