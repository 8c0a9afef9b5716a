// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Criterion benchmarks for `yarv_graph`. See `benches/graph.rs`.
