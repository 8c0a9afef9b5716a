// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;
use std::string::String;
use yarv_tape::iseq::{InstructionSequence, IseqKind};

/// Optional label resolver for profiling scopes.
///
/// Return `None` to fall back to the default kind-based labels.
pub trait LabelResolver {
    /// Resolve a label for a VM frame running `iseq`.
    fn frame_label(&mut self, _iseq: &InstructionSequence) -> Option<String> {
        None
    }

    /// Resolve a label for a call delegated to the host.
    fn host_call_label(&mut self, _method: &str) -> Option<String> {
        None
    }
}

/// Default resolver that keeps one label per sequence kind.
#[derive(Default, Debug)]
pub struct DefaultLabelResolver;

impl LabelResolver for DefaultLabelResolver {}

/// Resolver that labels frames with their sequence name.
#[derive(Default, Debug)]
pub struct IseqNameResolver {
    frame_cache: HashMap<(IseqKind, String), String>,
}

impl LabelResolver for IseqNameResolver {
    fn frame_label(&mut self, iseq: &InstructionSequence) -> Option<String> {
        let key = (iseq.kind(), String::from(iseq.name()));
        if let Some(label) = self.frame_cache.get(&key) {
            return Some(label.clone());
        }
        let label = format!("{}:{}", kind_name(iseq.kind()), iseq.name());
        self.frame_cache.insert(key, label.clone());
        Some(label)
    }
}

fn kind_name(kind: IseqKind) -> &'static str {
    match kind {
        IseqKind::Top => "top",
        IseqKind::Method => "method",
        IseqKind::Block => "block",
    }
}

pub(crate) fn default_frame_label(iseq: &InstructionSequence) -> String {
    format!("frame:{}", kind_name(iseq.kind()))
}

pub(crate) fn default_host_call_label(method: &str) -> String {
    format!("host:{method}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarv_tape::asm::Asm;

    #[test]
    fn iseq_names_label_frames() {
        let mut a = Asm::method("fib", &["n"]);
        a.putnil();
        a.leave();
        let iseq = a.build().unwrap();

        let mut resolver = IseqNameResolver::default();
        assert_eq!(resolver.frame_label(&iseq).as_deref(), Some("method:fib"));
        assert_eq!(resolver.frame_label(&iseq).as_deref(), Some("method:fib"));
        assert_eq!(resolver.host_call_label("+"), None);
        assert_eq!(default_frame_label(&iseq), "frame:method");
        assert_eq!(default_host_call_label("+"), "host:+");
    }
}
