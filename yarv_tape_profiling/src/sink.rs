// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::resolver::{
    DefaultLabelResolver, LabelResolver, default_frame_label, default_host_call_label,
};
use std::string::String;
use std::vec::Vec;
use yarv_tape::trace::{ScopeKind, TraceMask, TraceSink};

type BackendGuard = tracy_client::Span;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ScopeTag {
    Frame,
    HostCall,
}

impl From<ScopeKind<'_>> for ScopeTag {
    fn from(kind: ScopeKind<'_>) -> Self {
        match kind {
            ScopeKind::Frame { .. } => Self::Frame,
            ScopeKind::HostCall { .. } => Self::HostCall,
        }
    }
}

struct ScopeEntry {
    tag: ScopeTag,
    depth: usize,
    // Keep the label alive for backends that may borrow it.
    label: String,
    guard: Option<BackendGuard>,
}

/// A `TraceSink` that emits Tracy scopes via `tracy-client`.
pub struct ProfilingTraceSink<R = DefaultLabelResolver> {
    resolver: R,
    stack: Vec<ScopeEntry>,
}

impl ProfilingTraceSink<DefaultLabelResolver> {
    /// Create a new sink with kind-based labels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: LabelResolver> ProfilingTraceSink<R> {
    /// Create a new sink with a custom label resolver.
    #[must_use]
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            resolver,
            stack: Vec::new(),
        }
    }

    /// Number of scopes currently open.
    #[must_use]
    pub fn open_scopes(&self) -> usize {
        self.stack.len()
    }

    fn on_scope_enter(&mut self, kind: ScopeKind<'_>, depth: usize, pc: usize) {
        let label = self.resolve_label(kind);
        let tag = ScopeTag::from(kind);
        let guard = start_scope(tag, &label, pc);
        self.stack.push(ScopeEntry {
            tag,
            depth,
            label,
            guard,
        });
    }

    fn on_scope_exit(&mut self, kind: ScopeKind<'_>, depth: usize) {
        let tag = ScopeTag::from(kind);
        if let Some(top) = self.stack.last()
            && top.tag == tag
            && top.depth == depth
        {
            if let Some(entry) = self.stack.pop() {
                let ScopeEntry {
                    label: _label,
                    guard: _guard,
                    ..
                } = entry;
                let _ = (_label, _guard);
            }
            return;
        }
        // If the stack got out of sync, drop any active scopes to avoid leaking.
        self.drop_active_scopes();
    }

    fn resolve_label(&mut self, kind: ScopeKind<'_>) -> String {
        match kind {
            ScopeKind::Frame { iseq } => self
                .resolver
                .frame_label(iseq)
                .unwrap_or_else(|| default_frame_label(iseq)),
            ScopeKind::HostCall { method } => self
                .resolver
                .host_call_label(method)
                .unwrap_or_else(|| default_host_call_label(method)),
        }
    }

    // Drop in LIFO order so nested spans close inner-to-outer.
    fn drop_active_scopes(&mut self) {
        while let Some(entry) = self.stack.pop() {
            let ScopeEntry {
                label: _label,
                guard: _guard,
                ..
            } = entry;
            let _ = (_label, _guard);
        }
    }
}

fn start_scope(tag: ScopeTag, label: &str, pc: usize) -> Option<BackendGuard> {
    let function_name = match tag {
        ScopeTag::Frame => "yarv_tape.frame",
        ScopeTag::HostCall => "yarv_tape.host_call",
    };
    let client = tracy_client::Client::running()?;
    let line = u32::try_from(pc).unwrap_or(u32::MAX);
    Some(client.span_alloc(Some(label), function_name, "yarv_tape", line, 0))
}

impl<R: LabelResolver> TraceSink for ProfilingTraceSink<R> {
    fn mask(&self) -> TraceMask {
        TraceMask::CALL | TraceMask::HOST
    }

    fn scope_enter(&mut self, kind: ScopeKind<'_>, depth: usize, pc: usize) {
        self.on_scope_enter(kind, depth, pc);
    }

    fn scope_exit(&mut self, kind: ScopeKind<'_>, depth: usize, _pc: usize) {
        self.on_scope_exit(kind, depth);
    }
}

impl<R> Default for ProfilingTraceSink<R>
where
    R: LabelResolver + Default,
{
    fn default() -> Self {
        Self::with_resolver(R::default())
    }
}

impl<R> std::fmt::Debug for ProfilingTraceSink<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingTraceSink")
            .field("stack_depth", &self.stack.len())
            .finish_non_exhaustive()
    }
}
