// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Call-site descriptors.
//!
//! Every call-like instruction carries a [`CallData`]: the method name, the positional argument
//! count and a [`CallFlags`] bitset describing the calling convention. Descriptors are immutable
//! and compare structurally.

use alloc::string::String;
use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Calling-convention flags of a call site.
///
/// Bit positions follow the YARV `VM_CALL_*` order.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CallFlags(u16);

impl CallFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// `m(*args)`.
    pub const ARGS_SPLAT: Self = Self(1 << 0);
    /// `m(&block)`.
    pub const ARGS_BLOCKARG: Self = Self(1 << 1);
    /// Called without an explicit receiver: `m(...)`.
    pub const FCALL: Self = Self(1 << 2);
    /// Bare identifier call: `m`.
    pub const VCALL: Self = Self(1 << 3);
    /// No splat, block argument or keyword arguments.
    pub const ARGS_SIMPLE: Self = Self(1 << 4);
    /// The call site carries a block body.
    pub const BLOCKISEQ: Self = Self(1 << 5);
    /// Keyword arguments.
    pub const KWARG: Self = Self(1 << 6);
    /// `m(**opts)`.
    pub const KW_SPLAT: Self = Self(1 << 7);
    /// Located in tail position.
    pub const TAILCALL: Self = Self(1 << 8);
    /// `super(...)`.
    pub const SUPER: Self = Self(1 << 9);
    /// Zero-argument `super`.
    pub const ZSUPER: Self = Self(1 << 10);
    /// Internal optimized send.
    pub const OPT_SEND: Self = Self(1 << 11);
    /// Keyword splat hash may be mutated in place.
    pub const KW_SPLAT_MUT: Self = Self(1 << 12);

    const NAMES: [&'static str; 13] = [
        "ARGS_SPLAT",
        "ARGS_BLOCKARG",
        "FCALL",
        "VCALL",
        "ARGS_SIMPLE",
        "BLOCKISEQ",
        "KWARG",
        "KW_SPLAT",
        "TAILCALL",
        "SUPER",
        "ZSUPER",
        "OPT_SEND",
        "KW_SPLAT_MUT",
    ];

    /// Creates flags from raw bits. Unknown bits are kept but never printed.
    #[must_use]
    #[inline]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns `true` if every bit in `other` is set.
    #[must_use]
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if no bits are set.
    #[must_use]
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the names of the set flags, in bit order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .iter()
            .enumerate()
            .filter(move |(bit, _)| self.0 & (1 << bit) != 0)
            .map(|(_, name)| *name)
    }
}

impl BitOr for CallFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CallFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for CallFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.names().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}

/// An immutable call-site descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallData {
    mid: Option<String>,
    argc: u32,
    flags: CallFlags,
}

impl CallData {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(mid: Option<&str>, argc: u32, flags: CallFlags) -> Self {
        Self {
            mid: mid.map(String::from),
            argc,
            flags,
        }
    }

    /// A plain `recv.mid(args)` call with [`CallFlags::ARGS_SIMPLE`].
    #[must_use]
    pub fn simple(mid: &str, argc: u32) -> Self {
        Self::new(Some(mid), argc, CallFlags::ARGS_SIMPLE)
    }

    /// A receiver-less `mid(args)` call (`FCALL|ARGS_SIMPLE`).
    #[must_use]
    pub fn fcall(mid: &str, argc: u32) -> Self {
        Self::new(Some(mid), argc, CallFlags::FCALL | CallFlags::ARGS_SIMPLE)
    }

    /// A bare identifier call (`FCALL|VCALL|ARGS_SIMPLE`).
    #[must_use]
    pub fn vcall(mid: &str) -> Self {
        Self::new(
            Some(mid),
            0,
            CallFlags::FCALL | CallFlags::VCALL | CallFlags::ARGS_SIMPLE,
        )
    }

    /// Method name, if any (`invokeblock` has none).
    #[must_use]
    #[inline]
    pub fn mid(&self) -> Option<&str> {
        self.mid.as_deref()
    }

    /// Positional argument count.
    #[must_use]
    #[inline]
    pub fn argc(&self) -> u32 {
        self.argc
    }

    /// Calling-convention flags.
    #[must_use]
    #[inline]
    pub fn flags(&self) -> CallFlags {
        self.flags
    }
}

impl fmt::Display for CallData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<calldata!mid:{}, argc:{}",
            self.mid.as_deref().unwrap_or(""),
            self.argc
        )?;
        if !self.flags.is_empty() {
            write!(f, ", {}", self.flags)?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    #[test]
    fn flags_print_in_bit_order() {
        let flags = CallFlags::ARGS_SIMPLE | CallFlags::FCALL | CallFlags::VCALL;
        assert_eq!(flags.to_string(), "FCALL|VCALL|ARGS_SIMPLE");
        assert_eq!(
            CallFlags::KW_SPLAT_MUT.names().collect::<Vec<_>>(),
            ["KW_SPLAT_MUT"]
        );
    }

    #[test]
    fn call_data_display_matches_disassembly() {
        assert_eq!(
            CallData::simple("+", 1).to_string(),
            "<calldata!mid:+, argc:1, ARGS_SIMPLE>"
        );
        assert_eq!(
            CallData::fcall("fib", 1).to_string(),
            "<calldata!mid:fib, argc:1, FCALL|ARGS_SIMPLE>"
        );
        assert_eq!(
            CallData::new(None, 2, CallFlags::NONE).to_string(),
            "<calldata!mid:, argc:2>"
        );
    }

    #[test]
    fn call_data_equality_is_structural() {
        assert_eq!(CallData::simple("<", 1), CallData::simple("<", 1));
        assert_ne!(CallData::simple("<", 1), CallData::fcall("<", 1));
        assert_ne!(CallData::simple("<", 1), CallData::simple("<", 2));
    }
}
