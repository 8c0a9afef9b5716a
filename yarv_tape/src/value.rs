// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime value model for `yarv_tape`.
//!
//! This is the representation used by the interpreter and the host object model. It is
//! intentionally small and `no_std + alloc` friendly: the VM only needs to move values around,
//! test them for truthiness and name their class for method lookup. Everything else (arithmetic,
//! comparison, collection mutation) is delegated to the [`Host`](crate::host::Host).

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// An opaque handle to a host-owned object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjHandle(pub u64);

/// A host object value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Obj {
    /// Host-defined class name, used as the VM method-table type tag.
    pub class: String,
    /// Host-defined handle.
    pub handle: ObjHandle,
}

/// Operand of `putspecialobject`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpecialObject {
    /// The VM core object (`1`).
    VmCore,
    /// The current class base (`2`).
    CBase,
    /// The constant lookup base (`3`).
    ConstBase,
}

impl SpecialObject {
    /// Returns the numeric operand used in disassembly.
    #[must_use]
    #[inline]
    pub const fn code(self) -> u32 {
        match self {
            Self::VmCore => 1,
            Self::CBase => 2,
            Self::ConstBase => 3,
        }
    }
}

/// A runtime value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// `nil`.
    Nil,
    /// `true` / `false`.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Interned symbol, stored by name.
    Symbol(String),
    /// Ordered array.
    Array(Vec<Self>),
    /// Insertion-ordered hash.
    Hash(Vec<(Self, Self)>),
    /// Range between two values.
    Range {
        /// Range start.
        start: Box<Self>,
        /// Range end.
        end: Box<Self>,
        /// `true` for `a...b`.
        exclude_end: bool,
    },
    /// Regular expression source plus option bits.
    Regexp {
        /// Pattern source.
        source: String,
        /// Option bits.
        options: u32,
    },
    /// The top-level `self`.
    Main,
    /// A `putspecialobject` marker.
    Special(SpecialObject),
    /// Host object.
    Obj(Obj),
}

impl Value {
    /// Creates a symbol value.
    #[must_use]
    pub fn symbol(name: &str) -> Self {
        Self::Symbol(String::from(name))
    }

    /// Creates a string value.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(String::from(s))
    }

    /// Returns `false` only for `nil` and `false`.
    #[must_use]
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// Returns `true` for `nil`.
    #[must_use]
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns the class name used as the VM method-table type tag.
    #[must_use]
    pub fn class_name(&self) -> &str {
        match self {
            Self::Nil => "NilClass",
            Self::Bool(true) => "TrueClass",
            Self::Bool(false) => "FalseClass",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Str(_) => "String",
            Self::Symbol(_) => "Symbol",
            Self::Array(_) => "Array",
            Self::Hash(_) => "Hash",
            Self::Range { .. } => "Range",
            Self::Regexp { .. } => "Regexp",
            Self::Main => "Object",
            Self::Special(_) => "VMCore",
            Self::Obj(obj) => &obj.class,
        }
    }

    /// Returns an `inspect`-style rendering, used by disassembly.
    #[must_use]
    pub fn inspect(&self) -> Inspect<'_> {
        Inspect(self)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// `inspect`-style formatter returned by [`Value::inspect`].
#[derive(Copy, Clone, Debug)]
pub struct Inspect<'a>(&'a Value);

impl fmt::Display for Inspect<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => {
                // Integral floats keep a trailing `.0` so they never read as integers.
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "round-trip check for integral floats"
                )]
                let integral = x.is_finite() && *x == (*x as i64) as f64;
                if integral {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Symbol(s) => write!(f, ":{s}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item.inspect())?;
                }
                f.write_str("]")
            }
            Value::Hash(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}=>{}", k.inspect(), v.inspect())?;
                }
                f.write_str("}")
            }
            Value::Range {
                start,
                end,
                exclude_end,
            } => {
                let dots = if *exclude_end { "..." } else { ".." };
                write!(f, "{}{dots}{}", start.inspect(), end.inspect())
            }
            Value::Regexp { source, .. } => write!(f, "/{source}/"),
            Value::Main => f.write_str("main"),
            Value::Special(s) => write!(f, "{}", s.code()),
            Value::Obj(obj) => write!(f, "#<{}:{}>", obj.class, obj.handle.0),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn truthiness_only_rejects_nil_and_false() {
        assert!(!Value::Nil.is_truthy(), "nil is falsy");
        assert!(!Value::Bool(false).is_truthy(), "false is falsy");
        assert!(Value::Integer(0).is_truthy(), "zero is truthy");
        assert!(Value::str("").is_truthy(), "empty string is truthy");
    }

    #[test]
    fn class_names_follow_runtime_type() {
        assert_eq!(Value::Integer(1).class_name(), "Integer");
        assert_eq!(Value::Bool(true).class_name(), "TrueClass");
        assert_eq!(Value::Main.class_name(), "Object");
        let obj = Value::Obj(Obj {
            class: "Point".to_string(),
            handle: ObjHandle(7),
        });
        assert_eq!(obj.class_name(), "Point");
    }

    #[test]
    fn inspect_matches_literal_syntax() {
        assert_eq!(Value::Integer(-1).inspect().to_string(), "-1");
        assert_eq!(Value::Float(2.0).inspect().to_string(), "2.0");
        assert_eq!(Value::Float(2.5).inspect().to_string(), "2.5");
        assert_eq!(Value::symbol("fib").inspect().to_string(), ":fib");
        assert_eq!(Value::str("hi").inspect().to_string(), "\"hi\"");
        let arr = Value::Array(vec![Value::Integer(1), Value::Nil]);
        assert_eq!(arr.inspect().to_string(), "[1, nil]");
        let range = Value::Range {
            start: Box::new(Value::Integer(1)),
            end: Box::new(Value::Integer(3)),
            exclude_end: true,
        };
        assert_eq!(range.inspect().to_string(), "1...3");
    }
}
