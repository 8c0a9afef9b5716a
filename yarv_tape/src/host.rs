// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host object-model interface.
//!
//! The VM only knows how to run instruction sequences. Everything the instructions ask of the
//! object model (arithmetic, comparisons, collection methods, constants, globals the program did
//! not assign itself) is delegated to a [`Host`].
//!
//! A host method that takes a block receives it as a [`Block`]. Calling the block re-enters the
//! VM with the host handed back in, so the host never has to alias itself.

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

use crate::value::Value;
use crate::vm::VmFault;

/// A failure reported by the host object model.
#[derive(Clone, Debug, PartialEq)]
pub enum HostError {
    /// The receiver does not respond to the method.
    UnknownMethod {
        /// Receiver class name.
        class: String,
        /// Method name.
        method: String,
    },
    /// Wrong number of arguments.
    ArgumentCount {
        /// Expected count.
        expected: usize,
        /// Supplied count.
        actual: usize,
    },
    /// An operand had the wrong type.
    TypeMismatch {
        /// Expected class name.
        expected: &'static str,
        /// Actual class name.
        actual: String,
    },
    /// The method raised.
    Raised(String),
    /// A block invoked by the host failed inside the VM.
    Vm(Box<VmFault>),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMethod { class, method } => {
                write!(f, "undefined method `{method}' for {class}")
            }
            Self::ArgumentCount { expected, actual } => write!(
                f,
                "wrong number of arguments (given {actual}, expected {expected})"
            ),
            Self::TypeMismatch { expected, actual } => {
                write!(f, "{actual} can't be coerced into {expected}")
            }
            Self::Raised(msg) => f.write_str(msg),
            Self::Vm(fault) => write!(f, "{fault}"),
        }
    }
}

impl core::error::Error for HostError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Vm(fault) => Some(&**fault),
            _ => None,
        }
    }
}

/// A block passed to a host method.
pub trait Block<H: ?Sized> {
    /// Runs the block body with `args` and returns its result.
    fn yield_values(&mut self, host: &mut H, args: &[Value]) -> Result<Value, HostError>;
}

/// Host object model.
pub trait Host {
    /// Calls `method` on `receiver`.
    ///
    /// Only invoked for methods the program did not define itself.
    fn send(
        &mut self,
        receiver: &Value,
        method: &str,
        args: &[Value],
        block: Option<&mut dyn Block<Self>>,
    ) -> Result<Value, HostError>;

    /// Returns the host's value of global `name`, if any.
    ///
    /// Once this returns a value the VM keeps it in its own table and stops asking.
    fn global(&mut self, _name: &str) -> Option<Value> {
        None
    }

    /// Resolves constant `name`, lexically when `scope` is `None`.
    fn constant(&mut self, _scope: Option<&Value>, _name: &str) -> Option<Value> {
        None
    }

    /// Returns `true` if `receiver` responds to `method`. Used by `defined?(recv.method)`.
    fn responds_to(&mut self, _receiver: &Value, _method: &str) -> bool {
        false
    }
}
