// Copyright 2026 the YARV Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A reference object model covering the core numeric, string and collection methods.

use std::collections::BTreeMap;

use yarv_tape::host::{Block, Host, HostError};
use yarv_tape::value::Value;

/// Reference [`Host`] used by the conformance tests, benches and examples.
///
/// `puts` appends to [`StdHost::output`] instead of printing.
#[derive(Clone, Debug, Default)]
pub struct StdHost {
    /// Lines written by `puts`.
    pub output: Vec<String>,
    /// Globals the VM may import.
    pub globals: BTreeMap<String, Value>,
    /// Top-level constants.
    pub constants: BTreeMap<String, Value>,
    /// Number of `send`s handled.
    pub calls: u64,
}

impl StdHost {
    /// An empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a global the VM will import on first read.
    #[must_use]
    pub fn with_global(mut self, name: &str, value: Value) -> Self {
        self.globals.insert(name.to_string(), value);
        self
    }

    /// Adds a top-level constant.
    #[must_use]
    pub fn with_constant(mut self, name: &str, value: Value) -> Self {
        self.constants.insert(name.to_string(), value);
        self
    }
}

fn unknown(receiver: &Value, method: &str) -> HostError {
    HostError::UnknownMethod {
        class: receiver.class_name().to_string(),
        method: method.to_string(),
    }
}

fn arity(args: &[Value], expected: usize) -> Result<(), HostError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(HostError::ArgumentCount {
            expected,
            actual: args.len(),
        })
    }
}

fn need_block<'b, H: ?Sized>(
    block: Option<&'b mut dyn Block<H>>,
) -> Result<&'b mut dyn Block<H>, HostError> {
    block.ok_or_else(|| HostError::Raised("no block given (yield)".to_string()))
}

/// `to_s` as the host renders it.
#[must_use]
pub fn to_s(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        Value::Str(s) | Value::Symbol(s) => s.clone(),
        Value::Main => "main".to_string(),
        other => other.inspect().to_string(),
    }
}

fn to_f(value: &Value) -> Option<f64> {
    match value {
        #[allow(clippy::cast_precision_loss, reason = "matches integer-to-float coercion")]
        Value::Integer(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn numeric_class(value: &Value) -> &'static str {
    match value {
        Value::Float(_) => "Float",
        _ => "Integer",
    }
}

fn compare(a: &Value, b: &Value) -> Option<core::cmp::Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => to_f(a)?.partial_cmp(&to_f(b)?),
    }
}

fn integer_op(a: i64, method: &str, b: i64) -> Result<Option<Value>, HostError> {
    let v = match method {
        "+" => a.checked_add(b),
        "-" => a.checked_sub(b),
        "*" => a.checked_mul(b),
        "/" | "%" if b == 0 => return Err(HostError::Raised("divided by 0".to_string())),
        // Quotients round toward negative infinity; remainders take the divisor's sign.
        "/" => a.checked_div(b).map(|q| {
            if a % b != 0 && (a < 0) != (b < 0) {
                q - 1
            } else {
                q
            }
        }),
        "%" => a.checked_rem(b).map(|r| {
            if r != 0 && (r < 0) != (b < 0) {
                r + b
            } else {
                r
            }
        }),
        "<<" => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)),
        "&" => Some(a & b),
        "|" => Some(a | b),
        _ => return Ok(None),
    };
    v.map(|v| Some(Value::Integer(v)))
        .ok_or_else(|| HostError::Raised("integer overflow".to_string()))
}

fn float_op(a: f64, method: &str, b: f64) -> Option<Value> {
    Some(Value::Float(match method {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" => a / b,
        "%" => a.rem_euclid(b),
        _ => return None,
    }))
}

fn index(len: usize, i: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let i = if i < 0 { len + i } else { i };
    (0..len).contains(&i).then(|| usize::try_from(i).ok()).flatten()
}

impl StdHost {
    fn numeric(&self, receiver: &Value, method: &str, args: &[Value]) -> Result<Value, HostError> {
        match (receiver, method, args) {
            (Value::Integer(a), "succ", []) => a
                .checked_add(1)
                .map(Value::Integer)
                .ok_or_else(|| HostError::Raised("integer overflow".to_string())),
            (Value::Integer(a), _, [Value::Integer(b)]) => {
                if let Some(v) = integer_op(*a, method, *b)? {
                    return Ok(v);
                }
                self.comparison(receiver, method, args)
            }
            (_, _, [other]) => match (to_f(receiver), to_f(other)) {
                (Some(a), Some(b)) => match float_op(a, method, b) {
                    Some(v) => Ok(v),
                    None => self.comparison(receiver, method, args),
                },
                _ => match method {
                    "+" | "-" | "*" | "/" | "%" | "<" | "<=" | ">" | ">=" => {
                        Err(HostError::TypeMismatch {
                            expected: numeric_class(receiver),
                            actual: other.class_name().to_string(),
                        })
                    }
                    _ => self.comparison(receiver, method, args),
                },
            },
            _ => self.comparison(receiver, method, args),
        }
    }

    fn comparison(
        &self,
        receiver: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Value, HostError> {
        match (method, args) {
            ("==", [other]) => Ok(Value::Bool(receiver == other)),
            ("!=", [other]) => Ok(Value::Bool(receiver != other)),
            ("<" | "<=" | ">" | ">=", [other]) => {
                let ord = compare(receiver, other).ok_or_else(|| HostError::Raised(format!(
                    "comparison of {} with {} failed",
                    receiver.class_name(),
                    other.class_name()
                )))?;
                Ok(Value::Bool(match method {
                    "<" => ord.is_lt(),
                    "<=" => ord.is_le(),
                    ">" => ord.is_gt(),
                    _ => ord.is_ge(),
                }))
            }
            _ => self.object(receiver, method, args),
        }
    }

    fn object(&self, receiver: &Value, method: &str, args: &[Value]) -> Result<Value, HostError> {
        match (method, args) {
            ("!", []) => Ok(Value::Bool(!receiver.is_truthy())),
            ("nil?", []) => Ok(Value::Bool(receiver.is_nil())),
            ("to_s", []) => Ok(Value::Str(to_s(receiver))),
            ("inspect", []) => Ok(Value::Str(receiver.inspect().to_string())),
            _ => Err(unknown(receiver, method)),
        }
    }

    fn string(
        &self,
        s: &str,
        receiver: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Value, HostError> {
        match (method, args) {
            ("+", [Value::Str(t)]) => Ok(Value::Str(format!("{s}{t}"))),
            ("<<", [other]) => Ok(Value::Str(format!("{s}{}", to_s(other)))),
            ("*", [Value::Integer(n)]) => {
                let n = usize::try_from(*n)
                    .map_err(|_| HostError::Raised("negative argument".to_string()))?;
                Ok(Value::Str(s.repeat(n)))
            }
            ("length" | "size", []) => Ok(Value::Integer(
                i64::try_from(s.chars().count()).unwrap_or(i64::MAX),
            )),
            ("empty?", []) => Ok(Value::Bool(s.is_empty())),
            ("upcase", []) => Ok(Value::Str(s.to_uppercase())),
            ("to_sym", []) => Ok(Value::symbol(s)),
            ("=~", [Value::Regexp { source, .. }]) => Ok(s
                .find(source.as_str())
                .map_or(Value::Nil, |i| Value::Integer(i64::try_from(i).unwrap_or(i64::MAX)))),
            _ => self.comparison(receiver, method, args),
        }
    }

    fn array(
        &mut self,
        items: &[Value],
        receiver: &Value,
        method: &str,
        args: &[Value],
        block: Option<&mut dyn Block<Self>>,
    ) -> Result<Value, HostError> {
        match (method, args) {
            ("length" | "size", []) => Ok(Value::Integer(
                i64::try_from(items.len()).unwrap_or(i64::MAX),
            )),
            ("empty?", []) => Ok(Value::Bool(items.is_empty())),
            ("first", []) => Ok(items.first().cloned().unwrap_or(Value::Nil)),
            ("last", []) => Ok(items.last().cloned().unwrap_or(Value::Nil)),
            ("[]", [Value::Integer(i)]) => Ok(index(items.len(), *i)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Nil)),
            ("[]=", [Value::Integer(i), value]) => {
                // Arrays are values; the assignment only validates the index.
                index(items.len(), *i)
                    .ok_or_else(|| HostError::Raised(format!("index {i} out of array")))?;
                Ok(value.clone())
            }
            ("<<" | "push", [value]) => {
                let mut out = items.to_vec();
                out.push(value.clone());
                Ok(Value::Array(out))
            }
            ("+", [Value::Array(more)]) => {
                let mut out = items.to_vec();
                out.extend(more.iter().cloned());
                Ok(Value::Array(out))
            }
            ("min" | "max", []) => {
                let mut best: Option<&Value> = None;
                for item in items {
                    let better = match best {
                        None => true,
                        Some(b) => {
                            let ord = compare(item, b).ok_or_else(|| {
                                HostError::Raised("comparison failed".to_string())
                            })?;
                            if method == "min" { ord.is_lt() } else { ord.is_gt() }
                        }
                    };
                    if better {
                        best = Some(item);
                    }
                }
                Ok(best.cloned().unwrap_or(Value::Nil))
            }
            ("sum", []) => {
                let mut acc = Value::Integer(0);
                for item in items {
                    acc = self.numeric(&acc, "+", core::slice::from_ref(item))?;
                }
                Ok(acc)
            }
            ("each", []) => {
                let block = need_block(block)?;
                for item in items {
                    block.yield_values(self, core::slice::from_ref(item))?;
                }
                Ok(receiver.clone())
            }
            ("map", []) => {
                let block = need_block(block)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(block.yield_values(self, core::slice::from_ref(item))?);
                }
                Ok(Value::Array(out))
            }
            _ => self.comparison(receiver, method, args),
        }
    }

    fn hash(
        &self,
        pairs: &[(Value,
        Value)],
        receiver: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Value, HostError> {
        match (method, args) {
            ("[]", [key]) => Ok(pairs
                .iter()
                .find(|(k, _)| k == key)
                .map_or(Value::Nil, |(_, v)| v.clone())),
            ("length" | "size", []) => Ok(Value::Integer(
                i64::try_from(pairs.len()).unwrap_or(i64::MAX),
            )),
            ("empty?", []) => Ok(Value::Bool(pairs.is_empty())),
            ("key?", [key]) => Ok(Value::Bool(pairs.iter().any(|(k, _)| k == key))),
            _ => self.comparison(receiver, method, args),
        }
    }
}

impl Host for StdHost {
    fn send(
        &mut self,
        receiver: &Value,
        method: &str,
        args: &[Value],
        block: Option<&mut dyn Block<Self>>,
    ) -> Result<Value, HostError> {
        self.calls += 1;
        match receiver {
            Value::Integer(n) if method == "times" => {
                arity(args, 0)?;
                let block = need_block(block)?;
                for i in 0..*n {
                    block.yield_values(self, &[Value::Integer(i)])?;
                }
                Ok(receiver.clone())
            }
            Value::Integer(_) | Value::Float(_) => self.numeric(receiver, method, args),
            Value::Str(s) => self.string(s, receiver, method, args),
            Value::Array(items) => self.array(items, receiver, method, args, block),
            Value::Hash(pairs) => self.hash(pairs, receiver, method, args),
            Value::Main if method == "puts" => {
                if args.is_empty() {
                    self.output.push(String::new());
                }
                for arg in args {
                    self.output.push(to_s(arg));
                }
                Ok(Value::Nil)
            }
            _ => self.comparison(receiver, method, args),
        }
    }

    fn global(&mut self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    fn constant(&mut self, scope: Option<&Value>, name: &str) -> Option<Value> {
        match scope {
            None | Some(Value::Main) => self.constants.get(name).cloned(),
            Some(_) => None,
        }
    }

    fn responds_to(&mut self, receiver: &Value, method: &str) -> bool {
        let common = ["==", "!=", "!", "nil?", "to_s", "inspect"];
        if common.contains(&method) {
            return true;
        }
        let specific: &[&str] = match receiver {
            Value::Integer(_) => &[
                "+", "-", "*", "/", "%", "<", "<=", ">", ">=", "<<", "&", "|", "succ", "times",
            ],
            Value::Float(_) => &["+", "-", "*", "/", "%", "<", "<=", ">", ">="],
            Value::Str(_) => &[
                "+", "<<", "*", "length", "size", "empty?", "upcase", "to_sym", "=~", "<", "<=",
                ">", ">=",
            ],
            Value::Array(_) => &[
                "length", "size", "empty?", "first", "last", "[]", "<<", "push", "+", "min", "max",
                "sum", "each", "map",
            ],
            Value::Hash(_) => &["[]", "length", "size", "empty?", "key?"],
            Value::Main => &["puts"],
            _ => &[],
        };
        specific.contains(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_floors() {
        let mut host = StdHost::new();
        let seven = Value::Integer(-7);
        let q = host.send(&seven, "/", &[Value::Integer(2)], None).unwrap();
        let r = host.send(&seven, "%", &[Value::Integer(2)], None).unwrap();
        assert_eq!(q, Value::Integer(-4), "floored quotient");
        assert_eq!(r, Value::Integer(1), "modulo takes the divisor's sign");
    }

    #[test]
    fn mixed_arithmetic_is_float() {
        let mut host = StdHost::new();
        let v = host
            .send(&Value::Integer(1), "+", &[Value::Float(0.5)], None)
            .unwrap();
        assert_eq!(v, Value::Float(1.5));
    }

    #[test]
    fn unknown_methods_name_the_class() {
        let mut host = StdHost::new();
        let err = host.send(&Value::Nil, "frobnicate", &[], None).unwrap_err();
        assert_eq!(
            err,
            HostError::UnknownMethod {
                class: "NilClass".into(),
                method: "frobnicate".into()
            }
        );
    }

    #[test]
    fn array_min_and_max() {
        let mut host = StdHost::new();
        let items = Value::Array(vec![Value::Integer(3), Value::Integer(1), Value::Integer(2)]);
        assert_eq!(host.send(&items, "min", &[], None), Ok(Value::Integer(1)));
        assert_eq!(host.send(&items, "max", &[], None), Ok(Value::Integer(3)));
    }
}
