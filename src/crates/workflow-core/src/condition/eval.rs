//! Tree-walking interpreter for compiled predicates

use parking_lot::RwLock;
use regex::Regex;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::parser::{BinaryOp, Expr, Func, UnaryOp};
use super::{ConditionError, ConditionResult};
use crate::state::{is_truthy, State};

const REGEX_CACHE_CAPACITY: usize = 256;

/// Compiled regexes for patterns written literally in a predicate
#[derive(Default)]
pub(crate) struct RegexCache {
    inner: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn compile(pattern: &str) -> ConditionResult<Regex> {
        Regex::new(pattern).map_err(|e| ConditionError::InvalidRegex(e.to_string()))
    }

    /// Match against a literal pattern, compiling it once
    fn is_match(&self, pattern: &str, text: &str) -> ConditionResult<bool> {
        if let Some(regex) = self.inner.read().get(pattern) {
            return Ok(regex.is_match(text));
        }
        let regex = Self::compile(pattern)?;
        let matched = regex.is_match(text);

        let mut inner = self.inner.write();
        if inner.len() >= REGEX_CACHE_CAPACITY {
            if let Some(victim) = inner.keys().next().cloned() {
                inner.remove(&victim);
            }
        }
        inner.insert(pattern.to_string(), regex);
        Ok(matched)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}

pub(crate) struct Interpreter<'a> {
    pub state: &'a State,
    pub regexes: &'a RegexCache,
}

impl<'a> Interpreter<'a> {
    pub fn eval(&self, expr: &Expr) -> ConditionResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::State => Ok(Value::Object(self.state.clone())),
            Expr::Index(target, key) => {
                // State paths are walked by reference instead of cloning the map
                if let Some(found) = self.lookup(expr)? {
                    return Ok(found.clone());
                }
                let target = self.eval(target)?;
                let key = self.eval(key)?;
                index(&target, &key).cloned()
            }
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<ConditionResult<Vec<_>>>()
                .map(Value::Array),
            Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!is_truthy(&self.eval(inner)?))),
            Expr::Unary(UnaryOp::Neg, inner) => {
                let value = self.eval(inner)?;
                negate(&value)
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                if !is_truthy(&self.eval(left)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(is_truthy(&self.eval(right)?)))
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                if is_truthy(&self.eval(left)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(is_truthy(&self.eval(right)?)))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Call(func, args) => self.call(*func, args),
        }
    }

    /// Resolve `state...` paths without copying intermediate containers.
    /// Returns `Ok(None)` when `expr` is not a pure state path.
    fn lookup(&self, expr: &Expr) -> ConditionResult<Option<&'a Value>> {
        match expr {
            Expr::Index(target, key) if is_state_path(target) => {
                let key = self.eval(key)?;
                match target.as_ref() {
                    Expr::State => match &key {
                        Value::String(k) => self
                            .state
                            .get(k)
                            .map(Some)
                            .ok_or_else(|| ConditionError::MissingKey(k.clone())),
                        other => Err(ConditionError::TypeMismatch {
                            op: "[]",
                            left: "state",
                            right: type_name(other),
                        }),
                    },
                    inner => match self.lookup(inner)? {
                        Some(parent) => index(parent, &key).map(Some),
                        None => Ok(None),
                    },
                }
            }
            _ => Ok(None),
        }
    }

    fn call(&self, func: Func, args: &[Expr]) -> ConditionResult<Value> {
        let arg = |i: usize| args.get(i).ok_or(ConditionError::UnexpectedEnd);

        if func == Func::Exists {
            return match self.eval(arg(0)?) {
                Ok(_) => Ok(Value::Bool(true)),
                Err(ConditionError::MissingKey(_)) | Err(ConditionError::IndexOutOfRange { .. }) => {
                    Ok(Value::Bool(false))
                }
                Err(other) => Err(other),
            };
        }

        let first = self.eval(arg(0)?)?;
        match func {
            Func::Exists => Ok(Value::Bool(true)),
            Func::Len => match &first {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(map) => Ok(Value::from(map.len())),
                other => Err(ConditionError::TypeMismatch {
                    op: "len",
                    left: type_name(other),
                    right: "none",
                }),
            },
            Func::Lower => expect_str(&first, "lower").map(|s| Value::String(s.to_lowercase())),
            Func::Upper => expect_str(&first, "upper").map(|s| Value::String(s.to_uppercase())),
            Func::Matches => {
                let text = expect_str(&first, "matches")?;
                let matched = match arg(1)? {
                    Expr::Literal(Value::String(pattern)) => self.regexes.is_match(pattern, text),
                    // Patterns computed from state are compiled per call
                    dynamic => {
                        let pattern = self.eval(dynamic)?;
                        let pattern = expect_str(&pattern, "matches")?;
                        RegexCache::compile(pattern).map(|regex| regex.is_match(text))
                    }
                };
                matched.map(Value::Bool)
            }
        }
    }
}

fn is_state_path(expr: &Expr) -> bool {
    match expr {
        Expr::State => true,
        Expr::Index(target, _) => is_state_path(target),
        _ => false,
    }
}

fn expect_str<'v>(value: &'v Value, op: &'static str) -> ConditionResult<&'v str> {
    value.as_str().ok_or(ConditionError::TypeMismatch {
        op,
        left: type_name(value),
        right: "none",
    })
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn index<'v>(target: &'v Value, key: &Value) -> ConditionResult<&'v Value> {
    match (target, key) {
        (Value::Object(map), Value::String(k)) => {
            map.get(k).ok_or_else(|| ConditionError::MissingKey(k.clone()))
        }
        (Value::Array(items), Value::Number(n)) => {
            let i = n.as_i64().ok_or(ConditionError::TypeMismatch {
                op: "[]",
                left: "list",
                right: "number",
            })?;
            let len = items.len() as i64;
            let resolved = if i < 0 { len + i } else { i };
            if resolved < 0 || resolved >= len {
                return Err(ConditionError::IndexOutOfRange { index: i, len: items.len() });
            }
            Ok(&items[resolved as usize])
        }
        (target, key) => Err(ConditionError::TypeMismatch {
            op: "[]",
            left: type_name(target),
            right: type_name(key),
        }),
    }
}

fn negate(value: &Value) -> ConditionResult<Value> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if let Some(neg) = i.checked_neg() {
                    return Ok(Value::from(neg));
                }
            }
            float(-n.as_f64().unwrap_or_default())
        }
        other => Err(ConditionError::TypeMismatch {
            op: "-",
            left: type_name(other),
            right: "none",
        }),
    }
}

fn float(f: f64) -> ConditionResult<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or(ConditionError::NonFinite)
}

/// Equality that treats `1` and `1.0` as equal, recursively
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).map_or(false, |w| values_equal(v, w)))
        }
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> ConditionResult<Ordering> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y)),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };

    ordering.ok_or(ConditionError::TypeMismatch {
        op: op.symbol(),
        left: type_name(left),
        right: type_name(right),
    })
}

fn contains(op: BinaryOp, needle: &Value, haystack: &Value) -> ConditionResult<bool> {
    match (needle, haystack) {
        (_, Value::Array(items)) => Ok(items.iter().any(|item| values_equal(item, needle))),
        (Value::String(n), Value::String(h)) => Ok(h.contains(n.as_str())),
        (Value::String(k), Value::Object(map)) => Ok(map.contains_key(k)),
        _ => Err(ConditionError::TypeMismatch {
            op: op.symbol(),
            left: type_name(needle),
            right: type_name(haystack),
        }),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> ConditionResult<Value> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                let exact = match op {
                    BinaryOp::Add => x.checked_add(y),
                    BinaryOp::Sub => x.checked_sub(y),
                    BinaryOp::Mul => x.checked_mul(y),
                    BinaryOp::Rem => {
                        if y == 0 {
                            return Err(ConditionError::DivisionByZero);
                        }
                        // Result takes the sign of the divisor
                        x.checked_rem(y).map(|r| if r != 0 && (r < 0) != (y < 0) { r + y } else { r })
                    }
                    _ => None,
                };
                if let Some(value) = exact {
                    return Ok(Value::from(value));
                }
            }

            let x = a.as_f64().unwrap_or_default();
            let y = b.as_f64().unwrap_or_default();
            match op {
                BinaryOp::Div | BinaryOp::Rem if y == 0.0 => Err(ConditionError::DivisionByZero),
                BinaryOp::Add => float(x + y),
                BinaryOp::Sub => float(x - y),
                BinaryOp::Mul => float(x * y),
                BinaryOp::Div => float(x / y),
                BinaryOp::Rem => float(x - y * (x / y).floor()),
                _ => Err(ConditionError::TypeMismatch {
                    op: op.symbol(),
                    left: "number",
                    right: "number",
                }),
            }
        }
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (Value::Array(a), Value::Array(b)) if op == BinaryOp::Add => {
            Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }
        _ => Err(ConditionError::TypeMismatch {
            op: op.symbol(),
            left: type_name(left),
            right: type_name(right),
        }),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> ConditionResult<Value> {
    let result = match op {
        BinaryOp::Eq => Value::Bool(values_equal(left, right)),
        BinaryOp::NotEq => Value::Bool(!values_equal(left, right)),
        BinaryOp::Lt => Value::Bool(compare(op, left, right)? == Ordering::Less),
        BinaryOp::Le => Value::Bool(compare(op, left, right)? != Ordering::Greater),
        BinaryOp::Gt => Value::Bool(compare(op, left, right)? == Ordering::Greater),
        BinaryOp::Ge => Value::Bool(compare(op, left, right)? != Ordering::Less),
        BinaryOp::In => Value::Bool(contains(op, left, right)?),
        BinaryOp::NotIn => Value::Bool(!contains(op, left, right)?),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, left, right)?
        }
        BinaryOp::And => Value::Bool(is_truthy(left) && is_truthy(right)),
        BinaryOp::Or => Value::Bool(is_truthy(left) || is_truthy(right)),
    };
    Ok(result)
}
