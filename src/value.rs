//! Dynamic values stored in the state tree.
//!
//! Every coercion the expression language performs goes through one of the
//! functions here; none of them guesses. Text never silently becomes a number
//! and null never becomes zero.

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

/// Arithmetic operators shared by the binary and compound-assignment forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    /// Textual form: null is empty, numbers use their canonical decimal form.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Text(s) => Cow::Borrowed(s),
            Value::Int(n) => Cow::Owned(n.to_string()),
            Value::Float(f) => Cow::Owned(f.to_string()),
        }
    }

    /// Numeric form as a float, for comparisons.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Int(n) => Ok(*n as f64),
            Value::Float(f) => Ok(*f),
            other => Err(Error::type_error(format!("expected a number, found {}", other.kind()))),
        }
    }

    /// Truthiness: null is false, numbers are true when positive, text is an error.
    pub fn truthy(&self) -> Result<bool> {
        match self {
            Value::Null => Ok(false),
            Value::Int(n) => Ok(*n > 0),
            Value::Float(f) => Ok(*f > 0.0),
            Value::Text(_) => Err(Error::type_error("text has no truth value")),
        }
    }

    /// Null-safe equality: null equals only null, numbers compare numerically
    /// across int/float, text compares by content, mixed kinds are unequal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }

    /// `+`: numbers add, anything else concatenates the textual forms.
    pub fn plus(&self, other: &Value) -> Result<Value> {
        if self.is_number() && other.is_number() {
            return self.arith(Arith::Add, other);
        }
        let mut text = self.as_text().into_owned();
        text.push_str(&other.as_text());
        Ok(Value::Text(text))
    }

    pub(crate) fn arith(&self, op: Arith, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                float_arith(op, self.as_f64()?, other.as_f64()?)
            }
            (a, b) => Err(Error::type_error(format!(
                "cannot apply `{}` to {} and {}",
                op.symbol(),
                a.kind(),
                b.kind()
            ))),
        }
    }

    /// Unary minus.
    pub fn negate(&self) -> Result<Value> {
        match self {
            Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| Error::arithmetic("integer overflow")),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(Error::type_error(format!("cannot negate {}", other.kind()))),
        }
    }

    /// Text with its first character uppercased.
    pub fn capitalized(&self) -> Value {
        let text = self.as_text();
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => Value::Text(first.to_uppercase().chain(chars).collect()),
            None => Value::Text(String::new()),
        }
    }

    pub(crate) fn from_bool(b: bool) -> Value {
        Value::Int(b as i64)
    }
}

impl Arith {
    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Div => "/",
        }
    }
}

fn int_arith(op: Arith, a: i64, b: i64) -> Result<Value> {
    let result = match op {
        Arith::Add => a.checked_add(b),
        Arith::Sub => a.checked_sub(b),
        Arith::Mul => a.checked_mul(b),
        Arith::Div => {
            if b == 0 {
                return Err(Error::arithmetic("division by zero"));
            }
            a.checked_div(b)
        }
    };
    result.map(Value::Int).ok_or_else(|| Error::arithmetic("integer overflow"))
}

fn float_arith(op: Arith, a: f64, b: f64) -> Result<Value> {
    let result = match op {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div => {
            if b == 0.0 {
                return Err(Error::arithmetic("division by zero"));
            }
            a / b
        }
    };
    Ok(Value::Float(result))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
