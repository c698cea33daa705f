//! Dynamic field values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A field value as seen through a [`ReactiveProxy`](super::ReactiveProxy).
///
/// `PartialEq` is structural, so comparing two values is a deep comparison.
/// Note that `Float(NAN) != Float(NAN)`, so writing NaN over NaN always counts
/// as a change.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Name of the variant, used in type mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, or ints widened to float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Str,
    &str => Str,
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// A value could not be converted to the requested Rust type.
///
/// Carries the rejected value back so the caller can report it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionError {
    pub expected: &'static str,
    pub value: Value,
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {}, found {}",
            self.expected,
            self.value.type_name()
        )
    }
}

impl std::error::Error for ConversionError {}

macro_rules! impl_try_from {
    ($($ty:ty => $name:literal, |$v:ident| $convert:expr);* $(;)?) => {
        $(
            impl TryFrom<Value> for $ty {
                type Error = ConversionError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    let converted: Option<$ty> = {
                        let $v = &value;
                        $convert
                    };
                    converted.ok_or(ConversionError {
                        expected: $name,
                        value,
                    })
                }
            }
        )*
    };
}

impl_try_from! {
    bool => "bool", |v| v.as_bool();
    i64 => "int", |v| v.as_int();
    i32 => "int", |v| v.as_int().and_then(|i| i32::try_from(i).ok());
    u32 => "int", |v| v.as_int().and_then(|i| u32::try_from(i).ok());
    u64 => "int", |v| v.as_int().and_then(|i| u64::try_from(i).ok());
    usize => "int", |v| v.as_int().and_then(|i| usize::try_from(i).ok());
    f64 => "float", |v| v.as_float();
    String => "string", |v| v.as_str().map(str::to_owned);
}

impl TryFrom<Value> for Vec<Value> {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::List(items) => Ok(items),
            other => Err(ConversionError {
                expected: "list",
                value: other,
            }),
        }
    }
}
