//! Driver values exchanged with the backend.
use chrono::{DateTime, FixedOffset};

/// A value bound as a statement parameter or decoded from a row.
///
/// Integer columns of any width decode to [`Value::Int`]; the two float
/// widths stay separate so their text encodings round-trip. Geometric types
/// decode to [`Value::Floats`], the flat list of coordinates. Types the
/// registry has no native kind for decode to [`Value::Bytes`] verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float4(f32),
    Float8(f64),
    Bytes(Vec<u8>),
    Text(String),
    Timestamp(DateTime<FixedOffset>),
    Floats(Vec<f64>),
    Array(Array),
}

/// A homogeneous one-dimensional array value.
///
/// The variant is selected by the native kind of the element OID; element
/// types without a kind land in [`Array::Bytes`].
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Bool(Vec<bool>),
    Int2(Vec<i16>),
    Int4(Vec<i32>),
    Int8(Vec<i64>),
    Float4(Vec<f32>),
    Float8(Vec<f64>),
    Text(Vec<String>),
    Timestamp(Vec<DateTime<FixedOffset>>),
    Bytes(Vec<Vec<u8>>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, for diagnostics.
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float4(_) => "float4",
            Value::Float8(_) => "float8",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Floats(_) => "floats",
            Value::Array(_) => "array",
        }
    }
}

impl Array {
    /// Number of elements in the array.
    pub fn len(&self) -> usize {
        match self {
            Array::Bool(v) => v.len(),
            Array::Int2(v) => v.len(),
            Array::Int4(v) => v.len(),
            Array::Int8(v) => v.len(),
            Array::Float4(v) => v.len(),
            Array::Float8(v) => v.len(),
            Array::Text(v) => v.len(),
            Array::Timestamp(v) => v.len(),
            Array::Bytes(v) => v.len(),
        }
    }

    /// Returns `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Value {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

from!(<bool>v => Value::Bool(v));
from!(<i16>v => Value::Int(v.into()));
from!(<i32>v => Value::Int(v.into()));
from!(<i64>v => Value::Int(v));
from!(<f32>v => Value::Float4(v));
from!(<f64>v => Value::Float8(v));
from!(<&str>v => Value::Text(v.into()));
from!(<String>v => Value::Text(v));
from!(<Vec<u8>>v => Value::Bytes(v));
from!(<DateTime<FixedOffset>>v => Value::Timestamp(v));
from!(<Array>v => Value::Array(v));

impl<V> From<Option<V>> for Value
where
    V: Into<Value>,
{
    fn from(v: Option<V>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
