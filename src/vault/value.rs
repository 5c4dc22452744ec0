//! Tagged configuration values.
//!
//! Every stored value carries its `ValueType` so a read through the wrong
//! typed accessor fails with `TypeMismatch` instead of coercing.

use std::fmt;

use crate::errors::{Result, VaultError};

/// Persistent type tag of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    String,
}

impl ValueType {
    /// The one-byte tag written to the payload.
    pub fn tag(self) -> u8 {
        match self {
            Self::Boolean => 0x01,
            Self::Integer => 0x02,
            Self::Float => 0x03,
            Self::String => 0x04,
        }
    }

    /// Inverse of `tag`.  Unknown bytes return `None`.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::Boolean),
            0x02 => Some(Self::Integer),
            0x03 => Some(Self::Float),
            0x04 => Some(Self::String),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
        };
        f.write_str(name)
    }
}

/// A configuration value.
///
/// Floats compare by bit pattern so that every value equals its own
/// decoded form, `NaN` included.
#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::Float(_) => ValueType::Float,
            Self::String(_) => ValueType::String,
        }
    }

    /// Fail with `TypeMismatch` unless this value is tagged `expected`.
    pub fn expect_type(&self, expected: ValueType) -> Result<()> {
        let found = self.value_type();
        if found == expected {
            Ok(())
        } else {
            Err(VaultError::TypeMismatch { expected, found })
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// A Rust type that maps onto exactly one `ValueType`.
pub trait Primitive: Sized {
    const TYPE: ValueType;

    /// Unwrap a value of the matching variant.
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! primitive {
    ($ty:ty, $variant:ident) => {
        impl Primitive for $ty {
            const TYPE: ValueType = ValueType::$variant;

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(VaultError::TypeMismatch {
                        expected: Self::TYPE,
                        found: other.value_type(),
                    }),
                }
            }
        }
    };
}

primitive!(bool, Boolean);
primitive!(i64, Integer);
primitive!(f64, Float);
primitive!(String, String);
