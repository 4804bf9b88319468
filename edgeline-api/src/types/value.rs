//! The tagged value type carried between drivers, the dispatcher and
//! the event publisher.
//!
//! Drivers produce and accept [`Value`]s; the variant must always
//! match the [`PropertyType`] declared by the profile resource the
//! value belongs to. The `Binary` variant owns its byte buffer, and
//! ownership transfers to the event publisher which serializes it as
//! base64.

use crate::types::Error;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_derive::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

/// The primitive types a profile resource can declare. The serialized
/// spellings ("Uint16", "Float32", ...) are the ones used in profile
/// files and in reading `valueType` fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Bool,
    String,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Binary,
}

impl PropertyType {
    /// True for the integer and floating point types.
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            PropertyType::Bool | PropertyType::String | PropertyType::Binary
        )
    }

    /// True for the integer types.
    pub fn is_integer(&self) -> bool {
        self.is_numeric()
            && !matches!(self, PropertyType::Float32 | PropertyType::Float64)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::Bool => "Bool",
            PropertyType::String => "String",
            PropertyType::Uint8 => "Uint8",
            PropertyType::Uint16 => "Uint16",
            PropertyType::Uint32 => "Uint32",
            PropertyType::Uint64 => "Uint64",
            PropertyType::Int8 => "Int8",
            PropertyType::Int16 => "Int16",
            PropertyType::Int32 => "Int32",
            PropertyType::Int64 => "Int64",
            PropertyType::Float32 => "Float32",
            PropertyType::Float64 => "Float64",
            PropertyType::Binary => "Binary",
        };
        write!(f, "{}", name)
    }
}

/// A typed device value. One variant per [`PropertyType`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Str(String),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Binary(Vec<u8>),
}

impl Value {
    /// The property type this value satisfies.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Value::Bool(_) => PropertyType::Bool,
            Value::Str(_) => PropertyType::String,
            Value::U8(_) => PropertyType::Uint8,
            Value::U16(_) => PropertyType::Uint16,
            Value::U32(_) => PropertyType::Uint32,
            Value::U64(_) => PropertyType::Uint64,
            Value::I8(_) => PropertyType::Int8,
            Value::I16(_) => PropertyType::Int16,
            Value::I32(_) => PropertyType::Int32,
            Value::I64(_) => PropertyType::Int64,
            Value::F32(_) => PropertyType::Float32,
            Value::F64(_) => PropertyType::Float64,
            Value::Binary(_) => PropertyType::Binary,
        }
    }

    /// Widens any numeric value to `f64` for transform arithmetic.
    /// Returns `None` for `Bool`, `Str` and `Binary`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::U8(v) => Some(f64::from(*v)),
            Value::U16(v) => Some(f64::from(*v)),
            Value::U32(v) => Some(f64::from(*v)),
            Value::U64(v) => Some(*v as f64),
            Value::I8(v) => Some(f64::from(*v)),
            Value::I16(v) => Some(f64::from(*v)),
            Value::I32(v) => Some(f64::from(*v)),
            Value::I64(v) => Some(*v as f64),
            Value::F32(v) => Some(f64::from(*v)),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens any integer value to `u64` bits for mask arithmetic.
    pub fn as_bits(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(u64::from(*v)),
            Value::U16(v) => Some(u64::from(*v)),
            Value::U32(v) => Some(u64::from(*v)),
            Value::U64(v) => Some(*v),
            Value::I8(v) => Some(*v as u64),
            Value::I16(v) => Some(*v as u64),
            Value::I32(v) => Some(*v as u64),
            Value::I64(v) => Some(*v as u64),
            _ => None,
        }
    }

    /// Narrows a finite `f64` back into the given numeric property
    /// type, failing when the value doesn't fit.
    pub fn from_f64(ty: PropertyType, v: f64) -> Result<Value, Error> {
        fn narrow<T>(v: f64) -> Result<T, Error>
        where
            T: TryFrom<i64>,
        {
            let rounded = v.round();

            if rounded >= (i64::MIN as f64) && rounded <= (i64::MAX as f64) {
                if let Ok(n) = T::try_from(rounded as i64) {
                    return Ok(n);
                }
            }
            Err(Error::TypeMismatch(format!("{} out of range", v)))
        }

        if !v.is_finite() {
            return Err(Error::TypeMismatch(format!(
                "{} is not a finite value",
                v
            )));
        }

        match ty {
            PropertyType::Uint8 => narrow(v).map(Value::U8),
            PropertyType::Uint16 => narrow(v).map(Value::U16),
            PropertyType::Uint32 => narrow(v).map(Value::U32),
            PropertyType::Uint64 => {
                let rounded = v.round();

                if rounded >= 0.0 && rounded <= (u64::MAX as f64) {
                    Ok(Value::U64(rounded as u64))
                } else {
                    Err(Error::TypeMismatch(format!("{} out of range", v)))
                }
            }
            PropertyType::Int8 => narrow(v).map(Value::I8),
            PropertyType::Int16 => narrow(v).map(Value::I16),
            PropertyType::Int32 => narrow(v).map(Value::I32),
            PropertyType::Int64 => narrow(v).map(Value::I64),
            PropertyType::Float32 => Ok(Value::F32(v as f32)),
            PropertyType::Float64 => Ok(Value::F64(v)),
            _ => Err(Error::TypeMismatch(format!(
                "{} is not a numeric type",
                ty
            ))),
        }
    }

    /// Builds a value of the declared type from a JSON body entry.
    /// Numbers are accepted for the numeric types, and the platform's
    /// convention of quoting values in PUT bodies is honored by
    /// parsing strings as a fallback.
    pub fn from_json(
        ty: PropertyType,
        v: &serde_json::Value,
    ) -> Result<Value, Error> {
        let mismatch =
            || Error::TypeMismatch(format!("{} does not match {}", v, ty));

        match ty {
            PropertyType::Bool => match v {
                serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
                serde_json::Value::String(s) => {
                    s.parse().map(Value::Bool).map_err(|_| mismatch())
                }
                _ => Err(mismatch()),
            },
            PropertyType::String => match v {
                serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
                _ => Err(mismatch()),
            },
            PropertyType::Binary => match v {
                serde_json::Value::String(s) => STANDARD
                    .decode(s)
                    .map(Value::Binary)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            _ => {
                let num = match v {
                    serde_json::Value::Number(n) => {
                        n.as_f64().ok_or_else(mismatch)?
                    }
                    serde_json::Value::String(s) => {
                        s.parse::<f64>().map_err(|_| mismatch())?
                    }
                    _ => return Err(mismatch()),
                };

                Value::from_f64(ty, num)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Binary(v) => write!(f, "{}", STANDARD.encode(v)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::Bool(v) = value {
            Ok(v)
        } else {
            Err(Error::TypeMismatch("can't convert to boolean".into()))
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::Str(v) = value {
            Ok(v)
        } else {
            Err(Error::TypeMismatch("can't convert to string".into()))
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::Binary(v) = value {
            Ok(v)
        } else {
            Err(Error::TypeMismatch("can't convert to binary".into()))
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

macro_rules! numeric_value_conv {
    ($t:ty, $variant:ident) => {
        impl TryFrom<Value> for $t {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                if let Value::$variant(v) = value {
                    Ok(v)
                } else {
                    Err(Error::TypeMismatch(format!(
                        "can't convert to {}",
                        stringify!($t)
                    )))
                }
            }
        }

        impl From<$t> for Value {
            fn from(value: $t) -> Self {
                Value::$variant(value)
            }
        }
    };
}

numeric_value_conv!(u8, U8);
numeric_value_conv!(u16, U16);
numeric_value_conv!(u32, U32);
numeric_value_conv!(u64, U64);
numeric_value_conv!(i8, I8);
numeric_value_conv!(i16, I16);
numeric_value_conv!(i32, I32);
numeric_value_conv!(i64, I64);
numeric_value_conv!(f32, F32);
numeric_value_conv!(f64, F64);
