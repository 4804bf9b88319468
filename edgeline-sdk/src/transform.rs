//! Value transforms declared by profile resources.
//!
//! Reads apply the forward direction (mask, base, scale, offset);
//! writes apply the inverse (offset, scale, base, mask). Inverse then
//! forward on the same numeric returns the original value, except for
//! the truncation a mask imposes.

use edgeline_api::{
    types::{
        profile::PropertyValue,
        value::{PropertyType, Value},
    },
    Error, Result,
};

/// The float type an integer reading is promoted to when a transform
/// produces a fractional result: `Float32` for widths up to 32 bits,
/// `Float64` beyond.
fn promotion(ty: PropertyType) -> PropertyType {
    match ty {
        PropertyType::Uint64 | PropertyType::Int64 => PropertyType::Float64,
        _ => PropertyType::Float32,
    }
}

/// True when applying the parameters to an integer can produce a
/// fractional value.
fn fractional(props: &PropertyValue) -> bool {
    props.scale.map(|v| v.fract() != 0.0).unwrap_or(false)
        || props.offset.map(|v| v.fract() != 0.0).unwrap_or(false)
        || props.base.map(|v| v.fract() != 0.0).unwrap_or(false)
}

/// Rebuilds an integer value of the given type from masked bits.
fn int_from_bits(ty: PropertyType, bits: u64) -> Result<Value> {
    match ty {
        PropertyType::Uint8 => Ok(Value::U8(bits as u8)),
        PropertyType::Uint16 => Ok(Value::U16(bits as u16)),
        PropertyType::Uint32 => Ok(Value::U32(bits as u32)),
        PropertyType::Uint64 => Ok(Value::U64(bits)),
        PropertyType::Int8 => Ok(Value::I8(bits as u8 as i8)),
        PropertyType::Int16 => Ok(Value::I16(bits as u16 as i16)),
        PropertyType::Int32 => Ok(Value::I32(bits as u32 as i32)),
        PropertyType::Int64 => Ok(Value::I64(bits as i64)),
        _ => Err(Error::TypeMismatch(format!("{} is not an integer", ty))),
    }
}

/// Applies the read-direction transform to a driver result. Non-
/// numeric values pass through untouched.
pub fn forward(value: Value, props: &PropertyValue) -> Result<Value> {
    let ty = value.property_type();

    if !ty.is_numeric() || !props.has_transform() {
        return Ok(value);
    }

    let overflow = |v: f64| {
        Error::OperationError(format!("transform overflow: {} as {}", v, ty))
    };

    // Masking only applies to the integer types.

    let value = match (props.mask, value.as_bits()) {
        (Some(mask), Some(bits)) if ty.is_integer() => {
            int_from_bits(ty, bits & mask)?
        }
        _ => value,
    };

    let mut v = value.as_f64().unwrap();

    if let Some(base) = props.base {
        v = base.powf(v);
    }
    if let Some(scale) = props.scale {
        v *= scale;
    }
    if let Some(offset) = props.offset {
        v += offset;
    }

    if !v.is_finite() {
        return Err(overflow(v));
    }

    let out_ty = if ty.is_integer() && fractional(props) {
        promotion(ty)
    } else {
        ty
    };

    Value::from_f64(out_ty, v).map_err(|_| overflow(v))
}

/// Applies the write-direction transform to a parsed parameter,
/// yielding the raw value handed to the driver.
pub fn inverse(value: Value, props: &PropertyValue) -> Result<Value> {
    let ty = value.property_type();

    if !ty.is_numeric() || !props.has_transform() {
        return Ok(value);
    }

    let bad = |detail: &str| {
        Error::TypeMismatch(format!("can't invert transform: {}", detail))
    };

    let mut v = value.as_f64().unwrap();

    if let Some(offset) = props.offset {
        v -= offset;
    }
    if let Some(scale) = props.scale {
        if scale == 0.0 {
            return Err(bad("scale is zero"));
        }
        v /= scale;
    }
    if let Some(base) = props.base {
        if base <= 0.0 || base == 1.0 || v <= 0.0 {
            return Err(bad("value out of the base's range"));
        }
        v = v.ln() / base.ln();
    }

    // A fractional transform reports as float; the raw side keeps the
    // resource's declared integer type.

    let raw_ty = if ty == PropertyType::Float32 || ty == PropertyType::Float64
    {
        props.value_type.unwrap_or(ty)
    } else {
        ty
    };

    let value = Value::from_f64(raw_ty, v)?;

    match (props.mask, value.as_bits()) {
        (Some(mask), Some(bits)) if raw_ty.is_integer() => {
            int_from_bits(raw_ty, bits & mask)
        }
        _ => Ok(value),
    }
}

/// Checks a transformed reading against the resource's declared
/// minimum/maximum. Out-of-range readings are treated as not valid.
pub fn in_range(value: &Value, props: &PropertyValue) -> bool {
    let v = match value.as_f64() {
        Some(v) => v,
        None => return true,
    };

    if let Some(min) = props.minimum {
        if v < min {
            return false;
        }
    }
    if let Some(max) = props.maximum {
        if v > max {
            return false;
        }
    }
    true
}
