#![forbid(unsafe_code)]

//! Value conversion: user converters and automatic type coercion.
//!
//! A [`ValueConverter`] may implement either direction. A direction it leaves
//! out returns `None`, and the accessor falls back to [`coerce`] when
//! auto-conversion is enabled.
//!
//! # Coercion table
//!
//! | From \ To | bool | int | float | string |
//! |-----------|------|-----|-------|--------|
//! | bool | = | 0/1 | 0.0/1.0 | `"true"`/`"false"` |
//! | int | `!= 0` | = | exact | decimal |
//! | float | `!= 0.0` | rounded | = | culture format |
//! | string | `true`/`false` | integer text | culture parse | = |
//!
//! `Null` becomes the default of non-nullable types. Sentinels and event
//! handles pass through untouched.

use std::fmt;
use std::rc::Rc;

use fbind_core::{BindError, Result, Value, ValueType};

use crate::config::DataContext;
use crate::culture::Culture;

/// Arguments of one conversion call.
#[derive(Clone, Copy)]
pub struct ConversionRequest<'a> {
    /// Type the result should have.
    pub target_type: ValueType,
    pub parameter: &'a Value,
    pub culture: &'a Culture,
    pub context: &'a DataContext,
}

impl fmt::Debug for ConversionRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("target_type", &self.target_type)
            .field("parameter", self.parameter)
            .field("culture", self.culture)
            .finish_non_exhaustive()
    }
}

/// User-supplied two-way value converter.
///
/// Returning `None` means the direction is not implemented. A converter may
/// return [`Value::DoNothing`] to suppress a write or [`Value::Unset`] to
/// request the fallback value.
pub trait ValueConverter {
    /// Source to target.
    fn convert(&self, value: &Value, request: &ConversionRequest<'_>) -> Option<Result<Value>> {
        let _ = (value, request);
        None
    }

    /// Target to source.
    fn convert_back(
        &self,
        value: &Value,
        request: &ConversionRequest<'_>,
    ) -> Option<Result<Value>> {
        let _ = (value, request);
        None
    }
}

type ConvertFn = Box<dyn Fn(&Value, &ConversionRequest<'_>) -> Result<Value>>;

/// Closure-backed [`ValueConverter`].
#[derive(Default)]
pub struct FnConverter {
    convert: Option<ConvertFn>,
    convert_back: Option<ConvertFn>,
}

impl FnConverter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_convert(
        mut self,
        convert: impl Fn(&Value, &ConversionRequest<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.convert = Some(Box::new(convert));
        self
    }

    #[must_use]
    pub fn with_convert_back(
        mut self,
        convert_back: impl Fn(&Value, &ConversionRequest<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.convert_back = Some(Box::new(convert_back));
        self
    }

    #[must_use]
    pub fn into_rc(self) -> Rc<dyn ValueConverter> {
        Rc::new(self)
    }
}

impl ValueConverter for FnConverter {
    fn convert(&self, value: &Value, request: &ConversionRequest<'_>) -> Option<Result<Value>> {
        self.convert.as_ref().map(|f| f(value, request))
    }

    fn convert_back(
        &self,
        value: &Value,
        request: &ConversionRequest<'_>,
    ) -> Option<Result<Value>> {
        self.convert_back.as_ref().map(|f| f(value, request))
    }
}

impl fmt::Debug for FnConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConverter")
            .field("convert", &self.convert.is_some())
            .field("convert_back", &self.convert_back.is_some())
            .finish()
    }
}

/// Coerce `value` to `target`.
///
/// # Errors
///
/// [`BindError::ValueConversionError`] when no lossless-enough conversion
/// exists (unparsable text, non-finite floats into integers, non-objects into
/// object slots).
pub fn coerce(value: Value, target: ValueType, culture: &Culture) -> Result<Value> {
    if value.is_sentinel() || matches!(value, Value::Member(_)) || target.accepts(&value) {
        return Ok(value);
    }
    if value.is_null() {
        return Ok(target.default_value());
    }
    match target {
        ValueType::Bool => to_bool(&value),
        ValueType::Int => to_int(&value, culture),
        ValueType::Float => to_float(&value, culture),
        ValueType::Str => to_str(&value, culture),
        ValueType::Object => Err(BindError::conversion(&value, target, "not an object")),
        ValueType::Command => Err(BindError::conversion(&value, target, "not a command")),
        ValueType::Any => Ok(value),
    }
}

fn to_bool(value: &Value) -> Result<Value> {
    let result = match value {
        Value::Int(n) => Some(*n != 0),
        Value::Float(x) => Some(*x != 0.0),
        Value::Str(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Some(true)
            } else if s.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    };
    result
        .map(Value::Bool)
        .ok_or_else(|| BindError::conversion(value, ValueType::Bool, "not a boolean"))
}

fn to_int(value: &Value, culture: &Culture) -> Result<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) => float_to_int(*x)
            .map(Value::Int)
            .ok_or_else(|| BindError::conversion(value, ValueType::Int, "out of range")),
        Value::Str(s) => {
            let text = s.trim();
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::Int(n));
            }
            match culture.parse_float(text) {
                Some(x) if x.fract() == 0.0 => float_to_int(x)
                    .map(Value::Int)
                    .ok_or_else(|| BindError::conversion(value, ValueType::Int, "out of range")),
                Some(_) => Err(BindError::conversion(value, ValueType::Int, "not an integer")),
                None => Err(BindError::conversion(value, ValueType::Int, "not a number")),
            }
        }
        _ => Err(BindError::conversion(value, ValueType::Int, "not a number")),
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn float_to_int(x: f64) -> Option<i64> {
    let rounded = x.round();
    (rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64)
        .then_some(rounded as i64)
}

#[allow(clippy::cast_precision_loss)]
fn to_float(value: &Value, culture: &Culture) -> Result<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Str(s) => culture
            .parse_float(s)
            .map(Value::Float)
            .ok_or_else(|| BindError::conversion(value, ValueType::Float, "not a number")),
        _ => Err(BindError::conversion(value, ValueType::Float, "not a number")),
    }
}

fn to_str(value: &Value, culture: &Culture) -> Result<Value> {
    match value {
        Value::Bool(b) => Ok(Value::from(b.to_string())),
        Value::Int(n) => Ok(Value::from(n.to_string())),
        Value::Float(x) => Ok(Value::from(culture.format_float(*x))),
        _ => Err(BindError::conversion(
            value,
            ValueType::Str,
            "no string form",
        )),
    }
}
