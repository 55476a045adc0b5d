//! Conversions between [`DynamicValue`] and native host values.
//!
//! Typed access goes through [`FromDynamic`] and [`IntoDynamic`], which are
//! lossless for every plain value, infinities and NaN included. Plain data
//! also converts through `serde_json::Value`; that direction refuses custom
//! handles and non-finite numbers, which JSON cannot carry. Positional
//! argument checks go through [`Args`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::value::{CustomHandle, DynamicValue, ValueKind};

impl DynamicValue {
    /// Convert plain data into a JSON value.
    ///
    /// Fails with [`BridgeError::TypeMismatch`] when the value contains a
    /// custom handle or a non-finite number.
    pub fn to_json(&self) -> BridgeResult<serde_json::Value> {
        Ok(match self {
            DynamicValue::Nil => serde_json::Value::Null,
            DynamicValue::Bool(b) => serde_json::Value::Bool(*b),
            DynamicValue::Number(n) => match serde_json::Number::from_f64(*n) {
                Some(number) => serde_json::Value::Number(number),
                None => {
                    return Err(BridgeError::type_mismatch(
                        "value",
                        "finite number",
                        format!("number({n})"),
                    ))
                }
            },
            DynamicValue::String(s) => serde_json::Value::String(s.clone()),
            DynamicValue::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(DynamicValue::to_json)
                    .collect::<BridgeResult<_>>()?,
            ),
            DynamicValue::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<BridgeResult<_>>()?,
            ),
            DynamicValue::Custom(handle) => {
                return Err(BridgeError::type_mismatch(
                    "value",
                    "plain data",
                    format!("custom<{}>", handle.type_name()),
                ))
            }
        })
    }

    /// Convert a JSON value into a dynamic value.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DynamicValue::Nil,
            serde_json::Value::Bool(b) => DynamicValue::Bool(b),
            serde_json::Value::Number(n) => {
                n.as_f64().map_or(DynamicValue::Nil, DynamicValue::Number)
            }
            serde_json::Value::String(s) => DynamicValue::String(s),
            serde_json::Value::Array(items) => {
                DynamicValue::Array(items.into_iter().map(DynamicValue::from_json).collect())
            }
            serde_json::Value::Object(map) => DynamicValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, DynamicValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Wrap a host value with no data mapping as a custom handle.
    ///
    /// The handle is tagged with the Rust type name of `T`.
    pub fn from_native<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        DynamicValue::Custom(CustomHandle::new(std::any::type_name::<T>(), value))
    }

    /// Recover a host value previously wrapped with [`DynamicValue::from_native`].
    pub fn downcast_native<T>(&self) -> BridgeResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        expect_custom(self, std::any::type_name::<T>(), "value")
    }
}

/// Check that `value` has kind `want`.
///
/// Never panics; mismatches surface as [`BridgeError::TypeMismatch`].
pub fn expect_type<'a>(
    value: &'a DynamicValue,
    want: ValueKind,
    argument: &str,
) -> BridgeResult<&'a DynamicValue> {
    if value.kind() == want {
        Ok(value)
    } else {
        Err(BridgeError::type_mismatch(
            argument,
            want.as_str(),
            value.type_label(),
        ))
    }
}

/// Recover a custom host object tagged `type_name`.
pub fn expect_custom<T>(
    value: &DynamicValue,
    type_name: &str,
    argument: &str,
) -> BridgeResult<Arc<T>>
where
    T: Any + Send + Sync,
{
    let mismatch = || {
        BridgeError::type_mismatch(argument, format!("custom<{type_name}>"), value.type_label())
    };
    match value {
        DynamicValue::Custom(handle) if handle.type_name() == type_name => {
            handle.downcast::<T>().ok_or_else(mismatch)
        }
        _ => Err(mismatch()),
    }
}

/// Conversion from a dynamic value into a typed host value.
pub trait FromDynamic: Sized {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self>;
}

/// Conversion from a typed host value into a dynamic value.
pub trait IntoDynamic {
    fn into_dynamic(self) -> DynamicValue;
}

impl FromDynamic for DynamicValue {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        Ok(value.clone())
    }
}

impl FromDynamic for bool {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        value
            .as_bool()
            .ok_or_else(|| BridgeError::type_mismatch("value", "bool", value.type_label()))
    }
}

impl FromDynamic for f64 {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        value
            .as_f64()
            .ok_or_else(|| BridgeError::type_mismatch("value", "number", value.type_label()))
    }
}

impl FromDynamic for i64 {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value.as_f64() {
            Some(n) if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 => {
                Ok(n as i64)
            }
            Some(_) => Err(BridgeError::type_mismatch("value", "integer", "number")),
            None => Err(BridgeError::type_mismatch(
                "value",
                "integer",
                value.type_label(),
            )),
        }
    }
}

impl FromDynamic for String {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BridgeError::type_mismatch("value", "string", value.type_label()))
    }
}

impl<T: FromDynamic> FromDynamic for Option<T> {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_dynamic(value).map(Some)
        }
    }
}

impl<T: FromDynamic> FromDynamic for Vec<T> {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| BridgeError::type_mismatch("value", "array", value.type_label()))?;
        items.iter().map(T::from_dynamic).collect()
    }
}

impl<T: FromDynamic> FromDynamic for HashMap<String, T> {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| BridgeError::type_mismatch("value", "object", value.type_label()))?;
        map.iter()
            .map(|(k, v)| Ok((k.clone(), T::from_dynamic(v)?)))
            .collect()
    }
}

impl FromDynamic for serde_json::Value {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        value.to_json()
    }
}

macro_rules! into_dynamic_via_from {
    ($($ty:ty),*) => {
        $(
            impl IntoDynamic for $ty {
                fn into_dynamic(self) -> DynamicValue {
                    DynamicValue::from(self)
                }
            }
        )*
    };
}

into_dynamic_via_from!(bool, f64, f32, i32, i64, u32, u64, usize, String, &str, CustomHandle);

impl IntoDynamic for DynamicValue {
    fn into_dynamic(self) -> DynamicValue {
        self
    }
}

impl IntoDynamic for serde_json::Value {
    fn into_dynamic(self) -> DynamicValue {
        DynamicValue::from_json(self)
    }
}

impl<T: IntoDynamic> IntoDynamic for Option<T> {
    fn into_dynamic(self) -> DynamicValue {
        self.map_or(DynamicValue::Nil, IntoDynamic::into_dynamic)
    }
}

impl<T: IntoDynamic> IntoDynamic for Vec<T> {
    fn into_dynamic(self) -> DynamicValue {
        DynamicValue::Array(self.into_iter().map(IntoDynamic::into_dynamic).collect())
    }
}

impl<T: IntoDynamic> IntoDynamic for HashMap<String, T> {
    fn into_dynamic(self) -> DynamicValue {
        DynamicValue::Object(
            self.into_iter()
                .map(|(k, v)| (k, v.into_dynamic()))
                .collect(),
        )
    }
}

/// Positional view over a method's arguments.
///
/// Missing required arguments fail with [`BridgeError::InvalidArguments`];
/// present arguments of the wrong kind fail with [`BridgeError::TypeMismatch`].
/// Optional accessors treat `Nil` as absent.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    method: &'a str,
    values: &'a [DynamicValue],
}

impl<'a> Args<'a> {
    pub fn new(method: &'a str, values: &'a [DynamicValue]) -> Self {
        Self { method, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Require at least `count` arguments.
    pub fn require(&self, count: usize) -> BridgeResult<()> {
        if self.values.len() < count {
            return Err(BridgeError::invalid_arguments(
                self.method,
                format!(
                    "requires at least {count} argument(s), got {}",
                    self.values.len()
                ),
            ));
        }
        Ok(())
    }

    /// Argument at `position`, if present and not nil.
    pub fn get(&self, position: usize) -> Option<&'a DynamicValue> {
        self.values.get(position).filter(|v| !v.is_nil())
    }

    fn required(&self, position: usize, name: &str) -> BridgeResult<&'a DynamicValue> {
        self.values.get(position).ok_or_else(|| {
            BridgeError::invalid_arguments(self.method, format!("missing argument `{name}`"))
        })
    }

    fn typed<T>(
        &self,
        value: &'a DynamicValue,
        position: usize,
        name: &str,
        want: ValueKind,
        pick: impl FnOnce(&'a DynamicValue) -> Option<T>,
    ) -> BridgeResult<T> {
        pick(value).ok_or_else(|| {
            BridgeError::type_mismatch(
                format!("argument {} (`{name}`) of {}", position + 1, self.method),
                want.as_str(),
                value.type_label(),
            )
        })
    }

    pub fn string(&self, position: usize, name: &str) -> BridgeResult<&'a str> {
        let value = self.required(position, name)?;
        self.typed(value, position, name, ValueKind::String, DynamicValue::as_str)
    }

    pub fn number(&self, position: usize, name: &str) -> BridgeResult<f64> {
        let value = self.required(position, name)?;
        self.typed(value, position, name, ValueKind::Number, DynamicValue::as_f64)
    }

    pub fn boolean(&self, position: usize, name: &str) -> BridgeResult<bool> {
        let value = self.required(position, name)?;
        self.typed(value, position, name, ValueKind::Bool, DynamicValue::as_bool)
    }

    pub fn array(&self, position: usize, name: &str) -> BridgeResult<&'a [DynamicValue]> {
        let value = self.required(position, name)?;
        self.typed(value, position, name, ValueKind::Array, DynamicValue::as_array)
    }

    pub fn object(
        &self,
        position: usize,
        name: &str,
    ) -> BridgeResult<&'a HashMap<String, DynamicValue>> {
        let value = self.required(position, name)?;
        self.typed(value, position, name, ValueKind::Object, DynamicValue::as_object)
    }

    pub fn optional_string(&self, position: usize, name: &str) -> BridgeResult<Option<&'a str>> {
        self.get(position)
            .map(|v| self.typed(v, position, name, ValueKind::String, DynamicValue::as_str))
            .transpose()
    }

    pub fn optional_array(
        &self,
        position: usize,
        name: &str,
    ) -> BridgeResult<Option<&'a [DynamicValue]>> {
        self.get(position)
            .map(|v| self.typed(v, position, name, ValueKind::Array, DynamicValue::as_array))
            .transpose()
    }

    pub fn optional_object(
        &self,
        position: usize,
        name: &str,
    ) -> BridgeResult<Option<&'a HashMap<String, DynamicValue>>> {
        self.get(position)
            .map(|v| self.typed(v, position, name, ValueKind::Object, DynamicValue::as_object))
            .transpose()
    }
}
