//! Dynamic values exchanged between scripts and bridges.
//!
//! A [`DynamicValue`] is the only data shape that crosses the script/host
//! boundary. Plain data (nil, booleans, numbers, strings, arrays, objects)
//! is owned and copied freely; host objects travel as [`CustomHandle`]s,
//! an opaque reference tagged with a type name.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The kind of a [`DynamicValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Nil,
    Bool,
    Number,
    String,
    Array,
    Object,
    Custom,
}

impl ValueKind {
    /// Convert the kind to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a host object.
///
/// Cloning a handle shares the underlying object; two handles are equal only
/// when they carry the same type name and point at the same object.
#[derive(Clone)]
pub struct CustomHandle {
    type_name: String,
    handle: Arc<dyn Any + Send + Sync>,
}

impl CustomHandle {
    /// Wrap a host object under the given type name.
    pub fn new<T>(type_name: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::from_arc(type_name, Arc::new(value))
    }

    /// Wrap an already shared host object.
    pub fn from_arc<T>(type_name: impl Into<String>, value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            type_name: type_name.into(),
            handle: value,
        }
    }

    /// The type name the handle was tagged with.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Recover the host object if it has type `T`.
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        Arc::clone(&self.handle).downcast::<T>().ok()
    }

    /// Returns true if both handles point at the same host object.
    pub fn same_object(&self, other: &CustomHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.handle) as *const (),
            Arc::as_ptr(&other.handle) as *const (),
        )
    }
}

impl PartialEq for CustomHandle {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.same_object(other)
    }
}

impl fmt::Debug for CustomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomHandle")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A value that can cross the script/host boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DynamicValue {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<DynamicValue>),
    Object(HashMap<String, DynamicValue>),
    Custom(CustomHandle),
}

impl DynamicValue {
    /// Build an object from key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DynamicValue)>,
    {
        DynamicValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build an array from values.
    pub fn array<I>(values: I) -> Self
    where
        I: IntoIterator<Item = DynamicValue>,
    {
        DynamicValue::Array(values.into_iter().collect())
    }

    /// Wrap a host object as a custom value.
    pub fn custom<T>(type_name: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        DynamicValue::Custom(CustomHandle::new(type_name, value))
    }

    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            DynamicValue::Nil => ValueKind::Nil,
            DynamicValue::Bool(_) => ValueKind::Bool,
            DynamicValue::Number(_) => ValueKind::Number,
            DynamicValue::String(_) => ValueKind::String,
            DynamicValue::Array(_) => ValueKind::Array,
            DynamicValue::Object(_) => ValueKind::Object,
            DynamicValue::Custom(_) => ValueKind::Custom,
        }
    }

    /// Describe the value's type for error messages.
    ///
    /// Custom values include their type tag, e.g. `custom<logger>`.
    pub fn type_label(&self) -> String {
        match self {
            DynamicValue::Custom(handle) => format!("custom<{}>", handle.type_name()),
            other => other.kind().as_str().to_string(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, DynamicValue::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynamicValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DynamicValue]> {
        match self {
            DynamicValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, DynamicValue>> {
        match self {
            DynamicValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomHandle> {
        match self {
            DynamicValue::Custom(handle) => Some(handle),
            _ => None,
        }
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicValue::Nil => f.write_str("nil"),
            DynamicValue::Bool(b) => write!(f, "{b}"),
            DynamicValue::Number(n) => write!(f, "{n}"),
            DynamicValue::String(s) => f.write_str(s),
            DynamicValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            DynamicValue::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {}", map[key])?;
                }
                f.write_str("}")
            }
            DynamicValue::Custom(handle) => write!(f, "<custom:{}>", handle.type_name()),
        }
    }
}

impl From<bool> for DynamicValue {
    fn from(value: bool) -> Self {
        DynamicValue::Bool(value)
    }
}

macro_rules! from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for DynamicValue {
                fn from(value: $ty) -> Self {
                    DynamicValue::Number(value as f64)
                }
            }
        )*
    };
}

from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<&str> for DynamicValue {
    fn from(value: &str) -> Self {
        DynamicValue::String(value.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(value: String) -> Self {
        DynamicValue::String(value)
    }
}

impl From<Vec<DynamicValue>> for DynamicValue {
    fn from(value: Vec<DynamicValue>) -> Self {
        DynamicValue::Array(value)
    }
}

impl From<HashMap<String, DynamicValue>> for DynamicValue {
    fn from(value: HashMap<String, DynamicValue>) -> Self {
        DynamicValue::Object(value)
    }
}

impl From<CustomHandle> for DynamicValue {
    fn from(value: CustomHandle) -> Self {
        DynamicValue::Custom(value)
    }
}

impl<T: Into<DynamicValue>> From<Option<T>> for DynamicValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(DynamicValue::Nil, Into::into)
    }
}
