//! Values of the in-memory script context.

use std::fmt;

/// Opaque handle referencing an object on a context's heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHandle(pub(crate) u32);

impl ObjectHandle {
    /// Index of the object on its heap.
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// A script value.
///
/// Objects (functions included) are referenced by handle, so two values are
/// the same object exactly when their handles are equal.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string.
    String(String),
    /// An array, held by value.
    Array(Vec<ScriptValue>),
    /// An object or function on the heap.
    Object(ObjectHandle),
}

impl ScriptValue {
    /// Get the object handle, if this value is an object.
    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            ScriptValue::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Get the string contents, if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the number, if this value is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the elements, if this value is an array.
    pub fn as_array(&self) -> Option<&[ScriptValue]> {
        match self {
            ScriptValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this value is `null` or `undefined`.
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    /// Short type name for diagnostics. Unlike `typeof`, `null` and arrays
    /// get their own names.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Array(_) => "array",
            ScriptValue::Object(_) => "object",
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => write!(f, "undefined"),
            ScriptValue::Null => write!(f, "null"),
            ScriptValue::Bool(b) => write!(f, "{b}"),
            ScriptValue::Number(n) => write!(f, "{n}"),
            ScriptValue::String(s) => write!(f, "{s:?}"),
            ScriptValue::Array(items) => write!(f, "[array; {}]", items.len()),
            ScriptValue::Object(handle) => write!(f, "[{handle}]"),
        }
    }
}
