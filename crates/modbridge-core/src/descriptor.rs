//! Native module descriptors.
//!
//! A [`ModuleDescriptor`] is the read-only description of one native module:
//! its name, exported constants and methods. The registry turns a descriptor
//! into a [`ModuleConfig`], the payload handed to the script-side generator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a native method reports its result back to script code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Fire-and-forget, results delivered through callbacks.
    #[default]
    Async,
    /// Returns a promise to script code.
    Promise,
    /// Blocks the calling script until the native side returns.
    Sync,
}

impl MethodKind {
    /// Get the kind name as it appears in manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Async => "async",
            MethodKind::Promise => "promise",
            MethodKind::Sync => "sync",
        }
    }
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single method exported by a native module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Method name as seen from script code.
    pub name: String,
    /// Calling convention.
    #[serde(default)]
    pub kind: MethodKind,
}

impl MethodDescriptor {
    /// Create an async method.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(name, MethodKind::Async)
    }

    /// Create a method with an explicit kind.
    pub fn with_kind(name: impl Into<String>, kind: MethodKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Read-only description of a native module.
///
/// # Example
///
/// ```
/// use modbridge_core::{MethodKind, ModuleDescriptor};
///
/// let timing = ModuleDescriptor::new("Timing")
///     .with_method("createTimer", MethodKind::Async)
///     .with_method("now", MethodKind::Sync);
///
/// assert_eq!(timing.methods.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Unique module name.
    pub name: String,
    /// Constants exported alongside the methods.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub constants: Map<String, Value>,
    /// Exported methods, in declaration order.
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
}

impl ModuleDescriptor {
    /// Create a descriptor with no constants and no methods.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constants: Map::new(),
            methods: Vec::new(),
        }
    }

    /// Add a method.
    pub fn with_method(mut self, name: impl Into<String>, kind: MethodKind) -> Self {
        self.methods.push(MethodDescriptor::with_kind(name, kind));
        self
    }

    /// Add a constant.
    pub fn with_constant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constants.insert(name.into(), value.into());
        self
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Indices of the methods with the given kind.
    pub fn method_ids(&self, kind: MethodKind) -> Vec<usize> {
        self.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Build the payload consumed by the script-side generator.
    ///
    /// The payload is an array
    /// `[name, constants, methodNames, promiseMethodIds, syncMethodIds]`
    /// with trailing empty parts removed, so a module with nothing but a
    /// name becomes `[name]`.
    pub fn config_payload(&self) -> Value {
        let constants = if self.constants.is_empty() {
            Value::Null
        } else {
            Value::Object(self.constants.clone())
        };
        let names = self
            .methods
            .iter()
            .map(|m| Value::String(m.name.clone()))
            .collect();
        let ids = |kind| {
            Value::Array(
                self.method_ids(kind)
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            )
        };

        let mut parts = vec![
            Value::String(self.name.clone()),
            constants,
            Value::Array(names),
            ids(MethodKind::Promise),
            ids(MethodKind::Sync),
        ];

        while parts.len() > 1 && parts.last().is_some_and(is_empty_part) {
            parts.pop();
        }

        Value::Array(parts)
    }
}

fn is_empty_part(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// The registry's answer to a config lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleConfig {
    /// Position of the module in the registry.
    pub module_id: u32,
    /// Payload for the generator, see [`ModuleDescriptor::config_payload`].
    pub payload: Value,
}

/// Check that a module name is a usable identifier.
///
/// Names must be non-empty, must not start with a digit, and may only
/// contain ASCII alphanumerics, `_` and `$`.
pub fn is_valid_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if !first.is_ascii_digit() && is_ident_char(first) => {
            chars.all(is_ident_char)
        }
        _ => false,
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
