//! Script context contract.
//!
//! modbridge does not embed a script engine of its own. Instead it drives an
//! engine through the [`ScriptContext`] trait: fetch a global, read a
//! property, call a function, and keep a value alive while the bridge holds
//! on to it.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScriptResult;

/// Unique identifier for a script context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Create a new random context ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An isolated execution environment of an embedded script engine.
///
/// Values handed out by a context live no longer than the context itself.
/// Whoever keeps a value across calls must hold a [`ScriptContext::Root`]
/// for it; dropping the root releases the value back to the engine's own
/// lifetime rules.
///
/// # Implementing a Context
///
/// ```ignore
/// impl ScriptContext for MyContext {
///     type Value = MyValue;
///     type Root = MyRoot;
///
///     fn id(&self) -> ContextId {
///         self.id
///     }
///
///     fn global_property(&self, name: &str) -> ScriptResult<MyValue> {
///         self.global().get(name)
///     }
///
///     // ...
/// }
/// ```
pub trait ScriptContext {
    /// Handle to a script value. Cloning a handle must preserve identity.
    type Value: Clone + fmt::Debug;

    /// Keeps a value alive until dropped.
    type Root;

    /// Get the identifier of this context.
    fn id(&self) -> ContextId;

    /// Read a property of the global object.
    ///
    /// A missing property is reported as an undefined value, not an error.
    fn global_property(&self, name: &str) -> ScriptResult<Self::Value>;

    /// Read a property of an object.
    fn get_property(&self, object: &Self::Value, name: &str) -> ScriptResult<Self::Value>;

    /// Call a function with arguments converted from JSON.
    fn call_function(
        &self,
        function: &Self::Value,
        args: &[serde_json::Value],
    ) -> ScriptResult<Self::Value>;

    /// Check if a value is an object (functions included).
    fn is_object(&self, value: &Self::Value) -> bool;

    /// Check if a value can be called.
    fn is_callable(&self, value: &Self::Value) -> bool;

    /// Check if a value is `null` or `undefined`.
    fn is_null_or_undefined(&self, value: &Self::Value) -> bool;

    /// Protect a value from collection until the returned root is dropped.
    fn protect(&self, value: &Self::Value) -> Self::Root;
}
