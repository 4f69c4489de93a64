//! Heap-backed script context.
//!
//! [`HeapContext`] keeps every object in an arena and hands out
//! [`ObjectHandle`]s. Functions are objects carrying a native closure.
//! Protection is tracked per object so callers can observe when a bridge
//! roots or releases a value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use modbridge_core::{ContextId, ScriptContext, ScriptError, ScriptResult};

use crate::value::{ObjectHandle, ScriptValue};

/// A native function callable from script code.
pub type NativeFunction =
    Arc<dyn Fn(&HeapContext, &[ScriptValue]) -> ScriptResult<ScriptValue> + Send + Sync>;

#[derive(Default)]
struct HeapObject {
    properties: BTreeMap<String, ScriptValue>,
    function: Option<NativeFunction>,
    protect_count: usize,
}

#[derive(Default)]
struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    fn alloc(&mut self, function: Option<NativeFunction>) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(HeapObject {
            function,
            ..HeapObject::default()
        });
        handle
    }

    fn get(&self, handle: ObjectHandle) -> ScriptResult<&HeapObject> {
        self.objects
            .get(handle.0 as usize)
            .ok_or_else(|| ScriptError::InvalidHandle(handle.to_string()))
    }

    fn get_mut(&mut self, handle: ObjectHandle) -> ScriptResult<&mut HeapObject> {
        self.objects
            .get_mut(handle.0 as usize)
            .ok_or_else(|| ScriptError::InvalidHandle(handle.to_string()))
    }
}

/// An in-memory script context.
///
/// The heap is shared behind a lock, so a context can be used from several
/// threads. The lock is never held while a native function runs.
///
/// # Example
///
/// ```
/// use modbridge_core::ScriptContext;
/// use modbridge_script::{HeapContext, ScriptValue};
///
/// let ctx = HeapContext::new();
/// let answer = ctx.alloc_function(|_, _| Ok(ScriptValue::Number(42.0)));
/// ctx.set_global("answer", ScriptValue::Object(answer));
///
/// let f = ctx.global_property("answer").unwrap();
/// assert_eq!(ctx.call_function(&f, &[]).unwrap(), ScriptValue::Number(42.0));
/// ```
pub struct HeapContext {
    id: ContextId,
    heap: Arc<Mutex<Heap>>,
    global: ObjectHandle,
    global_lookups: AtomicUsize,
}

impl HeapContext {
    /// Create a context with an empty global object.
    pub fn new() -> Self {
        let mut heap = Heap::default();
        let global = heap.alloc(None);

        Self {
            id: ContextId::new(),
            heap: Arc::new(Mutex::new(heap)),
            global,
            global_lookups: AtomicUsize::new(0),
        }
    }

    /// Handle of the global object.
    pub fn global(&self) -> ObjectHandle {
        self.global
    }

    /// Allocate an empty object.
    pub fn alloc_object(&self) -> ObjectHandle {
        self.heap.lock().alloc(None)
    }

    /// Allocate a function object backed by a native closure.
    pub fn alloc_function<F>(&self, function: F) -> ObjectHandle
    where
        F: Fn(&HeapContext, &[ScriptValue]) -> ScriptResult<ScriptValue> + Send + Sync + 'static,
    {
        self.heap.lock().alloc(Some(Arc::new(function)))
    }

    /// Set a property on an object.
    pub fn set_property(
        &self,
        object: ObjectHandle,
        name: impl Into<String>,
        value: ScriptValue,
    ) -> ScriptResult<()> {
        let mut heap = self.heap.lock();
        heap.get_mut(object)?.properties.insert(name.into(), value);
        Ok(())
    }

    /// Read a property of an object. Missing properties read as undefined.
    pub fn property(&self, object: ObjectHandle, name: &str) -> ScriptResult<ScriptValue> {
        let heap = self.heap.lock();
        Ok(heap
            .get(object)?
            .properties
            .get(name)
            .cloned()
            .unwrap_or(ScriptValue::Undefined))
    }

    /// Names of an object's own properties, sorted.
    pub fn property_names(&self, object: ObjectHandle) -> ScriptResult<Vec<String>> {
        let heap = self.heap.lock();
        Ok(heap.get(object)?.properties.keys().cloned().collect())
    }

    /// Define a global binding.
    pub fn set_global(&self, name: impl Into<String>, value: ScriptValue) {
        let mut heap = self.heap.lock();
        if let Ok(global) = heap.get_mut(self.global) {
            global.properties.insert(name.into(), value);
        }
    }

    /// Remove a global binding, returning its old value.
    pub fn remove_global(&self, name: &str) -> Option<ScriptValue> {
        let mut heap = self.heap.lock();
        heap.get_mut(self.global)
            .ok()
            .and_then(|global| global.properties.remove(name))
    }

    /// Current protection count of an object.
    pub fn protect_count(&self, object: ObjectHandle) -> usize {
        self.heap
            .lock()
            .get(object)
            .map(|o| o.protect_count)
            .unwrap_or(0)
    }

    /// Number of objects with a non-zero protection count.
    pub fn protected_objects(&self) -> usize {
        self.heap
            .lock()
            .objects
            .iter()
            .filter(|o| o.protect_count > 0)
            .count()
    }

    /// Number of objects allocated so far, the global object included.
    pub fn object_count(&self) -> usize {
        self.heap.lock().objects.len()
    }

    /// Number of global property reads made through [`ScriptContext`].
    pub fn global_lookups(&self) -> usize {
        self.global_lookups.load(Ordering::SeqCst)
    }

    /// Convert JSON into a script value, allocating objects as needed.
    pub fn import_json(&self, value: &serde_json::Value) -> ScriptValue {
        match value {
            serde_json::Value::Null => ScriptValue::Null,
            serde_json::Value::Bool(b) => ScriptValue::Bool(*b),
            serde_json::Value::Number(n) => ScriptValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => ScriptValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                ScriptValue::Array(items.iter().map(|v| self.import_json(v)).collect())
            }
            serde_json::Value::Object(map) => {
                let converted: Vec<(String, ScriptValue)> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.import_json(v)))
                    .collect();

                let mut heap = self.heap.lock();
                let handle = heap.alloc(None);
                if let Ok(object) = heap.get_mut(handle) {
                    object.properties.extend(converted);
                }
                ScriptValue::Object(handle)
            }
        }
    }

    fn function(&self, value: &ScriptValue) -> ScriptResult<NativeFunction> {
        let handle = value
            .as_object()
            .ok_or_else(|| ScriptError::NotCallable(value.type_name().to_string()))?;
        let heap = self.heap.lock();
        heap.get(handle)?
            .function
            .clone()
            .ok_or_else(|| ScriptError::NotCallable(handle.to_string()))
    }
}

impl Default for HeapContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HeapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapContext")
            .field("id", &self.id)
            .field("objects", &self.object_count())
            .finish()
    }
}

impl ScriptContext for HeapContext {
    type Value = ScriptValue;
    type Root = HeapRoot;

    fn id(&self) -> ContextId {
        self.id
    }

    fn global_property(&self, name: &str) -> ScriptResult<ScriptValue> {
        self.global_lookups.fetch_add(1, Ordering::SeqCst);
        self.property(self.global, name)
    }

    fn get_property(&self, object: &ScriptValue, name: &str) -> ScriptResult<ScriptValue> {
        let handle = object
            .as_object()
            .ok_or_else(|| ScriptError::NotAnObject(object.type_name().to_string()))?;
        self.property(handle, name)
    }

    fn call_function(
        &self,
        function: &ScriptValue,
        args: &[serde_json::Value],
    ) -> ScriptResult<ScriptValue> {
        let function = self.function(function)?;
        let args: Vec<ScriptValue> = args.iter().map(|a| self.import_json(a)).collect();
        function(self, &args)
    }

    fn is_object(&self, value: &ScriptValue) -> bool {
        value.as_object().is_some()
    }

    fn is_callable(&self, value: &ScriptValue) -> bool {
        self.function(value).is_ok()
    }

    fn is_null_or_undefined(&self, value: &ScriptValue) -> bool {
        value.is_null_or_undefined()
    }

    fn protect(&self, value: &ScriptValue) -> HeapRoot {
        let handle = value.as_object();
        if let Some(handle) = handle {
            if let Ok(object) = self.heap.lock().get_mut(handle) {
                object.protect_count += 1;
                trace!(object = %handle, count = object.protect_count, "Protected value");
            }
        }

        HeapRoot {
            heap: Arc::downgrade(&self.heap),
            handle,
        }
    }
}

/// Keeps an object protected until dropped.
///
/// A root outliving its context is harmless: the release becomes a no-op.
pub struct HeapRoot {
    heap: Weak<Mutex<Heap>>,
    handle: Option<ObjectHandle>,
}

impl Drop for HeapRoot {
    fn drop(&mut self) {
        let (Some(handle), Some(heap)) = (self.handle, self.heap.upgrade()) else {
            return;
        };
        if let Ok(object) = heap.lock().get_mut(handle) {
            object.protect_count = object.protect_count.saturating_sub(1);
        }
    }
}

impl fmt::Debug for HeapRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapRoot").field("handle", &self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_properties() {
        let ctx = HeapContext::new();
        let object = ctx.alloc_object();

        ctx.set_property(object, "name", ScriptValue::String("Timing".into()))
            .unwrap();

        assert_eq!(
            ctx.property(object, "name").unwrap(),
            ScriptValue::String("Timing".into())
        );
        assert_eq!(ctx.property(object, "missing").unwrap(), ScriptValue::Undefined);
        assert_eq!(ctx.property_names(object).unwrap(), vec!["name"]);
    }

    #[test]
    fn test_invalid_handle() {
        let ctx = HeapContext::new();
        let result = ctx.property(ObjectHandle(999), "x");
        assert!(matches!(result, Err(ScriptError::InvalidHandle(_))));
    }

    #[test]
    fn test_globals() {
        let ctx = HeapContext::new();
        ctx.set_global("answer", ScriptValue::Number(42.0));

        assert_eq!(ctx.global_property("answer").unwrap(), ScriptValue::Number(42.0));
        assert_eq!(ctx.global_property("other").unwrap(), ScriptValue::Undefined);
        assert_eq!(ctx.global_lookups(), 2);

        assert_eq!(ctx.remove_global("answer"), Some(ScriptValue::Number(42.0)));
        assert_eq!(ctx.global_property("answer").unwrap(), ScriptValue::Undefined);
    }

    #[test]
    fn test_call_function_with_json_args() {
        let ctx = HeapContext::new();
        let echo = ctx.alloc_function(|_, args| Ok(args.get(1).cloned().unwrap_or(ScriptValue::Null)));
        let echo = ScriptValue::Object(echo);

        assert!(ctx.is_callable(&echo));
        let result = ctx.call_function(&echo, &[json!(null), json!(7)]).unwrap();
        assert_eq!(result, ScriptValue::Number(7.0));
    }

    #[test]
    fn test_call_non_function() {
        let ctx = HeapContext::new();
        let object = ScriptValue::Object(ctx.alloc_object());

        assert!(ctx.is_object(&object));
        assert!(!ctx.is_callable(&object));
        assert!(matches!(
            ctx.call_function(&object, &[]),
            Err(ScriptError::NotCallable(_))
        ));
        assert!(matches!(
            ctx.call_function(&ScriptValue::Null, &[]),
            Err(ScriptError::NotCallable(_))
        ));
    }

    #[test]
    fn test_functions_can_reenter_context() {
        let ctx = HeapContext::new();
        let make = ctx.alloc_function(|ctx, _| Ok(ScriptValue::Object(ctx.alloc_object())));

        let result = ctx
            .call_function(&ScriptValue::Object(make), &[])
            .unwrap();
        assert!(ctx.is_object(&result));
    }

    #[test]
    fn test_import_json_object() {
        let ctx = HeapContext::new();
        let value = ctx.import_json(&json!({"a": 1, "b": [true, "x"]}));

        let handle = value.as_object().unwrap();
        assert_eq!(ctx.property(handle, "a").unwrap(), ScriptValue::Number(1.0));
        assert_eq!(
            ctx.property(handle, "b").unwrap(),
            ScriptValue::Array(vec![ScriptValue::Bool(true), ScriptValue::String("x".into())])
        );
    }

    #[test]
    fn test_get_property_on_primitive() {
        let ctx = HeapContext::new();
        let result = ctx.get_property(&ScriptValue::Number(1.0), "x");
        assert!(matches!(result, Err(ScriptError::NotAnObject(_))));
    }

    #[test]
    fn test_protect_and_release() {
        let ctx = HeapContext::new();
        let handle = ctx.alloc_object();
        let value = ScriptValue::Object(handle);

        let first = ctx.protect(&value);
        let second = ctx.protect(&value);
        assert_eq!(ctx.protect_count(handle), 2);
        assert_eq!(ctx.protected_objects(), 1);

        drop(first);
        assert_eq!(ctx.protect_count(handle), 1);

        drop(second);
        assert_eq!(ctx.protect_count(handle), 0);
        assert_eq!(ctx.protected_objects(), 0);
    }

    #[test]
    fn test_protect_primitive_is_noop() {
        let ctx = HeapContext::new();
        let root = ctx.protect(&ScriptValue::Number(1.0));
        drop(root);
        assert_eq!(ctx.protected_objects(), 0);
    }

    #[test]
    fn test_root_outliving_context() {
        let ctx = HeapContext::new();
        let value = ScriptValue::Object(ctx.alloc_object());
        let root = ctx.protect(&value);

        drop(ctx);
        drop(root);
    }
}
