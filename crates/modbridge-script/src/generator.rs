//! Default module generator for the heap context.
//!
//! Installs a global function that consumes a module config payload
//! (`[name, constants, methodNames, promiseMethodIds, syncMethodIds]`) and a
//! module id, and returns `{ name, module }` where `module` is a fresh proxy
//! object with one stub per method and the module's constants copied in.

use tracing::debug;

use modbridge_core::{MethodKind, ScriptError, ScriptResult};

use crate::context::HeapContext;
use crate::value::{ObjectHandle, ScriptValue};

/// Install the default generator under `binding` on the global object.
///
/// Returns the handle of the generator function.
pub fn install_default_generator(ctx: &HeapContext, binding: &str) -> ObjectHandle {
    let generator = ctx.alloc_function(generate_module);
    ctx.set_global(binding, ScriptValue::Object(generator));
    debug!(binding, "Installed default module generator");
    generator
}

/// Build a proxy from a config payload.
///
/// Returns `null` when the payload is missing or malformed, matching what a
/// script-side generator does with a config it cannot read.
pub fn generate_module(ctx: &HeapContext, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
    let Some(parts) = args.first().and_then(ScriptValue::as_array) else {
        return Ok(ScriptValue::Null);
    };
    let Some(name) = parts.first().and_then(ScriptValue::as_str) else {
        return Ok(ScriptValue::Null);
    };
    let module_id = args.get(1).and_then(ScriptValue::as_number);

    let module = ctx.alloc_object();

    if let Some(constants) = parts.get(1).and_then(ScriptValue::as_object) {
        for key in ctx.property_names(constants)? {
            let value = ctx.property(constants, &key)?;
            ctx.set_property(module, key, value)?;
        }
    }

    if let Some(methods) = parts.get(2).and_then(ScriptValue::as_array) {
        let promise_ids = ids(parts.get(3));
        let sync_ids = ids(parts.get(4));

        for (index, method) in methods.iter().enumerate() {
            let Some(method) = method.as_str() else {
                continue;
            };
            let kind = if sync_ids.contains(&index) {
                MethodKind::Sync
            } else if promise_ids.contains(&index) {
                MethodKind::Promise
            } else {
                MethodKind::Async
            };
            let stub = method_stub(ctx, name, method, kind);
            ctx.set_property(module, method, ScriptValue::Object(stub))?;
        }
    }

    let info = ctx.alloc_object();
    ctx.set_property(info, "name", ScriptValue::String(name.to_string()))?;
    if let Some(id) = module_id {
        ctx.set_property(info, "moduleId", ScriptValue::Number(id))?;
    }
    ctx.set_property(info, "module", ScriptValue::Object(module))?;

    Ok(ScriptValue::Object(info))
}

fn ids(part: Option<&ScriptValue>) -> Vec<usize> {
    part.and_then(ScriptValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(ScriptValue::as_number)
                .map(|n| n as usize)
                .collect()
        })
        .unwrap_or_default()
}

// Method stubs only describe the call; marshaling to the native side is
// supplied by whoever embeds the context.
fn method_stub(ctx: &HeapContext, module: &str, method: &str, kind: MethodKind) -> ObjectHandle {
    let target = format!("{module}.{method}");
    let stub = ctx.alloc_function(move |_, _| {
        Err(ScriptError::Exception(format!(
            "{target} ({kind}) has no native call handler"
        )))
    });
    let _ = ctx.set_property(stub, "type", ScriptValue::String(kind.as_str().to_string()));
    stub
}
