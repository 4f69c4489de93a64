//! Generator bootstrap.
//!
//! The generator is the script function that turns a module config into a
//! proxy. It is fetched from the context the first time a proxy is needed
//! and kept, protected, until the owning cache is reset.

use std::thread::ThreadId;

use modbridge_core::ScriptContext;

use crate::error::{BridgeError, BridgeResult};

/// Observable state of a cache's generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    /// Not fetched yet, or released by a reset.
    Unloaded,
    /// Being fetched by some thread.
    Loading,
    /// Fetched and ready to use.
    Loaded,
}

/// A fetched generator and the root keeping it alive.
pub(crate) struct LoadedGenerator<V, R> {
    pub(crate) value: V,
    _root: R,
}

pub(crate) enum GeneratorState<V, R> {
    Unloaded,
    Loading { owner: ThreadId },
    Loaded(LoadedGenerator<V, R>),
}

/// What a caller should do after looking at the generator state.
pub(crate) enum GeneratorPoll<V> {
    /// The generator is loaded.
    Ready(V),
    /// The caller now owns the load and must finish it.
    Claimed,
    /// Another thread is loading; wait and poll again.
    Wait { owner: ThreadId },
    /// The calling thread is the one loading.
    Reentrant,
}

impl<V: Clone, R> GeneratorState<V, R> {
    /// Inspect the state, claiming the load when nobody else has.
    pub(crate) fn poll(&mut self, caller: ThreadId) -> GeneratorPoll<V> {
        match self {
            GeneratorState::Loaded(generator) => GeneratorPoll::Ready(generator.value.clone()),
            GeneratorState::Loading { owner } if *owner == caller => GeneratorPoll::Reentrant,
            GeneratorState::Loading { owner } => GeneratorPoll::Wait { owner: *owner },
            GeneratorState::Unloaded => {
                *self = GeneratorState::Loading { owner: caller };
                GeneratorPoll::Claimed
            }
        }
    }
}

impl<V, R> GeneratorState<V, R> {
    pub(crate) fn status(&self) -> GeneratorStatus {
        match self {
            GeneratorState::Unloaded => GeneratorStatus::Unloaded,
            GeneratorState::Loading { .. } => GeneratorStatus::Loading,
            GeneratorState::Loaded(_) => GeneratorStatus::Loaded,
        }
    }

    /// Thread currently loading the generator, if any.
    pub(crate) fn loading_owner(&self) -> Option<ThreadId> {
        match self {
            GeneratorState::Loading { owner } => Some(*owner),
            _ => None,
        }
    }
}

/// Fetch the generator bound to `binding` and protect it.
pub(crate) fn load_generator<C: ScriptContext>(
    context: &C,
    binding: &str,
) -> BridgeResult<LoadedGenerator<C::Value, C::Root>> {
    let unavailable = |reason: String| BridgeError::GeneratorUnavailable {
        binding: binding.to_string(),
        reason,
    };

    let value = context
        .global_property(binding)
        .map_err(|e| unavailable(e.to_string()))?;

    if context.is_null_or_undefined(&value) {
        return Err(unavailable("binding is not defined".to_string()));
    }
    if !context.is_callable(&value) {
        return Err(unavailable("binding is not callable".to_string()));
    }

    let root = context.protect(&value);
    Ok(LoadedGenerator { value, _root: root })
}
