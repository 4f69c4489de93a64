//! Per-context proxy cache.
//!
//! [`NativeModules`] hands out one proxy per module name for a single script
//! context. Proxies are created lazily through the context's generator and
//! stay cached, and protected, until [`NativeModules::reset`] drops them all.
//!
//! # Concurrency
//!
//! All state sits behind one mutex, but the mutex is never held while
//! script code runs. A thread that misses the cache claims the name, runs
//! the generator unlocked, then publishes the result. Other threads asking
//! for a claimed name wait for it. Every waiting thread records what it
//! waits on; a request whose wait would lead back to the requesting thread
//! (asking for a name it is itself creating, directly or through other
//! threads) gets [`BridgeError::ReentrantRequest`] instead of deadlocking.
//! Results that finish after a reset are discarded.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use tracing::{debug, info};

use modbridge_core::{BridgeConfig, ScriptContext, SharedRegistry, is_valid_module_name};
use modbridge_observe::{BridgeEvent, CacheMetrics, EventDispatcher};

use crate::error::{BridgeError, BridgeResult};
use crate::generator::{GeneratorPoll, GeneratorState, GeneratorStatus, load_generator};

struct CacheEntry<V, R> {
    proxy: V,
    _root: R,
}

/// What a blocked thread is waiting for.
enum WaitTarget {
    Module(String),
    Generator,
}

struct CacheState<V, R> {
    entries: HashMap<String, CacheEntry<V, R>>,
    // Names being created, and by which thread.
    pending: HashMap<String, ThreadId>,
    // Threads blocked on the condvar.
    waiting: HashMap<ThreadId, WaitTarget>,
    generator: GeneratorState<V, R>,
    // Bumped by every reset.
    epoch: u64,
}

impl<V, R> CacheState<V, R> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            pending: HashMap::new(),
            waiting: HashMap::new(),
            generator: GeneratorState::Unloaded,
            epoch: 0,
        }
    }

    fn owner_of(&self, target: &WaitTarget) -> Option<ThreadId> {
        match target {
            WaitTarget::Module(name) => self.pending.get(name).copied(),
            WaitTarget::Generator => self.generator.loading_owner(),
        }
    }

    /// Whether `caller` waiting on `owner` would close a wait cycle.
    fn would_deadlock(&self, caller: ThreadId, owner: ThreadId) -> bool {
        let mut current = owner;
        // A chain can visit each waiting thread at most once.
        for _ in 0..=self.waiting.len() {
            if current == caller {
                return true;
            }
            match self.waiting.get(&current).and_then(|t| self.owner_of(t)) {
                Some(next) => current = next,
                None => return false,
            }
        }
        false
    }
}

/// Lazy cache of module proxies for one script context.
///
/// # Example
///
/// ```ignore
/// use modbridge_proxy::NativeModules;
///
/// let modules = NativeModules::new(registry);
/// let timing = modules.get_module(&ctx, "Timing");
/// assert_eq!(timing, modules.get_module(&ctx, "Timing"));
///
/// modules.reset();
/// ```
pub struct NativeModules<C: ScriptContext> {
    registry: SharedRegistry,
    config: BridgeConfig,
    state: Mutex<CacheState<C::Value, C::Root>>,
    changed: Condvar,
    events: Option<Arc<EventDispatcher>>,
    metrics: CacheMetrics,
}

impl<C: ScriptContext> NativeModules<C> {
    /// Create an empty cache over `registry` with the default bindings.
    pub fn new(registry: SharedRegistry) -> Self {
        Self::with_config(registry, BridgeConfig::default())
    }

    /// Create an empty cache with explicit bindings.
    pub fn with_config(registry: SharedRegistry, config: BridgeConfig) -> Self {
        Self {
            registry,
            config,
            state: Mutex::new(CacheState::new()),
            changed: Condvar::new(),
            events: None,
            metrics: CacheMetrics::new(),
        }
    }

    /// Report cache activity to `dispatcher`.
    pub fn with_events(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.events = Some(dispatcher);
        self
    }

    /// Get the proxy for `name`, creating it on first use.
    ///
    /// Returns `None` when the module cannot be produced for any reason.
    /// Failures are not cached; a later call tries again.
    pub fn get_module(&self, context: &C, name: &str) -> Option<C::Value> {
        match self.try_get_module(context, name) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                debug!(
                    module = name,
                    context = %context.id(),
                    error = %e,
                    "Native module unavailable"
                );
                None
            }
        }
    }

    /// Like [`get_module`](Self::get_module), but keeps the failure cause.
    pub fn try_get_module(&self, context: &C, name: &str) -> BridgeResult<C::Value> {
        if !is_valid_module_name(name) {
            return self.fail(context, name, BridgeError::InvalidModuleName(name.to_string()));
        }

        let caller = thread::current().id();
        let mut state = self.state.lock();

        let epoch = loop {
            if let Some(entry) = state.entries.get(name) {
                let proxy = entry.proxy.clone();
                drop(state);

                self.metrics.record_hit();
                debug!(module = name, context = %context.id(), "Module proxy cache hit");
                self.emit(|| BridgeEvent::CacheHit {
                    context: context.id(),
                    module: name.to_string(),
                });
                return Ok(proxy);
            }

            match state.pending.get(name).copied() {
                None => {
                    state.pending.insert(name.to_string(), caller);
                    break state.epoch;
                }
                Some(owner) if state.would_deadlock(caller, owner) => {
                    drop(state);
                    return self.fail(context, name, BridgeError::ReentrantRequest(name.to_string()));
                }
                Some(_) => {
                    state
                        .waiting
                        .insert(caller, WaitTarget::Module(name.to_string()));
                    self.changed.wait(&mut state);
                    state.waiting.remove(&caller);
                }
            }
        };
        drop(state);

        let _claim = PendingClaim {
            cache: self,
            name,
            epoch,
        };

        self.metrics.record_miss();
        let started = Instant::now();
        let created = self.create_module(context, name);

        let mut state = self.state.lock();
        if state.epoch != epoch {
            drop(state);
            return self.fail(context, name, BridgeError::Stale(name.to_string()));
        }

        match created {
            Ok((proxy, root)) => {
                state.entries.insert(
                    name.to_string(),
                    CacheEntry {
                        proxy: proxy.clone(),
                        _root: root,
                    },
                );
                drop(state);

                let duration = started.elapsed();
                self.metrics.record_creation(duration);
                debug!(
                    module = name,
                    context = %context.id(),
                    duration_us = duration.as_micros() as u64,
                    "Created module proxy"
                );
                self.emit(|| BridgeEvent::ModuleCreated {
                    context: context.id(),
                    module: name.to_string(),
                    duration,
                });
                Ok(proxy)
            }
            Err(e) => {
                drop(state);
                self.fail(context, name, e)
            }
        }
    }

    /// Drop every cached proxy and the generator.
    ///
    /// The next request fetches the generator again and creates fresh
    /// proxies. Creations in flight when this runs are discarded. Safe to
    /// call any number of times.
    pub fn reset(&self) {
        let (entries, generator) = {
            let mut state = self.state.lock();
            state.epoch += 1;
            state.pending.clear();
            let entries = mem::take(&mut state.entries);
            let generator = mem::replace(&mut state.generator, GeneratorState::Unloaded);
            self.changed.notify_all();
            (entries, generator)
        };

        // Released outside the lock; unprotecting may call into the engine.
        let entries_cleared = entries.len();
        let generator_released = generator.status() == GeneratorStatus::Loaded;
        drop(entries);
        drop(generator);

        self.metrics.record_reset(entries_cleared);
        info!(
            entries = entries_cleared,
            generator = generator_released,
            "Reset native module cache"
        );
        self.emit(|| BridgeEvent::CacheReset {
            entries_cleared,
            generator_released,
        });
    }

    /// Number of cached proxies.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no proxies are cached.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Whether a proxy for `name` is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().entries.contains_key(name)
    }

    /// Names of the cached proxies, sorted.
    pub fn cached_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Current generator state.
    pub fn generator_status(&self) -> GeneratorStatus {
        self.state.lock().generator.status()
    }

    /// Whether the generator is loaded.
    pub fn is_generator_loaded(&self) -> bool {
        self.generator_status() == GeneratorStatus::Loaded
    }

    /// Number of resets so far.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Get the cache metrics.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Get the module registry.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Get the bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn create_module(&self, context: &C, name: &str) -> BridgeResult<(C::Value, C::Root)> {
        let generator = self.ensure_generator(context)?;

        let config = self
            .registry
            .config(name)
            .ok_or_else(|| BridgeError::ModuleNotFound(name.to_string()))?;

        let invocation_failed = |reason: String| BridgeError::GeneratorInvocationFailed {
            module: name.to_string(),
            reason,
        };

        let args = [config.payload, Value::from(config.module_id)];
        let info = context
            .call_function(&generator, &args)
            .map_err(|e| invocation_failed(e.to_string()))?;

        if !context.is_object(&info) {
            return Err(invocation_failed(format!("generator returned {info:?}")));
        }

        let property = &self.config.proxy_property;
        let proxy = context
            .get_property(&info, property)
            .map_err(|e| invocation_failed(e.to_string()))?;

        if !context.is_object(&proxy) {
            return Err(invocation_failed(format!(
                "result property '{property}' is not an object"
            )));
        }

        let root = context.protect(&proxy);
        Ok((proxy, root))
    }

    fn ensure_generator(&self, context: &C) -> BridgeResult<C::Value> {
        let binding = &self.config.generator_binding;
        let caller = thread::current().id();
        let mut state = self.state.lock();

        let epoch = loop {
            match state.generator.poll(caller) {
                GeneratorPoll::Ready(generator) => return Ok(generator),
                GeneratorPoll::Reentrant => {
                    return Err(BridgeError::ReentrantRequest(binding.clone()));
                }
                GeneratorPoll::Wait { owner } if state.would_deadlock(caller, owner) => {
                    return Err(BridgeError::ReentrantRequest(binding.clone()));
                }
                GeneratorPoll::Wait { .. } => {
                    state.waiting.insert(caller, WaitTarget::Generator);
                    self.changed.wait(&mut state);
                    state.waiting.remove(&caller);
                }
                GeneratorPoll::Claimed => break state.epoch,
            }
        };
        drop(state);

        let _claim = GeneratorClaim { cache: self, epoch };

        let started = Instant::now();
        let loaded = load_generator(context, binding);

        let mut state = self.state.lock();
        if state.epoch != epoch {
            drop(state);
            return Err(BridgeError::Stale(binding.clone()));
        }

        match loaded {
            Ok(generator) => {
                let value = generator.value.clone();
                state.generator = GeneratorState::Loaded(generator);
                drop(state);

                let duration = started.elapsed();
                self.metrics.record_bootstrap(duration);
                info!(
                    binding = %binding,
                    context = %context.id(),
                    duration_us = duration.as_micros() as u64,
                    "Loaded module generator"
                );
                self.emit(|| BridgeEvent::GeneratorLoaded {
                    context: context.id(),
                    binding: binding.clone(),
                    duration,
                });
                Ok(value)
            }
            Err(e) => {
                drop(state);
                self.emit(|| BridgeEvent::GeneratorFailed {
                    context: context.id(),
                    binding: binding.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn fail<T>(&self, context: &C, name: &str, error: BridgeError) -> BridgeResult<T> {
        self.metrics.record_failure();
        debug!(module = name, context = %context.id(), error = %error, "Module request failed");
        self.emit(|| BridgeEvent::ModuleCreationFailed {
            context: context.id(),
            module: name.to_string(),
            reason: error.to_string(),
        });
        Err(error)
    }

    fn emit(&self, event: impl FnOnce() -> BridgeEvent) {
        if let Some(events) = &self.events {
            events.emit(event());
        }
    }
}

impl<C: ScriptContext> fmt::Debug for NativeModules<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NativeModules")
            .field("cached", &state.entries.len())
            .field("pending", &state.pending.len())
            .field("generator", &state.generator.status())
            .field("epoch", &state.epoch)
            .field("config", &self.config)
            .finish()
    }
}

/// Releases a name claim when creation ends, including by unwinding.
struct PendingClaim<'a, C: ScriptContext> {
    cache: &'a NativeModules<C>,
    name: &'a str,
    epoch: u64,
}

impl<C: ScriptContext> Drop for PendingClaim<'_, C> {
    fn drop(&mut self) {
        let mut state = self.cache.state.lock();
        if state.epoch == self.epoch {
            state.pending.remove(self.name);
        }
        self.cache.changed.notify_all();
    }
}

/// Returns the generator to `Unloaded` if the load did not complete.
struct GeneratorClaim<'a, C: ScriptContext> {
    cache: &'a NativeModules<C>,
    epoch: u64,
}

impl<C: ScriptContext> Drop for GeneratorClaim<'_, C> {
    fn drop(&mut self) {
        let mut state = self.cache.state.lock();
        if state.epoch == self.epoch && state.generator.status() == GeneratorStatus::Loading {
            state.generator = GeneratorState::Unloaded;
        }
        self.cache.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbridge_core::{
        DEFAULT_GENERATOR_BINDING, MethodKind, ModuleDescriptor, StaticModuleRegistry,
    };
    use modbridge_observe::CollectingSubscriber;
    use modbridge_script::{HeapContext, ScriptValue, generate_module, install_default_generator};
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn registry() -> SharedRegistry {
        StaticModuleRegistry::builder()
            .with_module(
                ModuleDescriptor::new("Timing")
                    .with_method("createTimer", MethodKind::Async)
                    .with_method("deleteTimer", MethodKind::Async),
            )
            .with_module(
                ModuleDescriptor::new("AlertManager")
                    .with_method("alertWithArgs", MethodKind::Async),
            )
            .with_module(ModuleDescriptor::new("Inner"))
            .with_module(ModuleDescriptor::new("Outer"))
            .build()
            .unwrap()
            .into_shared()
    }

    fn context() -> HeapContext {
        let ctx = HeapContext::new();
        install_default_generator(&ctx, DEFAULT_GENERATOR_BINDING);
        ctx
    }

    fn install_generator<F>(ctx: &HeapContext, generator: F)
    where
        F: Fn(&HeapContext, &[ScriptValue]) -> modbridge_core::ScriptResult<ScriptValue>
            + Send
            + Sync
            + 'static,
    {
        let handle = ctx.alloc_function(generator);
        ctx.set_global(DEFAULT_GENERATOR_BINDING, ScriptValue::Object(handle));
    }

    fn module_name(args: &[ScriptValue]) -> Option<String> {
        args.first()?.as_array()?.first()?.as_str().map(str::to_string)
    }

    #[test]
    fn test_identity_stability() {
        let ctx = context();
        let modules = NativeModules::new(registry());

        let first = modules.get_module(&ctx, "Timing").unwrap();
        let second = modules.get_module(&ctx, "Timing").unwrap();

        assert_eq!(first, second);
        assert_eq!(modules.len(), 1);
        assert!(modules.contains("Timing"));
    }

    #[test]
    fn test_distinct_modules_get_distinct_proxies() {
        let ctx = context();
        let modules = NativeModules::new(registry());

        let timing = modules.get_module(&ctx, "Timing").unwrap();
        let alerts = modules.get_module(&ctx, "AlertManager").unwrap();

        assert_ne!(timing, alerts);
        assert_eq!(modules.cached_modules(), vec!["AlertManager", "Timing"]);
    }

    #[test]
    fn test_proxy_carries_methods() {
        let ctx = context();
        let modules = NativeModules::new(registry());

        let timing = modules.get_module(&ctx, "Timing").unwrap();
        let create = ctx.get_property(&timing, "createTimer").unwrap();
        assert!(ctx.is_callable(&create));
    }

    #[test]
    fn test_unknown_module() {
        let ctx = context();
        let modules = NativeModules::new(registry());

        assert!(modules.get_module(&ctx, "Unknown").is_none());
        assert!(matches!(
            modules.try_get_module(&ctx, "Unknown"),
            Err(BridgeError::ModuleNotFound(name)) if name == "Unknown"
        ));
        assert!(modules.is_empty());
        assert!(!modules.contains("Unknown"));
    }

    #[test]
    fn test_invalid_module_name() {
        let ctx = context();
        let modules = NativeModules::new(registry());

        assert!(matches!(
            modules.try_get_module(&ctx, ""),
            Err(BridgeError::InvalidModuleName(_))
        ));
        assert!(modules.get_module(&ctx, "not a name").is_none());
        // Rejected before the generator is touched.
        assert_eq!(ctx.global_lookups(), 0);
    }

    #[test]
    fn test_generator_loaded_once() {
        let ctx = context();
        let modules = NativeModules::new(registry());
        assert_eq!(modules.generator_status(), GeneratorStatus::Unloaded);

        modules.get_module(&ctx, "Timing").unwrap();
        modules.get_module(&ctx, "AlertManager").unwrap();
        modules.get_module(&ctx, "Timing").unwrap();

        assert!(modules.is_generator_loaded());
        assert_eq!(ctx.global_lookups(), 1);
    }

    #[test]
    fn test_reset_invalidation() {
        let ctx = context();
        let modules = NativeModules::new(registry());

        let before = modules.get_module(&ctx, "Timing").unwrap();
        modules.reset();

        assert!(modules.is_empty());
        assert!(!modules.is_generator_loaded());

        let after = modules.get_module(&ctx, "Timing").unwrap();
        assert_ne!(before, after);
        // The generator is fetched again after a reset.
        assert_eq!(ctx.global_lookups(), 2);
    }

    #[test]
    fn test_reset_releases_protected_values() {
        let ctx = context();
        let modules = NativeModules::new(registry());

        modules.get_module(&ctx, "Timing").unwrap();
        modules.get_module(&ctx, "AlertManager").unwrap();
        // Generator plus two proxies.
        assert_eq!(ctx.protected_objects(), 3);

        modules.reset();
        assert_eq!(ctx.protected_objects(), 0);
    }

    #[test]
    fn test_reset_idempotent() {
        let ctx = context();
        let modules = NativeModules::new(registry());

        modules.reset();
        modules.reset();
        assert!(modules.is_empty());

        modules.get_module(&ctx, "Timing").unwrap();
        modules.reset();
        modules.reset();

        assert!(modules.is_empty());
        assert!(!modules.is_generator_loaded());
        assert_eq!(modules.epoch(), 4);
        assert_eq!(modules.metrics().snapshot().lifecycle.resets, 4);
    }

    #[test]
    fn test_missing_generator_is_retried() {
        let ctx = HeapContext::new();
        let modules = NativeModules::new(registry());

        assert!(matches!(
            modules.try_get_module(&ctx, "Timing"),
            Err(BridgeError::GeneratorUnavailable { .. })
        ));
        assert_eq!(modules.generator_status(), GeneratorStatus::Unloaded);

        install_default_generator(&ctx, DEFAULT_GENERATOR_BINDING);
        assert!(modules.get_module(&ctx, "Timing").is_some());
        assert_eq!(ctx.global_lookups(), 2);
    }

    #[test]
    fn test_generator_not_callable() {
        let ctx = HeapContext::new();
        ctx.set_global(DEFAULT_GENERATOR_BINDING, ScriptValue::Number(1.0));
        let modules = NativeModules::new(registry());

        assert!(matches!(
            modules.try_get_module(&ctx, "Timing"),
            Err(BridgeError::GeneratorUnavailable { binding, .. }) if binding == DEFAULT_GENERATOR_BINDING
        ));
    }

    #[test]
    fn test_generator_without_object_result() {
        let ctx = HeapContext::new();
        install_generator(&ctx, |_, _| Ok(ScriptValue::Null));
        let modules = NativeModules::new(registry());

        assert!(matches!(
            modules.try_get_module(&ctx, "Timing"),
            Err(BridgeError::GeneratorInvocationFailed { module, .. }) if module == "Timing"
        ));
        assert!(modules.is_empty());
        // The generator itself was fine and stays loaded.
        assert!(modules.is_generator_loaded());
    }

    #[test]
    fn test_generator_result_without_proxy() {
        let ctx = HeapContext::new();
        install_generator(&ctx, |ctx, _| Ok(ScriptValue::Object(ctx.alloc_object())));
        let modules = NativeModules::new(registry());

        assert!(matches!(
            modules.try_get_module(&ctx, "Timing"),
            Err(BridgeError::GeneratorInvocationFailed { reason, .. }) if reason.contains("module")
        ));
    }

    #[test]
    fn test_generator_exception() {
        let ctx = HeapContext::new();
        install_generator(&ctx, |_, _| {
            Err(modbridge_core::ScriptError::Exception("boom".into()))
        });
        let modules = NativeModules::new(registry());

        assert!(matches!(
            modules.try_get_module(&ctx, "Timing"),
            Err(BridgeError::GeneratorInvocationFailed { reason, .. }) if reason.contains("boom")
        ));
    }

    #[test]
    fn test_custom_bindings() {
        let ctx = HeapContext::new();
        let generator = ctx.alloc_function(|ctx, args| {
            let info = generate_module(ctx, args)?;
            let proxy = ctx.get_property(&info, "module")?;
            let wrapper = ctx.alloc_object();
            ctx.set_property(wrapper, "proxy", proxy)?;
            Ok(ScriptValue::Object(wrapper))
        });
        ctx.set_global("makeModule", ScriptValue::Object(generator));

        let config = BridgeConfig::new()
            .with_generator_binding("makeModule")
            .with_proxy_property("proxy");
        let modules = NativeModules::with_config(registry(), config);

        let timing = modules.get_module(&ctx, "Timing").unwrap();
        assert!(ctx.is_callable(&ctx.get_property(&timing, "createTimer").unwrap()));
    }

    #[test]
    fn test_single_creation_under_contention() {
        let ctx = HeapContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        install_generator(&ctx, move |ctx, args| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            generate_module(ctx, args)
        });

        let modules = NativeModules::new(registry());
        let barrier = Barrier::new(8);

        let proxies: Vec<ScriptValue> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        modules.get_module(&ctx, "Timing").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(proxies.iter().all(|p| *p == proxies[0]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.global_lookups(), 1);
        assert_eq!(modules.metrics().snapshot().lifecycle.creations, 1);
    }

    #[test]
    fn test_reentrant_request_for_other_module() {
        let ctx = HeapContext::new();
        let modules = Arc::new(NativeModules::<HeapContext>::new(registry()));
        let seen = Arc::new(Mutex::new(None));

        let cache = Arc::clone(&modules);
        let inner = Arc::clone(&seen);
        install_generator(&ctx, move |ctx, args| {
            if module_name(args).as_deref() == Some("Outer") {
                *inner.lock() = cache.get_module(ctx, "Inner");
            }
            generate_module(ctx, args)
        });

        let outer = modules.get_module(&ctx, "Outer").unwrap();
        let inner = seen.lock().clone().unwrap();

        assert_ne!(outer, inner);
        assert_eq!(modules.get_module(&ctx, "Inner").unwrap(), inner);
        assert_eq!(modules.len(), 2);
    }

    #[test]
    fn test_reentrant_request_for_same_module() {
        let ctx = HeapContext::new();
        let modules = Arc::new(NativeModules::<HeapContext>::new(registry()));
        let nested = Arc::new(Mutex::new(None));

        let cache = Arc::clone(&modules);
        let result = Arc::clone(&nested);
        install_generator(&ctx, move |ctx, args| {
            *result.lock() = Some(cache.try_get_module(ctx, "Timing").is_err());
            generate_module(ctx, args)
        });

        assert!(modules.get_module(&ctx, "Timing").is_some());
        assert_eq!(*nested.lock(), Some(true));
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn test_nested_request_waits_for_other_thread() {
        let ctx = HeapContext::new();
        let modules = Arc::new(NativeModules::<HeapContext>::new(registry()));
        let started = Arc::new(Barrier::new(2));
        let inner_calls = Arc::new(AtomicUsize::new(0));
        let nested = Arc::new(Mutex::new(None));

        let cache = Arc::clone(&modules);
        let gate = Arc::clone(&started);
        let calls = Arc::clone(&inner_calls);
        let seen = Arc::clone(&nested);
        install_generator(&ctx, move |ctx, args| {
            match module_name(args).as_deref() {
                Some("Inner") => {
                    calls.fetch_add(1, Ordering::SeqCst);
                    gate.wait();
                    std::thread::sleep(Duration::from_millis(50));
                }
                Some("Outer") => *seen.lock() = Some(cache.try_get_module(ctx, "Inner")),
                _ => {}
            }
            generate_module(ctx, args)
        });

        let (outer, inner) = std::thread::scope(|s| {
            let creator = s.spawn(|| modules.get_module(&ctx, "Inner"));
            let requester = s.spawn(|| {
                started.wait();
                modules.get_module(&ctx, "Outer")
            });
            (requester.join().unwrap(), creator.join().unwrap())
        });

        let inner = inner.unwrap();
        assert!(outer.is_some());
        // The nested request waited for the other thread's proxy.
        assert!(matches!(nested.lock().take(), Some(Ok(proxy)) if proxy == inner));
        assert_eq!(inner_calls.load(Ordering::SeqCst), 1);
        assert_eq!(modules.len(), 2);
    }

    #[test]
    fn test_cross_thread_cycle_fails_one_side() {
        let ctx = HeapContext::new();
        let modules = Arc::new(NativeModules::<HeapContext>::new(registry()));
        let both_claimed = Arc::new(Barrier::new(2));
        let nested = Arc::new(Mutex::new(Vec::new()));

        let cache = Arc::clone(&modules);
        let gate = Arc::clone(&both_claimed);
        let seen = Arc::clone(&nested);
        install_generator(&ctx, move |ctx, args| {
            let other = match module_name(args).as_deref() {
                Some("Outer") => "Inner",
                Some("Inner") => "Outer",
                _ => return generate_module(ctx, args),
            };
            gate.wait();
            let result = cache.try_get_module(ctx, other);
            seen.lock().push((other.to_string(), result));
            generate_module(ctx, args)
        });

        let (outer, inner) = std::thread::scope(|s| {
            let a = s.spawn(|| modules.get_module(&ctx, "Outer"));
            let b = s.spawn(|| modules.get_module(&ctx, "Inner"));
            (a.join().unwrap(), b.join().unwrap())
        });

        assert!(outer.is_some());
        assert!(inner.is_some());

        let nested = nested.lock();
        assert_eq!(nested.len(), 2);
        let refused: Vec<_> = nested
            .iter()
            .filter(|(_, r)| matches!(r, Err(BridgeError::ReentrantRequest(_))))
            .collect();
        assert_eq!(refused.len(), 1);
        // The side that waited got the proxy the other thread published.
        let (name, result) = nested.iter().find(|(_, r)| r.is_ok()).unwrap();
        let expected = if name == "Inner" { &inner } else { &outer };
        assert_eq!(result.as_ref().ok(), expected.as_ref());
    }

    /// Context that resets its cache the first time the generator is looked up.
    struct ResettingContext {
        inner: HeapContext,
        cache: Mutex<Option<Arc<NativeModules<ResettingContext>>>>,
        resets_left: AtomicUsize,
    }

    impl ScriptContext for ResettingContext {
        type Value = ScriptValue;
        type Root = modbridge_script::HeapRoot;

        fn id(&self) -> modbridge_core::ContextId {
            self.inner.id()
        }

        fn global_property(&self, name: &str) -> modbridge_core::ScriptResult<ScriptValue> {
            if self
                .resets_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                let cache = self.cache.lock().clone();
                if let Some(cache) = cache {
                    cache.reset();
                }
            }
            self.inner.global_property(name)
        }

        fn get_property(
            &self,
            object: &ScriptValue,
            name: &str,
        ) -> modbridge_core::ScriptResult<ScriptValue> {
            self.inner.get_property(object, name)
        }

        fn call_function(
            &self,
            function: &ScriptValue,
            args: &[Value],
        ) -> modbridge_core::ScriptResult<ScriptValue> {
            self.inner.call_function(function, args)
        }

        fn is_object(&self, value: &ScriptValue) -> bool {
            self.inner.is_object(value)
        }

        fn is_callable(&self, value: &ScriptValue) -> bool {
            self.inner.is_callable(value)
        }

        fn is_null_or_undefined(&self, value: &ScriptValue) -> bool {
            self.inner.is_null_or_undefined(value)
        }

        fn protect(&self, value: &ScriptValue) -> Self::Root {
            self.inner.protect(value)
        }
    }

    #[test]
    fn test_reset_while_generator_loading() {
        let ctx = ResettingContext {
            inner: context(),
            cache: Mutex::new(None),
            resets_left: AtomicUsize::new(1),
        };
        let modules = Arc::new(NativeModules::<ResettingContext>::new(registry()));
        *ctx.cache.lock() = Some(Arc::clone(&modules));

        assert!(matches!(
            modules.try_get_module(&ctx, "Timing"),
            Err(BridgeError::Stale(_))
        ));
        // The load that straddled the reset is dropped along with its root.
        assert_eq!(modules.generator_status(), GeneratorStatus::Unloaded);
        assert_eq!(ctx.inner.protected_objects(), 0);
        assert!(modules.is_empty());

        assert!(modules.try_get_module(&ctx, "Timing").is_ok());
        assert_eq!(modules.generator_status(), GeneratorStatus::Loaded);
        assert_eq!(modules.epoch(), 1);

        // Break the context/cache cycle.
        ctx.cache.lock().take();
    }

    #[test]
    fn test_reset_during_creation_discards_result() {
        let ctx = HeapContext::new();
        let modules = Arc::new(NativeModules::<HeapContext>::new(registry()));
        let resets = Arc::new(AtomicUsize::new(0));

        let cache = Arc::clone(&modules);
        let counter = Arc::clone(&resets);
        install_generator(&ctx, move |ctx, args| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                cache.reset();
            }
            generate_module(ctx, args)
        });

        assert!(matches!(
            modules.try_get_module(&ctx, "Timing"),
            Err(BridgeError::Stale(_))
        ));
        assert!(modules.is_empty());
        assert_eq!(ctx.protected_objects(), 0);

        // Next request starts over from a fresh bootstrap.
        assert!(modules.get_module(&ctx, "Timing").is_some());
        assert_eq!(ctx.global_lookups(), 2);
    }

    #[test]
    fn test_metrics_and_events() {
        let ctx = context();
        let dispatcher = Arc::new(EventDispatcher::new());
        let collector = Arc::new(CollectingSubscriber::new(100));
        dispatcher.subscribe(collector.clone());

        let modules = NativeModules::new(registry()).with_events(dispatcher);
        modules.get_module(&ctx, "Timing");
        modules.get_module(&ctx, "Timing");
        modules.get_module(&ctx, "Unknown");
        modules.reset();

        assert_eq!(collector.count("generator_loaded"), 1);
        assert_eq!(collector.count("module_created"), 1);
        assert_eq!(collector.count("cache_hit"), 1);
        assert_eq!(collector.count("module_creation_failed"), 1);
        assert_eq!(collector.count("cache_reset"), 1);

        let snapshot = modules.metrics().snapshot();
        assert_eq!(snapshot.requests.hits, 1);
        assert_eq!(snapshot.requests.misses, 2);
        assert_eq!(snapshot.requests.failures, 1);
        assert_eq!(snapshot.lifecycle.creations, 1);
        assert_eq!(snapshot.lifecycle.bootstraps, 1);
        assert_eq!(snapshot.lifecycle.entries_released, 1);
    }
}
