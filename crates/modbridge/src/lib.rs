//! # modbridge - native modules for embedded script contexts
//!
//! modbridge exposes a catalog of native modules to one or more embedded
//! script contexts. Each module is materialized as a script-side proxy
//! object only when a script first asks for it, and the proxy is reused for
//! every later request until the context is reloaded.
//!
//! ## Features
//!
//! - **Lazy**: nothing is built until a module is requested
//! - **Stable identity**: one proxy per module per context, until reset
//! - **Thread-safe**: concurrent requests create each proxy exactly once
//! - **Observable**: metrics and event subscription per cache
//!
//! ## Quick Start
//!
//! ```ignore
//! use modbridge::prelude::*;
//!
//! let runtime = ModBridge::builder()
//!     .with_manifest_file("modules.toml")
//!     .build::<HeapContext>()?;
//!
//! let ctx = HeapContext::new();
//! install_default_generator(&ctx, DEFAULT_GENERATOR_BINDING);
//!
//! let timing = runtime.get_module(&ctx, "Timing").expect("registered module");
//! assert_eq!(Some(timing), runtime.get_module(&ctx, "Timing"));
//!
//! // Context reloaded: every proxy is released and rebuilt on demand.
//! runtime.reload(ctx.id());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │                   modbridge (facade)                    │
//! │                  ┌──────────────────┐                   │
//! │                  │  BridgeRuntime   │                   │
//! │                  └────────┬─────────┘                   │
//! │                           │                             │
//! │  ┌───────────────┬────────┴────────┬─────────────────┐  │
//! │  │ modbridge-    │ modbridge-proxy │ modbridge-      │  │
//! │  │ core          │ (proxy cache,   │ observe         │  │
//! │  │ (registry)    │  generator)     │ (metrics,events)│  │
//! │  └───────────────┴─────────────────┴─────────────────┘  │
//! ├─────────────────────────────────────────────────────────┤
//! │             Script engine (ScriptContext)               │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use modbridge_core::{
    BridgeConfig, ContextId, RegistryError, ScriptContext, SharedRegistry, StaticModuleRegistry,
};
use modbridge_observe::{BridgeEvent, CacheMetricsSnapshot, EventDispatcher, EventSubscriber};
use modbridge_proxy::{BridgeError, NativeModules};

// Re-export from sub-crates
pub use modbridge_core;
pub use modbridge_observe;
pub use modbridge_proxy;
pub use modbridge_script;

/// Main entry point for modbridge.
pub struct ModBridge;

impl ModBridge {
    /// Create a new runtime builder.
    pub fn builder() -> ModBridgeBuilder {
        ModBridgeBuilder::new()
    }

    /// Create a runtime over `registry` with default configuration.
    pub fn with_registry<C: ScriptContext>(
        registry: SharedRegistry,
    ) -> Result<BridgeRuntime<C>, ModBridgeError> {
        ModBridgeBuilder::new().with_registry(registry).build()
    }
}

/// Builder for configuring a [`BridgeRuntime`].
pub struct ModBridgeBuilder {
    registry: Option<SharedRegistry>,
    manifest: Option<PathBuf>,
    config: BridgeConfig,
    event_subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl ModBridgeBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            registry: None,
            manifest: None,
            config: BridgeConfig::default(),
            event_subscribers: Vec::new(),
        }
    }

    // Registry

    /// Use an already built registry.
    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Load the registry from a TOML or JSON manifest when building.
    ///
    /// Ignored if a registry was supplied with [`with_registry`](Self::with_registry).
    pub fn with_manifest_file(mut self, path: impl AsRef<Path>) -> Self {
        self.manifest = Some(path.as_ref().to_path_buf());
        self
    }

    // Bindings

    /// Set the whole bridge configuration.
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the global the generator is read from.
    pub fn with_generator_binding(mut self, binding: impl Into<String>) -> Self {
        self.config = self.config.with_generator_binding(binding);
        self
    }

    /// Set the generator result property holding the proxy.
    pub fn with_proxy_property(mut self, property: impl Into<String>) -> Self {
        self.config = self.config.with_proxy_property(property);
        self
    }

    // Observability

    /// Add an event subscriber.
    pub fn with_event_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.event_subscribers.push(subscriber);
        self
    }

    /// Build the runtime.
    pub fn build<C: ScriptContext>(self) -> Result<BridgeRuntime<C>, ModBridgeError> {
        let registry = match (self.registry, self.manifest) {
            (Some(registry), _) => registry,
            (None, Some(path)) => StaticModuleRegistry::load_file(&path)?.into_shared(),
            (None, None) => return Err(ModBridgeError::MissingRegistry),
        };

        let event_dispatcher = EventDispatcher::new();
        for subscriber in self.event_subscribers {
            event_dispatcher.subscribe(subscriber);
        }

        info!(
            modules = registry.module_names().len(),
            generator = %self.config.generator_binding,
            "Built module bridge"
        );

        Ok(BridgeRuntime {
            registry,
            config: self.config,
            contexts: DashMap::new(),
            event_dispatcher: Arc::new(event_dispatcher),
        })
    }
}

impl Default for ModBridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured bridge serving any number of script contexts.
///
/// Each attached context gets its own [`NativeModules`] cache; all of them
/// share the registry and the event dispatcher.
pub struct BridgeRuntime<C: ScriptContext> {
    registry: SharedRegistry,
    config: BridgeConfig,
    contexts: DashMap<ContextId, Arc<NativeModules<C>>>,
    event_dispatcher: Arc<EventDispatcher>,
}

impl<C: ScriptContext> BridgeRuntime<C> {
    /// Get the module registry.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Get the bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Get the event dispatcher.
    pub fn event_dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.event_dispatcher
    }

    /// Start tracking `context`, returning its cache.
    ///
    /// Attaching an already attached context returns the existing cache.
    pub fn attach(&self, context: &C) -> Arc<NativeModules<C>> {
        let id = context.id();
        let cache = match self.contexts.entry(id) {
            Entry::Occupied(entry) => return Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let cache = Arc::new(
                    NativeModules::with_config(Arc::clone(&self.registry), self.config.clone())
                        .with_events(Arc::clone(&self.event_dispatcher)),
                );
                entry.insert(Arc::clone(&cache));
                cache
            }
        };

        debug!(context = %id, "Attached script context");
        self.event_dispatcher
            .emit(BridgeEvent::ContextAttached { context: id });
        cache
    }

    /// Get the cache of an attached context.
    pub fn cache(&self, context: ContextId) -> Option<Arc<NativeModules<C>>> {
        self.contexts.get(&context).map(|entry| Arc::clone(entry.value()))
    }

    /// Get the proxy for `name` in `context`, attaching the context if needed.
    pub fn get_module(&self, context: &C, name: &str) -> Option<C::Value> {
        self.attach(context).get_module(context, name)
    }

    /// Like [`get_module`](Self::get_module), but keeps the failure cause.
    pub fn try_get_module(&self, context: &C, name: &str) -> Result<C::Value, ModBridgeError> {
        Ok(self.attach(context).try_get_module(context, name)?)
    }

    /// Drop every proxy of `context` but keep it attached.
    ///
    /// Returns `false` if the context is not attached.
    pub fn reload(&self, context: ContextId) -> bool {
        match self.cache(context) {
            Some(cache) => {
                cache.reset();
                true
            }
            None => false,
        }
    }

    /// Reload every attached context.
    pub fn reload_all(&self) {
        let caches: Vec<_> = self
            .contexts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for cache in caches {
            cache.reset();
        }
    }

    /// Stop tracking `context`, releasing its proxies.
    ///
    /// Returns `false` if the context was not attached.
    pub fn detach(&self, context: ContextId) -> bool {
        let Some((_, cache)) = self.contexts.remove(&context) else {
            return false;
        };

        let entries_cleared = cache.len();
        cache.reset();

        debug!(context = %context, entries = entries_cleared, "Detached script context");
        self.event_dispatcher.emit(BridgeEvent::ContextDetached {
            context,
            entries_cleared,
        });
        true
    }

    /// Ids of all attached contexts.
    pub fn attached_contexts(&self) -> Vec<ContextId> {
        self.contexts.iter().map(|entry| *entry.key()).collect()
    }

    /// Whether `context` is attached.
    pub fn is_attached(&self, context: ContextId) -> bool {
        self.contexts.contains_key(&context)
    }

    /// Metrics of an attached context's cache.
    pub fn metrics(&self, context: ContextId) -> Option<CacheMetricsSnapshot> {
        self.cache(context).map(|cache| cache.metrics().snapshot())
    }
}

impl<C: ScriptContext> std::fmt::Debug for BridgeRuntime<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntime")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

/// Errors from the modbridge runtime.
#[derive(Debug, thiserror::Error)]
pub enum ModBridgeError {
    /// Neither a registry nor a manifest was configured.
    #[error("No module registry configured")]
    MissingRegistry,

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Proxy error.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Main types
    pub use crate::{BridgeRuntime, ModBridge, ModBridgeBuilder, ModBridgeError};

    // Core types
    pub use modbridge_core::{
        BridgeConfig, ContextId, DEFAULT_GENERATOR_BINDING, MethodKind, ModuleDescriptor,
        ModuleRegistry, ScriptContext, SharedRegistry, StaticModuleRegistry,
    };

    // Proxy cache types
    pub use modbridge_proxy::{BridgeError, BridgeResult, GeneratorStatus, NativeModules};

    // Reference runtime
    pub use modbridge_script::{HeapContext, ScriptValue, install_default_generator};

    // Observability types
    pub use modbridge_observe::{
        BridgeEvent, CacheMetrics, CacheMetricsSnapshot, EventDispatcher, EventSubscriber,
    };

    // Common std types
    pub use std::sync::Arc;
}
