//! Observable events emitted by the bridge.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use modbridge_core::ContextId;

/// Events that can be observed while a bridge serves module requests.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// The generator was fetched from a context.
    GeneratorLoaded {
        /// Context the generator belongs to.
        context: ContextId,
        /// Global binding it was read from.
        binding: String,
        /// Time spent loading.
        duration: Duration,
    },
    /// The generator could not be fetched.
    GeneratorFailed {
        /// Context the load was attempted in.
        context: ContextId,
        /// Global binding that was read.
        binding: String,
        /// Why the load failed.
        reason: String,
    },
    /// A proxy was created and cached.
    ModuleCreated {
        /// Owning context.
        context: ContextId,
        /// Module name.
        module: String,
        /// Time spent creating the proxy.
        duration: Duration,
    },
    /// A request was served from the cache.
    CacheHit {
        /// Owning context.
        context: ContextId,
        /// Module name.
        module: String,
    },
    /// A proxy could not be created.
    ModuleCreationFailed {
        /// Owning context.
        context: ContextId,
        /// Module name.
        module: String,
        /// Why creation failed.
        reason: String,
    },
    /// All cached state was dropped.
    CacheReset {
        /// Number of proxies released.
        entries_cleared: usize,
        /// Whether a loaded generator was released.
        generator_released: bool,
    },
    /// A context started being tracked.
    ContextAttached {
        /// The context.
        context: ContextId,
    },
    /// A context stopped being tracked.
    ContextDetached {
        /// The context.
        context: ContextId,
        /// Number of proxies released with it.
        entries_cleared: usize,
    },
}

impl BridgeEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            BridgeEvent::GeneratorLoaded { .. } => "generator_loaded",
            BridgeEvent::GeneratorFailed { .. } => "generator_failed",
            BridgeEvent::ModuleCreated { .. } => "module_created",
            BridgeEvent::CacheHit { .. } => "cache_hit",
            BridgeEvent::ModuleCreationFailed { .. } => "module_creation_failed",
            BridgeEvent::CacheReset { .. } => "cache_reset",
            BridgeEvent::ContextAttached { .. } => "context_attached",
            BridgeEvent::ContextDetached { .. } => "context_detached",
        }
    }
}

/// Subscriber for bridge events.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &BridgeEvent);

    /// Filter for event types this subscriber is interested in.
    /// Returns `None` to receive all events.
    fn event_filter(&self) -> Option<Vec<&'static str>> {
        None
    }
}

/// A subscriber that forwards events to `tracing`.
pub struct LoggingSubscriber;

impl LoggingSubscriber {
    /// Create a new logging subscriber.
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &BridgeEvent) {
        match event {
            BridgeEvent::GeneratorLoaded { context, binding, duration } => {
                tracing::info!(
                    event = "generator_loaded",
                    context = %context,
                    binding = binding,
                    duration_us = duration.as_micros(),
                    "Generator loaded"
                );
            }
            BridgeEvent::GeneratorFailed { context, binding, reason } => {
                tracing::warn!(
                    event = "generator_failed",
                    context = %context,
                    binding = binding,
                    reason = reason,
                    "Generator unavailable"
                );
            }
            BridgeEvent::ModuleCreated { context, module, duration } => {
                tracing::debug!(
                    event = "module_created",
                    context = %context,
                    module = module,
                    duration_us = duration.as_micros(),
                    "Module proxy created"
                );
            }
            BridgeEvent::CacheHit { context, module } => {
                tracing::trace!(
                    event = "cache_hit",
                    context = %context,
                    module = module,
                    "Module proxy cache hit"
                );
            }
            BridgeEvent::ModuleCreationFailed { context, module, reason } => {
                tracing::warn!(
                    event = "module_creation_failed",
                    context = %context,
                    module = module,
                    reason = reason,
                    "Module proxy creation failed"
                );
            }
            BridgeEvent::CacheReset { entries_cleared, generator_released } => {
                tracing::info!(
                    event = "cache_reset",
                    entries = entries_cleared,
                    generator = generator_released,
                    "Proxy cache reset"
                );
            }
            BridgeEvent::ContextAttached { context } => {
                tracing::debug!(event = "context_attached", context = %context, "Context attached");
            }
            BridgeEvent::ContextDetached { context, entries_cleared } => {
                tracing::debug!(
                    event = "context_detached",
                    context = %context,
                    entries = entries_cleared,
                    "Context detached"
                );
            }
        }
    }
}

/// A subscriber that collects events for later analysis.
pub struct CollectingSubscriber {
    events: RwLock<Vec<(Instant, BridgeEvent)>>,
    max_events: usize,
}

impl CollectingSubscriber {
    /// Create a new collecting subscriber.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    /// Get collected events.
    pub fn events(&self) -> Vec<(Instant, BridgeEvent)> {
        self.events.read().clone()
    }

    /// Count collected events of one type.
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|(_, e)| e.event_type() == event_type)
            .count()
    }

    /// Clear collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSubscriber for CollectingSubscriber {
    fn on_event(&self, event: &BridgeEvent) {
        let mut events = self.events.write();
        if events.len() < self.max_events {
            events.push((Instant::now(), event.clone()));
        }
    }
}

/// Event dispatcher that manages subscribers.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Remove all subscribers.
    pub fn clear_subscribers(&self) {
        self.subscribers.write().clear();
    }

    /// Get subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Emit an event to all subscribers.
    ///
    /// The subscriber list is copied first, so a subscriber may emit or
    /// subscribe from inside `on_event`.
    pub fn emit(&self, event: BridgeEvent) {
        let subscribers = self.subscribers.read().clone();
        for subscriber in subscribers.iter() {
            if let Some(filter) = subscriber.event_filter() {
                if !filter.contains(&event.event_type()) {
                    continue;
                }
            }
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
