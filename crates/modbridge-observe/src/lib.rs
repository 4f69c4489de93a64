//! modbridge Observability
//!
//! This crate provides observability features for the modbridge native
//! module bridge, including:
//!
//! - [`CacheMetrics`]: request and lifecycle counters for a proxy cache
//! - [`EventDispatcher`]: observable event system
//!
//! # Metrics Collection
//!
//! ```ignore
//! use modbridge_observe::CacheMetrics;
//!
//! let metrics = CacheMetrics::new();
//! metrics.record_hit();
//!
//! let snapshot = metrics.snapshot();
//! println!("Hit ratio: {:.2}", snapshot.hit_ratio());
//! ```
//!
//! # Event Subscription
//!
//! ```ignore
//! use modbridge_observe::{BridgeEvent, EventDispatcher, LoggingSubscriber};
//! use std::sync::Arc;
//!
//! let dispatcher = EventDispatcher::new();
//! dispatcher.subscribe(Arc::new(LoggingSubscriber::new()));
//!
//! dispatcher.emit(BridgeEvent::CacheReset {
//!     entries_cleared: 0,
//!     generator_released: false,
//! });
//! ```

pub mod events;
pub mod metrics;

// Re-export main types
pub use events::{
    BridgeEvent, CollectingSubscriber, EventDispatcher, EventSubscriber, LoggingSubscriber,
};
pub use metrics::{
    CacheMetrics, CacheMetricsSnapshot, CreationTiming, LifecycleMetrics, RequestMetrics,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::events::{BridgeEvent, EventDispatcher, EventSubscriber};
    pub use crate::metrics::{CacheMetrics, CacheMetricsSnapshot};
}
