//! modbridge Proxy - lazy module proxies for a script context
//!
//! This crate is the heart of the bridge. For each script context it keeps:
//!
//! - [`NativeModules`]: a name to proxy cache, filled on first request
//! - the context's module generator, loaded once and released on reset
//!
//! # Lifecycle
//!
//! A fresh cache holds nothing. The first [`NativeModules::get_module`]
//! fetches the generator from the context's global object, then calls it
//! with the module's config to build a proxy. Later requests for the same
//! name return that same proxy until [`NativeModules::reset`] drops all of
//! it, typically when the context is reloaded.
//!
//! # Example
//!
//! ```ignore
//! use modbridge_proxy::NativeModules;
//!
//! let modules = NativeModules::new(registry);
//!
//! let timing = modules.get_module(&ctx, "Timing").expect("registered");
//! assert!(modules.get_module(&ctx, "Unknown").is_none());
//!
//! modules.reset();
//! ```

pub mod cache;
pub mod error;
pub mod generator;

// Re-export main types
pub use cache::NativeModules;
pub use error::{BridgeError, BridgeResult};
pub use generator::GeneratorStatus;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cache::NativeModules;
    pub use crate::error::{BridgeError, BridgeResult};
    pub use crate::generator::GeneratorStatus;
}
