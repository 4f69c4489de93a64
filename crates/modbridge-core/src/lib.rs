//! modbridge Core - shared types for the native module bridge
//!
//! This crate provides the pieces every other modbridge crate builds on:
//!
//! - [`ModuleDescriptor`]: read-only description of a native module
//! - [`ModuleRegistry`]: the catalog of modules, shared between contexts
//! - [`ScriptContext`]: the contract an embedded script engine implements
//! - [`BridgeConfig`]: how generator and proxies are located in script land
//!
//! # Quick Start
//!
//! ```ignore
//! use modbridge_core::prelude::*;
//!
//! let registry = StaticModuleRegistry::builder()
//!     .with_module(ModuleDescriptor::new("Timing").with_method("createTimer", MethodKind::Async))
//!     .build()?
//!     .into_shared();
//!
//! let config = registry.config("Timing").unwrap();
//! assert_eq!(config.module_id, 0);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Application                │
//! ├─────────────────────────────────────────┤
//! │          modbridge (facade)             │
//! ├─────────────────────────────────────────┤
//! │ modbridge-proxy │ modbridge-observe │ ..│
//! ├─────────────────────────────────────────┤
//! │ modbridge-core (registry, contracts)    │
//! └─────────────────────────────────────────┘
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod script;

// Re-export main types at crate root
pub use config::{BridgeConfig, DEFAULT_GENERATOR_BINDING, DEFAULT_PROXY_PROPERTY};
pub use descriptor::{
    MethodDescriptor, MethodKind, ModuleConfig, ModuleDescriptor, is_valid_module_name,
};
pub use error::{RegistryError, RegistryResult, ScriptError, ScriptResult};
pub use registry::{
    ModuleRegistry, RegistryManifest, SharedRegistry, StaticModuleRegistry,
    StaticModuleRegistryBuilder,
};
pub use script::{ContextId, ScriptContext};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```ignore
/// use modbridge_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::BridgeConfig;
    pub use crate::descriptor::{MethodDescriptor, MethodKind, ModuleDescriptor};
    pub use crate::error::{RegistryError, ScriptError, ScriptResult};
    pub use crate::registry::{ModuleRegistry, SharedRegistry, StaticModuleRegistry};
    pub use crate::script::{ContextId, ScriptContext};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_registry_round_trip_through_trait_object() {
        let registry: SharedRegistry = StaticModuleRegistry::builder()
            .with_module(
                ModuleDescriptor::new("Timing").with_method("createTimer", MethodKind::Async),
            )
            .with_module(ModuleDescriptor::new("AlertManager"))
            .build()
            .unwrap()
            .into_shared();

        let config = registry.config("AlertManager").unwrap();
        assert_eq!(config.module_id, 1);
        assert!(registry.has_module("Timing"));
        assert!(!registry.has_module("Unknown"));
    }
}
