//! Configuration types for the bridge.
//!
//! This module provides [`BridgeConfig`], which controls how a proxy cache
//! finds the script-side generator and reads proxies out of its results.

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Global binding the generator is looked up under by default.
pub const DEFAULT_GENERATOR_BINDING: &str = "__fbGenNativeModule";

/// Property of the generator result that holds the proxy by default.
pub const DEFAULT_PROXY_PROPERTY: &str = "module";

/// Configuration for a proxy cache.
///
/// # Example
///
/// ```
/// use modbridge_core::BridgeConfig;
///
/// let config = BridgeConfig::new().with_generator_binding("__genModule");
/// assert_eq!(config.generator_binding, "__genModule");
/// assert_eq!(config.proxy_property, "module");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name of the global function that turns a module config into a proxy.
    ///
    /// The function is called as `generator(payload, moduleId)`.
    pub generator_binding: String,

    /// Property of the generator's result that holds the proxy object.
    pub proxy_property: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            generator_binding: DEFAULT_GENERATOR_BINDING.to_string(),
            proxy_property: DEFAULT_PROXY_PROPERTY.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the generator's global binding.
    pub fn with_generator_binding(mut self, binding: impl Into<String>) -> Self {
        self.generator_binding = binding.into();
        self
    }

    /// Set the property holding the proxy.
    pub fn with_proxy_property(mut self, property: impl Into<String>) -> Self {
        self.proxy_property = property.into();
        self
    }

    /// Parse a configuration from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> RegistryResult<Self> {
        toml::from_str(source).map_err(|e| RegistryError::Parse(e.to_string()))
    }
}
