//! Native module registry.
//!
//! The registry is the catalog of native modules a bridge can expose. It is
//! immutable once built and is shared by reference between any number of
//! proxy caches and script contexts.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::descriptor::{ModuleConfig, ModuleDescriptor, is_valid_module_name};
use crate::error::{RegistryError, RegistryResult};

/// Catalog of native modules and their descriptors.
///
/// Implementations must be safe to read from several threads at once and
/// must not change their contents while a bridge is using them.
pub trait ModuleRegistry: Send + Sync + fmt::Debug {
    /// Names of all modules, in module id order.
    fn module_names(&self) -> Vec<String>;

    /// Get the descriptor for a module.
    fn descriptor(&self, name: &str) -> Option<Arc<ModuleDescriptor>>;

    /// Get the numeric id for a module.
    fn module_id(&self, name: &str) -> Option<u32>;

    /// Check if a module exists.
    fn has_module(&self, name: &str) -> bool {
        self.module_id(name).is_some()
    }

    /// Get the generator payload for a module.
    fn config(&self, name: &str) -> Option<ModuleConfig> {
        let module_id = self.module_id(name)?;
        let descriptor = self.descriptor(name)?;
        Some(ModuleConfig {
            module_id,
            payload: descriptor.config_payload(),
        })
    }
}

/// A shared, read-only registry reference.
pub type SharedRegistry = Arc<dyn ModuleRegistry>;

/// On-disk form of a registry.
///
/// ```toml
/// [[modules]]
/// name = "Timing"
/// methods = [{ name = "createTimer" }, { name = "now", kind = "sync" }]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryManifest {
    /// Modules in id order.
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

/// A registry backed by a fixed list of descriptors.
///
/// Module ids are assigned in insertion order starting at zero.
pub struct StaticModuleRegistry {
    modules: Vec<Arc<ModuleDescriptor>>,
    index: HashMap<String, u32>,
}

impl StaticModuleRegistry {
    /// Create a builder.
    pub fn builder() -> StaticModuleRegistryBuilder {
        StaticModuleRegistryBuilder::new()
    }

    /// Create a registry from descriptors.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid or duplicate module names and on
    /// duplicate method names within a module.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ModuleDescriptor>,
    ) -> RegistryResult<Self> {
        let mut modules = Vec::new();
        let mut index = HashMap::new();

        for descriptor in descriptors {
            validate_descriptor(&descriptor)?;
            if index.contains_key(&descriptor.name) {
                return Err(RegistryError::DuplicateModule(descriptor.name));
            }
            index.insert(descriptor.name.clone(), next_module_id(modules.len())?);
            modules.push(Arc::new(descriptor));
        }

        debug!(modules = modules.len(), "Built module registry");
        Ok(Self { modules, index })
    }

    /// Create a registry from a parsed manifest.
    pub fn from_manifest(manifest: RegistryManifest) -> RegistryResult<Self> {
        Self::from_descriptors(manifest.modules)
    }

    /// Parse a TOML manifest.
    pub fn from_toml_str(source: &str) -> RegistryResult<Self> {
        let manifest: RegistryManifest = toml::from_str(source)?;
        Self::from_manifest(manifest)
    }

    /// Parse a JSON manifest.
    pub fn from_json_str(source: &str) -> RegistryResult<Self> {
        let manifest: RegistryManifest = serde_json::from_str(source)?;
        Self::from_manifest(manifest)
    }

    /// Load a manifest file, picking the format from the extension.
    pub fn load_file(path: &Path) -> RegistryResult<Self> {
        let source = std::fs::read_to_string(path)?;
        let registry = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&source)?,
            Some("json") => Self::from_json_str(&source)?,
            other => {
                return Err(RegistryError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ));
            }
        };

        info!(
            path = %path.display(),
            modules = registry.len(),
            "Loaded module registry"
        );
        Ok(registry)
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the registry has no modules.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterate over descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModuleDescriptor>> + '_ {
        self.modules.iter()
    }

    /// Wrap in an `Arc` for sharing.
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(self)
    }
}

impl ModuleRegistry for StaticModuleRegistry {
    fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }

    fn descriptor(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        let id = *self.index.get(name)?;
        self.modules.get(id as usize).cloned()
    }

    fn module_id(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }
}

impl fmt::Debug for StaticModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticModuleRegistry")
            .field("modules", &self.module_names())
            .finish()
    }
}

fn next_module_id(count: usize) -> RegistryResult<u32> {
    u32::try_from(count).map_err(|_| RegistryError::TooManyModules(count))
}

fn validate_descriptor(descriptor: &ModuleDescriptor) -> RegistryResult<()> {
    if !is_valid_module_name(&descriptor.name) {
        return Err(RegistryError::InvalidModuleName(descriptor.name.clone()));
    }

    let mut seen = HashSet::new();
    for method in &descriptor.methods {
        if !seen.insert(method.name.as_str()) {
            return Err(RegistryError::DuplicateMethod {
                module: descriptor.name.clone(),
                method: method.name.clone(),
            });
        }
    }
    Ok(())
}

/// Builder for [`StaticModuleRegistry`].
#[derive(Debug, Default)]
pub struct StaticModuleRegistryBuilder {
    modules: Vec<ModuleDescriptor>,
}

impl StaticModuleRegistryBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module.
    pub fn with_module(mut self, descriptor: ModuleDescriptor) -> Self {
        self.modules.push(descriptor);
        self
    }

    /// Build the registry.
    pub fn build(self) -> RegistryResult<StaticModuleRegistry> {
        StaticModuleRegistry::from_descriptors(self.modules)
    }
}
