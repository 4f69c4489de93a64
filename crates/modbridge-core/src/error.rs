//! Core error types for modbridge.
//!
//! Errors are split by collaborator: [`RegistryError`] for building and
//! loading module registries, [`ScriptError`] for failures reported by a
//! script context.

use thiserror::Error;

/// Errors while building or loading a module registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two modules share the same name.
    #[error("Duplicate module: '{0}'")]
    DuplicateModule(String),

    /// A module name is not a valid identifier.
    #[error("Invalid module name: '{0}'")]
    InvalidModuleName(String),

    /// A module declares the same method twice.
    #[error("Duplicate method '{method}' in module '{module}'")]
    DuplicateMethod {
        /// The module name.
        module: String,
        /// The repeated method name.
        method: String,
    },

    /// More modules than module ids can address.
    #[error("Too many modules: {0} exceeds the module id range")]
    TooManyModules(usize),

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {0}")]
    Parse(String),

    /// The manifest file extension is not recognized.
    #[error("Unsupported manifest format: {0}")]
    UnsupportedFormat(String),

    /// IO error reading a manifest.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for RegistryError {
    fn from(err: toml::de::Error) -> Self {
        RegistryError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Parse(err.to_string())
    }
}

/// Errors reported by a script context.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The value is not an object.
    #[error("Value is not an object: {0}")]
    NotAnObject(String),

    /// The value cannot be called.
    #[error("Value is not callable: {0}")]
    NotCallable(String),

    /// A handle does not refer to a live value in this context.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Script code threw while running.
    #[error("Script exception: {0}")]
    Exception(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Result type for script context operations.
pub type ScriptResult<T> = std::result::Result<T, ScriptError>;
