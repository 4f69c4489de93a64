//! Error types for the proxy cache.

use thiserror::Error;

/// Reasons a module proxy could not be produced.
///
/// None of these escape [`crate::NativeModules::get_module`], which reports
/// every failure as `None`. [`crate::NativeModules::try_get_module`] keeps
/// the cause for diagnostics.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The registry has no module with this name.
    #[error("Module not found: '{0}'")]
    ModuleNotFound(String),

    /// The requested name is not a valid module identifier.
    #[error("Invalid module name: '{0}'")]
    InvalidModuleName(String),

    /// The generator could not be obtained from the context.
    #[error("Generator '{binding}' unavailable: {reason}")]
    GeneratorUnavailable {
        /// Global binding the generator was read from.
        binding: String,
        /// Why it could not be used.
        reason: String,
    },

    /// Calling the generator failed or produced nothing usable.
    #[error("Generator failed for module '{module}': {reason}")]
    GeneratorInvocationFailed {
        /// The module being created.
        module: String,
        /// What went wrong.
        reason: String,
    },

    /// The request would wait on work the calling thread is itself doing.
    #[error("Re-entrant request for '{0}' while it is being created")]
    ReentrantRequest(String),

    /// The cache was reset while this creation was in flight.
    #[error("Creation of '{0}' was overtaken by a reset")]
    Stale(String),
}

/// Result type for proxy cache operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
