//! modbridge Script - in-memory reference script context
//!
//! This crate provides a small, engine-free implementation of
//! [`modbridge_core::ScriptContext`]:
//!
//! - [`HeapContext`]: arena of objects addressed by [`ObjectHandle`]
//! - [`ScriptValue`]: the values it hands out
//! - [`install_default_generator`]: a module generator bound as a global
//!
//! It is what the modbridge tests and CLI drive the proxy cache against. It
//! does not parse or evaluate script source.
//!
//! # Example
//!
//! ```
//! use modbridge_core::{DEFAULT_GENERATOR_BINDING, ScriptContext};
//! use modbridge_script::{HeapContext, install_default_generator};
//!
//! let ctx = HeapContext::new();
//! install_default_generator(&ctx, DEFAULT_GENERATOR_BINDING);
//!
//! let generator = ctx.global_property(DEFAULT_GENERATOR_BINDING).unwrap();
//! assert!(ctx.is_callable(&generator));
//! ```

pub mod context;
pub mod generator;
pub mod value;

pub use context::{HeapContext, HeapRoot, NativeFunction};
pub use generator::{generate_module, install_default_generator};
pub use value::{ObjectHandle, ScriptValue};
