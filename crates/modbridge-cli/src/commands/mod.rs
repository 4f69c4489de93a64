//! CLI subcommands.

pub mod inspect;
pub mod resolve;
pub mod validate;
