//! quest-core: Shared types for the quest engine and its adapters
//!
//! This crate contains the quest, completion and location types that are
//! persisted locally or sent over the wire.

pub mod errors;
pub mod types;
pub mod validation;

pub use errors::*;
pub use types::*;
pub use validation::*;
