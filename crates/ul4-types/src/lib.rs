//! Shared types for the UL4 runtime.
//!
//! This crate defines the value model, source locations, AST node types and
//! opcode records used by both execution engines and by the UL4ON codec.

mod color;
mod date;
mod error;
mod location;
mod value;
pub mod ast;
pub mod build;
pub mod display;
pub mod opcode;

pub use color::Color;
pub use date::Date;
pub use error::InvalidValue;
pub use location::Location;
pub use value::{Dict, Value};

/// Result type used for value construction in this crate.
pub type Result<T> = std::result::Result<T, InvalidValue>;
