//! UL4 tree-walking evaluator: reference implementation.
//!
//! Holds the operator semantics, the builtin function and method tables,
//! text formatting and the iterator protocol. The opcode engine reuses all
//! of them, so the two engines agree on every operation by construction.

pub mod context;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod format;
pub mod functions;
pub mod iter;
pub mod methods;
pub mod ops;

pub use context::{Context, MAX_RENDER_DEPTH};
pub use env::{Environment, Vars};
pub use error::{ErrorKind, EvalError, EvalResult};
pub use evaluator::{render, renders, Evaluator};
