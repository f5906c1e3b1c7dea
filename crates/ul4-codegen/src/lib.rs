//! UL4 register-machine engine: compiles a template AST to opcodes and runs them.
//!
//! # Architecture
//!
//! [`compile`] flattens a [`Template`](ul4_types::ast::Template) into one
//! [`Program`](ul4_types::opcode::Program): a linear opcode stream over a
//! register bank sized by the compiler plus the variable environment. Block opcodes (`for`, `if`, `else`, `def`)
//! carry resolved jump targets.
//!
//! The [`Machine`] executes a program against one set of variables. Nested
//! `def` templates run on the same stream, narrowed to their own span.
//! Operators, builtins and methods are shared with the tree walker in
//! `ul4-eval`, so both engines produce identical output and errors.
//!
//! Compiled programs are cached on the template; the first compilation to
//! finish wins.

pub mod compiler;
pub mod error;
pub mod machine;

pub use compiler::compile;
pub use error::{CodegenError, CodegenResult};
pub use machine::{program, render, renders, Machine};
