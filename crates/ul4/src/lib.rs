//! UL4 template runtime.
//!
//! Ties the runtime crates together:
//!
//! ```text
//! UL4ON text ──loads──▶ Template ──render──▶ output fragments
//!                          │
//!                          ├─ Strategy::TreeWalk  (ul4-eval)
//!                          └─ Strategy::Opcodes   (ul4-codegen)
//! ```
//!
//! Both strategies produce identical output and identical error messages for
//! the same template and variables.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use ul4_codegen::CodegenError;
pub use ul4_eval::{ErrorKind, EvalError, Vars};
pub use ul4_types::ast::{Node, NodeKind, Template};
pub use ul4_types::{ast, build, Color, Date, Dict, Location, Value};
pub use ul4on::{DecodeError, EncodeError, Registry};

/// Which engine executes a template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Walk the AST directly.
    #[default]
    #[serde(rename = "treewalk")]
    TreeWalk,
    /// Compile to register opcodes once, then run them on the register machine.
    Opcodes,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::TreeWalk, Strategy::Opcodes];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::TreeWalk => "treewalk",
            Strategy::Opcodes => "opcodes",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Any failure surfaced by this crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Ul4Error {
    /// A render failed at runtime.
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// The opcode compiler rejected the template.
    #[error(transparent)]
    Codegen(CodegenError),
    /// A UL4ON stream could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A value was too deeply nested to write as UL4ON.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl From<CodegenError> for Ul4Error {
    fn from(err: CodegenError) -> Self {
        match err {
            CodegenError::Eval(err) => Ul4Error::Eval(err),
            other => Ul4Error::Codegen(other),
        }
    }
}

impl Ul4Error {
    /// The runtime error kind, for render failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Ul4Error::Eval(err) => Some(err.kind()),
            _ => None,
        }
    }
}

pub type Ul4Result<T> = Result<T, Ul4Error>;

/// Render `template` with `vars` and return the output fragments in order.
pub fn render(template: &Template, vars: Vars, strategy: Strategy) -> Ul4Result<Vec<String>> {
    tracing::debug!(
        template = template.name.as_deref().unwrap_or("unnamed"),
        %strategy,
        vars = vars.len(),
        "render"
    );
    match strategy {
        Strategy::TreeWalk => Ok(ul4_eval::render(template, vars)?),
        Strategy::Opcodes => Ok(ul4_codegen::render(template, vars)?),
    }
}

/// [`render`] with the fragments joined into one string.
pub fn renders(template: &Template, vars: Vars, strategy: Strategy) -> Ul4Result<String> {
    Ok(render(template, vars, strategy)?.concat())
}

/// Serialize a value (templates included) to UL4ON.
pub fn dumps(value: &Value) -> Ul4Result<String> {
    Ok(ul4on::dumps(value)?)
}

pub fn loads(input: &str) -> Ul4Result<Value> {
    Ok(ul4on::loads(input)?)
}

pub fn dumps_template(template: &Arc<Template>) -> Ul4Result<String> {
    Ok(ul4on::dumps_template(template)?)
}

/// Decode a template, checking its protocol version.
pub fn loads_template(input: &str) -> Ul4Result<Arc<Template>> {
    Ok(ul4on::loads_template(input)?)
}

/// Decode a template and render it in one step.
pub fn load_and_render(input: &str, vars: Vars, strategy: Strategy) -> Ul4Result<String> {
    let template = loads_template(input)?;
    renders(&template, vars, strategy)
}
