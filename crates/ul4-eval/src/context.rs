use crate::env::Vars;
use crate::error::{EvalError, EvalResult};
use std::sync::Arc;
use ul4_types::ast::Template;

/// Services an execution engine offers to builtin functions and methods.
pub trait Context {
    /// The variables of the running template activation.
    fn vars(&self) -> &Vars;

    /// Render `template` with `vars` as its complete variable set and
    /// return its output fragments.
    fn render(&mut self, template: &Arc<Template>, vars: Vars) -> EvalResult<Vec<String>>;
}

/// Most templates one render may have running at once, itself included.
pub const MAX_RENDER_DEPTH: usize = 32;

/// The depth of a template rendered from one running at `depth`.
pub fn nested_depth(depth: usize) -> EvalResult<usize> {
    let next = depth + 1;
    if next >= MAX_RENDER_DEPTH {
        return Err(EvalError::RenderDepth(MAX_RENDER_DEPTH));
    }
    Ok(next)
}
