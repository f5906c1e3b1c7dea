//! Codegen error types.

use thiserror::Error;
use ul4_eval::EvalError;

/// Errors raised while compiling a template to opcodes or running them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// A runtime failure of the compiled program.
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// The template needs more registers than the machine has.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// An opcode stream that the compiler could not have produced.
    #[error("internal codegen error: {0}")]
    Internal(String),
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Nested renders report through the evaluator's error type; compile
/// failures keep their message.
impl From<CodegenError> for EvalError {
    fn from(err: CodegenError) -> Self {
        match err {
            CodegenError::Eval(err) => err,
            other => EvalError::Value(other.to_string()),
        }
    }
}
