//! Runtime error types for UL4 execution.

use serde::Serialize;
use thiserror::Error;
use ul4_types::{InvalidValue, Location};

/// The kind of a runtime failure, independent of where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Type,
    Value,
    Index,
    Key,
    Name,
    Argument,
    LoopControl,
    Recursion,
}

/// Evaluation error raised by operators, builtins and both engines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Operand kinds are incompatible with the operation.
    #[error("TypeError: {0}")]
    Type(String),
    /// Operand kinds fit, but the value does not (negative repeat count, ...).
    #[error("ValueError: {0}")]
    Value(String),
    /// Sequence index out of range.
    #[error("IndexError: {0}")]
    Index(String),
    /// Missing dict key.
    #[error("KeyError: {0}")]
    Key(String),
    /// Unknown variable, function or method.
    #[error("NameError: {0}")]
    Name(String),
    /// Wrong number or shape of call arguments.
    #[error("ArgumentError: {0}")]
    Argument(String),
    /// `break`/`continue` reached outside of any loop.
    #[error("{0} outside of loop")]
    LoopControl(&'static str),
    /// Templates rendering templates nested deeper than the given limit.
    #[error("RecursionError: maximum render depth of {0} exceeded")]
    RenderDepth(usize),
    /// The innermost failure, decorated with the tag that raised it.
    #[error("{source} in {location}")]
    Located {
        location: String,
        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Type(_) => ErrorKind::Type,
            Self::Value(_) => ErrorKind::Value,
            Self::Index(_) => ErrorKind::Index,
            Self::Key(_) => ErrorKind::Key,
            Self::Name(_) => ErrorKind::Name,
            Self::Argument(_) => ErrorKind::Argument,
            Self::LoopControl(_) => ErrorKind::LoopControl,
            Self::RenderDepth(_) => ErrorKind::Recursion,
            Self::Located { source, .. } => source.kind(),
        }
    }

    /// The undecorated error.
    pub fn root(&self) -> &EvalError {
        match self {
            Self::Located { source, .. } => source.root(),
            other => other,
        }
    }

    /// Attach `location` unless a location is already attached.
    pub fn at(self, location: &Location) -> Self {
        match self {
            Self::Located { .. } => self,
            other => Self::Located {
                location: location.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn unsupported(op: &str, a: &ul4_types::Value, b: &ul4_types::Value) -> Self {
        Self::Type(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op,
            a.type_name(),
            b.type_name()
        ))
    }
}

impl From<InvalidValue> for EvalError {
    fn from(err: InvalidValue) -> Self {
        Self::Value(err.to_string())
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_located_keeps_innermost_location() {
        let inner = Location::for_tag("print", "x[5]");
        let outer = Location::for_tag("for", "y in z");
        let err = EvalError::Index("list index 5 out of range".to_string())
            .at(&inner)
            .at(&outer);
        assert_eq!(err.kind(), ErrorKind::Index);
        assert_eq!(
            err.to_string(),
            "IndexError: list index 5 out of range in '<?print x[5]?>' at 1 (line 1, col 1)"
        );
        assert!(matches!(err.root(), EvalError::Index(_)));
    }
}
