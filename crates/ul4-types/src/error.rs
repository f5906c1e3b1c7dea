use thiserror::Error;

/// A value could not be constructed from the given components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidValue {
    #[error("{field} {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("invalid {kind} literal {text:?}")]
    Malformed { kind: &'static str, text: String },
}

impl InvalidValue {
    pub(crate) fn out_of_range(field: &'static str, value: impl Into<i64>) -> Self {
        Self::OutOfRange {
            field,
            value: value.into(),
        }
    }
}
