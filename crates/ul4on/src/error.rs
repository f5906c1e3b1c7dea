//! UL4ON encode and decode errors.

use thiserror::Error;

/// Errors raised while reading a UL4ON stream. Every variant that concerns
/// the stream itself names the byte position where decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The stream ended in the middle of a value.
    #[error("broken UL4ON stream: unexpected end of data at position {position}")]
    UnexpectedEnd { position: usize },

    /// A type tag that starts no known kind of value.
    #[error("broken UL4ON stream: unknown type tag {tag:?} at position {position}")]
    UnknownTag { tag: char, position: usize },

    /// An object whose type name has no loader in the registry.
    #[error("can't decode object of unknown type {name:?} at position {position}")]
    UnknownType { name: String, position: usize },

    /// A payload that does not parse as the kind its tag announced.
    #[error("broken UL4ON stream: invalid {what} {text:?} at position {position}")]
    Malformed {
        what: &'static str,
        text: String,
        position: usize,
    },

    /// A decoded item of the wrong kind in a typed field.
    #[error("broken UL4ON stream: expected {expected}, found {found} at position {position}")]
    Unexpected {
        expected: &'static str,
        found: &'static str,
        position: usize,
    },

    /// A back-reference to an index that was never registered or is
    /// still being loaded.
    #[error("broken UL4ON stream: invalid back-reference ^{index} at position {position}")]
    BadReference { index: usize, position: usize },

    /// A template dumped by a different protocol version.
    #[error("invalid UL4ON version: expected {expected:?}, found {found:?}")]
    VersionMismatch { expected: String, found: String },

    /// Data after the end of the first complete value.
    #[error("broken UL4ON stream: trailing data at position {position}")]
    TrailingData { position: usize },

    /// Lists, dicts and objects nested deeper than the decoder follows.
    #[error("broken UL4ON stream: nesting deeper than {limit} levels at position {position}")]
    TooDeep { limit: usize, position: usize },
}

/// Result alias for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors raised while writing a UL4ON stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A value or template nested deeper than a decoder would accept.
    #[error("can't encode UL4ON: nesting deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Result alias for encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;
