//! UL4ON: a compact text serialization for UL4 values and templates.
//!
//! Every item starts with a one-character type tag. Uppercase tags register
//! the item so later occurrences can be written as `^<index>|`, which keeps
//! shared strings, locations and templates from being repeated. Objects
//! carry a type name looked up in a [`Registry`].
//!
//! ```text
//! n            none           bT / bF       bool
//! i42|         int            f0.5|         float
//! S5|hello     string         c112233ff     color
//! t20240101000000000 date     l ... ]       list
//! d ... }      dict           O<name> ... ) object
//! ^3|          back-reference
//! ```

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod registry;

pub use decoder::{Decoder, Item};
pub use encoder::Encoder;
pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
pub use registry::{Loader, Object, Registry, NAMESPACE, VERSION};

use std::sync::Arc;
use ul4_types::ast::Template;
use ul4_types::Value;

/// How many lists, dicts and objects may be open at once, both when
/// writing and when reading a stream.
pub const MAX_DEPTH: usize = 256;

/// Serialize `value` with the default registry.
pub fn dumps(value: &Value) -> EncodeResult<String> {
    dumps_with(value, &Registry::new())
}

pub fn dumps_with(value: &Value, registry: &Registry) -> EncodeResult<String> {
    let mut encoder = Encoder::new(registry);
    encoder.dump_value(value)?;
    Ok(encoder.finish())
}

/// Deserialize one value; anything but whitespace after it is an error.
pub fn loads(input: &str) -> DecodeResult<Value> {
    loads_with(input, &Registry::new())
}

pub fn loads_with(input: &str, registry: &Registry) -> DecodeResult<Value> {
    let mut decoder = Decoder::new(input, registry);
    let value = decoder.load_value()?;
    decoder.finish()?;
    Ok(value)
}

pub fn dumps_template(template: &Arc<Template>) -> EncodeResult<String> {
    let registry = Registry::new();
    let mut encoder = Encoder::new(&registry);
    encoder.dump_template(template)?;
    Ok(encoder.finish())
}

/// Deserialize a stream that must hold a template.
pub fn loads_template(input: &str) -> DecodeResult<Arc<Template>> {
    let registry = Registry::new();
    let mut decoder = Decoder::new(input, &registry);
    let template = match decoder.load_object()? {
        Object::Template(template) => template,
        other => return Err(decoder.unexpected("template", other.name())),
    };
    decoder.finish()?;
    Ok(template)
}
