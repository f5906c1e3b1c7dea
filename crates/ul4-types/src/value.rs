//! The closed set of UL4 runtime values.

use crate::ast::Template;
use crate::{Color, Date};
use indexmap::IndexMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Insertion-ordered mapping used for `Value::Dict`.
pub type Dict = IndexMap<Value, Value>;

/// A UL4 runtime value.
///
/// Values are plain data and cloned freely; templates are shared via `Arc`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(Dict),
    Date(Date),
    Color(Color),
    Template(Arc<Template>),
}

impl Value {
    /// Short lowercase kind name, as returned by the `type` function.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Date(_) => "date",
            Value::Color(_) => "color",
            Value::Template(_) => "template",
        }
    }

    /// Truthiness.
    pub fn is_true(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(items) => !items.is_empty(),
            Value::Date(_) | Value::Color(_) | Value::Template(_) => true,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// The value as a float, if it is numeric (bools count as 0 and 1).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The value as an integer, if it is a bool or an int.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Build a dict from key/value pairs, later keys overwriting earlier ones.
    pub fn dict<K, V>(items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Dict(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Int/Float equality that agrees with `Hash`: only integral floats that
/// convert exactly can equal an int.
fn int_eq_float(i: i64, f: f64) -> bool {
    float_as_exact_int(f) == Some(i)
}

fn float_as_exact_int(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => {
                int_eq_float(*i, *f)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Color(a), Value::Color(b)) => a == b,
            (Value::Template(a), Value::Template(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

// NaN breaks reflexivity; NaN dict keys are unreachable by lookup.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::None => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Value::Float(f) => match float_as_exact_int(*f) {
                Some(i) => {
                    2u8.hash(state);
                    i.hash(state);
                }
                None => {
                    3u8.hash(state);
                    f.to_bits().hash(state);
                }
            },
            Value::Str(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Value::List(items) => {
                5u8.hash(state);
                items.hash(state);
            }
            Value::Dict(items) => {
                // equality ignores order, so only the size is hashed
                6u8.hash(state);
                items.len().hash(state);
            }
            Value::Date(d) => {
                7u8.hash(state);
                d.hash(state);
            }
            Value::Color(c) => {
                8u8.hash(state);
                c.hash(state);
            }
            Value::Template(t) => {
                9u8.hash(state);
                t.name.hash(state);
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Dict> for Value {
    fn from(items: Dict) -> Self {
        Value::Dict(items)
    }
}

impl From<Date> for Value {
    fn from(d: Date) -> Self {
        Value::Date(d)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<Arc<Template>> for Value {
    fn from(t: Arc<Template>) -> Self {
        Value::Template(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::None, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_truthiness_table() {
        let falsy = [
            Value::None,
            Value::Bool(false),
            Value::Int(0),
            Value::Float(0.0),
            Value::from(""),
            Value::List(vec![]),
            Value::Dict(Dict::new()),
        ];
        for v in &falsy {
            assert!(!v.is_true(), "{v:?} should be false");
        }
        let truthy = [
            Value::Bool(true),
            Value::Int(-1),
            Value::Float(0.5),
            Value::from(" "),
            Value::List(vec![Value::None]),
            Value::dict([("a", 1)]),
            Value::Color(Color::new(0, 0, 0, 0)),
            Value::Date(Date::new(2000, 1, 1).unwrap()),
        ];
        for v in &truthy {
            assert!(v.is_true(), "{v:?} should be true");
        }
    }

    #[test]
    fn test_cross_kind_equality_is_false() {
        assert_ne!(Value::Int(1), Value::from("1"));
        assert_ne!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::None, Value::Bool(false));
        assert_ne!(Value::List(vec![]), Value::Dict(Dict::new()));
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Float(1.5));
        assert_eq!(hash_of(&Value::Int(3)), hash_of(&Value::Float(3.0)));
    }

    #[test]
    fn test_dict_equality_ignores_order() {
        let a = Value::dict([("a", 1), ("b", 2)]);
        let b = Value::dict([("b", 2), ("a", 1)]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_dict_keeps_insertion_order() {
        let Value::Dict(d) = Value::dict([("z", 1), ("a", 2), ("m", 3)]) else {
            panic!("expected dict");
        };
        let keys: Vec<_> = d.keys().cloned().collect();
        assert_eq!(keys, vec![Value::from("z"), Value::from("a"), Value::from("m")]);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::None.type_name(), "none");
        assert_eq!(Value::Float(1.0).type_name(), "float");
        assert_eq!(Value::Color(Color::rgb(0, 0, 0)).type_name(), "color");
    }
}
