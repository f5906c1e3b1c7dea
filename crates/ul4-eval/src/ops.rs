//! Operator semantics shared by both execution engines.
//!
//! Every operator takes its operands by reference and either produces a new
//! value or fails with a `TypeError` naming the offending kinds. Bools take
//! part in arithmetic as 0 and 1.

use crate::error::{EvalError, EvalResult};
use crate::iter::MAX_SEQUENCE_LEN;
use std::cmp::Ordering;
use ul4_types::ast::BinaryOp;
use ul4_types::Value;

/// Both operands as integers, if both are bools or ints.
fn ints(a: &Value, b: &Value) -> Option<(i64, i64)> {
    Some((a.as_i64()?, b.as_i64()?))
}

/// Both operands as floats, if both are numeric.
fn floats(a: &Value, b: &Value) -> Option<(f64, f64)> {
    Some((a.as_f64()?, b.as_f64()?))
}

fn overflow() -> EvalError {
    EvalError::Value("integer overflow".to_string())
}

fn division_by_zero() -> EvalError {
    EvalError::Value("division by zero".to_string())
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic
// ══════════════════════════════════════════════════════════════════════════════

pub fn add(a: &Value, b: &Value) -> EvalResult<Value> {
    if let Some((x, y)) = ints(a, b) {
        return x.checked_add(y).map(Value::Int).ok_or_else(overflow);
    }
    if let Some((x, y)) = floats(a, b) {
        return Ok(Value::Float(x + y));
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Value::Str(format!("{x}{y}"))),
        _ => Err(EvalError::unsupported("+", a, b)),
    }
}

pub fn sub(a: &Value, b: &Value) -> EvalResult<Value> {
    if let Some((x, y)) = ints(a, b) {
        return x.checked_sub(y).map(Value::Int).ok_or_else(overflow);
    }
    if let Some((x, y)) = floats(a, b) {
        return Ok(Value::Float(x - y));
    }
    Err(EvalError::unsupported("-", a, b))
}

fn repeat_count(count: i64) -> EvalResult<usize> {
    usize::try_from(count).map_err(|_| {
        EvalError::Value(format!("can't repeat a sequence a negative number of times ({count})"))
    })
}

/// Length of a sequence of `len` items repeated `count` times.
///
/// Results beyond [`MAX_SEQUENCE_LEN`] are refused before any allocation.
fn repeated_len(len: usize, count: usize) -> EvalResult<usize> {
    let total = len.checked_mul(count).ok_or_else(overflow)?;
    if total > MAX_SEQUENCE_LEN {
        return Err(overflow());
    }
    Ok(total)
}

pub fn mul(a: &Value, b: &Value) -> EvalResult<Value> {
    if let Some((x, y)) = ints(a, b) {
        return x.checked_mul(y).map(Value::Int).ok_or_else(overflow);
    }
    if let Some((x, y)) = floats(a, b) {
        return Ok(Value::Float(x * y));
    }
    match (a, b) {
        (Value::Str(s), n) | (n, Value::Str(s)) if n.as_i64().is_some() => {
            let count = repeat_count(n.as_i64().unwrap_or_default())?;
            repeated_len(s.len(), count)?;
            Ok(Value::Str(s.repeat(count)))
        }
        (Value::List(items), n) | (n, Value::List(items)) if n.as_i64().is_some() => {
            let count = repeat_count(n.as_i64().unwrap_or_default())?;
            let mut out = Vec::with_capacity(repeated_len(items.len(), count)?);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::List(out))
        }
        _ => Err(EvalError::unsupported("*", a, b)),
    }
}

/// `/` always produces a float.
pub fn truediv(a: &Value, b: &Value) -> EvalResult<Value> {
    let (x, y) = floats(a, b).ok_or_else(|| EvalError::unsupported("/", a, b))?;
    if y == 0.0 {
        return Err(division_by_zero());
    }
    Ok(Value::Float(x / y))
}

/// `//` rounds toward negative infinity.
pub fn floordiv(a: &Value, b: &Value) -> EvalResult<Value> {
    if let Some((x, y)) = ints(a, b) {
        if y == 0 {
            return Err(division_by_zero());
        }
        let q = x.checked_div(y).ok_or_else(overflow)?;
        let adjust = x % y != 0 && ((x < 0) != (y < 0));
        return Ok(Value::Int(if adjust { q - 1 } else { q }));
    }
    let (x, y) = floats(a, b).ok_or_else(|| EvalError::unsupported("//", a, b))?;
    if y == 0.0 {
        return Err(division_by_zero());
    }
    Ok(Value::Float((x / y).floor()))
}

/// `%` takes the sign of the divisor: `a - floor(a/b)*b`.
pub fn modulo(a: &Value, b: &Value) -> EvalResult<Value> {
    if let Some((x, y)) = ints(a, b) {
        if y == 0 {
            return Err(division_by_zero());
        }
        let r = x.checked_rem(y).ok_or_else(overflow)?;
        let adjust = r != 0 && ((r < 0) != (y < 0));
        return Ok(Value::Int(if adjust { r + y } else { r }));
    }
    let (x, y) = floats(a, b).ok_or_else(|| EvalError::unsupported("%", a, b))?;
    if y == 0.0 {
        return Err(division_by_zero());
    }
    Ok(Value::Float(x - (x / y).floor() * y))
}

pub fn neg(a: &Value) -> EvalResult<Value> {
    match a {
        Value::Bool(_) | Value::Int(_) => a
            .as_i64()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(overflow),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(EvalError::Type(format!(
            "bad operand type for unary -: '{}'",
            other.type_name()
        ))),
    }
}

pub fn not(a: &Value) -> Value {
    Value::Bool(!a.is_true())
}

// ══════════════════════════════════════════════════════════════════════════════
// Comparison
// ══════════════════════════════════════════════════════════════════════════════

/// Order two values of comparable kinds (numbers, strings, dates).
///
/// `Ok(None)` means the kinds are comparable but the values are not
/// (NaN); every ordering test is then false.
pub fn compare(a: &Value, b: &Value, symbol: &str) -> EvalResult<Option<Ordering>> {
    if let Some((x, y)) = ints(a, b) {
        return Ok(Some(x.cmp(&y)));
    }
    if let Some((x, y)) = floats(a, b) {
        return Ok(x.partial_cmp(&y));
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::Date(x), Value::Date(y)) => Ok(Some(x.cmp(y))),
        _ => Err(EvalError::Type(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub fn eq(a: &Value, b: &Value) -> Value {
    Value::Bool(a == b)
}

pub fn ne(a: &Value, b: &Value) -> Value {
    Value::Bool(a != b)
}

pub fn lt(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::Bool(compare(a, b, "<")? == Some(Ordering::Less)))
}

pub fn le(a: &Value, b: &Value) -> EvalResult<Value> {
    let ord = compare(a, b, "<=")?;
    Ok(Value::Bool(matches!(ord, Some(Ordering::Less | Ordering::Equal))))
}

pub fn gt(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(Value::Bool(compare(a, b, ">")? == Some(Ordering::Greater)))
}

pub fn ge(a: &Value, b: &Value) -> EvalResult<Value> {
    let ord = compare(a, b, ">=")?;
    Ok(Value::Bool(matches!(
        ord,
        Some(Ordering::Greater | Ordering::Equal)
    )))
}

// ══════════════════════════════════════════════════════════════════════════════
// Containment & access
// ══════════════════════════════════════════════════════════════════════════════

/// `item in container`.
pub fn contains(item: &Value, container: &Value) -> EvalResult<bool> {
    match (item, container) {
        (Value::Str(needle), Value::Str(haystack)) => Ok(haystack.contains(needle.as_str())),
        (_, Value::Str(_)) => Err(EvalError::Type(format!(
            "'in <string>' requires string as left operand, not '{}'",
            item.type_name()
        ))),
        (_, Value::List(items)) => Ok(items.contains(item)),
        (_, Value::Dict(items)) => Ok(items.contains_key(item)),
        (_, Value::Color(c)) => Ok(item
            .as_i64()
            .is_some_and(|i| [c.r, c.g, c.b, c.a].iter().any(|&ch| i64::from(ch) == i))),
        _ => Err(EvalError::Type(format!(
            "argument of type '{}' is not iterable",
            container.type_name()
        ))),
    }
}

/// Wrap a possibly negative index into `0..len`.
fn wrap_index(index: i64, len: usize, what: &str) -> EvalResult<usize> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let wrapped = if index < 0 { index + len } else { index };
    if (0..len).contains(&wrapped) {
        Ok(wrapped as usize)
    } else {
        Err(EvalError::Index(format!("{what} index {index} out of range")))
    }
}

fn index_of(index: &Value, container: &Value) -> EvalResult<i64> {
    index.as_i64().ok_or_else(|| {
        EvalError::Type(format!(
            "{} indices must be integers, not '{}'",
            container.type_name(),
            index.type_name()
        ))
    })
}

/// Named fields of the non-container kinds, reachable as `x.name` and
/// `x["name"]` alike.
fn field(container: &Value, name: &str) -> Option<Value> {
    let value = match (container, name) {
        (Value::Color(c), "r") => Value::Int(i64::from(c.r)),
        (Value::Color(c), "g") => Value::Int(i64::from(c.g)),
        (Value::Color(c), "b") => Value::Int(i64::from(c.b)),
        (Value::Color(c), "a") => Value::Int(i64::from(c.a)),
        (Value::Date(d), "year") => Value::Int(i64::from(d.year())),
        (Value::Date(d), "month") => Value::Int(i64::from(d.month())),
        (Value::Date(d), "day") => Value::Int(i64::from(d.day())),
        (Value::Date(d), "hour") => Value::Int(i64::from(d.hour())),
        (Value::Date(d), "minute") => Value::Int(i64::from(d.minute())),
        (Value::Date(d), "second") => Value::Int(i64::from(d.second())),
        (Value::Date(d), "microsecond") => Value::Int(i64::from(d.microsecond())),
        (Value::Template(t), "name") => t.name.clone().map(Value::Str).unwrap_or_default(),
        (Value::Template(t), "source") => Value::Str(t.source.to_string()),
        (Value::Template(t), "startdelim") => Value::Str(t.startdelim.clone()),
        (Value::Template(t), "enddelim") => Value::Str(t.enddelim.clone()),
        _ => return None,
    };
    Some(value)
}

fn no_field(container: &Value, name: &str) -> EvalError {
    EvalError::Type(format!(
        "'{}' object has no attribute {}",
        container.type_name(),
        Value::from(name).repr()
    ))
}

/// `container[index]`.
pub fn getitem(container: &Value, index: &Value) -> EvalResult<Value> {
    match (container, index) {
        (Value::Dict(items), _) => items
            .get(index)
            .cloned()
            .ok_or_else(|| EvalError::Key(index.repr())),
        (Value::Color(_) | Value::Date(_) | Value::Template(_), Value::Str(name)) => {
            field(container, name).ok_or_else(|| no_field(container, name))
        }
        (Value::Str(s), _) => {
            let i = index_of(index, container)?;
            let len = s.chars().count();
            let pos = wrap_index(i, len, "string")?;
            Ok(Value::Str(
                s.chars().nth(pos).map(String::from).unwrap_or_default(),
            ))
        }
        (Value::List(items), _) => {
            let i = index_of(index, container)?;
            let pos = wrap_index(i, items.len(), "list")?;
            Ok(items[pos].clone())
        }
        (Value::Color(c), _) => {
            let i = index_of(index, container)?;
            let pos = wrap_index(i, 4, "color")?;
            Ok(Value::Int(i64::from([c.r, c.g, c.b, c.a][pos])))
        }
        (other, _) => Err(EvalError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Resolve slice bounds against `len`; negative bounds count from the end
/// and everything is clamped into `0..=len`.
fn slice_bounds(
    start: Option<&Value>,
    stop: Option<&Value>,
    len: usize,
    container: &Value,
) -> EvalResult<(usize, usize)> {
    let ilen = i64::try_from(len).unwrap_or(i64::MAX);
    let resolve = |bound: Option<&Value>, default: i64| -> EvalResult<i64> {
        match bound {
            None | Some(Value::None) => Ok(default),
            Some(v) => {
                let i = index_of(v, container)?;
                let i = if i < 0 { i.saturating_add(ilen) } else { i };
                Ok(i.clamp(0, ilen))
            }
        }
    };
    let start = resolve(start, 0)? as usize;
    let stop = resolve(stop, ilen)? as usize;
    Ok((start, stop.max(start)))
}

/// `container[start:stop]` with either bound optional.
pub fn getslice(container: &Value, start: Option<&Value>, stop: Option<&Value>) -> EvalResult<Value> {
    match container {
        Value::Str(s) => {
            let len = s.chars().count();
            let (from, to) = slice_bounds(start, stop, len, container)?;
            Ok(Value::Str(s.chars().skip(from).take(to - from).collect()))
        }
        Value::List(items) => {
            let (from, to) = slice_bounds(start, stop, items.len(), container)?;
            Ok(Value::List(items[from..to].to_vec()))
        }
        other => Err(EvalError::Type(format!(
            "'{}' object is not sliceable",
            other.type_name()
        ))),
    }
}

/// `obj.name`: the same lookup as `obj["name"]`.
pub fn getattr(obj: &Value, name: &str) -> EvalResult<Value> {
    getitem(obj, &Value::from(name))
}

/// Apply a non-short-circuiting binary operator.
///
/// `And`/`Or` are included for completeness and take both operands already
/// evaluated; engines short-circuit before calling this.
pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> EvalResult<Value> {
    match op {
        BinaryOp::GetItem => getitem(a, b),
        BinaryOp::Eq => Ok(eq(a, b)),
        BinaryOp::Ne => Ok(ne(a, b)),
        BinaryOp::Lt => lt(a, b),
        BinaryOp::Le => le(a, b),
        BinaryOp::Gt => gt(a, b),
        BinaryOp::Ge => ge(a, b),
        BinaryOp::Contains => contains(a, b).map(Value::Bool),
        BinaryOp::NotContains => contains(a, b).map(|found| Value::Bool(!found)),
        BinaryOp::Add => add(a, b),
        BinaryOp::Sub => sub(a, b),
        BinaryOp::Mul => mul(a, b),
        BinaryOp::FloorDiv => floordiv(a, b),
        BinaryOp::TrueDiv => truediv(a, b),
        BinaryOp::Mod => modulo(a, b),
        BinaryOp::And => Ok(if a.is_true() { b.clone() } else { a.clone() }),
        BinaryOp::Or => Ok(if a.is_true() { a.clone() } else { b.clone() }),
    }
}
