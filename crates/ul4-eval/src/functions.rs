//! The closed table of builtin functions.

use crate::context::Context;
use crate::error::{EvalError, EvalResult};
use crate::format;
use crate::iter::{self, Flags, Range, ValueIter};
use crate::ops;
use std::time::{SystemTime, UNIX_EPOCH};
use ul4_types::{Color, Date, Value};

/// Fail unless `min <= args.len() <= max`.
pub(crate) fn check_args(name: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    let given = args.len();
    if (min..=max).contains(&given) {
        return Ok(());
    }
    let expected = match (min, max) {
        (1, 1) => "1 argument".to_string(),
        (n, m) if n == m => format!("{n} arguments"),
        (n, m) => format!("{n}-{m} arguments"),
    };
    Err(EvalError::Argument(format!(
        "{name}() requires {expected}, {given} given"
    )))
}

/// Exactly `N` arguments, moved out of the vector.
pub(crate) fn take_args<const N: usize>(name: &str, args: Vec<Value>) -> EvalResult<[Value; N]> {
    check_args(name, &args, N, N)?;
    <[Value; N]>::try_from(args)
        .map_err(|args| EvalError::Argument(format!("{name}() got {} arguments", args.len())))
}

pub(crate) fn expect_str<'a>(name: &str, value: &'a Value) -> EvalResult<&'a str> {
    value.as_str().ok_or_else(|| {
        EvalError::Type(format!(
            "{name}() requires a string, not '{}'",
            value.type_name()
        ))
    })
}

pub(crate) fn expect_int(name: &str, value: &Value) -> EvalResult<i64> {
    value.as_i64().ok_or_else(|| {
        EvalError::Type(format!(
            "{name}() requires an int, not '{}'",
            value.type_name()
        ))
    })
}

pub(crate) fn expect_float(name: &str, value: &Value) -> EvalResult<f64> {
    value.as_f64().ok_or_else(|| {
        EvalError::Type(format!(
            "{name}() requires a number, not '{}'",
            value.type_name()
        ))
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Iterator builtins
// ══════════════════════════════════════════════════════════════════════════════

/// Names of the builtins that produce lazy sequences.
pub fn is_iterator_function(name: &str) -> bool {
    matches!(
        name,
        "range" | "reversed" | "enumerate" | "zip" | "isfirst" | "islast" | "isfirstlast" | "enumfl"
    )
}

/// Build the lazy sequence for an iterator builtin.
pub fn iterator_function(name: &str, args: Vec<Value>) -> EvalResult<ValueIter> {
    let single = |name: &str, args: Vec<Value>| -> EvalResult<ValueIter> {
        let [source] = take_args(name, args)?;
        iter::iterate(&source)
    };
    match name {
        "range" => Ok(Box::new(Range::new(&args)?)),
        "reversed" => iter::reversed(single(name, args)?),
        "enumerate" => Ok(iter::enumerate(single(name, args)?)),
        "zip" => {
            let sources = args.iter().map(iter::iterate).collect::<EvalResult<Vec<_>>>()?;
            Ok(iter::zip(sources))
        }
        "isfirst" => Ok(iter::positions(single(name, args)?, Flags::First)),
        "islast" => Ok(iter::positions(single(name, args)?, Flags::Last)),
        "isfirstlast" => Ok(iter::positions(single(name, args)?, Flags::FirstLast)),
        "enumfl" => Ok(iter::positions(single(name, args)?, Flags::EnumFirstLast)),
        _ => Err(unknown_function(name)),
    }
}

fn unknown_function(name: &str) -> EvalError {
    EvalError::Name(format!("function named {name} unknown"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Dispatch
// ══════════════════════════════════════════════════════════════════════════════

/// Call the builtin `name`. Iterator builtins are materialized into lists
/// of at most [`iter::MAX_SEQUENCE_LEN`] items.
pub fn call_function(ctx: &mut dyn Context, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    if is_iterator_function(name) {
        return Ok(Value::List(iter::collect_bounded(iterator_function(name, args)?)?));
    }
    match name {
        "now" | "utcnow" => {
            check_args(name, &args, 0, 0)?;
            now()
        }
        "vars" => {
            check_args(name, &args, 0, 0)?;
            Ok(Value::dict(ctx.vars().clone()))
        }
        "get" => {
            check_args(name, &args, 1, 2)?;
            let key = expect_str(name, &args[0])?;
            Ok(ctx
                .vars()
                .get(key)
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or_default())
        }
        "str" => {
            check_args(name, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(|v| v.to_string()).unwrap_or_default()))
        }
        "repr" => {
            let [value] = take_args(name, args)?;
            Ok(Value::Str(value.repr()))
        }
        "int" => int(args),
        "float" => float(args),
        "bool" => {
            check_args(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_true)))
        }
        "list" => {
            check_args(name, &args, 0, 1)?;
            match args.first() {
                Some(source) => Ok(Value::List(iter::iterate(source)?.collect())),
                None => Ok(Value::List(Vec::new())),
            }
        }
        "len" => {
            let [value] = take_args(name, args)?;
            len(&value)
        }
        "type" => {
            let [value] = take_args(name, args)?;
            Ok(Value::from(value.type_name()))
        }
        "abs" => {
            let [value] = take_args(name, args)?;
            abs(&value)
        }
        "chr" => {
            let [value] = take_args(name, args)?;
            let code = expect_int(name, &value)?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| EvalError::Value("chr() arg not in range(0x110000)".to_string()))
        }
        "ord" => {
            let [value] = take_args(name, args)?;
            let text = expect_str(name, &value)?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                _ => Err(EvalError::Type(format!(
                    "ord() expected a character, but string of length {} found",
                    text.chars().count()
                ))),
            }
        }
        "hex" | "oct" | "bin" => {
            let [value] = take_args(name, args)?;
            let i = expect_int(name, &value)?;
            let sign = if i < 0 { "-" } else { "" };
            let n = i.unsigned_abs();
            Ok(Value::Str(match name {
                "hex" => format!("{sign}0x{n:x}"),
                "oct" => format!("{sign}0o{n:o}"),
                _ => format!("{sign}0b{n:b}"),
            }))
        }
        "sorted" => {
            let [source] = take_args(name, args)?;
            sorted(iter::iterate(&source)?.collect())
        }
        "xmlescape" => {
            let [value] = take_args(name, args)?;
            Ok(Value::Str(format::xmlescape(&value.to_string())))
        }
        "csv" => {
            let [value] = take_args(name, args)?;
            Ok(Value::Str(format::csv(&value)))
        }
        "json" | "asjson" => {
            let [value] = take_args(name, args)?;
            format::json(&value).map(Value::Str)
        }
        "format" => {
            let [value, spec] = take_args(name, args)?;
            let spec = expect_str(name, &spec)?;
            match value {
                Value::Date(d) => Ok(Value::Str(format::strftime(&d, spec))),
                other => Err(EvalError::Type(format!(
                    "format() requires a date, not '{}'",
                    other.type_name()
                ))),
            }
        }
        "isnone" | "isbool" | "isint" | "isfloat" | "isstr" | "isdate" | "islist" | "isdict"
        | "iscolor" | "istemplate" => {
            let [value] = take_args(name, args)?;
            Ok(Value::Bool(value.type_name() == &name[2..]))
        }
        "rgb" | "hls" | "hsv" => color(name, &args),
        _ => Err(unknown_function(name)),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Implementations
// ══════════════════════════════════════════════════════════════════════════════

fn now() -> EvalResult<Value> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default();
    Ok(Value::Date(Date::from_unix_millis(millis)?))
}

fn int(args: Vec<Value>) -> EvalResult<Value> {
    check_args("int", &args, 0, 2)?;
    let Some(value) = args.first() else {
        return Ok(Value::Int(0));
    };
    let base = args.get(1).map(|b| expect_int("int", b)).transpose()?;
    match (value, base) {
        (Value::Str(text), base) => {
            let radix = base.unwrap_or(10);
            let radix = u32::try_from(radix)
                .ok()
                .filter(|r| (2..=36).contains(r))
                .ok_or_else(|| EvalError::Value("int() base must be >= 2 and <= 36".to_string()))?;
            i64::from_str_radix(text.trim(), radix)
                .map(Value::Int)
                .map_err(|_| {
                    EvalError::Value(format!(
                        "invalid literal for int() with base {radix}: {}",
                        value.repr()
                    ))
                })
        }
        (_, Some(_)) => Err(EvalError::Type(
            "int() can't convert non-string with explicit base".to_string(),
        )),
        (Value::Bool(_) | Value::Int(_), None) => Ok(Value::Int(value.as_i64().unwrap_or_default())),
        (Value::Float(f), None) => {
            let t = f.trunc();
            if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
                Ok(Value::Int(t as i64))
            } else {
                Err(EvalError::Value(format!(
                    "cannot convert float {} to integer",
                    value.repr()
                )))
            }
        }
        (other, None) => Err(EvalError::Type(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float(args: Vec<Value>) -> EvalResult<Value> {
    check_args("float", &args, 0, 1)?;
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(text)) => text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            EvalError::Value(format!(
                "could not convert string to float: {}",
                Value::from(text.as_str()).repr()
            ))
        }),
        Some(value) => value.as_f64().map(Value::Float).ok_or_else(|| {
            EvalError::Type(format!(
                "float() argument must be a string or a number, not '{}'",
                value.type_name()
            ))
        }),
    }
}

fn len(value: &Value) -> EvalResult<Value> {
    let n = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Dict(items) => items.len(),
        other => {
            return Err(EvalError::Type(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::from(n))
}

fn abs(value: &Value) -> EvalResult<Value> {
    match value {
        Value::Bool(_) | Value::Int(_) => value
            .as_i64()
            .and_then(i64::checked_abs)
            .map(Value::Int)
            .ok_or_else(|| EvalError::Value("integer overflow".to_string())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(EvalError::Type(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn sorted(mut items: Vec<Value>) -> EvalResult<Value> {
    let mut failure = None;
    items.sort_by(|a, b| match ops::compare(a, b, "<") {
        Ok(ord) => ord.unwrap_or(std::cmp::Ordering::Equal),
        Err(err) => {
            failure.get_or_insert(err);
            std::cmp::Ordering::Equal
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(Value::List(items)),
    }
}

fn color(name: &str, args: &[Value]) -> EvalResult<Value> {
    check_args(name, args, 3, 4)?;
    let x = expect_float(name, &args[0])?;
    let y = expect_float(name, &args[1])?;
    let z = expect_float(name, &args[2])?;
    let a = match args.get(3) {
        Some(a) => expect_float(name, a)?,
        None => 1.0,
    };
    Ok(Value::Color(match name {
        "rgb" => Color::from_fractions(x, y, z, a),
        "hls" => Color::from_hls(x, y, z, a),
        _ => Color::from_hsv(x, y, z, a),
    }))
}
