//! The closed table of methods on strings, dicts, dates, colors and templates.

use crate::context::Context;
use crate::env::Vars;
use crate::error::{EvalError, EvalResult};
use crate::format;
use crate::functions::{check_args, expect_float, expect_int, expect_str, take_args};
use crate::iter;
use std::sync::Arc;
use ul4_types::ast::Template;
use ul4_types::{Color, Date, Dict, Value};

fn unknown_method(name: &str) -> EvalError {
    EvalError::Name(format!("method named {name} unknown"))
}

/// Call `obj.name(*args)`.
pub fn call_method(
    ctx: &mut dyn Context,
    obj: &Value,
    name: &str,
    args: Vec<Value>,
) -> EvalResult<Value> {
    match obj {
        Value::Str(s) => str_method(s, name, args),
        Value::Dict(items) => dict_method(items, name, args),
        Value::Date(d) => date_method(d, name, args),
        Value::Color(c) => color_method(*c, name, args),
        Value::Template(t) if name == "render" => {
            if !args.is_empty() {
                return Err(EvalError::Argument(
                    "render() does not accept positional arguments".to_string(),
                ));
            }
            render(ctx, t, Vars::new())
        }
        _ => Err(unknown_method(name)),
    }
}

/// Call `obj.name(**kwargs)`. Only `template.render` takes keywords.
pub fn call_method_keywords(
    ctx: &mut dyn Context,
    obj: &Value,
    name: &str,
    kwargs: Vars,
) -> EvalResult<Value> {
    match obj {
        Value::Template(t) if name == "render" => render(ctx, t, kwargs),
        _ if kwargs.is_empty() => call_method(ctx, obj, name, Vec::new()),
        _ => Err(EvalError::Argument(format!(
            "{name}() does not accept keyword arguments"
        ))),
    }
}

fn render(ctx: &mut dyn Context, template: &Arc<Template>, vars: Vars) -> EvalResult<Value> {
    Ok(Value::Str(ctx.render(template, vars)?.concat()))
}

// ══════════════════════════════════════════════════════════════════════════════
// Strings
// ══════════════════════════════════════════════════════════════════════════════

fn str_method(s: &str, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    match name {
        "strip" | "lstrip" | "rstrip" => {
            check_args(name, &args, 0, 1)?;
            let chars = optional_str(name, args.first())?;
            let matcher = |c: char| match chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            Ok(Value::from(out))
        }
        "split" | "rsplit" => {
            check_args(name, &args, 0, 2)?;
            let sep = optional_str(name, args.first())?;
            let count = match args.get(1) {
                Some(Value::None) | None => None,
                Some(v) => usize::try_from(expect_int(name, v)?).ok(),
            };
            let parts = match sep {
                Some("") => return Err(EvalError::Value("empty separator".to_string())),
                Some(sep) => split_on(s, sep, count, name == "rsplit"),
                None => split_whitespace(s, count, name == "rsplit"),
            };
            Ok(Value::List(parts.into_iter().map(Value::Str).collect()))
        }
        "replace" => {
            check_args(name, &args, 2, 3)?;
            let old = expect_str(name, &args[0])?;
            let new = expect_str(name, &args[1])?;
            let out = match args.get(2) {
                Some(count) => match usize::try_from(expect_int(name, count)?) {
                    Ok(n) => s.replacen(old, new, n),
                    Err(_) => s.replace(old, new),
                },
                None => s.replace(old, new),
            };
            Ok(Value::Str(out))
        }
        "find" | "rfind" => {
            check_args(name, &args, 1, 3)?;
            let sub = expect_str(name, &args[0])?;
            let found = find(s, sub, args.get(1), args.get(2), name == "rfind")?;
            Ok(Value::Int(found.map_or(-1, |i| i64::try_from(i).unwrap_or(-1))))
        }
        "lower" => {
            check_args(name, &args, 0, 0)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "upper" => {
            check_args(name, &args, 0, 0)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "capitalize" => {
            check_args(name, &args, 0, 0)?;
            let mut chars = s.chars();
            Ok(Value::Str(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            }))
        }
        "startswith" => {
            let [prefix] = take_args(name, args)?;
            Ok(Value::Bool(s.starts_with(expect_str(name, &prefix)?)))
        }
        "endswith" => {
            let [suffix] = take_args(name, args)?;
            Ok(Value::Bool(s.ends_with(expect_str(name, &suffix)?)))
        }
        "join" => {
            let [items] = take_args(name, args)?;
            let parts = iter::iterate(&items)?
                .map(|item| match item {
                    Value::Str(part) => Ok(part),
                    other => Err(EvalError::Type(format!(
                        "join() requires strings, not '{}'",
                        other.type_name()
                    ))),
                })
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Str(parts.join(s)))
        }
        _ => Err(unknown_method(name)),
    }
}

fn optional_str<'a>(name: &str, value: Option<&'a Value>) -> EvalResult<Option<&'a str>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => expect_str(name, v).map(Some),
    }
}

/// Split on `sep` at most `count` times, from the right when `reverse`.
fn split_on(s: &str, sep: &str, count: Option<usize>, reverse: bool) -> Vec<String> {
    match (count, reverse) {
        (None, _) => s.split(sep).map(str::to_string).collect(),
        (Some(n), false) => s.splitn(n + 1, sep).map(str::to_string).collect(),
        (Some(n), true) => {
            let mut parts: Vec<String> = s.rsplitn(n + 1, sep).map(str::to_string).collect();
            parts.reverse();
            parts
        }
    }
}

/// Split on runs of whitespace; leading and trailing whitespace is dropped,
/// except that once `count` splits happened the remainder is kept as is.
fn split_whitespace(s: &str, count: Option<usize>, reverse: bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = if reverse { s.trim_end() } else { s.trim_start() };
    while !rest.is_empty() {
        if count.is_some_and(|n| parts.len() >= n) {
            parts.push(rest.to_string());
            break;
        }
        if reverse {
            match rest.rfind(char::is_whitespace) {
                Some(pos) => {
                    let ws = rest[pos..].chars().next().map_or(1, char::len_utf8);
                    parts.push(rest[pos + ws..].to_string());
                    rest = rest[..pos].trim_end();
                }
                None => {
                    parts.push(rest.to_string());
                    break;
                }
            }
        } else {
            match rest.find(char::is_whitespace) {
                Some(pos) => {
                    parts.push(rest[..pos].to_string());
                    rest = rest[pos..].trim_start();
                }
                None => {
                    parts.push(rest.to_string());
                    break;
                }
            }
        }
    }
    if reverse {
        parts.reverse();
    }
    parts
}

/// Character index of `sub` within `s[start:stop]`.
fn find(
    s: &str,
    sub: &str,
    start: Option<&Value>,
    stop: Option<&Value>,
    reverse: bool,
) -> EvalResult<Option<usize>> {
    let chars: Vec<char> = s.chars().collect();
    let len = i64::try_from(chars.len()).unwrap_or(i64::MAX);
    let bound = |v: Option<&Value>, default: i64| -> EvalResult<usize> {
        let i = match v {
            None | Some(Value::None) => default,
            Some(v) => expect_int("find", v)?,
        };
        let i = if i < 0 { i.saturating_add(len) } else { i };
        Ok(usize::try_from(i.clamp(0, len)).unwrap_or_default())
    };
    let from = bound(start, 0)?;
    let to = bound(stop, len)?;
    if from > to {
        return Ok(None);
    }
    let window: String = chars[from..to].iter().collect();
    let byte_pos = if reverse { window.rfind(sub) } else { window.find(sub) };
    Ok(byte_pos.map(|pos| from + window[..pos].chars().count()))
}

// ══════════════════════════════════════════════════════════════════════════════
// Dicts, dates and colors
// ══════════════════════════════════════════════════════════════════════════════

fn dict_method(items: &Dict, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    match name {
        "get" => {
            check_args(name, &args, 1, 2)?;
            Ok(items
                .get(&args[0])
                .or_else(|| args.get(1))
                .cloned()
                .unwrap_or_default())
        }
        "items" => {
            check_args(name, &args, 0, 0)?;
            Ok(Value::List(
                items
                    .iter()
                    .map(|(k, v)| Value::List(vec![k.clone(), v.clone()]))
                    .collect(),
            ))
        }
        _ => Err(unknown_method(name)),
    }
}

fn date_method(d: &Date, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    if name == "format" {
        let [spec] = take_args(name, args)?;
        return Ok(Value::Str(format::strftime(d, expect_str(name, &spec)?)));
    }
    check_args(name, &args, 0, 0)?;
    Ok(match name {
        "isoformat" => Value::Str(format::isoformat(d)),
        "mimeformat" => Value::Str(format::mimeformat(d)),
        "year" => Value::Int(i64::from(d.year())),
        "month" => Value::Int(i64::from(d.month())),
        "day" => Value::Int(i64::from(d.day())),
        "hour" => Value::Int(i64::from(d.hour())),
        "minute" => Value::Int(i64::from(d.minute())),
        "second" => Value::Int(i64::from(d.second())),
        "microsecond" => Value::Int(i64::from(d.microsecond())),
        "weekday" => Value::Int(i64::from(d.weekday())),
        "yearday" => Value::Int(i64::from(d.yearday())),
        _ => return Err(unknown_method(name)),
    })
}

fn floats(values: &[f64]) -> Value {
    Value::List(values.iter().copied().map(Value::Float).collect())
}

fn color_method(c: Color, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    match name {
        "witha" => {
            let [a] = take_args(name, args)?;
            let a = expect_int(name, &a)?;
            let a = u8::try_from(a)
                .map_err(|_| EvalError::Value(format!("witha() alpha {a} out of range")))?;
            return Ok(Value::Color(c.witha(a)));
        }
        "withlum" => {
            let [lum] = take_args(name, args)?;
            return Ok(Value::Color(c.withlum(expect_float(name, &lum)?)));
        }
        _ => check_args(name, &args, 0, 0)?,
    }
    Ok(match name {
        "r" => Value::Int(i64::from(c.r)),
        "g" => Value::Int(i64::from(c.g)),
        "b" => Value::Int(i64::from(c.b)),
        "a" => Value::Int(i64::from(c.a)),
        "lum" => Value::Float(c.lum()),
        "hls" => {
            let (h, l, s) = c.hls();
            floats(&[h, l, s])
        }
        "hlsa" => {
            let (h, l, s, a) = c.hlsa();
            floats(&[h, l, s, a])
        }
        "hsv" => {
            let (h, s, v) = c.hsv();
            floats(&[h, s, v])
        }
        "hsva" => {
            let (h, s, v, a) = c.hsva();
            floats(&[h, s, v, a])
        }
        _ => return Err(unknown_method(name)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        vars: Vars,
    }

    impl Context for Echo {
        fn vars(&self) -> &Vars {
            &self.vars
        }

        fn render(&mut self, template: &Arc<Template>, vars: Vars) -> EvalResult<Vec<String>> {
            let mut out = vec![template.name.clone().unwrap_or_default()];
            out.extend(vars.iter().map(|(k, v)| format!(" {k}={v}")));
            Ok(out)
        }
    }

    fn call(obj: Value, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        call_method(&mut Echo { vars: Vars::new() }, &obj, name, args)
    }

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    fn strs(items: &[&str]) -> Value {
        Value::List(items.iter().map(|&t| s(t)).collect())
    }

    #[test]
    fn test_strip_family() {
        assert_eq!(call(s("  x  "), "strip", vec![]).unwrap(), s("x"));
        assert_eq!(call(s("  x  "), "lstrip", vec![]).unwrap(), s("x  "));
        assert_eq!(call(s("  x  "), "rstrip", vec![]).unwrap(), s("  x"));
        assert_eq!(call(s("xxaxx"), "strip", vec![s("x")]).unwrap(), s("a"));
    }

    #[test]
    fn test_split_whitespace() {
        assert_eq!(call(s(" a  b c "), "split", vec![]).unwrap(), strs(&["a", "b", "c"]));
        assert_eq!(
            call(s(" a  b c "), "split", vec![Value::None, Value::Int(1)]).unwrap(),
            strs(&["a", "b c "])
        );
        assert_eq!(
            call(s(" a  b c "), "rsplit", vec![Value::None, Value::Int(1)]).unwrap(),
            strs(&[" a  b", "c"])
        );
        assert_eq!(call(s("   "), "split", vec![]).unwrap(), strs(&[]));
    }

    #[test]
    fn test_split_on_separator() {
        assert_eq!(call(s("a,b,,c"), "split", vec![s(",")]).unwrap(), strs(&["a", "b", "", "c"]));
        assert_eq!(
            call(s("a,b,c"), "split", vec![s(","), Value::Int(1)]).unwrap(),
            strs(&["a", "b,c"])
        );
        assert_eq!(
            call(s("a,b,c"), "rsplit", vec![s(","), Value::Int(1)]).unwrap(),
            strs(&["a,b", "c"])
        );
        assert!(matches!(call(s("a"), "split", vec![s("")]), Err(EvalError::Value(_))));
    }

    #[test]
    fn test_replace_and_case() {
        assert_eq!(call(s("aaa"), "replace", vec![s("a"), s("b")]).unwrap(), s("bbb"));
        assert_eq!(
            call(s("aaa"), "replace", vec![s("a"), s("b"), Value::Int(2)]).unwrap(),
            s("bba")
        );
        assert_eq!(call(s("gURKe"), "capitalize", vec![]).unwrap(), s("Gurke"));
        assert_eq!(call(s("Ab"), "upper", vec![]).unwrap(), s("AB"));
        assert_eq!(call(s("Ab"), "lower", vec![]).unwrap(), s("ab"));
    }

    #[test]
    fn test_find_uses_char_positions() {
        assert_eq!(call(s("äbcabc"), "find", vec![s("bc")]).unwrap(), Value::Int(1));
        assert_eq!(call(s("äbcabc"), "rfind", vec![s("bc")]).unwrap(), Value::Int(4));
        assert_eq!(call(s("äbcabc"), "find", vec![s("bc"), Value::Int(2)]).unwrap(), Value::Int(4));
        assert_eq!(
            call(s("abcabc"), "find", vec![s("bc"), Value::Int(0), Value::Int(2)]).unwrap(),
            Value::Int(-1)
        );
        assert_eq!(call(s("abc"), "find", vec![s("x")]).unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_startswith_endswith_join() {
        assert_eq!(call(s("abc"), "startswith", vec![s("ab")]).unwrap(), Value::Bool(true));
        assert_eq!(call(s("abc"), "endswith", vec![s("ab")]).unwrap(), Value::Bool(false));
        assert_eq!(call(s(", "), "join", vec![strs(&["a", "b"])]).unwrap(), s("a, b"));
        assert_eq!(call(s("-"), "join", vec![s("abc")]).unwrap(), s("a-b-c"));
        assert!(matches!(
            call(s(","), "join", vec![Value::List(vec![Value::Int(1)])]),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn test_dict_methods() {
        let d = Value::dict([("a", 1)]);
        assert_eq!(call(d.clone(), "get", vec![s("a")]).unwrap(), Value::Int(1));
        assert_eq!(call(d.clone(), "get", vec![s("b")]).unwrap(), Value::None);
        assert_eq!(call(d.clone(), "get", vec![s("b"), Value::Int(2)]).unwrap(), Value::Int(2));
        assert_eq!(
            call(d, "items", vec![]).unwrap(),
            Value::List(vec![Value::List(vec![s("a"), Value::Int(1)])])
        );
    }

    #[test]
    fn test_date_methods() {
        let d = Value::Date(Date::with_time(2012, 10, 6, 12, 34, 56, 789).unwrap());
        assert_eq!(call(d.clone(), "year", vec![]).unwrap(), Value::Int(2012));
        assert_eq!(call(d.clone(), "microsecond", vec![]).unwrap(), Value::Int(789000));
        assert_eq!(call(d.clone(), "weekday", vec![]).unwrap(), Value::Int(5));
        assert_eq!(call(d.clone(), "yearday", vec![]).unwrap(), Value::Int(280));
        assert_eq!(call(d.clone(), "format", vec![s("%Y/%m")]).unwrap(), s("2012/10"));
        assert_eq!(
            call(d, "isoformat", vec![]).unwrap(),
            s("2012-10-06T12:34:56.789000")
        );
    }

    #[test]
    fn test_color_methods() {
        let c = Value::Color(Color::new(255, 0, 0, 255));
        assert_eq!(call(c.clone(), "r", vec![]).unwrap(), Value::Int(255));
        assert_eq!(call(c.clone(), "lum", vec![]).unwrap(), Value::Float(0.5));
        assert_eq!(
            call(c.clone(), "hls", vec![]).unwrap(),
            Value::List(vec![Value::Float(0.0), Value::Float(0.5), Value::Float(1.0)])
        );
        assert_eq!(
            call(c.clone(), "witha", vec![Value::Int(0x80)]).unwrap(),
            Value::Color(Color::new(255, 0, 0, 0x80))
        );
        assert!(matches!(call(c, "witha", vec![Value::Int(256)]), Err(EvalError::Value(_))));
    }

    #[test]
    fn test_template_render_method() {
        let t = Value::Template(Arc::new(Template::new("", Some("t"), vec![])));
        let mut ctx = Echo { vars: Vars::new() };
        let mut kwargs = Vars::new();
        kwargs.insert("x".to_string(), Value::Int(1));
        assert_eq!(
            call_method_keywords(&mut ctx, &t, "render", kwargs).unwrap(),
            s("t x=1")
        );
        assert_eq!(call_method(&mut ctx, &t, "render", vec![]).unwrap(), s("t"));
        assert!(matches!(
            call_method(&mut ctx, &t, "render", vec![Value::Int(1)]),
            Err(EvalError::Argument(_))
        ));
    }

    #[test]
    fn test_unknown_method_is_name_error() {
        let err = call(Value::Int(1), "upper", vec![]).unwrap_err();
        assert_eq!(err, EvalError::Name("method named upper unknown".into()));
        assert!(matches!(call(s("x"), "frobnicate", vec![]), Err(EvalError::Name(_))));
    }
}
