//! `str` and `repr` renderings of values.
//!
//! `Display` for `Value` is the `str()` rendering used by `print`;
//! `Value::repr()` is the literal-like rendering used inside containers
//! and by canonical AST formatting.

use crate::{Color, Date, Value};
use std::fmt::{self, Write};

impl Value {
    /// The literal-like rendering, e.g. strings quoted.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = write_repr(&mut out, self);
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Str(s) => f.write_str(s),
            Value::Date(d) => f.write_str(&date_str(d)),
            Value::Color(c) => f.write_str(&color_str(*c)),
            other => write_repr(f, other),
        }
    }
}

fn write_repr(out: &mut impl Write, value: &Value) -> fmt::Result {
    match value {
        Value::None => out.write_str("None"),
        Value::Bool(true) => out.write_str("True"),
        Value::Bool(false) => out.write_str("False"),
        Value::Int(i) => write!(out, "{i}"),
        Value::Float(f) => out.write_str(&float_repr(*f)),
        Value::Str(s) => out.write_str(&str_repr(s)),
        Value::Date(d) => write!(out, "@({})", date_repr_body(d)),
        Value::Color(c) => out.write_str(&color_repr(*c)),
        Value::List(items) => {
            out.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i != 0 {
                    out.write_str(", ")?;
                }
                write_repr(out, item)?;
            }
            out.write_char(']')
        }
        Value::Dict(items) => {
            out.write_char('{')?;
            for (i, (key, item)) in items.iter().enumerate() {
                if i != 0 {
                    out.write_str(", ")?;
                }
                write_repr(out, key)?;
                out.write_str(": ")?;
                write_repr(out, item)?;
            }
            out.write_char('}')
        }
        Value::Template(t) => match &t.name {
            Some(name) => write!(out, "<template {name}>"),
            None => out.write_str("<template>"),
        },
    }
}

/// Shortest round-trip float text, integral values keep a trailing `.0`.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let text = f.to_string();
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        text + ".0"
    }
}

/// Double-quoted string literal.
pub fn str_repr(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            ' '..='~' => out.push(c),
            _ => {
                let code = u32::from(c);
                let _ = if code <= 0xff {
                    write!(out, "\\x{code:02x}")
                } else if code <= 0xffff {
                    write!(out, "\\u{code:04x}")
                } else {
                    write!(out, "\\U{code:08x}")
                };
            }
        }
    }
    out.push('"');
    out
}

fn date_time_part(d: &Date, separator: char) -> String {
    let mut out = format!(
        "{:04}-{:02}-{:02}",
        d.year(),
        d.month(),
        d.day()
    );
    if d.has_time() {
        let _ = write!(
            out,
            "{separator}{:02}:{:02}:{:02}",
            d.hour(),
            d.minute(),
            d.second()
        );
        if d.millisecond() != 0 {
            let _ = write!(out, ".{:06}", d.microsecond());
        }
    }
    out
}

/// `YYYY-MM-DD[ HH:MM:SS[.ffffff]]`
pub fn date_str(d: &Date) -> String {
    date_time_part(d, ' ')
}

fn date_repr_body(d: &Date) -> String {
    date_time_part(d, 'T')
}

fn hex_pairs(c: Color) -> [String; 4] {
    [c.r, c.g, c.b, c.a].map(|v| format!("{v:02x}"))
}

fn shortened(pairs: &[String]) -> String {
    let short = pairs.iter().all(|p| p[..1] == p[1..]);
    let mut out = String::from("#");
    for p in pairs {
        out.push_str(if short { &p[..1] } else { p });
    }
    out
}

/// `#rgb`, `#rrggbb`, `#rgba` or `#rrggbbaa`.
pub fn color_repr(c: Color) -> String {
    let pairs = hex_pairs(c);
    if c.a == 0xff {
        shortened(&pairs[..3])
    } else {
        shortened(&pairs)
    }
}

/// Hex form for opaque colors, CSS `rgba()` otherwise.
pub fn color_str(c: Color) -> String {
    if c.a == 0xff {
        color_repr(c)
    } else {
        format!(
            "rgba({}, {}, {}, {})",
            c.r,
            c.g,
            c.b,
            f64::from(c.a) / 255.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Dict;

    #[test]
    fn test_str_of_none_is_empty() {
        assert_eq!(Value::None.to_string(), "");
        assert_eq!(Value::None.repr(), "None");
    }

    #[test]
    fn test_bools() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Bool(false).repr(), "False");
    }

    #[test]
    fn test_str_repr_escapes() {
        assert_eq!(Value::from("a\"b").repr(), r#""a\"b""#);
        assert_eq!(str_repr("a\nb\tc\r"), r#""a\nb\tc\r""#);
        assert_eq!(str_repr("\u{e4}"), r#""\xe4""#);
        assert_eq!(str_repr("\u{20ac}"), r#""\u20ac""#);
        assert_eq!(str_repr("\u{1f600}"), r#""\U0001f600""#);
        assert_eq!(str_repr("\\"), r#""\\""#);
    }

    #[test]
    fn test_floats() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Float(-0.25).repr(), "-0.25");
        assert_eq!(Value::Float(f64::INFINITY).repr(), "inf");
    }

    #[test]
    fn test_containers_use_repr() {
        let list = Value::List(vec![Value::from("a"), Value::Int(1), Value::None]);
        assert_eq!(list.to_string(), r#"["a", 1, None]"#);
        let dict = Value::dict([("a", Value::Int(1))]);
        assert_eq!(dict.to_string(), r#"{"a": 1}"#);
        assert_eq!(Value::Dict(Dict::new()).repr(), "{}");
    }

    #[test]
    fn test_dates() {
        let d = Date::new(2012, 1, 2).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2012-01-02");
        assert_eq!(Value::Date(d).repr(), "@(2012-01-02)");
        let d = Date::with_time(2012, 1, 2, 3, 4, 5, 0).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2012-01-02 03:04:05");
        let d = Date::with_time(2012, 1, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2012-01-02 03:04:05.006000");
        assert_eq!(Value::Date(d).repr(), "@(2012-01-02T03:04:05.006000)");
    }

    #[test]
    fn test_colors() {
        assert_eq!(color_repr(Color::rgb(0xff, 0xff, 0xff)), "#fff");
        assert_eq!(color_repr(Color::rgb(0x12, 0x34, 0x56)), "#123456");
        assert_eq!(color_repr(Color::new(0x11, 0x22, 0x33, 0x44)), "#1234");
        assert_eq!(color_repr(Color::new(0x11, 0x22, 0x33, 0x45)), "#11223345");
        assert_eq!(color_str(Color::rgb(0x12, 0x34, 0x56)), "#123456");
        assert_eq!(color_str(Color::new(1, 2, 3, 0)), "rgba(1, 2, 3, 0)");
        assert_eq!(color_str(Color::new(1, 2, 3, 51)), "rgba(1, 2, 3, 0.2)");
    }
}
