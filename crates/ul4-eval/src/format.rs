//! Text renderings beyond `str`/`repr`: JSON, CSV, XML escaping and date
//! formatting.

use crate::error::{EvalError, EvalResult};
use std::fmt::Write;
use ul4_types::display::float_repr;
use ul4_types::{Date, Value};

const WEEKDAY_ABBR: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];
const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Escape `& < > ' "` for XML text and attribute values.
pub fn xmlescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// One CSV field: `None` is empty, non-strings use `repr`, and fields with
/// commas, quotes or newlines are quoted with inner quotes doubled.
pub fn csv(value: &Value) -> String {
    let text = match value {
        Value::None => return String::new(),
        Value::Str(s) => s.clone(),
        other => other.repr(),
    };
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

fn json_str(text: &str) -> String {
    // serializing a str cannot fail
    serde_json::to_string(text).unwrap_or_default()
}

fn json_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        float_repr(f)
    }
}

/// JSON with the JavaScript extensions for dates, colors and templates.
pub fn json(value: &Value) -> EvalResult<String> {
    let text = match value {
        Value::None => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => json_float(*f),
        Value::Str(s) => json_str(s),
        Value::List(items) => {
            let items = items.iter().map(json).collect::<EvalResult<Vec<_>>>()?;
            format!("[{}]", items.join(", "))
        }
        Value::Dict(items) => {
            let items = items
                .iter()
                .map(|(k, v)| Ok(format!("{}: {}", json(k)?, json(v)?)))
                .collect::<EvalResult<Vec<_>>>()?;
            format!("{{{}}}", items.join(", "))
        }
        Value::Date(d) => format!(
            "new Date({}, {}, {}, {}, {}, {}, {})",
            d.year(),
            d.month() - 1,
            d.day(),
            d.hour(),
            d.minute(),
            d.second(),
            d.millisecond()
        ),
        Value::Color(c) => format!("ul4.Color.create({}, {}, {}, {})", c.r, c.g, c.b, c.a),
        Value::Template(_) => {
            let dump = ul4on::dumps(value).map_err(|e| EvalError::Value(e.to_string()))?;
            format!("ul4.Template.loads({})", json_str(&dump))
        }
    };
    Ok(text)
}

/// `YYYY-MM-DD[THH:MM:SS[.ffffff]]`
pub fn isoformat(d: &Date) -> String {
    let mut out = format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day());
    if d.has_time() {
        let _ = write!(out, "T{:02}:{:02}:{:02}", d.hour(), d.minute(), d.second());
        if d.millisecond() != 0 {
            let _ = write!(out, ".{:06}", d.microsecond());
        }
    }
    out
}

/// RFC 822 form, e.g. `Mon, 02 Jan 2012 03:04:05 GMT`.
pub fn mimeformat(d: &Date) -> String {
    format!(
        "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
        WEEKDAY_ABBR[usize::from(d.weekday())],
        d.day(),
        MONTH_ABBR[usize::from(d.month() - 1)],
        d.year(),
        d.hour(),
        d.minute(),
        d.second()
    )
}

/// `strftime`-style formatting. Unknown directives are copied verbatim.
pub fn strftime(d: &Date, spec: &str) -> String {
    let weekday = usize::from(d.weekday());
    let month = usize::from(d.month() - 1);
    let hour12 = match d.hour() % 12 {
        0 => 12,
        h => h,
    };
    let mut out = String::new();
    let mut chars = spec.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(directive) = chars.next() else {
            out.push('%');
            break;
        };
        let _ = match directive {
            'a' => write!(out, "{}", WEEKDAY_ABBR[weekday]),
            'A' => write!(out, "{}", WEEKDAY_NAMES[weekday]),
            'b' => write!(out, "{}", MONTH_ABBR[month]),
            'B' => write!(out, "{}", MONTH_NAMES[month]),
            'c' => write!(
                out,
                "{} {} {:2} {:02}:{:02}:{:02} {:04}",
                WEEKDAY_ABBR[weekday],
                MONTH_ABBR[month],
                d.day(),
                d.hour(),
                d.minute(),
                d.second(),
                d.year()
            ),
            'd' => write!(out, "{:02}", d.day()),
            'f' => write!(out, "{:06}", d.microsecond()),
            'H' => write!(out, "{:02}", d.hour()),
            'I' => write!(out, "{hour12:02}"),
            'j' => write!(out, "{:03}", d.yearday()),
            'm' => write!(out, "{:02}", d.month()),
            'M' => write!(out, "{:02}", d.minute()),
            'p' => write!(out, "{}", if d.hour() < 12 { "AM" } else { "PM" }),
            'S' => write!(out, "{:02}", d.second()),
            'U' => write!(out, "{:02}", d.week(6)),
            'w' => write!(out, "{}", (weekday + 1) % 7),
            'W' => write!(out, "{:02}", d.week(0)),
            'x' => write!(out, "{:02}/{:02}/{:02}", d.month(), d.day(), d.year() % 100),
            'X' => write!(out, "{:02}:{:02}:{:02}", d.hour(), d.minute(), d.second()),
            'y' => write!(out, "{:02}", d.year() % 100),
            'Y' => write!(out, "{:04}", d.year()),
            '%' => write!(out, "%"),
            other => write!(out, "%{other}"),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ul4_types::Color;

    fn date() -> Date {
        Date::with_time(2012, 1, 2, 3, 4, 5, 6).unwrap()
    }

    #[test]
    fn test_xmlescape() {
        assert_eq!(
            xmlescape("<a href=\"x\">'&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_csv() {
        assert_eq!(csv(&Value::None), "");
        assert_eq!(csv(&Value::from("plain")), "plain");
        assert_eq!(csv(&Value::from("a,b")), "\"a,b\"");
        assert_eq!(csv(&Value::from("say \"hi\"")), "\"say \"\"hi\"\"\"");
        assert_eq!(csv(&Value::Int(42)), "42");
        assert_eq!(csv(&Value::List(vec![Value::Int(1), Value::Int(2)])), "\"[1, 2]\"");
    }

    #[test]
    fn test_json() {
        let v = Value::dict([
            ("a", Value::List(vec![Value::Int(1), Value::Float(2.5), Value::None])),
            ("b", Value::from("x\"y\n")),
        ]);
        assert_eq!(json(&v).unwrap(), r#"{"a": [1, 2.5, null], "b": "x\"y\n"}"#);
        assert_eq!(json(&Value::Bool(true)).unwrap(), "true");
        assert_eq!(
            json(&Value::Color(Color::new(1, 2, 3, 4))).unwrap(),
            "ul4.Color.create(1, 2, 3, 4)"
        );
        assert_eq!(json(&Value::Date(date())).unwrap(), "new Date(2012, 0, 2, 3, 4, 5, 6)");
    }

    #[test]
    fn test_json_of_templates() {
        use ul4_types::ast::BinaryOp;
        use ul4_types::build::{binary, constant, print, template, var};

        let small = template(Some("t"), vec![print(var("x"))]);
        let out = json(&Value::Template(small)).unwrap();
        assert!(out.starts_with("ul4.Template.loads(\"O"), "{out}");

        let deep = (0..ul4on::MAX_DEPTH).fold(var("x"), |inner, _| {
            binary(BinaryOp::Add, inner, constant(1))
        });
        let err = json(&Value::Template(template(None, vec![print(deep)]))).unwrap_err();
        assert!(matches!(err, EvalError::Value(_)), "{err}");
    }

    #[test]
    fn test_isoformat_and_mimeformat() {
        assert_eq!(isoformat(&date()), "2012-01-02T03:04:05.006000");
        assert_eq!(isoformat(&Date::new(2012, 1, 2).unwrap()), "2012-01-02");
        assert_eq!(mimeformat(&date()), "Mon, 02 Jan 2012 03:04:05 GMT");
    }

    #[test]
    fn test_strftime() {
        let d = date();
        assert_eq!(strftime(&d, "%Y-%m-%d %H:%M:%S.%f"), "2012-01-02 03:04:05.006000");
        assert_eq!(strftime(&d, "%a %A %b %B"), "Mon Monday Jan January");
        assert_eq!(strftime(&d, "%c"), "Mon Jan  2 03:04:05 2012");
        assert_eq!(strftime(&d, "%x %X"), "01/02/12 03:04:05");
        assert_eq!(strftime(&d, "%I%p %j %w %U %W %y"), "03AM 002 1 01 01 12");
        assert_eq!(strftime(&d, "100%% %q"), "100% %q");
    }

    #[test]
    fn test_strftime_midnight_is_twelve_am() {
        let d = Date::new(2012, 1, 1).unwrap();
        assert_eq!(strftime(&d, "%I %p %w"), "12 AM 0");
    }
}
