//! The iterator protocol: lazy, single-pass sequences over values.
//!
//! Each call to [`iterate`] produces a fresh iterator; nothing is stored on
//! the value itself, so re-iterating a container starts over.

use crate::error::{EvalError, EvalResult};
use std::iter::Peekable;
use ul4_types::Value;

/// A boxed lazy sequence of values.
pub type ValueIter = Box<dyn Iterator<Item = Value> + Send>;

/// Most items a lazy sequence may produce when it has to be held in memory
/// at once, and the longest list or string a repetition may build.
pub const MAX_SEQUENCE_LEN: usize = 1 << 24;

fn too_long() -> EvalError {
    EvalError::Value(format!(
        "sequence too long to materialize (more than {MAX_SEQUENCE_LEN} items)"
    ))
}

/// Drain `source` into a vector, failing once it exceeds
/// [`MAX_SEQUENCE_LEN`] items. Sources that know their length up front fail
/// before producing anything.
pub fn collect_bounded(source: ValueIter) -> EvalResult<Vec<Value>> {
    if source.size_hint().0 > MAX_SEQUENCE_LEN {
        return Err(too_long());
    }
    let items: Vec<Value> = source.take(MAX_SEQUENCE_LEN + 1).collect();
    if items.len() > MAX_SEQUENCE_LEN {
        return Err(too_long());
    }
    Ok(items)
}

/// A fresh iterator over a string, list or dict (keys).
pub fn iterate(value: &Value) -> EvalResult<ValueIter> {
    match value {
        Value::Str(s) => Ok(Box::new(StrChars {
            text: s.clone(),
            pos: 0,
        })),
        Value::List(items) => Ok(Box::new(items.clone().into_iter())),
        Value::Dict(items) => Ok(Box::new(
            items.keys().cloned().collect::<Vec<_>>().into_iter(),
        )),
        other => Err(EvalError::Type(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/// Characters of an owned string, each as a one-character `Str`.
struct StrChars {
    text: String,
    pos: usize,
}

impl Iterator for StrChars {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let c = self.text[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        Some(Value::Str(c.to_string()))
    }
}

// ── range ─────────────────────────────────────────────────────────────

/// Arithmetic progression `start, start+step, ...` stopping before `stop`.
#[derive(Debug, Clone)]
pub struct Range {
    next: i64,
    stop: i64,
    step: i64,
}

impl Range {
    /// `range(stop)`, `range(start, stop)` or `range(start, stop, step)`.
    pub fn new(args: &[Value]) -> EvalResult<Self> {
        let int = |v: &Value| {
            v.as_i64().ok_or_else(|| {
                EvalError::Type(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })
        };
        let (start, stop, step) = match args {
            [stop] => (0, int(stop)?, 1),
            [start, stop] => (int(start)?, int(stop)?, 1),
            [start, stop, step] => (int(start)?, int(stop)?, int(step)?),
            _ => {
                return Err(EvalError::Argument(format!(
                    "range() requires 1-3 arguments, {} given",
                    args.len()
                )))
            }
        };
        if step == 0 {
            return Err(EvalError::Value(
                "range() argument 3 must not be zero".to_string(),
            ));
        }
        Ok(Self {
            next: start,
            stop,
            step,
        })
    }

    fn remaining(&self) -> u128 {
        let (next, stop) = (i128::from(self.next), i128::from(self.stop));
        let step = i128::from(self.step);
        let span = if step > 0 { stop - next } else { next - stop };
        if span <= 0 {
            return 0;
        }
        span.unsigned_abs().div_ceil(step.unsigned_abs())
    }
}

impl Iterator for Range {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let more = if self.step > 0 {
            self.next < self.stop
        } else {
            self.next > self.stop
        };
        if !more {
            return None;
        }
        let current = self.next;
        // past i64 bounds the range is simply exhausted
        self.next = current.checked_add(self.step).unwrap_or(self.stop);
        Some(Value::Int(current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

// ── Wrappers ──────────────────────────────────────────────────────────

/// Items in reverse order. The source is drained first, so it has to fit
/// into [`MAX_SEQUENCE_LEN`].
pub fn reversed(source: ValueIter) -> EvalResult<ValueIter> {
    let mut items = collect_bounded(source)?;
    items.reverse();
    Ok(Box::new(items.into_iter()))
}

/// `[index, item]` pairs.
pub fn enumerate(source: ValueIter) -> ValueIter {
    Box::new(
        source
            .enumerate()
            .map(|(i, item)| Value::List(vec![Value::from(i), item])),
    )
}

/// Tuples of the n-th items of every source; stops at the shortest.
pub fn zip(sources: Vec<ValueIter>) -> ValueIter {
    Box::new(Zip { sources })
}

struct Zip {
    sources: Vec<ValueIter>,
}

impl Iterator for Zip {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.sources.is_empty() {
            return None;
        }
        let items = self
            .sources
            .iter_mut()
            .map(Iterator::next)
            .collect::<Option<Vec<_>>>()?;
        Some(Value::List(items))
    }
}

/// Which position flags a [`Positions`] iterator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flags {
    /// `[isfirst, item]`
    First,
    /// `[islast, item]`
    Last,
    /// `[isfirst, islast, item]`
    FirstLast,
    /// `[index, isfirst, islast, item]`
    EnumFirstLast,
}

/// Items annotated with their position; `islast` needs one item of lookahead.
pub fn positions(source: ValueIter, flags: Flags) -> ValueIter {
    Box::new(Positions {
        source: source.peekable(),
        index: 0,
        flags,
    })
}

struct Positions {
    source: Peekable<ValueIter>,
    index: usize,
    flags: Flags,
}

impl Iterator for Positions {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let item = self.source.next()?;
        let first = Value::Bool(self.index == 0);
        let index = self.index;
        self.index += 1;
        let is_last = Value::Bool(self.source.peek().is_none());
        let row = match self.flags {
            Flags::First => vec![first, item],
            Flags::Last => vec![is_last, item],
            Flags::FirstLast => vec![first, is_last, item],
            Flags::EnumFirstLast => vec![Value::from(index), first, is_last, item],
        };
        Some(Value::List(row))
    }
}
