//! UL4ON decoding.
//!
//! The decoder reads one item at a time into an [`Item`] tree. Registered
//! objects are built by the loaders of a [`Registry`], which pull their
//! fields back out of the decoder through the typed `load_*` helpers.

use crate::error::{DecodeError, DecodeResult};
use crate::registry::{Object, Registry};
use crate::MAX_DEPTH;
use std::sync::Arc;
use ul4_types::ast::Node;
use ul4_types::{Color, Date, Dict, Location, Value};

/// One decoded item.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Value(Value),
    Object(Object),
    /// A list holding at least one registered object that is not a value.
    List(Vec<Item>),
}

impl Item {
    fn kind(&self) -> &'static str {
        match self {
            Item::Value(value) => value.type_name(),
            Item::Object(object) => object.name(),
            Item::List(_) => "list",
        }
    }

    /// Convert into a plain value; templates are values, other objects are not.
    pub fn into_value(self) -> Result<Value, &'static str> {
        match self {
            Item::Value(value) => Ok(value),
            Item::Object(Object::Template(template)) => Ok(Value::Template(template)),
            Item::Object(object) => Err(object.name()),
            Item::List(items) => items
                .into_iter()
                .map(Item::into_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
        }
    }

    fn into_items(self) -> Result<Vec<Item>, &'static str> {
        match self {
            Item::Value(Value::List(values)) => Ok(values.into_iter().map(Item::Value).collect()),
            Item::List(items) => Ok(items),
            other => Err(other.kind()),
        }
    }
}

pub struct Decoder<'a> {
    input: &'a str,
    pos: usize,
    registry: &'a Registry,
    /// Registered items by index; `None` while an item is still loading.
    backrefs: Vec<Option<Item>>,
    /// Lists, dicts and objects currently open.
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a str, registry: &'a Registry) -> Self {
        Self {
            input,
            pos: 0,
            registry,
            backrefs: Vec::new(),
            depth: 0,
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Fail unless only whitespace remains.
    pub fn finish(mut self) -> DecodeResult<()> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(DecodeError::TrailingData { position: self.pos });
        }
        Ok(())
    }

    pub fn unexpected(&self, expected: &'static str, found: &'static str) -> DecodeError {
        DecodeError::Unexpected {
            expected,
            found,
            position: self.pos,
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Generic loading
    // ══════════════════════════════════════════════════════════════════════════

    /// Read the next complete item.
    pub fn load(&mut self) -> DecodeResult<Item> {
        self.skip_whitespace();
        let start = self.pos;
        let tag = self.next_char()?;
        tracing::trace!(tag = %tag, position = start, "ul4on item");
        let register = tag.is_ascii_uppercase();
        match tag {
            '^' => {
                let index = self.read_usize("back-reference")?;
                match self.backrefs.get(index) {
                    Some(Some(item)) => Ok(item.clone()),
                    _ => Err(DecodeError::BadReference {
                        index,
                        position: start,
                    }),
                }
            }
            'n' | 'N' => Ok(self.scalar(register, Value::None)),
            'b' | 'B' => {
                let value = match self.next_char()? {
                    'T' => true,
                    'F' => false,
                    other => {
                        return Err(DecodeError::Malformed {
                            what: "bool",
                            text: other.to_string(),
                            position: start,
                        })
                    }
                };
                Ok(self.scalar(register, Value::Bool(value)))
            }
            'i' | 'I' => {
                let text = self.read_until_bar()?;
                let value = text.parse::<i64>().map_err(|_| DecodeError::Malformed {
                    what: "int",
                    text: text.to_string(),
                    position: start,
                })?;
                Ok(self.scalar(register, Value::Int(value)))
            }
            'f' | 'F' => {
                let text = self.read_until_bar()?;
                let value = text.parse::<f64>().map_err(|_| DecodeError::Malformed {
                    what: "float",
                    text: text.to_string(),
                    position: start,
                })?;
                Ok(self.scalar(register, Value::Float(value)))
            }
            's' | 'S' => {
                let value = self.read_string()?;
                Ok(self.scalar(register, Value::Str(value)))
            }
            'c' | 'C' => {
                let text = self.read_exact(8, "color")?;
                let value = Color::from_hex8(text).map_err(|_| DecodeError::Malformed {
                    what: "color",
                    text: text.to_string(),
                    position: start,
                })?;
                Ok(self.scalar(register, Value::Color(value)))
            }
            't' | 'T' => {
                let text = self.read_exact(17, "date")?;
                let value = Date::from_compact(text).map_err(|_| DecodeError::Malformed {
                    what: "date",
                    text: text.to_string(),
                    position: start,
                })?;
                Ok(self.scalar(register, Value::Date(value)))
            }
            'l' | 'L' => {
                let slot = register.then(|| self.reserve());
                let item = self.nested(start, Self::load_list_items)?;
                Ok(self.fill(slot, item))
            }
            'd' | 'D' => {
                let slot = register.then(|| self.reserve());
                let item = self.nested(start, Self::load_dict_items)?;
                Ok(self.fill(slot, item))
            }
            'o' | 'O' => {
                let slot = register.then(|| self.reserve());
                let object = self.nested(start, Self::load_object_fields)?;
                Ok(self.fill(slot, Item::Object(object)))
            }
            other => Err(DecodeError::UnknownTag {
                tag: other,
                position: start,
            }),
        }
    }

    /// Run `load` one container level deeper.
    fn nested<T>(
        &mut self,
        start: usize,
        load: impl FnOnce(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.depth -= 1;
            return Err(DecodeError::TooDeep {
                limit: MAX_DEPTH,
                position: start,
            });
        }
        let result = load(self);
        self.depth -= 1;
        result
    }

    fn load_list_items(&mut self) -> DecodeResult<Item> {
        let mut items = Vec::new();
        while !self.at_terminator(']')? {
            items.push(self.load()?);
        }
        if items.iter().all(|item| matches!(item, Item::Value(_))) {
            let values = items
                .into_iter()
                .filter_map(|item| match item {
                    Item::Value(value) => Some(value),
                    _ => None,
                })
                .collect();
            Ok(Item::Value(Value::List(values)))
        } else {
            Ok(Item::List(items))
        }
    }

    fn load_dict_items(&mut self) -> DecodeResult<Item> {
        let mut dict = Dict::new();
        while !self.at_terminator('}')? {
            let key = self.load_value()?;
            let value = self.load_value()?;
            dict.insert(key, value);
        }
        Ok(Item::Value(Value::Dict(dict)))
    }

    fn load_object_fields(&mut self) -> DecodeResult<Object> {
        let position = self.pos;
        let name = self.load_str()?;
        let registry = self.registry;
        let loader = registry
            .loader(&name)
            .ok_or(DecodeError::UnknownType { name, position })?;
        let object = loader(self)?;
        if !self.at_terminator(')')? {
            return Err(DecodeError::Malformed {
                what: "object end",
                text: self.input[self.pos..].chars().take(1).collect(),
                position: self.pos,
            });
        }
        Ok(object)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Typed loading
    // ══════════════════════════════════════════════════════════════════════════

    pub fn load_value(&mut self) -> DecodeResult<Value> {
        let item = self.load()?;
        self.expect_value(item)
    }

    pub fn load_str(&mut self) -> DecodeResult<String> {
        let item = self.load()?;
        self.expect_str(item)
    }

    /// A string or `n`.
    pub fn load_opt_str(&mut self) -> DecodeResult<Option<String>> {
        match self.load()? {
            Item::Value(Value::None) => Ok(None),
            item => self.expect_str(item).map(Some),
        }
    }

    pub fn load_int(&mut self) -> DecodeResult<i64> {
        match self.load()? {
            Item::Value(Value::Int(i)) => Ok(i),
            other => Err(self.unexpected("int", other.kind())),
        }
    }

    pub fn load_usize(&mut self) -> DecodeResult<usize> {
        let position = self.pos;
        let i = self.load_int()?;
        usize::try_from(i).map_err(|_| DecodeError::Malformed {
            what: "offset",
            text: i.to_string(),
            position,
        })
    }

    /// A list of items that may hold objects.
    pub fn load_list(&mut self) -> DecodeResult<Vec<Item>> {
        let item = self.load()?;
        self.expect_list(item)
    }

    pub fn load_object(&mut self) -> DecodeResult<Object> {
        let item = self.load()?;
        self.expect_object(item)
    }

    pub fn load_location(&mut self) -> DecodeResult<Arc<Location>> {
        match self.load_object()? {
            Object::Location(location) => Ok(location),
            other => Err(self.unexpected("location", other.name())),
        }
    }

    /// A location or `n`.
    pub fn load_opt_location(&mut self) -> DecodeResult<Option<Arc<Location>>> {
        match self.load()? {
            Item::Value(Value::None) => Ok(None),
            Item::Object(Object::Location(location)) => Ok(Some(location)),
            other => Err(self.unexpected("location", other.kind())),
        }
    }

    pub fn load_node(&mut self) -> DecodeResult<Node> {
        let item = self.load()?;
        self.expect_node(item)
    }

    /// A node or `n`.
    pub fn load_opt_node(&mut self) -> DecodeResult<Option<Node>> {
        match self.load()? {
            Item::Value(Value::None) => Ok(None),
            item => self.expect_node(item).map(Some),
        }
    }

    pub fn load_nodes(&mut self) -> DecodeResult<Vec<Node>> {
        self.load_list()?
            .into_iter()
            .map(|item| self.expect_node(item))
            .collect()
    }

    pub fn expect_value(&self, item: Item) -> DecodeResult<Value> {
        item.into_value().map_err(|found| self.unexpected("value", found))
    }

    pub fn expect_str(&self, item: Item) -> DecodeResult<String> {
        match item {
            Item::Value(Value::Str(s)) => Ok(s),
            other => Err(self.unexpected("str", other.kind())),
        }
    }

    pub fn expect_list(&self, item: Item) -> DecodeResult<Vec<Item>> {
        item.into_items().map_err(|found| self.unexpected("list", found))
    }

    pub fn expect_object(&self, item: Item) -> DecodeResult<Object> {
        match item {
            Item::Object(object) => Ok(object),
            other => Err(self.unexpected("object", other.kind())),
        }
    }

    pub fn expect_node(&self, item: Item) -> DecodeResult<Node> {
        self.expect_object(item)?
            .into_node()
            .map_err(|found| self.unexpected("node", found))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Back-references
    // ══════════════════════════════════════════════════════════════════════════

    fn scalar(&mut self, register: bool, value: Value) -> Item {
        let item = Item::Value(value);
        if register {
            self.backrefs.push(Some(item.clone()));
        }
        item
    }

    fn reserve(&mut self) -> usize {
        self.backrefs.push(None);
        self.backrefs.len() - 1
    }

    fn fill(&mut self, slot: Option<usize>, item: Item) -> Item {
        if let Some(entry) = slot.and_then(|index| self.backrefs.get_mut(index)) {
            *entry = Some(item.clone());
        }
        item
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Raw input
    // ══════════════════════════════════════════════════════════════════════════

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn next_char(&mut self) -> DecodeResult<char> {
        let c = self.input[self.pos..]
            .chars()
            .next()
            .ok_or(DecodeError::UnexpectedEnd { position: self.pos })?;
        self.pos += c.len_utf8();
        Ok(c)
    }

    /// Consume `end` if it is the next non-whitespace character.
    fn at_terminator(&mut self, end: char) -> DecodeResult<bool> {
        self.skip_whitespace();
        match self.input[self.pos..].chars().next() {
            None => Err(DecodeError::UnexpectedEnd { position: self.pos }),
            Some(c) if c == end => {
                self.pos += c.len_utf8();
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    fn read_until_bar(&mut self) -> DecodeResult<&'a str> {
        let input = self.input;
        let rest = &input[self.pos..];
        let end = rest
            .find('|')
            .ok_or(DecodeError::UnexpectedEnd { position: input.len() })?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn read_usize(&mut self, what: &'static str) -> DecodeResult<usize> {
        let position = self.pos;
        let text = self.read_until_bar()?;
        text.parse().map_err(|_| DecodeError::Malformed {
            what,
            text: text.to_string(),
            position,
        })
    }

    fn read_exact(&mut self, len: usize, what: &'static str) -> DecodeResult<&'a str> {
        let input = self.input;
        let end = self.pos + len;
        if end > input.len() {
            return Err(DecodeError::UnexpectedEnd { position: input.len() });
        }
        let text = input.get(self.pos..end).ok_or_else(|| DecodeError::Malformed {
            what,
            text: input[self.pos..].chars().take(len).collect(),
            position: self.pos,
        })?;
        self.pos = end;
        Ok(text)
    }

    /// `<byte length>|<bytes>`
    fn read_string(&mut self) -> DecodeResult<String> {
        let len = self.read_usize("string length")?;
        self.read_exact(len, "string").map(str::to_string)
    }
}
