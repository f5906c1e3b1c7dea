//! UL4ON encoding.
//!
//! Strings are written once and referenced by index afterwards. Equal
//! locations are shared the same way, and so is each template object.
//! Everything else is written in full.

use crate::error::{EncodeError, EncodeResult};
use crate::registry::{Registry, NAMESPACE};
use crate::MAX_DEPTH;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use ul4_types::ast::{CondBlock, CondKind, DictItem, Node, NodeKind, Template};
use ul4_types::{Location, Value};

/// Identity of an object that is written once per stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ObjectKey {
    /// Locations compare by value.
    Location(Arc<Location>),
    /// Templates compare by address.
    Template(usize),
}

pub struct Encoder<'a> {
    registry: &'a Registry,
    out: String,
    strings: HashMap<String, usize>,
    objects: HashMap<ObjectKey, usize>,
    registered: usize,
    /// Lists, dicts and objects currently open.
    depth: usize,
}

impl<'a> Encoder<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            out: String::new(),
            strings: HashMap::new(),
            objects: HashMap::new(),
            registered: 0,
            depth: 0,
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn register(&mut self) -> usize {
        self.registered += 1;
        self.registered - 1
    }

    fn backref(&mut self, index: usize) {
        // Writing to a String cannot fail.
        let _ = write!(self.out, "^{index}|");
    }

    /// Write the tag of a list, dict or object one level deeper.
    fn open(&mut self, tag: char) -> EncodeResult<()> {
        if self.depth == MAX_DEPTH {
            return Err(EncodeError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        self.out.push(tag);
        Ok(())
    }

    fn close(&mut self, end: char) {
        self.depth -= 1;
        self.out.push(end);
    }

    pub fn dump_value(&mut self, value: &Value) -> EncodeResult<()> {
        match value {
            Value::None => self.out.push('n'),
            Value::Bool(b) => self.out.push_str(if *b { "bT" } else { "bF" }),
            Value::Int(i) => {
                let _ = write!(self.out, "i{i}|");
            }
            Value::Float(f) => {
                let _ = write!(self.out, "f{f:?}|");
            }
            Value::Str(s) => self.dump_str(s),
            Value::Color(c) => {
                self.out.push('c');
                self.out.push_str(&c.to_hex8());
            }
            Value::Date(d) => {
                self.out.push('t');
                self.out.push_str(&d.to_compact());
            }
            Value::List(items) => {
                self.open('l')?;
                for item in items {
                    self.dump_value(item)?;
                }
                self.close(']');
            }
            Value::Dict(items) => {
                self.open('d')?;
                for (key, value) in items {
                    self.dump_value(key)?;
                    self.dump_value(value)?;
                }
                self.close('}');
            }
            Value::Template(template) => self.dump_template(template)?,
        }
        Ok(())
    }

    /// Equal strings after the first become back-references.
    pub fn dump_str(&mut self, s: &str) {
        if let Some(&index) = self.strings.get(s) {
            self.backref(index);
            return;
        }
        let index = self.register();
        self.strings.insert(s.to_string(), index);
        let _ = write!(self.out, "S{}|{s}", s.len());
    }

    pub fn dump_opt_str(&mut self, s: Option<&str>) {
        match s {
            Some(s) => self.dump_str(s),
            None => self.out.push('n'),
        }
    }

    fn dump_int(&mut self, i: usize) {
        let _ = write!(self.out, "i{i}|");
    }

    /// Start an object unless `key` was dumped before, in which case a
    /// back-reference is written and `false` returned.
    fn begin_object(&mut self, key: Option<ObjectKey>, kind: &str) -> EncodeResult<bool> {
        if let Some(&index) = key.as_ref().and_then(|key| self.objects.get(key)) {
            self.backref(index);
            return Ok(false);
        }
        self.open('O')?;
        let index = self.register();
        if let Some(key) = key {
            self.objects.insert(key, index);
        }
        self.dump_str(&format!("{NAMESPACE}{kind}"));
        Ok(true)
    }

    fn end_object(&mut self) {
        self.close(')');
    }

    pub fn dump_location(&mut self, location: &Arc<Location>) -> EncodeResult<()> {
        let key = ObjectKey::Location(Arc::clone(location));
        if !self.begin_object(Some(key), "location")? {
            return Ok(());
        }
        self.dump_str(&location.source);
        self.dump_opt_str(location.kind.as_deref());
        self.dump_int(location.starttag);
        self.dump_int(location.endtag);
        self.dump_int(location.startcode);
        self.dump_int(location.endcode);
        self.end_object();
        Ok(())
    }

    pub fn dump_template(&mut self, template: &Arc<Template>) -> EncodeResult<()> {
        let key = ObjectKey::Template(Arc::as_ptr(template) as usize);
        if !self.begin_object(Some(key), "template")? {
            return Ok(());
        }
        let version = self.registry.version().to_string();
        self.dump_str(&version);
        self.dump_str(&template.source);
        self.dump_opt_str(template.name.as_deref());
        self.dump_str(&template.startdelim);
        self.dump_str(&template.enddelim);
        match &template.location {
            Some(location) => self.dump_location(location)?,
            None => self.out.push('n'),
        }
        self.dump_nodes(&template.content)?;
        self.end_object();
        Ok(())
    }

    pub fn dump_nodes(&mut self, nodes: &[Node]) -> EncodeResult<()> {
        self.open('l')?;
        for node in nodes {
            self.dump_node(node)?;
        }
        self.close(']');
        Ok(())
    }

    fn dump_opt_node(&mut self, node: Option<&Node>) -> EncodeResult<()> {
        match node {
            Some(node) => self.dump_node(node),
            None => {
                self.out.push('n');
                Ok(())
            }
        }
    }

    fn dump_keywords(&mut self, args: &[(String, Node)]) -> EncodeResult<()> {
        self.open('l')?;
        for (name, value) in args {
            self.open('l')?;
            self.dump_str(name);
            self.dump_node(value)?;
            self.close(']');
        }
        self.close(']');
        Ok(())
    }

    pub fn dump_node(&mut self, node: &Node) -> EncodeResult<()> {
        if let NodeKind::Template(template) = &node.kind {
            return self.dump_template(template);
        }
        self.begin_object(None, node.name())?;
        self.dump_location(&node.location)?;
        match &node.kind {
            NodeKind::Text
            | NodeKind::LoadNone
            | NodeKind::LoadTrue
            | NodeKind::LoadFalse
            | NodeKind::Break
            | NodeKind::Continue => {}
            NodeKind::LoadInt(i) => self.dump_value(&Value::Int(*i))?,
            NodeKind::LoadFloat(f) => self.dump_value(&Value::Float(*f))?,
            NodeKind::LoadStr(s) | NodeKind::LoadVar(s) | NodeKind::DelVar(s) => self.dump_str(s),
            NodeKind::LoadColor(c) => self.dump_value(&Value::Color(*c))?,
            NodeKind::LoadDate(d) => self.dump_value(&Value::Date(*d))?,
            NodeKind::List(items) => self.dump_nodes(items)?,
            NodeKind::Dict(items) => {
                self.open('l')?;
                for item in items {
                    self.open('l')?;
                    match item {
                        DictItem::Pair(key, value) => {
                            self.dump_node(key)?;
                            self.dump_node(value)?;
                        }
                        DictItem::Update(dict) => self.dump_node(dict)?,
                    }
                    self.close(']');
                }
                self.close(']');
            }
            NodeKind::Unary { obj, .. } => self.dump_node(obj)?,
            NodeKind::Binary { obj1, obj2, .. } => {
                self.dump_node(obj1)?;
                self.dump_node(obj2)?;
            }
            NodeKind::GetSlice { obj, index1, index2 } => {
                self.dump_node(obj)?;
                self.dump_opt_node(index1.as_deref())?;
                self.dump_opt_node(index2.as_deref())?;
            }
            NodeKind::GetAttr { obj, attrname } => {
                self.dump_node(obj)?;
                self.dump_str(attrname);
            }
            NodeKind::CallFunc { funcname, args } => {
                self.dump_str(funcname);
                self.dump_nodes(args)?;
            }
            NodeKind::CallMeth { methname, obj, args } => {
                self.dump_str(methname);
                self.dump_node(obj)?;
                self.dump_nodes(args)?;
            }
            NodeKind::CallMethKeywords { methname, obj, args } => {
                self.dump_str(methname);
                self.dump_node(obj)?;
                self.dump_keywords(args)?;
            }
            NodeKind::Render { obj, args } => {
                self.dump_node(obj)?;
                self.dump_keywords(args)?;
            }
            NodeKind::ChangeVar { varname, value, .. } => {
                self.dump_str(varname);
                self.dump_node(value)?;
            }
            NodeKind::ForNormal {
                container,
                varname,
                content,
            } => {
                self.dump_nodes(content)?;
                self.dump_node(container)?;
                self.dump_str(varname);
            }
            NodeKind::ForUnpack {
                container,
                varnames,
                content,
            } => {
                self.dump_nodes(content)?;
                self.dump_node(container)?;
                self.open('l')?;
                for varname in varnames {
                    self.dump_str(varname);
                }
                self.close(']');
            }
            NodeKind::IfElIfElse(blocks) => {
                self.open('l')?;
                for block in blocks {
                    self.dump_cond_block(block)?;
                }
                self.close(']');
            }
            NodeKind::Template(_) => {}
        }
        self.end_object();
        Ok(())
    }

    fn dump_cond_block(&mut self, block: &CondBlock) -> EncodeResult<()> {
        self.begin_object(None, block.kind.name())?;
        self.dump_location(&block.location)?;
        self.dump_nodes(&block.content)?;
        match &block.kind {
            CondKind::If(cond) | CondKind::ElIf(cond) => self.dump_node(cond)?,
            CondKind::Else => {}
        }
        self.end_object();
        Ok(())
    }
}
