//! The type registry: which object names a decoder understands, and the
//! protocol version templates are stamped with.

use crate::decoder::Decoder;
use crate::error::{DecodeError, DecodeResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use ul4_types::ast::{
    BinaryOp, CondBlock, CondKind, DictItem, Node, NodeKind, Template, UnaryOp, VarOp,
};
use ul4_types::Location;

/// Prefix of every registered type name.
pub const NAMESPACE: &str = "de.livinglogic.ul4.";

/// Protocol version written into (and required from) every template.
pub const VERSION: &str = "17";

/// A decoded registered object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Location(Arc<Location>),
    Node(Node),
    CondBlock(CondBlock),
    Template(Arc<Template>),
}

impl Object {
    /// The registered name without [`NAMESPACE`].
    pub fn name(&self) -> &'static str {
        match self {
            Object::Location(_) => "location",
            Object::Node(node) => node.name(),
            Object::CondBlock(block) => block.kind.name(),
            Object::Template(_) => "template",
        }
    }

    /// The object as an AST node; templates become `def` nodes.
    pub fn into_node(self) -> Result<Node, &'static str> {
        match self {
            Object::Node(node) => Ok(node),
            Object::Template(template) => {
                let location = template.location.clone().unwrap_or_else(|| {
                    Location::for_tag("def", template.name.as_deref().unwrap_or(""))
                });
                Ok(Node::new(NodeKind::Template(template), location))
            }
            other => Err(other.name()),
        }
    }
}

/// Reads the fields of one object kind; the type name and the closing
/// tag are handled by the decoder.
pub type Loader = Box<dyn Fn(&mut Decoder<'_>) -> DecodeResult<Object> + Send + Sync>;

/// Name → loader table plus the protocol version.
pub struct Registry {
    version: String,
    loaders: HashMap<String, Loader>,
}

impl Registry {
    /// A registry that knows every UL4 object type.
    pub fn new() -> Self {
        Self::with_version(VERSION)
    }

    /// Like [`Registry::new`], but stamping templates with `version`.
    pub fn with_version(version: &str) -> Self {
        let mut registry = Self {
            version: version.to_string(),
            loaders: HashMap::new(),
        };
        registry.register_defaults();
        registry
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Register (or replace) the loader for the fully qualified `name`.
    pub fn register(&mut self, name: &str, loader: Loader) {
        self.loaders.insert(name.to_string(), loader);
    }

    pub fn loader(&self, name: &str) -> Option<&Loader> {
        self.loaders.get(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn add(&mut self, kind: &str, loader: Loader) {
        self.register(&format!("{NAMESPACE}{kind}"), loader);
    }

    /// Register an AST node kind. Every node starts with its location;
    /// `fields` reads the rest.
    fn add_node<F>(&mut self, kind: &str, fields: F)
    where
        F: Fn(&mut Decoder<'_>) -> DecodeResult<NodeKind> + Send + Sync + 'static,
    {
        self.add(
            kind,
            Box::new(move |d| {
                let location = d.load_location()?;
                let kind = fields(d)?;
                Ok(Object::Node(Node::new(kind, location)))
            }),
        );
    }

    fn register_defaults(&mut self) {
        self.add("location", Box::new(load_location));
        self.add("template", Box::new(load_template));

        self.add_node("text", |_| Ok(NodeKind::Text));
        self.add_node("null", |_| Ok(NodeKind::LoadNone));
        self.add_node("true", |_| Ok(NodeKind::LoadTrue));
        self.add_node("false", |_| Ok(NodeKind::LoadFalse));
        self.add_node("int", |d| Ok(NodeKind::LoadInt(d.load_int()?)));
        self.add_node("float", |d| {
            let value = d.load_value()?;
            let f = value.as_f64().ok_or_else(|| d.unexpected("float", value.type_name()))?;
            Ok(NodeKind::LoadFloat(f))
        });
        self.add_node("str", |d| Ok(NodeKind::LoadStr(d.load_str()?)));
        self.add_node("color", |d| match d.load_value()? {
            ul4_types::Value::Color(c) => Ok(NodeKind::LoadColor(c)),
            other => Err(d.unexpected("color", other.type_name())),
        });
        self.add_node("date", |d| match d.load_value()? {
            ul4_types::Value::Date(date) => Ok(NodeKind::LoadDate(date)),
            other => Err(d.unexpected("date", other.type_name())),
        });
        self.add_node("list", |d| Ok(NodeKind::List(d.load_nodes()?)));
        self.add_node("dict", |d| Ok(NodeKind::Dict(load_dict_items(d)?)));
        self.add_node("var", |d| Ok(NodeKind::LoadVar(d.load_str()?)));

        for op in UnaryOp::ALL {
            self.add_node(op.name(), move |d| {
                let obj = Box::new(d.load_node()?);
                Ok(NodeKind::Unary { op, obj })
            });
        }
        for op in BinaryOp::ALL {
            self.add_node(op.name(), move |d| {
                let obj1 = Box::new(d.load_node()?);
                let obj2 = Box::new(d.load_node()?);
                Ok(NodeKind::Binary { op, obj1, obj2 })
            });
        }
        self.add_node("getslice", |d| {
            let obj = Box::new(d.load_node()?);
            let index1 = d.load_opt_node()?.map(Box::new);
            let index2 = d.load_opt_node()?.map(Box::new);
            Ok(NodeKind::GetSlice { obj, index1, index2 })
        });
        self.add_node("getattr", |d| {
            let obj = Box::new(d.load_node()?);
            let attrname = d.load_str()?;
            Ok(NodeKind::GetAttr { obj, attrname })
        });
        self.add_node("callfunc", |d| {
            let funcname = d.load_str()?;
            let args = d.load_nodes()?;
            Ok(NodeKind::CallFunc { funcname, args })
        });
        self.add_node("callmeth", |d| {
            let methname = d.load_str()?;
            let obj = Box::new(d.load_node()?);
            let args = d.load_nodes()?;
            Ok(NodeKind::CallMeth { methname, obj, args })
        });
        self.add_node("callmethkw", |d| {
            let methname = d.load_str()?;
            let obj = Box::new(d.load_node()?);
            let args = load_keywords(d)?;
            Ok(NodeKind::CallMethKeywords { methname, obj, args })
        });
        self.add_node("render", |d| {
            let obj = Box::new(d.load_node()?);
            let args = load_keywords(d)?;
            Ok(NodeKind::Render { obj, args })
        });
        for op in VarOp::ALL {
            self.add_node(op.name(), move |d| {
                let varname = d.load_str()?;
                let value = Box::new(d.load_node()?);
                Ok(NodeKind::ChangeVar { op, varname, value })
            });
        }
        self.add_node("delvar", |d| Ok(NodeKind::DelVar(d.load_str()?)));
        self.add_node("for", |d| {
            let content = d.load_nodes()?;
            let container = Box::new(d.load_node()?);
            let varname = d.load_str()?;
            Ok(NodeKind::ForNormal {
                container,
                varname,
                content,
            })
        });
        self.add_node("foru", |d| {
            let content = d.load_nodes()?;
            let container = Box::new(d.load_node()?);
            let varnames = d
                .load_list()?
                .into_iter()
                .map(|item| d.expect_str(item))
                .collect::<DecodeResult<Vec<_>>>()?;
            Ok(NodeKind::ForUnpack {
                container,
                varnames,
                content,
            })
        });
        self.add_node("ieie", |d| {
            let blocks = d
                .load_list()?
                .into_iter()
                .map(|item| match d.expect_object(item)? {
                    Object::CondBlock(block) => Ok(block),
                    other => Err(d.unexpected("if/elif/else block", other.name())),
                })
                .collect::<DecodeResult<Vec<_>>>()?;
            Ok(NodeKind::IfElIfElse(blocks))
        });
        self.add_node("break", |_| Ok(NodeKind::Break));
        self.add_node("continue", |_| Ok(NodeKind::Continue));

        self.add("if", Box::new(|d| load_cond_block(d, "if")));
        self.add("elif", Box::new(|d| load_cond_block(d, "elif")));
        self.add("else", Box::new(|d| load_cond_block(d, "else")));
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("version", &self.version)
            .field("names", &self.names())
            .finish()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Loaders
// ══════════════════════════════════════════════════════════════════════════════

fn load_location(d: &mut Decoder<'_>) -> DecodeResult<Object> {
    let source = d.load_str()?;
    let kind = d.load_opt_str()?;
    let starttag = d.load_usize()?;
    let endtag = d.load_usize()?;
    let startcode = d.load_usize()?;
    let endcode = d.load_usize()?;
    Ok(Object::Location(Arc::new(Location::new(
        source,
        kind.as_deref(),
        starttag,
        endtag,
        startcode,
        endcode,
    ))))
}

fn load_template(d: &mut Decoder<'_>) -> DecodeResult<Object> {
    let version = d.load_str()?;
    let expected = d.registry().version();
    if version != expected {
        return Err(DecodeError::VersionMismatch {
            expected: expected.to_string(),
            found: version,
        });
    }
    let source = d.load_str()?;
    let name = d.load_opt_str()?;
    tracing::debug!(version = %version, name = name.as_deref().unwrap_or("unnamed"), "decoding template");
    let startdelim = d.load_str()?;
    let enddelim = d.load_str()?;
    let location = d.load_opt_location()?;
    let content = d.load_nodes()?;
    let mut template = Template::with_delims(source, name.as_deref(), &startdelim, &enddelim, content);
    template.location = location;
    Ok(Object::Template(Arc::new(template)))
}

fn load_cond_block(d: &mut Decoder<'_>, kind: &str) -> DecodeResult<Object> {
    let location = d.load_location()?;
    let content = d.load_nodes()?;
    let kind = match kind {
        "if" => CondKind::If(d.load_node()?),
        "elif" => CondKind::ElIf(d.load_node()?),
        _ => CondKind::Else,
    };
    Ok(Object::CondBlock(CondBlock {
        location,
        kind,
        content,
    }))
}

/// Dict literal items: `[key, value]` pairs and `[dict]` updates.
fn load_dict_items(d: &mut Decoder<'_>) -> DecodeResult<Vec<DictItem>> {
    let mut items = Vec::new();
    for item in d.load_list()? {
        let mut parts = d.expect_list(item)?.into_iter();
        let item = match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => DictItem::Pair(d.expect_node(key)?, d.expect_node(value)?),
            (Some(update), None, None) => DictItem::Update(d.expect_node(update)?),
            _ => return Err(d.unexpected("dict item of length 1 or 2", "list")),
        };
        items.push(item);
    }
    Ok(items)
}

/// Keyword arguments: `[name, value]` pairs.
fn load_keywords(d: &mut Decoder<'_>) -> DecodeResult<Vec<(String, Node)>> {
    let mut args = Vec::new();
    for item in d.load_list()? {
        let mut parts = d.expect_list(item)?.into_iter();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(value), None) => args.push((d.expect_str(name)?, d.expect_node(value)?)),
            _ => return Err(d.unexpected("keyword argument pair", "list")),
        }
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_knows_every_kind() {
        let registry = Registry::new();
        let kinds = [
            "location", "text", "null", "true", "false", "int", "float", "str", "color", "date",
            "list", "dict", "var", "not", "neg", "print", "printx", "getitem", "getslice",
            "getattr", "eq", "ne", "lt", "le", "gt", "ge", "contains", "notcontains", "add",
            "sub", "mul", "floordiv", "truediv", "mod", "and", "or", "callfunc", "callmeth",
            "callmethkw", "render", "storevar", "addvar", "subvar", "mulvar", "truedivvar",
            "floordivvar", "modvar", "delvar", "for", "foru", "ieie", "if", "elif", "else",
            "break", "continue", "template",
        ];
        for kind in kinds {
            assert!(
                registry.loader(&format!("{NAMESPACE}{kind}")).is_some(),
                "missing {kind}"
            );
        }
        assert_eq!(registry.names().len(), kinds.len());
        assert_eq!(registry.version(), "17");
    }

    #[test]
    fn test_template_object_becomes_def_node() {
        let template = Arc::new(Template::new("", Some("inner"), vec![]));
        let node = Object::Template(Arc::clone(&template)).into_node().unwrap();
        assert_eq!(node.kind, NodeKind::Template(template));
        assert_eq!(node.location.tag(), "<?def inner?>");
        let loc = Object::Location(Location::for_text("x"));
        assert_eq!(loc.into_node().unwrap_err(), "location");
    }
}
