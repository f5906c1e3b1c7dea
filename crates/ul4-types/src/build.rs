//! Shorthand constructors for building ASTs by hand.
//!
//! Templates normally arrive from a parser or from UL4ON. Hosts that build
//! them directly, and tests, use these helpers; each node gets a synthetic
//! location describing the tag it stands for.

use crate::ast::{BinaryOp, CondBlock, CondKind, DictItem, Node, NodeKind, Template, UnaryOp, VarOp};
use crate::{Location, Value};
use std::sync::Arc;

fn node(kind: NodeKind, tag: &str, code: &str) -> Node {
    Node::new(kind, Location::for_tag(tag, code))
}

fn expr(kind: NodeKind) -> Node {
    let code = Node::new(kind.clone(), Location::for_text("")).format(0);
    node(kind, "print", &code)
}

pub fn text(text: &str) -> Node {
    Node::new(NodeKind::Text, Location::for_text(text))
}

/// A literal for any non-container value.
pub fn constant(value: impl Into<Value>) -> Node {
    let kind = match value.into() {
        Value::Bool(true) => NodeKind::LoadTrue,
        Value::Bool(false) => NodeKind::LoadFalse,
        Value::Int(i) => NodeKind::LoadInt(i),
        Value::Float(f) => NodeKind::LoadFloat(f),
        Value::Str(s) => NodeKind::LoadStr(s),
        Value::Color(c) => NodeKind::LoadColor(c),
        Value::Date(d) => NodeKind::LoadDate(d),
        Value::Template(t) => NodeKind::Template(t),
        Value::None | Value::List(_) | Value::Dict(_) => NodeKind::LoadNone,
    };
    expr(kind)
}

pub fn none() -> Node {
    expr(NodeKind::LoadNone)
}

pub fn var(name: &str) -> Node {
    expr(NodeKind::LoadVar(name.to_string()))
}

pub fn list(items: Vec<Node>) -> Node {
    expr(NodeKind::List(items))
}

pub fn dict(items: Vec<(Node, Node)>) -> Node {
    expr(NodeKind::Dict(
        items.into_iter().map(|(k, v)| DictItem::Pair(k, v)).collect(),
    ))
}

pub fn dict_items(items: Vec<DictItem>) -> Node {
    expr(NodeKind::Dict(items))
}

pub fn unary(op: UnaryOp, obj: Node) -> Node {
    let kind = NodeKind::Unary {
        op,
        obj: Box::new(obj),
    };
    match op {
        UnaryOp::Print | UnaryOp::PrintX => {
            let code = match &kind {
                NodeKind::Unary { obj, .. } => obj.format(0),
                _ => String::new(),
            };
            node(kind, op.name(), &code)
        }
        UnaryOp::Not | UnaryOp::Neg => expr(kind),
    }
}

pub fn print(obj: Node) -> Node {
    unary(UnaryOp::Print, obj)
}

pub fn printx(obj: Node) -> Node {
    unary(UnaryOp::PrintX, obj)
}

pub fn binary(op: BinaryOp, obj1: Node, obj2: Node) -> Node {
    expr(NodeKind::Binary {
        op,
        obj1: Box::new(obj1),
        obj2: Box::new(obj2),
    })
}

pub fn getattr(obj: Node, attrname: &str) -> Node {
    expr(NodeKind::GetAttr {
        obj: Box::new(obj),
        attrname: attrname.to_string(),
    })
}

pub fn getslice(obj: Node, index1: Option<Node>, index2: Option<Node>) -> Node {
    expr(NodeKind::GetSlice {
        obj: Box::new(obj),
        index1: index1.map(Box::new),
        index2: index2.map(Box::new),
    })
}

pub fn callfunc(funcname: &str, args: Vec<Node>) -> Node {
    expr(NodeKind::CallFunc {
        funcname: funcname.to_string(),
        args,
    })
}

pub fn callmeth(obj: Node, methname: &str, args: Vec<Node>) -> Node {
    expr(NodeKind::CallMeth {
        methname: methname.to_string(),
        obj: Box::new(obj),
        args,
    })
}

pub fn callmethkw(obj: Node, methname: &str, args: Vec<(&str, Node)>) -> Node {
    expr(NodeKind::CallMethKeywords {
        methname: methname.to_string(),
        obj: Box::new(obj),
        args: args.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    })
}

pub fn render(obj: Node, args: Vec<(&str, Node)>) -> Node {
    let kind = NodeKind::Render {
        obj: Box::new(obj),
        args: args.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    };
    let code = Node::new(kind.clone(), Location::for_text("")).format(0);
    let code = code.trim_start_matches("render ").trim_end().to_string();
    node(kind, "render", &code)
}

pub fn changevar(op: VarOp, varname: &str, value: Node) -> Node {
    let code = format!("{varname} {} {}", op.symbol(), value.format(0));
    node(
        NodeKind::ChangeVar {
            op,
            varname: varname.to_string(),
            value: Box::new(value),
        },
        "code",
        &code,
    )
}

pub fn store(varname: &str, value: Node) -> Node {
    changevar(VarOp::Store, varname, value)
}

pub fn delvar(varname: &str) -> Node {
    node(NodeKind::DelVar(varname.to_string()), "code", &format!("del {varname}"))
}

pub fn for_normal(varname: &str, container: Node, content: Vec<Node>) -> Node {
    let code = format!("{varname} in {}", container.format(0));
    node(
        NodeKind::ForNormal {
            container: Box::new(container),
            varname: varname.to_string(),
            content,
        },
        "for",
        &code,
    )
}

pub fn for_unpack(varnames: &[&str], container: Node, content: Vec<Node>) -> Node {
    let code = format!("({}) in {}", varnames.join(", "), container.format(0));
    node(
        NodeKind::ForUnpack {
            container: Box::new(container),
            varnames: varnames.iter().map(|v| v.to_string()).collect(),
            content,
        },
        "for",
        &code,
    )
}

/// An `if`/`elif`/`else` chain from `(condition, content)` branches; a
/// trailing branch without condition becomes the `else`.
pub fn conditional(branches: Vec<(Option<Node>, Vec<Node>)>) -> Node {
    let blocks: Vec<CondBlock> = branches
        .into_iter()
        .enumerate()
        .map(|(i, (cond, content))| {
            let (kind, code) = match cond {
                Some(cond) => {
                    let code = cond.format(0);
                    (if i == 0 { CondKind::If(cond) } else { CondKind::ElIf(cond) }, code)
                }
                None => (CondKind::Else, String::new()),
            };
            let location = Location::for_tag(kind.name(), &code);
            CondBlock {
                location,
                kind,
                content,
            }
        })
        .collect();
    let location = blocks
        .first()
        .map(|b| Arc::clone(&b.location))
        .unwrap_or_else(|| Location::for_tag("if", ""));
    Node::new(NodeKind::IfElIfElse(blocks), location)
}

pub fn break_() -> Node {
    node(NodeKind::Break, "break", "")
}

pub fn continue_() -> Node {
    node(NodeKind::Continue, "continue", "")
}

/// A nested `def` that binds `name` when reached.
pub fn def(name: &str, content: Vec<Node>) -> Node {
    let location = Location::for_tag("def", name);
    let template = Template::new(Arc::clone(&location.source), Some(name), content).at(Arc::clone(&location));
    Node::new(NodeKind::Template(Arc::new(template)), location)
}

/// A top-level template.
pub fn template(name: Option<&str>, content: Vec<Node>) -> Arc<Template> {
    Arc::new(Template::new("", name, content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locations_describe_the_tag() {
        let n = print(binary(BinaryOp::Add, var("x"), constant(1)));
        assert_eq!(n.location.tag(), "<?print x + 1?>");
        let n = for_normal("i", callfunc("range", vec![constant(3)]), vec![]);
        assert_eq!(n.location.code(), "i in range(3)");
        assert_eq!(store("x", constant(1)).location.code(), "x = 1");
    }

    #[test]
    fn test_conditional_kinds() {
        let n = conditional(vec![
            (Some(var("a")), vec![]),
            (Some(var("b")), vec![]),
            (None, vec![]),
        ]);
        let NodeKind::IfElIfElse(blocks) = &n.kind else {
            panic!("not a conditional");
        };
        let names: Vec<_> = blocks.iter().map(|b| b.kind.name()).collect();
        assert_eq!(names, vec!["if", "elif", "else"]);
    }

    #[test]
    fn test_def_binds_name() {
        let n = def("inner", vec![text("x")]);
        let NodeKind::Template(t) = &n.kind else {
            panic!("not a template");
        };
        assert_eq!(t.name.as_deref(), Some("inner"));
        assert_eq!(t.content.len(), 1);
    }
}
