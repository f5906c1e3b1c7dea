//! AST node types for UL4 templates.
//!
//! Every node carries the `Location` of the tag it came from. Nodes format
//! back into a canonical, precedence-aware textual rendering via
//! `Node::format`, which is also their `Display`.

use crate::display::{color_repr, float_repr, str_repr};
use crate::opcode::Program;
use crate::{Color, Date, Location, Value};
use std::fmt;
use std::sync::{Arc, OnceLock};

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

/// Single-operand operators. `Print`/`PrintX` are statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Print,
    PrintX,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 4] = [UnaryOp::Not, UnaryOp::Neg, UnaryOp::Print, UnaryOp::PrintX];

    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "neg",
            UnaryOp::Print => "print",
            UnaryOp::PrintX => "printx",
        }
    }
}

/// Two-operand operators, including item access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    GetItem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    NotContains,
    Add,
    Sub,
    Mul,
    FloorDiv,
    TrueDiv,
    Mod,
    And,
    Or,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 17] = [
        BinaryOp::GetItem,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
        BinaryOp::Contains,
        BinaryOp::NotContains,
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::FloorDiv,
        BinaryOp::TrueDiv,
        BinaryOp::Mod,
        BinaryOp::And,
        BinaryOp::Or,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::GetItem => "getitem",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::Contains => "contains",
            BinaryOp::NotContains => "notcontains",
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::FloorDiv => "floordiv",
            BinaryOp::TrueDiv => "truediv",
            BinaryOp::Mod => "mod",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// Source form of the operator (`GetItem` renders as brackets).
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::GetItem => "[]",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Contains => "in",
            BinaryOp::NotContains => "not in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::FloorDiv => "//",
            BinaryOp::TrueDiv => "/",
            BinaryOp::Mod => "%",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::GetItem => 10,
            BinaryOp::Mul | BinaryOp::FloorDiv | BinaryOp::TrueDiv | BinaryOp::Mod => 6,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 4,
            BinaryOp::Contains | BinaryOp::NotContains => 3,
            BinaryOp::And => 1,
            BinaryOp::Or => 0,
        }
    }

    fn associative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or
        )
    }
}

/// Variable assignment forms: `x = v`, `x += v`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarOp {
    Store,
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
}

impl VarOp {
    pub const ALL: [VarOp; 7] = [
        VarOp::Store,
        VarOp::Add,
        VarOp::Sub,
        VarOp::Mul,
        VarOp::TrueDiv,
        VarOp::FloorDiv,
        VarOp::Mod,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VarOp::Store => "storevar",
            VarOp::Add => "addvar",
            VarOp::Sub => "subvar",
            VarOp::Mul => "mulvar",
            VarOp::TrueDiv => "truedivvar",
            VarOp::FloorDiv => "floordivvar",
            VarOp::Mod => "modvar",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            VarOp::Store => "=",
            VarOp::Add => "+=",
            VarOp::Sub => "-=",
            VarOp::Mul => "*=",
            VarOp::TrueDiv => "/=",
            VarOp::FloorDiv => "//=",
            VarOp::Mod => "%=",
        }
    }

    /// The arithmetic operator applied by augmented assignment.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            VarOp::Store => None,
            VarOp::Add => Some(BinaryOp::Add),
            VarOp::Sub => Some(BinaryOp::Sub),
            VarOp::Mul => Some(BinaryOp::Mul),
            VarOp::TrueDiv => Some(BinaryOp::TrueDiv),
            VarOp::FloorDiv => Some(BinaryOp::FloorDiv),
            VarOp::Mod => Some(BinaryOp::Mod),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Nodes
// ══════════════════════════════════════════════════════════════════════════════

/// An item of a dict literal.
#[derive(Debug, Clone, PartialEq)]
pub enum DictItem {
    /// `key: value`
    Pair(Node, Node),
    /// `**dict`
    Update(Node),
}

/// One branch of an `if`/`elif`/`else` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct CondBlock {
    pub location: Arc<Location>,
    pub kind: CondKind,
    pub content: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CondKind {
    If(Node),
    ElIf(Node),
    Else,
}

impl CondKind {
    pub fn name(&self) -> &'static str {
        match self {
            CondKind::If(_) => "if",
            CondKind::ElIf(_) => "elif",
            CondKind::Else => "else",
        }
    }

    pub fn condition(&self) -> Option<&Node> {
        match self {
            CondKind::If(cond) | CondKind::ElIf(cond) => Some(cond),
            CondKind::Else => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub location: Arc<Location>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Literal text; the text is the location's code span.
    Text,
    LoadNone,
    LoadTrue,
    LoadFalse,
    LoadInt(i64),
    LoadFloat(f64),
    LoadStr(String),
    LoadColor(Color),
    LoadDate(Date),
    List(Vec<Node>),
    Dict(Vec<DictItem>),
    LoadVar(String),
    Unary {
        op: UnaryOp,
        obj: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        obj1: Box<Node>,
        obj2: Box<Node>,
    },
    GetSlice {
        obj: Box<Node>,
        index1: Option<Box<Node>>,
        index2: Option<Box<Node>>,
    },
    GetAttr {
        obj: Box<Node>,
        attrname: String,
    },
    CallFunc {
        funcname: String,
        args: Vec<Node>,
    },
    CallMeth {
        methname: String,
        obj: Box<Node>,
        args: Vec<Node>,
    },
    CallMethKeywords {
        methname: String,
        obj: Box<Node>,
        args: Vec<(String, Node)>,
    },
    /// Render a template expression, splicing its output into ours.
    Render {
        obj: Box<Node>,
        args: Vec<(String, Node)>,
    },
    ChangeVar {
        op: VarOp,
        varname: String,
        value: Box<Node>,
    },
    DelVar(String),
    ForNormal {
        container: Box<Node>,
        varname: String,
        content: Vec<Node>,
    },
    ForUnpack {
        container: Box<Node>,
        varnames: Vec<String>,
        content: Vec<Node>,
    },
    IfElIfElse(Vec<CondBlock>),
    Break,
    Continue,
    /// A nested template definition; binds its name when reached.
    Template(Arc<Template>),
}

impl Node {
    pub fn new(kind: NodeKind, location: Arc<Location>) -> Self {
        Self { kind, location }
    }

    /// The literal text of a `Text` node (empty for other kinds).
    pub fn text(&self) -> &str {
        match self.kind {
            NodeKind::Text => self.location.code(),
            _ => "",
        }
    }

    /// The registry name suffix of this node kind.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Text => "text",
            NodeKind::LoadNone => "null",
            NodeKind::LoadTrue => "true",
            NodeKind::LoadFalse => "false",
            NodeKind::LoadInt(_) => "int",
            NodeKind::LoadFloat(_) => "float",
            NodeKind::LoadStr(_) => "str",
            NodeKind::LoadColor(_) => "color",
            NodeKind::LoadDate(_) => "date",
            NodeKind::List(_) => "list",
            NodeKind::Dict(_) => "dict",
            NodeKind::LoadVar(_) => "var",
            NodeKind::Unary { op, .. } => op.name(),
            NodeKind::Binary { op, .. } => op.name(),
            NodeKind::GetSlice { .. } => "getslice",
            NodeKind::GetAttr { .. } => "getattr",
            NodeKind::CallFunc { .. } => "callfunc",
            NodeKind::CallMeth { .. } => "callmeth",
            NodeKind::CallMethKeywords { .. } => "callmethkw",
            NodeKind::Render { .. } => "render",
            NodeKind::ChangeVar { op, .. } => op.name(),
            NodeKind::DelVar(_) => "delvar",
            NodeKind::ForNormal { .. } => "for",
            NodeKind::ForUnpack { .. } => "foru",
            NodeKind::IfElIfElse(_) => "ieie",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::Template(_) => "template",
        }
    }

    /// Binding strength used to decide where `format` needs parentheses.
    pub fn precedence(&self) -> u8 {
        match &self.kind {
            NodeKind::Unary {
                op: UnaryOp::Neg, ..
            } => 7,
            NodeKind::Unary {
                op: UnaryOp::Not, ..
            } => 2,
            NodeKind::Binary { op, .. } => op.precedence(),
            NodeKind::GetSlice { .. }
            | NodeKind::GetAttr { .. }
            | NodeKind::CallFunc { .. }
            | NodeKind::CallMeth { .. }
            | NodeKind::CallMethKeywords { .. } => 10,
            _ => 11,
        }
    }

    fn associative(&self) -> bool {
        match &self.kind {
            NodeKind::Binary { op, .. } => op.associative(),
            NodeKind::GetSlice { .. }
            | NodeKind::GetAttr { .. }
            | NodeKind::CallFunc { .. }
            | NodeKind::CallMeth { .. }
            | NodeKind::CallMethKeywords { .. } => false,
            _ => true,
        }
    }

    /// Format an operand of `self`, parenthesized where precedence demands.
    ///
    /// Operators group to the left, so an operand of equal precedence needs
    /// parentheses only on the right, and not even there when it repeats an
    /// associative operator.
    fn format_operand(&self, operand: &Node, right: bool) -> String {
        let (mine, theirs) = (self.precedence(), operand.precedence());
        let regroups = theirs == mine
            && right
            && (operand.name() != self.name() || !self.associative());
        if theirs < mine || regroups {
            format!("({})", operand.format(0))
        } else {
            operand.format(0)
        }
    }

    /// Canonical textual rendering. Statements end with a newline and are
    /// indented with `indent` tabs; expressions ignore `indent`.
    pub fn format(&self, indent: usize) -> String {
        match &self.kind {
            NodeKind::Text => line(indent, &format!("text {}", str_repr(self.text()))),
            NodeKind::LoadNone => "None".to_string(),
            NodeKind::LoadTrue => "True".to_string(),
            NodeKind::LoadFalse => "False".to_string(),
            NodeKind::LoadInt(i) => i.to_string(),
            NodeKind::LoadFloat(f) => float_repr(*f),
            NodeKind::LoadStr(s) => str_repr(s),
            NodeKind::LoadColor(c) => color_repr(*c),
            NodeKind::LoadDate(d) => Value::Date(*d).repr(),
            NodeKind::List(items) => {
                let items: Vec<_> = items.iter().map(|item| item.format(indent)).collect();
                format!("[{}]", items.join(", "))
            }
            NodeKind::Dict(items) => {
                let items: Vec<_> = items
                    .iter()
                    .map(|item| match item {
                        DictItem::Pair(key, value) => {
                            format!("{}: {}", key.format(indent), value.format(indent))
                        }
                        DictItem::Update(dict) => format!("**{}", dict.format(indent)),
                    })
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
            NodeKind::LoadVar(name) => name.clone(),
            NodeKind::Unary { op, obj } => match op {
                UnaryOp::Not => format!("not {}", self.format_operand(obj, true)),
                UnaryOp::Neg => format!("-{}", self.format_operand(obj, true)),
                UnaryOp::Print => line(indent, &format!("print {}", obj.format(indent))),
                UnaryOp::PrintX => line(indent, &format!("printx {}", obj.format(indent))),
            },
            NodeKind::Binary {
                op: BinaryOp::GetItem,
                obj1,
                obj2,
            } => format!("{}[{}]", self.format_operand(obj1, false), obj2.format(0)),
            NodeKind::Binary { op, obj1, obj2 } => format!(
                "{} {} {}",
                self.format_operand(obj1, false),
                op.symbol(),
                self.format_operand(obj2, true)
            ),
            NodeKind::GetSlice {
                obj,
                index1,
                index2,
            } => {
                let bound = |index: &Option<Box<Node>>| {
                    index.as_ref().map(|i| i.format(0)).unwrap_or_default()
                };
                format!(
                    "{}[{}:{}]",
                    self.format_operand(obj, false),
                    bound(index1),
                    bound(index2)
                )
            }
            NodeKind::GetAttr { obj, attrname } => {
                format!("{}.{}", self.format_operand(obj, false), attrname)
            }
            NodeKind::CallFunc { funcname, args } => {
                format!("{}({})", funcname, format_args_list(args, indent))
            }
            NodeKind::CallMeth {
                methname,
                obj,
                args,
            } => format!(
                "{}.{}({})",
                self.format_operand(obj, false),
                methname,
                format_args_list(args, indent)
            ),
            NodeKind::CallMethKeywords {
                methname,
                obj,
                args,
            } => format!(
                "{}.{}({})",
                self.format_operand(obj, false),
                methname,
                format_keywords(args, indent)
            ),
            NodeKind::Render { obj, args } => {
                let target = if obj.precedence() < 10 {
                    format!("({})", obj.format(0))
                } else {
                    obj.format(0)
                };
                line(
                    indent,
                    &format!("render {}({})", target, format_keywords(args, indent)),
                )
            }
            NodeKind::ChangeVar { op, varname, value } => line(
                indent,
                &format!("{} {} {}", varname, op.symbol(), value.format(indent)),
            ),
            NodeKind::DelVar(name) => line(indent, &format!("del {name}")),
            NodeKind::ForNormal {
                container,
                varname,
                content,
            } => {
                line(
                    indent,
                    &format!("for {} in {}", varname, container.format(indent)),
                ) + &block(indent, content)
            }
            NodeKind::ForUnpack {
                container,
                varnames,
                content,
            } => {
                line(
                    indent,
                    &format!(
                        "for ({}) in {}",
                        varnames.join(", "),
                        container.format(indent)
                    ),
                ) + &block(indent, content)
            }
            NodeKind::IfElIfElse(branches) => {
                branches.iter().map(|b| b.format(indent)).collect()
            }
            NodeKind::Break => line(indent, "break"),
            NodeKind::Continue => line(indent, "continue"),
            NodeKind::Template(template) => template.format(indent),
        }
    }
}

impl CondBlock {
    pub fn format(&self, indent: usize) -> String {
        let head = match self.kind.condition() {
            Some(cond) => format!("{} {}", self.kind.name(), cond.format(indent)),
            None => self.kind.name().to_string(),
        };
        line(indent, &head) + &block(indent, &self.content)
    }
}

fn line(indent: usize, text: &str) -> String {
    format!("{}{}\n", "\t".repeat(indent), text)
}

fn block(indent: usize, content: &[Node]) -> String {
    let mut out = line(indent, "{");
    for node in content {
        out.push_str(&node.format(indent + 1));
    }
    out.push_str(&line(indent, "}"));
    out
}

fn format_args_list(args: &[Node], indent: usize) -> String {
    args.iter()
        .map(|arg| arg.format(indent))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_keywords(args: &[(String, Node)], indent: usize) -> String {
    args.iter()
        .map(|(name, arg)| format!("{}={}", name, arg.format(indent)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(0))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Templates
// ══════════════════════════════════════════════════════════════════════════════

/// A complete template: source text plus its parsed content.
///
/// The compiled opcode program is cached lazily; the first compilation to
/// finish wins and later ones are discarded.
pub struct Template {
    pub location: Option<Arc<Location>>,
    pub source: Arc<str>,
    pub name: Option<String>,
    pub startdelim: String,
    pub enddelim: String,
    pub content: Vec<Node>,
    compiled: OnceLock<Arc<Program>>,
}

impl Template {
    pub fn new(source: impl Into<Arc<str>>, name: Option<&str>, content: Vec<Node>) -> Self {
        Self::with_delims(source, name, "<?", "?>", content)
    }

    pub fn with_delims(
        source: impl Into<Arc<str>>,
        name: Option<&str>,
        startdelim: &str,
        enddelim: &str,
        content: Vec<Node>,
    ) -> Self {
        Self {
            location: None,
            source: source.into(),
            name: name.map(str::to_string),
            startdelim: startdelim.to_string(),
            enddelim: enddelim.to_string(),
            content,
            compiled: OnceLock::new(),
        }
    }

    /// Attach the location of the `def` tag that introduced this template.
    pub fn at(mut self, location: Arc<Location>) -> Self {
        self.location = Some(location);
        self
    }

    /// The cached opcode program, if one has been compiled.
    pub fn cached_program(&self) -> Option<&Arc<Program>> {
        self.compiled.get()
    }

    /// Store `program` unless another one got there first; returns the winner.
    pub fn cache_program(&self, program: Arc<Program>) -> Arc<Program> {
        Arc::clone(self.compiled.get_or_init(|| program))
    }

    pub fn format(&self, indent: usize) -> String {
        let name = self.name.as_deref().unwrap_or("unnamed");
        line(indent, &format!("def {name}")) + &block(indent, &self.content)
    }
}

impl Clone for Template {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            source: Arc::clone(&self.source),
            name: self.name.clone(),
            startdelim: self.startdelim.clone(),
            enddelim: self.enddelim.clone(),
            content: self.content.clone(),
            compiled: OnceLock::new(),
        }
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
            && self.source == other.source
            && self.name == other.name
            && self.startdelim == other.startdelim
            && self.enddelim == other.enddelim
            && self.content == other.content
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("startdelim", &self.startdelim)
            .field("enddelim", &self.enddelim)
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(0))
    }
}
