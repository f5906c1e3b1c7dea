//! Tree-walking template execution.

use crate::context::{nested_depth, Context};
use crate::env::{Environment, Vars};
use crate::error::{EvalError, EvalResult};
use crate::format::xmlescape;
use crate::functions::{self, is_iterator_function, iterator_function};
use crate::iter::{self, ValueIter};
use crate::methods;
use crate::ops;
use std::sync::Arc;
use ul4_types::ast::{BinaryOp, CondBlock, DictItem, Node, NodeKind, Template, UnaryOp, VarOp};
use ul4_types::{Dict, Value};

/// How a block of statements finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// The names a `for` loop binds each item to.
enum Targets<'a> {
    Single(&'a str),
    Unpack(&'a [String]),
}

/// Walks a template's AST against one variable environment and collects
/// the output fragments.
pub struct Evaluator {
    pub env: Environment,
    output: Vec<String>,
    /// Number of enclosing loops; `break`/`continue` are only legal above 0.
    loop_depth: usize,
    /// Number of templates rendering this one; 0 for a top-level render.
    render_depth: usize,
}

impl Evaluator {
    pub fn new(vars: Vars) -> Self {
        Self {
            env: Environment::new(vars),
            output: Vec::new(),
            loop_depth: 0,
            render_depth: 0,
        }
    }

    /// Execute the content of `template` and return the output fragments.
    pub fn run(mut self, template: &Template) -> EvalResult<Vec<String>> {
        tracing::debug!(
            template = template.name.as_deref().unwrap_or("unnamed"),
            "rendering template (tree walk)"
        );
        self.exec_block(&template.content)?;
        Ok(self.output)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    fn exec_block(&mut self, content: &[Node]) -> EvalResult<Flow> {
        for node in content {
            let flow = self.exec(node)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    /// Execute one statement. Expression nodes are evaluated for their
    /// effects and the result dropped.
    pub fn exec(&mut self, node: &Node) -> EvalResult<Flow> {
        self.exec_node(node).map_err(|e| e.at(&node.location))
    }

    fn exec_node(&mut self, node: &Node) -> EvalResult<Flow> {
        match &node.kind {
            NodeKind::Text => self.output.push(node.text().to_string()),
            NodeKind::Unary {
                op: UnaryOp::Print,
                obj,
            } => {
                let value = self.eval(obj)?;
                self.output.push(value.to_string());
            }
            NodeKind::Unary {
                op: UnaryOp::PrintX,
                obj,
            } => {
                let value = self.eval(obj)?;
                self.output.push(xmlescape(&value.to_string()));
            }
            NodeKind::ChangeVar { op, varname, value } => self.exec_change_var(*op, varname, value)?,
            NodeKind::DelVar(varname) => {
                if !self.env.remove(varname) {
                    return Err(missing_variable(varname));
                }
            }
            NodeKind::Render { obj, args } => {
                let template = self.eval(obj)?;
                let vars = self.eval_keywords(args)?;
                match template {
                    Value::Template(t) => {
                        let fragments = self.render(&t, vars)?;
                        self.output.extend(fragments);
                    }
                    other => {
                        return Err(EvalError::Type(format!(
                            "render requires a template, not '{}'",
                            other.type_name()
                        )))
                    }
                }
            }
            NodeKind::ForNormal {
                container,
                varname,
                content,
            } => self.exec_for(container, Targets::Single(varname), content)?,
            NodeKind::ForUnpack {
                container,
                varnames,
                content,
            } => self.exec_for(container, Targets::Unpack(varnames), content)?,
            NodeKind::IfElIfElse(blocks) => return self.exec_conditional(blocks),
            NodeKind::Break => return self.loop_control(Flow::Break, "break"),
            NodeKind::Continue => return self.loop_control(Flow::Continue, "continue"),
            NodeKind::Template(template) => {
                if let Some(name) = &template.name {
                    self.env.set(name, Value::Template(Arc::clone(template)));
                }
            }
            _ => {
                self.eval_node(node)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn loop_control(&self, flow: Flow, what: &'static str) -> EvalResult<Flow> {
        if self.loop_depth == 0 {
            Err(EvalError::LoopControl(what))
        } else {
            Ok(flow)
        }
    }

    fn exec_change_var(&mut self, op: VarOp, varname: &str, value: &Node) -> EvalResult<()> {
        let value = self.eval(value)?;
        let new = match op.binary() {
            None => value,
            Some(binop) => {
                let current = self
                    .env
                    .get(varname)
                    .ok_or_else(|| missing_variable(varname))?;
                ops::binary(binop, current, &value)?
            }
        };
        self.env.set(varname, new);
        Ok(())
    }

    fn exec_conditional(&mut self, blocks: &[CondBlock]) -> EvalResult<Flow> {
        for block in blocks {
            let taken = match block.kind.condition() {
                Some(cond) => self
                    .eval(cond)
                    .map_err(|e| e.at(&block.location))?
                    .is_true(),
                None => true,
            };
            if taken {
                return self.exec_block(&block.content);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, container: &Node, targets: Targets<'_>, content: &[Node]) -> EvalResult<()> {
        let items = self.eval_iterable(container)?;
        self.loop_depth += 1;
        let result = self.exec_loop(items, &targets, content);
        self.loop_depth -= 1;
        result
    }

    fn exec_loop(&mut self, items: ValueIter, targets: &Targets<'_>, content: &[Node]) -> EvalResult<()> {
        for item in items {
            match targets {
                Targets::Single(name) => self.env.set(name, item),
                Targets::Unpack(names) => {
                    for (name, value) in names.iter().zip(unpack(item, names.len())?) {
                        self.env.set(name, value);
                    }
                }
            }
            if self.exec_block(content)? == Flow::Break {
                break;
            }
        }
        Ok(())
    }

    /// A fresh iterator for a `for` container. Iterator builtins used
    /// directly as the container stay lazy.
    fn eval_iterable(&mut self, container: &Node) -> EvalResult<ValueIter> {
        if let NodeKind::CallFunc { funcname, args } = &container.kind {
            if is_iterator_function(funcname) {
                let args = self.eval_all(args)?;
                return iterator_function(funcname, args).map_err(|e| e.at(&container.location));
            }
        }
        let value = self.eval(container)?;
        iter::iterate(&value)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate an expression to a value.
    pub fn eval(&mut self, node: &Node) -> EvalResult<Value> {
        self.eval_node(node).map_err(|e| e.at(&node.location))
    }

    fn eval_node(&mut self, node: &Node) -> EvalResult<Value> {
        match &node.kind {
            NodeKind::LoadNone => Ok(Value::None),
            NodeKind::LoadTrue => Ok(Value::Bool(true)),
            NodeKind::LoadFalse => Ok(Value::Bool(false)),
            NodeKind::LoadInt(i) => Ok(Value::Int(*i)),
            NodeKind::LoadFloat(f) => Ok(Value::Float(*f)),
            NodeKind::LoadStr(s) => Ok(Value::Str(s.clone())),
            NodeKind::LoadColor(c) => Ok(Value::Color(*c)),
            NodeKind::LoadDate(d) => Ok(Value::Date(*d)),
            NodeKind::List(items) => Ok(Value::List(self.eval_all(items)?)),
            NodeKind::Dict(items) => self.eval_dict(items),
            NodeKind::LoadVar(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| missing_variable(name)),
            NodeKind::Unary { op: UnaryOp::Not, obj } => Ok(ops::not(&self.eval(obj)?)),
            NodeKind::Unary { op: UnaryOp::Neg, obj } => ops::neg(&self.eval(obj)?),
            NodeKind::Binary {
                op: BinaryOp::And,
                obj1,
                obj2,
            } => {
                let left = self.eval(obj1)?;
                if left.is_true() {
                    self.eval(obj2)
                } else {
                    Ok(left)
                }
            }
            NodeKind::Binary {
                op: BinaryOp::Or,
                obj1,
                obj2,
            } => {
                let left = self.eval(obj1)?;
                if left.is_true() {
                    Ok(left)
                } else {
                    self.eval(obj2)
                }
            }
            NodeKind::Binary { op, obj1, obj2 } => {
                let left = self.eval(obj1)?;
                let right = self.eval(obj2)?;
                ops::binary(*op, &left, &right)
            }
            NodeKind::GetSlice { obj, index1, index2 } => {
                let container = self.eval(obj)?;
                let start = index1.as_deref().map(|n| self.eval(n)).transpose()?;
                let stop = index2.as_deref().map(|n| self.eval(n)).transpose()?;
                ops::getslice(&container, start.as_ref(), stop.as_ref())
            }
            NodeKind::GetAttr { obj, attrname } => ops::getattr(&self.eval(obj)?, attrname),
            NodeKind::CallFunc { funcname, args } => {
                let args = self.eval_all(args)?;
                functions::call_function(self, funcname, args)
            }
            NodeKind::CallMeth { methname, obj, args } => {
                let obj = self.eval(obj)?;
                let args = self.eval_all(args)?;
                methods::call_method(self, &obj, methname, args)
            }
            NodeKind::CallMethKeywords { methname, obj, args } => {
                let obj = self.eval(obj)?;
                let kwargs = self.eval_keywords(args)?;
                methods::call_method_keywords(self, &obj, methname, kwargs)
            }
            NodeKind::Template(template) => Ok(Value::Template(Arc::clone(template))),
            _ => Err(EvalError::Type(format!(
                "'{}' node is not an expression",
                node.name()
            ))),
        }
    }

    fn eval_all(&mut self, nodes: &[Node]) -> EvalResult<Vec<Value>> {
        nodes.iter().map(|n| self.eval(n)).collect()
    }

    fn eval_keywords(&mut self, args: &[(String, Node)]) -> EvalResult<Vars> {
        let mut vars = Vars::new();
        for (name, node) in args {
            let value = self.eval(node)?;
            vars.insert(name.clone(), value);
        }
        Ok(vars)
    }

    fn eval_dict(&mut self, items: &[DictItem]) -> EvalResult<Value> {
        let mut dict = Dict::new();
        for item in items {
            match item {
                DictItem::Pair(key, value) => {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    dict.insert(key, value);
                }
                DictItem::Update(node) => {
                    let update = self.eval(node)?;
                    update_dict(&mut dict, update)?;
                }
            }
        }
        Ok(Value::Dict(dict))
    }
}

impl Context for Evaluator {
    fn vars(&self) -> &Vars {
        self.env.vars()
    }

    fn render(&mut self, template: &Arc<Template>, vars: Vars) -> EvalResult<Vec<String>> {
        let nested = Evaluator {
            render_depth: nested_depth(self.render_depth)?,
            ..Evaluator::new(vars)
        };
        nested.run(template)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers shared with the opcode engine
// ══════════════════════════════════════════════════════════════════════════════

/// The error for reading, changing or deleting an unbound variable.
pub fn missing_variable(name: &str) -> EvalError {
    EvalError::Key(Value::from(name).repr())
}

/// Split a `for` item into exactly `count` values.
pub fn unpack(item: Value, count: usize) -> EvalResult<Vec<Value>> {
    let values: Vec<Value> = iter::iterate(&item)?.collect();
    if values.len() != count {
        return Err(EvalError::Value(format!(
            "mismatched for loop unpacking: {} varnames, {} items",
            count,
            values.len()
        )));
    }
    Ok(values)
}

/// Merge `**update` into a dict literal under construction.
pub fn update_dict(dict: &mut Dict, update: Value) -> EvalResult<()> {
    match update {
        Value::Dict(items) => {
            dict.extend(items);
            Ok(())
        }
        other => Err(EvalError::Type(format!(
            "** requires a dict, not '{}'",
            other.type_name()
        ))),
    }
}

/// Render `template` with the tree walker.
pub fn render(template: &Template, vars: Vars) -> EvalResult<Vec<String>> {
    Evaluator::new(vars).run(template)
}

/// Render `template` and join the fragments.
pub fn renders(template: &Template, vars: Vars) -> EvalResult<String> {
    Ok(render(template, vars)?.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ul4_types::Location;

    fn node(kind: NodeKind) -> Node {
        Node::new(kind, Location::for_tag("print", "x"))
    }

    fn text(t: &str) -> Node {
        Node::new(NodeKind::Text, Location::for_text(t))
    }

    fn var(name: &str) -> Node {
        node(NodeKind::LoadVar(name.to_string()))
    }

    fn print(obj: Node) -> Node {
        node(NodeKind::Unary {
            op: UnaryOp::Print,
            obj: Box::new(obj),
        })
    }

    fn run(content: Vec<Node>, vars: Vars) -> EvalResult<Vec<String>> {
        render(&Template::new("", Some("t"), content), vars)
    }

    #[test]
    fn test_text_and_print() {
        let mut vars = Vars::new();
        vars.insert("x".to_string(), Value::from("World"));
        let out = run(vec![text("Hello, "), print(var("x"))], vars).unwrap();
        assert_eq!(out, vec!["Hello, ", "World"]);
    }

    #[test]
    fn test_missing_variable_is_key_error_with_location() {
        let err = run(vec![print(var("x"))], Vars::new()).unwrap_err();
        assert_eq!(err.root(), &EvalError::Key("\"x\"".into()));
        assert!(err.to_string().ends_with("in '<?print x?>' at 1 (line 1, col 1)"));
    }

    #[test]
    fn test_break_outside_loop() {
        let err = run(vec![node(NodeKind::Break)], Vars::new()).unwrap_err();
        assert_eq!(err.root(), &EvalError::LoopControl("break"));
    }

    #[test]
    fn test_and_or_short_circuit() {
        let and = node(NodeKind::Binary {
            op: BinaryOp::And,
            obj1: Box::new(node(NodeKind::LoadInt(0))),
            obj2: Box::new(var("missing")),
        });
        let or = node(NodeKind::Binary {
            op: BinaryOp::Or,
            obj1: Box::new(node(NodeKind::LoadStr("a".into()))),
            obj2: Box::new(var("missing")),
        });
        let out = run(vec![print(and), print(or)], Vars::new()).unwrap();
        assert_eq!(out, vec!["0", "a"]);
    }

    #[test]
    fn test_self_render_hits_depth_limit() {
        let body = node(NodeKind::Render {
            obj: Box::new(var("t")),
            args: vec![("t".to_string(), var("t"))],
        });
        let t = Arc::new(Template::new("", Some("t"), vec![body]));
        let mut vars = Vars::new();
        vars.insert("t".to_string(), Value::Template(Arc::clone(&t)));
        let err = render(&t, vars).unwrap_err();
        assert_eq!(err.root(), &EvalError::RenderDepth(crate::MAX_RENDER_DEPTH));
        assert_eq!(err.kind(), crate::ErrorKind::Recursion);
    }

    #[test]
    fn test_dict_update_requires_dict() {
        let dict = node(NodeKind::Dict(vec![DictItem::Update(node(NodeKind::LoadInt(1)))]));
        let err = run(vec![print(dict)], Vars::new()).unwrap_err();
        assert!(matches!(err.root(), EvalError::Type(_)));
    }
}
