//! The register machine that executes compiled opcode programs.

use std::sync::Arc;

use ul4_eval::evaluator::{missing_variable, unpack, update_dict};
use ul4_eval::format::xmlescape;
use ul4_eval::functions::{self, iterator_function};
use ul4_eval::iter::{self, ValueIter};
use ul4_eval::context::nested_depth;
use ul4_eval::{methods, ops, Context, Environment, EvalError, EvalResult, Vars};
use ul4_types::ast::{BinaryOp, Template, VarOp};
use ul4_types::opcode::{Code, Opcode, Program, Register};
use ul4_types::{Color, Date, Value};

use crate::compiler::compile;
use crate::error::{CodegenError, CodegenResult};

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// The compiled program of `template`, compiling and caching it on first use.
pub fn program(template: &Template) -> CodegenResult<Arc<Program>> {
    if let Some(program) = template.cached_program() {
        return Ok(Arc::clone(program));
    }
    let program = Arc::new(compile(template)?);
    Ok(template.cache_program(program))
}

/// Render `template` on the register machine.
pub fn render(template: &Template, vars: Vars) -> CodegenResult<Vec<String>> {
    tracing::debug!(
        template = template.name.as_deref().unwrap_or("unnamed"),
        "rendering template (opcodes)"
    );
    render_at(template, vars, 0)
}

fn render_at(template: &Template, vars: Vars, depth: usize) -> CodegenResult<Vec<String>> {
    let program = program(template)?;
    let machine = Machine {
        render_depth: depth,
        ..Machine::new(vars)
    };
    machine.run(&program)
}

/// Render `template` and join the fragments.
pub fn renders(template: &Template, vars: Vars) -> CodegenResult<String> {
    Ok(render(template, vars)?.concat())
}

// ══════════════════════════════════════════════════════════════════════════════
// Machine
// ══════════════════════════════════════════════════════════════════════════════

/// One template activation: variables, registers, output and the
/// iterators of the loops currently running.
pub struct Machine {
    env: Environment,
    registers: Vec<Value>,
    output: Vec<String>,
    loops: Vec<ValueIter>,
    /// Number of templates rendering this one; 0 for a top-level render.
    render_depth: usize,
}

/// Attach the opcode's location to a runtime failure.
fn located<T>(op: &Opcode, result: EvalResult<T>) -> CodegenResult<T> {
    result.map_err(|err| {
        let err = match &op.location {
            Some(location) => err.at(location),
            None => err,
        };
        CodegenError::Eval(err)
    })
}

fn internal(op: &Opcode, what: &str) -> CodegenError {
    CodegenError::Internal(format!("{what} in opcode '{op}'"))
}

fn arg(op: &Opcode) -> CodegenResult<&str> {
    op.arg.as_deref().ok_or_else(|| internal(op, "missing argument"))
}

fn parse_arg<T: std::str::FromStr>(op: &Opcode) -> CodegenResult<T> {
    arg(op)?.parse().map_err(|_| internal(op, "malformed argument"))
}

fn binary_op(code: Code) -> Option<BinaryOp> {
    Some(match code {
        Code::GetItem => BinaryOp::GetItem,
        Code::Eq => BinaryOp::Eq,
        Code::Ne => BinaryOp::Ne,
        Code::Lt => BinaryOp::Lt,
        Code::Le => BinaryOp::Le,
        Code::Gt => BinaryOp::Gt,
        Code::Ge => BinaryOp::Ge,
        Code::Contains => BinaryOp::Contains,
        Code::NotContains => BinaryOp::NotContains,
        Code::Add => BinaryOp::Add,
        Code::Sub => BinaryOp::Sub,
        Code::Mul => BinaryOp::Mul,
        Code::FloorDiv => BinaryOp::FloorDiv,
        Code::TrueDiv => BinaryOp::TrueDiv,
        Code::Mod => BinaryOp::Mod,
        _ => return None,
    })
}

fn var_op(code: Code) -> Option<VarOp> {
    Some(match code {
        Code::AddVar => VarOp::Add,
        Code::SubVar => VarOp::Sub,
        Code::MulVar => VarOp::Mul,
        Code::TrueDivVar => VarOp::TrueDiv,
        Code::FloorDivVar => VarOp::FloorDiv,
        Code::ModVar => VarOp::Mod,
        _ => return None,
    })
}

impl Machine {
    pub fn new(vars: Vars) -> Self {
        Self {
            env: Environment::new(vars),
            registers: Vec::new(),
            output: Vec::new(),
            loops: Vec::new(),
            render_depth: 0,
        }
    }

    /// Execute `program.start..program.stop` and return the output fragments.
    pub fn run(mut self, program: &Program) -> CodegenResult<Vec<String>> {
        self.registers.resize(program.registers, Value::None);
        let mut pc = program.start;
        while pc < program.stop {
            let op = program
                .code
                .get(pc)
                .ok_or_else(|| CodegenError::Internal(format!("jump to {pc} out of range")))?;
            pc = self.step(program, pc, op)?;
        }
        Ok(self.output)
    }

    // ── Registers ───────────────────────────────────────────────────────

    fn reg(&self, op: &Opcode, r: Option<Register>) -> CodegenResult<&Value> {
        r.and_then(|r| self.registers.get(usize::from(r)))
            .ok_or_else(|| internal(op, "bad register"))
    }

    fn reg_mut(&mut self, op: &Opcode, r: Option<Register>) -> CodegenResult<&mut Value> {
        r.and_then(|r| self.registers.get_mut(usize::from(r)))
            .ok_or_else(|| internal(op, "bad register"))
    }

    fn take(&mut self, op: &Opcode, r: Option<Register>) -> CodegenResult<Value> {
        Ok(std::mem::take(self.reg_mut(op, r)?))
    }

    fn set(&mut self, op: &Opcode, r: Option<Register>, value: Value) -> CodegenResult<()> {
        *self.reg_mut(op, r)? = value;
        Ok(())
    }

    fn take_list(&mut self, op: &Opcode, r: Option<Register>) -> CodegenResult<Vec<Value>> {
        match self.take(op, r)? {
            Value::List(items) => Ok(items),
            _ => Err(internal(op, "argument register holds no list")),
        }
    }

    fn take_keywords(&mut self, op: &Opcode, r: Option<Register>) -> CodegenResult<Vars> {
        let Value::Dict(items) = self.take(op, r)? else {
            return Err(internal(op, "keyword register holds no dict"));
        };
        items
            .into_iter()
            .map(|(key, value)| match key {
                Value::Str(name) => Ok((name, value)),
                _ => Err(internal(op, "keyword name is not a string")),
            })
            .collect()
    }

    fn jump(program: &Program, op: &Opcode, pc: usize) -> CodegenResult<usize> {
        program.jump(pc).ok_or_else(|| internal(op, "unresolved jump"))
    }

    // ── Execution ───────────────────────────────────────────────────────

    /// Execute the opcode at `pc` and return the next program counter.
    fn step(&mut self, program: &Program, pc: usize, op: &Opcode) -> CodegenResult<usize> {
        match op.code {
            Code::Text => {
                let text = op.location.as_deref().map(|loc| loc.code()).unwrap_or("");
                self.output.push(text.to_string());
            }
            Code::LoadNone => self.set(op, op.r1, Value::None)?,
            Code::LoadFalse => self.set(op, op.r1, Value::Bool(false))?,
            Code::LoadTrue => self.set(op, op.r1, Value::Bool(true))?,
            Code::LoadInt => self.set(op, op.r1, Value::Int(parse_arg(op)?))?,
            Code::LoadFloat => self.set(op, op.r1, Value::Float(parse_arg(op)?))?,
            Code::LoadStr => self.set(op, op.r1, Value::from(arg(op)?))?,
            Code::LoadDate => {
                let date = Date::from_compact(arg(op)?).map_err(|_| internal(op, "malformed date"))?;
                self.set(op, op.r1, Value::Date(date))?;
            }
            Code::LoadColor => {
                let color = Color::from_hex8(arg(op)?).map_err(|_| internal(op, "malformed color"))?;
                self.set(op, op.r1, Value::Color(color))?;
            }
            Code::BuildList => self.set(op, op.r1, Value::List(Vec::new()))?,
            Code::BuildDict => self.set(op, op.r1, Value::Dict(Default::default()))?,
            Code::AddList => {
                let item = self.take(op, op.r2)?;
                match self.reg_mut(op, op.r1)? {
                    Value::List(items) => items.push(item),
                    _ => return Err(internal(op, "addlist target is no list")),
                }
            }
            Code::AddDict => {
                let key = self.take(op, op.r2)?;
                let value = self.take(op, op.r3)?;
                match self.reg_mut(op, op.r1)? {
                    Value::Dict(items) => {
                        items.insert(key, value);
                    }
                    _ => return Err(internal(op, "adddict target is no dict")),
                }
            }
            Code::UpdateDict => {
                let update = self.take(op, op.r2)?;
                match self.reg_mut(op, op.r1)? {
                    Value::Dict(items) => located(op, update_dict(items, update))?,
                    _ => return Err(internal(op, "updatedict target is no dict")),
                }
            }
            Code::LoadVar => {
                let name = arg(op)?;
                let value = located(op, self.env.get(name).cloned().ok_or_else(|| missing_variable(name)))?;
                self.set(op, op.r1, value)?;
            }
            Code::StoreVar => {
                let value = self.take(op, op.r1)?;
                self.env.set(arg(op)?, value);
            }
            Code::AddVar
            | Code::SubVar
            | Code::MulVar
            | Code::TrueDivVar
            | Code::FloorDivVar
            | Code::ModVar => {
                let binop = var_op(op.code)
                    .and_then(VarOp::binary)
                    .ok_or_else(|| internal(op, "not an augmented assignment"))?;
                let name = arg(op)?;
                let value = self.take(op, op.r1)?;
                let current = located(op, self.env.get(name).ok_or_else(|| missing_variable(name)))?;
                let new = located(op, ops::binary(binop, current, &value))?;
                self.env.set(name, new);
            }
            Code::DelVar => {
                let name = arg(op)?;
                if !self.env.remove(name) {
                    return located(op, Err(missing_variable(name)));
                }
            }
            Code::GetAttr => {
                let value = located(op, ops::getattr(self.reg(op, op.r2)?, arg(op)?))?;
                self.set(op, op.r1, value)?;
            }
            Code::GetSlice12 | Code::GetSlice1 | Code::GetSlice2 | Code::GetSlice => {
                let (start, stop) = match op.code {
                    Code::GetSlice12 => (Some(op.r3), Some(op.r4)),
                    Code::GetSlice1 => (Some(op.r3), None),
                    Code::GetSlice2 => (None, Some(op.r3)),
                    _ => (None, None),
                };
                let start = start.map(|r| self.reg(op, r)).transpose()?;
                let stop = stop.map(|r| self.reg(op, r)).transpose()?;
                let value = located(op, ops::getslice(self.reg(op, op.r2)?, start, stop))?;
                self.set(op, op.r1, value)?;
            }
            Code::Print => {
                let text = self.reg(op, op.r1)?.to_string();
                self.output.push(text);
            }
            Code::PrintX => {
                let text = xmlescape(&self.reg(op, op.r1)?.to_string());
                self.output.push(text);
            }
            Code::For => {
                let items = match op.arg.as_deref() {
                    Some(funcname) => {
                        let args = self.take_list(op, op.r2)?;
                        located(op, iterator_function(funcname, args))?
                    }
                    None => located(op, iter::iterate(self.reg(op, op.r2)?))?,
                };
                self.loops.push(items);
                return self.advance(program, pc, op);
            }
            Code::Unpack => {
                let count = parse_arg(op)?;
                let item = self.take(op, op.r1)?;
                let values = located(op, unpack(item, count))?;
                self.set(op, op.r1, Value::List(values))?;
            }
            Code::EndFor => {
                let start = Self::jump(program, op, pc)?;
                let for_op = program
                    .code
                    .get(start)
                    .ok_or_else(|| internal(op, "endfor without for"))?;
                return self.advance(program, start, for_op);
            }
            Code::Break | Code::Continue => {
                let what = if op.code == Code::Break { "break" } else { "continue" };
                let Some(end) = program.jump(pc).filter(|_| !self.loops.is_empty()) else {
                    return located(op, Err(EvalError::LoopControl(what)));
                };
                if op.code == Code::Continue {
                    return Ok(end);
                }
                self.loops.pop();
                return Ok(end + 1);
            }
            Code::Not => {
                let value = ops::not(self.reg(op, op.r2)?);
                self.set(op, op.r1, value)?;
            }
            Code::Neg => {
                let value = located(op, ops::neg(self.reg(op, op.r2)?))?;
                self.set(op, op.r1, value)?;
            }
            Code::GetItem
            | Code::Eq
            | Code::Ne
            | Code::Lt
            | Code::Le
            | Code::Gt
            | Code::Ge
            | Code::Contains
            | Code::NotContains
            | Code::Add
            | Code::Sub
            | Code::Mul
            | Code::FloorDiv
            | Code::TrueDiv
            | Code::Mod => {
                let binop = binary_op(op.code).ok_or_else(|| internal(op, "not a binary operator"))?;
                let value = located(
                    op,
                    ops::binary(binop, self.reg(op, op.r2)?, self.reg(op, op.r3)?),
                )?;
                self.set(op, op.r1, value)?;
            }
            Code::CallFunc => {
                let args = self.take_list(op, op.r2)?;
                let value = located(op, functions::call_function(self, arg(op)?, args))?;
                self.set(op, op.r1, value)?;
            }
            Code::CallMeth => {
                let obj = self.take(op, op.r2)?;
                let args = self.take_list(op, op.r3)?;
                let value = located(op, methods::call_method(self, &obj, arg(op)?, args))?;
                self.set(op, op.r1, value)?;
            }
            Code::CallMethKw => {
                let obj = self.take(op, op.r2)?;
                let kwargs = self.take_keywords(op, op.r3)?;
                let value = located(op, methods::call_method_keywords(self, &obj, arg(op)?, kwargs))?;
                self.set(op, op.r1, value)?;
            }
            Code::Render => {
                let template = self.take(op, op.r1)?;
                let vars = self.take_keywords(op, op.r2)?;
                let fragments = match template {
                    Value::Template(t) => located(op, Context::render(self, &t, vars))?,
                    other => {
                        return located(
                            op,
                            Err(EvalError::Type(format!(
                                "render requires a template, not '{}'",
                                other.type_name()
                            ))),
                        )
                    }
                };
                self.output.extend(fragments);
            }
            Code::If => {
                if !self.reg(op, op.r1)?.is_true() {
                    return Ok(Self::jump(program, op, pc)? + 1);
                }
            }
            Code::Else => return Ok(Self::jump(program, op, pc)? + 1),
            Code::EndIf | Code::EndDef => {}
            Code::Invalid => {
                let err = EvalError::Type(format!("'{}' node is not an expression", arg(op)?));
                return located(op, Err(err));
            }
            Code::Def => {
                let end = Self::jump(program, op, pc)?;
                let template = program
                    .def_template(pc)
                    .ok_or_else(|| internal(op, "template of def is gone"))?;
                if template.cached_program().is_none() {
                    template.cache_program(Arc::new(program.narrowed(pc + 1, end)));
                }
                let value = Value::Template(template);
                match (op.r1, op.arg.as_deref()) {
                    (Some(_), _) => self.set(op, op.r1, value)?,
                    (None, Some(name)) => self.env.set(name, value),
                    (None, None) => {}
                }
                return Ok(end + 1);
            }
        }
        Ok(pc + 1)
    }

    /// Pull the next item of the innermost loop into the `for` opcode's
    /// item register, or leave the loop when it is exhausted.
    fn advance(&mut self, program: &Program, start: usize, for_op: &Opcode) -> CodegenResult<usize> {
        match self.loops.last_mut().and_then(Iterator::next) {
            Some(item) => {
                self.set(for_op, for_op.r1, item)?;
                Ok(start + 1)
            }
            None => {
                self.loops.pop();
                Ok(Self::jump(program, for_op, start)? + 1)
            }
        }
    }
}

impl Context for Machine {
    fn vars(&self) -> &Vars {
        self.env.vars()
    }

    fn render(&mut self, template: &Arc<Template>, vars: Vars) -> EvalResult<Vec<String>> {
        let depth = nested_depth(self.render_depth)?;
        Ok(render_at(template, vars, depth)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ul4_types::build::*;

    fn run(content: Vec<ul4_types::ast::Node>, vars: Vars) -> CodegenResult<String> {
        renders(&template(Some("t"), content), vars)
    }

    #[test]
    fn test_text_and_print() {
        let mut vars = Vars::new();
        vars.insert("name".into(), Value::from("World"));
        let out = run(vec![text("Hello, "), print(var("name"))], vars).unwrap();
        assert_eq!(out, "Hello, World");
    }

    #[test]
    fn test_loop_with_continue() {
        let out = run(
            vec![for_normal(
                "i",
                callfunc("range", vec![constant(4)]),
                vec![
                    conditional(vec![(
                        Some(binary(BinaryOp::Eq, var("i"), constant(1))),
                        vec![continue_()],
                    )]),
                    print(var("i")),
                ],
            )],
            Vars::new(),
        )
        .unwrap();
        assert_eq!(out, "023");
    }

    #[test]
    fn test_break_outside_loop() {
        let err = run(vec![break_()], Vars::new()).unwrap_err();
        let CodegenError::Eval(err) = err else {
            panic!("expected runtime error");
        };
        assert_eq!(err.root(), &EvalError::LoopControl("break"));
    }

    #[test]
    fn test_registers_sized_by_program() {
        let mut expr = constant(1);
        for _ in 0..30 {
            expr = binary(BinaryOp::Add, constant(1), expr);
        }
        assert_eq!(run(vec![print(expr)], Vars::new()).unwrap(), "31");
    }

    #[test]
    fn test_invalid_opcode_fails_only_when_reached() {
        let bad = print(getattr(print(var("x")), "y"));
        let skipped = conditional(vec![(Some(constant(false)), vec![bad.clone()])]);
        assert_eq!(run(vec![skipped, text("ok")], Vars::new()).unwrap(), "ok");
        let CodegenError::Eval(err) = run(vec![bad], Vars::new()).unwrap_err() else {
            panic!("expected runtime error");
        };
        assert_eq!(
            err.to_string(),
            "TypeError: 'print' node is not an expression in '<?print x?>' at 1 (line 1, col 1)"
        );
    }

    #[test]
    fn test_self_render_hits_depth_limit() {
        let t = template(Some("t"), vec![ul4_types::build::render(var("t"), vec![("t", var("t"))])]);
        let mut vars = Vars::new();
        vars.insert("t".into(), Value::Template(Arc::clone(&t)));
        let CodegenError::Eval(err) = renders(&t, vars).unwrap_err() else {
            panic!("expected runtime error");
        };
        assert_eq!(err.root(), &EvalError::RenderDepth(ul4_eval::MAX_RENDER_DEPTH));
    }

    #[test]
    fn test_program_is_cached() {
        let t = template(None, vec![text("x")]);
        let first = program(&t).unwrap();
        let second = program(&t).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_def_narrows_parent_program() {
        let t = template(
            None,
            vec![def("inner", vec![text("a")]), ul4_types::build::render(var("inner"), vec![])],
        );
        assert_eq!(renders(&t, Vars::new()).unwrap(), "a");
        let parent = program(&t).unwrap();
        let ul4_types::ast::NodeKind::Template(inner) = &t.content[0].kind else {
            panic!("not a def");
        };
        let narrowed = inner.cached_program().unwrap();
        assert!(Arc::ptr_eq(&parent.code, &narrowed.code));
        assert_eq!((narrowed.start, narrowed.stop), (1, 2));
    }
}
