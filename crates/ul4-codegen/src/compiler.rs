//! AST → register opcode compiler.
//!
//! Flattens a template into one opcode stream:
//! 1. Expressions are evaluated into registers, allocated as a stack
//! 2. Blocks become `for`/`endfor`, `if`/`else`/`endif` and `def`/`enddef`
//!    pairs whose jump targets are resolved once the block is closed
//! 3. `and`/`or` become `if` blocks so the right operand stays lazy
//!
//! Nested `def` templates are compiled inline; at runtime the machine
//! narrows the stream to their span instead of compiling them again.

use std::sync::{Arc, Weak};

use ul4_eval::functions::is_iterator_function;
use ul4_types::ast::{BinaryOp, CondBlock, DictItem, Node, NodeKind, Template, UnaryOp, VarOp};
use ul4_types::opcode::{Code, Opcode, Program, Register};
use ul4_types::Location;

use crate::error::{CodegenError, CodegenResult};

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Compile `template` into an opcode [`Program`].
pub fn compile(template: &Template) -> CodegenResult<Program> {
    let mut compiler = Compiler::default();
    compiler.block(&template.content)?;
    tracing::debug!(
        template = template.name.as_deref().unwrap_or("unnamed"),
        opcodes = compiler.code.len(),
        registers = compiler.registers,
        "compiled template"
    );
    Ok(Program::new(
        compiler.code,
        compiler.jumps,
        compiler.defs,
        compiler.registers,
    ))
}

/// The opcode for the arithmetic or comparison `op`; `and`/`or` have none.
pub fn binary_code(op: BinaryOp) -> Option<Code> {
    Some(match op {
        BinaryOp::GetItem => Code::GetItem,
        BinaryOp::Eq => Code::Eq,
        BinaryOp::Ne => Code::Ne,
        BinaryOp::Lt => Code::Lt,
        BinaryOp::Le => Code::Le,
        BinaryOp::Gt => Code::Gt,
        BinaryOp::Ge => Code::Ge,
        BinaryOp::Contains => Code::Contains,
        BinaryOp::NotContains => Code::NotContains,
        BinaryOp::Add => Code::Add,
        BinaryOp::Sub => Code::Sub,
        BinaryOp::Mul => Code::Mul,
        BinaryOp::FloorDiv => Code::FloorDiv,
        BinaryOp::TrueDiv => Code::TrueDiv,
        BinaryOp::Mod => Code::Mod,
        BinaryOp::And | BinaryOp::Or => return None,
    })
}

pub fn var_code(op: VarOp) -> Code {
    match op {
        VarOp::Store => Code::StoreVar,
        VarOp::Add => Code::AddVar,
        VarOp::Sub => Code::SubVar,
        VarOp::Mul => Code::MulVar,
        VarOp::TrueDiv => Code::TrueDivVar,
        VarOp::FloorDiv => Code::FloorDivVar,
        VarOp::Mod => Code::ModVar,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Compiler
// ══════════════════════════════════════════════════════════════════════════════

enum Targets<'a> {
    Single(&'a str),
    Unpack(&'a [String]),
}

#[derive(Default)]
struct Compiler {
    code: Vec<Opcode>,
    jumps: Vec<Option<usize>>,
    defs: Vec<(usize, Weak<Template>)>,
    /// Next free register; registers are released in reverse order.
    next_register: Register,
    /// Highest number of registers live at once anywhere in the stream.
    registers: usize,
    /// `break`/`continue` opcodes of each enclosing loop, innermost last.
    loops: Vec<Vec<usize>>,
}

fn op(code: Code, location: &Arc<Location>) -> Opcode {
    Opcode::new(code, Some(Arc::clone(location)))
}

impl Compiler {
    fn emit(&mut self, op: Opcode) -> usize {
        self.code.push(op);
        self.jumps.push(None);
        self.code.len() - 1
    }

    fn link(&mut self, from: usize, to: usize) {
        if let Some(jump) = self.jumps.get_mut(from) {
            *jump = Some(to);
        }
    }

    fn alloc(&mut self, node: &Node) -> CodegenResult<Register> {
        let r = self.next_register;
        self.next_register = r.checked_add(1).ok_or_else(|| {
            CodegenError::LimitExceeded(format!(
                "expression needs more than {} registers in {}",
                Register::MAX,
                node.location
            ))
        })?;
        self.registers = self.registers.max(usize::from(self.next_register));
        Ok(r)
    }

    fn release(&mut self, count: Register) {
        self.next_register = self.next_register.saturating_sub(count);
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn block(&mut self, content: &[Node]) -> CodegenResult<()> {
        content.iter().try_for_each(|node| self.stmt(node))
    }

    fn stmt(&mut self, node: &Node) -> CodegenResult<()> {
        let loc = &node.location;
        match &node.kind {
            NodeKind::Text => {
                self.emit(op(Code::Text, loc));
            }
            NodeKind::Unary {
                op: unary @ (UnaryOp::Print | UnaryOp::PrintX),
                obj,
            } => {
                let code = if *unary == UnaryOp::Print {
                    Code::Print
                } else {
                    Code::PrintX
                };
                let r = self.expr(obj)?;
                self.emit(op(code, loc).regs(&[r]));
                self.release(1);
            }
            NodeKind::ChangeVar {
                op: varop,
                varname,
                value,
            } => {
                let r = self.expr(value)?;
                self.emit(op(var_code(*varop), loc).regs(&[r]).arg(varname.as_str()));
                self.release(1);
            }
            NodeKind::DelVar(varname) => {
                self.emit(op(Code::DelVar, loc).arg(varname.as_str()));
            }
            NodeKind::Render { obj, args } => {
                let template = self.expr(obj)?;
                let kwargs = self.keywords(node, args)?;
                self.emit(op(Code::Render, loc).regs(&[template, kwargs]));
                self.release(2);
            }
            NodeKind::ForNormal {
                container,
                varname,
                content,
            } => self.for_loop(node, container, Targets::Single(varname), content)?,
            NodeKind::ForUnpack {
                container,
                varnames,
                content,
            } => self.for_loop(node, container, Targets::Unpack(varnames), content)?,
            NodeKind::IfElIfElse(blocks) => self.conditional(node, blocks)?,
            NodeKind::Break | NodeKind::Continue => {
                let code = if node.kind == NodeKind::Break {
                    Code::Break
                } else {
                    Code::Continue
                };
                let index = self.emit(op(code, loc));
                if let Some(exits) = self.loops.last_mut() {
                    exits.push(index);
                }
            }
            NodeKind::Template(template) => self.def(template, loc, None)?,
            _ => {
                self.expr(node)?;
                self.release(1);
            }
        }
        Ok(())
    }

    fn for_loop(
        &mut self,
        node: &Node,
        container: &Node,
        targets: Targets<'_>,
        content: &[Node],
    ) -> CodegenResult<()> {
        let loc = &node.location;
        let source = self.alloc(container)?;
        let lazy = match &container.kind {
            NodeKind::CallFunc { funcname, args } if is_iterator_function(funcname) => {
                self.arg_list(container, args, source)?;
                Some(funcname.as_str())
            }
            _ => {
                self.expr_into(container, source)?;
                None
            }
        };
        let item = self.alloc(node)?;
        let for_op = match lazy {
            Some(funcname) => op(Code::For, &container.location)
                .regs(&[item, source])
                .arg(funcname),
            None => op(Code::For, loc).regs(&[item, source]),
        };
        let start = self.emit(for_op);

        match targets {
            Targets::Single(varname) => {
                self.emit(op(Code::StoreVar, loc).regs(&[item]).arg(varname));
            }
            Targets::Unpack(varnames) => {
                self.emit(op(Code::Unpack, loc).regs(&[item]).arg(varnames.len().to_string()));
                let index = self.alloc(node)?;
                let value = self.alloc(node)?;
                for (i, varname) in varnames.iter().enumerate() {
                    self.emit(op(Code::LoadInt, loc).regs(&[index]).arg(i.to_string()));
                    self.emit(op(Code::GetItem, loc).regs(&[value, item, index]));
                    self.emit(op(Code::StoreVar, loc).regs(&[value]).arg(varname.as_str()));
                }
                self.release(2);
            }
        }

        self.loops.push(Vec::new());
        self.block(content)?;
        let exits = self.loops.pop().unwrap_or_default();
        let end = self.emit(op(Code::EndFor, loc));
        self.link(start, end);
        self.link(end, start);
        for exit in exits {
            self.link(exit, end);
        }
        self.release(2);
        Ok(())
    }

    /// `if a / else / if b / else / ... / endif / endif`: each `elif` opens
    /// a nested `if` inside the `else` of the previous branch.
    fn conditional(&mut self, node: &Node, blocks: &[CondBlock]) -> CodegenResult<()> {
        // (if opcode, else opcode) of each open branch.
        let mut open: Vec<(usize, Option<usize>)> = Vec::new();
        for block in blocks {
            if let Some((start, otherwise)) = open.last_mut() {
                let index = self.code.len();
                *otherwise = Some(index);
                let start = *start;
                self.emit(op(Code::Else, &block.location));
                self.link(start, index);
            }
            match block.kind.condition() {
                Some(cond) => {
                    let r = self.expr(cond)?;
                    let start = self.emit(op(Code::If, &block.location).regs(&[r]));
                    self.release(1);
                    open.push((start, None));
                    self.block(&block.content)?;
                }
                None => {
                    // An `else` is always taken; later branches are dead.
                    self.block(&block.content)?;
                    break;
                }
            }
        }
        while let Some((start, otherwise)) = open.pop() {
            let end = self.emit(op(Code::EndIf, &node.location));
            self.link(otherwise.unwrap_or(start), end);
        }
        Ok(())
    }

    /// `def`/`enddef` around the body of a nested template. The body runs
    /// in its own activation, so it starts with no loops and fresh registers.
    fn def(&mut self, template: &Arc<Template>, loc: &Arc<Location>, target: Option<Register>) -> CodegenResult<()> {
        let mut def_op = op(Code::Def, loc);
        if let Some(target) = target {
            def_op = def_op.regs(&[target]);
        }
        if let Some(name) = &template.name {
            def_op = def_op.arg(name.as_str());
        }
        let start = self.emit(def_op);
        self.defs.push((start, Arc::downgrade(template)));

        let loops = std::mem::take(&mut self.loops);
        let registers = std::mem::replace(&mut self.next_register, 0);
        self.block(&template.content)?;
        self.loops = loops;
        self.next_register = registers;

        let end = self.emit(op(Code::EndDef, loc));
        self.link(start, end);
        Ok(())
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Evaluate `node` into a newly allocated register.
    fn expr(&mut self, node: &Node) -> CodegenResult<Register> {
        let r = self.alloc(node)?;
        self.expr_into(node, r)?;
        Ok(r)
    }

    fn expr_into(&mut self, node: &Node, target: Register) -> CodegenResult<()> {
        let loc = &node.location;
        let t = [target];
        match &node.kind {
            NodeKind::LoadNone => {
                self.emit(op(Code::LoadNone, loc).regs(&t));
            }
            NodeKind::LoadTrue => {
                self.emit(op(Code::LoadTrue, loc).regs(&t));
            }
            NodeKind::LoadFalse => {
                self.emit(op(Code::LoadFalse, loc).regs(&t));
            }
            NodeKind::LoadInt(i) => {
                self.emit(op(Code::LoadInt, loc).regs(&t).arg(i.to_string()));
            }
            NodeKind::LoadFloat(f) => {
                self.emit(op(Code::LoadFloat, loc).regs(&t).arg(format!("{f:?}")));
            }
            NodeKind::LoadStr(s) => {
                self.emit(op(Code::LoadStr, loc).regs(&t).arg(s.as_str()));
            }
            NodeKind::LoadColor(c) => {
                self.emit(op(Code::LoadColor, loc).regs(&t).arg(c.to_hex8()));
            }
            NodeKind::LoadDate(d) => {
                self.emit(op(Code::LoadDate, loc).regs(&t).arg(d.to_compact()));
            }
            NodeKind::List(items) => self.arg_list(node, items, target)?,
            NodeKind::Dict(items) => {
                self.emit(op(Code::BuildDict, loc).regs(&t));
                for item in items {
                    match item {
                        DictItem::Pair(key, value) => {
                            let k = self.expr(key)?;
                            let v = self.expr(value)?;
                            self.emit(op(Code::AddDict, loc).regs(&[target, k, v]));
                            self.release(2);
                        }
                        DictItem::Update(update) => {
                            let u = self.expr(update)?;
                            self.emit(op(Code::UpdateDict, loc).regs(&[target, u]));
                            self.release(1);
                        }
                    }
                }
            }
            NodeKind::LoadVar(name) => {
                self.emit(op(Code::LoadVar, loc).regs(&t).arg(name.as_str()));
            }
            NodeKind::Unary {
                op: unary @ (UnaryOp::Not | UnaryOp::Neg),
                obj,
            } => {
                let code = if *unary == UnaryOp::Not {
                    Code::Not
                } else {
                    Code::Neg
                };
                self.expr_into(obj, target)?;
                self.emit(op(code, loc).regs(&[target, target]));
            }
            NodeKind::Binary {
                op: BinaryOp::And,
                obj1,
                obj2,
            } => {
                self.expr_into(obj1, target)?;
                let start = self.emit(op(Code::If, loc).regs(&t));
                self.expr_into(obj2, target)?;
                let end = self.emit(op(Code::EndIf, loc));
                self.link(start, end);
            }
            NodeKind::Binary {
                op: BinaryOp::Or,
                obj1,
                obj2,
            } => {
                self.expr_into(obj1, target)?;
                let negated = self.alloc(node)?;
                self.emit(op(Code::Not, loc).regs(&[negated, target]));
                let start = self.emit(op(Code::If, loc).regs(&[negated]));
                self.release(1);
                self.expr_into(obj2, target)?;
                let end = self.emit(op(Code::EndIf, loc));
                self.link(start, end);
            }
            NodeKind::Binary {
                op: binop,
                obj1,
                obj2,
            } => {
                let code = binary_code(*binop)
                    .ok_or_else(|| CodegenError::Internal(format!("no opcode for {}", binop.name())))?;
                self.expr_into(obj1, target)?;
                let r = self.expr(obj2)?;
                self.emit(op(code, loc).regs(&[target, target, r]));
                self.release(1);
            }
            NodeKind::GetSlice { obj, index1, index2 } => {
                self.expr_into(obj, target)?;
                match (index1.as_deref(), index2.as_deref()) {
                    (Some(start), Some(stop)) => {
                        let r1 = self.expr(start)?;
                        let r2 = self.expr(stop)?;
                        self.emit(op(Code::GetSlice12, loc).regs(&[target, target, r1, r2]));
                        self.release(2);
                    }
                    (Some(start), None) => {
                        let r = self.expr(start)?;
                        self.emit(op(Code::GetSlice1, loc).regs(&[target, target, r]));
                        self.release(1);
                    }
                    (None, Some(stop)) => {
                        let r = self.expr(stop)?;
                        self.emit(op(Code::GetSlice2, loc).regs(&[target, target, r]));
                        self.release(1);
                    }
                    (None, None) => {
                        self.emit(op(Code::GetSlice, loc).regs(&[target, target]));
                    }
                }
            }
            NodeKind::GetAttr { obj, attrname } => {
                self.expr_into(obj, target)?;
                self.emit(op(Code::GetAttr, loc).regs(&[target, target]).arg(attrname.as_str()));
            }
            NodeKind::CallFunc { funcname, args } => {
                self.arg_list(node, args, target)?;
                self.emit(op(Code::CallFunc, loc).regs(&[target, target]).arg(funcname.as_str()));
            }
            NodeKind::CallMeth { methname, obj, args } => {
                self.expr_into(obj, target)?;
                let r = self.alloc(node)?;
                self.arg_list(node, args, r)?;
                self.emit(op(Code::CallMeth, loc).regs(&[target, target, r]).arg(methname.as_str()));
                self.release(1);
            }
            NodeKind::CallMethKeywords { methname, obj, args } => {
                self.expr_into(obj, target)?;
                let r = self.keywords(node, args)?;
                self.emit(op(Code::CallMethKw, loc).regs(&[target, target, r]).arg(methname.as_str()));
                self.release(1);
            }
            NodeKind::Template(template) => self.def(template, loc, Some(target))?,
            // Statements in expression position fail only when reached.
            _ => {
                self.emit(op(Code::Invalid, loc).regs(&t).arg(node.name()));
            }
        }
        Ok(())
    }

    /// Build a list of the values of `args` in `target`.
    fn arg_list(&mut self, node: &Node, args: &[Node], target: Register) -> CodegenResult<()> {
        self.emit(op(Code::BuildList, &node.location).regs(&[target]));
        for arg in args {
            let r = self.expr(arg)?;
            self.emit(op(Code::AddList, &node.location).regs(&[target, r]));
            self.release(1);
        }
        Ok(())
    }

    /// Build a dict of keyword arguments in a new register.
    fn keywords(&mut self, node: &Node, args: &[(String, Node)]) -> CodegenResult<Register> {
        let loc = &node.location;
        let target = self.alloc(node)?;
        self.emit(op(Code::BuildDict, loc).regs(&[target]));
        for (name, value) in args {
            let k = self.alloc(node)?;
            self.emit(op(Code::LoadStr, loc).regs(&[k]).arg(name.as_str()));
            let v = self.expr(value)?;
            self.emit(op(Code::AddDict, loc).regs(&[target, k, v]));
            self.release(2);
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ul4_types::build::*;

    fn listing(content: Vec<Node>) -> String {
        compile(&template(None, content)).unwrap().listing()
    }

    #[test]
    fn test_print_expression() {
        let out = listing(vec![print(binary(BinaryOp::Add, var("x"), constant(1)))]);
        assert_eq!(out, "loadvar r0 \"x\"\nloadint r1 \"1\"\nadd r0 r0 r1\nprint r0\n");
    }

    #[test]
    fn test_for_loop_layout() {
        let program = compile(&template(
            None,
            vec![for_normal("i", var("xs"), vec![print(var("i")), break_()])],
        ))
        .unwrap();
        assert_eq!(
            program.listing(),
            "loadvar r0 \"xs\"\nfor r1 r0\n\tstorevar r1 \"i\"\n\tloadvar r2 \"i\"\n\tprint r2\n\tbreak\nendfor\n"
        );
        assert_eq!(program.jump(1), Some(6));
        assert_eq!(program.jump(5), Some(6));
        assert_eq!(program.jump(6), Some(1));
    }

    #[test]
    fn test_lazy_iterator_container() {
        let out = listing(vec![for_normal("i", callfunc("range", vec![constant(3)]), vec![])]);
        assert_eq!(
            out,
            "buildlist r0\nloadint r1 \"3\"\naddlist r0 r1\nfor r1 r0 \"range\"\n\tstorevar r1 \"i\"\nendfor\n"
        );
    }

    #[test]
    fn test_and_or_short_circuit_blocks() {
        let out = listing(vec![print(binary(BinaryOp::Or, var("a"), var("b")))]);
        assert_eq!(
            out,
            "loadvar r0 \"a\"\nnot r1 r0\nif r1\n\tloadvar r0 \"b\"\nendif\nprint r0\n"
        );
    }

    #[test]
    fn test_elif_chain_jumps() {
        let program = compile(&template(
            None,
            vec![conditional(vec![
                (Some(var("a")), vec![text("1")]),
                (Some(var("b")), vec![text("2")]),
                (None, vec![text("3")]),
            ])],
        ))
        .unwrap();
        let codes: Vec<_> = program.opcodes().iter().map(|op| op.code.name()).collect();
        assert_eq!(
            codes,
            vec![
                "loadvar", "if", "text", "else", "loadvar", "if", "text", "else", "text", "endif",
                "endif"
            ]
        );
        assert_eq!(program.jump(1), Some(3));
        assert_eq!(program.jump(3), Some(10));
        assert_eq!(program.jump(5), Some(7));
        assert_eq!(program.jump(7), Some(9));
    }

    #[test]
    fn test_def_records_nested_template() {
        let t = template(None, vec![def("inner", vec![text("x")]), text("y")]);
        let program = compile(&t).unwrap();
        assert_eq!(program.listing(), "def \"inner\"\n\ttext\nenddef\ntext\n");
        assert_eq!(program.jump(0), Some(2));
        let inner = program.def_template(0).unwrap();
        assert_eq!(inner.name.as_deref(), Some("inner"));
    }

    #[test]
    fn test_register_bank_grows_with_nesting() {
        let mut expr = constant(1);
        for _ in 0..40 {
            expr = binary(BinaryOp::Add, constant(1), expr);
        }
        let program = compile(&template(None, vec![print(expr)])).unwrap();
        assert_eq!(program.registers, 41);
        let flat = compile(&template(None, vec![print(constant(1)), print(constant(2))])).unwrap();
        assert_eq!(flat.registers, 1);
    }

    #[test]
    fn test_def_body_counts_toward_register_bank() {
        let inner = print(binary(BinaryOp::Add, constant(1), binary(BinaryOp::Add, constant(2), constant(3))));
        let program = compile(&template(None, vec![def("inner", vec![inner])])).unwrap();
        assert_eq!(program.registers, 3);
    }

    #[test]
    fn test_statement_as_expression_compiles_to_invalid() {
        let bad = getattr(print(var("x")), "y");
        let out = listing(vec![print(bad)]);
        assert_eq!(out, "invalid r0 \"print\"\ngetattr r0 r0 \"y\"\nprint r0\n");
    }
}
