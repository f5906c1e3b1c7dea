//! Opcode records for the register-machine execution engine.

use crate::ast::Template;
use crate::Location;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};

/// Index of a machine register. A program declares how many it needs.
pub type Register = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Code {
    /// Output the code span of the opcode's location.
    Text,
    LoadNone,
    LoadFalse,
    LoadTrue,
    LoadInt,
    LoadFloat,
    LoadStr,
    LoadDate,
    LoadColor,
    BuildList,
    BuildDict,
    AddList,
    AddDict,
    UpdateDict,
    LoadVar,
    StoreVar,
    AddVar,
    SubVar,
    MulVar,
    TrueDivVar,
    FloorDivVar,
    ModVar,
    DelVar,
    GetAttr,
    GetItem,
    GetSlice12,
    GetSlice1,
    GetSlice2,
    GetSlice,
    Print,
    PrintX,
    For,
    Unpack,
    EndFor,
    Break,
    Continue,
    Not,
    Neg,
    Contains,
    NotContains,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    FloorDiv,
    TrueDiv,
    Mod,
    CallFunc,
    CallMeth,
    CallMethKw,
    Render,
    If,
    Else,
    EndIf,
    Def,
    EndDef,
    /// Fail with a type error: a statement node was used as an expression.
    Invalid,
}

impl Code {
    pub fn name(self) -> &'static str {
        match self {
            Code::Text => "text",
            Code::LoadNone => "loadnone",
            Code::LoadFalse => "loadfalse",
            Code::LoadTrue => "loadtrue",
            Code::LoadInt => "loadint",
            Code::LoadFloat => "loadfloat",
            Code::LoadStr => "loadstr",
            Code::LoadDate => "loaddate",
            Code::LoadColor => "loadcolor",
            Code::BuildList => "buildlist",
            Code::BuildDict => "builddict",
            Code::AddList => "addlist",
            Code::AddDict => "adddict",
            Code::UpdateDict => "updatedict",
            Code::LoadVar => "loadvar",
            Code::StoreVar => "storevar",
            Code::AddVar => "addvar",
            Code::SubVar => "subvar",
            Code::MulVar => "mulvar",
            Code::TrueDivVar => "truedivvar",
            Code::FloorDivVar => "floordivvar",
            Code::ModVar => "modvar",
            Code::DelVar => "delvar",
            Code::GetAttr => "getattr",
            Code::GetItem => "getitem",
            Code::GetSlice12 => "getslice12",
            Code::GetSlice1 => "getslice1",
            Code::GetSlice2 => "getslice2",
            Code::GetSlice => "getslice",
            Code::Print => "print",
            Code::PrintX => "printx",
            Code::For => "for",
            Code::Unpack => "unpack",
            Code::EndFor => "endfor",
            Code::Break => "break",
            Code::Continue => "continue",
            Code::Not => "not",
            Code::Neg => "neg",
            Code::Contains => "contains",
            Code::NotContains => "notcontains",
            Code::Eq => "eq",
            Code::Ne => "ne",
            Code::Lt => "lt",
            Code::Le => "le",
            Code::Gt => "gt",
            Code::Ge => "ge",
            Code::Add => "add",
            Code::Sub => "sub",
            Code::Mul => "mul",
            Code::FloorDiv => "floordiv",
            Code::TrueDiv => "truediv",
            Code::Mod => "mod",
            Code::CallFunc => "callfunc",
            Code::CallMeth => "callmeth",
            Code::CallMethKw => "callmethkw",
            Code::Render => "render",
            Code::If => "if",
            Code::Else => "else",
            Code::EndIf => "endif",
            Code::Def => "def",
            Code::EndDef => "enddef",
            Code::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One instruction: a code, up to five register operands, an optional
/// argument string and the location it was compiled from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opcode {
    pub code: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r1: Option<Register>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2: Option<Register>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r3: Option<Register>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r4: Option<Register>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r5: Option<Register>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    #[serde(skip)]
    pub location: Option<Arc<Location>>,
}

impl Opcode {
    pub fn new(code: Code, location: Option<Arc<Location>>) -> Self {
        Self {
            code,
            r1: None,
            r2: None,
            r3: None,
            r4: None,
            r5: None,
            arg: None,
            location,
        }
    }

    /// Set the register operands in order (at most five are kept).
    pub fn regs(mut self, regs: &[Register]) -> Self {
        let mut it = regs.iter().copied();
        self.r1 = it.next();
        self.r2 = it.next();
        self.r3 = it.next();
        self.r4 = it.next();
        self.r5 = it.next();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code.name())?;
        for r in [self.r1, self.r2, self.r3, self.r4, self.r5].into_iter().flatten() {
            write!(f, " r{r}")?;
        }
        if let Some(arg) = &self.arg {
            write!(f, " {arg:?}")?;
        }
        Ok(())
    }
}

/// A compiled opcode stream plus the slice of it that forms one template.
///
/// Nested `def` templates share the stream of the template that contains
/// them and only narrow `start..stop`.
#[derive(Debug, Clone)]
pub struct Program {
    pub code: Arc<[Opcode]>,
    /// Absolute jump target for each block opcode:
    /// `for`→`endfor`, `endfor`→`for`, `break`/`continue`→`endfor`,
    /// `if`→`else` or `endif`, `else`→`endif`, `def`→`enddef`.
    pub jumps: Arc<[Option<usize>]>,
    /// Templates introduced by `def` opcodes, keyed by opcode index.
    /// The AST owns them; the program only refers back.
    pub defs: Arc<[(usize, Weak<Template>)]>,
    /// Size of the register bank the whole stream needs.
    pub registers: usize,
    pub start: usize,
    pub stop: usize,
}

impl Program {
    pub fn new(
        code: Vec<Opcode>,
        jumps: Vec<Option<usize>>,
        defs: Vec<(usize, Weak<Template>)>,
        registers: usize,
    ) -> Self {
        let stop = code.len();
        Self {
            code: code.into(),
            jumps: jumps.into(),
            defs: defs.into(),
            registers,
            start: 0,
            stop,
        }
    }

    /// The same stream restricted to `start..stop`.
    pub fn narrowed(&self, start: usize, stop: usize) -> Self {
        Self {
            start,
            stop,
            ..self.clone()
        }
    }

    pub fn opcodes(&self) -> &[Opcode] {
        &self.code[self.start..self.stop]
    }

    pub fn jump(&self, index: usize) -> Option<usize> {
        self.jumps.get(index).copied().flatten()
    }

    /// The template defined by the `def` opcode at `index`, if still alive.
    pub fn def_template(&self, index: usize) -> Option<Arc<Template>> {
        let pos = self.defs.binary_search_by_key(&index, |(i, _)| *i).ok()?;
        self.defs[pos].1.upgrade()
    }

    /// One opcode per line, indented by block nesting.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let mut depth = 0usize;
        for op in self.opcodes() {
            if matches!(op.code, Code::EndFor | Code::EndIf | Code::EndDef | Code::Else) {
                depth = depth.saturating_sub(1);
            }
            out.push_str(&"\t".repeat(depth));
            out.push_str(&op.to_string());
            out.push('\n');
            if matches!(op.code, Code::For | Code::If | Code::Def | Code::Else) {
                depth += 1;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_display() {
        let op = Opcode::new(Code::LoadInt, None).regs(&[0]).arg("42");
        assert_eq!(op.to_string(), "loadint r0 \"42\"");
        let op = Opcode::new(Code::Add, None).regs(&[1, 1, 2]);
        assert_eq!(op.to_string(), "add r1 r1 r2");
        let op = Opcode::new(Code::Invalid, None).regs(&[300]).arg("print");
        assert_eq!(op.to_string(), "invalid r300 \"print\"");
    }

    #[test]
    fn test_opcode_serializes_compactly() {
        let op = Opcode::new(Code::LoadVar, None).regs(&[3]).arg("x");
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"code":"loadvar","r1":3,"arg":"x"}"#);
    }

    #[test]
    fn test_narrowed_program_shares_code() {
        let code = vec![
            Opcode::new(Code::Def, None).arg("t"),
            Opcode::new(Code::LoadNone, None).regs(&[0]),
            Opcode::new(Code::EndDef, None),
        ];
        let program = Program::new(code, vec![Some(2), None, None], vec![], 1);
        let inner = program.narrowed(1, 2);
        assert!(Arc::ptr_eq(&program.code, &inner.code));
        assert_eq!(inner.registers, 1);
        assert_eq!(inner.opcodes().len(), 1);
        assert_eq!(program.jump(0), Some(2));
        assert_eq!(program.jump(1), None);
    }

    #[test]
    fn test_listing_indents_blocks() {
        let code = vec![
            Opcode::new(Code::LoadVar, None).regs(&[0]).arg("xs"),
            Opcode::new(Code::For, None).regs(&[1, 0]),
            Opcode::new(Code::Print, None).regs(&[1]),
            Opcode::new(Code::EndFor, None),
        ];
        let program = Program::new(code, vec![None, Some(3), None, Some(1)], vec![], 2);
        assert_eq!(
            program.listing(),
            "loadvar r0 \"xs\"\nfor r1 r0\n\tprint r1\nendfor\n"
        );
    }
}
