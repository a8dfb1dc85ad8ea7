//! Functions, global references and whole programs.

use std::fmt;
use std::rc::Rc;

use crate::expr::VarRef;
use crate::span::Span;
use crate::stmt::StmtRef;
use crate::types::{Type, TypeRef};

pub type FuncRef = Rc<Function>;
pub type GlobalVarRef = Rc<GlobalVar>;
pub type ProgramRef = Rc<Program>;

/// Where a function executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::AsRefStr, strum::EnumIter)]
pub enum FunctionKind {
    /// Not yet classified; the frontend's default.
    Opaque,
    /// Host-side coordination of InCore calls and tensor buffers.
    Orchestration,
    /// Executes inside a single accelerator core; tensor parameters must be
    /// lowered to tiles before use.
    InCore,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<VarRef>,
    pub return_types: Vec<TypeRef>,
    pub body: StmtRef,
    pub span: Span,
    pub kind: FunctionKind,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        params: Vec<VarRef>,
        return_types: Vec<TypeRef>,
        body: StmtRef,
        span: Span,
        kind: FunctionKind,
    ) -> FuncRef {
        Rc::new(Self { name: name.into(), params, return_types, body, span, kind })
    }

    /// Signature as a `FunctionType`.
    pub fn func_type(&self) -> TypeRef {
        Type::function(self.params.iter().map(|p| p.ty.clone()).collect(), self.return_types.clone())
    }

    /// The type a call to this function produces: void for no returns, the
    /// sole return type for one, a tuple for several.
    pub fn result_type(&self) -> TypeRef {
        match self.return_types.len() {
            0 => Type::void(),
            1 => self.return_types[0].clone(),
            _ => Type::tuple(self.return_types.clone()),
        }
    }
}

/// Name-identified reference to a function of the enclosing program.
#[derive(Debug)]
pub struct GlobalVar {
    pub name: String,
    pub span: Span,
}

impl GlobalVar {
    pub fn new(name: impl Into<String>, span: Span) -> GlobalVarRef {
        Rc::new(Self { name: name.into(), span })
    }
}

/// A whole compilation unit: functions in insertion order.
#[derive(Debug)]
pub struct Program {
    functions: Vec<(GlobalVarRef, FuncRef)>,
    pub name: String,
    pub span: Span,
}

impl Program {
    /// Builds the program table, synthesizing one `GlobalVar` per function.
    pub fn new(functions: Vec<FuncRef>, name: impl Into<String>, span: Span) -> ProgramRef {
        let functions = functions
            .into_iter()
            .map(|func| (GlobalVar::new(func.name.clone(), func.span.clone()), func))
            .collect();
        Rc::new(Self { functions, name: name.into(), span })
    }

    pub fn functions(&self) -> &[(GlobalVarRef, FuncRef)] {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&FuncRef> {
        self.functions.iter().find(|(gv, _)| gv.name == name).map(|(_, f)| f)
    }

    pub fn global_var(&self, name: &str) -> Option<&GlobalVarRef> {
        self.functions.iter().find(|(gv, _)| gv.name == name).map(|(gv, _)| gv)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty)?;
        }
        write!(f, ") -> (")?;
        for (i, ty) in self.return_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        writeln!(f, ")  # {:?}", self.kind)?;
        // Body renders with one level of indentation.
        let body = self.body.to_string();
        for line in body.lines() {
            writeln!(f, "    {line}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# program {}", self.name)?;
        for (_, func) in &self.functions {
            writeln!(f, "{func}")?;
        }
        Ok(())
    }
}
