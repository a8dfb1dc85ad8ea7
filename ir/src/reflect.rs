//! Per-node field descriptors.
//!
//! Every IR node exposes its fields as a flat, stably-ordered list of
//! [`Field`]s. Two consumers rely on this:
//!
//! - structural hashing/equality ([`crate::structural`]), which interprets
//!   the [`FieldKind`] labels (`Ignore` fields are invisible, `Def` fields
//!   open an α-mapping scope);
//! - serialization, whose pointer-sharing round-trip contract requires a
//!   stable field iteration order. The order below IS that contract.
//!
//! `span` is always `Ignore`; so are `Function::name`, `Program::name` and
//! the identity numbers of `Var`/`MemRef`.

use std::rc::Rc;

use tessera_dtype::{DataType, MemorySpace};

use crate::expr::{BinaryOp, Call, Callee, Expr, ExprRef, IterArg, Kwargs, MemRef, UnaryOp, Var, VarRef};
use crate::func::{FuncRef, Function, FunctionKind, GlobalVar, GlobalVarRef, Program};
use crate::span::Span;
use crate::stmt::{Stmt, StmtRef};
use crate::types::{TileView, Type, TypeRef};

/// How a field participates in structural comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Excluded from both hashing and equality.
    Ignore,
    /// Compared recursively with the caller's α-mapping flag.
    Usual,
    /// A definition site: α-mapping is unconditionally enabled inside.
    Def,
}

/// Borrowed view of one field's value.
#[derive(Debug, Clone, Copy)]
pub enum FieldValue<'a> {
    Expr(&'a ExprRef),
    Exprs(&'a [ExprRef]),
    Stmt(&'a StmtRef),
    OptStmt(Option<&'a StmtRef>),
    Stmts(&'a [StmtRef]),
    Type(&'a TypeRef),
    Types(&'a [TypeRef]),
    Var(&'a VarRef),
    Vars(&'a [VarRef]),
    IterArgs(&'a [Rc<IterArg>]),
    OptMemRef(Option<&'a Rc<MemRef>>),
    OptView(Option<&'a TileView>),
    Callee(&'a Callee),
    Kwargs(&'a Kwargs),
    Functions(&'a [(GlobalVarRef, FuncRef)]),
    Str(&'a str),
    Usize(usize),
    U64(u64),
    Int(i64),
    Float(f64),
    Bool(bool),
    DType(DataType),
    Memory(MemorySpace),
    BinOp(BinaryOp),
    UnOp(UnaryOp),
    FuncKind(FunctionKind),
    Span(&'a Span),
}

#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    pub name: &'static str,
    pub kind: FieldKind,
    pub value: FieldValue<'a>,
}

impl<'a> Field<'a> {
    pub fn new(name: &'static str, kind: FieldKind, value: FieldValue<'a>) -> Self {
        Self { name, kind, value }
    }
}

fn usual<'a>(name: &'static str, value: FieldValue<'a>) -> Field<'a> {
    Field::new(name, FieldKind::Usual, value)
}

fn def<'a>(name: &'static str, value: FieldValue<'a>) -> Field<'a> {
    Field::new(name, FieldKind::Def, value)
}

fn ignore<'a>(name: &'static str, value: FieldValue<'a>) -> Field<'a> {
    Field::new(name, FieldKind::Ignore, value)
}

impl Var {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        vec![
            usual("name", FieldValue::Str(&self.name)),
            usual("type", FieldValue::Type(&self.ty)),
            usual("memref", FieldValue::OptMemRef(self.memref.as_ref())),
            ignore("id", FieldValue::U64(self.id())),
            ignore("span", FieldValue::Span(&self.span)),
        ]
    }
}

impl IterArg {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        vec![
            usual("var", FieldValue::Var(&self.var)),
            usual("init_value", FieldValue::Expr(&self.init)),
            ignore("span", FieldValue::Span(&self.span)),
        ]
    }
}

impl MemRef {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        vec![
            usual("memory_space", FieldValue::Memory(self.memory_space)),
            usual("size_bytes", FieldValue::Usize(self.size_bytes)),
            ignore("id", FieldValue::U64(self.id())),
            ignore("span", FieldValue::Span(&self.span)),
        ]
    }
}

impl GlobalVar {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        vec![usual("name", FieldValue::Str(&self.name)), ignore("span", FieldValue::Span(&self.span))]
    }
}

impl Expr {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        match self {
            Self::Var(var) => vec![usual("var", FieldValue::Var(var))],
            Self::IterArg(arg) => vec![
                usual("var", FieldValue::Var(&arg.var)),
                usual("init_value", FieldValue::Expr(&arg.init)),
                ignore("span", FieldValue::Span(&arg.span)),
            ],
            Self::ConstInt { value, dtype, span } => vec![
                usual("value", FieldValue::Int(*value)),
                usual("dtype", FieldValue::DType(*dtype)),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::ConstFloat { value, dtype, span } => vec![
                usual("value", FieldValue::Float(*value)),
                usual("dtype", FieldValue::DType(*dtype)),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::ConstBool { value, span } => {
                vec![usual("value", FieldValue::Bool(*value)), ignore("span", FieldValue::Span(span))]
            }
            Self::MakeTuple { elements, ty, span } => vec![
                usual("elements", FieldValue::Exprs(elements)),
                usual("type", FieldValue::Type(ty)),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::TupleGetItem { tuple, index, ty, span } => vec![
                usual("tuple", FieldValue::Expr(tuple)),
                usual("index", FieldValue::Usize(*index)),
                usual("type", FieldValue::Type(ty)),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::Call(Call { callee, args, kwargs, ty, span }) => vec![
                usual("op", FieldValue::Callee(callee)),
                usual("args", FieldValue::Exprs(args)),
                usual("kwargs", FieldValue::Kwargs(kwargs)),
                usual("type", FieldValue::Type(ty)),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::Binary { op, lhs, rhs, ty, span } => vec![
                usual("op", FieldValue::BinOp(*op)),
                usual("left", FieldValue::Expr(lhs)),
                usual("right", FieldValue::Expr(rhs)),
                usual("type", FieldValue::Type(ty)),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::Unary { op, operand, ty, span } => vec![
                usual("op", FieldValue::UnOp(*op)),
                usual("operand", FieldValue::Expr(operand)),
                usual("type", FieldValue::Type(ty)),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::MemRef(memref) => vec![
                usual("memory_space", FieldValue::Memory(memref.memory_space)),
                usual("size_bytes", FieldValue::Usize(memref.size_bytes)),
                ignore("id", FieldValue::U64(memref.id())),
                ignore("span", FieldValue::Span(&memref.span)),
            ],
        }
    }
}

impl Stmt {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        match self {
            Self::Assign { var, value, span } => vec![
                def("var", FieldValue::Var(var)),
                usual("value", FieldValue::Expr(value)),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::Eval { expr, span } => {
                vec![usual("expr", FieldValue::Expr(expr)), ignore("span", FieldValue::Span(span))]
            }
            Self::Return { values, span } => {
                vec![usual("values", FieldValue::Exprs(values)), ignore("span", FieldValue::Span(span))]
            }
            Self::If { cond, then_body, else_body, span } => vec![
                usual("condition", FieldValue::Expr(cond)),
                usual("then_body", FieldValue::Stmt(then_body)),
                usual("else_body", FieldValue::OptStmt(else_body.as_ref())),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::For { loop_var, start, stop, step, iter_args, body, span } => vec![
                def("loop_var", FieldValue::Var(loop_var)),
                usual("start", FieldValue::Expr(start)),
                usual("stop", FieldValue::Expr(stop)),
                usual("step", FieldValue::Expr(step)),
                def("iter_args", FieldValue::IterArgs(iter_args)),
                usual("body", FieldValue::Stmt(body)),
                ignore("span", FieldValue::Span(span)),
            ],
            Self::Seq { stmts, span } => {
                vec![usual("stmts", FieldValue::Stmts(stmts)), ignore("span", FieldValue::Span(span))]
            }
        }
    }
}

impl Function {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        vec![
            ignore("name", FieldValue::Str(&self.name)),
            def("params", FieldValue::Vars(&self.params)),
            usual("return_types", FieldValue::Types(&self.return_types)),
            usual("body", FieldValue::Stmt(&self.body)),
            usual("func_type", FieldValue::FuncKind(self.kind)),
            ignore("span", FieldValue::Span(&self.span)),
        ]
    }
}

impl Program {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        vec![
            usual("functions", FieldValue::Functions(self.functions())),
            ignore("name", FieldValue::Str(&self.name)),
            ignore("span", FieldValue::Span(&self.span)),
        ]
    }
}

impl Type {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        match self {
            Self::Scalar(dtype) => vec![usual("dtype", FieldValue::DType(*dtype))],
            Self::Tensor { shape, dtype, memory_space } => vec![
                usual("shape", FieldValue::Exprs(shape)),
                usual("dtype", FieldValue::DType(*dtype)),
                usual("memory_space", FieldValue::Memory(*memory_space)),
            ],
            Self::Tile { shape, dtype, memory_space, view } => vec![
                usual("shape", FieldValue::Exprs(shape)),
                usual("dtype", FieldValue::DType(*dtype)),
                usual("memory_space", FieldValue::Memory(*memory_space)),
                usual("view", FieldValue::OptView(view.as_ref())),
            ],
            Self::Tuple(elements) => vec![usual("elements", FieldValue::Types(elements))],
            Self::Function { params, returns } => vec![
                usual("params", FieldValue::Types(params)),
                usual("returns", FieldValue::Types(returns)),
            ],
            Self::Void => vec![],
        }
    }
}

impl TileView {
    pub fn field_descriptors(&self) -> Vec<Field<'_>> {
        vec![
            usual("offsets", FieldValue::Exprs(&self.offsets)),
            usual("sizes", FieldValue::Exprs(&self.sizes)),
        ]
    }
}
