//! Expression nodes.
//!
//! Expressions form the leaf-to-root data layer of the IR. Every node is
//! immutable behind an [`Rc`]; builders validate operand types at
//! construction time and return [`crate::Result`] where a contract can fail.
//!
//! Variable identity is by pointer (and by the `id` issued at creation):
//! two `Var`s with the same name and type are still distinct variables.

use std::fmt;
use std::rc::Rc;

use snafu::ensure;

use tessera_dtype::{DataType, MemorySpace};

use crate::error::{self, Result};
use crate::func::GlobalVarRef;
use crate::next_node_id;
use crate::op::Op;
use crate::span::Span;
use crate::types::{Type, TypeRef};

pub type ExprRef = Rc<Expr>;
pub type VarRef = Rc<Var>;

/// Binary operator kinds (scalar arithmetic only; tensor/tile arithmetic
/// goes through [`Call`] ops).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::AsRefStr, strum::EnumCount, strum::EnumIter)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    FloorDiv,
    FloorMod,
    FloatDiv,
    Pow,
    Min,
    Max,

    // Comparison (result is BOOL)
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical (operands and result are BOOL)
    And,
    Or,
    Xor,

    // Bitwise (integer operands)
    BitAnd,
    BitOr,
    BitXor,
    BitShiftLeft,
    BitShiftRight,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            Self::BitAnd | Self::BitOr | Self::BitXor | Self::BitShiftLeft | Self::BitShiftRight
        )
    }

    pub fn is_arithmetic(self) -> bool {
        !self.is_comparison() && !self.is_logical() && !self.is_bitwise()
    }

    /// Infix spelling, or `None` for function-style operators (`Min`, `Max`).
    pub fn symbol(self) -> Option<&'static str> {
        Some(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::FloorDiv => "//",
            Self::FloorMod => "%",
            Self::FloatDiv => "/",
            Self::Pow => "**",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitShiftLeft => "<<",
            Self::BitShiftRight => ">>",
            Self::Min | Self::Max => return None,
        })
    }
}

/// Unary operator kinds. `Cast` carries its target dtype in the result type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::AsRefStr, strum::EnumCount, strum::EnumIter)]
pub enum UnaryOp {
    Abs,
    Neg,
    Not,
    BitNot,
    Cast,
}

/// A named, typed variable. Identity is by pointer, never by name.
#[derive(Debug)]
pub struct Var {
    id: u64,
    pub name: String,
    pub ty: TypeRef,
    pub span: Span,
    /// Abstract memory reference, attached by `init_mem_ref` to tile-typed
    /// variables and shared by `basic_memory_reuse`.
    pub memref: Option<Rc<MemRef>>,
}

impl Var {
    pub fn new(name: impl Into<String>, ty: TypeRef, span: Span) -> VarRef {
        Rc::new(Self { id: next_node_id(), name: name.into(), ty, span, memref: None })
    }

    /// A copy of this variable (fresh identity) carrying a memory reference.
    pub fn with_memref(&self, memref: Rc<MemRef>) -> VarRef {
        Rc::new(Self {
            id: next_node_id(),
            name: self.name.clone(),
            ty: self.ty.clone(),
            span: self.span.clone(),
            memref: Some(memref),
        })
    }

    /// Identity number; unique per thread, never reused.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Loop-carried value of a `For` statement: a binder plus its initial value.
#[derive(Debug)]
pub struct IterArg {
    pub var: VarRef,
    pub init: ExprRef,
    pub span: Span,
}

impl IterArg {
    pub fn new(var: VarRef, init: ExprRef, span: Span) -> Rc<Self> {
        Rc::new(Self { var, init, span })
    }
}

/// Abstract memory reference backing a tile variable.
#[derive(Debug)]
pub struct MemRef {
    id: u64,
    pub memory_space: MemorySpace,
    pub size_bytes: usize,
    pub span: Span,
}

impl MemRef {
    pub fn new(memory_space: MemorySpace, size_bytes: usize, span: Span) -> Rc<Self> {
        Rc::new(Self { id: next_node_id(), memory_space, size_bytes, span })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Call target: a primitive op by name, or a function in the same program.
#[derive(Debug, Clone)]
pub enum Callee {
    Op(Rc<Op>),
    Func(GlobalVarRef),
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Self::Op(op) => &op.name,
            Self::Func(gv) => &gv.name,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Self::Func(_))
    }
}

/// Dynamically-typed keyword argument value (closed set of variants).
#[derive(Debug, Clone, PartialEq)]
pub enum KwValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    DType(DataType),
    Memory(MemorySpace),
}

impl fmt::Display for KwValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::DType(v) => write!(f, "{v}"),
            Self::Memory(v) => write!(f, "{v}"),
        }
    }
}

/// Keyword arguments. Insertion order is semantically significant and
/// preserved on emission.
pub type Kwargs = Vec<(String, KwValue)>;

/// Look up a kwarg by name.
pub fn kwarg<'a>(kwargs: &'a Kwargs, name: &str) -> Option<&'a KwValue> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

/// Call expression. `ty` is the inferred (op) or declared (function) result
/// type; it is fixed at construction and carried through rewrites.
#[derive(Debug)]
pub struct Call {
    pub callee: Callee,
    pub args: Vec<ExprRef>,
    pub kwargs: Kwargs,
    pub ty: TypeRef,
    pub span: Span,
}

impl Call {
    /// Call to a function of the enclosing program.
    pub fn function(
        func: GlobalVarRef,
        args: Vec<ExprRef>,
        kwargs: Kwargs,
        result_type: TypeRef,
        span: Span,
    ) -> ExprRef {
        Rc::new(Expr::Call(Self { callee: Callee::Func(func), args, kwargs, ty: result_type, span }))
    }

    /// Rebuild with different pieces, keeping the result type. Op calls are
    /// normally built through [`crate::op::create`], which infers the type.
    pub fn with_parts(
        callee: Callee,
        args: Vec<ExprRef>,
        kwargs: Kwargs,
        ty: TypeRef,
        span: Span,
    ) -> ExprRef {
        Rc::new(Expr::Call(Self { callee, args, kwargs, ty, span }))
    }

    pub fn is_op(&self, name: &str) -> bool {
        matches!(&self.callee, Callee::Op(op) if op.name == name)
    }

    pub fn target_function(&self) -> Option<&GlobalVarRef> {
        match &self.callee {
            Callee::Func(gv) => Some(gv),
            Callee::Op(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum Expr {
    Var(VarRef),
    IterArg(Rc<IterArg>),
    ConstInt {
        value: i64,
        dtype: DataType,
        span: Span,
    },
    ConstFloat {
        value: f64,
        dtype: DataType,
        span: Span,
    },
    ConstBool {
        value: bool,
        span: Span,
    },
    MakeTuple {
        elements: Vec<ExprRef>,
        ty: TypeRef,
        span: Span,
    },
    TupleGetItem {
        tuple: ExprRef,
        index: usize,
        ty: TypeRef,
        span: Span,
    },
    Call(Call),
    Binary {
        op: BinaryOp,
        lhs: ExprRef,
        rhs: ExprRef,
        ty: TypeRef,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: ExprRef,
        ty: TypeRef,
        span: Span,
    },
    MemRef(Rc<MemRef>),
}

impl Expr {
    pub fn var(var: &VarRef) -> ExprRef {
        Rc::new(Self::Var(var.clone()))
    }

    pub fn iter_arg(arg: &Rc<IterArg>) -> ExprRef {
        Rc::new(Self::IterArg(arg.clone()))
    }

    pub fn const_int(value: i64, dtype: DataType, span: Span) -> ExprRef {
        Rc::new(Self::ConstInt { value, dtype, span })
    }

    pub fn const_float(value: f64, dtype: DataType, span: Span) -> ExprRef {
        Rc::new(Self::ConstFloat { value, dtype, span })
    }

    pub fn const_bool(value: bool, span: Span) -> ExprRef {
        Rc::new(Self::ConstBool { value, span })
    }

    pub fn memref(memref: &Rc<MemRef>) -> ExprRef {
        Rc::new(Self::MemRef(memref.clone()))
    }

    pub fn make_tuple(elements: Vec<ExprRef>, span: Span) -> ExprRef {
        let ty = Type::tuple(elements.iter().map(|e| e.ty()).collect());
        Rc::new(Self::MakeTuple { elements, ty, span })
    }

    pub fn tuple_get(tuple: ExprRef, index: usize, span: Span) -> Result<ExprRef> {
        let ty = match &*tuple.ty() {
            Type::Tuple(elements) => {
                ensure!(
                    index < elements.len(),
                    error::TupleIndexOutOfBoundsSnafu { index, len: elements.len() }
                );
                elements[index].clone()
            }
            other => {
                return error::TypeMismatchSnafu {
                    context: "TupleGetItem".to_string(),
                    expected: "TupleType".to_string(),
                    actual: other.to_string(),
                }
                .fail();
            }
        };
        Ok(Rc::new(Self::TupleGetItem { tuple, index, ty, span }))
    }

    pub fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef, span: Span) -> Result<ExprRef> {
        let lhs_dtype = scalar_dtype(&lhs, op.as_ref())?;
        let rhs_dtype = scalar_dtype(&rhs, op.as_ref())?;
        ensure!(
            lhs_dtype == rhs_dtype,
            error::TypeMismatchSnafu {
                context: format!("binary {}", op.as_ref()),
                expected: lhs_dtype.to_string(),
                actual: rhs_dtype.to_string(),
            }
        );
        if op.is_logical() {
            ensure!(
                lhs_dtype.is_bool(),
                error::TypeMismatchSnafu {
                    context: format!("binary {}", op.as_ref()),
                    expected: DataType::Bool.to_string(),
                    actual: lhs_dtype.to_string(),
                }
            );
        }
        if op.is_bitwise() {
            ensure!(
                lhs_dtype.is_int() || lhs_dtype.is_bool(),
                error::TypeMismatchSnafu {
                    context: format!("binary {}", op.as_ref()),
                    expected: "integer type".to_string(),
                    actual: lhs_dtype.to_string(),
                }
            );
        }
        let result = if op.is_comparison() || op.is_logical() { DataType::Bool } else { lhs_dtype };
        Ok(Rc::new(Self::Binary { op, lhs, rhs, ty: Type::scalar(result), span }))
    }

    pub fn unary(op: UnaryOp, operand: ExprRef, span: Span) -> Result<ExprRef> {
        let dtype = scalar_dtype(&operand, op.as_ref())?;
        let result = match op {
            UnaryOp::Abs | UnaryOp::Neg => {
                ensure!(
                    !dtype.is_bool(),
                    error::TypeMismatchSnafu {
                        context: format!("unary {}", op.as_ref()),
                        expected: "numeric type".to_string(),
                        actual: dtype.to_string(),
                    }
                );
                dtype
            }
            UnaryOp::Not => {
                ensure!(
                    dtype.is_bool(),
                    error::TypeMismatchSnafu {
                        context: "unary Not".to_string(),
                        expected: DataType::Bool.to_string(),
                        actual: dtype.to_string(),
                    }
                );
                DataType::Bool
            }
            UnaryOp::BitNot => {
                ensure!(
                    dtype.is_int(),
                    error::TypeMismatchSnafu {
                        context: "unary BitNot".to_string(),
                        expected: "integer type".to_string(),
                        actual: dtype.to_string(),
                    }
                );
                dtype
            }
            UnaryOp::Cast => dtype,
        };
        Ok(Rc::new(Self::Unary { op, operand, ty: Type::scalar(result), span }))
    }

    /// Scalar cast; the target dtype becomes the node's result type.
    pub fn cast(operand: ExprRef, dtype: DataType, span: Span) -> Result<ExprRef> {
        scalar_dtype(&operand, "Cast")?;
        Ok(Rc::new(Self::Unary { op: UnaryOp::Cast, operand, ty: Type::scalar(dtype), span }))
    }

    pub fn ty(&self) -> TypeRef {
        match self {
            Self::Var(var) => var.ty.clone(),
            Self::IterArg(arg) => arg.var.ty.clone(),
            Self::ConstInt { dtype, .. } | Self::ConstFloat { dtype, .. } => Type::scalar(*dtype),
            Self::ConstBool { .. } => Type::scalar(DataType::Bool),
            Self::MakeTuple { ty, .. }
            | Self::TupleGetItem { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Unary { ty, .. } => ty.clone(),
            Self::Call(call) => call.ty.clone(),
            Self::MemRef(_) => Type::void(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::Var(var) => var.span.clone(),
            Self::IterArg(arg) => arg.span.clone(),
            Self::ConstInt { span, .. }
            | Self::ConstFloat { span, .. }
            | Self::ConstBool { span, .. }
            | Self::MakeTuple { span, .. }
            | Self::TupleGetItem { span, .. }
            | Self::Binary { span, .. }
            | Self::Unary { span, .. } => span.clone(),
            Self::Call(call) => call.span.clone(),
            Self::MemRef(memref) => memref.span.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Var(_) => "Var",
            Self::IterArg(_) => "IterArg",
            Self::ConstInt { .. } => "ConstInt",
            Self::ConstFloat { .. } => "ConstFloat",
            Self::ConstBool { .. } => "ConstBool",
            Self::MakeTuple { .. } => "MakeTuple",
            Self::TupleGetItem { .. } => "TupleGetItemExpr",
            Self::Call(_) => "Call",
            Self::Binary { .. } => "BinaryExpr",
            Self::Unary { .. } => "UnaryExpr",
            Self::MemRef(_) => "MemRef",
        }
    }

    pub fn as_var(&self) -> Option<&VarRef> {
        match self {
            Self::Var(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Self::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_make_tuple(&self) -> Option<&[ExprRef]> {
        match self {
            Self::MakeTuple { elements, .. } => Some(elements),
            _ => None,
        }
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Self::ConstInt { value, .. } => Some(*value),
            _ => None,
        }
    }
}

fn scalar_dtype(expr: &ExprRef, context: &str) -> Result<DataType> {
    match &*expr.ty() {
        Type::Scalar(dtype) => Ok(*dtype),
        other => error::TypeMismatchSnafu {
            context: context.to_string(),
            expected: "ScalarType".to_string(),
            actual: other.to_string(),
        }
        .fail(),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(var) => write!(f, "{}", var.name),
            Self::IterArg(arg) => write!(f, "{}", arg.var.name),
            Self::ConstInt { value, .. } => write!(f, "{value}"),
            Self::ConstFloat { value, .. } => write!(f, "{value}"),
            Self::ConstBool { value, .. } => write!(f, "{value}"),
            Self::MakeTuple { elements, .. } => {
                write!(f, "(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                if elements.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Self::TupleGetItem { tuple, index, .. } => write!(f, "{tuple}[{index}]"),
            Self::Call(call) => {
                write!(f, "{}(", call.callee.name())?;
                let mut first = true;
                for arg in &call.args {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{arg}")?;
                }
                for (name, value) in &call.kwargs {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{name}={value}")?;
                }
                write!(f, ")")
            }
            Self::Binary { op, lhs, rhs, .. } => match op.symbol() {
                Some(symbol) => write!(f, "({lhs} {symbol} {rhs})"),
                None => write!(f, "{}({lhs}, {rhs})", op.as_ref().to_lowercase()),
            },
            Self::Unary { op, operand, ty, .. } => match op {
                UnaryOp::Abs => write!(f, "abs({operand})"),
                UnaryOp::Neg => write!(f, "(-{operand})"),
                UnaryOp::Not => write!(f, "(not {operand})"),
                UnaryOp::BitNot => write!(f, "(~{operand})"),
                UnaryOp::Cast => write!(f, "cast({operand}, {ty})"),
            },
            Self::MemRef(memref) => {
                write!(f, "memref({}, {} bytes)", memref.memory_space, memref.size_bytes)
            }
        }
    }
}
